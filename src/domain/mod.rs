pub mod meta;
pub mod record;
pub mod source;
pub mod title;

pub use meta::{RunMeta, ValidationReport};
pub use record::Record;
pub use source::Source;
pub use title::is_placeholder_title;
