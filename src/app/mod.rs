pub mod context;
pub mod error;

pub use context::RunContext;
pub use error::{AlbumdexError, Result};
