//! Headless-browser fetch tier.
//!
//! The last rung of the fetch ladder: a Chrome instance driven through
//! chromiumoxide, with automation fingerprints masked and challenge cookies
//! carried across runs.
//!
//! # Architecture
//!
//! ```text
//! URL → BrowserTier (lazy launch, reused) → page → rendered HTML
//!                 ↕
//!       browser_storage_state.json (cookies)
//! ```

mod chrome;
mod config;
pub mod session;
pub mod stealth;

pub use chrome::BrowserTier;
pub use config::BrowserConfig;
pub use session::{SessionState, StoredCookie};
