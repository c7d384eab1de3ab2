//! cmdkit: keep commands, links and secrets at hand, with sensitive values
//! protected at rest.

pub mod classifier;
pub mod cli;
pub mod crypto;
pub mod error;
pub mod filter;
pub mod logging;
pub mod models;
pub mod protect;
pub mod security;
pub mod service;
pub mod settings;
pub mod store;
pub mod utils;

// Re-export commonly used types
pub use error::{KitError, Result};
pub use models::{Entry, EntryDraft};
pub use service::EntryService;
pub use store::EntryStore;
