//! sealdrop-core: types shared by every sealdrop crate
//!
//! - `types`: `FileHeader` and the cipher parameters it carries
//! - `link`: share links and the API locators derived from them
//! - `error`: the pipeline error taxonomy
//! - `config`: TOML configuration loaded by the CLI and passed into pipelines

pub mod config;
pub mod error;
pub mod link;
pub mod types;

pub use config::SealConfig;
pub use error::{SealError, SealResult};
pub use link::{ApiLocator, ShareLink};
pub use types::{CipherParams, FileHeader, KdfSettings, Part};

/// File extension of every staged file
pub const STAGED_SUFFIX: &str = "enn";
