//! sealdrop-storage: the remote service that holds sealed headers and bodies
//!
//! Layout under the configured prefix:
//! ```text
//! {prefix}/headers/{id}.json   FileHeader (JSON)
//! {prefix}/bodies/{id}.enn     staged ciphertext
//! ```

pub mod health;
pub mod operator;
pub mod remote;

pub use health::{check_health, is_healthy};
pub use operator::{build_from_core_config, build_operator, memory_operator, StorageCredentials};
pub use remote::{OpendalRemote, RemoteService};
