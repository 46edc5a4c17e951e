//! sealdrop-pipeline: staged seal/unseal pipelines
//!
//! Seal: size guard → stage → encrypt → checksum → put header → put body → share link
//! Unseal: share link → stage → get header → get body → verify → decrypt → place
//!
//! Every failure path that created a staged file removes it exactly once,
//! except a wrong passphrase on unseal, which keeps the downloaded
//! ciphertext so the caller can retry without re-fetching.

pub mod checksum;
pub mod guard;
pub mod place;
pub mod rollback;
pub mod seal;
pub mod staging;
pub mod unseal;

pub use checksum::{checksum, checksum_file, verify_checksum};
pub use guard::check_size;
pub use seal::{SealOutcome, Sealer};
pub use staging::{OsTokenSource, StagedEntry, StagedFile, StagingArea, TokenSource};
pub use unseal::{UnsealOutcome, UnsealStage, Unsealer};
