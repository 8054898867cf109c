//! blockchurn - streaming, block-wise authenticated file encryption
//!
//! Plaintext is sealed in fixed-size blocks with AES-256-GCM or AES-256-CCM
//! under a key derived from a caller secret, a content-derived salt and a
//! random per-encryption pepper. Encrypted files are named after their salt,
//! so identical content always maps to the same name.

#![forbid(unsafe_code)]

pub mod backend;
pub mod codec;
pub mod counter;
pub mod derive;
pub mod engine;
pub mod error;
pub mod file_ops;
pub mod fingerprint;
pub mod params;
pub mod secret;

pub use backend::{BackendKind, BlockCipher};
pub use engine::{ChurnDirection, ChurnOptions, ChurnSummary, TagRoute, Verification, churn};
pub use error::{ChurnError, ErrorCategory, ErrorKind, Result};
pub use file_ops::{ChurnOutcome, churn_dir, churn_file};
pub use params::{ChurnParams, FolderChurnParams};
