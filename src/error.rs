//! Named failure kinds.
//!
//! Most functions in this crate return `anyhow::Result` and attach context as
//! the error travels up. The variants below are the failures callers may want
//! to tell apart, so they are raised as typed errors and can be recovered with
//! `anyhow::Error::downcast_ref::<ProvisionError>()`.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("no server directory found under '{}'", .0.display())]
    ServerNotFound(PathBuf),

    #[error(
        "multiple servers found under '{}' ({}); set BP_LIBERTY_SERVER_NAME to pick one",
        .dir.display(),
        .candidates.join(", ")
    )]
    AmbiguousServer {
        dir: PathBuf,
        candidates: Vec<String>,
    },

    #[error("feature '{feature}' uses unsupported reference '{uri}' (only file: references are supported)")]
    UnsupportedReference { feature: String, uri: String },

    #[error("feature '{feature}' has unsupported packaging '{packaging}'")]
    UnsupportedPackaging { feature: String, packaging: String },

    #[error("feature '{feature}' is missing '{}'", .path.display())]
    FeatureFileNotFound { feature: String, path: PathBuf },

    #[error("command '{command}' failed with exit code {code}")]
    CommandFailed { command: String, code: i32 },

    #[error("unsupported archive format: '{}'", .0.display())]
    UnsupportedArchive(PathBuf),

    #[error("invalid template: {0}")]
    Template(String),
}
