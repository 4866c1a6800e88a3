//! Build source detection.
//!
//! A build receives either a packaged Liberty server (a `usr/` or `wlp/usr/`
//! tree with `server.xml`) or a compiled application (an exploded WAR/EAR).
//! Each shape is a [`BuildSource`]; [`select`] checks them in a fixed order
//! and picks the first one that is present and holds a deployable app.
//!
//! Selection never touches the filesystem beyond reads.

pub mod app;
pub mod server;

pub use app::AppSource;
pub use server::ServerSource;

use anyhow::{Context, Result};
use std::path::Path;
use tracing::debug;

use crate::config::BuildConfig;

pub trait BuildSource {
    /// Name for logging.
    fn name(&self) -> &str;

    /// Whether this kind of input is present at the root.
    fn detect(&self) -> Result<bool>;

    /// Name of the server the build should configure.
    fn default_server_name(&self) -> Result<String>;

    /// Whether the input carries something deployable.
    fn validate_app(&self) -> Result<bool>;
}

/// The selected source. Only one is chosen per build.
#[derive(Debug, Clone)]
pub enum Source {
    Server(ServerSource),
    App(AppSource),
}

impl Source {
    pub fn as_build_source(&self) -> &dyn BuildSource {
        match self {
            Source::Server(source) => source,
            Source::App(source) => source,
        }
    }
}

/// Candidate sources for `app_root`, in selection order.
pub fn candidates(app_root: &Path, config: &BuildConfig) -> Vec<Source> {
    vec![
        Source::Server(ServerSource::new(app_root, config.server_name.clone())),
        Source::App(AppSource::new(
            app_root,
            config.app_server.clone(),
            config.server_name.clone(),
        )),
    ]
}

/// First candidate whose `detect` and `validate_app` both hold.
///
/// `Ok(None)` means nothing usable was found; the caller should treat that as
/// an unmet requirement rather than a failure.
pub fn select(candidates: Vec<Source>) -> Result<Option<Source>> {
    for candidate in candidates {
        let source = candidate.as_build_source();
        let detected = source
            .detect()
            .with_context(|| format!("detecting {} build source", source.name()))?;
        if !detected {
            debug!(source = source.name(), "build source not detected");
            continue;
        }
        let valid = source
            .validate_app()
            .with_context(|| format!("validating {} build source", source.name()))?;
        if !valid {
            debug!(source = source.name(), "build source has no deployable application");
            continue;
        }
        debug!(source = source.name(), "selected build source");
        return Ok(Some(candidate));
    }
    Ok(None)
}
