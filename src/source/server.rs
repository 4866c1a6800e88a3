//! Packaged server source: a `usr/` or `wlp/usr/` tree at the root.

use anyhow::Result;
use std::path::PathBuf;

use super::BuildSource;
use crate::server::{self, ServerInstance};

#[derive(Debug, Clone)]
pub struct ServerSource {
    root: PathBuf,
    server_name: Option<String>,
}

impl ServerSource {
    pub fn new(root: impl Into<PathBuf>, server_name: Option<String>) -> Self {
        Self {
            root: root.into(),
            server_name,
        }
    }

    /// The user directory of the packaged server, if any.
    pub fn user_path(&self) -> Option<PathBuf> {
        server::user_path(&self.root)
    }

    /// Instance for the configured or discovered server.
    pub fn instance(&self) -> Result<ServerInstance> {
        Ok(ServerInstance::new(&self.root, self.default_server_name()?))
    }
}

impl BuildSource for ServerSource {
    fn name(&self) -> &str {
        "server"
    }

    /// False when the root has no user directory; otherwise whether the
    /// resolved server has a `server.xml`.
    fn detect(&self) -> Result<bool> {
        if self.user_path().is_none() {
            return Ok(false);
        }
        let instance = self.instance()?;
        Ok(instance
            .resolve_server_path()
            .is_some_and(|path| path.join(server::SERVER_CONFIG_FILENAME).is_file()))
    }

    fn default_server_name(&self) -> Result<String> {
        if let Some(name) = &self.server_name {
            return Ok(name.clone());
        }
        let user = self
            .user_path()
            .unwrap_or_else(|| self.root.join("usr"));
        server::single_server_name(&user)
    }

    fn validate_app(&self) -> Result<bool> {
        self.instance()?.has_installed_apps()
    }
}
