//! A concrete Liberty server on disk.
//!
//! Layout under an install root:
//!
//! ```text
//! <root>/usr/servers/<name>/server.xml
//! <root>/usr/servers/<name>/apps/*.war|*.ear
//! <root>/usr/servers/<name>/dropins/*.war|*.ear
//! <root>/usr/servers/<name>/configDropins/...
//! ```
//!
//! Packaged servers produced by `server package` carry the same tree under
//! `<root>/wlp/usr`, which takes precedence when both exist.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::ProvisionError;
use crate::fsutil::{copy_dir_recursive, replace_symlink};

pub const SERVER_CONFIG_FILENAME: &str = "server.xml";

const APP_DIRS: [&str; 2] = ["apps", "dropins"];
const APP_EXTENSIONS: [&str; 2] = ["war", "ear"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerInstance {
    install_root: PathBuf,
    name: String,
}

impl ServerInstance {
    pub fn new(install_root: impl Into<PathBuf>, name: impl Into<String>) -> Self {
        Self {
            install_root: install_root.into(),
            name: name.into(),
        }
    }

    pub fn install_root(&self) -> &Path {
        &self.install_root
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// `<root>/usr/servers/<name>/server.xml`
    pub fn config_path(&self) -> PathBuf {
        self.install_root
            .join("usr/servers")
            .join(&self.name)
            .join(SERVER_CONFIG_FILENAME)
    }

    /// The user directory, `wlp/usr` preferred over `usr`.
    ///
    /// `None` means the root is not a server tree at all.
    pub fn user_path(&self) -> Option<PathBuf> {
        user_path(&self.install_root)
    }

    /// `<user>/servers/<name>` when a user directory exists.
    pub fn resolve_server_path(&self) -> Option<PathBuf> {
        self.user_path()
            .map(|user| user.join("servers").join(&self.name))
    }

    /// Whether a `.war` or `.ear` sits directly inside `apps/` or `dropins/`.
    pub fn has_installed_apps(&self) -> Result<bool> {
        let Some(server_path) = self.resolve_server_path() else {
            return Ok(false);
        };
        for dir in APP_DIRS {
            if dir_contains_app(&server_path.join(dir))? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Replace `<root>/usr` with a symlink to `new_path`.
    ///
    /// An existing `configDropins` directory for this server is copied into
    /// `new_path` first so that generated fragments survive the swap. The
    /// sequence is remove-then-link and is not crash-atomic; a failure part
    /// way leaves whatever state was reached.
    pub fn relocate_user_directory(&self, new_path: &Path) -> Result<()> {
        let usr = self.install_root.join("usr");

        if !usr.is_symlink() {
            let dropins = usr
                .join("servers")
                .join(&self.name)
                .join("configDropins");
            if dropins.is_dir() {
                let target = new_path
                    .join("servers")
                    .join(&self.name)
                    .join("configDropins");
                copy_dir_recursive(&dropins, &target).with_context(|| {
                    format!(
                        "preserving configDropins '{}' in '{}'",
                        dropins.display(),
                        target.display()
                    )
                })?;
                debug!(from = %dropins.display(), to = %target.display(), "copied configDropins");
            }
        }

        replace_symlink(new_path, &usr).with_context(|| {
            format!(
                "relocating user directory '{}' to '{}'",
                usr.display(),
                new_path.display()
            )
        })?;
        info!(server = %self.name, user_dir = %new_path.display(), "relocated user directory");
        Ok(())
    }
}

/// `<root>/wlp/usr` if it is a directory, else `<root>/usr`, else `None`.
pub fn user_path(root: &Path) -> Option<PathBuf> {
    ["wlp/usr", "usr"]
        .iter()
        .map(|candidate| root.join(candidate))
        .find(|path| path.is_dir())
}

/// The only server directory under `<user>/servers`.
pub fn single_server_name(user_dir: &Path) -> Result<String> {
    let servers_dir = user_dir.join("servers");
    if !servers_dir.is_dir() {
        return Err(ProvisionError::ServerNotFound(servers_dir).into());
    }

    let mut names = Vec::new();
    for entry in fs::read_dir(&servers_dir)
        .with_context(|| format!("reading servers directory '{}'", servers_dir.display()))?
    {
        let entry = entry
            .with_context(|| format!("iterating servers directory '{}'", servers_dir.display()))?;
        if !entry.path().is_dir() {
            continue;
        }
        if let Some(name) = entry.file_name().to_str() {
            names.push(name.to_string());
        }
    }
    names.sort();

    match names.len() {
        0 => Err(ProvisionError::ServerNotFound(servers_dir).into()),
        1 => Ok(names.remove(0)),
        _ => Err(ProvisionError::AmbiguousServer {
            dir: servers_dir,
            candidates: names,
        }
        .into()),
    }
}

fn dir_contains_app(dir: &Path) -> Result<bool> {
    if !dir.is_dir() {
        return Ok(false);
    }
    for entry in
        fs::read_dir(dir).with_context(|| format!("reading directory '{}'", dir.display()))?
    {
        let entry = entry?;
        let is_app = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| APP_EXTENSIONS.contains(&ext));
        if is_app {
            return Ok(true);
        }
    }
    Ok(false)
}
