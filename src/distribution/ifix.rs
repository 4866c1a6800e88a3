//! Interim fix (ifix) discovery and installation.
//!
//! Ifixes are self-extracting jars applied with
//! `java -jar <ifix> --installLocation <runtime>`. They patch features that
//! must already be registered, so the server's features are installed in bulk
//! before the first ifix runs.

use anyhow::{Context, Result};
use serde::{Serialize, Serializer};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::config::InstallType;
use crate::exec::{Execution, Executor};
use crate::fsutil::sha256_file;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IFix {
    pub path: PathBuf,
    pub sha256: String,
}

impl IFix {
    pub fn load(path: PathBuf) -> Result<Self> {
        let sha256 = sha256_file(&path)?;
        Ok(Self { path, sha256 })
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

#[derive(Serialize)]
struct IFixFingerprint<'a> {
    name: String,
    sha256: &'a str,
}

/// Fingerprints carry the file name and content hash but not the directory,
/// so moving the ifixes between builds does not invalidate the cache.
impl Serialize for IFix {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        IFixFingerprint {
            name: self.file_name(),
            sha256: &self.sha256,
        }
        .serialize(serializer)
    }
}

/// `.jar` files directly inside `dir`, sorted by file name. A missing
/// directory means no ifixes.
pub fn find_ifixes(dir: &Path) -> Result<Vec<IFix>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut ifixes = Vec::new();
    for entry in
        fs::read_dir(dir).with_context(|| format!("reading ifix directory '{}'", dir.display()))?
    {
        let path = entry
            .with_context(|| format!("iterating ifix directory '{}'", dir.display()))?
            .path();
        if path.is_file() && path.extension().and_then(|ext| ext.to_str()) == Some("jar") {
            ifixes.push(IFix::load(path)?);
        }
    }
    ifixes.sort_by_key(IFix::file_name);
    Ok(ifixes)
}

/// `$JAVA_HOME/bin/java` if present, otherwise `java` from `PATH`.
pub fn locate_java() -> Result<PathBuf> {
    if let Some(home) = std::env::var_os("JAVA_HOME") {
        let java = PathBuf::from(home).join("bin/java");
        if java.is_file() {
            return Ok(java);
        }
    }
    which::which("java").context("locating java to install ifixes (set JAVA_HOME or add java to PATH)")
}

/// Installs ifixes into one runtime.
pub struct IFixInstaller<'a> {
    pub executor: &'a dyn Executor,
    pub install_type: InstallType,
    pub install_location: &'a Path,
    pub server_name: &'a str,
    pub java: &'a Path,
}

impl IFixInstaller<'_> {
    /// Bulk-install the server's features once, then apply each ifix in order.
    pub fn install(&self, ifixes: &[IFix]) -> Result<()> {
        if ifixes.is_empty() {
            return Ok(());
        }

        self.executor
            .execute(&self.feature_install_execution())
            .with_context(|| format!("installing features for server '{}'", self.server_name))?;

        for ifix in ifixes {
            let execution = Execution::new(self.java)
                .arg("-jar")
                .arg(ifix.path.to_string_lossy())
                .arg("--installLocation")
                .arg(self.install_location.to_string_lossy())
                .dir(self.install_location);
            self.executor
                .execute(&execution)
                .with_context(|| format!("installing ifix '{}'", ifix.path.display()))?;
            info!(ifix = %ifix.file_name(), "installed ifix");
        }
        Ok(())
    }

    fn feature_install_execution(&self) -> Execution {
        let bin = self.install_location.join("bin");
        let execution = match self.install_type {
            InstallType::OpenLiberty => Execution::new(bin.join("featureUtility"))
                .arg("installServerFeatures")
                .arg("--acceptLicense"),
            InstallType::WebSphereLiberty => Execution::new(bin.join("installUtility"))
                .arg("install")
                .arg("--acceptLicense"),
        };
        let execution = execution.arg(self.server_name).dir(self.install_location);
        match self.java.parent().and_then(Path::parent) {
            Some(home) if !home.as_os_str().is_empty() => {
                execution.env("JAVA_HOME", home.to_string_lossy())
            }
            _ => execution,
        }
    }
}
