//! Compiled application source: an exploded WAR or EAR at the root.

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use super::BuildSource;
use crate::config::LIBERTY_APP_SERVER;

pub const DEFAULT_SERVER_NAME: &str = "defaultServer";

const MANIFEST_PATH: &str = "META-INF/MANIFEST.MF";
const MAIN_CLASS: &str = "Main-Class";

#[derive(Debug, Clone)]
pub struct AppSource {
    root: PathBuf,
    requested_server: Option<String>,
    server_name: Option<String>,
}

impl AppSource {
    pub fn new(
        root: impl Into<PathBuf>,
        requested_server: Option<String>,
        server_name: Option<String>,
    ) -> Self {
        Self {
            root: root.into(),
            requested_server,
            server_name,
        }
    }

    fn declares_main_class(&self) -> Result<bool> {
        let path = self.root.join(MANIFEST_PATH);
        if !path.is_file() {
            return Ok(false);
        }
        let contents = fs::read_to_string(&path)
            .with_context(|| format!("reading manifest '{}'", path.display()))?;
        Ok(parse_manifest(&contents)
            .get(MAIN_CLASS)
            .is_some_and(|value| !value.is_empty()))
    }
}

impl BuildSource for AppSource {
    fn name(&self) -> &str {
        "application"
    }

    /// False when another server type was requested or the manifest names a
    /// `Main-Class` (a runnable jar, not a deployable archive).
    fn detect(&self) -> Result<bool> {
        if self
            .requested_server
            .as_deref()
            .is_some_and(|server| !server.eq_ignore_ascii_case(LIBERTY_APP_SERVER))
        {
            return Ok(false);
        }
        Ok(!self.declares_main_class()?)
    }

    fn default_server_name(&self) -> Result<String> {
        Ok(self
            .server_name
            .clone()
            .unwrap_or_else(|| DEFAULT_SERVER_NAME.to_string()))
    }

    fn validate_app(&self) -> Result<bool> {
        Ok(self.root.join("WEB-INF").is_dir()
            || self.root.join("META-INF/application.xml").is_file())
    }
}

/// Parse the main section of a JAR manifest.
///
/// Lines are `Key: value`; a line starting with a single space continues the
/// previous value. Parsing stops at the first blank line.
pub fn parse_manifest(contents: &str) -> BTreeMap<String, String> {
    let mut attributes = BTreeMap::new();
    let mut current: Option<(String, String)> = None;

    for line in contents.lines() {
        let line = line.trim_end_matches('\r');
        if let Some(continuation) = line.strip_prefix(' ') {
            if let Some((_, value)) = current.as_mut() {
                value.push_str(continuation);
            }
            continue;
        }
        if let Some((key, value)) = current.take() {
            attributes.insert(key, value);
        }
        if line.is_empty() {
            break;
        }
        if let Some((key, value)) = line.split_once(':') {
            current = Some((key.trim().to_string(), value.trim().to_string()));
        }
    }
    if let Some((key, value)) = current {
        attributes.insert(key, value);
    }

    attributes
}
