use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Optional per-application config file, read before the environment.
pub const CONFIG_FILENAME: &str = "liberty-builder.toml";

pub const ENV_APP_SERVER: &str = "BP_JAVA_APP_SERVER";
pub const ENV_SERVER_NAME: &str = "BP_LIBERTY_SERVER_NAME";
pub const ENV_PROFILE: &str = "BP_LIBERTY_PROFILE";
pub const ENV_INSTALL_TYPE: &str = "BP_LIBERTY_INSTALL_TYPE";
pub const ENV_EXT_CONF_ARCHIVE: &str = "BP_LIBERTY_EXT_CONF_ARCHIVE";
pub const ENV_IFIXES_DIR: &str = "BP_LIBERTY_IFIXES_DIR";
pub const ENV_CONFIG_DIR: &str = "BP_LIBERTY_CONFIG_DIR";

pub const DEFAULT_PROFILE: &str = "full";
/// Application-relative directory holding `features.toml` and `ifixes/`.
pub const DEFAULT_CONFIG_DIR: &str = "liberty";

/// Server type this crate provisions, as named by `BP_JAVA_APP_SERVER`.
pub const LIBERTY_APP_SERVER: &str = "liberty";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallType {
    OpenLiberty,
    WebSphereLiberty,
}

impl InstallType {
    fn parse(raw: &str, origin: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "ol" => Ok(InstallType::OpenLiberty),
            "wlp" => Ok(InstallType::WebSphereLiberty),
            other => bail!(
                "invalid {}: unsupported install type '{}' (expected 'ol' or 'wlp')",
                origin,
                other
            ),
        }
    }
}

impl fmt::Display for InstallType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstallType::OpenLiberty => write!(f, "ol"),
            InstallType::WebSphereLiberty => write!(f, "wlp"),
        }
    }
}

/// Build-time settings with their defaults applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildConfig {
    /// Requested server type; `None` when the user did not pick one.
    pub app_server: Option<String>,
    /// Pinned server name; `None` lets the build source decide.
    pub server_name: Option<String>,
    pub profile: String,
    pub install_type: InstallType,
    /// Already-fetched external configuration archive.
    pub ext_conf_archive: Option<PathBuf>,
    /// Resolution base for the application's `features.toml`.
    pub config_dir: PathBuf,
    pub ifixes_dir: PathBuf,
}

impl BuildConfig {
    /// Defaults for an application rooted at `app_root`.
    pub fn defaults(app_root: &Path) -> Self {
        let config_dir = app_root.join(DEFAULT_CONFIG_DIR);
        Self {
            app_server: None,
            server_name: None,
            profile: DEFAULT_PROFILE.to_string(),
            install_type: InstallType::OpenLiberty,
            ext_conf_archive: None,
            ifixes_dir: config_dir.join("ifixes"),
            config_dir,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigToml {
    #[serde(default)]
    liberty: LibertyToml,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct LibertyToml {
    app_server: Option<String>,
    server_name: Option<String>,
    profile: Option<String>,
    install_type: Option<String>,
    ext_conf_archive: Option<String>,
    config_dir: Option<String>,
    ifixes_dir: Option<String>,
}

impl BuildConfig {
    /// Resolve from `<app_root>/liberty-builder.toml` and the process environment.
    pub fn load(app_root: &Path) -> Result<Self> {
        Self::resolve(app_root, |key| std::env::var(key).ok())
    }

    /// Resolve with an explicit environment lookup. Environment values
    /// override the file; empty values count as unset.
    pub fn resolve(app_root: &Path, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let file = load_config_file(app_root)?;
        let lookup = |key: &str, from_file: Option<String>| {
            non_empty(env(key)).or_else(|| non_empty(from_file))
        };

        let mut config = BuildConfig {
            app_server: lookup(ENV_APP_SERVER, file.app_server),
            server_name: lookup(ENV_SERVER_NAME, file.server_name),
            ..BuildConfig::defaults(app_root)
        };
        if let Some(profile) = lookup(ENV_PROFILE, file.profile) {
            config.profile = profile;
        }
        if let Some(raw) = lookup(ENV_INSTALL_TYPE, file.install_type) {
            config.install_type = InstallType::parse(&raw, ENV_INSTALL_TYPE)?;
        }
        config.ext_conf_archive =
            lookup(ENV_EXT_CONF_ARCHIVE, file.ext_conf_archive).map(|p| resolve_path(app_root, &p));
        if let Some(dir) = lookup(ENV_CONFIG_DIR, file.config_dir) {
            config.config_dir = resolve_path(app_root, &dir);
            config.ifixes_dir = config.config_dir.join("ifixes");
        }
        if let Some(dir) = lookup(ENV_IFIXES_DIR, file.ifixes_dir) {
            config.ifixes_dir = resolve_path(app_root, &dir);
        }

        Ok(config)
    }

    /// Name of the runtime layer, e.g. `ol-runtime-full`.
    pub fn runtime_layer_name(&self) -> String {
        format!("{}-runtime-{}", self.install_type, self.profile)
    }
}

fn load_config_file(app_root: &Path) -> Result<LibertyToml> {
    let path = app_root.join(CONFIG_FILENAME);
    if !path.is_file() {
        return Ok(LibertyToml::default());
    }
    let contents = fs::read_to_string(&path)
        .with_context(|| format!("reading build config '{}'", path.display()))?;
    let parsed: ConfigToml = toml::from_str(&contents)
        .with_context(|| format!("parsing build config '{}'", path.display()))?;
    Ok(parsed.liberty)
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn resolve_path(app_root: &Path, path: &str) -> PathBuf {
    let candidate = Path::new(path);
    if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        app_root.join(candidate)
    }
}
