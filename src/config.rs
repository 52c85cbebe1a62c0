//! Extender configuration.
//!
//! `ExtenderConfig` bundles the extender's constructor parameters
//! (`balanced_resource`, `allow_duplicates`, `own_namespace`) plus the
//! server's host/port; `load_config` is the ambient loader around it — an
//! optional TOML file merged with an environment-variable source via the
//! `config` crate.

use serde::Deserialize;
use std::path::PathBuf;

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ExtenderConfig {
    /// Resource name the card selector equalizes load across. Empty/absent
    /// means no balancing — preserve policy order instead.
    #[serde(default)]
    pub balanced_resource: Option<String>,
    /// Whether two containers of the same pod may be assigned the same
    /// card (resolved in `DESIGN.md`).
    #[serde(default)]
    pub allow_duplicates: bool,
    /// Vendor resource namespace prefix (e.g. `gpu.intel.com`), used both
    /// to restrict container requests and as the policy label prefix
    /// unless overridden separately.
    #[serde(default = "default_own_namespace")]
    pub own_namespace: String,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for ExtenderConfig {
    fn default() -> Self {
        Self {
            balanced_resource: None,
            allow_duplicates: false,
            own_namespace: default_own_namespace(),
            server: ServerConfig::default(),
        }
    }
}

fn default_own_namespace() -> String {
    "gpu.intel.com".to_string()
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    23456
}

/// The user config directory's `gas-extender` subdirectory, used when no
/// `--config` override is given.
pub fn default_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("gas-extender"))
}

/// Loads configuration from an optional user-provided TOML file, merged
/// with environment variables under the `GAS_` prefix (`GAS_SERVER_PORT`,
/// `GAS_BALANCED_RESOURCE`, ...). With no explicit path, falls back to
/// `<config dir>/gas-extender/config.toml` if present.
pub fn load_config(config_path: Option<&PathBuf>) -> Result<ExtenderConfig, config::ConfigError> {
    let mut sources = vec![];

    match config_path {
        Some(path) if path.exists() => sources.push(path.clone()),
        Some(path) => eprintln!("Warning: config file {path:?} not found."),
        None => {
            if let Some(default_path) = default_config_dir().map(|d| d.join("config.toml")) {
                if default_path.exists() {
                    sources.push(default_path);
                }
            }
        }
    }

    let settings = sources
        .iter()
        .fold(config::Config::builder(), |builder, path| {
            builder.add_source(config::File::from(path.as_path()))
        });

    settings
        .add_source(
            config::Environment::with_prefix("GAS")
                .separator("_")
                .try_parsing(true),
        )
        .build()?
        .try_deserialize()
}
