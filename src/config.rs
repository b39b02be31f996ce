use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::{AbsentMode, DefaultPolicy};
use crate::query::DEFAULT_RELOAD_PREFIX;
use crate::storage::SourceSpec;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {reason}")]
    Invalid { reason: String },
}

fn default_reload_prefix() -> String {
    DEFAULT_RELOAD_PREFIX.to_string()
}

fn default_bind() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 6060))
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

/// 启动配置（TOML）
///
/// ```toml
/// default_no_value = -1
/// default_no_order = 0
///
/// [source]
/// kind = "directory"
/// path = "/etc/enum-rank/enums"
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    pub source: SourceSpec,
    pub default_no_value: i64,
    pub default_no_order: i64,
    /// 字段名 reload 前缀，空串表示禁用
    #[serde(default = "default_reload_prefix")]
    pub reload_prefix: String,
    #[serde(default)]
    pub absent_mode: AbsentMode,
    #[serde(default)]
    pub server: ServerConfig,
}

impl Config {
    /// `~/.config/enum-rank/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("enum-rank").join("config.toml"))
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&text)?;
        tracing::debug!("Loaded config from {:?}", path);
        Ok(config)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// 只做形状校验；路径是否存在交给首次加载（SourceUnavailable）
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |reason: &str| ConfigError::Invalid {
            reason: reason.to_string(),
        };
        match &self.source {
            SourceSpec::Directory { path } if path.as_os_str().is_empty() => {
                Err(invalid("directory source needs a path"))
            }
            SourceSpec::File { path, .. } if path.as_os_str().is_empty() => {
                Err(invalid("file source needs a path"))
            }
            SourceSpec::File { name, .. } if name.is_empty() => {
                Err(invalid("file source needs an enumeration name"))
            }
            SourceSpec::Url { url, .. }
                if !(url.starts_with("http://") || url.starts_with("https://")) =>
            {
                Err(invalid("url source needs an http(s) url"))
            }
            SourceSpec::Url { timeout_secs: 0, .. } => {
                Err(invalid("url source timeout must be positive"))
            }
            _ => Ok(()),
        }
    }

    pub fn policy(&self) -> DefaultPolicy {
        DefaultPolicy::new(self.default_no_value, self.default_no_order)
    }
}
