use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

pub const CONFIG_FILE: &str = "ng911-docs.toml";
pub const CONFIG_ENV: &str = "NG911_DOCS_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", .path.display())]
    Io { path: PathBuf, source: io::Error },
    #[error("invalid configuration in {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// Sign-in handed over by the portal's identity provider.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IdentityConfig {
    pub username: Option<String>,
    pub token: Option<String>,
    pub expires_in: Option<i64>,
    pub groups: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Directory holding the generated HTML pages.
    pub docs_dir: PathBuf,
    pub storage_path: PathBuf,
    pub search_index: PathBuf,
    pub log_file: PathBuf,
    pub identity: IdentityConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            docs_dir: PathBuf::from("docs"),
            storage_path: PathBuf::from(".ng911-docs/storage.json"),
            search_index: PathBuf::from("docs/search-index.json"),
            log_file: PathBuf::from(".ng911-docs/editor.log"),
            identity: IdentityConfig::default(),
        }
    }
}

impl Config {
    /// Loads from `NG911_DOCS_CONFIG` or `ng911-docs.toml`. A missing file
    /// means defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let path = env::var_os(CONFIG_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(CONFIG_FILE));
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        Self::parse(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn parse(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    pub fn page_path(&self, file: &str) -> PathBuf {
        self.docs_dir.join(file)
    }
}
