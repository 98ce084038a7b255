//! Configuration loading from disk.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use thiserror::Error;

use crate::config::schema::{RouterConfig, ServerConfig};
use crate::config::validation::{validate_server, ValidationError};
use crate::load_balancer::registry;

/// Suffix of server documents inside the servers directory.
pub const SERVER_FILE_SUFFIX: &str = ".proxy.toml";

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("parse error in {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("serialize error for server `{server}`: {source}")]
    Serialize {
        server: String,
        source: toml::ser::Error,
    },

    #[error("server `{0}` has no file name")]
    MissingFilename(String),

    #[error("validation failed: {}", join(.0))]
    Validation(Vec<ValidationError>),
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Source of server documents.
pub trait ConfigStore: Send + Sync {
    /// Every server document, newest first.
    fn load_server_configs(&self) -> ConfigResult<Vec<ServerConfig>>;

    /// Load and validate a single document.
    fn load_server(&self, path: &Path) -> ConfigResult<ServerConfig>;

    /// Persist a server to the file it was loaded from.
    fn save(&self, server: &ServerConfig) -> ConfigResult<PathBuf>;
}

/// True for paths named `*.proxy.toml`.
pub fn is_server_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.len() > SERVER_FILE_SUFFIX.len() && name.ends_with(SERVER_FILE_SUFFIX))
}

/// Directory of TOML server documents.
#[derive(Debug, Clone)]
pub struct TomlStore {
    dir: PathBuf,
}

impl TomlStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Server documents in the directory, newest modification first.
    pub fn server_files(&self) -> ConfigResult<Vec<PathBuf>> {
        let entries = fs::read_dir(&self.dir).map_err(|source| ConfigError::Io {
            path: self.dir.clone(),
            source,
        })?;

        let mut files: Vec<(SystemTime, PathBuf)> = entries
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| path.is_file() && is_server_file(path))
            .map(|path| {
                let modified = fs::metadata(&path)
                    .and_then(|meta| meta.modified())
                    .unwrap_or(SystemTime::UNIX_EPOCH);
                (modified, path)
            })
            .collect();

        files.sort_by(|(ma, pa), (mb, pb)| mb.cmp(ma).then_with(|| pa.cmp(pb)));
        Ok(files.into_iter().map(|(_, path)| path).collect())
    }
}

impl ConfigStore for TomlStore {
    fn load_server_configs(&self) -> ConfigResult<Vec<ServerConfig>> {
        let mut servers = Vec::new();
        for path in self.server_files()? {
            match self.load_server(&path) {
                Ok(server) => servers.push(server),
                Err(e) => {
                    tracing::error!(path = %path.display(), error = %e, "Skipping server file");
                }
            }
        }
        tracing::debug!(dir = %self.dir.display(), count = servers.len(), "Server files loaded");
        Ok(servers)
    }

    fn load_server(&self, path: &Path) -> ConfigResult<ServerConfig> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut server: ServerConfig =
            toml::from_str(&content).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;

        validate_server(&server).map_err(ConfigError::Validation)?;

        server.filename = path
            .file_name()
            .and_then(|name| name.to_str())
            .map(str::to_string);
        Ok(server)
    }

    fn save(&self, server: &ServerConfig) -> ConfigResult<PathBuf> {
        let filename = server
            .filename
            .as_deref()
            .ok_or_else(|| ConfigError::MissingFilename(server.id.clone()))?;
        let path = self.dir.join(filename);

        let content = toml::to_string_pretty(server).map_err(|source| ConfigError::Serialize {
            server: server.id.clone(),
            source,
        })?;

        let tmp = path.with_extension("tmp");
        let io_err = |source| ConfigError::Io {
            path: path.clone(),
            source,
        };
        fs::write(&tmp, content).map_err(io_err)?;
        fs::rename(&tmp, &path).map_err(io_err)?;

        tracing::info!(server = %server.id, path = %path.display(), "Server saved");
        Ok(path)
    }
}

/// Load the process configuration from a TOML file.
pub fn load_router_config(path: &Path) -> ConfigResult<RouterConfig> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let config: RouterConfig = toml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;

    if !registry().contains(&config.scheduling.code) {
        return Err(ConfigError::Validation(vec![ValidationError::UnknownScheduling {
            scope: "router".to_string(),
            code: config.scheduling.code.clone(),
        }]));
    }

    Ok(config)
}
