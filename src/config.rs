use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::ConfigError;

/// Env var pointing at an explicit config file.
pub const CONFIG_PATH_ENV: &str = "GRADE_UPLOADER_CONFIG";

/// Env var overriding `server_url`.
pub const SERVER_URL_ENV: &str = "GRADE_UPLOADER_SERVER_URL";

/// Interval between progress queries in per-file mode.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 750;

/// Size of each upload body chunk (64 KB).
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Which upload strategy a batch is sent with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UploadMode {
    /// One request for the whole batch; processing progress streams back as
    /// newline-delimited JSON on the same response.
    #[default]
    Batched,
    /// One request per file, then periodic polling of the progress endpoint.
    /// Fallback for servers or proxies that buffer streamed responses.
    PerFile,
}

impl UploadMode {
    pub fn label(&self) -> &'static str {
        match self {
            UploadMode::Batched => "batched stream",
            UploadMode::PerFile => "per-file with polling",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UploaderConfig {
    /// Base URL of the grades backend, e.g. `http://localhost:9000`.
    pub server_url: String,
    pub mode: UploadMode,
    pub poll_interval_ms: u64,
    /// Glob applied to file names when a whole folder is selected.
    pub file_pattern: String,
    pub chunk_size: usize,
    pub connect_timeout_secs: u64,
    /// Admin console shown in the footer, if any.
    pub console_url: Option<String>,
}

impl Default for UploaderConfig {
    fn default() -> Self {
        Self {
            server_url: "http://localhost:9000".to_string(),
            mode: UploadMode::default(),
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            file_pattern: "*.csv".to_string(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            connect_timeout_secs: 10,
            console_url: None,
        }
    }
}

impl UploaderConfig {
    /// Loads the config from the default location, falling back to defaults
    /// when no file exists. `GRADE_UPLOADER_SERVER_URL` wins over the file.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match Self::config_path() {
            Some(path) if path.exists() => Self::from_file(&path)?,
            Some(path) => {
                debug!("no config at {}, using defaults", path.display());
                Self::default()
            }
            None => Self::default(),
        };

        if let Ok(url) = env::var(SERVER_URL_ENV) {
            if !url.trim().is_empty() {
                info!("server url overridden from {}", SERVER_URL_ENV);
                config.server_url = url.trim().to_string();
            }
        }

        config.validate()?;
        Ok(config)
    }

    pub fn config_path() -> Option<PathBuf> {
        if let Ok(path) = env::var(CONFIG_PATH_ENV) {
            return Some(PathBuf::from(path));
        }
        dirs::config_dir().map(|dir| dir.join("grade-uploader").join("config.toml"))
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        info!("reading config from {}", path.display());
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: UploaderConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        url::Url::parse(&self.server_url).map_err(|e| {
            ConfigError::Invalid(format!("server_url {:?}: {}", self.server_url, e))
        })?;
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "poll_interval_ms must be greater than zero".to_string(),
            ));
        }
        if self.chunk_size == 0 {
            return Err(ConfigError::Invalid(
                "chunk_size must be greater than zero".to_string(),
            ));
        }
        glob::Pattern::new(&self.file_pattern).map_err(|e| {
            ConfigError::Invalid(format!("file_pattern {:?}: {}", self.file_pattern, e))
        })?;
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}
