use std::path::PathBuf;

use reqwest::StatusCode;
use thiserror::Error;

/// Failures surfaced while uploading grade files or polling their progress.
#[derive(Debug, Error)]
pub enum UploadError {
    /// The request never produced a response.
    #[error("Network error occurred during upload of file {file}: {source}")]
    Transport {
        file: String,
        #[source]
        source: reqwest::Error,
    },

    /// The server answered with a non-2xx status.
    #[error("Upload failed for file {file} with status {status}")]
    Http { file: String, status: StatusCode },

    #[error("failed to parse {context}: {source}")]
    Parse {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("server accepted {file} but returned no file id")]
    MissingFileId { file: String },

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid url {url:?}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("failed to build http client: {0}")]
    ClientSetup(#[source] reqwest::Error),

    #[error("progress request failed: {0}")]
    Poll(#[source] reqwest::Error),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}
