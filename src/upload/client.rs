use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use futures_util::stream::{self, StreamExt};
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Client, Response};
use serde_json::Value;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::UploaderConfig;
use crate::error::UploadError;

use super::types::{SelectedFile, ServerProgress, UploadResponse};

const UPLOAD_PATH: &str = "api/grades/upload";
const PROGRESS_PATH: &str = "api/grades/progress";

/// Handle to the grades backend.
///
/// Built once from the config by whoever owns the upload runtime and passed
/// to every worker; cloning shares the underlying connection pool. Dropping
/// the last clone closes it. The first request must run inside a tokio
/// runtime.
#[derive(Debug, Clone)]
pub struct GradesClient {
    http: Client,
    upload_url: Url,
    progress_url: Url,
    chunk_size: usize,
}

impl GradesClient {
    pub fn new(config: &UploaderConfig) -> Result<Self, UploadError> {
        let mut base = config.server_url.trim().to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        let base = Url::parse(&base).map_err(|source| UploadError::InvalidUrl {
            url: config.server_url.clone(),
            source,
        })?;
        let join = |path: &str| {
            base.join(path).map_err(|source| UploadError::InvalidUrl {
                url: format!("{}{}", base, path),
                source,
            })
        };

        let http = Client::builder()
            .connect_timeout(config.connect_timeout())
            .build()
            .map_err(UploadError::ClientSetup)?;

        Ok(Self {
            http,
            upload_url: join(UPLOAD_PATH)?,
            progress_url: join(PROGRESS_PATH)?,
            chunk_size: config.chunk_size.max(1),
        })
    }

    pub fn upload_url(&self) -> &Url {
        &self.upload_url
    }

    /// Uploads one file as the multipart field `file` and returns the id the
    /// server assigned to it. `on_progress(sent, total)` fires as the body is
    /// pulled by the transport.
    pub async fn upload_file<F>(
        &self,
        file: &SelectedFile,
        on_progress: F,
    ) -> Result<String, UploadError>
    where
        F: Fn(u64, u64) + Send + Sync + 'static,
    {
        let data = read_file(file).await?;
        let total = data.len() as u64;
        let sent = Arc::new(AtomicU64::new(0));

        let body = self.progress_body(data, move |n| {
            let now = sent.fetch_add(n, Ordering::Relaxed) + n;
            on_progress(now, total);
        });
        let form = Form::new().part(
            "file",
            Part::stream_with_length(body, total).file_name(file.name.clone()),
        );

        info!("uploading {} ({} bytes)", file.name, total);
        let response = self
            .http
            .post(self.upload_url.clone())
            .multipart(form)
            .send()
            .await
            .map_err(|source| UploadError::Transport {
                file: file.name.clone(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(UploadError::Http {
                file: file.name.clone(),
                status,
            });
        }

        let text = response.text().await.map_err(|source| UploadError::Transport {
            file: file.name.clone(),
            source,
        })?;
        let parsed: UploadResponse =
            serde_json::from_str(&text).map_err(|source| UploadError::Parse {
                context: format!("upload response for {}", file.name),
                source,
            })?;

        match parsed.file_id {
            Some(id) if !id.is_empty() => {
                debug!("{} accepted as {}", file.name, id);
                Ok(id)
            }
            _ => Err(UploadError::MissingFileId {
                file: file.name.clone(),
            }),
        }
    }

    /// Sends every file in one request, each as a repeated `files` field, and
    /// hands back the response so its body can be streamed. Progress is
    /// reported over the combined size of all files.
    pub async fn upload_batch<F>(
        &self,
        files: &[SelectedFile],
        on_progress: F,
    ) -> Result<Response, UploadError>
    where
        F: Fn(u64, u64) + Send + Sync + 'static,
    {
        let label = batch_label(files);
        let mut contents = Vec::with_capacity(files.len());
        for file in files {
            contents.push(read_file(file).await?);
        }

        let total: u64 = contents.iter().map(|c| c.len() as u64).sum();
        let sent = Arc::new(AtomicU64::new(0));
        let on_progress = Arc::new(on_progress);

        let mut form = Form::new();
        for (file, data) in files.iter().zip(contents) {
            let len = data.len() as u64;
            let sent = Arc::clone(&sent);
            let on_progress = Arc::clone(&on_progress);
            let body = self.progress_body(data, move |n| {
                let now = sent.fetch_add(n, Ordering::Relaxed) + n;
                on_progress(now, total);
            });
            form = form.part(
                "files",
                Part::stream_with_length(body, len).file_name(file.name.clone()),
            );
        }

        info!("uploading batch of {} files ({} bytes)", files.len(), total);
        let response = self
            .http
            .post(self.upload_url.clone())
            .multipart(form)
            .send()
            .await
            .map_err(|source| UploadError::Transport {
                file: label.clone(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(UploadError::Http { file: label, status });
        }
        Ok(response)
    }

    /// Fetches the server's processing list. Entries that do not parse are
    /// logged and dropped; a `null` body is an empty list.
    pub async fn fetch_progress(&self) -> Result<Vec<ServerProgress>, UploadError> {
        let response = self
            .http
            .get(self.progress_url.clone())
            .send()
            .await
            .and_then(Response::error_for_status)
            .map_err(UploadError::Poll)?;

        let text = response.text().await.map_err(UploadError::Poll)?;
        let raw: Option<Vec<Value>> =
            serde_json::from_str(&text).map_err(|source| UploadError::Parse {
                context: "progress response".to_string(),
                source,
            })?;

        Ok(raw
            .unwrap_or_default()
            .into_iter()
            .filter_map(|value| match serde_json::from_value::<ServerProgress>(value) {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!("skipping malformed progress entry: {}", e);
                    None
                }
            })
            .collect())
    }

    /// Wraps the file contents in a body that calls `on_chunk` with the size
    /// of every chunk the transport pulls.
    fn progress_body<F>(&self, data: Bytes, on_chunk: F) -> Body
    where
        F: Fn(u64) + Send + Sync + 'static,
    {
        let chunks: Vec<Bytes> = (0..data.len())
            .step_by(self.chunk_size)
            .map(|start| data.slice(start..(start + self.chunk_size).min(data.len())))
            .collect();

        let stream = stream::iter(chunks).map(move |chunk| {
            on_chunk(chunk.len() as u64);
            Ok::<Bytes, std::io::Error>(chunk)
        });
        Body::wrap_stream(stream)
    }
}

async fn read_file(file: &SelectedFile) -> Result<Bytes, UploadError> {
    tokio::fs::read(&file.path)
        .await
        .map(Bytes::from)
        .map_err(|source| UploadError::Io {
            path: file.path.clone(),
            source,
        })
}

/// Names used in batch-wide error messages.
pub fn batch_label(files: &[SelectedFile]) -> String {
    files
        .iter()
        .map(|f| f.name.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}
