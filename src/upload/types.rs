use std::fmt;
use std::path::PathBuf;
use std::time::Instant;

use serde::{Deserialize, Serialize};

/// Stable key of a task within the UI, assigned when files are selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A file picked by the user, before any upload state exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedFile {
    pub path: PathBuf,
    pub name: String,
    pub size_bytes: u64,
}

/// A file handed to an upload worker, tagged with the task it feeds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedFile {
    pub task: TaskId,
    pub file: SelectedFile,
}

/// Body of a successful per-file upload.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UploadResponse {
    pub file_id: Option<String>,
}

/// One entry of the progress endpoint's list.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ServerProgress {
    pub file_id: String,
    #[serde(default)]
    pub records_processed: u64,
    /// Percentage; the server reports `-1` when processing failed.
    pub progress: f32,
}

/// One line of the batched upload's streamed response.
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressRecord {
    /// Position of the file in the uploaded batch.
    pub file_index: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processing_progress: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processing_complete: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub records_processed: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Signals produced by upload workers, stamped with the moment they were
/// observed. Only the UI thread folds them into task state.
#[derive(Debug, Clone)]
pub enum UploadEvent {
    /// Byte progress of a single file's request.
    UploadProgress {
        task: TaskId,
        percent: f32,
        at: Instant,
    },
    /// Byte progress of the whole batch request, applied to every task.
    BatchUploadProgress { percent: f32, at: Instant },
    /// The server acknowledged a file and assigned it an id.
    FileAccepted {
        task: TaskId,
        file_id: String,
        at: Instant,
    },
    /// A polled progress list.
    ServerProgress {
        entries: Vec<ServerProgress>,
        at: Instant,
    },
    /// A streamed progress line.
    Record { record: ProgressRecord, at: Instant },
    TaskFailed { task: TaskId, error: String },
    /// The batch request failed as a whole.
    BatchFailed { error: String },
    /// The batch response ended.
    StreamClosed,
}
