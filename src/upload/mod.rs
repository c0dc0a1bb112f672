mod client;
mod metrics;
mod ndjson;
mod orchestrator;
mod reconciler;
mod selection;
mod task;
mod types;

pub use client::{batch_label, GradesClient};
pub use metrics::{format_duration, summarize, BatchMetrics};
pub use ndjson::{parse_line, LineBuffer};
pub use orchestrator::{run, run_batched, run_per_file, EventSender, UploadJob};
pub use reconciler::TaskBatch;
pub use selection::{collect_folder, describe, select_paths};
pub use task::UploadTask;
pub use types::{
    ProgressRecord, QueuedFile, SelectedFile, ServerProgress, TaskId, UploadEvent, UploadResponse,
};
