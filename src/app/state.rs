use std::sync::mpsc::{self, Receiver, TryRecvError};

use derivative::Derivative;
use tracing::{debug, info, warn};

use crate::upload::{
    summarize, BatchMetrics, EventSender, QueuedFile, SelectedFile, TaskBatch, UploadEvent,
};

pub const CLOSE_WHILE_UPLOADING: &str =
    "Please wait until all uploads and processing are finished before closing.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub text: String,
}

/// Everything the upload window shows. Lives on the UI thread, which is the
/// only place batches are replaced.
#[derive(Derivative)]
#[derivative(Debug, Default)]
pub struct UploadSession {
    pub batch: TaskBatch,
    pub uploading: bool,
    pub dialog_open: bool,
    pub notices: Vec<Notice>,
    #[derivative(Debug = "ignore")]
    event_receiver: Option<Receiver<UploadEvent>>,
}

impl UploadSession {
    pub fn open_dialog(&mut self) {
        self.dialog_open = true;
    }

    pub fn can_start(&self) -> bool {
        !self.uploading && !self.batch.is_empty() && self.batch.tasks().iter().all(|t| {
            t.upload_start.is_none() && !t.is_settled()
        })
    }

    /// Replaces the current batch with a fresh one. Refused mid-upload.
    pub fn select(&mut self, files: Vec<SelectedFile>) -> bool {
        if self.uploading {
            self.warn("Files cannot be changed while an upload is in progress.");
            return false;
        }
        info!("selected {} files", files.len());
        self.batch = TaskBatch::from_selection(files);
        self.notices.clear();
        self.event_receiver = None;
        true
    }

    /// Marks the batch as uploading and hands back what the worker needs.
    pub fn begin(&mut self) -> Option<(Vec<QueuedFile>, EventSender)> {
        if !self.can_start() {
            debug!("start ignored: nothing to upload or already running");
            return None;
        }
        let (sender, receiver) = mpsc::channel();
        self.event_receiver = Some(receiver);
        self.uploading = true;
        self.notices.clear();
        Some((self.batch.queued(), sender))
    }

    /// Applies every event waiting on the channel. Returns whether anything
    /// changed.
    pub fn drain_events(&mut self) -> bool {
        let mut events = Vec::new();
        let mut disconnected = false;

        if let Some(receiver) = &self.event_receiver {
            loop {
                match receiver.try_recv() {
                    Ok(event) => events.push(event),
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        disconnected = true;
                        break;
                    }
                }
            }
        }

        let had_updates = !events.is_empty();
        for event in &events {
            self.apply(event);
        }

        if disconnected {
            debug!("upload worker channel closed");
            self.event_receiver = None;
            if self.uploading {
                // The worker is gone; whatever it did not report will never come.
                self.apply(&UploadEvent::BatchFailed {
                    error: "upload worker stopped unexpectedly".to_string(),
                });
            }
        }
        had_updates || disconnected
    }

    pub fn apply(&mut self, event: &UploadEvent) {
        let next = self.batch.apply(event);

        let failures: Vec<String> = self
            .batch
            .tasks()
            .iter()
            .zip(next.tasks())
            .filter(|(before, _)| before.error.is_none())
            .filter_map(|(_, after)| {
                let error = after.error.as_ref()?;
                Some(if error.contains(&after.name) {
                    error.clone()
                } else {
                    format!("{}: {}", after.name, error)
                })
            })
            .collect();
        for text in failures {
            self.push(NoticeLevel::Error, text);
        }
        self.batch = next;

        if self.uploading && self.batch.all_settled() {
            self.uploading = false;
            let failed = self.batch.tasks().iter().filter(|t| t.is_failed()).count();
            let processed = self.batch.len() - failed;
            info!("batch settled: {} processed, {} failed", processed, failed);
            let level = if failed > 0 {
                NoticeLevel::Warning
            } else {
                NoticeLevel::Info
            };
            self.push(
                level,
                format!("Import finished: {} processed, {} failed", processed, failed),
            );
        }
    }

    /// Decides whether a request to close the whole app must be cancelled.
    /// While uploading the dialog is brought back with a warning.
    pub fn should_cancel_app_close(&mut self) -> bool {
        if !self.uploading {
            return false;
        }
        self.open_dialog();
        self.warn(CLOSE_WHILE_UPLOADING);
        true
    }

    /// Closes the window and discards the batch, unless uploads are still
    /// running, in which case a warning is shown instead.
    pub fn request_close(&mut self) -> bool {
        if self.uploading {
            self.warn(CLOSE_WHILE_UPLOADING);
            return false;
        }
        self.dialog_open = false;
        self.batch = TaskBatch::default();
        self.notices.clear();
        self.event_receiver = None;
        true
    }

    pub fn metrics(&self) -> BatchMetrics {
        summarize(self.batch.tasks())
    }

    pub fn warn(&mut self, text: &str) {
        warn!("{}", text);
        self.push(NoticeLevel::Warning, text.to_string());
    }

    fn push(&mut self, level: NoticeLevel, text: String) {
        if !self.notices.iter().any(|n| n.text == text) {
            self.notices.push(Notice { level, text });
        }
    }
}
