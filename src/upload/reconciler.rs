use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, warn};

use super::task::UploadTask;
use super::types::{ProgressRecord, QueuedFile, SelectedFile, ServerProgress, TaskId, UploadEvent};

/// Immutable snapshot of every task in one upload batch.
///
/// Applying an event never mutates a snapshot in place: it builds the next
/// collection, sharing nothing mutable with the previous one, so a renderer
/// holding an older snapshot always sees a consistent view.
#[derive(Debug, Clone, Default)]
pub struct TaskBatch {
    tasks: Arc<Vec<UploadTask>>,
}

impl TaskBatch {
    /// Starts a fresh batch from a selection. Tasks keep the selection order,
    /// which is also the `fileIndex` order of a batched upload.
    pub fn from_selection(files: Vec<SelectedFile>) -> Self {
        Self {
            tasks: Arc::new(files.into_iter().map(UploadTask::new).collect()),
        }
    }

    pub fn tasks(&self) -> &[UploadTask] {
        &self.tasks
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn get(&self, id: TaskId) -> Option<&UploadTask> {
        self.tasks.iter().find(|t| t.id == id)
    }

    /// Files to send, in batch order.
    pub fn queued(&self) -> Vec<QueuedFile> {
        self.tasks
            .iter()
            .map(|t| QueuedFile {
                task: t.id,
                file: SelectedFile {
                    path: t.path.clone(),
                    name: t.name.clone(),
                    size_bytes: t.size_bytes,
                },
            })
            .collect()
    }

    /// True once every task has either finished processing or failed.
    pub fn all_settled(&self) -> bool {
        self.tasks.iter().all(UploadTask::is_settled)
    }

    pub fn any_needs_polling(&self) -> bool {
        self.tasks.iter().any(UploadTask::needs_polling)
    }

    /// Folds one worker event into the batch and returns the next snapshot.
    pub fn apply(&self, event: &UploadEvent) -> TaskBatch {
        match event {
            UploadEvent::UploadProgress { task, percent, at } => {
                self.replace(*task, |t| t.with_upload_progress(*percent, *at))
            }
            UploadEvent::BatchUploadProgress { percent, at } => {
                self.map_all(|t| t.with_upload_progress(*percent, *at))
            }
            UploadEvent::FileAccepted { task, file_id, at } => {
                self.replace(*task, |t| t.with_server_file_id(file_id.clone(), *at))
            }
            UploadEvent::ServerProgress { entries, at } => self.merge_polled(entries, *at),
            UploadEvent::Record { record, at } => self.apply_record(record, *at),
            UploadEvent::TaskFailed { task, error } => {
                self.replace(*task, |t| t.failed(error.clone()))
            }
            UploadEvent::BatchFailed { error } => self.map_all(|t| t.failed(error.clone())),
            UploadEvent::StreamClosed => {
                self.map_all(|t| t.failed("stream ended before processing completed".to_string()))
            }
        }
    }

    fn replace<F>(&self, id: TaskId, update: F) -> TaskBatch
    where
        F: FnOnce(UploadTask) -> UploadTask,
    {
        let Some(pos) = self.tasks.iter().position(|t| t.id == id) else {
            debug!("ignoring signal for unknown task {}", id);
            return self.clone();
        };
        self.replace_at(pos, update)
    }

    fn replace_at<F>(&self, pos: usize, update: F) -> TaskBatch
    where
        F: FnOnce(UploadTask) -> UploadTask,
    {
        let mut tasks: Vec<UploadTask> = self.tasks.as_ref().clone();
        let current = tasks[pos].clone();
        tasks[pos] = update(current);
        TaskBatch {
            tasks: Arc::new(tasks),
        }
    }

    fn map_all<F>(&self, update: F) -> TaskBatch
    where
        F: Fn(UploadTask) -> UploadTask,
    {
        TaskBatch {
            tasks: Arc::new(self.tasks.iter().cloned().map(update).collect()),
        }
    }

    /// Matches polled entries to tasks by server id. Tasks without a matching
    /// entry are left untouched.
    fn merge_polled(&self, entries: &[ServerProgress], at: Instant) -> TaskBatch {
        self.map_all(|task| {
            let entry = task
                .server_file_id
                .as_deref()
                .and_then(|id| entries.iter().find(|e| e.file_id == id));
            match entry {
                Some(entry) => {
                    task.with_processing_progress(entry.progress, Some(entry.records_processed), at)
                }
                None => task,
            }
        })
    }

    fn apply_record(&self, record: &ProgressRecord, at: Instant) -> TaskBatch {
        if record.file_index >= self.tasks.len() {
            warn!(
                "progress record for file index {} but batch has {} files, skipping",
                record.file_index,
                self.tasks.len()
            );
            return self.clone();
        }

        self.replace_at(record.file_index, |mut task| {
            if let Some(error) = &record.error {
                return task.failed(error.clone());
            }
            if let Some(percent) = record.processing_progress {
                task = task.with_processing_progress(percent, record.records_processed, at);
            } else if record.records_processed.is_some() {
                let percent = task.process_progress;
                task = task.with_processing_progress(percent, record.records_processed, at);
            }
            if record.processing_complete == Some(true) {
                task = task.with_processing_complete(at);
            }
            task
        })
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::time::Duration;

    use super::*;

    fn batch(names: &[&str]) -> TaskBatch {
        TaskBatch::from_selection(
            names
                .iter()
                .map(|name| SelectedFile {
                    path: PathBuf::from(name),
                    name: name.to_string(),
                    size_bytes: 100,
                })
                .collect(),
        )
    }

    fn secs(t0: Instant, s: f64) -> Instant {
        t0 + Duration::from_secs_f64(s)
    }

    #[test]
    fn apply_returns_new_snapshot_and_leaves_old_one_alone() {
        let t0 = Instant::now();
        let before = batch(&["a.csv", "b.csv"]);
        let id = before.tasks()[0].id;

        let after = before.apply(&UploadEvent::UploadProgress {
            task: id,
            percent: 50.0,
            at: t0,
        });

        assert_eq!(before.tasks()[0].upload_progress, 0.0);
        assert_eq!(after.tasks()[0].upload_progress, 50.0);
        assert_eq!(after.tasks()[1], before.tasks()[1]);
    }

    #[test]
    fn batch_upload_progress_moves_every_task() {
        let t0 = Instant::now();
        let b = batch(&["a.csv", "b.csv", "c.csv"]).apply(&UploadEvent::BatchUploadProgress {
            percent: 100.0,
            at: t0,
        });
        assert!(b.tasks().iter().all(|t| t.upload_end == Some(t0)));
    }

    #[test]
    fn polled_entries_match_by_server_id() {
        let t0 = Instant::now();
        let b = batch(&["a.csv", "b.csv"]);
        let a = b.tasks()[0].id;
        let b = b.apply(&UploadEvent::FileAccepted {
            task: a,
            file_id: "abc".to_string(),
            at: t0,
        });

        let b = b.apply(&UploadEvent::ServerProgress {
            entries: vec![
                ServerProgress {
                    file_id: "zzz".to_string(),
                    records_processed: 3,
                    progress: 90.0,
                },
                ServerProgress {
                    file_id: "abc".to_string(),
                    records_processed: 500,
                    progress: 50.0,
                },
            ],
            at: secs(t0, 0.75),
        });

        assert_eq!(b.tasks()[0].process_progress, 50.0);
        assert_eq!(b.tasks()[0].records_processed, Some(500));
        assert_eq!(b.tasks()[1].process_progress, 0.0);
        assert!(b.any_needs_polling());
    }

    #[test]
    fn record_with_error_fails_only_that_task() {
        let t0 = Instant::now();
        let b = batch(&["a.csv", "b.csv"]).apply(&UploadEvent::Record {
            record: ProgressRecord {
                file_index: 1,
                error: Some("invalid grade value".to_string()),
                ..Default::default()
            },
            at: t0,
        });
        assert!(!b.tasks()[0].is_failed());
        assert_eq!(b.tasks()[1].error.as_deref(), Some("invalid grade value"));
    }

    #[test]
    fn out_of_range_record_is_skipped() {
        let t0 = Instant::now();
        let b = batch(&["a.csv"]);
        let after = b.apply(&UploadEvent::Record {
            record: ProgressRecord {
                file_index: 4,
                processing_complete: Some(true),
                ..Default::default()
            },
            at: t0,
        });
        assert_eq!(after.tasks(), b.tasks());
    }

    #[test]
    fn stream_closed_fails_only_unsettled_tasks() {
        let t0 = Instant::now();
        let b = batch(&["a.csv", "b.csv"])
            .apply(&UploadEvent::Record {
                record: ProgressRecord {
                    file_index: 0,
                    processing_complete: Some(true),
                    ..Default::default()
                },
                at: t0,
            })
            .apply(&UploadEvent::StreamClosed);

        assert!(b.tasks()[0].is_processed());
        assert!(!b.tasks()[0].is_failed());
        assert!(b.tasks()[1].is_failed());
        assert!(b.all_settled());
    }

    #[test]
    fn reapplying_the_same_record_is_idempotent() {
        let t0 = Instant::now();
        let event = UploadEvent::Record {
            record: ProgressRecord {
                file_index: 0,
                processing_progress: Some(30.0),
                ..Default::default()
            },
            at: t0,
        };
        let once = batch(&["a.csv"]).apply(&event);
        let twice = once.apply(&event);
        assert_eq!(once.tasks(), twice.tasks());
    }

    #[test]
    fn unknown_task_id_is_ignored() {
        let t0 = Instant::now();
        let b = batch(&["a.csv"]);
        let after = b.apply(&UploadEvent::UploadProgress {
            task: TaskId(u64::MAX),
            percent: 10.0,
            at: t0,
        });
        assert_eq!(after.tasks(), b.tasks());
    }
}
