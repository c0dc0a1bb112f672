use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use super::types::{SelectedFile, TaskId};

static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(1);

fn next_task_id() -> TaskId {
    TaskId(NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed))
}

fn clamp_percent(percent: f32) -> f32 {
    if percent.is_nan() {
        0.0
    } else {
        percent.clamp(0.0, 100.0)
    }
}

/// Tracked state of one selected file.
///
/// Tasks are immutable values: every signal goes through one of the `with_*`
/// methods, which return the next version of the task. Timestamps are written
/// at most once and percentages never go backwards.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadTask {
    pub id: TaskId,
    pub name: String,
    pub path: PathBuf,
    pub size_bytes: u64,
    pub upload_progress: f32,
    pub process_progress: f32,
    pub upload_start: Option<Instant>,
    pub upload_end: Option<Instant>,
    pub processing_start: Option<Instant>,
    pub processing_end: Option<Instant>,
    pub server_file_id: Option<String>,
    pub records_processed: Option<u64>,
    pub error: Option<String>,
}

impl UploadTask {
    pub fn new(file: SelectedFile) -> Self {
        Self {
            id: next_task_id(),
            name: file.name,
            path: file.path,
            size_bytes: file.size_bytes,
            upload_progress: 0.0,
            process_progress: 0.0,
            upload_start: None,
            upload_end: None,
            processing_start: None,
            processing_end: None,
            server_file_id: None,
            records_processed: None,
            error: None,
        }
    }

    pub fn is_failed(&self) -> bool {
        self.error.is_some()
    }

    pub fn is_processed(&self) -> bool {
        self.processing_end.is_some()
    }

    /// Finished one way or the other; no further signal changes the task.
    pub fn is_settled(&self) -> bool {
        self.is_processed() || self.is_failed()
    }

    /// Has a server id and is still waiting on processing.
    pub fn needs_polling(&self) -> bool {
        self.server_file_id.is_some() && !self.is_settled()
    }

    /// Applies a byte-progress signal. The first signal stamps `upload_start`;
    /// reaching 100 stamps `upload_end`.
    pub fn with_upload_progress(self, percent: f32, at: Instant) -> Self {
        if self.is_failed() || self.upload_end.is_some() {
            return self;
        }

        let upload_progress = self.upload_progress.max(clamp_percent(percent));
        let upload_start = self.upload_start.or(Some(at));
        let upload_end = if upload_progress >= 100.0 {
            Some(at)
        } else {
            None
        };

        Self {
            upload_progress,
            upload_start,
            upload_end,
            ..self
        }
    }

    /// Records the id the server assigned to this file. Upload is complete by
    /// the time the server answers, so the upload phase is closed first and
    /// processing starts now.
    pub fn with_server_file_id(self, file_id: String, at: Instant) -> Self {
        if self.is_settled() {
            return self;
        }

        let task = self.with_upload_progress(100.0, at);
        Self {
            server_file_id: task.server_file_id.clone().or(Some(file_id)),
            processing_start: task.processing_start.or(Some(at)),
            ..task
        }
    }

    /// Applies a server-side processing signal. Negative percentages are the
    /// server's failure marker.
    pub fn with_processing_progress(
        self,
        percent: f32,
        records_processed: Option<u64>,
        at: Instant,
    ) -> Self {
        if self.is_settled() {
            return self;
        }
        if percent < 0.0 {
            return self.failed("server failed to process the file".to_string());
        }

        let process_progress = self.process_progress.max(clamp_percent(percent));
        let records_processed = match (self.records_processed, records_processed) {
            (Some(old), Some(new)) => Some(old.max(new)),
            (old, new) => new.or(old),
        };
        let processing_end = if process_progress >= 100.0 {
            Some(at)
        } else {
            None
        };

        Self {
            process_progress,
            records_processed,
            processing_start: self.processing_start.or(Some(at)),
            processing_end,
            ..self
        }
    }

    pub fn with_processing_complete(self, at: Instant) -> Self {
        self.with_processing_progress(100.0, None, at)
    }

    /// Marks the task failed. Settled tasks keep their outcome.
    pub fn failed(self, error: String) -> Self {
        if self.is_settled() {
            return self;
        }
        Self {
            error: Some(error),
            ..self
        }
    }

    pub fn upload_duration(&self) -> Option<Duration> {
        span(self.upload_start, self.upload_end)
    }

    pub fn processing_duration(&self) -> Option<Duration> {
        span(self.processing_start, self.processing_end)
    }

    pub fn total_duration(&self) -> Option<Duration> {
        span(self.upload_start, self.processing_end)
    }
}

fn span(start: Option<Instant>, end: Option<Instant>) -> Option<Duration> {
    end?.checked_duration_since(start?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task() -> UploadTask {
        UploadTask::new(SelectedFile {
            path: PathBuf::from("/tmp/grades.csv"),
            name: "grades.csv".to_string(),
            size_bytes: 2048,
        })
    }

    fn secs(t0: Instant, s: f64) -> Instant {
        t0 + Duration::from_secs_f64(s)
    }

    #[test]
    fn ids_are_unique() {
        assert_ne!(task().id, task().id);
    }

    #[test]
    fn upload_start_is_set_by_first_signal_only() {
        let t0 = Instant::now();
        let t = task()
            .with_upload_progress(10.0, secs(t0, 0.1))
            .with_upload_progress(40.0, secs(t0, 0.5));

        assert_eq!(t.upload_start, Some(secs(t0, 0.1)));
        assert_eq!(t.upload_progress, 40.0);
        assert_eq!(t.upload_end, None);
    }

    #[test]
    fn late_lower_upload_signal_is_ignored() {
        let t0 = Instant::now();
        let t = task()
            .with_upload_progress(100.0, secs(t0, 1.0))
            .with_upload_progress(60.0, secs(t0, 1.2));

        assert_eq!(t.upload_progress, 100.0);
        assert_eq!(t.upload_end, Some(secs(t0, 1.0)));
    }

    #[test]
    fn regression_before_completion_does_not_decrease_progress() {
        let t0 = Instant::now();
        let t = task()
            .with_upload_progress(70.0, secs(t0, 0.3))
            .with_upload_progress(20.0, secs(t0, 0.4));
        assert_eq!(t.upload_progress, 70.0);
    }

    #[test]
    fn out_of_range_percentages_are_clamped() {
        let t0 = Instant::now();
        let t = task().with_upload_progress(250.0, t0);
        assert_eq!(t.upload_progress, 100.0);
        assert_eq!(t.upload_end, Some(t0));
    }

    #[test]
    fn server_id_closes_upload_then_starts_processing() {
        let t0 = Instant::now();
        let t = task()
            .with_upload_progress(80.0, secs(t0, 0.5))
            .with_server_file_id("abc".to_string(), secs(t0, 1.0));

        assert_eq!(t.upload_end, Some(secs(t0, 1.0)));
        assert_eq!(t.processing_start, Some(secs(t0, 1.0)));
        assert!(t.processing_start >= t.upload_end);
        assert!(t.needs_polling());
    }

    #[test]
    fn processing_start_is_written_once() {
        let t0 = Instant::now();
        let t = task()
            .with_server_file_id("abc".to_string(), secs(t0, 1.0))
            .with_processing_progress(50.0, Some(500), secs(t0, 1.75))
            .with_processing_progress(50.0, Some(500), secs(t0, 1.80));

        assert_eq!(t.processing_start, Some(secs(t0, 1.0)));
        assert_eq!(t.records_processed, Some(500));
        assert_eq!(t.process_progress, 50.0);
    }

    #[test]
    fn completed_task_keeps_its_processing_end() {
        let t0 = Instant::now();
        let done = task()
            .with_server_file_id("abc".to_string(), secs(t0, 1.0))
            .with_processing_progress(100.0, Some(1000), secs(t0, 2.5));
        let again = done
            .clone()
            .with_processing_progress(100.0, Some(1000), secs(t0, 3.25))
            .with_processing_progress(40.0, Some(400), secs(t0, 4.0));

        assert_eq!(again, done);
        assert_eq!(done.processing_duration(), Some(Duration::from_millis(1500)));
        assert!(!done.needs_polling());
    }

    #[test]
    fn negative_progress_fails_the_task() {
        let t0 = Instant::now();
        let t = task()
            .with_server_file_id("abc".to_string(), t0)
            .with_processing_progress(-1.0, None, t0);

        assert!(t.is_failed());
        assert!(t.is_settled());
        assert!(!t.needs_polling());
        assert_eq!(t.processing_end, None);
    }

    #[test]
    fn failed_task_ignores_further_signals() {
        let t0 = Instant::now();
        let t = task().failed("boom".to_string());
        let after = t
            .clone()
            .with_upload_progress(50.0, t0)
            .with_processing_complete(t0)
            .failed("other".to_string());
        assert_eq!(after, t);
    }
}
