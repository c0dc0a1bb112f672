use std::time::{Duration, Instant};

use tracing::error;

use super::task::UploadTask;

/// Batch-wide timings derived from the per-task timestamps.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BatchMetrics {
    pub overall_start: Option<Instant>,
    pub overall_end: Option<Instant>,
    pub total_upload: Option<Duration>,
    pub total_processing: Option<Duration>,
    pub total_overall: Option<Duration>,
}

impl BatchMetrics {
    pub fn has_summary(&self) -> bool {
        self.total_overall.map_or(false, |d| !d.is_zero())
    }
}

pub fn summarize(tasks: &[UploadTask]) -> BatchMetrics {
    let overall_start = earliest(tasks, |t| t.upload_start);
    let overall_end = latest(tasks, |t| t.processing_end);

    BatchMetrics {
        overall_start,
        overall_end,
        total_upload: elapsed(
            "upload",
            overall_start,
            latest(tasks, |t| t.upload_end),
        ),
        total_processing: elapsed(
            "processing",
            earliest(tasks, |t| t.processing_start),
            overall_end,
        ),
        total_overall: elapsed("overall", overall_start, overall_end),
    }
}

fn earliest<F>(tasks: &[UploadTask], stamp: F) -> Option<Instant>
where
    F: Fn(&UploadTask) -> Option<Instant>,
{
    tasks.iter().filter_map(stamp).min()
}

fn latest<F>(tasks: &[UploadTask], stamp: F) -> Option<Instant>
where
    F: Fn(&UploadTask) -> Option<Instant>,
{
    tasks.iter().filter_map(stamp).max()
}

/// An end before its start means timestamps were stamped out of order, which
/// is a bug in the reconciler rather than something to display.
fn elapsed(label: &str, start: Option<Instant>, end: Option<Instant>) -> Option<Duration> {
    let (start, end) = (start?, end?);
    match end.checked_duration_since(start) {
        Some(duration) => Some(duration),
        None => {
            debug_assert!(false, "{} duration is negative", label);
            error!("{} end precedes its start; timestamps are out of order", label);
            None
        }
    }
}

/// Seconds with two decimals, or `N/A` when the span is not known yet.
pub fn format_duration(duration: Option<Duration>) -> String {
    match duration {
        Some(d) if !d.is_zero() => format!("{:.2} seconds", d.as_secs_f64()),
        _ => "N/A".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::upload::types::SelectedFile;

    fn task(name: &str) -> UploadTask {
        UploadTask::new(SelectedFile {
            path: PathBuf::from(name),
            name: name.to_string(),
            size_bytes: 10,
        })
    }

    fn secs(t0: Instant, s: f64) -> Instant {
        t0 + Duration::from_secs_f64(s)
    }

    #[test]
    fn empty_batch_has_no_metrics() {
        let m = summarize(&[]);
        assert_eq!(m, BatchMetrics::default());
        assert!(!m.has_summary());
    }

    #[test]
    fn spans_run_from_earliest_start_to_latest_end() {
        let t0 = Instant::now();
        let a = task("a.csv")
            .with_upload_progress(10.0, secs(t0, 0.0))
            .with_server_file_id("a".to_string(), secs(t0, 1.0))
            .with_processing_complete(secs(t0, 2.0));
        let b = task("b.csv")
            .with_upload_progress(10.0, secs(t0, 0.5))
            .with_server_file_id("b".to_string(), secs(t0, 1.5))
            .with_processing_complete(secs(t0, 3.0));

        let m = summarize(&[a, b]);
        assert_eq!(m.overall_start, Some(t0));
        assert_eq!(m.overall_end, Some(secs(t0, 3.0)));
        assert_eq!(m.total_upload, Some(Duration::from_millis(1500)));
        assert_eq!(m.total_processing, Some(Duration::from_secs(2)));
        assert_eq!(m.total_overall, Some(Duration::from_secs(3)));
        assert!(m.has_summary());
    }

    #[test]
    fn undefined_when_no_task_finished_processing() {
        let t0 = Instant::now();
        let a = task("a.csv").with_upload_progress(100.0, t0);
        let m = summarize(&[a]);
        assert_eq!(m.overall_start, Some(t0));
        assert_eq!(m.overall_end, None);
        assert_eq!(m.total_overall, None);
        assert_eq!(m.total_processing, None);
    }

    #[test]
    fn formats_two_decimals() {
        assert_eq!(
            format_duration(Some(Duration::from_millis(1500))),
            "1.50 seconds"
        );
        assert_eq!(format_duration(Some(Duration::from_millis(754))), "0.75 seconds");
        assert_eq!(format_duration(None), "N/A");
        assert_eq!(format_duration(Some(Duration::ZERO)), "N/A");
    }
}
