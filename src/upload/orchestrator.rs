use std::collections::HashSet;
use std::sync::mpsc::Sender;
use std::time::{Duration, Instant};

use futures_util::future::join_all;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::time::{interval_at, Interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::config::UploadMode;

use super::client::{batch_label, GradesClient};
use super::ndjson::{parse_line, LineBuffer};
use super::types::{ProgressRecord, QueuedFile, SelectedFile, UploadEvent};

pub type EventSender = Sender<UploadEvent>;

/// Everything a worker needs to run one batch.
#[derive(Debug, Clone)]
pub struct UploadJob {
    pub mode: UploadMode,
    pub files: Vec<QueuedFile>,
    pub poll_interval: Duration,
}

/// Runs a whole batch to completion, reporting through `events`. Never
/// fails: every error ends up as an event naming the affected file.
pub async fn run(client: GradesClient, job: UploadJob, events: EventSender) {
    info!(
        "starting {} upload of {} files",
        job.mode.label(),
        job.files.len()
    );
    match job.mode {
        UploadMode::Batched => run_batched(&client, &job.files, &events).await,
        UploadMode::PerFile => run_per_file(&client, &job.files, job.poll_interval, &events).await,
    }
    debug!("upload worker finished");
}

fn emit(events: &EventSender, event: UploadEvent) {
    if events.send(event).is_err() {
        debug!("event receiver dropped, discarding upload event");
    }
}

fn percent_of(sent: u64, total: u64) -> f32 {
    if total == 0 {
        100.0
    } else {
        (sent as f64 * 100.0 / total as f64) as f32
    }
}

/// One request per file, all in flight together, with a progress poller
/// that runs while any accepted file is still being processed.
pub async fn run_per_file(
    client: &GradesClient,
    files: &[QueuedFile],
    poll_interval: Duration,
    events: &EventSender,
) {
    let (accepted_tx, accepted_rx) = unbounded_channel();

    let uploads = async move {
        let accepted_tx = accepted_tx;
        join_all(
            files
                .iter()
                .map(|queued| upload_one(client, queued, events, &accepted_tx)),
        )
        .await;
    };

    tokio::join!(
        uploads,
        poll_until_processed(client, poll_interval, accepted_rx, events)
    );
}

async fn upload_one(
    client: &GradesClient,
    queued: &QueuedFile,
    events: &EventSender,
    accepted: &UnboundedSender<String>,
) {
    let task = queued.task;
    let sink = events.clone();
    let on_progress = move |sent: u64, total: u64| {
        emit(
            &sink,
            UploadEvent::UploadProgress {
                task,
                percent: percent_of(sent, total),
                at: Instant::now(),
            },
        );
    };

    match client.upload_file(&queued.file, on_progress).await {
        Ok(file_id) => {
            info!("{} uploaded, server id {}", queued.file.name, file_id);
            emit(
                events,
                UploadEvent::FileAccepted {
                    task,
                    file_id: file_id.clone(),
                    at: Instant::now(),
                },
            );
            if accepted.send(file_id).is_err() {
                warn!("progress poller stopped before {} was accepted", queued.file.name);
            }
        }
        Err(e) => {
            error!("{}", e);
            emit(
                events,
                UploadEvent::TaskFailed {
                    task,
                    error: e.to_string(),
                },
            );
        }
    }
}

/// Polls the progress endpoint every `period` while any accepted file is
/// unfinished. The timer is dropped whenever nothing is left to watch and
/// re-armed when another file is accepted; the loop ends once uploads are
/// done and nothing is pending.
async fn poll_until_processed(
    client: &GradesClient,
    period: Duration,
    mut accepted: UnboundedReceiver<String>,
    events: &EventSender,
) {
    let mut pending: HashSet<String> = HashSet::new();
    let mut ticker: Option<Interval> = None;
    let mut uploads_open = true;

    loop {
        if pending.is_empty() {
            if ticker.take().is_some() {
                debug!("no files awaiting processing, polling paused");
            }
            if !uploads_open {
                break;
            }
        } else if ticker.is_none() {
            let mut fresh = interval_at(tokio::time::Instant::now() + period, period);
            fresh.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker = Some(fresh);
        }

        tokio::select! {
            id = accepted.recv(), if uploads_open => match id {
                Some(id) => {
                    pending.insert(id);
                }
                None => uploads_open = false,
            },
            _ = next_tick(&mut ticker) => {
                poll_once(client, &mut pending, events).await;
            }
        }
    }
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

async fn poll_once(client: &GradesClient, pending: &mut HashSet<String>, events: &EventSender) {
    let entries = match client.fetch_progress().await {
        Ok(entries) => entries,
        Err(e) => {
            warn!("{}", e);
            return;
        }
    };

    for entry in &entries {
        if pending.contains(&entry.file_id) && (entry.progress >= 100.0 || entry.progress < 0.0) {
            debug!("{} finished with progress {}", entry.file_id, entry.progress);
            pending.remove(&entry.file_id);
        }
    }

    emit(
        events,
        UploadEvent::ServerProgress {
            entries,
            at: Instant::now(),
        },
    );
}

/// One request for the whole batch; the response body streams a JSON line
/// per progress update, keyed by the file's position in the batch.
pub async fn run_batched(client: &GradesClient, files: &[QueuedFile], events: &EventSender) {
    let selected: Vec<SelectedFile> = files.iter().map(|q| q.file.clone()).collect();
    let label = batch_label(&selected);

    let sink = events.clone();
    let on_progress = move |sent: u64, total: u64| {
        emit(
            &sink,
            UploadEvent::BatchUploadProgress {
                percent: percent_of(sent, total),
                at: Instant::now(),
            },
        );
    };

    let mut response = match client.upload_batch(&selected, on_progress).await {
        Ok(response) => response,
        Err(e) => {
            error!("{}", e);
            emit(events, UploadEvent::BatchFailed { error: e.to_string() });
            return;
        }
    };
    emit(
        events,
        UploadEvent::BatchUploadProgress {
            percent: 100.0,
            at: Instant::now(),
        },
    );

    let mut lines = LineBuffer::new();
    loop {
        match response.chunk().await {
            Ok(Some(chunk)) => {
                for line in lines.push(&chunk) {
                    forward_record(&line, events);
                }
            }
            Ok(None) => break,
            Err(e) => {
                error!("progress stream for {} broke: {}", label, e);
                emit(
                    events,
                    UploadEvent::BatchFailed {
                        error: format!("Network error occurred while processing {}: {}", label, e),
                    },
                );
                return;
            }
        }
    }

    if let Some(tail) = lines.finish() {
        forward_record(&tail, events);
    }
    emit(events, UploadEvent::StreamClosed);
}

fn forward_record(line: &str, events: &EventSender) {
    if let Some(record) = parse_line::<ProgressRecord>(line) {
        emit(
            events,
            UploadEvent::Record {
                record,
                at: Instant::now(),
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_of_handles_empty_bodies() {
        assert_eq!(percent_of(0, 0), 100.0);
        assert_eq!(percent_of(50, 200), 25.0);
        assert_eq!(percent_of(200, 200), 100.0);
    }
}
