//! Progress reporting for uploads in flight.
//!
//! The pipeline reports through the [`ProgressSink`] trait and never learns
//! who is listening. The server side of the story is a latest-value cell
//! ([`ProgressHandle`], backed by `tokio::sync::watch`): each stage
//! overwrites the snapshot, and observers sample it on a fixed interval via
//! [`ProgressHandle::snapshots`]. Nothing is queued, so an observer that
//! samples slower than stages change only ever sees the most recent one.
//!
//! Every upload gets its own handle in the [`ProgressRegistry`], keyed by a
//! job id, so two uploads never clobber each other's stream. The registry
//! additionally mirrors every job onto one process-wide handle for clients
//! that subscribe to the unscoped `/progress` stream. That mirror is shared
//! by all jobs: with concurrent uploads it interleaves their stages.
//!
//! # Example
//!
//! ```rust
//! use pdf2anki::{ProgressHandle, ProgressSink};
//!
//! let handle = ProgressHandle::new();
//! handle.report("Analyzing image with AI...", 50);
//! assert_eq!(handle.snapshot().progress, 50);
//! ```

use crate::error::Pdf2AnkiError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tokio_stream::wrappers::IntervalStream;
use tokio_stream::{Stream, StreamExt};
use tracing::debug;

/// The single current `{status, progress}` value visible to observers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub status: String,
    /// Percentage in `0..=100`.
    pub progress: u8,
}

impl ProgressSnapshot {
    /// Build a snapshot, clamping `progress` to 100.
    pub fn new(status: impl Into<String>, progress: u8) -> Self {
        Self {
            status: status.into(),
            progress: progress.min(100),
        }
    }
}

/// Receives stage updates from the conversion pipeline.
///
/// Implementations must be `Send + Sync`; the HTTP layer shares sinks
/// between the request task and any number of stream observers.
pub trait ProgressSink: Send + Sync {
    /// Overwrite the current status. `progress` above 100 is clamped.
    fn report(&self, status: &str, progress: u8);
}

/// A sink that discards every update.
pub struct NoopProgress;

impl ProgressSink for NoopProgress {
    fn report(&self, _status: &str, _progress: u8) {}
}

/// A shared latest-value progress cell.
///
/// Cloning is cheap and every clone refers to the same cell.
#[derive(Debug, Clone)]
pub struct ProgressHandle {
    tx: Arc<watch::Sender<ProgressSnapshot>>,
}

impl Default for ProgressHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressHandle {
    /// A cell holding the empty snapshot `{status: "", progress: 0}`.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(ProgressSnapshot::default());
        Self { tx: Arc::new(tx) }
    }

    /// Copy of the current value.
    pub fn snapshot(&self) -> ProgressSnapshot {
        self.tx.borrow().clone()
    }

    /// Change-notification receiver, for callers that prefer pushing over
    /// interval sampling.
    pub fn subscribe(&self) -> watch::Receiver<ProgressSnapshot> {
        self.tx.subscribe()
    }

    /// Emit the current snapshot every `every`, starting immediately.
    ///
    /// The stream never ends on its own; drop it to stop observing.
    pub fn snapshots(&self, every: Duration) -> impl Stream<Item = ProgressSnapshot> + Send + 'static {
        let handle = self.clone();
        let mut interval = tokio::time::interval(every.max(Duration::from_millis(1)));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        IntervalStream::new(interval).map(move |_| handle.snapshot())
    }
}

impl ProgressSink for ProgressHandle {
    fn report(&self, status: &str, progress: u8) {
        self.tx.send_replace(ProgressSnapshot::new(status, progress));
    }
}

/// Sink for one job: writes to the job's own cell and to the global mirror.
#[derive(Debug, Clone)]
pub struct JobProgress {
    id: String,
    handle: ProgressHandle,
    global: ProgressHandle,
}

impl JobProgress {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn handle(&self) -> &ProgressHandle {
        &self.handle
    }
}

impl ProgressSink for JobProgress {
    fn report(&self, status: &str, progress: u8) {
        debug!(job = %self.id, progress, "{}", status);
        self.handle.report(status, progress);
        self.global.report(status, progress);
    }
}

struct JobEntry {
    handle: ProgressHandle,
    finished_at: Option<Instant>,
}

/// Job id → progress cell, plus the process-wide mirror.
///
/// Finished jobs stay subscribable for `retention` and are purged lazily
/// on the next registry access after that.
pub struct ProgressRegistry {
    global: ProgressHandle,
    jobs: Mutex<HashMap<String, JobEntry>>,
    retention: Duration,
}

impl ProgressRegistry {
    pub fn new(retention: Duration) -> Self {
        Self {
            global: ProgressHandle::new(),
            jobs: Mutex::new(HashMap::new()),
            retention,
        }
    }

    /// The process-wide mirror of every job's updates.
    pub fn global(&self) -> &ProgressHandle {
        &self.global
    }

    /// Register a new job.
    ///
    /// `requested` lets the client pick the id up front so it can open
    /// `/progress/{job}` before the upload finishes. It must be 1–64 ASCII
    /// alphanumerics or `-`, and not belong to a job still running. `None`
    /// generates a UUID.
    pub fn start_job(&self, requested: Option<&str>) -> Result<JobProgress, Pdf2AnkiError> {
        let id = match requested {
            Some(id) => {
                if !is_valid_job_id(id) {
                    return Err(Pdf2AnkiError::BadRequest(format!("invalid job id '{id}'")));
                }
                id.to_string()
            }
            None => uuid::Uuid::new_v4().to_string(),
        };

        let mut jobs = self.jobs.lock().unwrap_or_else(PoisonError::into_inner);
        self.purge_expired(&mut jobs);
        if let Some(existing) = jobs.get(&id) {
            if existing.finished_at.is_none() {
                return Err(Pdf2AnkiError::BadRequest(format!(
                    "job id '{id}' is already in use"
                )));
            }
        }

        let handle = ProgressHandle::new();
        jobs.insert(
            id.clone(),
            JobEntry {
                handle: handle.clone(),
                finished_at: None,
            },
        );
        Ok(JobProgress {
            id,
            handle,
            global: self.global.clone(),
        })
    }

    /// Look up a job's cell, if it is running or recently finished.
    pub fn job(&self, id: &str) -> Option<ProgressHandle> {
        let mut jobs = self.jobs.lock().unwrap_or_else(PoisonError::into_inner);
        self.purge_expired(&mut jobs);
        jobs.get(id).map(|entry| entry.handle.clone())
    }

    /// Mark a job finished; it is purged after the retention period.
    pub fn finish_job(&self, id: &str) {
        let mut jobs = self.jobs.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(entry) = jobs.get_mut(id) {
            entry.finished_at = Some(Instant::now());
        }
    }

    /// Number of jobs currently tracked.
    pub fn len(&self) -> usize {
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn purge_expired(&self, jobs: &mut HashMap<String, JobEntry>) {
        let retention = self.retention;
        jobs.retain(|_, entry| match entry.finished_at {
            Some(at) => at.elapsed() < retention,
            None => true,
        });
    }
}

fn is_valid_job_id(id: &str) -> bool {
    !id.is_empty() && id.len() <= 64 && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
}
