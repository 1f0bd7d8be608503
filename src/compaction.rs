//! Background compaction.
//!
//! A [`CompactionWorker`] owns one thread that runs compaction passes while
//! foreground handles keep reading and writing. Jobs go through a bounded
//! queue; results come back on an unbounded report channel.

use crate::error::{Result, StateError, StorageError};
use crate::store::{CompactionFilter, CompactionStats, MergeStore, Partition};
use crossbeam_channel::{bounded, unbounded, Receiver, Sender, TrySendError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, info, warn};

/// One compaction pass over a partition.
#[derive(Clone)]
pub struct CompactionJob {
    pub partition: Partition,
    pub filter: Option<Arc<dyn CompactionFilter>>,
}

impl CompactionJob {
    pub fn new(partition: Partition) -> Self {
        Self {
            partition,
            filter: None,
        }
    }

    pub fn with_filter(partition: Partition, filter: Arc<dyn CompactionFilter>) -> Self {
        Self {
            partition,
            filter: Some(filter),
        }
    }
}

/// Outcome of one job.
#[derive(Debug)]
pub struct CompactionReport {
    pub partition: Partition,
    pub result: Result<CompactionStats>,
}

pub struct CompactionWorker {
    jobs: Option<Sender<CompactionJob>>,
    reports: Receiver<CompactionReport>,
    handle: Option<JoinHandle<()>>,
}

impl CompactionWorker {
    /// Start the worker thread. At most `capacity` jobs wait in the queue.
    pub fn spawn<S>(store: Arc<S>, capacity: usize) -> Result<Self>
    where
        S: MergeStore + ?Sized + 'static,
    {
        let (job_tx, job_rx) = bounded::<CompactionJob>(capacity.max(1));
        let (report_tx, report_rx) = unbounded();

        let handle = thread::Builder::new()
            .name("state-compaction".into())
            .spawn(move || run(store, job_rx, report_tx))
            .map_err(|e| StateError::access("starting compaction worker", StorageError::Io(e)))?;

        Ok(Self {
            jobs: Some(job_tx),
            reports: report_rx,
            handle: Some(handle),
        })
    }

    /// Queue a job, blocking while the queue is full.
    pub fn submit(&self, job: CompactionJob) -> Result<()> {
        let jobs = self.sender()?;
        jobs.send(job)
            .map_err(|_| StateError::access("submitting compaction job", StorageError::Closed))
    }

    /// Queue a job unless the queue is full. Returns whether it was queued.
    pub fn try_submit(&self, job: CompactionJob) -> Result<bool> {
        let jobs = self.sender()?;
        match jobs.try_send(job) {
            Ok(()) => Ok(true),
            Err(TrySendError::Full(job)) => {
                debug!(partition = %job.partition, "compaction queue full");
                Ok(false)
            }
            Err(TrySendError::Disconnected(_)) => Err(StateError::access(
                "submitting compaction job",
                StorageError::Closed,
            )),
        }
    }

    /// Reports of finished jobs, in completion order.
    pub fn reports(&self) -> &Receiver<CompactionReport> {
        &self.reports
    }

    /// Stop accepting jobs, finish the queued ones and join the thread.
    pub fn shutdown(mut self) -> Vec<CompactionReport> {
        self.stop();
        self.reports.try_iter().collect()
    }

    fn sender(&self) -> Result<&Sender<CompactionJob>> {
        self.jobs
            .as_ref()
            .ok_or_else(|| StateError::access("submitting compaction job", StorageError::Closed))
    }

    fn stop(&mut self) {
        self.jobs.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("compaction worker panicked");
            }
        }
    }
}

impl Drop for CompactionWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run<S>(store: Arc<S>, jobs: Receiver<CompactionJob>, reports: Sender<CompactionReport>)
where
    S: MergeStore + ?Sized,
{
    debug!("compaction worker started");
    for job in jobs.iter() {
        let result = store.compact(&job.partition, job.filter.as_deref());
        match &result {
            Ok(stats) => info!(
                partition = %job.partition,
                filter = job.filter.as_ref().map(|f| f.name()),
                scanned = stats.keys_scanned,
                rewritten = stats.keys_rewritten,
                removed = stats.keys_removed,
                skipped = stats.keys_skipped,
                "compaction pass finished"
            ),
            Err(e) => warn!(partition = %job.partition, error = %e, "compaction pass failed"),
        }
        // Nobody listening is fine.
        let _ = reports.send(CompactionReport {
            partition: job.partition,
            result,
        });
    }
    debug!("compaction worker stopped");
}
