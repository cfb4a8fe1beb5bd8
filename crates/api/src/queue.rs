// Path: crates/api/src/queue.rs

//! API for the durable replication job queue.
//!
//! The queue is the sole writer of its tables and must tolerate ungraceful
//! restarts: a crash while updating the attempt counter yields at-least-once
//! execution, which the idempotent transfer procedure absorbs.

use async_trait::async_trait;
use haven_types::error::StoreError;
use haven_types::replication::{JobRecord, ReplicationJob};

/// Monotonic identifier assigned by the queue at enqueue time.
pub type JobId = u64;

/// A persistent at-least-once job queue.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Durably appends a job in the `Queued` state.
    async fn enqueue(&self, job: ReplicationJob) -> Result<JobId, StoreError>;

    /// Claims the oldest `Queued` job, marking it `Running`. Returns `None`
    /// when the queue is drained.
    async fn claim(&self) -> Result<Option<(JobId, JobRecord)>, StoreError>;

    /// Durably increments the attempt counter before an attempt runs;
    /// returns the new count.
    async fn record_attempt(&self, id: JobId) -> Result<u32, StoreError>;

    /// Removes a finished job.
    async fn complete(&self, id: JobId) -> Result<(), StoreError>;

    /// Returns a claimed job to `Queued` (e.g. on shutdown mid-attempt).
    async fn release(&self, id: JobId) -> Result<(), StoreError>;

    /// Marks a job `Dead` after its attempt budget is spent. Dead jobs are
    /// kept for inspection and never claimed again.
    async fn dead_letter(&self, id: JobId) -> Result<(), StoreError>;

    /// Requeues jobs left `Running` by a previous process. Called once at
    /// startup; returns the number of recovered jobs.
    async fn recover(&self) -> Result<u64, StoreError>;

    /// Number of jobs currently `Queued` or `Running`.
    async fn depth(&self) -> Result<u64, StoreError>;
}
