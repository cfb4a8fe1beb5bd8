// Path: crates/types/src/replication.rs

//! Durable replication jobs and their queue records.

use crate::claim::UploadAddress;
use crate::id::{Did, Digest, Link};
use parity_scale_codec::{Decode, Encode};

/// Where to pull a replicated blob from.
#[derive(Clone, Debug, PartialEq, Eq, Encode, Decode)]
pub struct ReplicaSource {
    /// Candidate URLs from the primary's location commitment. The first
    /// entry is fetched; the rest are kept so a selection policy can be
    /// slotted in without a schema change.
    pub urls: Vec<String>,
    /// The principal that issued the source commitment; grants are requested
    /// from (and verified against) this DID.
    pub issuer: Did,
}

impl ReplicaSource {
    /// The URL a transfer fetches from.
    pub fn primary_url(&self) -> Option<&str> {
        self.urls.first().map(String::as_str)
    }
}

/// A replication task: pull `digest` from `source`, land it at `sink`, and
/// report back.
#[derive(Clone, Debug, PartialEq, Eq, Encode, Decode)]
pub struct ReplicationJob {
    /// Tenant space the replica is made for.
    pub space: Did,
    /// Content hash to replicate.
    pub digest: Digest,
    /// Size in bytes, from the allocation.
    pub size: u64,
    /// Where to pull from.
    pub source: ReplicaSource,
    /// Upload ticket against this node's own store, or `None` when the bytes
    /// are already present and only the receipt is owed.
    pub sink: Option<UploadAddress>,
    /// Link to the `replica/transfer` invocation this job executes.
    pub cause: Link,
}

/// Persisted lifecycle state of a queued job.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Encode, Decode)]
pub enum JobState {
    /// Waiting for a worker.
    Queued,
    /// Claimed by a worker. On restart, `Running` jobs are requeued; the
    /// transfer procedure is idempotent, so re-running one is safe.
    Running,
    /// All attempts exhausted; a failure receipt has been emitted.
    Dead,
}

/// A job plus its persisted bookkeeping, as stored in the queue tables.
#[derive(Clone, Debug, PartialEq, Eq, Encode, Decode)]
pub struct JobRecord {
    /// The task itself.
    pub job: ReplicationJob,
    /// Attempts already spent. Persisted before each attempt, so a crash
    /// mid-attempt costs one attempt rather than resetting the budget.
    pub attempts: u32,
    /// Current lifecycle state.
    pub state: JobState,
}
