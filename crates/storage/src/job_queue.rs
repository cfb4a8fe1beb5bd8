// Path: crates/storage/src/job_queue.rs
//! Durable replication job queue over redb.
//!
//! Two tables: `JOBS` maps a monotonic big-endian id to the canonical
//! `JobRecord`, and `QUEUE_META` holds the id counter. Claim order is id
//! order. Every state change commits before it is acted on; a crash between
//! `record_attempt` and the attempt itself costs one attempt from the
//! budget, which at-least-once semantics absorb.

use crate::backend;
use async_trait::async_trait;
use haven_api::queue::{JobId, JobQueue};
use haven_api::store::be64;
use haven_types::codec;
use haven_types::error::StoreError;
use haven_types::replication::{JobRecord, JobState, ReplicationJob};
use redb::{Database, ReadableTable, TableDefinition};
use std::path::Path;
use std::sync::Arc;

const JOBS: TableDefinition<&[u8; 8], &[u8]> = TableDefinition::new("JOBS");
const QUEUE_META: TableDefinition<&[u8; 4], &[u8; 8]> = TableDefinition::new("QUEUE_META");

fn key_next() -> [u8; 4] {
    *b"NEXT"
}

/// Durable job queue over a single redb database.
#[derive(Clone)]
pub struct RedbJobQueue {
    db: Arc<Database>,
}

impl RedbJobQueue {
    /// Opens (or creates) the queue at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let db = Database::create(path).map_err(backend)?;
        let w = db.begin_write().map_err(backend)?;
        w.open_table(JOBS).map_err(backend)?;
        w.open_table(QUEUE_META).map_err(backend)?;
        w.commit().map_err(backend)?;
        Ok(Self { db: Arc::new(db) })
    }

    fn load(&self, id: JobId) -> Result<JobRecord, StoreError> {
        let read = self.db.begin_read().map_err(backend)?;
        let table = read.open_table(JOBS).map_err(backend)?;
        let guard = table.get(&be64(id)).map_err(backend)?.ok_or(StoreError::NotFound)?;
        codec::from_bytes_canonical(guard.value()).map_err(StoreError::Decode)
    }

    fn store(&self, id: JobId, record: &JobRecord) -> Result<(), StoreError> {
        let value = codec::to_bytes_canonical(record);
        let w = self.db.begin_write().map_err(backend)?;
        {
            let mut table = w.open_table(JOBS).map_err(backend)?;
            table.insert(&be64(id), value.as_slice()).map_err(backend)?;
        }
        w.commit().map_err(backend)?;
        Ok(())
    }

    fn set_state(&self, id: JobId, state: JobState) -> Result<(), StoreError> {
        let mut record = self.load(id)?;
        record.state = state;
        self.store(id, &record)
    }
}

#[async_trait]
impl JobQueue for RedbJobQueue {
    async fn enqueue(&self, job: ReplicationJob) -> Result<JobId, StoreError> {
        let record = JobRecord {
            job,
            attempts: 0,
            state: JobState::Queued,
        };
        let value = codec::to_bytes_canonical(&record);

        let w = self.db.begin_write().map_err(backend)?;
        let id = {
            let mut meta = w.open_table(QUEUE_META).map_err(backend)?;
            let id = meta
                .get(&key_next())
                .map_err(backend)?
                .map(|guard| u64::from_be_bytes(*guard.value()))
                .unwrap_or(0);
            meta.insert(&key_next(), &be64(id + 1)).map_err(backend)?;
            let mut jobs = w.open_table(JOBS).map_err(backend)?;
            jobs.insert(&be64(id), value.as_slice()).map_err(backend)?;
            id
        };
        w.commit().map_err(backend)?;
        Ok(id)
    }

    async fn claim(&self) -> Result<Option<(JobId, JobRecord)>, StoreError> {
        // Single-writer: the claim scan and the state flip share one write
        // transaction so two workers can never claim the same job.
        let w = self.db.begin_write().map_err(backend)?;
        let claimed = {
            let mut jobs = w.open_table(JOBS).map_err(backend)?;
            let mut found: Option<(JobId, JobRecord)> = None;
            for entry in jobs.iter().map_err(backend)? {
                let (key, value) = entry.map_err(backend)?;
                let record: JobRecord =
                    codec::from_bytes_canonical(value.value()).map_err(StoreError::Decode)?;
                if record.state == JobState::Queued {
                    found = Some((u64::from_be_bytes(*key.value()), record));
                    break;
                }
            }
            if let Some((id, ref mut record)) = found {
                record.state = JobState::Running;
                let value = codec::to_bytes_canonical(record);
                jobs.insert(&be64(id), value.as_slice()).map_err(backend)?;
            }
            found
        };
        w.commit().map_err(backend)?;
        Ok(claimed)
    }

    async fn record_attempt(&self, id: JobId) -> Result<u32, StoreError> {
        let mut record = self.load(id)?;
        record.attempts += 1;
        self.store(id, &record)?;
        Ok(record.attempts)
    }

    async fn complete(&self, id: JobId) -> Result<(), StoreError> {
        let w = self.db.begin_write().map_err(backend)?;
        {
            let mut jobs = w.open_table(JOBS).map_err(backend)?;
            jobs.remove(&be64(id)).map_err(backend)?;
        }
        w.commit().map_err(backend)?;
        Ok(())
    }

    async fn release(&self, id: JobId) -> Result<(), StoreError> {
        self.set_state(id, JobState::Queued)
    }

    async fn dead_letter(&self, id: JobId) -> Result<(), StoreError> {
        self.set_state(id, JobState::Dead)
    }

    async fn recover(&self) -> Result<u64, StoreError> {
        let running: Vec<JobId> = {
            let read = self.db.begin_read().map_err(backend)?;
            let jobs = read.open_table(JOBS).map_err(backend)?;
            let mut out = Vec::new();
            for entry in jobs.iter().map_err(backend)? {
                let (key, value) = entry.map_err(backend)?;
                let record: JobRecord =
                    codec::from_bytes_canonical(value.value()).map_err(StoreError::Decode)?;
                if record.state == JobState::Running {
                    out.push(u64::from_be_bytes(*key.value()));
                }
            }
            out
        };
        for id in &running {
            self.set_state(*id, JobState::Queued)?;
        }
        Ok(running.len() as u64)
    }

    async fn depth(&self) -> Result<u64, StoreError> {
        let read = self.db.begin_read().map_err(backend)?;
        let jobs = read.open_table(JOBS).map_err(backend)?;
        let mut depth = 0;
        for entry in jobs.iter().map_err(backend)? {
            let (_, value) = entry.map_err(backend)?;
            let record: JobRecord =
                codec::from_bytes_canonical(value.value()).map_err(StoreError::Decode)?;
            if record.state != JobState::Dead {
                depth += 1;
            }
        }
        Ok(depth)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use haven_types::id::{Did, Digest, Link};
    use haven_types::replication::ReplicaSource;

    fn job(digest: u8) -> ReplicationJob {
        ReplicationJob {
            space: Did::from_ed25519(&[1; 32]),
            digest: Digest::sha2_256([digest; 32]),
            size: 5,
            source: ReplicaSource {
                urls: vec!["http://primary.example/blob/x".to_string()],
                issuer: Did::from_ed25519(&[2; 32]),
            },
            sink: None,
            cause: Link([digest; 32]),
        }
    }

    fn open() -> (tempfile::TempDir, RedbJobQueue) {
        let dir = tempfile::tempdir().unwrap();
        let queue = RedbJobQueue::open(dir.path().join("jobs.redb")).unwrap();
        (dir, queue)
    }

    #[tokio::test]
    async fn claim_order_is_enqueue_order() {
        let (_dir, queue) = open();
        let a = queue.enqueue(job(1)).await.unwrap();
        let b = queue.enqueue(job(2)).await.unwrap();
        assert!(a < b);

        let (id, record) = queue.claim().await.unwrap().unwrap();
        assert_eq!(id, a);
        assert_eq!(record.job.digest, Digest::sha2_256([1; 32]));
        assert_eq!(record.state, JobState::Running);

        let (id, _) = queue.claim().await.unwrap().unwrap();
        assert_eq!(id, b);
        assert!(queue.claim().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn attempts_are_persisted() {
        let (_dir, queue) = open();
        let id = queue.enqueue(job(1)).await.unwrap();
        assert_eq!(queue.record_attempt(id).await.unwrap(), 1);
        assert_eq!(queue.record_attempt(id).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn recover_requeues_running_jobs() {
        let (_dir, queue) = open();
        queue.enqueue(job(1)).await.unwrap();
        let (id, _) = queue.claim().await.unwrap().unwrap();

        // Simulate a crashed worker: the job is still Running.
        assert!(queue.claim().await.unwrap().is_none());
        assert_eq!(queue.recover().await.unwrap(), 1);

        let (requeued, record) = queue.claim().await.unwrap().unwrap();
        assert_eq!(requeued, id);
        assert_eq!(record.state, JobState::Running);
    }

    #[tokio::test]
    async fn dead_letters_are_never_claimed() {
        let (_dir, queue) = open();
        let id = queue.enqueue(job(1)).await.unwrap();
        queue.claim().await.unwrap();
        queue.dead_letter(id).await.unwrap();

        assert!(queue.claim().await.unwrap().is_none());
        assert_eq!(queue.depth().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn complete_removes_the_job() {
        let (_dir, queue) = open();
        let id = queue.enqueue(job(1)).await.unwrap();
        queue.claim().await.unwrap();
        queue.complete(id).await.unwrap();
        assert_eq!(queue.depth().await.unwrap(), 0);
        assert!(matches!(
            queue.record_attempt(id).await,
            Err(StoreError::NotFound)
        ));
    }
}
