// Path: crates/test_utils/src/stores.rs
//! In-memory implementations of the store and queue seams.

use async_trait::async_trait;
use bytes::Bytes;
use haven_api::publish::{AdvertChain, Advertisement};
use haven_api::queue::{JobId, JobQueue};
use haven_api::store::{AllocationStore, BlobStore, ClaimStore};
use haven_crypto::hash::digest_of;
use haven_types::allocation::Allocation;
use haven_types::claim::LocationCommitment;
use haven_types::error::StoreError;
use haven_types::id::{Did, Digest, Link};
use haven_types::replication::{JobRecord, JobState, ReplicationJob};
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

fn poisoned() -> StoreError {
    StoreError::Backend("lock poisoned".to_string())
}

/// In-memory allocation store.
#[derive(Default)]
pub struct MemAllocationStore {
    entries: Mutex<Vec<Allocation>>,
}

#[async_trait]
impl AllocationStore for MemAllocationStore {
    async fn put(&self, allocation: Allocation) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().map_err(|_| poisoned())?;
        let exists = entries.iter().any(|a| {
            a.space == allocation.space && a.digest == allocation.digest && a.cause == allocation.cause
        });
        if !exists {
            entries.push(allocation);
        }
        Ok(())
    }

    async fn list(&self, digest: &Digest) -> Result<Vec<Allocation>, StoreError> {
        let entries = self.entries.lock().map_err(|_| poisoned())?;
        Ok(entries.iter().filter(|a| &a.digest == digest).cloned().collect())
    }

    async fn list_for_space(
        &self,
        digest: &Digest,
        space: &Did,
    ) -> Result<Vec<Allocation>, StoreError> {
        let entries = self.entries.lock().map_err(|_| poisoned())?;
        Ok(entries
            .iter()
            .filter(|a| &a.digest == digest && &a.space == space)
            .cloned()
            .collect())
    }

    async fn get_any(&self, digest: &Digest) -> Result<Allocation, StoreError> {
        self.list(digest)
            .await?
            .into_iter()
            .next()
            .ok_or(StoreError::NotFound)
    }
}

/// In-memory blob store with digest verification on write.
#[derive(Default)]
pub struct MemBlobStore {
    blobs: Mutex<HashMap<Digest, Bytes>>,
}

#[async_trait]
impl BlobStore for MemBlobStore {
    async fn put(&self, digest: &Digest, body: Bytes) -> Result<(), StoreError> {
        let mut blobs = self.blobs.lock().map_err(|_| poisoned())?;
        if blobs.contains_key(digest) {
            return Ok(());
        }
        let actual = digest_of(&body).map_err(|e| StoreError::Backend(e.to_string()))?;
        if &actual != digest {
            return Err(StoreError::DataInconsistent {
                expected: digest.to_string(),
                got: actual.to_string(),
            });
        }
        blobs.insert(digest.clone(), body);
        Ok(())
    }

    async fn get(&self, digest: &Digest) -> Result<Bytes, StoreError> {
        let blobs = self.blobs.lock().map_err(|_| poisoned())?;
        blobs.get(digest).cloned().ok_or(StoreError::NotFound)
    }

    async fn get_range(&self, digest: &Digest, start: u64, end: u64) -> Result<Bytes, StoreError> {
        let body = self.get(digest).await?;
        let size = body.len() as u64;
        if start > end || end >= size {
            return Err(StoreError::RangeNotSatisfiable { start, end, size });
        }
        Ok(body.slice(start as usize..=end as usize))
    }

    async fn stat(&self, digest: &Digest) -> Result<u64, StoreError> {
        Ok(self.get(digest).await?.len() as u64)
    }

    async fn contains(&self, digest: &Digest) -> Result<bool, StoreError> {
        let blobs = self.blobs.lock().map_err(|_| poisoned())?;
        Ok(blobs.contains_key(digest))
    }
}

/// In-memory claim store with the live-commitment index semantics.
#[derive(Default)]
pub struct MemClaimStore {
    claims: Mutex<HashMap<Link, (LocationCommitment, Vec<u8>)>>,
}

#[async_trait]
impl ClaimStore for MemClaimStore {
    async fn put(
        &self,
        link: &Link,
        commitment: &LocationCommitment,
        archive: Vec<u8>,
    ) -> Result<(), StoreError> {
        let mut claims = self.claims.lock().map_err(|_| poisoned())?;
        claims.insert(*link, (commitment.clone(), archive));
        Ok(())
    }

    async fn get_archive(&self, link: &Link) -> Result<Vec<u8>, StoreError> {
        let claims = self.claims.lock().map_err(|_| poisoned())?;
        claims
            .get(link)
            .map(|(_, archive)| archive.clone())
            .ok_or(StoreError::NotFound)
    }

    async fn get(&self, link: &Link) -> Result<LocationCommitment, StoreError> {
        let claims = self.claims.lock().map_err(|_| poisoned())?;
        claims
            .get(link)
            .map(|(commitment, _)| commitment.clone())
            .ok_or(StoreError::NotFound)
    }

    async fn find_live(
        &self,
        audience: &Did,
        content: &Digest,
        now: u64,
    ) -> Result<Option<(Link, LocationCommitment)>, StoreError> {
        let claims = self.claims.lock().map_err(|_| poisoned())?;
        Ok(claims
            .iter()
            .find(|(_, (c, _))| {
                &c.payload.audience == audience
                    && &c.payload.content == content
                    && c.payload.expiration.map_or(true, |exp| exp > now)
            })
            .map(|(link, (c, _))| (*link, c.clone())))
    }
}

/// In-memory job queue with the same claim/attempt/recover semantics as the
/// durable one.
#[derive(Default)]
pub struct MemJobQueue {
    jobs: Mutex<(BTreeMap<JobId, JobRecord>, JobId)>,
}

#[async_trait]
impl JobQueue for MemJobQueue {
    async fn enqueue(&self, job: ReplicationJob) -> Result<JobId, StoreError> {
        let mut guard = self.jobs.lock().map_err(|_| poisoned())?;
        let id = guard.1;
        guard.1 += 1;
        guard.0.insert(
            id,
            JobRecord {
                job,
                attempts: 0,
                state: JobState::Queued,
            },
        );
        Ok(id)
    }

    async fn claim(&self) -> Result<Option<(JobId, JobRecord)>, StoreError> {
        let mut guard = self.jobs.lock().map_err(|_| poisoned())?;
        let next = guard
            .0
            .iter()
            .find(|(_, record)| record.state == JobState::Queued)
            .map(|(id, _)| *id);
        match next {
            None => Ok(None),
            Some(id) => match guard.0.get_mut(&id) {
                None => Ok(None),
                Some(record) => {
                    record.state = JobState::Running;
                    Ok(Some((id, record.clone())))
                }
            },
        }
    }

    async fn record_attempt(&self, id: JobId) -> Result<u32, StoreError> {
        let mut guard = self.jobs.lock().map_err(|_| poisoned())?;
        let record = guard.0.get_mut(&id).ok_or(StoreError::NotFound)?;
        record.attempts += 1;
        Ok(record.attempts)
    }

    async fn complete(&self, id: JobId) -> Result<(), StoreError> {
        let mut guard = self.jobs.lock().map_err(|_| poisoned())?;
        guard.0.remove(&id);
        Ok(())
    }

    async fn release(&self, id: JobId) -> Result<(), StoreError> {
        let mut guard = self.jobs.lock().map_err(|_| poisoned())?;
        let record = guard.0.get_mut(&id).ok_or(StoreError::NotFound)?;
        record.state = JobState::Queued;
        Ok(())
    }

    async fn dead_letter(&self, id: JobId) -> Result<(), StoreError> {
        let mut guard = self.jobs.lock().map_err(|_| poisoned())?;
        let record = guard.0.get_mut(&id).ok_or(StoreError::NotFound)?;
        record.state = JobState::Dead;
        Ok(())
    }

    async fn recover(&self) -> Result<u64, StoreError> {
        let mut guard = self.jobs.lock().map_err(|_| poisoned())?;
        let mut recovered = 0;
        for record in guard.0.values_mut() {
            if record.state == JobState::Running {
                record.state = JobState::Queued;
                recovered += 1;
            }
        }
        Ok(recovered)
    }

    async fn depth(&self) -> Result<u64, StoreError> {
        let guard = self.jobs.lock().map_err(|_| poisoned())?;
        Ok(guard
            .0
            .values()
            .filter(|record| record.state != JobState::Dead)
            .count() as u64)
    }
}

/// In-memory advertisement chain.
#[derive(Default)]
pub struct MemAdvertChain {
    state: Mutex<(HashMap<Link, Advertisement>, Option<Link>)>,
}

#[async_trait]
impl AdvertChain for MemAdvertChain {
    async fn head(&self) -> Result<Option<(Link, Vec<u8>)>, StoreError> {
        let state = self.state.lock().map_err(|_| poisoned())?;
        match state.1 {
            None => Ok(None),
            Some(link) => {
                let entry = state.0.get(&link).ok_or(StoreError::NotFound)?;
                Ok(Some((link, entry.context_id.clone())))
            }
        }
    }

    async fn append(&self, link: &Link, ad: &Advertisement) -> Result<(), StoreError> {
        let mut state = self.state.lock().map_err(|_| poisoned())?;
        state.0.insert(*link, ad.clone());
        state.1 = Some(*link);
        Ok(())
    }

    async fn get(&self, link: &Link) -> Result<Advertisement, StoreError> {
        let state = self.state.lock().map_err(|_| poisoned())?;
        state.0.get(link).cloned().ok_or(StoreError::NotFound)
    }
}
