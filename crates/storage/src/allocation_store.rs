// Path: crates/storage/src/allocation_store.rs
//! redb-backed allocation store.
//!
//! Single table, prefix-encoded keys: `[digest][space][cause]`. The digest
//! prefix makes `list(digest)` a bounded range scan and the space segment
//! narrows it further; the cause suffix keeps distinct reservations for the
//! same `(digest, space)` (e.g. after an earlier one expired) from
//! overwriting each other while keeping re-puts of the same reservation
//! idempotent.

use crate::backend;
use async_trait::async_trait;
use haven_api::store::AllocationStore;
use haven_types::allocation::Allocation;
use haven_types::codec;
use haven_types::error::StoreError;
use haven_types::id::{Did, Digest};
use redb::{Database, ReadableTable, TableDefinition};
use std::path::Path;
use std::sync::Arc;

const ALLOCATIONS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("ALLOCATIONS");

/// Separates the ASCII space segment from the binary cause suffix so one
/// space name can never be a key-prefix of another.
const SEG: u8 = 0x00;

fn k_allocation(a: &Allocation) -> Vec<u8> {
    let mut key = Vec::with_capacity(35 + a.space.as_str().len() + 32);
    key.extend_from_slice(a.digest.as_bytes());
    key.extend_from_slice(a.space.as_str().as_bytes());
    key.push(SEG);
    key.extend_from_slice(&a.cause.0);
    key
}

fn k_prefix(digest: &Digest, space: Option<&Did>) -> Vec<u8> {
    let mut key = digest.as_bytes().to_vec();
    if let Some(space) = space {
        key.extend_from_slice(space.as_str().as_bytes());
        key.push(SEG);
    }
    key
}

/// Exclusive upper bound for a prefix scan. The padding must exceed the
/// longest possible key suffix, so an all-0xFF suffix still sorts below it.
fn k_upper(mut prefix: Vec<u8>) -> Vec<u8> {
    prefix.extend(std::iter::repeat(0xFF).take(128));
    prefix
}

/// Allocation store over a single redb database.
#[derive(Clone)]
pub struct RedbAllocationStore {
    db: Arc<Database>,
}

impl RedbAllocationStore {
    /// Opens (or creates) the store at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let db = Database::create(path).map_err(backend)?;
        let w = db.begin_write().map_err(backend)?;
        w.open_table(ALLOCATIONS).map_err(backend)?;
        w.commit().map_err(backend)?;
        Ok(Self { db: Arc::new(db) })
    }

    fn scan(&self, prefix: Vec<u8>) -> Result<Vec<Allocation>, StoreError> {
        let read = self.db.begin_read().map_err(backend)?;
        let table = read.open_table(ALLOCATIONS).map_err(backend)?;
        let upper = k_upper(prefix.clone());
        let mut out = Vec::new();
        for entry in table
            .range::<&[u8]>(prefix.as_slice()..upper.as_slice())
            .map_err(backend)?
        {
            let (_, value) = entry.map_err(backend)?;
            out.push(
                codec::from_bytes_canonical::<Allocation>(value.value())
                    .map_err(StoreError::Decode)?,
            );
        }
        Ok(out)
    }
}

#[async_trait]
impl AllocationStore for RedbAllocationStore {
    async fn put(&self, allocation: Allocation) -> Result<(), StoreError> {
        let key = k_allocation(&allocation);
        let value = codec::to_bytes_canonical(&allocation);
        let w = self.db.begin_write().map_err(backend)?;
        {
            let mut table = w.open_table(ALLOCATIONS).map_err(backend)?;
            table
                .insert(key.as_slice(), value.as_slice())
                .map_err(backend)?;
        }
        w.commit().map_err(backend)?;
        haven_telemetry::sinks::store_metrics().inc_allocations_created();
        Ok(())
    }

    async fn list(&self, digest: &Digest) -> Result<Vec<Allocation>, StoreError> {
        self.scan(k_prefix(digest, None))
    }

    async fn list_for_space(
        &self,
        digest: &Digest,
        space: &Did,
    ) -> Result<Vec<Allocation>, StoreError> {
        self.scan(k_prefix(digest, Some(space)))
    }

    async fn get_any(&self, digest: &Digest) -> Result<Allocation, StoreError> {
        self.scan(k_prefix(digest, None))?
            .into_iter()
            .next()
            .ok_or(StoreError::NotFound)
    }
}
