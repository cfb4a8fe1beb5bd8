// Path: crates/storage/src/claim_store.rs
//! redb-backed claim store.
//!
//! Two tables: `CLAIMS` maps a commitment link to its archived bytes
//! (served byte-for-byte on `GET /claim/{link}`), and `CLAIM_INDEX` maps
//! `[audience][content][link]` to the commitment's expiry so the idempotent
//! re-accept path can find a live commitment without decoding every archive.

use crate::backend;
use async_trait::async_trait;
use haven_api::store::{be64, ClaimStore};
use haven_types::claim::LocationCommitment;
use haven_types::codec;
use haven_types::error::StoreError;
use haven_types::id::{Did, Digest, Link};
use redb::{Database, ReadableTable, TableDefinition};
use std::path::Path;
use std::sync::Arc;

const CLAIMS: TableDefinition<&[u8; 32], &[u8]> = TableDefinition::new("CLAIMS");
const CLAIM_INDEX: TableDefinition<&[u8], &[u8; 8]> = TableDefinition::new("CLAIM_INDEX");

/// Sentinel expiry for commitments without one.
const NO_EXPIRY: u64 = u64::MAX;

/// Separates the ASCII audience segment from the binary segments so one
/// audience DID can never be a key-prefix of another.
const SEG: u8 = 0x00;

fn k_index(audience: &Did, content: &Digest, link: &Link) -> Vec<u8> {
    let mut key =
        Vec::with_capacity(audience.as_str().len() + content.as_bytes().len() + 33);
    key.extend_from_slice(audience.as_str().as_bytes());
    key.push(SEG);
    key.extend_from_slice(content.as_bytes());
    key.extend_from_slice(&link.0);
    key
}

fn k_index_prefix(audience: &Did, content: &Digest) -> Vec<u8> {
    let mut key = Vec::with_capacity(audience.as_str().len() + content.as_bytes().len() + 1);
    key.extend_from_slice(audience.as_str().as_bytes());
    key.push(SEG);
    key.extend_from_slice(content.as_bytes());
    key
}

/// Claim store over a single redb database.
#[derive(Clone)]
pub struct RedbClaimStore {
    db: Arc<Database>,
}

impl RedbClaimStore {
    /// Opens (or creates) the store at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let db = Database::create(path).map_err(backend)?;
        let w = db.begin_write().map_err(backend)?;
        w.open_table(CLAIMS).map_err(backend)?;
        w.open_table(CLAIM_INDEX).map_err(backend)?;
        w.commit().map_err(backend)?;
        Ok(Self { db: Arc::new(db) })
    }
}

#[async_trait]
impl ClaimStore for RedbClaimStore {
    async fn put(
        &self,
        link: &Link,
        commitment: &LocationCommitment,
        archive: Vec<u8>,
    ) -> Result<(), StoreError> {
        let index_key = k_index(
            &commitment.payload.audience,
            &commitment.payload.content,
            link,
        );
        let expiry = commitment.payload.expiration.unwrap_or(NO_EXPIRY);

        let w = self.db.begin_write().map_err(backend)?;
        {
            let mut claims = w.open_table(CLAIMS).map_err(backend)?;
            claims.insert(&link.0, archive.as_slice()).map_err(backend)?;
            let mut index = w.open_table(CLAIM_INDEX).map_err(backend)?;
            index
                .insert(index_key.as_slice(), &be64(expiry))
                .map_err(backend)?;
        }
        w.commit().map_err(backend)?;
        haven_telemetry::sinks::store_metrics().inc_commitments_persisted();
        Ok(())
    }

    async fn get_archive(&self, link: &Link) -> Result<Vec<u8>, StoreError> {
        let read = self.db.begin_read().map_err(backend)?;
        let table = read.open_table(CLAIMS).map_err(backend)?;
        let result = table
            .get(&link.0)
            .map_err(backend)?
            .map(|guard| guard.value().to_vec())
            .ok_or(StoreError::NotFound);
        result
    }

    async fn get(&self, link: &Link) -> Result<LocationCommitment, StoreError> {
        let archive = self.get_archive(link).await?;
        codec::from_bytes_canonical(&archive).map_err(StoreError::Decode)
    }

    async fn find_live(
        &self,
        audience: &Did,
        content: &Digest,
        now: u64,
    ) -> Result<Option<(Link, LocationCommitment)>, StoreError> {
        let prefix = k_index_prefix(audience, content);
        // Pad past the longest possible suffix (a 32-byte link), so an
        // all-0xFF link still sorts below the bound.
        let mut upper = prefix.clone();
        upper.extend(std::iter::repeat(0xFF).take(33));

        let live_link = {
            let read = self.db.begin_read().map_err(backend)?;
            let index = read.open_table(CLAIM_INDEX).map_err(backend)?;
            let mut found = None;
            for entry in index
                .range::<&[u8]>(prefix.as_slice()..upper.as_slice())
                .map_err(backend)?
            {
                let (key, value) = entry.map_err(backend)?;
                if u64::from_be_bytes(*value.value()) <= now {
                    continue;
                }
                let key = key.value();
                let link_bytes: [u8; 32] = key
                    .get(key.len() - 32..)
                    .and_then(|tail| tail.try_into().ok())
                    .ok_or_else(|| StoreError::Decode("claim index key too short".into()))?;
                found = Some(Link(link_bytes));
                break;
            }
            found
        };

        match live_link {
            None => Ok(None),
            Some(link) => {
                let commitment = self.get(&link).await?;
                Ok(Some((link, commitment)))
            }
        }
    }
}
