// Path: crates/storage/src/advert_chain.rs
//! Persisted advertisement chain.
//!
//! Entries are keyed by their link; a single `HEAD` slot points at the most
//! recent entry. Appends swap the head and insert the entry in one
//! transaction. The publisher serializes appends under its own mutex, so no
//! additional locking happens here.

use crate::backend;
use async_trait::async_trait;
use haven_api::publish::{AdvertChain, Advertisement};
use haven_types::codec;
use haven_types::error::StoreError;
use haven_types::id::Link;
use redb::{Database, ReadableTable, TableDefinition};
use std::path::Path;
use std::sync::Arc;

const ENTRIES: TableDefinition<&[u8; 32], &[u8]> = TableDefinition::new("AD_ENTRIES");
const HEAD: TableDefinition<&[u8; 4], &[u8; 32]> = TableDefinition::new("AD_HEAD");

fn key_head() -> [u8; 4] {
    *b"HEAD"
}

/// Advertisement chain over a single redb database.
#[derive(Clone)]
pub struct RedbAdvertChain {
    db: Arc<Database>,
}

impl RedbAdvertChain {
    /// Opens (or creates) the chain at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let db = Database::create(path).map_err(backend)?;
        let w = db.begin_write().map_err(backend)?;
        w.open_table(ENTRIES).map_err(backend)?;
        w.open_table(HEAD).map_err(backend)?;
        w.commit().map_err(backend)?;
        Ok(Self { db: Arc::new(db) })
    }

    fn read_entry(&self, link: &Link) -> Result<Advertisement, StoreError> {
        let read = self.db.begin_read().map_err(backend)?;
        let table = read.open_table(ENTRIES).map_err(backend)?;
        let guard = table
            .get(&link.0)
            .map_err(backend)?
            .ok_or(StoreError::NotFound)?;
        codec::from_bytes_canonical(guard.value()).map_err(StoreError::Decode)
    }
}

#[async_trait]
impl AdvertChain for RedbAdvertChain {
    async fn head(&self) -> Result<Option<(Link, Vec<u8>)>, StoreError> {
        let head_link = {
            let read = self.db.begin_read().map_err(backend)?;
            let table = read.open_table(HEAD).map_err(backend)?;
            let result = table.get(&key_head()).map_err(backend)?.map(|g| Link(*g.value()));
            result
        };
        match head_link {
            None => Ok(None),
            Some(link) => {
                let entry = self.read_entry(&link)?;
                Ok(Some((link, entry.context_id)))
            }
        }
    }

    async fn append(&self, link: &Link, ad: &Advertisement) -> Result<(), StoreError> {
        let value = codec::to_bytes_canonical(ad);
        let w = self.db.begin_write().map_err(backend)?;
        {
            let mut entries = w.open_table(ENTRIES).map_err(backend)?;
            entries.insert(&link.0, value.as_slice()).map_err(backend)?;
            let mut head = w.open_table(HEAD).map_err(backend)?;
            head.insert(&key_head(), &link.0).map_err(backend)?;
        }
        w.commit().map_err(backend)?;
        Ok(())
    }

    async fn get(&self, link: &Link) -> Result<Advertisement, StoreError> {
        self.read_entry(link)
    }
}
