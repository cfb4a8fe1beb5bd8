// Path: crates/storage/src/blob_store.rs
//! Filesystem blob store with a redb size index.
//!
//! Payloads live under `<root>/blobs/<aa>/<rest-of-hex>`; the redb table maps
//! digest bytes to size and is the membership test. Writes land in a temp
//! file first and are renamed into place only after the digest verifies, so
//! a blob is either fully present with correct bytes or absent, never
//! partial.

use crate::backend;
use async_trait::async_trait;
use bytes::Bytes;
use haven_api::store::{be64, BlobStore};
use haven_crypto::hash::digest_of;
use haven_types::error::StoreError;
use haven_types::id::Digest;
use redb::{Database, ReadableTable, TableDefinition};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

const BLOBS: TableDefinition<&[u8], &[u8; 8]> = TableDefinition::new("BLOBS");

/// Content-addressed blob store rooted at a data directory.
#[derive(Clone)]
pub struct FsBlobStore {
    db: Arc<Database>,
    root: PathBuf,
}

impl FsBlobStore {
    /// Opens (or creates) the store under `root`.
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self, StoreError> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(root.join("blobs")).map_err(backend)?;
        std::fs::create_dir_all(root.join("tmp")).map_err(backend)?;

        let db = Database::create(root.join("blobs.redb")).map_err(backend)?;
        let w = db.begin_write().map_err(backend)?;
        w.open_table(BLOBS).map_err(backend)?;
        w.commit().map_err(backend)?;
        Ok(Self {
            db: Arc::new(db),
            root,
        })
    }

    fn payload_path(&self, digest: &Digest) -> PathBuf {
        let hex = hex::encode(digest.raw());
        let (shard, rest) = hex.split_at(2);
        self.root.join("blobs").join(shard).join(rest)
    }

    fn index_get(&self, digest: &Digest) -> Result<Option<u64>, StoreError> {
        let read = self.db.begin_read().map_err(backend)?;
        let table = read.open_table(BLOBS).map_err(backend)?;
        let result = table
            .get(digest.as_bytes())
            .map_err(backend)?
            .map(|guard| u64::from_be_bytes(*guard.value()));
        Ok(result)
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn put(&self, digest: &Digest, body: Bytes) -> Result<(), StoreError> {
        if self.index_get(digest)?.is_some() {
            // Same digest means same bytes; re-puts are idempotent.
            return Ok(());
        }

        let actual = digest_of(&body).map_err(|e| StoreError::Backend(e.to_string()))?;
        if &actual != digest {
            return Err(StoreError::DataInconsistent {
                expected: digest.to_string(),
                got: actual.to_string(),
            });
        }

        let final_path = self.payload_path(digest);
        if let Some(parent) = final_path.parent() {
            std::fs::create_dir_all(parent).map_err(backend)?;
        }
        let tmp_path = self
            .root
            .join("tmp")
            .join(hex::encode(digest.raw()));
        {
            let mut tmp = std::fs::File::create(&tmp_path).map_err(backend)?;
            tmp.write_all(&body).map_err(backend)?;
            tmp.sync_data().map_err(backend)?;
        }
        std::fs::rename(&tmp_path, &final_path).map_err(backend)?;

        let w = self.db.begin_write().map_err(backend)?;
        {
            let mut table = w.open_table(BLOBS).map_err(backend)?;
            table
                .insert(digest.as_bytes(), &be64(body.len() as u64))
                .map_err(backend)?;
        }
        w.commit().map_err(backend)?;
        haven_telemetry::sinks::store_metrics().inc_blob_bytes_written(body.len() as u64);
        Ok(())
    }

    async fn get(&self, digest: &Digest) -> Result<Bytes, StoreError> {
        let size = self.index_get(digest)?.ok_or(StoreError::NotFound)?;
        let mut file = std::fs::File::open(self.payload_path(digest)).map_err(backend)?;
        let mut body = Vec::with_capacity(size as usize);
        file.read_to_end(&mut body).map_err(backend)?;
        Ok(Bytes::from(body))
    }

    async fn get_range(&self, digest: &Digest, start: u64, end: u64) -> Result<Bytes, StoreError> {
        let size = self.index_get(digest)?.ok_or(StoreError::NotFound)?;
        if start > end || end >= size {
            return Err(StoreError::RangeNotSatisfiable { start, end, size });
        }
        let mut file = std::fs::File::open(self.payload_path(digest)).map_err(backend)?;
        file.seek(SeekFrom::Start(start)).map_err(backend)?;
        let len = (end - start + 1) as usize;
        let mut body = vec![0u8; len];
        file.read_exact(&mut body).map_err(backend)?;
        Ok(Bytes::from(body))
    }

    async fn stat(&self, digest: &Digest) -> Result<u64, StoreError> {
        self.index_get(digest)?.ok_or(StoreError::NotFound)
    }

    async fn contains(&self, digest: &Digest) -> Result<bool, StoreError> {
        Ok(self.index_get(digest)?.is_some())
    }
}
