// Path: crates/test_utils/src/stubs.rs
//! Recording stub clients for the remote seams.

use async_trait::async_trait;
use bytes::Bytes;
use futures::{stream, TryStreamExt};
use haven_api::crypto::NodeSigner;
use haven_api::remote::{
    ByteStream, IndexingService, PeerTransport, RemoteError, UploadService,
};
use haven_api::store::BlobStore;
use haven_crypto::envelope::sign_delegation;
use haven_crypto::NodeIdentity;
use haven_types::capability::ProviderInfo;
use haven_types::claim::{LocationCommitment, UploadAddress};
use haven_types::id::{Did, Digest};
use haven_types::invocation::{Delegation, DelegationPayload, Receipt};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

/// A peer transport that serves programmed bodies, routes sink PUTs into a
/// blob store, and counts every fetch.
pub struct StubPeerTransport {
    granter: Arc<NodeIdentity>,
    bodies: Mutex<HashMap<String, Bytes>>,
    fetch_counts: Mutex<HashMap<String, u32>>,
    grant_count: AtomicU32,
    announces: Mutex<Vec<String>>,
    sink_store: Arc<dyn BlobStore>,
}

impl StubPeerTransport {
    /// Builds a transport whose sink PUTs land in `sink_store`.
    pub fn new(granter: Arc<NodeIdentity>, sink_store: Arc<dyn BlobStore>) -> Self {
        Self {
            granter,
            bodies: Mutex::new(HashMap::new()),
            fetch_counts: Mutex::new(HashMap::new()),
            grant_count: AtomicU32::new(0),
            announces: Mutex::new(Vec::new()),
            sink_store,
        }
    }

    /// Programs the body served for a source URL.
    pub fn serve(&self, url: impl Into<String>, body: Bytes) {
        self.bodies.lock().unwrap().insert(url.into(), body);
    }

    /// Number of fetches issued against a URL.
    pub fn fetches(&self, url: &str) -> u32 {
        *self.fetch_counts.lock().unwrap().get(url).unwrap_or(&0)
    }

    /// Number of `access/grant` calls issued.
    pub fn grants(&self) -> u32 {
        self.grant_count.load(Ordering::SeqCst)
    }

    /// Announce URLs hit, in order.
    pub fn announces(&self) -> Vec<String> {
        self.announces.lock().unwrap().clone()
    }

    fn digest_from_sink(sink: &UploadAddress) -> Result<Digest, RemoteError> {
        let path = sink
            .url
            .split('?')
            .next()
            .unwrap_or_default();
        let text = path
            .rsplit('/')
            .next()
            .ok_or_else(|| RemoteError::Http("sink url has no path".to_string()))?;
        Digest::parse(text).map_err(|e| RemoteError::Http(e.to_string()))
    }
}

#[async_trait]
impl PeerTransport for StubPeerTransport {
    async fn grant(
        &self,
        _peer_url: &str,
        peer: &Did,
        ability: &str,
    ) -> Result<Delegation, RemoteError> {
        self.grant_count.fetch_add(1, Ordering::SeqCst);
        sign_delegation(
            self.granter.as_ref(),
            DelegationPayload {
                issuer: self.granter.did().clone(),
                audience: peer.clone(),
                subject: self.granter.did().clone(),
                ability: ability.to_string(),
                not_before: None,
                expiration: None,
            },
        )
        .map_err(|e| RemoteError::Http(e.to_string()))
    }

    async fn fetch(
        &self,
        url: &str,
        _proof: Option<&Delegation>,
    ) -> Result<ByteStream, RemoteError> {
        *self
            .fetch_counts
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_insert(0) += 1;
        let body = self
            .bodies
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| RemoteError::Rejected {
                status: 404,
                body: "not served".to_string(),
            })?;
        Ok(Box::pin(stream::iter(vec![Ok(body)])))
    }

    async fn store(
        &self,
        sink: &UploadAddress,
        body: ByteStream,
        _len: u64,
    ) -> Result<(), RemoteError> {
        let digest = Self::digest_from_sink(sink)?;
        let chunks: Vec<Bytes> = body.try_collect().await?;
        let mut joined = Vec::new();
        for chunk in chunks {
            joined.extend_from_slice(&chunk);
        }
        self.sink_store
            .put(&digest, Bytes::from(joined))
            .await
            .map_err(|e| RemoteError::Rejected {
                status: 409,
                body: e.to_string(),
            })
    }

    async fn announce(&self, url: &str, _payload: &[u8]) -> Result<(), RemoteError> {
        self.announces.lock().unwrap().push(url.to_string());
        Ok(())
    }
}

/// An upload service that records every delivery attempt and can be told to
/// fail the first N (or reject ok-receipts permanently).
#[derive(Default)]
pub struct StubUploadService {
    deliveries: Mutex<Vec<Receipt>>,
    failures_remaining: AtomicU32,
    reject_ok: std::sync::atomic::AtomicBool,
}

impl StubUploadService {
    /// A service that accepts everything.
    pub fn accepting() -> Self {
        Self::default()
    }

    /// Fails the next `n` conclude calls with a 500.
    pub fn fail_next(&self, n: u32) {
        self.failures_remaining.store(n, Ordering::SeqCst);
    }

    /// Permanently rejects ok-receipts; error receipts (the dead-letter
    /// path) are still accepted.
    pub fn reject_ok(&self) {
        self.reject_ok.store(true, Ordering::SeqCst);
    }

    /// Every receipt a conclude call carried, whether the delivery was
    /// accepted or not.
    pub fn deliveries(&self) -> Vec<Receipt> {
        self.deliveries.lock().unwrap().clone()
    }
}

#[async_trait]
impl UploadService for StubUploadService {
    async fn conclude(&self, receipt: &Receipt) -> Result<(), RemoteError> {
        self.deliveries.lock().unwrap().push(receipt.clone());

        if self.reject_ok.load(Ordering::SeqCst) && receipt.payload.out.is_ok() {
            return Err(RemoteError::Rejected {
                status: 500,
                body: "permanently rejected".to_string(),
            });
        }
        let remaining = self.failures_remaining.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures_remaining.store(remaining - 1, Ordering::SeqCst);
            return Err(RemoteError::Rejected {
                status: 500,
                body: "transient failure".to_string(),
            });
        }
        Ok(())
    }
}

/// An indexing service that records cached claims.
#[derive(Default)]
pub struct StubIndexingService {
    claims: Mutex<Vec<(LocationCommitment, ProviderInfo)>>,
}

impl StubIndexingService {
    /// Claims cached so far.
    pub fn claims(&self) -> Vec<(LocationCommitment, ProviderInfo)> {
        self.claims.lock().unwrap().clone()
    }
}

#[async_trait]
impl IndexingService for StubIndexingService {
    async fn cache_claim(
        &self,
        claim: &LocationCommitment,
        provider: &ProviderInfo,
    ) -> Result<(), RemoteError> {
        self.claims
            .lock()
            .unwrap()
            .push((claim.clone(), provider.clone()));
        Ok(())
    }
}
