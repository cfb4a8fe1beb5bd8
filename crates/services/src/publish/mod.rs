// Path: crates/services/src/publish/mod.rs
//! The advertisement publisher.
//!
//! Serializes location commitments into discovery-layer advertisements and
//! appends them to the persisted chain. Chain appends are strictly
//! serialized under the process-wide mutex held here; announce notifications
//! and indexing-service caching are side channels that never fail a publish.

use haven_api::publish::{AdvertChain, Advertisement};
use haven_api::remote::{IndexingService, PeerTransport};
use haven_crypto::hash::link_of;
use haven_types::capability::ProviderInfo;
use haven_types::claim::LocationCommitment;
use haven_types::codec;
use haven_types::error::PublishError;
use haven_types::id::Link;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Publishes location commitments to the discovery layer.
pub struct Publisher {
    chain: Arc<dyn AdvertChain>,
    /// The only process-wide lock in the node; it serializes head reads and
    /// appends so concurrent publishes chain in acquire order.
    head_lock: Mutex<()>,
    transport: Arc<dyn PeerTransport>,
    indexing: Option<Arc<dyn IndexingService>>,
    announce_urls: Vec<String>,
    /// Provider addresses shipped with `claim/cache`.
    public_url: String,
}

impl Publisher {
    /// Builds a publisher over the given chain and side channels.
    pub fn new(
        chain: Arc<dyn AdvertChain>,
        transport: Arc<dyn PeerTransport>,
        indexing: Option<Arc<dyn IndexingService>>,
        announce_urls: Vec<String>,
        public_url: impl Into<String>,
    ) -> Self {
        Self {
            chain,
            head_lock: Mutex::new(()),
            transport,
            indexing,
            announce_urls,
            public_url: public_url.into(),
        }
    }

    /// Derives the chain's idempotency key for a commitment:
    /// the canonical encoding of `(space, digest)`.
    pub fn context_id(commitment: &LocationCommitment) -> Vec<u8> {
        codec::to_bytes_canonical(&(
            commitment.payload.audience.clone(),
            commitment.payload.content.clone(),
        ))
    }

    /// Publishes one commitment. Returns the chain entry link, which is the
    /// existing head when the context was already published (idempotent).
    pub async fn publish(
        &self,
        commitment: &LocationCommitment,
        claim_link: &Link,
    ) -> Result<Link, PublishError> {
        let context_id = Self::context_id(commitment);

        let entry_link = {
            let _guard = self.head_lock.lock().await;

            let head = self.chain.head().await?;
            if let Some((head_link, head_context)) = &head {
                if *head_context == context_id {
                    tracing::debug!(target: "publisher", claim = %claim_link, "context already at chain head, skipping");
                    return Ok(*head_link);
                }
            }

            let ad = Advertisement {
                context_id,
                shard: commitment.payload.content.clone(),
                claim: *claim_link,
                expiration: commitment.payload.expiration,
                digests: vec![commitment.payload.content.clone()],
                prev: head.map(|(link, _)| link),
            };
            let entry_link =
                link_of(&ad).map_err(|e| PublishError::Encode(e.to_string()))?;
            self.chain.append(&entry_link, &ad).await?;
            haven_telemetry::sinks::publish_metrics().inc_adverts_published();
            tracing::info!(target: "publisher", entry = %entry_link, claim = %claim_link, "advertisement appended");
            entry_link
        };

        self.notify(&entry_link).await;
        self.cache_claim(commitment).await;
        Ok(entry_link)
    }

    /// Best-effort announce POSTs; failures are logged and swallowed.
    async fn notify(&self, entry_link: &Link) {
        let payload = entry_link.0.to_vec();
        let sink = haven_telemetry::sinks::publish_metrics();
        for url in &self.announce_urls {
            match self.transport.announce(url, &payload).await {
                Ok(()) => sink.inc_announce("ok"),
                Err(e) => {
                    sink.inc_announce("error");
                    tracing::warn!(target: "publisher", url = %url, error = %e, "announce failed");
                }
            }
        }
    }

    /// Advisory `claim/cache` to the indexing service.
    async fn cache_claim(&self, commitment: &LocationCommitment) {
        let Some(indexing) = &self.indexing else {
            return;
        };
        let provider = ProviderInfo {
            addresses: vec![self.public_url.clone()],
        };
        if let Err(e) = indexing.cache_claim(commitment, &provider).await {
            tracing::warn!(target: "publisher", error = %e, "claim/cache failed");
        }
    }
}
