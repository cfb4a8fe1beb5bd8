// Path: crates/services/src/replication/grants.rs
//! Cache of short-lived peer delegations.
//!
//! One entry per `(audience, ability)`; eviction is by expiration, never by
//! size. A configurable minimum remaining TTL forces a refresh before an
//! almost-expired grant is used, so a transfer never starts with a grant
//! that dies mid-stream.

use dashmap::DashMap;
use haven_api::remote::{PeerTransport, RemoteError};
use haven_types::id::Did;
use haven_types::invocation::Delegation;
use std::sync::Arc;

/// Per-peer `access/grant` cache.
#[derive(Default)]
pub struct DelegationCache {
    entries: DashMap<(Did, String), Delegation>,
    /// Minimum remaining validity, in seconds, for a cached grant to be
    /// reused.
    min_ttl_secs: u64,
}

impl DelegationCache {
    /// Builds a cache with the given refresh threshold.
    pub fn new(min_ttl_secs: u64) -> Self {
        Self {
            entries: DashMap::new(),
            min_ttl_secs,
        }
    }

    /// Returns a cached grant for `(peer, ability)` with enough validity
    /// left, or asks the peer for a fresh one via `access/grant`.
    pub async fn get_or_grant(
        &self,
        transport: &Arc<dyn PeerTransport>,
        peer_url: &str,
        peer: &Did,
        ability: &str,
        now: u64,
    ) -> Result<Delegation, RemoteError> {
        let key = (peer.clone(), ability.to_string());
        if let Some(entry) = self.entries.get(&key) {
            if self.usable(entry.value(), now) {
                return Ok(entry.value().clone());
            }
        }

        let grant = transport.grant(peer_url, peer, ability).await?;
        self.entries.insert(key, grant.clone());
        Ok(grant)
    }

    fn usable(&self, grant: &Delegation, now: u64) -> bool {
        match grant.payload.expiration {
            None => true,
            Some(exp) => exp > now + self.min_ttl_secs,
        }
    }

    /// Drops expired entries. Called opportunistically by the workers.
    pub fn evict_expired(&self, now: u64) {
        self.entries
            .retain(|_, grant| grant.payload.expiration.map_or(true, |exp| exp > now));
    }

    /// Number of cached grants, expired or not.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
