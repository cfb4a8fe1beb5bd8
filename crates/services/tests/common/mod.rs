// Path: crates/services/tests/common/mod.rs
//! Shared wiring for the end-to-end scenario tests: the full engine stack
//! over in-memory stores and recording stubs.
#![allow(dead_code)]

use haven_api::crypto::NodeSigner;
use haven_crypto::NodeIdentity;
use haven_services::blob::{AcceptHandler, AllocateHandler, ReplicaAllocateHandler};
use haven_services::replication::{DelegationCache, ReplicationSettings};
use haven_services::{BlobEngine, CapabilityGate, EngineConfig, Publisher, ReplicationEngine};
use haven_test_utils::{
    MemAdvertChain, MemAllocationStore, MemBlobStore, MemClaimStore, MemJobQueue,
    StubIndexingService, StubPeerTransport, StubUploadService,
};
use haven_types::codec;
use haven_types::id::Link;
use haven_types::invocation::{Envelope, Receipt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Notify};

pub const PUBLIC_URL: &str = "http://node.example:3000";

pub struct Harness {
    pub node: Arc<NodeIdentity>,
    pub service: Arc<NodeIdentity>,
    pub allocations: Arc<MemAllocationStore>,
    pub blobs: Arc<MemBlobStore>,
    pub claims: Arc<MemClaimStore>,
    pub queue: Arc<MemJobQueue>,
    pub chain: Arc<MemAdvertChain>,
    pub transport: Arc<StubPeerTransport>,
    pub upload: Arc<StubUploadService>,
    pub indexing: Arc<StubIndexingService>,
    pub publisher: Arc<Publisher>,
    pub engine: Arc<BlobEngine>,
    pub gate: CapabilityGate,
    pub wake: Arc<Notify>,
}

impl Harness {
    pub fn new() -> Self {
        let node = Arc::new(NodeIdentity::generate().unwrap());
        let service = Arc::new(NodeIdentity::generate().unwrap());

        let allocations = Arc::new(MemAllocationStore::default());
        let blobs = Arc::new(MemBlobStore::default());
        let claims = Arc::new(MemClaimStore::default());
        let queue = Arc::new(MemJobQueue::default());
        let chain = Arc::new(MemAdvertChain::default());
        let upload = Arc::new(StubUploadService::accepting());
        let indexing = Arc::new(StubIndexingService::default());
        let transport = Arc::new(StubPeerTransport::new(service.clone(), blobs.clone()));
        let wake = Arc::new(Notify::new());

        let publisher = Arc::new(Publisher::new(
            chain.clone(),
            transport.clone(),
            Some(indexing.clone()),
            vec!["http://announce.example/ads".to_string()],
            PUBLIC_URL,
        ));
        let engine = Arc::new(BlobEngine::new(
            node.clone(),
            allocations.clone(),
            blobs.clone(),
            claims.clone(),
            None,
            publisher.clone(),
            queue.clone(),
            wake.clone(),
            EngineConfig {
                max_blob_size: haven_types::DEFAULT_MAX_BLOB_SIZE,
                ticket_ttl_secs: 900,
                allocation_ttl_secs: 3600,
                commitment_ttl_secs: None,
                public_url: PUBLIC_URL.to_string(),
            },
        ));

        let mut gate = CapabilityGate::new(node.clone(), vec![service.did().clone()]);
        gate.register(Arc::new(AllocateHandler(engine.clone())));
        gate.register(Arc::new(AcceptHandler(engine.clone())));
        gate.register(Arc::new(ReplicaAllocateHandler(engine.clone())));

        Self {
            node,
            service,
            allocations,
            blobs,
            claims,
            queue,
            chain,
            transport,
            upload,
            indexing,
            publisher,
            engine,
            gate,
            wake,
        }
    }

    /// Builds the replication engine with fast retry timing for tests.
    pub fn replication(
        &self,
        max_attempts: u32,
    ) -> (Arc<ReplicationEngine>, watch::Sender<bool>) {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let engine = Arc::new(ReplicationEngine::new(
            self.node.clone(),
            self.queue.clone(),
            self.blobs.clone(),
            None,
            self.transport.clone(),
            self.upload.clone(),
            self.engine.clone(),
            DelegationCache::new(60),
            self.wake.clone(),
            shutdown_rx,
            ReplicationSettings {
                workers: 2,
                max_attempts,
                retry_backoff: Duration::from_millis(10),
                job_timeout: Duration::from_secs(30),
                idle_poll: Duration::from_millis(20),
            },
        ));
        (engine, shutdown_tx)
    }

    /// Dispatches a service-issued invocation through the gate.
    pub async fn dispatch(&self, ability: &str, caveats: Vec<u8>, cause: Option<Link>) -> Receipt {
        let envelope = haven_test_utils::service_envelope(
            &self.service,
            self.node.did(),
            ability,
            caveats,
            cause,
            Vec::new(),
        )
        .unwrap();
        self.gate.dispatch_envelope(&envelope).await.unwrap()
    }

    /// Dispatches a pre-built envelope through the gate.
    pub async fn dispatch_envelope(&self, envelope: &Envelope) -> Receipt {
        self.gate.dispatch_envelope(envelope).await.unwrap()
    }
}

/// Decodes the ok branch of a receipt, panicking with the failure on error.
pub fn expect_ok<T: parity_scale_codec::Decode>(receipt: &Receipt) -> T {
    match &receipt.payload.out {
        haven_types::invocation::Outcome::Ok(bytes) => {
            codec::from_bytes_canonical(bytes).expect("decode ok record")
        }
        haven_types::invocation::Outcome::Error(failure) => {
            panic!("expected ok receipt, got {}: {}", failure.code, failure.message)
        }
    }
}

/// The failure carried by an error receipt.
pub fn expect_error(receipt: &Receipt) -> haven_types::invocation::Failure {
    match &receipt.payload.out {
        haven_types::invocation::Outcome::Ok(_) => panic!("expected error receipt"),
        haven_types::invocation::Outcome::Error(failure) => failure.clone(),
    }
}

/// Polls `check` until it passes or the deadline lapses.
pub async fn wait_until<F, Fut>(what: &str, check: F)
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..500 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {what}");
}
