// Path: crates/node/src/bin/havend.rs
#![forbid(unsafe_code)]

//! The Haven storage node binary.
//!
//! Loads the TOML configuration, opens the durable stores, wires the engine,
//! gate, publisher, and replication pool, and serves the HTTP gateway plus
//! the telemetry endpoint until SIGINT/SIGTERM.

use anyhow::{Context, Result};
use clap::Parser;
use haven_api::crypto::NodeSigner;
use haven_api::remote::IndexingService;
use haven_crypto::NodeIdentity;
use haven_services::blob::{AcceptHandler, AllocateHandler, ReplicaAllocateHandler};
use haven_services::remote::{
    build_client, HttpIndexingService, HttpPeerTransport, HttpUploadService,
};
use haven_services::replication::{DelegationCache, ReplicationSettings};
use haven_services::{BlobEngine, CapabilityGate, EngineConfig, Publisher, ReplicationEngine};
use haven_storage::{
    FsBlobStore, RedbAdvertChain, RedbAllocationStore, RedbClaimStore, RedbJobQueue,
};
use haven_types::config::NodeConfig;
use http_store_gateway::{GatewayConfig, GatewayState};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Notify};

#[derive(Parser, Debug)]
#[clap(name = "havend", about = "Haven decentralized storage node")]
struct Opts {
    #[clap(long, help = "Path to the node.toml configuration file.")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let opts = Opts::parse();

    haven_telemetry::init_tracing()?;
    haven_telemetry::prometheus::install();
    http_store_gateway::install_gateway_metrics();

    let raw = std::fs::read_to_string(&opts.config)
        .with_context(|| format!("reading {}", opts.config.display()))?;
    let config: NodeConfig = toml::from_str(&raw).context("parsing configuration")?;

    let identity = Arc::new(
        NodeIdentity::load(&config.identity.key_file).context("loading node identity")?,
    );
    tracing::info!(target: "node", did = %identity.did(), "node identity loaded");

    // Durable stores.
    let data_dir = &config.storage.data_dir;
    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("creating {}", data_dir.display()))?;
    let allocations = Arc::new(RedbAllocationStore::open(data_dir.join("allocations.redb"))?);
    let claims = Arc::new(RedbClaimStore::open(data_dir.join("claims.redb"))?);
    let queue = Arc::new(RedbJobQueue::open(data_dir.join("jobs.redb"))?);
    let chain = Arc::new(RedbAdvertChain::open(data_dir.join("adverts.redb"))?);
    let blobs = Arc::new(FsBlobStore::open(data_dir)?);

    // Remote collaborators.
    let http = build_client().map_err(|e| anyhow::anyhow!("building http client: {e}"))?;
    let transport = Arc::new(HttpPeerTransport::new(http.clone(), identity.clone()));
    let indexing: Option<Arc<dyn IndexingService>> = match (
        &config.publisher.indexing_url,
        &config.publisher.indexing_did,
    ) {
        (Some(url), Some(did)) => Some(Arc::new(HttpIndexingService::new(
            http.clone(),
            identity.clone(),
            url.clone(),
            did.clone(),
        ))),
        (Some(_), None) => {
            anyhow::bail!("publisher.indexing_url is set but publisher.indexing_did is not")
        }
        _ => None,
    };
    let upload_service = Arc::new(HttpUploadService::new(
        http,
        identity.clone(),
        config.upload_service.url.clone(),
        config.upload_service.did.clone(),
    ));

    let publisher = Arc::new(Publisher::new(
        chain,
        transport.clone(),
        indexing,
        config.publisher.announce_urls.clone(),
        config.public_url.clone(),
    ));

    // The engine behind the three service-reserved abilities.
    let wake = Arc::new(Notify::new());
    let engine = Arc::new(BlobEngine::new(
        identity.clone(),
        allocations.clone(),
        blobs.clone(),
        claims.clone(),
        None, // PDP is wired through PieceFinder when the subsystem is deployed
        publisher,
        queue.clone(),
        wake.clone(),
        EngineConfig {
            max_blob_size: config.allocation.max_blob_size,
            ticket_ttl_secs: config.allocation.ticket_ttl_secs,
            allocation_ttl_secs: config.allocation.allocation_ttl_secs,
            commitment_ttl_secs: config.publisher.commitment_ttl_secs,
            public_url: config.public_url.clone(),
        },
    ));

    // Replication worker pool.
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let workers = if config.replication.workers == 0 {
        std::thread::available_parallelism().map_or(4, usize::from)
    } else {
        config.replication.workers
    };
    let replication = Arc::new(ReplicationEngine::new(
        identity.clone(),
        queue,
        blobs.clone(),
        None,
        transport,
        upload_service,
        engine.clone(),
        DelegationCache::new(config.replication.grant_min_ttl_secs),
        wake.clone(),
        shutdown_rx.clone(),
        ReplicationSettings {
            workers,
            max_attempts: config.replication.max_attempts,
            retry_backoff: Duration::from_secs(config.replication.retry_backoff_secs),
            job_timeout: Duration::from_secs(config.replication.job_timeout_secs),
            idle_poll: Duration::from_secs(5),
        },
    ));
    let worker_handles = replication.start().await?;
    tracing::info!(target: "node", workers, "replication pool started");

    // The capability gate and its handlers.
    let mut trusted_roots = config.trust.trusted_roots.clone();
    if !trusted_roots.contains(&config.upload_service.did) {
        trusted_roots.push(config.upload_service.did.clone());
    }
    let mut gate = CapabilityGate::new(identity.clone(), trusted_roots);
    gate.register(Arc::new(AllocateHandler(engine.clone())));
    gate.register(Arc::new(AcceptHandler(engine.clone())));
    gate.register(Arc::new(ReplicaAllocateHandler(engine.clone())));

    let state = Arc::new(GatewayState {
        gate: Arc::new(gate),
        blobs,
        claims,
        allocations,
        presign: engine.presign().clone(),
    });

    // Telemetry server.
    let metrics_addr = config
        .metrics_addr
        .parse()
        .context("parsing metrics_addr")?;
    let telemetry_handle = tokio::spawn(haven_telemetry::http::run_server(
        metrics_addr,
        shutdown_rx.clone(),
    ));

    // Gateway server.
    let gateway_config = GatewayConfig {
        listen_addr: config.listen_addr.clone(),
        body_limit: config.allocation.max_blob_size as usize + 4096,
        ..GatewayConfig::default()
    };
    let gateway_handle = tokio::spawn(http_store_gateway::run_server(
        state,
        gateway_config,
        shutdown_rx,
    ));

    wait_for_signal().await;
    tracing::info!(target: "node", "shutdown signal received");

    let _ = shutdown_tx.send(true);
    wake.notify_waiters();
    for handle in worker_handles {
        let _ = handle.await;
    }
    let _ = gateway_handle.await;
    let _ = telemetry_handle.await;
    tracing::info!(target: "node", "bye");
    Ok(())
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};
    let mut term = match signal(SignalKind::terminate()) {
        Ok(term) => term,
        Err(e) => {
            tracing::error!(target: "node", error = %e, "installing SIGTERM handler failed");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = term.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
