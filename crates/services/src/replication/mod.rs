// Path: crates/services/src/replication/mod.rs
//! The durable replication engine.
//!
//! A bounded worker pool drains the persistent job queue. Each worker claims
//! a job, runs the idempotent transfer procedure under the job deadline, and
//! delivers the signed `replica/transfer` receipt to the upload service via
//! `ucan/conclude`; a failed delivery is a failed attempt. Attempts are
//! persisted before they run, retries back off linearly, and a job whose
//! budget is spent is dead-lettered with an error receipt.
//!
//! Jobs are independent: a failure is local to its job and never blocks the
//! pool.

pub mod grants;

pub use grants::DelegationCache;

use crate::blob::BlobEngine;
use crate::time::now_secs;
use haven_api::crypto::NodeSigner;
use haven_api::pdp::PieceFinder;
use haven_api::queue::{JobId, JobQueue};
use haven_api::remote::{PeerTransport, UploadService};
use haven_api::store::BlobStore;
use haven_crypto::envelope::sign_receipt;
use haven_crypto::NodeIdentity;
use haven_types::capability::{BlobAcceptOk, BlobRef, BLOB_RETRIEVE};
use haven_types::codec;
use haven_types::error::ReplicationError;
use haven_types::id::Link;
use haven_types::invocation::{Failure, Outcome, Receipt, ReceiptPayload};
use haven_types::replication::{JobRecord, ReplicationJob};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;

/// Replication tuning, lifted from the node configuration at wiring time.
#[derive(Clone, Debug)]
pub struct ReplicationSettings {
    /// Worker pool size.
    pub workers: usize,
    /// Attempt budget per job.
    pub max_attempts: u32,
    /// Base backoff between attempts; attempt `n` waits `n` times this.
    pub retry_backoff: Duration,
    /// Deadline for a single transfer attempt.
    pub job_timeout: Duration,
    /// Poll interval when the queue is idle and no wake arrives.
    pub idle_poll: Duration,
}

impl Default for ReplicationSettings {
    fn default() -> Self {
        Self {
            workers: std::thread::available_parallelism().map_or(4, usize::from),
            max_attempts: 10,
            retry_backoff: Duration::from_secs(30),
            job_timeout: Duration::from_secs(3600),
            idle_poll: Duration::from_secs(5),
        }
    }
}

/// The replication engine and its worker pool.
pub struct ReplicationEngine {
    identity: Arc<NodeIdentity>,
    queue: Arc<dyn JobQueue>,
    blobs: Arc<dyn BlobStore>,
    pieces: Option<Arc<dyn PieceFinder>>,
    transport: Arc<dyn PeerTransport>,
    upload_service: Arc<dyn UploadService>,
    engine: Arc<BlobEngine>,
    grants: DelegationCache,
    wake: Arc<Notify>,
    shutdown: watch::Receiver<bool>,
    settings: ReplicationSettings,
}

impl ReplicationEngine {
    /// Wires the engine over its collaborators.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        identity: Arc<NodeIdentity>,
        queue: Arc<dyn JobQueue>,
        blobs: Arc<dyn BlobStore>,
        pieces: Option<Arc<dyn PieceFinder>>,
        transport: Arc<dyn PeerTransport>,
        upload_service: Arc<dyn UploadService>,
        engine: Arc<BlobEngine>,
        grants: DelegationCache,
        wake: Arc<Notify>,
        shutdown: watch::Receiver<bool>,
        settings: ReplicationSettings,
    ) -> Self {
        Self {
            identity,
            queue,
            blobs,
            pieces,
            transport,
            upload_service,
            engine,
            grants,
            wake,
            shutdown,
            settings,
        }
    }

    /// Requeues jobs interrupted by the previous process and starts the
    /// worker pool.
    pub async fn start(self: Arc<Self>) -> Result<Vec<JoinHandle<()>>, ReplicationError> {
        let recovered = self.queue.recover().await?;
        if recovered > 0 {
            tracing::info!(target: "replication", recovered, "requeued interrupted jobs");
        }
        let workers = self.settings.workers.max(1);
        let handles = (0..workers)
            .map(|worker| {
                let engine = self.clone();
                tokio::spawn(async move { engine.worker_loop(worker).await })
            })
            .collect();
        Ok(handles)
    }

    async fn worker_loop(&self, worker: usize) {
        let mut shutdown = self.shutdown.clone();
        loop {
            if *shutdown.borrow() {
                tracing::debug!(target: "replication", worker, "worker stopping");
                return;
            }
            match self.queue.claim().await {
                Ok(Some((id, record))) => self.process(id, record).await,
                Ok(None) => {
                    tokio::select! {
                        _ = self.wake.notified() => {}
                        _ = shutdown.changed() => {}
                        _ = tokio::time::sleep(self.settings.idle_poll) => {}
                    }
                }
                Err(e) => {
                    tracing::warn!(target: "replication", worker, error = %e, "queue claim failed");
                    tokio::time::sleep(self.settings.idle_poll).await;
                }
            }
        }
    }

    /// Runs one claimed job to completion, dead-letter, or shutdown.
    async fn process(&self, id: JobId, record: JobRecord) {
        let mut shutdown = self.shutdown.clone();
        let job = record.job;
        loop {
            if *shutdown.borrow() {
                if let Err(e) = self.queue.release(id).await {
                    tracing::warn!(target: "replication", id, error = %e, "release on shutdown failed");
                }
                return;
            }

            let attempts = match self.queue.record_attempt(id).await {
                Ok(n) => n,
                Err(e) => {
                    tracing::warn!(target: "replication", id, error = %e, "persisting attempt failed");
                    return;
                }
            };

            let started = std::time::Instant::now();
            // Shutdown interrupts the attempt; the job goes back to the
            // queue and the idempotent transfer picks up where it left off
            // on the next run.
            let outcome = tokio::select! {
                outcome = tokio::time::timeout(self.settings.job_timeout, self.run_attempt(&job)) => outcome,
                _ = shutdown.changed() => {
                    if let Err(e) = self.queue.release(id).await {
                        tracing::warn!(target: "replication", id, error = %e, "release on shutdown failed");
                    }
                    return;
                }
            };
            let sink = haven_telemetry::sinks::replication_metrics();
            sink.observe_transfer_seconds(started.elapsed().as_secs_f64());
            let error = match outcome {
                Ok(Ok(())) => {
                    sink.inc_transfer_attempt("ok");
                    if let Err(e) = self.queue.complete(id).await {
                        tracing::warn!(target: "replication", id, error = %e, "completing job failed");
                    }
                    self.publish_depth().await;
                    tracing::info!(target: "replication", id, attempts, "transfer concluded");
                    return;
                }
                Ok(Err(e)) => e,
                Err(_) => ReplicationError::Upstream("transfer attempt timed out".to_string()),
            };

            tracing::warn!(target: "replication", id, attempts, error = %error, "transfer attempt failed");
            if attempts >= self.settings.max_attempts {
                sink.inc_transfer_attempt("dead");
                self.dead_letter(id, &job, &error).await;
                self.publish_depth().await;
                return;
            }
            sink.inc_transfer_attempt("retry");

            let backoff = self.settings.retry_backoff * attempts;
            tokio::select! {
                _ = tokio::time::sleep(backoff) => {}
                _ = shutdown.changed() => {}
            }
        }
    }

    async fn publish_depth(&self) {
        if let Ok(depth) = self.queue.depth().await {
            haven_telemetry::sinks::replication_metrics().set_queue_depth(depth);
        }
    }

    /// One attempt: transfer (idempotent), accept, receipt, conclude.
    async fn run_attempt(&self, job: &ReplicationJob) -> Result<(), ReplicationError> {
        let accepted = self.transfer(job).await?;
        let receipt = self.transfer_receipt(
            job.cause,
            Outcome::Ok(codec::to_bytes_canonical(&accepted.0)),
            accepted.1,
        )?;
        self.upload_service
            .conclude(&receipt)
            .await
            .map_err(|e| ReplicationError::Conclude(e.to_string()))?;
        Ok(())
    }

    /// The transfer procedure. Must be idempotent: a retry after the blob
    /// already landed locally re-fetches nothing.
    async fn transfer(
        &self,
        job: &ReplicationJob,
    ) -> Result<(BlobAcceptOk, Vec<Link>), ReplicationError> {
        if !self.locally_present(job).await? {
            match &job.sink {
                Some(sink) => self.pull(job, sink).await?,
                None => {
                    // Allocation saw the blob stored and withheld the sink;
                    // if the bytes have since vanished there is nothing to
                    // transfer from.
                    return Err(ReplicationError::Store(
                        haven_types::error::StoreError::NotFound,
                    ));
                }
            }
        }

        self.engine
            .accept(
                &job.space,
                &BlobRef {
                    digest: job.digest.clone(),
                    size: job.size,
                },
            )
            .await
            .map_err(|e| ReplicationError::Accept(e.to_string()))
    }

    async fn locally_present(&self, job: &ReplicationJob) -> Result<bool, ReplicationError> {
        if self.blobs.contains(&job.digest).await? {
            return Ok(true);
        }
        if let Some(pieces) = &self.pieces {
            if let Ok(Some(_)) = pieces.find_piece(&job.digest).await {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Authenticated GET from the source streamed straight into the sink PUT.
    async fn pull(
        &self,
        job: &ReplicationJob,
        sink: &haven_types::claim::UploadAddress,
    ) -> Result<(), ReplicationError> {
        let url = job
            .source
            .primary_url()
            .ok_or_else(|| ReplicationError::Upstream("source has no URL".to_string()))?;

        let grant = self
            .grants
            .get_or_grant(
                &self.transport,
                url,
                &job.source.issuer,
                BLOB_RETRIEVE,
                now_secs(),
            )
            .await
            .map_err(|e| ReplicationError::Upstream(e.to_string()))?;

        let body = self
            .transport
            .fetch(url, Some(&grant))
            .await
            .map_err(|e| ReplicationError::Upstream(e.to_string()))?;
        self.transport
            .store(sink, body, job.size)
            .await
            .map_err(|e| ReplicationError::Upstream(e.to_string()))?;

        self.grants.evict_expired(now_secs());
        Ok(())
    }

    /// Signs the `replica/transfer` receipt for this job.
    fn transfer_receipt(
        &self,
        ran: Link,
        out: Outcome,
        forks: Vec<Link>,
    ) -> Result<Receipt, ReplicationError> {
        sign_receipt(
            self.identity.as_ref(),
            ReceiptPayload {
                issuer: self.identity.did().clone(),
                ran,
                out,
                forks,
            },
        )
        .map_err(ReplicationError::Crypto)
    }

    /// Exhausted budget: emit the failure receipt, deliver it, park the job.
    async fn dead_letter(&self, id: JobId, job: &ReplicationJob, error: &ReplicationError) {
        let failure = Failure::from_error(error);
        match self.transfer_receipt(job.cause, Outcome::Error(failure), Vec::new()) {
            Ok(receipt) => {
                if let Err(e) = self.upload_service.conclude(&receipt).await {
                    tracing::warn!(target: "replication", id, error = %e, "failure receipt delivery failed");
                }
            }
            Err(e) => {
                tracing::error!(target: "replication", id, error = %e, "signing failure receipt failed");
            }
        }
        if let Err(e) = self.queue.dead_letter(id).await {
            tracing::warn!(target: "replication", id, error = %e, "dead-lettering failed");
        }
        tracing::error!(target: "replication", id, cause = %job.cause, "job dead-lettered");
    }
}
