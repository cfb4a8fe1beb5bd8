// Path: crates/types/src/config/mod.rs

//! Shared configuration structures for the node binary.
//!
//! Deserialized from the TOML file named by `havend --config`. Every section
//! has workable defaults except identity, addresses, and the upload service,
//! which a deployment must state explicitly.

use crate::id::Did;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level configuration for a Haven node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Node identity material.
    pub identity: IdentityConfig,
    /// Socket address the blob/command gateway listens on.
    pub listen_addr: String,
    /// Public base URL under which this node is reachable, e.g.
    /// `https://node.example.net`. Used in tickets and commitments.
    pub public_url: String,
    /// Socket address the telemetry server listens on.
    #[serde(default = "default_metrics_addr")]
    pub metrics_addr: String,
    /// Durable storage locations.
    pub storage: StorageConfig,
    /// Allocation limits and ticket lifetimes.
    #[serde(default)]
    pub allocation: AllocationConfig,
    /// Replication queue tuning.
    #[serde(default)]
    pub replication: ReplicationConfig,
    /// Advertisement publishing.
    #[serde(default)]
    pub publisher: PublisherConfig,
    /// The upload service receipts are delivered to.
    pub upload_service: UploadServiceConfig,
    /// Principals whose delegation chains are accepted at the gate.
    pub trust: TrustConfig,
}

/// Node identity material.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    /// Path to the 32-byte Ed25519 seed, hex-encoded.
    pub key_file: PathBuf,
}

/// Durable storage locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding the redb databases and the blob payload tree.
    pub data_dir: PathBuf,
}

/// Allocation limits and ticket lifetimes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocationConfig {
    /// Upper bound for a single blob, in bytes.
    #[serde(default = "default_max_blob_size")]
    pub max_blob_size: u64,
    /// Lifetime of presigned upload tickets, in seconds.
    #[serde(default = "default_ticket_ttl_secs")]
    pub ticket_ttl_secs: u64,
    /// Lifetime of allocations, in seconds.
    #[serde(default = "default_allocation_ttl_secs")]
    pub allocation_ttl_secs: u64,
}

impl Default for AllocationConfig {
    fn default() -> Self {
        Self {
            max_blob_size: default_max_blob_size(),
            ticket_ttl_secs: default_ticket_ttl_secs(),
            allocation_ttl_secs: default_allocation_ttl_secs(),
        }
    }
}

/// Replication queue tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplicationConfig {
    /// Worker pool size; 0 means the CPU count.
    #[serde(default)]
    pub workers: usize,
    /// Attempt budget per job before dead-lettering.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Base backoff between attempts, in seconds. Attempt `n` waits
    /// `n * retry_backoff_secs`.
    #[serde(default = "default_retry_backoff_secs")]
    pub retry_backoff_secs: u64,
    /// Deadline for a single transfer attempt, in seconds. Generous to
    /// accommodate large blobs.
    #[serde(default = "default_job_timeout_secs")]
    pub job_timeout_secs: u64,
    /// Minimum remaining validity on a cached peer grant before it is
    /// refreshed, in seconds.
    #[serde(default = "default_grant_min_ttl_secs")]
    pub grant_min_ttl_secs: u64,
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            workers: 0,
            max_attempts: default_max_attempts(),
            retry_backoff_secs: default_retry_backoff_secs(),
            job_timeout_secs: default_job_timeout_secs(),
            grant_min_ttl_secs: default_grant_min_ttl_secs(),
        }
    }
}

/// Advertisement publishing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PublisherConfig {
    /// Discovery-layer endpoints notified after each chain append.
    #[serde(default)]
    pub announce_urls: Vec<String>,
    /// Indexing service to cache claims with, if any.
    #[serde(default)]
    pub indexing_url: Option<String>,
    /// The indexing service principal's DID; required when `indexing_url`
    /// is set.
    #[serde(default)]
    pub indexing_did: Option<Did>,
    /// Expiry applied to fresh location commitments, in seconds; `None`
    /// issues commitments without a stated expiry.
    #[serde(default)]
    pub commitment_ttl_secs: Option<u64>,
}

/// The upload service receipts are delivered to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadServiceConfig {
    /// Endpoint accepting `ucan/conclude` envelopes.
    pub url: String,
    /// The service principal's DID.
    pub did: Did,
}

/// Principals whose delegation chains are accepted at the gate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrustConfig {
    /// Root DIDs trusted to anchor delegation chains, beyond the node
    /// itself. Typically just the upload service.
    pub trusted_roots: Vec<Did>,
}

fn default_metrics_addr() -> String {
    "127.0.0.1:9464".to_string()
}
fn default_max_blob_size() -> u64 {
    crate::DEFAULT_MAX_BLOB_SIZE
}
fn default_ticket_ttl_secs() -> u64 {
    900
}
fn default_allocation_ttl_secs() -> u64 {
    86_400
}
fn default_max_attempts() -> u32 {
    10
}
fn default_retry_backoff_secs() -> u64 {
    30
}
fn default_job_timeout_secs() -> u64 {
    3600
}
fn default_grant_min_ttl_secs() -> u64 {
    60
}
