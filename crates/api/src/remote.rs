// Path: crates/api/src/remote.rs

//! Clients for the remote collaborators: peer nodes, the upload service,
//! and the indexing service.
//!
//! Implementations live in `haven-services::remote` over HTTP; tests swap in
//! recording stubs. Every method here may suspend and must honor its
//! caller's deadline.

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use haven_types::capability::ProviderInfo;
use haven_types::claim::{LocationCommitment, UploadAddress};
use haven_types::error::ErrorCode;
use haven_types::id::Did;
use haven_types::invocation::{Delegation, Receipt};
use thiserror::Error;

/// A stream of body chunks flowing from a source GET into a sink PUT.
///
/// `Sync` is part of the contract so implementations can hand the stream to
/// an HTTP client body without re-buffering.
pub type ByteStream =
    std::pin::Pin<Box<dyn Stream<Item = Result<Bytes, RemoteError>> + Send + Sync + 'static>>;

/// Errors raised by remote calls.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// Transport-level failure: connect, TLS, timeout, broken stream.
    #[error("http error: {0}")]
    Http(String),
    /// The remote answered outside 2xx.
    #[error("remote rejected with status {status}: {body}")]
    Rejected {
        /// The HTTP status code.
        status: u16,
        /// Response body, truncated for logging.
        body: String,
    },
    /// The response could not be decoded.
    #[error("decode error: {0}")]
    Codec(String),
}

impl ErrorCode for RemoteError {
    fn code(&self) -> &'static str {
        match self {
            Self::Http(_) => "REMOTE_HTTP_ERROR",
            Self::Rejected { .. } => "REMOTE_REJECTED",
            Self::Codec(_) => "REMOTE_DECODE_ERROR",
        }
    }
}

/// The upload service endpoint receipts are delivered to.
#[async_trait]
pub trait UploadService: Send + Sync {
    /// Delivers a `replica/transfer` receipt via `ucan/conclude`. Any error
    /// here is a job failure that must be retried.
    async fn conclude(&self, receipt: &Receipt) -> Result<(), RemoteError>;
}

/// The indexing service claims are cached with. Advisory: callers log
/// failures and continue.
#[async_trait]
pub trait IndexingService: Send + Sync {
    /// Issues `claim/cache` for a commitment and the provider addresses that
    /// serve it.
    async fn cache_claim(
        &self,
        claim: &LocationCommitment,
        provider: &ProviderInfo,
    ) -> Result<(), RemoteError>;
}

/// HTTP plumbing toward peer nodes and announce endpoints.
#[async_trait]
pub trait PeerTransport: Send + Sync {
    /// Obtains a short-lived delegation for `ability` on the peer's DID via
    /// `access/grant`. Callers cache the result per `(audience, ability)`.
    async fn grant(
        &self,
        peer_url: &str,
        peer: &Did,
        ability: &str,
    ) -> Result<Delegation, RemoteError>;

    /// Opens an authenticated GET against a source URL, returning the body
    /// as a stream.
    async fn fetch(
        &self,
        url: &str,
        proof: Option<&Delegation>,
    ) -> Result<ByteStream, RemoteError>;

    /// Streams a body into a PUT against an upload ticket. `len` becomes the
    /// `Content-Length` the ticket signature covers.
    async fn store(
        &self,
        sink: &UploadAddress,
        body: ByteStream,
        len: u64,
    ) -> Result<(), RemoteError>;

    /// Best-effort POST of an advertisement notification.
    async fn announce(&self, url: &str, payload: &[u8]) -> Result<(), RemoteError>;
}
