// Path: crates/types/src/error/mod.rs
//! Core error types for the Haven storage node.

use thiserror::Error;

/// A trait for assigning a stable, machine-readable string code to an error.
///
/// The codes appear in signed receipts and in metrics labels, so they must
/// never change once released.
pub trait ErrorCode {
    /// Returns the unique, stable string identifier for this error variant.
    fn code(&self) -> &'static str;
}

/// Errors raised while parsing identifiers.
#[derive(Debug, Error)]
pub enum IdError {
    /// The DID text form is not a supported `did:key` identifier.
    #[error("malformed DID: {0}")]
    MalformedDid(String),
    /// The digest bytes are not a well-formed multihash.
    #[error("malformed digest: {0}")]
    MalformedDigest(String),
    /// The link text form is not a 32-byte base58btc string.
    #[error("malformed link: {0}")]
    MalformedLink(String),
}

impl ErrorCode for IdError {
    fn code(&self) -> &'static str {
        match self {
            Self::MalformedDid(_) => "ID_MALFORMED_DID",
            Self::MalformedDigest(_) => "ID_MALFORMED_DIGEST",
            Self::MalformedLink(_) => "ID_MALFORMED_LINK",
        }
    }
}

/// Errors raised by signing, verification, and key handling.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// A key could not be parsed or derived.
    #[error("invalid key: {0}")]
    InvalidKey(String),
    /// Producing a signature failed in the underlying library.
    #[error("signing failed: {0}")]
    SigningFailed(String),
    /// A signature did not verify against the stated principal.
    #[error("signature invalid")]
    SignatureInvalid,
    /// An error originating in the cryptographic backend.
    #[error("crypto backend error: {0}")]
    Backend(String),
}

impl ErrorCode for CryptoError {
    fn code(&self) -> &'static str {
        match self {
            Self::InvalidKey(_) => "CRYPTO_INVALID_KEY",
            Self::SigningFailed(_) => "CRYPTO_SIGNING_FAILED",
            Self::SignatureInvalid => "CRYPTO_SIGNATURE_INVALID",
            Self::Backend(_) => "CRYPTO_BACKEND_ERROR",
        }
    }
}

/// Failures produced by the capability gate before a handler runs.
///
/// These surface as receipt errors and are never retried by callers.
#[derive(Debug, Error)]
pub enum GateError {
    /// The envelope does not carry an invocation addressed to this node.
    #[error("no invocation in the envelope is addressed to this node")]
    UnsupportedCapability,
    /// The invocation requires a cause link but carries none.
    #[error("invocation is missing its cause link")]
    MissingCause,
    /// The cause or a nested proof is present but does not authorize the call.
    #[error("invalid cause: {0}")]
    InvalidCause(String),
    /// The cause link does not resolve to anything this node knows.
    #[error("unknown cause")]
    UnknownCause,
    /// No handler is registered for the invoked ability.
    #[error("unknown ability: {0}")]
    UnknownAbility(String),
    /// The delegation chain is broken, expired, or not yet valid.
    #[error("unauthorized: {0}")]
    UnauthorizedCause(String),
    /// The envelope bytes could not be decoded.
    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),
    /// A handler fault that must still produce a valid receipt.
    #[error("internal failure: {0}")]
    Internal(String),
}

impl ErrorCode for GateError {
    fn code(&self) -> &'static str {
        match self {
            Self::UnsupportedCapability => "UNSUPPORTED_CAPABILITY",
            Self::MissingCause => "MISSING_CAUSE",
            Self::InvalidCause(_) => "INVALID_CAUSE",
            Self::UnknownCause => "UNKNOWN_CAUSE",
            Self::UnknownAbility(_) => "UNKNOWN_ABILITY",
            Self::UnauthorizedCause(_) => "UNAUTHORIZED_CAUSE",
            Self::MalformedEnvelope(_) => "MALFORMED_ENVELOPE",
            Self::Internal(_) => "INTERNAL_FAILURE",
        }
    }
}

/// Errors raised by the allocation, blob, and claim stores.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A generic error originating from the underlying backend (e.g. redb).
    #[error("backend error: {0}")]
    Backend(String),
    /// An error occurred while serializing data for storage.
    #[error("encode error: {0}")]
    Encode(String),
    /// An error occurred while deserializing data from storage.
    #[error("decode error: {0}")]
    Decode(String),
    /// The requested key or item was not found in the store.
    #[error("not found")]
    NotFound,
    /// Uploaded bytes did not hash to the digest they were presented under.
    #[error("data inconsistent: expected digest {expected}, body hashed to {got}")]
    DataInconsistent {
        /// The digest the writer claimed.
        expected: String,
        /// The digest the body actually hashed to.
        got: String,
    },
    /// A range read fell outside the stored blob.
    #[error("range {start}..={end} not satisfiable for blob of {size} bytes")]
    RangeNotSatisfiable {
        /// First requested byte offset.
        start: u64,
        /// Last requested byte offset, inclusive.
        end: u64,
        /// Total size of the stored blob.
        size: u64,
    },
}

impl ErrorCode for StoreError {
    fn code(&self) -> &'static str {
        match self {
            Self::Backend(_) => "STORE_BACKEND_ERROR",
            Self::Encode(_) => "STORE_ENCODE_ERROR",
            Self::Decode(_) => "STORE_DECODE_ERROR",
            Self::NotFound => "NOT_FOUND",
            Self::DataInconsistent { .. } => "DATA_INCONSISTENT",
            Self::RangeNotSatisfiable { .. } => "RANGE_NOT_SATISFIABLE",
        }
    }
}

/// Errors raised by the `blob/allocate`, `blob/accept`, and
/// `replica/allocate` handlers.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The requested size exceeds the configured maximum blob size.
    #[error("blob size {got} outside of supported range (max {max})")]
    BlobSizeOutsideOfSupportedRange {
        /// The configured maximum.
        max: u64,
        /// The requested size.
        got: u64,
    },
    /// `blob/accept` arrived before the allocated bytes were uploaded.
    #[error("allocated memory had not been written to")]
    AllocatedMemoryHadNotBeenWrittenTo,
    /// The digest uses a hash function other than SHA2-256.
    #[error("unsupported digest function code")]
    UnsupportedDigest,
    /// A nested proof (e.g. a replica source commitment) does not authorize
    /// the stated source.
    #[error("invalid cause: {0}")]
    InvalidCause(String),
    /// The PDP seam failed while resolving or accepting a piece.
    #[error("pdp error: {0}")]
    Pdp(String),
    /// A store operation failed beneath the handler.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Signing or verification failed beneath the handler.
    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

impl ErrorCode for EngineError {
    fn code(&self) -> &'static str {
        match self {
            Self::BlobSizeOutsideOfSupportedRange { .. } => "BLOB_SIZE_OUTSIDE_OF_SUPPORTED_RANGE",
            Self::AllocatedMemoryHadNotBeenWrittenTo => "ALLOCATED_MEMORY_HAD_NOT_BEEN_WRITTEN_TO",
            Self::UnsupportedDigest => "UNSUPPORTED_DIGEST",
            Self::InvalidCause(_) => "INVALID_CAUSE",
            Self::Pdp(_) => "PDP_ERROR",
            Self::Store(e) => e.code(),
            Self::Crypto(e) => e.code(),
        }
    }
}

/// Errors raised while issuing or verifying presigned upload tickets.
#[derive(Debug, Error)]
pub enum PresignError {
    /// The recomputed signature does not match the presented one.
    #[error("presigned URL signature invalid")]
    SignatureInvalid,
    /// The ticket names a digest with an unsupported hash function.
    #[error("unsupported digest function code")]
    UnsupportedDigest,
    /// The ticket's validity window has passed.
    #[error("presigned URL expired")]
    Expired,
    /// The URL or headers are structurally not a ticket this node issues.
    #[error("malformed presigned URL: {0}")]
    Malformed(String),
    /// Signing failed while deriving the ticket.
    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

impl From<PresignError> for EngineError {
    fn from(e: PresignError) -> Self {
        match e {
            PresignError::UnsupportedDigest => EngineError::UnsupportedDigest,
            PresignError::Crypto(c) => EngineError::Crypto(c),
            other => EngineError::Crypto(CryptoError::Backend(other.to_string())),
        }
    }
}

impl ErrorCode for PresignError {
    fn code(&self) -> &'static str {
        match self {
            Self::SignatureInvalid => "SIGNATURE_INVALID",
            Self::UnsupportedDigest => "UNSUPPORTED_DIGEST",
            Self::Expired => "PRESIGN_EXPIRED",
            Self::Malformed(_) => "PRESIGN_MALFORMED",
            Self::Crypto(e) => e.code(),
        }
    }
}

/// Errors local to a single replication job attempt.
///
/// All of these are retried per policy; after the attempt budget is spent the
/// job is dead-lettered and a failure receipt is emitted.
#[derive(Debug, Error)]
pub enum ReplicationError {
    /// The source peer (or the sink PUT) failed at the HTTP layer.
    #[error("upstream failure: {0}")]
    Upstream(String),
    /// The upload service rejected or failed the `ucan/conclude` delivery.
    #[error("conclude delivery failed: {0}")]
    Conclude(String),
    /// A store operation failed during the transfer.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Signing or grant handling failed during the transfer.
    #[error(transparent)]
    Crypto(#[from] CryptoError),
    /// The local accept step failed after the bytes landed.
    #[error("accept failed: {0}")]
    Accept(String),
    /// The node is shutting down; the job stays queued for the next run.
    #[error("shutdown requested")]
    Shutdown,
}

impl ErrorCode for ReplicationError {
    fn code(&self) -> &'static str {
        match self {
            Self::Upstream(_) => "UPSTREAM_FAILURE",
            Self::Conclude(_) => "CONCLUDE_FAILURE",
            Self::Store(e) => e.code(),
            Self::Crypto(e) => e.code(),
            Self::Accept(_) => "REPLICA_ACCEPT_FAILURE",
            Self::Shutdown => "SHUTDOWN",
        }
    }
}

/// Errors raised by the advertisement publisher.
///
/// Announce and indexing failures are advisory and logged, never raised; only
/// chain persistence failures surface here.
#[derive(Debug, Error)]
pub enum PublishError {
    /// The advertisement chain could not be read or appended.
    #[error(transparent)]
    Chain(#[from] StoreError),
    /// Advertisement metadata could not be encoded.
    #[error("encode error: {0}")]
    Encode(String),
}

impl ErrorCode for PublishError {
    fn code(&self) -> &'static str {
        match self {
            Self::Chain(e) => e.code(),
            Self::Encode(_) => "PUBLISH_ENCODE_ERROR",
        }
    }
}
