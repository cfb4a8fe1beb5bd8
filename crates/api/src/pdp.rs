// Path: crates/api/src/pdp.rs

//! The narrow seam to the proof-of-data-possession subsystem.
//!
//! The core never talks to the PDP scheduler, its contract watchers, or its
//! proof computation; it only asks where a piece is served and submits stored
//! blobs for piece acceptance. A node without PDP simply wires no
//! `PieceFinder`.

use async_trait::async_trait;
use haven_types::id::{Digest, Link};
use thiserror::Error;

/// Errors crossing the PDP seam.
#[derive(Debug, Error)]
pub enum PdpError {
    /// The PDP subsystem could not be reached.
    #[error("pdp unavailable: {0}")]
    Unavailable(String),
    /// The subsystem answered but rejected the request.
    #[error("pdp rejected: {0}")]
    Rejected(String),
}

/// A piece tracked by the PDP subsystem and the URL it is served from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PieceRef {
    /// The piece digest.
    pub piece: Digest,
    /// Piece-storage URL at which the content is publicly served.
    pub url: String,
}

/// Piece lookup and piece acceptance.
#[async_trait]
pub trait PieceFinder: Send + Sync {
    /// Resolves the piece holding `digest`, if the subsystem tracks it.
    async fn find_piece(&self, digest: &Digest) -> Result<Option<PieceRef>, PdpError>;

    /// Submits a stored blob for acceptance; returns the link of the
    /// piece-accept invocation.
    async fn accept_piece(&self, digest: &Digest) -> Result<Link, PdpError>;
}
