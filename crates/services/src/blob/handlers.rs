// Path: crates/services/src/blob/handlers.rs
//! `AbilityHandler` adapters over the engine.
//!
//! Each handler decodes its typed caveat record, runs the engine, and
//! encodes the typed result; failures become receipt errors with the
//! engine's stable codes.

use crate::blob::BlobEngine;
use async_trait::async_trait;
use haven_api::handler::{AbilityHandler, HandlerOutput};
use haven_crypto::hash::link_of;
use haven_types::capability::{
    BlobAcceptCaveats, BlobAllocateCaveats, ReplicaAllocateCaveats, BLOB_ACCEPT, BLOB_ALLOCATE,
    REPLICA_ALLOCATE,
};
use haven_types::codec;
use haven_types::invocation::{Envelope, Failure};
use std::sync::Arc;

fn malformed_caveats(ability: &str, e: String) -> Failure {
    Failure {
        code: "MALFORMED_CAVEATS".to_string(),
        message: format!("{ability}: {e}"),
    }
}

/// Handles `blob/allocate`.
pub struct AllocateHandler(pub Arc<BlobEngine>);

#[async_trait]
impl AbilityHandler for AllocateHandler {
    fn ability(&self) -> &'static str {
        BLOB_ALLOCATE
    }

    async fn handle(&self, envelope: &Envelope) -> Result<HandlerOutput, Failure> {
        let caveats: BlobAllocateCaveats =
            codec::from_bytes_canonical(&envelope.invocation.payload.caveats)
                .map_err(|e| malformed_caveats(BLOB_ALLOCATE, e))?;
        let ok = self
            .0
            .allocate(&caveats.space, &caveats.blob, caveats.cause)
            .await
            .map_err(|e| Failure::from_error(&e))?;
        Ok(HandlerOutput {
            ok: codec::to_bytes_canonical(&ok),
            forks: Vec::new(),
        })
    }
}

/// Handles `blob/accept`.
pub struct AcceptHandler(pub Arc<BlobEngine>);

#[async_trait]
impl AbilityHandler for AcceptHandler {
    fn ability(&self) -> &'static str {
        BLOB_ACCEPT
    }

    async fn handle(&self, envelope: &Envelope) -> Result<HandlerOutput, Failure> {
        let caveats: BlobAcceptCaveats =
            codec::from_bytes_canonical(&envelope.invocation.payload.caveats)
                .map_err(|e| malformed_caveats(BLOB_ACCEPT, e))?;
        let (ok, forks) = self
            .0
            .accept(&caveats.space, &caveats.blob)
            .await
            .map_err(|e| Failure::from_error(&e))?;
        Ok(HandlerOutput {
            ok: codec::to_bytes_canonical(&ok),
            forks,
        })
    }
}

/// Handles `replica/allocate`.
pub struct ReplicaAllocateHandler(pub Arc<BlobEngine>);

#[async_trait]
impl AbilityHandler for ReplicaAllocateHandler {
    fn ability(&self) -> &'static str {
        REPLICA_ALLOCATE
    }

    async fn handle(&self, envelope: &Envelope) -> Result<HandlerOutput, Failure> {
        let caveats: ReplicaAllocateCaveats =
            codec::from_bytes_canonical(&envelope.invocation.payload.caveats)
                .map_err(|e| malformed_caveats(REPLICA_ALLOCATE, e))?;
        let invocation_link = link_of(&envelope.invocation).map_err(|e| Failure::from_error(&e))?;
        let (ok, forks) = self
            .0
            .replica_allocate(&caveats, invocation_link)
            .await
            .map_err(|e| Failure::from_error(&e))?;
        Ok(HandlerOutput {
            ok: codec::to_bytes_canonical(&ok),
            forks,
        })
    }
}
