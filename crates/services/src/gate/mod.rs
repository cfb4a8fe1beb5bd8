// Path: crates/services/src/gate/mod.rs
//! The identity & capability gate.
//!
//! Every command enters the node through [`CapabilityGate::dispatch`]: the
//! envelope is decoded, the invocation's signature and delegation chain are
//! checked against the trusted roots, the subject constraint is enforced for
//! service-reserved abilities, and the call is routed to the registered
//! handler. Whatever happens inside the handler, the caller gets back a
//! valid signed receipt: handler failures (and panics) become
//! `error(..)` outcomes, never transport errors.

use crate::time::now_secs;
use futures::FutureExt;
use haven_api::crypto::NodeSigner;
use haven_api::handler::{AbilityHandler, HandlerOutput};
use haven_crypto::envelope::{sign_receipt, verify_delegation, verify_invocation};
use haven_crypto::hash::link_of;
use haven_crypto::NodeIdentity;
use haven_types::capability::SERVICE_RESERVED;
use haven_types::codec;
use haven_types::error::GateError;
use haven_types::id::Did;
use haven_types::invocation::{Envelope, Failure, Outcome, Receipt, ReceiptPayload};
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

/// Upper bound on delegation chain length; deeper chains are rejected
/// rather than walked.
const MAX_CHAIN_DEPTH: usize = 16;

/// Authenticates, authorizes, and routes signed invocations.
pub struct CapabilityGate {
    identity: Arc<NodeIdentity>,
    handlers: HashMap<&'static str, Arc<dyn AbilityHandler>>,
    trusted_roots: Vec<Did>,
}

impl CapabilityGate {
    /// Builds a gate trusting the node itself plus `trusted_roots`.
    pub fn new(identity: Arc<NodeIdentity>, trusted_roots: Vec<Did>) -> Self {
        Self {
            identity,
            handlers: HashMap::new(),
            trusted_roots,
        }
    }

    /// Registers a handler under its ability name. Later registrations win.
    pub fn register(&mut self, handler: Arc<dyn AbilityHandler>) {
        self.handlers.insert(handler.ability(), handler);
    }

    /// Decodes an envelope, executes it, and returns the canonical bytes of
    /// the signed receipt envelope.
    ///
    /// Only an undecodable envelope fails without a receipt; everything else
    /// is reported inside one.
    pub async fn dispatch(&self, envelope_bytes: &[u8]) -> Result<Vec<u8>, GateError> {
        let envelope: Envelope = codec::from_bytes_canonical(envelope_bytes)
            .map_err(GateError::MalformedEnvelope)?;
        let receipt = self.dispatch_envelope(&envelope).await?;
        Ok(codec::to_bytes_canonical(&receipt))
    }

    /// Executes a decoded envelope and signs the receipt.
    pub async fn dispatch_envelope(&self, envelope: &Envelope) -> Result<Receipt, GateError> {
        let started = std::time::Instant::now();
        let ran = link_of(&envelope.invocation)
            .map_err(|e| GateError::Internal(e.to_string()))?;

        let (out, forks) = match self.execute(envelope).await {
            Ok(output) => (Outcome::Ok(output.ok), output.forks),
            Err(failure) => (Outcome::Error(failure), Vec::new()),
        };

        let ability = envelope.invocation.payload.ability.as_str();
        let outcome = match &out {
            Outcome::Ok(_) => "ok",
            Outcome::Error(failure) => failure.code.as_str(),
        };
        let sink = haven_telemetry::sinks::dispatch_metrics();
        sink.inc_dispatch(ability, outcome);
        sink.observe_dispatch_seconds(ability, started.elapsed().as_secs_f64());

        let payload = ReceiptPayload {
            issuer: self.identity.did().clone(),
            ran,
            out,
            forks,
        };
        sign_receipt(self.identity.as_ref(), payload)
            .map_err(|e| GateError::Internal(e.to_string()))
    }

    async fn execute(&self, envelope: &Envelope) -> Result<HandlerOutput, Failure> {
        self.authorize(envelope).map_err(|e| Failure::from_error(&e))?;

        let ability = envelope.invocation.payload.ability.as_str();
        let handler = self
            .handlers
            .get(ability)
            .ok_or_else(|| {
                Failure::from_error(&GateError::UnknownAbility(ability.to_string()))
            })?
            .clone();

        // A panicking handler must still yield a valid receipt.
        match AssertUnwindSafe(handler.handle(envelope)).catch_unwind().await {
            Ok(result) => result,
            Err(_) => {
                tracing::error!(target: "gate", ability, "handler panicked");
                Err(Failure::from_error(&GateError::Internal(format!(
                    "handler for {ability} panicked"
                ))))
            }
        }
    }

    /// Signature, addressing, time-bound, subject, and chain checks.
    fn authorize(&self, envelope: &Envelope) -> Result<(), GateError> {
        let invocation = &envelope.invocation;
        let payload = &invocation.payload;

        if &payload.audience != self.identity.did() {
            return Err(GateError::UnsupportedCapability);
        }
        verify_invocation(invocation)
            .map_err(|_| GateError::UnauthorizedCause("invocation signature invalid".into()))?;

        let now = now_secs();
        if let Some(nbf) = payload.not_before {
            if now < nbf {
                return Err(GateError::UnauthorizedCause("invocation not yet valid".into()));
            }
        }
        if let Some(exp) = payload.expiration {
            if now >= exp {
                return Err(GateError::UnauthorizedCause("invocation expired".into()));
            }
        }

        if SERVICE_RESERVED.contains(&payload.ability.as_str())
            && &payload.subject != self.identity.did()
        {
            return Err(GateError::UnauthorizedCause(format!(
                "{} is reserved to subject {}",
                payload.ability,
                self.identity.did()
            )));
        }

        if payload.ability == haven_types::capability::BLOB_ALLOCATE
            || payload.ability == haven_types::capability::REPLICA_ALLOCATE
        {
            if payload.cause.is_none() {
                return Err(GateError::MissingCause);
            }
        }

        self.resolve_chain(
            &payload.issuer,
            &payload.ability,
            &payload.subject,
            &envelope.proofs,
            now,
        )
    }

    /// Walks the delegation chain from the invocation issuer back to a
    /// trusted root. A principal is a root when it is the subject itself or
    /// one of the configured trusted roots.
    fn resolve_chain(
        &self,
        issuer: &Did,
        ability: &str,
        subject: &Did,
        proofs: &[haven_types::invocation::Delegation],
        now: u64,
    ) -> Result<(), GateError> {
        let mut principal = issuer.clone();
        for _ in 0..MAX_CHAIN_DEPTH {
            if principal == *subject || self.trusted_roots.contains(&principal) {
                return Ok(());
            }

            let grant = proofs
                .iter()
                .find(|d| d.payload.audience == principal && d.covers(ability))
                .ok_or_else(|| {
                    GateError::UnauthorizedCause(format!(
                        "no delegation links {principal} to a trusted root for {ability}"
                    ))
                })?;

            if grant.payload.subject != *subject {
                return Err(GateError::UnauthorizedCause(
                    "delegation names a different subject".into(),
                ));
            }
            if let Some(nbf) = grant.payload.not_before {
                if now < nbf {
                    return Err(GateError::UnauthorizedCause("delegation not yet valid".into()));
                }
            }
            if let Some(exp) = grant.payload.expiration {
                if now >= exp {
                    return Err(GateError::UnauthorizedCause("delegation expired".into()));
                }
            }
            verify_delegation(grant)
                .map_err(|_| GateError::UnauthorizedCause("delegation signature invalid".into()))?;

            principal = grant.payload.issuer.clone();
        }
        Err(GateError::UnauthorizedCause(format!(
            "delegation chain deeper than {MAX_CHAIN_DEPTH}"
        )))
    }

}
