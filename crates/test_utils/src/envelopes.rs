// Path: crates/test_utils/src/envelopes.rs
//! Envelope builders for gate and engine tests.

use haven_api::crypto::NodeSigner;
use haven_crypto::envelope::sign_invocation;
use haven_crypto::NodeIdentity;
use haven_types::error::CryptoError;
use haven_types::id::{Did, Link};
use haven_types::invocation::{Delegation, Envelope, InvocationPayload};

/// Signs an invocation from `issuer` addressed to `node` on subject `node`,
/// with optional proofs; the shape every service-issued command takes.
pub fn service_envelope(
    issuer: &NodeIdentity,
    node: &Did,
    ability: &str,
    caveats: Vec<u8>,
    cause: Option<Link>,
    proofs: Vec<Delegation>,
) -> Result<Envelope, CryptoError> {
    let invocation = sign_invocation(
        issuer,
        InvocationPayload {
            issuer: issuer.did().clone(),
            audience: node.clone(),
            subject: node.clone(),
            ability: ability.to_string(),
            caveats,
            cause,
            not_before: None,
            expiration: None,
            nonce: 1,
        },
    )?;
    Ok(Envelope { invocation, proofs })
}
