// Path: crates/types/src/invocation.rs

//! Signed invocations, delegations, envelopes, and receipts.
//!
//! These are the carrier structures of the capability protocol. The byte
//! format is the canonical SCALE encoding from [`crate::codec`]; it is an
//! internal codec, not a compatibility surface. Signing and link computation
//! live in `haven-crypto`; this module only defines the shapes.

use crate::error::ErrorCode;
use crate::id::{Did, Link};
use parity_scale_codec::{Decode, Encode};

/// The selector used by promises that resolve to a receipt's ok branch.
pub const OUT_OK_SELECTOR: &str = ".out.ok";

/// The unsigned body of an invocation: issuer asks audience to exercise
/// `ability` on `subject` with `caveats`.
#[derive(Clone, Debug, PartialEq, Eq, Encode, Decode)]
pub struct InvocationPayload {
    /// The principal issuing (and signing) the invocation.
    pub issuer: Did,
    /// The principal expected to execute it.
    pub audience: Did,
    /// The subject DID the capability is exercised on (`with`).
    pub subject: Did,
    /// The ability name, e.g. `blob/allocate`.
    pub ability: String,
    /// Canonical encoding of the ability's typed caveat record.
    pub caveats: Vec<u8>,
    /// Link to the invocation or receipt that caused this one, when the
    /// ability requires a causal chain.
    pub cause: Option<Link>,
    /// Unix seconds before which the invocation is not yet valid.
    pub not_before: Option<u64>,
    /// Unix seconds at which the invocation expires.
    pub expiration: Option<u64>,
    /// Disambiguates otherwise-identical invocations so their links differ.
    pub nonce: u64,
}

/// A signed invocation.
#[derive(Clone, Debug, PartialEq, Eq, Encode, Decode)]
pub struct Invocation {
    /// The signed body.
    pub payload: InvocationPayload,
    /// Ed25519 signature by `payload.issuer` over the canonical payload
    /// bytes.
    pub signature: Vec<u8>,
}

/// The unsigned body of a delegation: issuer grants audience the right to
/// exercise `ability` on `subject`.
#[derive(Clone, Debug, PartialEq, Eq, Encode, Decode)]
pub struct DelegationPayload {
    /// The principal granting the capability.
    pub issuer: Did,
    /// The principal receiving it.
    pub audience: Did,
    /// The subject DID the grant applies to.
    pub subject: Did,
    /// The granted ability; `*` and `<top>/*` forms attenuate to whole
    /// namespaces.
    pub ability: String,
    /// Unix seconds before which the grant is not yet valid.
    pub not_before: Option<u64>,
    /// Unix seconds at which the grant expires.
    pub expiration: Option<u64>,
}

/// A signed delegation.
#[derive(Clone, Debug, PartialEq, Eq, Encode, Decode)]
pub struct Delegation {
    /// The signed body.
    pub payload: DelegationPayload,
    /// Ed25519 signature by `payload.issuer` over the canonical payload
    /// bytes.
    pub signature: Vec<u8>,
}

impl Delegation {
    /// Whether this grant covers `ability`, honoring `*` and `<top>/*`
    /// attenuation.
    pub fn covers(&self, ability: &str) -> bool {
        let granted = self.payload.ability.as_str();
        if granted == "*" || granted == ability {
            return true;
        }
        granted
            .strip_suffix("/*")
            .is_some_and(|top| ability.strip_prefix(top).is_some_and(|r| r.starts_with('/')))
    }
}

/// The signed-message carrier accepted on `POST /`: one invocation plus the
/// delegation proofs that authorize it.
#[derive(Clone, Debug, PartialEq, Eq, Encode, Decode)]
pub struct Envelope {
    /// The invocation to execute.
    pub invocation: Invocation,
    /// Delegations linking the invocation's issuer back to a trusted root.
    pub proofs: Vec<Delegation>,
}

/// A failure description carried inside an error receipt.
#[derive(Clone, Debug, PartialEq, Eq, Encode, Decode)]
pub struct Failure {
    /// Stable machine-readable code, e.g. `UNAUTHORIZED_CAUSE`.
    pub code: String,
    /// Human-readable context.
    pub message: String,
}

impl Failure {
    /// Builds a failure from any workspace error carrying a stable code.
    pub fn from_error<E: ErrorCode + std::fmt::Display>(err: &E) -> Self {
        Failure {
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

/// The outcome branch of a receipt: canonical ok bytes or a failure.
#[derive(Clone, Debug, PartialEq, Eq, Encode, Decode)]
pub enum Outcome {
    /// Success; the bytes are the canonical encoding of the ability's typed
    /// result record.
    Ok(Vec<u8>),
    /// Failure with a stable code.
    Error(Failure),
}

impl Outcome {
    /// True for the ok branch.
    pub fn is_ok(&self) -> bool {
        matches!(self, Outcome::Ok(_))
    }
}

/// The unsigned body of a receipt.
#[derive(Clone, Debug, PartialEq, Eq, Encode, Decode)]
pub struct ReceiptPayload {
    /// The principal reporting the outcome (this node).
    pub issuer: Did,
    /// Link to the invocation this receipt reports on.
    pub ran: Link,
    /// The outcome.
    pub out: Outcome,
    /// Links to side-effect invocations forked by the handler.
    pub forks: Vec<Link>,
}

/// A signed receipt.
#[derive(Clone, Debug, PartialEq, Eq, Encode, Decode)]
pub struct Receipt {
    /// The signed body.
    pub payload: ReceiptPayload,
    /// Ed25519 signature by `payload.issuer` over the canonical payload
    /// bytes.
    pub signature: Vec<u8>,
}

/// A promise: a link to a pending invocation plus the selector that will pick
/// the value out of its eventual receipt.
///
/// Consumers treat this as a pure link + selector; they resolve it by
/// awaiting the conclude-delivered receipt for `link`.
#[derive(Clone, Debug, PartialEq, Eq, Encode, Decode)]
pub struct Await {
    /// Link to the invocation whose receipt resolves the promise.
    pub link: Link,
    /// Value selector, currently always [`OUT_OK_SELECTOR`].
    pub selector: String,
}

impl Await {
    /// A promise on the ok branch of `link`'s eventual receipt.
    pub fn out_ok(link: Link) -> Self {
        Await {
            link,
            selector: OUT_OK_SELECTOR.to_string(),
        }
    }
}
