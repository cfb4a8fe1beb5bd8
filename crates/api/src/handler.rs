// Path: crates/api/src/handler.rs

//! The ability-handler contract the capability gate dispatches to.

use async_trait::async_trait;
use haven_types::id::Link;
use haven_types::invocation::{Envelope, Failure};

/// What a handler hands back on success: the canonical encoding of its typed
/// result record, plus links to any side-effect invocations it forked.
#[derive(Clone, Debug, Default)]
pub struct HandlerOutput {
    /// Canonical bytes of the ability's ok result record.
    pub ok: Vec<u8>,
    /// Links to forked side-effect invocations (e.g. the location commitment
    /// assertion issued by `blob/accept`).
    pub forks: Vec<Link>,
}

/// One registered ability.
///
/// Handlers are chosen by ability name; the typed caveats and result records
/// in `haven-types::capability` are the whole contract. A handler failure
/// becomes `ok(error(..))` in the receipt; the envelope stays valid.
#[async_trait]
pub trait AbilityHandler: Send + Sync {
    /// The ability name this handler serves, e.g. `blob/allocate`.
    fn ability(&self) -> &'static str;

    /// Executes the invocation. The gate has already verified signatures,
    /// the delegation chain, and the subject constraint.
    async fn handle(&self, envelope: &Envelope) -> Result<HandlerOutput, Failure>;
}
