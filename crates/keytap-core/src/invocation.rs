//! Per-call correlation between an entry event and its exit.
//!
//! The derivation routine is called from many threads at once, and may be
//! re-entered on one thread. Every in-flight call therefore gets its own
//! [`InvocationContext`], keyed by the [`CallId`] the host hands to both the
//! entry and the exit handler. There is no "current call" slot.

use std::collections::HashMap;
use std::fmt;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::memory::Address;

/// Identity of one in-flight invocation: the calling thread and the
/// reentrancy depth on that thread. The host guarantees it is unique among
/// invocations that have entered but not yet left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CallId {
    pub thread: u64,
    pub depth: u32,
}

impl CallId {
    pub fn new(thread: u64, depth: u32) -> Self {
        Self { thread, depth }
    }
}

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.thread, self.depth)
    }
}

/// Scalar parameters of `CCKeyDerivationPBKDF`, already decoded by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DerivationArgs {
    pub algorithm: u32,
    pub password: Address,
    pub password_len: usize,
    pub salt: Address,
    pub salt_len: usize,
    pub prf: u32,
    pub rounds: u32,
    pub derived_key: Address,
    pub derived_key_len: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvocationState {
    Entered,
    Ignored,
    ArgsCaptured,
    Done,
}

/// Snapshot of one call taken at entry.
#[derive(Debug, Clone)]
pub struct InvocationContext {
    pub call: CallId,
    pub args: DerivationArgs,
    pub matched: bool,
    pub state: InvocationState,
    /// Set when this call produced a never-before-seen secret; only those
    /// calls report their derived key on exit.
    pub reported: bool,
    /// Matched, but the password buffer could not be read.
    pub secret_unreadable: bool,
}

impl InvocationContext {
    pub fn enter(call: CallId, args: DerivationArgs) -> Self {
        Self {
            call,
            args,
            matched: false,
            state: InvocationState::Entered,
            reported: false,
            secret_unreadable: false,
        }
    }

    /// Record the filter verdict. Called once per context.
    pub fn classify(&mut self, matched: bool) {
        debug_assert_eq!(self.state, InvocationState::Entered);
        self.matched = matched;
        self.state = if matched {
            InvocationState::ArgsCaptured
        } else {
            InvocationState::Ignored
        };
    }

    pub fn finish(&mut self) {
        self.state = InvocationState::Done;
    }
}

/// In-flight contexts of matched calls.
///
/// Ignored calls are never inserted, so the common path costs no lock.
#[derive(Debug, Default)]
pub struct ContextTable {
    inner: Mutex<HashMap<CallId, InvocationContext>>,
}

impl ContextTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, ctx: InvocationContext) {
        let call = ctx.call;
        let stale = self.inner.lock().insert(call, ctx);
        if stale.is_some() {
            warn!(call = %call, "call id reused while still in flight; dropping stale context");
        }
    }

    pub fn take(&self, call: CallId) -> Option<InvocationContext> {
        self.inner.lock().remove(&call)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}
