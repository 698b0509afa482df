//! Capabilities the instrumentation host provides. The agent never attaches
//! to a process or decodes a calling convention itself.

use std::fmt;
use std::sync::Arc;

use keytap_core::invocation::{CallId, DerivationArgs};
use keytap_core::memory::{Address, ProcessMemory};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessInfo {
    pub pid: u32,
    pub platform: String,
    pub arch: String,
}

/// Opaque token for an installed interceptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InterceptorHandle(pub u64);

impl fmt::Display for InterceptorHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "interceptor#{}", self.0)
    }
}

/// Entry/exit callbacks. The host calls both on the thread that made the
/// intercepted call, with the same [`CallId`] for one invocation.
pub trait InvocationHandler: Send + Sync {
    fn on_enter(&self, call: CallId, args: &DerivationArgs);
    fn on_leave(&self, call: CallId);
}

pub trait InstrumentationHost: ProcessMemory + Send + Sync {
    /// Locate an exported function in a loaded module.
    fn resolve_export(&self, module: &str, export: &str) -> Option<Address>;

    /// Install entry/exit callbacks on `target`.
    fn register_interceptor(
        &self,
        target: Address,
        handler: Arc<dyn InvocationHandler>,
    ) -> anyhow::Result<InterceptorHandle>;

    /// Remove an interceptor. Callbacks already running finish normally.
    fn unregister(&self, handle: InterceptorHandle);

    fn process_info(&self) -> ProcessInfo;
}
