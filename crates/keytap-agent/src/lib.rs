//! Host-facing side of keytap: wires a [`DerivationTap`] into an external
//! instrumentation host and owns the attach/detach lifecycle.
//!
//! [`DerivationTap`]: keytap_core::DerivationTap

pub mod agent;
pub mod host;

pub use agent::{Agent, AttachError};
pub use host::{InstrumentationHost, InterceptorHandle, InvocationHandler, ProcessInfo};

use tracing_subscriber::EnvFilter;

/// Install a `fmt` subscriber filtered by `RUST_LOG` (default `info`).
/// Safe to call more than once; later calls are no-ops.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
