use std::path::PathBuf;

use crate::memory::Address;

// ── Memory ──────────────────────────────────────────────────────────────────

/// Failure reported by the host when it cannot read target memory.
#[derive(Debug, Clone, thiserror::Error)]
#[error("memory fault at {address}: {reason}")]
pub struct MemoryFault {
    pub address: Address,
    pub reason: String,
}

impl MemoryFault {
    pub fn new(address: Address, reason: impl Into<String>) -> Self {
        Self {
            address,
            reason: reason.into(),
        }
    }
}

/// Why a bounded read produced no bytes. Every variant means "skip this
/// field"; none of them is fatal.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ReadError {
    #[error("zero-length read")]
    Empty,
    #[error("length {len} exceeds limit {limit}")]
    ExceedsLimit { len: usize, limit: usize },
    #[error("null pointer")]
    NullPointer,
    #[error("short read – expected {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },
    #[error(transparent)]
    Fault(#[from] MemoryFault),
}

impl ReadError {
    /// True when the read was refused before the host was asked for memory.
    pub fn rejected_before_read(&self) -> bool {
        matches!(
            self,
            Self::Empty | Self::ExceedsLimit { .. } | Self::NullPointer
        )
    }
}

// ── Key store ───────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum KeyStoreError {
    #[error("key store is closed")]
    Closed,
    #[error("write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("encode record: {0}")]
    Encode(#[from] serde_json::Error),
}

impl KeyStoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
