//! Bounded, fault-tolerant reads of target process memory.
//!
//! The host does the actual dereference through [`ProcessMemory`]. This
//! module decides whether a read may happen at all: lengths are checked
//! against a per-field limit before the host is touched, and anything the
//! host does wrong (fault, short read, panic) comes back as a [`ReadError`].

use std::fmt;
use std::panic::{self, AssertUnwindSafe};

use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::error::{MemoryFault, ReadError};

/// An address in the target process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(pub u64);

impl Address {
    pub const NULL: Address = Address(0);

    pub fn is_null(self) -> bool {
        self.0 == 0
    }

    pub fn offset(self, bytes: u64) -> Address {
        Address(self.0.wrapping_add(bytes))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

impl From<u64> for Address {
    fn from(value: u64) -> Self {
        Address(value)
    }
}

/// Raw memory access provided by the instrumentation host.
pub trait ProcessMemory {
    /// Read exactly `len` bytes at `address`, or report why not.
    fn read(&self, address: Address, len: usize) -> Result<Vec<u8>, MemoryFault>;
}

/// Upper bounds for each field the tap reads. Sized to real PBKDF parameters:
/// anything larger is not the secret we are looking for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadLimits {
    pub password: usize,
    pub salt: usize,
    pub derived_key: usize,
}

impl Default for ReadLimits {
    fn default() -> Self {
        Self {
            password: 64,
            salt: 32,
            derived_key: 64,
        }
    }
}

/// Wraps a [`ProcessMemory`] with pre-dereference bounds checks.
pub struct MemoryReader<'a> {
    memory: &'a dyn ProcessMemory,
}

impl<'a> MemoryReader<'a> {
    pub fn new(memory: &'a dyn ProcessMemory) -> Self {
        Self { memory }
    }

    /// Read `len` bytes at `address`. Oversized lengths are rejected, never
    /// clipped. The returned buffer is wiped when dropped.
    pub fn read(
        &self,
        address: Address,
        len: usize,
        limit: usize,
    ) -> Result<Zeroizing<Vec<u8>>, ReadError> {
        check_bounds(address, len, limit)?;

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.memory.read(address, len)));
        let bytes = match outcome {
            Ok(Ok(bytes)) => Zeroizing::new(bytes),
            Ok(Err(fault)) => return Err(ReadError::Fault(fault)),
            Err(_) => {
                return Err(ReadError::Fault(MemoryFault::new(
                    address,
                    "host read panicked",
                )))
            }
        };

        if bytes.len() != len {
            return Err(ReadError::Truncated {
                expected: len,
                actual: bytes.len(),
            });
        }
        Ok(bytes)
    }

    /// Same as [`read`](Self::read) but hex-encodes the result.
    pub fn read_hex(&self, address: Address, len: usize, limit: usize) -> Result<String, ReadError> {
        self.read(address, len, limit).map(|bytes| hex::encode(&*bytes))
    }
}

fn check_bounds(address: Address, len: usize, limit: usize) -> Result<(), ReadError> {
    if len == 0 {
        return Err(ReadError::Empty);
    }
    if len > limit {
        return Err(ReadError::ExceedsLimit { len, limit });
    }
    if address.is_null() {
        return Err(ReadError::NullPointer);
    }
    Ok(())
}
