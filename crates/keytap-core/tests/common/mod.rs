//! Shared fakes: a sparse target address space and a reporter that keeps
//! what it is told.

#![allow(dead_code)]

use std::sync::Mutex;

use keytap_core::error::MemoryFault;
use keytap_core::invocation::{CallId, DerivationArgs};
use keytap_core::memory::{Address, ProcessMemory};
use keytap_core::reporter::{CaptureRecord, Reporter};

/// Mapped regions plus a log of every read the host was asked for.
#[derive(Default)]
pub struct MockMemory {
    regions: Mutex<Vec<(u64, Vec<u8>)>>,
    reads: Mutex<Vec<(Address, usize)>>,
}

impl MockMemory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn map(&self, base: u64, bytes: Vec<u8>) {
        self.regions.lock().unwrap().push((base, bytes));
    }

    pub fn reads(&self) -> Vec<(Address, usize)> {
        self.reads.lock().unwrap().clone()
    }

    pub fn was_read(&self, address: u64) -> bool {
        self.reads().iter().any(|(a, _)| a.0 == address)
    }
}

impl ProcessMemory for MockMemory {
    fn read(&self, address: Address, len: usize) -> Result<Vec<u8>, MemoryFault> {
        self.reads.lock().unwrap().push((address, len));
        let regions = self.regions.lock().unwrap();
        for (base, bytes) in regions.iter() {
            let end = base + bytes.len() as u64;
            if address.0 >= *base && address.0 + len as u64 <= end {
                let start = (address.0 - base) as usize;
                return Ok(bytes[start..start + len].to_vec());
            }
        }
        Err(MemoryFault::new(address, "unmapped"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reported {
    Secret(CaptureRecord),
    Derived(CallId, String),
}

#[derive(Default)]
pub struct CollectingReporter {
    events: Mutex<Vec<Reported>>,
}

impl CollectingReporter {
    pub fn events(&self) -> Vec<Reported> {
        self.events.lock().unwrap().clone()
    }

    pub fn secrets(&self) -> Vec<CaptureRecord> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Reported::Secret(r) => Some(r),
                _ => None,
            })
            .collect()
    }

    pub fn derived(&self) -> Vec<(CallId, String)> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Reported::Derived(c, h) => Some((c, h)),
                _ => None,
            })
            .collect()
    }
}

impl Reporter for CollectingReporter {
    fn secret_captured(&self, record: &CaptureRecord) {
        self.events.lock().unwrap().push(Reported::Secret(record.clone()));
    }

    fn derived_key(&self, call: CallId, hex: &str) {
        self.events
            .lock()
            .unwrap()
            .push(Reported::Derived(call, hex.to_string()));
    }
}

/// Arguments of the database-key derivation: PBKDF2, SHA512, 64000 rounds,
/// 32-byte password and output, 16-byte salt.
pub fn wcdb_args(password: u64, salt: u64, output: u64) -> DerivationArgs {
    DerivationArgs {
        algorithm: 2,
        password: Address(password),
        password_len: 32,
        salt: Address(salt),
        salt_len: 16,
        prf: 5,
        rounds: 64_000,
        derived_key: Address(output),
        derived_key_len: 32,
    }
}

pub fn counting_bytes(len: u8) -> Vec<u8> {
    (0..len).collect()
}
