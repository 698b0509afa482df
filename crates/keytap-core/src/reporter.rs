//! Capture reporting.
//!
//! A reporter only hears about genuinely new secrets: repeat derivations of
//! a known key are absorbed by the key store and never reach it.

use serde::{Deserialize, Serialize};
use tracing::info;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::invocation::CallId;

/// What was captured, and from which call. Wiped on drop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct CaptureRecord {
    #[zeroize(skip)]
    pub call: CallId,
    pub algorithm: u32,
    pub password_len: usize,
    pub salt_hex: Option<String>,
    pub prf: u32,
    pub prf_name: String,
    pub rounds: u32,
    pub output_len: usize,
    pub key_hex: String,
    pub key_len: usize,
}

pub trait Reporter: Send + Sync {
    /// A never-before-seen secret was captured at entry.
    fn secret_captured(&self, record: &CaptureRecord);

    /// The derivation that produced a reported secret has returned; `hex` is
    /// the content of its output buffer.
    fn derived_key(&self, call: CallId, hex: &str);
}

/// Emits captures as structured `tracing` events.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl Reporter for TracingReporter {
    fn secret_captured(&self, record: &CaptureRecord) {
        info!(
            call = %record.call,
            algorithm = record.algorithm,
            password_len = record.password_len,
            salt = record.salt_hex.as_deref().unwrap_or("<unreadable>"),
            prf = record.prf,
            prf_name = %record.prf_name,
            rounds = record.rounds,
            output_len = record.output_len,
            "key derivation matched"
        );
        info!(
            call = %record.call,
            key = %record.key_hex,
            key_len = record.key_len,
            "raw key captured"
        );
    }

    fn derived_key(&self, call: CallId, hex: &str) {
        info!(call = %call, derived_key = %hex, "derived key");
    }
}
