use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::prf::prf_name;

/// A raw derivation secret lifted from the target, plus the parameters it
/// was derived with. The hex strings are wiped when the value is dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct CapturedSecret {
    pub key_hex: String,
    pub key_len: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub salt_hex: Option<String>,
    pub prf: u32,
    pub rounds: u32,
    #[zeroize(skip)]
    pub captured_at: DateTime<Utc>,
}

impl CapturedSecret {
    pub fn new(key: &[u8], salt_hex: Option<String>, prf: u32, rounds: u32) -> Self {
        Self {
            key_hex: hex::encode(key),
            key_len: key.len(),
            salt_hex,
            prf,
            rounds,
            captured_at: Utc::now(),
        }
    }

    pub fn prf_name(&self) -> &'static str {
        prf_name(self.prf)
    }
}
