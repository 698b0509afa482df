//! Signature filter.
//!
//! A process runs plenty of PBKDF derivations; nothing on the call says which
//! one unlocks the database. The only handle we have is the parameter shape,
//! so the filter is a plain predicate over the scalar arguments. If a future
//! target release changes the shape the filter misses it; tune the
//! thresholds rather than loosening the predicate.

use serde::{Deserialize, Serialize};

use crate::invocation::DerivationArgs;

/// `kCCPBKDF2` in CommonCrypto.
pub const PBKDF2_ALGORITHM: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignatureFilter {
    /// Required algorithm identifier.
    pub algorithm: u32,
    /// Required derived key length, in bytes.
    pub output_len: usize,
    /// Minimum iteration count.
    pub min_rounds: u32,
    /// Required raw password length, if any.
    pub password_len: Option<usize>,
}

impl Default for SignatureFilter {
    fn default() -> Self {
        Self::wcdb()
    }
}

impl SignatureFilter {
    /// PBKDF2, 32-byte output, at least 64000 rounds.
    pub fn wcdb() -> Self {
        Self {
            algorithm: PBKDF2_ALGORITHM,
            output_len: 32,
            min_rounds: 64_000,
            password_len: None,
        }
    }

    /// [`wcdb`](Self::wcdb) plus a 32-byte raw password.
    pub fn strict() -> Self {
        Self {
            password_len: Some(32),
            ..Self::wcdb()
        }
    }

    pub fn accepts(&self, algorithm: u32, output_len: usize, rounds: u32) -> bool {
        algorithm == self.algorithm && output_len == self.output_len && rounds >= self.min_rounds
    }

    pub fn accepts_args(&self, args: &DerivationArgs) -> bool {
        if !self.accepts(args.algorithm, args.derived_key_len, args.rounds) {
            return false;
        }
        match self.password_len {
            Some(expected) => args.password_len == expected,
            None => true,
        }
    }
}
