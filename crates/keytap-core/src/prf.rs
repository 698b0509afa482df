//! CommonCrypto PRF identifiers.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Prf {
    Sha1,
    Sha224,
    Sha256,
    Sha384,
    Sha512,
    Unknown(u32),
}

impl Prf {
    pub fn from_id(id: u32) -> Self {
        match id {
            1 => Prf::Sha1,
            2 => Prf::Sha224,
            3 => Prf::Sha256,
            4 => Prf::Sha384,
            5 => Prf::Sha512,
            other => Prf::Unknown(other),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Prf::Sha1 => "SHA1",
            Prf::Sha224 => "SHA224",
            Prf::Sha256 => "SHA256",
            Prf::Sha384 => "SHA384",
            Prf::Sha512 => "SHA512",
            Prf::Unknown(_) => "Unknown",
        }
    }
}

impl fmt::Display for Prf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

pub fn prf_name(id: u32) -> &'static str {
    Prf::from_id(id).name()
}
