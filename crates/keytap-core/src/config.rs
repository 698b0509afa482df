//! Agent configuration. Every section has defaults, so an empty JSON object
//! is a valid config that targets `CCKeyDerivationPBKDF` with the WCDB
//! signature.

use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::filter::SignatureFilter;
use crate::key_store::StoreConfig;
use crate::memory::ReadLimits;
use crate::paths::config_path;

const MAX_READ_LIMIT: usize = 4096;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetSpec {
    pub module: String,
    pub export: String,
}

impl Default for TargetSpec {
    fn default() -> Self {
        Self {
            module: "libcommonCrypto.dylib".into(),
            export: "CCKeyDerivationPBKDF".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TapConfig {
    pub target: TargetSpec,
    pub filter: SignatureFilter,
    pub limits: ReadLimits,
    pub store: StoreConfig,
    /// Re-read the output buffer on exit and report the derived key.
    pub read_derived_key: bool,
}

impl Default for TapConfig {
    fn default() -> Self {
        Self {
            target: TargetSpec::default(),
            filter: SignatureFilter::default(),
            limits: ReadLimits::default(),
            store: StoreConfig::default(),
            read_derived_key: true,
        }
    }
}

impl TapConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let data = fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        let config: TapConfig = serde_json::from_str(&data)
            .with_context(|| format!("parse config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `KEYTAP_CONFIG` or the user config dir, falling back to
    /// defaults when no file exists there.
    pub fn load_or_default() -> Result<Self> {
        let path = config_path()?;
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.target.module.trim().is_empty() || self.target.export.trim().is_empty() {
            bail!("target module and export must be set");
        }
        if self.filter.output_len == 0 {
            bail!("filter output_len must be non-zero");
        }
        for (name, limit) in [
            ("password", self.limits.password),
            ("salt", self.limits.salt),
            ("derived_key", self.limits.derived_key),
        ] {
            if limit == 0 || limit > MAX_READ_LIMIT {
                bail!("{name} read limit must be between 1 and {MAX_READ_LIMIT}");
            }
        }
        if let Some(len) = self.filter.password_len {
            if len == 0 || len > self.limits.password {
                bail!(
                    "filter password_len {len} can never be read with a password limit of {}",
                    self.limits.password
                );
            }
        }
        if self.read_derived_key && self.filter.output_len > self.limits.derived_key {
            bail!(
                "filter output_len {} exceeds the derived_key read limit {}",
                self.filter.output_len,
                self.limits.derived_key
            );
        }
        if self.store.path.as_os_str().is_empty() {
            bail!("store path must be set");
        }
        Ok(())
    }
}
