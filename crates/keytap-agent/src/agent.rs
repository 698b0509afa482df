//! Attach/detach lifecycle.
//!
//! `attach` builds the key store and the tap, hooks the derivation routine
//! and returns an [`Agent`]. `detach` unhooks first, so no new invocation can
//! start, then closes the key store. Handlers already running keep their own
//! references and finish on their own.

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Weak};

use anyhow::{Context, Result};
use keytap_core::config::TapConfig;
use keytap_core::invocation::{CallId, DerivationArgs};
use keytap_core::key_store::KeyStore;
use keytap_core::memory::Address;
use keytap_core::reporter::Reporter;
use keytap_core::tap::DerivationTap;
use tracing::{error, info};

use crate::host::{InstrumentationHost, InterceptorHandle, InvocationHandler};

#[derive(Debug, thiserror::Error)]
pub enum AttachError {
    #[error("invalid config: {0:#}")]
    InvalidConfig(anyhow::Error),
    #[error("{module}!{export} not found in target process")]
    TargetNotFound { module: String, export: String },
    #[error("install interceptor: {0:#}")]
    Register(anyhow::Error),
}

pub struct Agent<H: InstrumentationHost + 'static> {
    host: Arc<H>,
    target: Address,
    handle: InterceptorHandle,
    tap: Arc<DerivationTap>,
}

impl<H: InstrumentationHost + 'static> Agent<H> {
    pub fn attach(
        host: Arc<H>,
        config: TapConfig,
        reporter: Arc<dyn Reporter>,
    ) -> Result<Self, AttachError> {
        config.validate().map_err(AttachError::InvalidConfig)?;

        let process = host.process_info();
        info!(
            pid = process.pid,
            platform = %process.platform,
            arch = %process.arch,
            "keytap attaching"
        );

        let target = host
            .resolve_export(&config.target.module, &config.target.export)
            .ok_or_else(|| {
                error!(
                    module = %config.target.module,
                    export = %config.target.export,
                    "derivation routine not found; nothing to intercept"
                );
                AttachError::TargetNotFound {
                    module: config.target.module.clone(),
                    export: config.target.export.clone(),
                }
            })?;

        let store = Arc::new(KeyStore::open(&config.store));
        let tap = Arc::new(DerivationTap::new(&config, store, reporter));
        let handler: Arc<dyn InvocationHandler> = Arc::new(TapHandler {
            tap: tap.clone(),
            host: Arc::downgrade(&host),
        });
        let handle = host
            .register_interceptor(target, handler)
            .with_context(|| format!("hook {} at {target}", config.target.export))
            .map_err(AttachError::Register)?;

        info!(
            target = %target,
            export = %config.target.export,
            key_file = %config.store.path.display(),
            session = %tap.store().session(),
            "hook installed; waiting for the target to derive its database key"
        );

        Ok(Self {
            host,
            target,
            handle,
            tap,
        })
    }

    pub fn target(&self) -> Address {
        self.target
    }

    pub fn store(&self) -> &Arc<KeyStore> {
        self.tap.store()
    }

    /// Stop intercepting and close the key store.
    pub fn detach(self) -> Result<()> {
        self.host.unregister(self.handle);
        let store = self.tap.store();
        store.close().context("close key store")?;
        info!(
            handle = %self.handle,
            keys = store.len(),
            "keytap detached"
        );
        Ok(())
    }
}

/// Bridges host callbacks into the tap. A panic anywhere below is logged
/// and swallowed: it must never unwind into the target's call stack.
struct TapHandler<H> {
    tap: Arc<DerivationTap>,
    host: Weak<H>,
}

impl<H: InstrumentationHost> InvocationHandler for TapHandler<H> {
    fn on_enter(&self, call: CallId, args: &DerivationArgs) {
        let Some(host) = self.host.upgrade() else {
            return;
        };
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            self.tap.on_enter(call, args, &*host);
        }));
        if outcome.is_err() {
            error!(call = %call, "entry handler panicked; invocation skipped");
        }
    }

    fn on_leave(&self, call: CallId) {
        let Some(host) = self.host.upgrade() else {
            return;
        };
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            self.tap.on_leave(call, &*host);
        }));
        if outcome.is_err() {
            error!(call = %call, "exit handler panicked");
        }
    }
}
