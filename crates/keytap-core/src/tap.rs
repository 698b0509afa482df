//! Entry/exit handling for the intercepted derivation routine.
//!
//! ```text
//! on_enter:  Entered ─┬─ filter rejects ──> Ignored ──> Done   (no lock, no read)
//!                     └─ filter accepts ──> ArgsCaptured
//!                          read password, read salt, capture, report
//!                          context parked under its CallId
//! on_leave:  take context for CallId ──> read output buffer, report ──> Done
//! ```
//!
//! A fault on the password does not cut the call short: the salt and the
//! output buffer are still read and logged at debug, but nothing is stored
//! or reported.
//!
//! Nothing here returns an error to the host. Faults are logged and the
//! affected field is skipped.

use std::sync::Arc;

use tracing::debug;
use zeroize::Zeroizing;

use crate::config::TapConfig;
use crate::filter::SignatureFilter;
use crate::invocation::{CallId, ContextTable, DerivationArgs, InvocationContext, InvocationState};
use crate::key_store::{Capture, KeyStore};
use crate::memory::{MemoryReader, ProcessMemory, ReadLimits};
use crate::prf::prf_name;
use crate::reporter::{CaptureRecord, Reporter};
use crate::secret::CapturedSecret;

pub struct DerivationTap {
    filter: SignatureFilter,
    limits: ReadLimits,
    read_derived_key: bool,
    contexts: ContextTable,
    store: Arc<KeyStore>,
    reporter: Arc<dyn Reporter>,
}

impl DerivationTap {
    pub fn new(config: &TapConfig, store: Arc<KeyStore>, reporter: Arc<dyn Reporter>) -> Self {
        Self {
            filter: config.filter,
            limits: config.limits,
            read_derived_key: config.read_derived_key,
            contexts: ContextTable::new(),
            store,
            reporter,
        }
    }

    pub fn store(&self) -> &Arc<KeyStore> {
        &self.store
    }

    /// Matched calls that have entered but not yet left.
    pub fn in_flight(&self) -> usize {
        self.contexts.len()
    }

    /// Handle an entry event. Returns the state the call ended up in.
    pub fn on_enter(
        &self,
        call: CallId,
        args: &DerivationArgs,
        memory: &dyn ProcessMemory,
    ) -> InvocationState {
        let mut ctx = InvocationContext::enter(call, *args);
        ctx.classify(self.filter.accepts_args(args));
        if !ctx.matched {
            return ctx.state;
        }

        let reader = MemoryReader::new(memory);
        match self.capture(&reader, call, args) {
            SecretRead::Reported => ctx.reported = true,
            SecretRead::Duplicate => {}
            SecretRead::Unreadable => ctx.secret_unreadable = true,
        }
        let state = ctx.state;
        self.contexts.insert(ctx);
        state
    }

    /// Handle the exit event of `call`. Calls that were ignored at entry have
    /// no context and cost one map lookup.
    pub fn on_leave(&self, call: CallId, memory: &dyn ProcessMemory) {
        let Some(mut ctx) = self.contexts.take(call) else {
            return;
        };
        // Duplicates stay quiet; a call whose secret could not be read still
        // gets its output buffer logged at debug.
        if self.read_derived_key && (ctx.reported || ctx.secret_unreadable) {
            let reader = MemoryReader::new(memory);
            match reader.read_hex(
                ctx.args.derived_key,
                ctx.args.derived_key_len,
                self.limits.derived_key,
            ) {
                Ok(hex) => {
                    let hex = Zeroizing::new(hex);
                    if ctx.reported {
                        self.reporter.derived_key(call, &hex);
                    } else {
                        debug!(call = %call, derived_key = %hex.as_str(), "derived key of unreadable secret");
                    }
                }
                Err(err) => debug!(call = %call, error = %err, "derived key not readable"),
            }
        }
        ctx.finish();
    }

    /// Read the password and salt of a matched call and hand the secret to
    /// the store. A fault on one field does not stop the other from being
    /// read.
    fn capture(&self, reader: &MemoryReader<'_>, call: CallId, args: &DerivationArgs) -> SecretRead {
        let password = reader.read(args.password, args.password_len, self.limits.password);

        let salt_hex = match reader.read_hex(args.salt, args.salt_len, self.limits.salt) {
            Ok(hex) => Some(hex),
            Err(err) => {
                debug!(call = %call, error = %err, "salt not readable");
                None
            }
        };

        let password = match password {
            Ok(bytes) => bytes,
            Err(err) => {
                debug!(
                    call = %call,
                    error = %err,
                    salt = salt_hex.as_deref().unwrap_or("<unreadable>"),
                    prf = prf_name(args.prf),
                    rounds = args.rounds,
                    "password not readable; skipping key"
                );
                return SecretRead::Unreadable;
            }
        };

        let secret = CapturedSecret::new(&password, salt_hex, args.prf, args.rounds);
        if let Capture::Duplicate = self.store.capture(&secret) {
            return SecretRead::Duplicate;
        }

        self.reporter.secret_captured(&CaptureRecord {
            call,
            algorithm: args.algorithm,
            password_len: args.password_len,
            salt_hex: secret.salt_hex.clone(),
            prf: args.prf,
            prf_name: prf_name(args.prf).to_string(),
            rounds: args.rounds,
            output_len: args.derived_key_len,
            key_hex: secret.key_hex.clone(),
            key_len: secret.key_len,
        });
        SecretRead::Reported
    }
}

enum SecretRead {
    Reported,
    Duplicate,
    Unreadable,
}
