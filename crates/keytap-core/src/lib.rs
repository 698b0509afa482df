//! Core of the keytap agent: picks the database-key derivation out of the
//! PBKDF calls a process makes, pulls the raw secret out of process memory,
//! and records each distinct secret once.

pub mod config;
pub mod error;
pub mod filter;
pub mod invocation;
pub mod key_store;
pub mod memory;
pub mod paths;
pub mod prf;
pub mod reporter;
pub mod secret;
pub mod tap;

pub use config::TapConfig;
pub use filter::SignatureFilter;
pub use invocation::{CallId, DerivationArgs};
pub use key_store::KeyStore;
pub use memory::{Address, MemoryReader, ProcessMemory};
pub use reporter::{Reporter, TracingReporter};
pub use tap::DerivationTap;
