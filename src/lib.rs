//! Audit logging to a Firestore collection.
//!
//! Two kinds of records go to the `sabi_audit_logs` collection:
//! authentication events ([`log_auth_event`]) and system events
//! ([`log_system_event`]). [`verify_connectivity`] writes and deletes a
//! throwaway document to prove the store is reachable.
//!
//! The free functions use one lazily opened, process-wide connection (see
//! [`connection::get_connection`]). For tests, or to own the store client,
//! build an [`AuditLogger`] over any [`DocumentStore`].
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use sabi_audit_log::{AuditLogger, AuthLogParams, MemoryStore};
//!
//! # async fn example() -> Result<(), sabi_audit_log::AuditError> {
//! let logger = AuditLogger::new(Arc::new(MemoryStore::new()));
//! logger
//!     .log_auth_event(&AuthLogParams::new("user_123", "test-app", "LOGIN"))
//!     .await?;
//! logger.log_system_event("test-app", "Webhook Received", "INFO").await;
//! # Ok(())
//! # }
//! ```

pub mod connection;
pub mod credentials;
pub mod env;
pub mod init;
pub mod memory;
pub mod record;
pub mod store;
pub mod writer;

#[cfg(feature = "firestore")]
pub mod auth;
#[cfg(feature = "firestore")]
pub mod firestore;

/// `tracing` target of every diagnostic line emitted by this crate.
pub const LOG_TARGET: &str = "sabi_logger";

pub use connection::{get_connection, register_app, Connection, ConnectionError, APP_NAME};
pub use memory::MemoryStore;
pub use record::{AuthLogParams, Clock, FixedClock, LogEntry, LogPayload, SystemClock};
pub use store::{DocumentStore, StoreError, AUDIT_COLLECTION};
pub use writer::{
    log_auth_event, log_system_event, verify_connectivity, AuditError, AuditLogger, FailurePolicy,
    LoggerConfig,
};
