use crate::connection::{get_connection, Connection, ConnectionError};
use crate::env::{env_non_empty, SABI_LOGGER_AUTH_FAILURE_POLICY_ENV};
use crate::record::{
    build_auth_entry, build_probe_record, build_system_entry, probe_document_id, AuthLogParams,
    Clock, LogEntry, SystemClock,
};
use crate::store::{DocumentStore, StoreError, AUDIT_COLLECTION};
use crate::LOG_TARGET;
use std::str::FromStr;
use std::sync::{Arc, OnceLock};
use tracing::{debug, error, warn};

pub const AUTH_FAILURE_PREFIX: &str = "[sabi-logger] Failed to log auth event";
pub const SYSTEM_FAILURE_PREFIX: &str = "[sabi-logger] Failed to log system event";
pub const PROBE_FAILURE_PREFIX: &str = "[sabi-logger] Connection test failed";

/// What `log_auth_event` does when the record cannot be delivered.
///
/// The failure is logged in both cases. `Swallow` then returns `Ok(())`,
/// `Rethrow` returns the error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    #[default]
    Swallow,
    Rethrow,
}

#[derive(thiserror::Error, Debug)]
#[error("unknown failure policy `{0}`, expected `swallow` or `rethrow`")]
pub struct ParsePolicyError(String);

impl FromStr for FailurePolicy {
    type Err = ParsePolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "swallow" => Ok(FailurePolicy::Swallow),
            "rethrow" => Ok(FailurePolicy::Rethrow),
            _ => Err(ParsePolicyError(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LoggerConfig {
    pub auth_failure_policy: FailurePolicy,
}

impl LoggerConfig {
    /// Read `SABI_LOGGER_AUTH_FAILURE_POLICY`. Unknown values keep the
    /// default and emit a warning.
    pub fn from_env() -> Self {
        let auth_failure_policy = match env_non_empty(SABI_LOGGER_AUTH_FAILURE_POLICY_ENV) {
            None => FailurePolicy::default(),
            Some(raw) => raw.parse().unwrap_or_else(|err: ParsePolicyError| {
                warn!(target: LOG_TARGET, error = %err, "[sabi-logger] Ignoring auth failure policy");
                FailurePolicy::default()
            }),
        };
        Self { auth_failure_policy }
    }
}

/// Errors returned by the audit entry points.
#[derive(thiserror::Error, Debug)]
pub enum AuditError {
    #[error("missing required field `{0}`")]
    InvalidParams(&'static str),

    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Writes audit records to an injected [`DocumentStore`].
///
/// This is the testable core. The crate-level [`log_auth_event`],
/// [`log_system_event`] and [`verify_connectivity`] functions build one of
/// these over the process-wide connection.
#[derive(Clone)]
pub struct AuditLogger {
    store: Arc<dyn DocumentStore>,
    clock: Arc<dyn Clock>,
    config: LoggerConfig,
}

impl AuditLogger {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            clock: Arc::new(SystemClock),
            config: LoggerConfig::default(),
        }
    }

    pub fn from_connection(connection: &Connection) -> Self {
        Self::new(Arc::clone(connection.store()))
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_config(mut self, config: LoggerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &LoggerConfig {
        &self.config
    }

    async fn append(&self, entry: &LogEntry) -> Result<String, StoreError> {
        let document = serde_json::to_value(entry)?;
        self.store.add(AUDIT_COLLECTION, document).await
    }

    /// Record an authentication event.
    ///
    /// Empty `uid`, `app_id` or `event_type` is rejected with
    /// [`AuditError::InvalidParams`] before anything is written. Delivery
    /// failures follow [`LoggerConfig::auth_failure_policy`].
    pub async fn log_auth_event(&self, params: &AuthLogParams) -> Result<(), AuditError> {
        if let Some(field) = params.missing_field() {
            return Err(AuditError::InvalidParams(field));
        }

        let entry = build_auth_entry(params, self.clock.now());
        match self.append(&entry).await {
            Ok(id) => {
                debug!(target: LOG_TARGET, id = %id, app_id = %params.app_id, "auth event written");
                Ok(())
            }
            Err(err) => auth_failure(self.config.auth_failure_policy, err.into()),
        }
    }

    /// Record a system event. Never fails; problems are logged.
    pub async fn log_system_event(&self, app_id: &str, message: &str, level: &str) {
        if app_id.is_empty() {
            error!(target: LOG_TARGET, "{}: missing required field `appId`", SYSTEM_FAILURE_PREFIX);
            return;
        }

        let entry = build_system_entry(app_id, message, level, self.clock.now());
        match self.append(&entry).await {
            Ok(id) => debug!(target: LOG_TARGET, id = %id, app_id, "system event written"),
            Err(err) => system_failure(&AuditError::from(err)),
        }
    }

    /// Write and immediately delete a probe document.
    ///
    /// Returns `Ok(true)` only when both steps succeed. Either failure is
    /// logged and returned unchanged.
    pub async fn verify_connectivity(&self, app_id: &str) -> Result<bool, AuditError> {
        let now = self.clock.now();
        let id = probe_document_id(now);
        let record = build_probe_record(app_id, now);

        let result: Result<(), StoreError> = async {
            let document = serde_json::to_value(&record)?;
            self.store.set(AUDIT_COLLECTION, &id, document).await?;
            self.store.delete(AUDIT_COLLECTION, &id).await
        }
        .await;

        match result {
            Ok(()) => {
                debug!(target: LOG_TARGET, id = %id, app_id, "connectivity probe succeeded");
                Ok(true)
            }
            Err(err) => Err(probe_failure(err.into())),
        }
    }
}

fn auth_failure(policy: FailurePolicy, err: AuditError) -> Result<(), AuditError> {
    error!(target: LOG_TARGET, error = %err, "{}: {}", AUTH_FAILURE_PREFIX, err);
    match policy {
        FailurePolicy::Swallow => Ok(()),
        FailurePolicy::Rethrow => Err(err),
    }
}

fn system_failure(err: &AuditError) {
    error!(target: LOG_TARGET, error = %err, "{}: {}", SYSTEM_FAILURE_PREFIX, err);
}

fn probe_failure(err: AuditError) -> AuditError {
    error!(target: LOG_TARGET, error = %err, "{}: {}", PROBE_FAILURE_PREFIX, err);
    err
}

fn default_config() -> LoggerConfig {
    static CONFIG: OnceLock<LoggerConfig> = OnceLock::new();
    *CONFIG.get_or_init(LoggerConfig::from_env)
}

async fn default_logger() -> Result<AuditLogger, ConnectionError> {
    let connection = get_connection().await?;
    Ok(AuditLogger::from_connection(connection).with_config(default_config()))
}

/// [`AuditLogger::log_auth_event`] over the process-wide connection.
///
/// Connection failures are treated like delivery failures.
pub async fn log_auth_event(params: &AuthLogParams) -> Result<(), AuditError> {
    if let Some(field) = params.missing_field() {
        return Err(AuditError::InvalidParams(field));
    }
    match default_logger().await {
        Ok(logger) => logger.log_auth_event(params).await,
        Err(err) => auth_failure(default_config().auth_failure_policy, err.into()),
    }
}

/// [`AuditLogger::log_system_event`] over the process-wide connection.
pub async fn log_system_event(app_id: &str, message: &str, level: &str) {
    match default_logger().await {
        Ok(logger) => logger.log_system_event(app_id, message, level).await,
        Err(err) => system_failure(&AuditError::from(err)),
    }
}

/// [`AuditLogger::verify_connectivity`] over the process-wide connection.
pub async fn verify_connectivity(app_id: &str) -> Result<bool, AuditError> {
    let logger = default_logger()
        .await
        .map_err(|err| probe_failure(err.into()))?;
    logger.verify_connectivity(app_id).await
}
