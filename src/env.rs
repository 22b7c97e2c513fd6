//! Environment variable names read by this crate.
//!
//! Only [`ConnectionConfig::from_env`](crate::connection::ConnectionConfig::from_env),
//! [`LoggerConfig::from_env`](crate::writer::LoggerConfig::from_env) and the
//! ambient credential lookup touch the environment; every other type takes
//! explicit values.

/// JSON-encoded service-account credential.
pub const SABI_LOGGER_SERVICE_ACCOUNT_ENV: &str = "SABI_LOGGER_SERVICE_ACCOUNT";

/// Explicit project id, overrides whatever the credential implies.
pub const SABI_LOGGER_PROJECT_ID_ENV: &str = "SABI_LOGGER_PROJECT_ID";

/// Firestore database id.
pub const SABI_LOGGER_DATABASE_ID_ENV: &str = "SABI_LOGGER_DATABASE_ID";

/// `swallow` or `rethrow`, see [`FailurePolicy`](crate::writer::FailurePolicy).
pub const SABI_LOGGER_AUTH_FAILURE_POLICY_ENV: &str = "SABI_LOGGER_AUTH_FAILURE_POLICY";

/// `EnvFilter` directives for [`init_diagnostics`](crate::init::init_diagnostics).
pub const SABI_LOGGER_LOG_ENV: &str = "SABI_LOGGER_LOG";

/// `host:port` of a local Firestore emulator.
pub const FIRESTORE_EMULATOR_HOST_ENV: &str = "FIRESTORE_EMULATOR_HOST";

/// Path to an ambient credential file (service account or authorized user).
pub const GOOGLE_APPLICATION_CREDENTIALS_ENV: &str = "GOOGLE_APPLICATION_CREDENTIALS";

pub const GOOGLE_CLOUD_PROJECT_ENV: &str = "GOOGLE_CLOUD_PROJECT";

pub const GCLOUD_PROJECT_ENV: &str = "GCLOUD_PROJECT";

/// Default Firestore database id.
pub const DEFAULT_DATABASE_ID: &str = "(default)";

/// Read an environment variable or fall back to a provided default.
pub fn env_or(key: &str, default: &str) -> String {
    env_non_empty(key).unwrap_or_else(|| default.to_string())
}

/// Read an environment variable, treating unset and empty the same.
pub fn env_non_empty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}
