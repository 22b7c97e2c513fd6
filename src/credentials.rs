use crate::env::{env_non_empty, GOOGLE_APPLICATION_CREDENTIALS_ENV};
use crate::LOG_TARGET;
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Relative to `$HOME`, where `gcloud auth application-default login` writes.
const GCLOUD_WELL_KNOWN_FILE: &str = ".config/gcloud/application_default_credentials.json";

/// Errors raised while building or using a credential.
#[derive(thiserror::Error, Debug)]
pub enum CredentialError {
    #[error("failed to read credential file {path}: {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("credential file is not valid: {0}")]
    InvalidCredentialFile(#[source] serde_json::Error),

    #[error("unsupported credential type: {0}")]
    UnsupportedType(String),

    #[error("no project id could be determined")]
    MissingProjectId,

    #[cfg(feature = "firestore")]
    #[error("failed to sign token assertion: {0}")]
    Signing(#[from] jsonwebtoken::errors::Error),

    #[cfg(feature = "firestore")]
    #[error("token request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("token endpoint responded with status {status}: {body}")]
    TokenEndpoint { status: u16, body: String },
}

/// Service-account key as issued by the cloud console.
///
/// `Debug` prints only the project and a redacted key.
#[derive(Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub project_id: Option<String>,
    pub private_key_id: Option<String>,
    pub private_key: String,
    pub client_email: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

impl fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("project_id", &self.project_id)
            .field("private_key", &"<redacted>")
            .finish_non_exhaustive()
    }
}

/// End-user refresh-token credential written by `gcloud`.
#[derive(Clone, Deserialize)]
pub struct AuthorizedUser {
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
    pub quota_project_id: Option<String>,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

impl fmt::Debug for AuthorizedUser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthorizedUser")
            .field("quota_project_id", &self.quota_project_id)
            .finish_non_exhaustive()
    }
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

/// Credential chosen for the process-wide connection.
#[derive(Debug, Clone)]
pub enum Credential {
    /// Explicit JSON key supplied through the environment.
    ServiceAccount(ServiceAccountKey),
    /// Whatever the host environment provides, see [`discover_ambient`].
    ApplicationDefault,
}

impl Credential {
    pub fn kind(&self) -> &'static str {
        match self {
            Credential::ServiceAccount(_) => "service_account",
            Credential::ApplicationDefault => "application_default",
        }
    }
}

/// Concrete source behind [`Credential::ApplicationDefault`].
#[derive(Debug, Clone)]
pub enum AmbientCredential {
    ServiceAccount(ServiceAccountKey),
    AuthorizedUser(AuthorizedUser),
    MetadataServer,
}

impl AmbientCredential {
    pub fn kind(&self) -> &'static str {
        match self {
            AmbientCredential::ServiceAccount(_) => "service_account_file",
            AmbientCredential::AuthorizedUser(_) => "authorized_user",
            AmbientCredential::MetadataServer => "metadata_server",
        }
    }

    /// Project implied by the credential itself, if any.
    pub fn project_id(&self) -> Option<&str> {
        match self {
            AmbientCredential::ServiceAccount(key) => key.project_id.as_deref(),
            AmbientCredential::AuthorizedUser(user) => user.quota_project_id.as_deref(),
            AmbientCredential::MetadataServer => None,
        }
    }
}

/// Pick the credential strategy from the raw service-account variable.
///
/// - absent: ambient default.
/// - present but not a usable service-account key: warn, then ambient default.
///
/// Only the category and position of a parse error are logged, never the input.
pub fn resolve_credential(raw: Option<&str>) -> Result<Credential, CredentialError> {
    let Some(raw) = raw.filter(|r| !r.trim().is_empty()) else {
        info!(
            target: LOG_TARGET,
            "[sabi-logger] SABI_LOGGER_SERVICE_ACCOUNT not found, using Application Default Credentials"
        );
        return Ok(Credential::ApplicationDefault);
    };

    let key: ServiceAccountKey = match serde_json::from_str(raw) {
        Ok(key) => key,
        Err(err) => {
            warn!(
                target: LOG_TARGET,
                category = ?err.classify(),
                line = err.line(),
                column = err.column(),
                "[sabi-logger] Invalid Service Account JSON format, falling back to Application Default Credentials"
            );
            return Ok(Credential::ApplicationDefault);
        }
    };
    info!(
        target: LOG_TARGET,
        project_id = key.project_id.as_deref().unwrap_or("<unset>"),
        "[sabi-logger] Initialized with service account from SABI_LOGGER_SERVICE_ACCOUNT"
    );
    Ok(Credential::ServiceAccount(key))
}

/// Locate ambient credentials: the file named by
/// `GOOGLE_APPLICATION_CREDENTIALS`, then the gcloud well-known file, then
/// the compute metadata server.
pub fn discover_ambient() -> Result<AmbientCredential, CredentialError> {
    if let Some(path) = env_non_empty(GOOGLE_APPLICATION_CREDENTIALS_ENV) {
        return load_credential_file(Path::new(&path));
    }

    if let Some(home) = env_non_empty("HOME") {
        let well_known = Path::new(&home).join(GCLOUD_WELL_KNOWN_FILE);
        if well_known.is_file() {
            return load_credential_file(&well_known);
        }
    }

    Ok(AmbientCredential::MetadataServer)
}

fn load_credential_file(path: &Path) -> Result<AmbientCredential, CredentialError> {
    let contents = std::fs::read_to_string(path).map_err(|source| CredentialError::ReadFile {
        path: path.to_path_buf(),
        source,
    })?;
    parse_credential_file(&contents)
}

/// Parse an ambient credential file, dispatching on its `type` field.
pub fn parse_credential_file(contents: &str) -> Result<AmbientCredential, CredentialError> {
    #[derive(Deserialize)]
    struct Tagged {
        #[serde(rename = "type")]
        kind: String,
    }

    let value: serde_json::Value =
        serde_json::from_str(contents).map_err(CredentialError::InvalidCredentialFile)?;
    let tagged: Tagged =
        serde_json::from_value(value.clone()).map_err(CredentialError::InvalidCredentialFile)?;

    match tagged.kind.as_str() {
        "service_account" => serde_json::from_value(value)
            .map(AmbientCredential::ServiceAccount)
            .map_err(CredentialError::InvalidCredentialFile),
        "authorized_user" => serde_json::from_value(value)
            .map(AmbientCredential::AuthorizedUser)
            .map_err(CredentialError::InvalidCredentialFile),
        other => Err(CredentialError::UnsupportedType(other.to_string())),
    }
}
