use crate::credentials::CredentialError;
use crate::env::{
    env_non_empty, env_or, DEFAULT_DATABASE_ID, FIRESTORE_EMULATOR_HOST_ENV, GCLOUD_PROJECT_ENV,
    GOOGLE_CLOUD_PROJECT_ENV, SABI_LOGGER_DATABASE_ID_ENV, SABI_LOGGER_PROJECT_ID_ENV,
    SABI_LOGGER_SERVICE_ACCOUNT_ENV,
};
use crate::store::DocumentStore;
use crate::LOG_TARGET;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, OnceLock};
use tokio::sync::OnceCell;
use tracing::info;

/// Name under which this crate registers its application context.
pub const APP_NAME: &str = "sabi-logger";

/// Project used against the emulator when none is configured.
pub const EMULATOR_DEFAULT_PROJECT: &str = "demo-sabi-logger";

/// Shared handle to a document store.
///
/// Cloning is cheap and every clone points at the same store instance.
#[derive(Clone)]
pub struct Connection {
    store: Arc<dyn DocumentStore>,
}

impl Connection {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    /// True if both handles point at the same store instance.
    pub fn same_store(&self, other: &Connection) -> bool {
        Arc::ptr_eq(&self.store, &other.store)
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection").finish_non_exhaustive()
    }
}

/// Errors raised while establishing the process-wide connection.
#[derive(thiserror::Error, Debug)]
pub enum ConnectionError {
    #[error("credential error: {0}")]
    Credential(#[from] CredentialError),

    #[error("an application named `{0}` is already registered")]
    AlreadyRegistered(String),

    #[error("firestore feature is not enabled and no application is registered")]
    FirestoreFeatureDisabled,
}

fn registry() -> &'static Mutex<HashMap<String, Connection>> {
    static APPS: OnceLock<Mutex<HashMap<String, Connection>>> = OnceLock::new();
    APPS.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Register a named application context backed by `store`.
///
/// Hosts that already own a store client register it under [`APP_NAME`]
/// before the first audit call, and [`get_connection`] reuses it.
pub fn register_app(
    name: &str,
    store: Arc<dyn DocumentStore>,
) -> Result<Connection, ConnectionError> {
    let mut apps = registry().lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    if apps.contains_key(name) {
        return Err(ConnectionError::AlreadyRegistered(name.to_string()));
    }
    let connection = Connection::new(store);
    apps.insert(name.to_string(), connection.clone());
    Ok(connection)
}

/// Look up a previously registered application context.
pub fn app(name: &str) -> Option<Connection> {
    registry()
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .get(name)
        .cloned()
}

fn register_or_existing(name: &str, store: Arc<dyn DocumentStore>) -> Connection {
    let mut apps = registry().lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    apps.entry(name.to_string())
        .or_insert_with(|| Connection::new(store))
        .clone()
}

/// Settings used to open the store when no application is registered.
///
/// `Debug` shows only whether a credential is set.
#[derive(Clone, Default)]
pub struct ConnectionConfig {
    /// Raw JSON service-account credential.
    pub service_account_json: Option<String>,
    /// Explicit project, wins over anything the credential implies.
    pub project_id: Option<String>,
    /// Project from the ambient environment, used after the credential's own.
    pub ambient_project_id: Option<String>,
    pub database_id: String,
    /// `host:port` of a Firestore emulator.
    pub emulator_host: Option<String>,
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("service_account_json", &self.service_account_json.as_ref().map(|_| "<set>"))
            .field("project_id", &self.project_id)
            .field("ambient_project_id", &self.ambient_project_id)
            .field("database_id", &self.database_id)
            .field("emulator_host", &self.emulator_host)
            .finish()
    }
}

impl ConnectionConfig {
    pub fn from_env() -> Self {
        Self {
            service_account_json: env_non_empty(SABI_LOGGER_SERVICE_ACCOUNT_ENV),
            project_id: env_non_empty(SABI_LOGGER_PROJECT_ID_ENV),
            ambient_project_id: env_non_empty(GOOGLE_CLOUD_PROJECT_ENV)
                .or_else(|| env_non_empty(GCLOUD_PROJECT_ENV)),
            database_id: env_or(SABI_LOGGER_DATABASE_ID_ENV, DEFAULT_DATABASE_ID),
            emulator_host: env_non_empty(FIRESTORE_EMULATOR_HOST_ENV),
        }
    }

    fn database_id(&self) -> &str {
        if self.database_id.is_empty() {
            DEFAULT_DATABASE_ID
        } else {
            &self.database_id
        }
    }

    /// Explicit project, then the credential's own, then the ambient one.
    fn pick_project_id(&self, from_credential: Option<&str>) -> Option<String> {
        self.project_id
            .clone()
            .or_else(|| from_credential.map(str::to_string))
            .or_else(|| self.ambient_project_id.clone())
    }
}

/// Open a store from `config`: emulator, explicit service account, or
/// ambient default credentials, in that order.
#[cfg(feature = "firestore")]
pub async fn connect(config: &ConnectionConfig) -> Result<Arc<dyn DocumentStore>, ConnectionError> {
    use crate::auth::{
        AuthorizedUserTokenSource, MetadataServerTokenSource, ServiceAccountTokenSource, StaticToken,
        TokenSource,
    };
    use crate::credentials::{discover_ambient, resolve_credential, AmbientCredential, Credential};
    use crate::firestore::{FirestoreConfig, FirestoreStore};

    let client = reqwest::Client::new();

    if let Some(host) = &config.emulator_host {
        let project_id = config
            .pick_project_id(None)
            .unwrap_or_else(|| EMULATOR_DEFAULT_PROJECT.to_string());
        info!(
            target: LOG_TARGET,
            host = %host,
            project_id = %project_id,
            "[sabi-logger] Using Firestore emulator"
        );
        let store_config =
            FirestoreConfig::emulator(host, project_id).with_database(config.database_id());
        let store = FirestoreStore::new(client, store_config, Arc::new(StaticToken::new("owner")));
        return Ok(Arc::new(store));
    }

    let credential = resolve_credential(config.service_account_json.as_deref())?;
    let source_kind = credential.kind();

    let (tokens, project_id): (Arc<dyn TokenSource>, Option<String>) = match credential {
        Credential::ServiceAccount(key) => {
            let project_id = config.pick_project_id(key.project_id.as_deref());
            let tokens: Arc<dyn TokenSource> =
                Arc::new(ServiceAccountTokenSource::new(client.clone(), key));
            (tokens, project_id)
        }
        Credential::ApplicationDefault => {
            let ambient = discover_ambient()?;
            info!(
                target: LOG_TARGET,
                source = ambient.kind(),
                "[sabi-logger] Resolved application default credentials"
            );
            let project_id = config.pick_project_id(ambient.project_id());
            match ambient {
                AmbientCredential::ServiceAccount(key) => {
                    let tokens: Arc<dyn TokenSource> =
                        Arc::new(ServiceAccountTokenSource::new(client.clone(), key));
                    (tokens, project_id)
                }
                AmbientCredential::AuthorizedUser(user) => {
                    let tokens: Arc<dyn TokenSource> =
                        Arc::new(AuthorizedUserTokenSource::new(client.clone(), user));
                    (tokens, project_id)
                }
                AmbientCredential::MetadataServer => {
                    let metadata = MetadataServerTokenSource::new(client.clone());
                    let project_id = match project_id {
                        Some(project_id) => project_id,
                        None => metadata.project_id().await?,
                    };
                    let tokens: Arc<dyn TokenSource> = Arc::new(metadata);
                    (tokens, Some(project_id))
                }
            }
        }
    };

    let project_id = project_id.ok_or(CredentialError::MissingProjectId)?;
    info!(
        target: LOG_TARGET,
        source = source_kind,
        project_id = %project_id,
        "[sabi-logger] Connected to Firestore"
    );

    let store_config = FirestoreConfig::new(project_id).with_database(config.database_id());
    Ok(Arc::new(FirestoreStore::new(client, store_config, tokens)))
}

#[cfg(not(feature = "firestore"))]
pub async fn connect(config: &ConnectionConfig) -> Result<Arc<dyn DocumentStore>, ConnectionError> {
    let _ = config;
    Err(ConnectionError::FirestoreFeatureDisabled)
}

static CONNECTION: OnceCell<Connection> = OnceCell::const_new();

/// Process-wide connection, opened on first use.
///
/// Reuses an application registered under [`APP_NAME`] if there is one,
/// otherwise connects with [`ConnectionConfig::from_env`] and registers the
/// result. Concurrent first callers wait for a single initialization. A
/// failed initialization is returned to the caller and retried on the next
/// call.
pub async fn get_connection() -> Result<&'static Connection, ConnectionError> {
    CONNECTION
        .get_or_try_init(|| async {
            if let Some(existing) = app(APP_NAME) {
                info!(target: LOG_TARGET, app = APP_NAME, "[sabi-logger] Reusing registered application");
                return Ok(existing);
            }
            let store = connect(&ConnectionConfig::from_env()).await?;
            Ok::<_, ConnectionError>(register_or_existing(APP_NAME, store))
        })
        .await
}
