use crate::auth::TokenSource;
use crate::env::DEFAULT_DATABASE_ID;
use crate::store::{DocumentStore, StoreError};
use crate::LOG_TARGET;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::debug;

pub const FIRESTORE_BASE_URL: &str = "https://firestore.googleapis.com";

/// Configuration for [`FirestoreStore`].
///
/// Documents live under
/// `{base_url}/v1/projects/{project_id}/databases/{database_id}/documents`.
#[derive(Clone, Debug)]
pub struct FirestoreConfig {
    /// Base URL without path, e.g. "https://firestore.googleapis.com"
    /// or "http://127.0.0.1:8080" for the emulator.
    pub base_url: String,
    pub project_id: String,
    pub database_id: String,
}

impl FirestoreConfig {
    pub fn new(project_id: impl Into<String>) -> Self {
        Self {
            base_url: FIRESTORE_BASE_URL.to_string(),
            project_id: project_id.into(),
            database_id: DEFAULT_DATABASE_ID.to_string(),
        }
    }

    /// Point at a local emulator listening on `host` (`host:port`).
    pub fn emulator(host: &str, project_id: impl Into<String>) -> Self {
        let base_url = if host.starts_with("http://") || host.starts_with("https://") {
            host.trim_end_matches('/').to_string()
        } else {
            format!("http://{}", host.trim_end_matches('/'))
        };
        Self {
            base_url,
            ..Self::new(project_id)
        }
    }

    pub fn with_database(mut self, database_id: impl Into<String>) -> Self {
        self.database_id = database_id.into();
        self
    }
}

/// Firestore implementation of [`DocumentStore`] over the REST interface.
#[derive(Clone)]
pub struct FirestoreStore {
    client: Client,
    config: FirestoreConfig,
    tokens: Arc<dyn TokenSource>,
}

impl FirestoreStore {
    /// Construct a store. No request is made until the first write.
    pub fn new(client: Client, config: FirestoreConfig, tokens: Arc<dyn TokenSource>) -> Self {
        Self {
            client,
            config,
            tokens,
        }
    }

    pub fn config(&self) -> &FirestoreConfig {
        &self.config
    }

    fn documents_root(&self) -> String {
        format!(
            "{}/v1/projects/{}/databases/{}/documents",
            self.config.base_url.trim_end_matches('/'),
            urlencoding::encode(&self.config.project_id),
            urlencoding::encode(&self.config.database_id),
        )
    }

    fn collection_url(&self, collection: &str) -> String {
        format!("{}/{}", self.documents_root(), urlencoding::encode(collection))
    }

    fn document_url(&self, collection: &str, id: &str) -> String {
        format!("{}/{}", self.collection_url(collection), urlencoding::encode(id))
    }

    async fn authorized(&self, req: RequestBuilder) -> Result<RequestBuilder, StoreError> {
        let token = self.tokens.token().await?;
        Ok(req.bearer_auth(token))
    }

    async fn check(resp: Response) -> Result<Response, StoreError> {
        let status = resp.status();
        if status.is_success() {
            Ok(resp)
        } else {
            let body = resp.text().await.unwrap_or_else(|_| "<no body>".to_string());
            Err(StoreError::Status {
                status: status.as_u16(),
                body,
            })
        }
    }
}

#[derive(Deserialize)]
struct DocumentResponse {
    name: String,
}

/// Last path segment of a Firestore resource name.
fn document_id(name: &str) -> Option<&str> {
    name.rsplit('/').next().filter(|id| !id.is_empty())
}

/// Encode a JSON object as the `fields` map of a Firestore document.
pub fn encode_fields(document: &Value) -> Result<Map<String, Value>, StoreError> {
    match document {
        Value::Object(map) => Ok(map
            .iter()
            .map(|(key, value)| (key.clone(), encode_value(value)))
            .collect()),
        other => Err(StoreError::InvalidDocument(format!(
            "expected a JSON object, got {}",
            json_kind(other)
        ))),
    }
}

/// Encode one JSON value as a Firestore typed `Value`.
pub fn encode_value(value: &Value) -> Value {
    match value {
        Value::Null => json!({ "nullValue": null }),
        Value::Bool(b) => json!({ "booleanValue": b }),
        Value::Number(n) => match n.as_i64() {
            // int64 travels as a decimal string
            Some(i) => json!({ "integerValue": i.to_string() }),
            None => json!({ "doubleValue": n.as_f64() }),
        },
        Value::String(s) => json!({ "stringValue": s }),
        Value::Array(items) if items.is_empty() => json!({ "arrayValue": {} }),
        Value::Array(items) => {
            let values: Vec<Value> = items.iter().map(encode_value).collect();
            json!({ "arrayValue": { "values": values } })
        }
        Value::Object(map) => {
            let fields: Map<String, Value> = map
                .iter()
                .map(|(key, value)| (key.clone(), encode_value(value)))
                .collect();
            json!({ "mapValue": { "fields": fields } })
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[async_trait]
impl DocumentStore for FirestoreStore {
    async fn add(&self, collection: &str, document: Value) -> Result<String, StoreError> {
        let body = json!({ "fields": encode_fields(&document)? });
        let req = self.client.post(self.collection_url(collection)).json(&body);
        let resp = Self::check(self.authorized(req).await?.send().await?).await?;

        let created: DocumentResponse = resp.json().await?;
        let id = document_id(&created.name)
            .ok_or_else(|| StoreError::MalformedResponse(format!("document name `{}`", created.name)))?;
        debug!(target: LOG_TARGET, collection, id, "document added");
        Ok(id.to_string())
    }

    async fn set(&self, collection: &str, id: &str, document: Value) -> Result<(), StoreError> {
        // PATCH without an update mask replaces the whole document, creating it if absent.
        let body = json!({ "fields": encode_fields(&document)? });
        let req = self.client.patch(self.document_url(collection, id)).json(&body);
        Self::check(self.authorized(req).await?.send().await?).await?;
        debug!(target: LOG_TARGET, collection, id, "document set");
        Ok(())
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError> {
        let req = self.client.delete(self.document_url(collection, id));
        Self::check(self.authorized(req).await?.send().await?).await?;
        debug!(target: LOG_TARGET, collection, id, "document deleted");
        Ok(())
    }
}
