use async_trait::async_trait;
use std::sync::Arc;

use sabi_audit_log::{
    register_app, AuditLogger, AuthLogParams, DocumentStore, StoreError, APP_NAME,
};

/// Example of plugging in a completely custom store by implementing
/// `DocumentStore` directly. Imagine this wraps a client library the host
/// already uses; here it just prints.
struct StdoutStore;

#[async_trait]
impl DocumentStore for StdoutStore {
    async fn add(&self, collection: &str, document: serde_json::Value) -> Result<String, StoreError> {
        println!("[stdout-store] add {collection}: {document}");
        Ok("stdout".to_string())
    }

    async fn set(
        &self,
        collection: &str,
        id: &str,
        document: serde_json::Value,
    ) -> Result<(), StoreError> {
        println!("[stdout-store] set {collection}/{id}: {document}");
        Ok(())
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError> {
        println!("[stdout-store] delete {collection}/{id}");
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let store: Arc<dyn DocumentStore> = Arc::new(StdoutStore);

    // Injected: no global state involved.
    let logger = AuditLogger::new(store.clone());
    logger
        .log_auth_event(&AuthLogParams::new("user_123", "custom-app", "LOGOUT"))
        .await?;

    // Registered: the crate-level functions pick it up.
    register_app(APP_NAME, store)?;
    sabi_audit_log::log_system_event("custom-app", "Registered store in use", "INFO").await;
    println!("probe ok: {}", sabi_audit_log::verify_connectivity("custom-app").await?);
    Ok(())
}
