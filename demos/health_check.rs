use sabi_audit_log::init::init_default_diagnostics;
use sabi_audit_log::{log_auth_event, log_system_event, verify_connectivity, AuthLogParams};
use std::collections::BTreeMap;

/// Probes the store behind the process-wide connection, then writes one
/// event of each kind.
///
/// Run against the emulator with
/// `FIRESTORE_EMULATOR_HOST=127.0.0.1:8080 SABI_LOGGER_LOG=sabi_logger=debug`,
/// or against a real project with `SABI_LOGGER_SERVICE_ACCOUNT` set.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_default_diagnostics()?;

    verify_connectivity("health-check").await?;
    println!("store reachable");

    let mut metadata = BTreeMap::new();
    metadata.insert("ip".to_string(), serde_json::json!("127.0.0.1"));
    log_auth_event(&AuthLogParams::new("user_123", "health-check", "LOGIN").with_metadata(metadata))
        .await?;

    log_system_event("health-check", "Webhook Received", "INFO").await;
    Ok(())
}
