mod common;

use chrono::{TimeZone, Utc};
use common::{capture, Failures, RecordingStore, StoreCall};
use sabi_audit_log::writer::{AUTH_FAILURE_PREFIX, SYSTEM_FAILURE_PREFIX};
use sabi_audit_log::{
    AuditError, AuditLogger, AuthLogParams, FailurePolicy, FixedClock, LoggerConfig, StoreError,
    AUDIT_COLLECTION,
};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::instrument::WithSubscriber;

fn logger(store: Arc<RecordingStore>) -> AuditLogger {
    let at = Utc.with_ymd_and_hms(2026, 2, 8, 12, 0, 0).unwrap();
    AuditLogger::new(store).with_clock(Arc::new(FixedClock(at)))
}

fn rethrowing(store: Arc<RecordingStore>) -> AuditLogger {
    logger(store).with_config(LoggerConfig {
        auth_failure_policy: FailurePolicy::Rethrow,
    })
}

#[tokio::test]
async fn auth_event_is_appended_with_exact_shape() {
    let store = RecordingStore::new();
    let mut metadata = BTreeMap::new();
    metadata.insert("ip".to_string(), json!("127.0.0.1"));
    let params = AuthLogParams::new("user_123", "test-app", "LOGIN").with_metadata(metadata);

    logger(store.clone()).log_auth_event(&params).await.unwrap();

    assert_eq!(
        store.calls(),
        vec![StoreCall::Add {
            collection: "sabi_audit_logs".to_string(),
            document: json!({
                "uid": "user_123",
                "appId": "test-app",
                "eventType": "LOGIN",
                "timestamp": "2026-02-08T12:00:00.000Z",
                "metadata": { "ip": "127.0.0.1" },
            }),
        }]
    );
    assert_eq!(store.inner.len(AUDIT_COLLECTION), 1);
}

#[tokio::test]
async fn auth_event_without_metadata_writes_empty_map() {
    let store = RecordingStore::new();
    logger(store.clone())
        .log_auth_event(&AuthLogParams::new("user_123", "test-app", "DELETE_ACCOUNT"))
        .await
        .unwrap();

    let docs = store.inner.documents(AUDIT_COLLECTION);
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0].1["metadata"], json!({}));
    assert_eq!(docs[0].1["eventType"], "DELETE_ACCOUNT");
}

#[tokio::test]
async fn system_event_is_appended_without_auth_fields() {
    let store = RecordingStore::new();
    logger(store.clone())
        .log_system_event("test-app", "Webhook Received", "INFO")
        .await;

    assert_eq!(
        store.calls(),
        vec![StoreCall::Add {
            collection: "sabi_audit_logs".to_string(),
            document: json!({
                "appId": "test-app",
                "timestamp": "2026-02-08T12:00:00.000Z",
                "message": "Webhook Received",
                "level": "INFO",
            }),
        }]
    );
}

#[tokio::test]
async fn auth_failure_is_swallowed_by_default_and_logged() {
    let store = RecordingStore::failing(Failures {
        add: Some(503),
        ..Default::default()
    });
    let (subscriber, captured) = capture();

    let result = logger(store.clone())
        .log_auth_event(&AuthLogParams::new("user_123", "test-app", "Login_Failed"))
        .with_subscriber(subscriber)
        .await;

    assert!(result.is_ok());
    assert_eq!(store.calls().len(), 1);
    let errors = captured.errors_with_prefix(AUTH_FAILURE_PREFIX);
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].target, "sabi_logger");
    assert!(errors[0].message.contains("503"));
}

#[tokio::test]
async fn auth_failure_is_returned_under_rethrow() {
    let store = RecordingStore::failing(Failures {
        add: Some(403),
        ..Default::default()
    });
    let (subscriber, captured) = capture();

    let err = rethrowing(store)
        .log_auth_event(&AuthLogParams::new("user_123", "test-app", "LOGIN"))
        .with_subscriber(subscriber)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        AuditError::Store(StoreError::Status { status: 403, .. })
    ));
    assert_eq!(captured.errors_with_prefix(AUTH_FAILURE_PREFIX).len(), 1);
}

#[tokio::test]
async fn empty_auth_fields_are_rejected_before_writing() {
    let store = RecordingStore::new();

    for (params, field) in [
        (AuthLogParams::new("", "test-app", "LOGIN"), "uid"),
        (AuthLogParams::new("user_123", "", "LOGIN"), "appId"),
        (AuthLogParams::new("user_123", "test-app", ""), "eventType"),
    ] {
        // rejected under both policies
        let err = logger(store.clone()).log_auth_event(&params).await.unwrap_err();
        assert!(matches!(err, AuditError::InvalidParams(f) if f == field));
        let err = rethrowing(store.clone()).log_auth_event(&params).await.unwrap_err();
        assert!(matches!(err, AuditError::InvalidParams(f) if f == field));
    }
    assert!(store.calls().is_empty());
}

#[tokio::test]
async fn system_failure_never_propagates_and_is_logged() {
    let store = RecordingStore::failing(Failures {
        add: Some(500),
        ..Default::default()
    });
    let (subscriber, captured) = capture();

    // returns (), there is nothing to propagate
    rethrowing(store.clone())
        .log_system_event("app", "msg", "ERROR")
        .with_subscriber(subscriber)
        .await;

    assert_eq!(store.calls().len(), 1);
    let errors = captured.errors_with_prefix(SYSTEM_FAILURE_PREFIX);
    assert_eq!(errors.len(), 1);
    assert!(errors[0].fields.contains_key("error"));
}

#[tokio::test]
async fn system_event_without_app_id_is_not_written() {
    let store = RecordingStore::new();
    let (subscriber, captured) = capture();

    logger(store.clone())
        .log_system_event("", "msg", "WARN")
        .with_subscriber(subscriber)
        .await;

    assert!(store.calls().is_empty());
    assert_eq!(captured.errors_with_prefix(SYSTEM_FAILURE_PREFIX).len(), 1);
}

#[tokio::test]
async fn level_and_event_type_are_free_form() {
    let store = RecordingStore::new();
    let logger = logger(store.clone());

    logger.log_system_event("app", "custom", "notice-ish").await;
    logger
        .log_auth_event(&AuthLogParams::new("u", "app", "SOMETHING_NEW"))
        .await
        .unwrap();

    let docs = store.inner.documents(AUDIT_COLLECTION);
    assert_eq!(docs.len(), 2);
    assert_eq!(docs[0].1["level"], "notice-ish");
    assert_eq!(docs[1].1["eventType"], "SOMETHING_NEW");
}

#[tokio::test]
async fn timestamps_come_from_the_clock_not_the_caller() {
    let store = RecordingStore::new();
    let later = Utc.with_ymd_and_hms(2026, 2, 8, 12, 0, 0).unwrap() + chrono::Duration::milliseconds(123);
    AuditLogger::new(store.clone())
        .with_clock(Arc::new(FixedClock(later)))
        .log_system_event("app", "tick", "INFO")
        .await;

    let docs = store.inner.documents(AUDIT_COLLECTION);
    assert_eq!(docs[0].1["timestamp"], "2026-02-08T12:00:00.123Z");
}
