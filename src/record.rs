use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// `eventType` written by the connectivity probe.
pub const PROBE_EVENT_TYPE: &str = "CONNECTION_TEST";

/// `message` written by the connectivity probe.
pub const PROBE_MESSAGE: &str = "Self-test diagnostic log";

/// Prefix of every probe document id. The rest is epoch milliseconds.
pub const PROBE_ID_PREFIX: &str = "connection_test_";

/// A single audit record as persisted in the `sabi_audit_logs` collection.
///
/// `timestamp` is always taken from a [`Clock`] at build time and is never
/// supplied by the caller. Exactly one [`LogPayload`] variant is present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    #[serde(rename = "appId")]
    pub app_id: String,
    pub timestamp: String,
    #[serde(flatten)]
    pub payload: LogPayload,
}

/// Variant-dependent part of a [`LogEntry`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LogPayload {
    #[serde(rename_all = "camelCase")]
    Auth {
        uid: String,
        event_type: String,
        #[serde(default)]
        metadata: BTreeMap<String, serde_json::Value>,
    },
    System { message: String, level: String },
}

/// Caller-supplied parameters of an authentication event.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuthLogParams {
    pub uid: String,
    pub app_id: String,
    /// Free-form, e.g. `LOGIN`, `LOGOUT`, `DELETE_ACCOUNT`.
    pub event_type: String,
    pub metadata: Option<BTreeMap<String, serde_json::Value>>,
}

impl AuthLogParams {
    pub fn new(
        uid: impl Into<String>,
        app_id: impl Into<String>,
        event_type: impl Into<String>,
    ) -> Self {
        Self {
            uid: uid.into(),
            app_id: app_id.into(),
            event_type: event_type.into(),
            metadata: None,
        }
    }

    /// Attach caller metadata, consuming and returning `self`.
    pub fn with_metadata(mut self, metadata: BTreeMap<String, serde_json::Value>) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Name of the first required field that is empty, if any.
    pub fn missing_field(&self) -> Option<&'static str> {
        if self.uid.is_empty() {
            Some("uid")
        } else if self.app_id.is_empty() {
            Some("appId")
        } else if self.event_type.is_empty() {
            Some("eventType")
        } else {
            None
        }
    }
}

/// Fixed-shape document written and deleted by the connectivity probe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeRecord {
    pub timestamp: String,
    pub event_type: String,
    pub app_id: String,
    pub message: String,
}

/// Source of the current instant.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock pinned to one instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Format an instant as `YYYY-MM-DDTHH:mm:ss.sssZ`.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Build the auth variant. The caller's params are cloned, not mutated;
/// missing metadata becomes an empty map.
pub fn build_auth_entry(params: &AuthLogParams, at: DateTime<Utc>) -> LogEntry {
    LogEntry {
        app_id: params.app_id.clone(),
        timestamp: format_timestamp(at),
        payload: LogPayload::Auth {
            uid: params.uid.clone(),
            event_type: params.event_type.clone(),
            metadata: params.metadata.clone().unwrap_or_default(),
        },
    }
}

/// Build the system variant.
pub fn build_system_entry(app_id: &str, message: &str, level: &str, at: DateTime<Utc>) -> LogEntry {
    LogEntry {
        app_id: app_id.to_string(),
        timestamp: format_timestamp(at),
        payload: LogPayload::System {
            message: message.to_string(),
            level: level.to_string(),
        },
    }
}

pub fn build_probe_record(app_id: &str, at: DateTime<Utc>) -> ProbeRecord {
    ProbeRecord {
        timestamp: format_timestamp(at),
        event_type: PROBE_EVENT_TYPE.to_string(),
        app_id: app_id.to_string(),
        message: PROBE_MESSAGE.to_string(),
    }
}

/// Document id of the probe written at `at`, e.g. `connection_test_1770552000000`.
pub fn probe_document_id(at: DateTime<Utc>) -> String {
    format!("{}{}", PROBE_ID_PREFIX, at.timestamp_millis())
}
