#![allow(dead_code)]

use async_trait::async_trait;
use sabi_audit_log::{DocumentStore, MemoryStore, StoreError};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};
use tracing_subscriber::Registry;

/// One call observed by [`RecordingStore`].
#[derive(Debug, Clone, PartialEq)]
pub enum StoreCall {
    Add { collection: String, document: serde_json::Value },
    Set { collection: String, id: String, document: serde_json::Value },
    Delete { collection: String, id: String },
}

/// Which operation should fail, and with what HTTP status.
#[derive(Debug, Clone, Copy, Default)]
pub struct Failures {
    pub add: Option<u16>,
    pub set: Option<u16>,
    pub delete: Option<u16>,
}

/// Records every call, delegates to a [`MemoryStore`], and fails on demand.
#[derive(Default)]
pub struct RecordingStore {
    pub inner: MemoryStore,
    calls: Mutex<Vec<StoreCall>>,
    failures: Failures,
}

impl RecordingStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing(failures: Failures) -> Arc<Self> {
        Arc::new(Self {
            failures,
            ..Self::default()
        })
    }

    pub fn calls(&self) -> Vec<StoreCall> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: StoreCall) {
        self.calls.lock().unwrap().push(call);
    }
}

fn unavailable(status: u16) -> StoreError {
    StoreError::Status {
        status,
        body: "Firestore error".to_string(),
    }
}

#[async_trait]
impl DocumentStore for RecordingStore {
    async fn add(&self, collection: &str, document: serde_json::Value) -> Result<String, StoreError> {
        self.record(StoreCall::Add {
            collection: collection.to_string(),
            document: document.clone(),
        });
        if let Some(status) = self.failures.add {
            return Err(unavailable(status));
        }
        self.inner.add(collection, document).await
    }

    async fn set(
        &self,
        collection: &str,
        id: &str,
        document: serde_json::Value,
    ) -> Result<(), StoreError> {
        self.record(StoreCall::Set {
            collection: collection.to_string(),
            id: id.to_string(),
            document: document.clone(),
        });
        if let Some(status) = self.failures.set {
            return Err(unavailable(status));
        }
        self.inner.set(collection, id, document).await
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError> {
        self.record(StoreCall::Delete {
            collection: collection.to_string(),
            id: id.to_string(),
        });
        if let Some(status) = self.failures.delete {
            return Err(unavailable(status));
        }
        self.inner.delete(collection, id).await
    }
}

/// A diagnostic line captured from `tracing`.
#[derive(Debug, Clone)]
pub struct CapturedEvent {
    pub level: Level,
    pub target: String,
    pub message: String,
    pub fields: BTreeMap<String, String>,
}

#[derive(Clone, Default)]
pub struct Captured(Arc<Mutex<Vec<CapturedEvent>>>);

impl Captured {
    pub fn events(&self) -> Vec<CapturedEvent> {
        self.0.lock().unwrap().clone()
    }

    /// Errors whose message starts with `prefix`.
    pub fn errors_with_prefix(&self, prefix: &str) -> Vec<CapturedEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.level == Level::ERROR && e.message.starts_with(prefix))
            .collect()
    }
}

struct CaptureLayer {
    events: Captured,
}

struct FieldVisitor<'a> {
    fields: &'a mut BTreeMap<String, String>,
    message: &'a mut String,
}

impl<'a> Visit for FieldVisitor<'a> {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            *self.message = value.to_string();
        } else {
            self.fields.insert(field.name().to_string(), value.to_string());
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            *self.message = format!("{:?}", value);
        } else {
            self.fields.insert(field.name().to_string(), format!("{:?}", value));
        }
    }
}

impl<S> Layer<S> for CaptureLayer
where
    S: Subscriber,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut fields = BTreeMap::new();
        let mut message = String::new();
        event.record(&mut FieldVisitor {
            fields: &mut fields,
            message: &mut message,
        });

        let meta = event.metadata();
        self.events.0.lock().unwrap().push(CapturedEvent {
            level: *meta.level(),
            target: meta.target().to_string(),
            message,
            fields,
        });
    }
}

/// Subscriber that stores every event, for use with `WithSubscriber`.
pub fn capture() -> (impl Subscriber + Send + Sync + 'static, Captured) {
    let captured = Captured::default();
    let subscriber = Registry::default().with(CaptureLayer {
        events: captured.clone(),
    });
    (subscriber, captured)
}
