//! Change notifications for blueprint mutations
//!
//! Handlers report what they changed through the [`Notifier`] trait. The
//! bundled [`EventBus`] implements it on top of `tokio::sync::broadcast`, so any
//! number of subscribers (a socket layer, an audit log, tests) can listen.
//!
//! ```text
//! create/update/destroy ──┐
//!                         ├──▶ Notifier ──▶ EventBus ──▶ broadcast channel ──▶ subscribers
//! add/remove ─────────────┘
//! ```
//!
//! Every notification carries the request id that caused it. Unless the bus
//! mirrors, that id is recorded as `exclude` on the envelope so the caller does
//! not hear its own change.
//!
//! A `find` watches its model: `created` envelopes for that model list the
//! current watchers in `watchers`. Each model keeps at most
//! [`DEFAULT_WATCH_CAPACITY`] watchers; the least recently seen is dropped
//! first.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use indexmap::IndexSet;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Watchers remembered per model
pub const DEFAULT_WATCH_CAPACITY: usize = 256;

/// Record lifecycle events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum RecordEvent {
    Created {
        model: String,
        id: Value,
        data: Value,
    },
    Updated {
        model: String,
        id: Value,
        data: Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        previous: Option<Value>,
    },
    Destroyed {
        model: String,
        id: Value,
        data: Value,
    },
}

/// Association link events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum LinkEvent {
    Added {
        model: String,
        alias: String,
        parent_id: Value,
        child_id: Value,
    },
    Removed {
        model: String,
        alias: String,
        parent_id: Value,
        child_id: Value,
    },
}

/// Everything the bus carries
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BlueprintEvent {
    Record(RecordEvent),
    Link(LinkEvent),
}

impl BlueprintEvent {
    /// Model the event is about
    pub fn model(&self) -> &str {
        match self {
            BlueprintEvent::Record(
                RecordEvent::Created { model, .. }
                | RecordEvent::Updated { model, .. }
                | RecordEvent::Destroyed { model, .. },
            ) => model.as_str(),
            BlueprintEvent::Link(
                LinkEvent::Added { model, .. } | LinkEvent::Removed { model, .. },
            ) => model.as_str(),
        }
    }

    /// `created`, `updated`, `destroyed`, `added` or `removed`
    pub fn action(&self) -> &'static str {
        match self {
            BlueprintEvent::Record(RecordEvent::Created { .. }) => "created",
            BlueprintEvent::Record(RecordEvent::Updated { .. }) => "updated",
            BlueprintEvent::Record(RecordEvent::Destroyed { .. }) => "destroyed",
            BlueprintEvent::Link(LinkEvent::Added { .. }) => "added",
            BlueprintEvent::Link(LinkEvent::Removed { .. }) => "removed",
        }
    }
}

/// An event with its delivery metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// Subscriber that must not receive this event
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclude: Option<String>,
    /// Watchers of the model, set on `created` events
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub watchers: Vec<String>,
    pub event: BlueprintEvent,
}

impl EventEnvelope {
    pub fn new(event: BlueprintEvent, exclude: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            exclude,
            watchers: Vec::new(),
            event,
        }
    }

    pub fn with_watchers(mut self, watchers: Vec<String>) -> Self {
        self.watchers = watchers;
        self
    }

    /// Whether `subscriber` should see this event
    pub fn is_for(&self, subscriber: &str) -> bool {
        self.exclude.as_deref() != Some(subscriber)
    }

    /// Whether `subscriber` watched the model when this record was created
    pub fn is_watched_by(&self, subscriber: &str) -> bool {
        self.is_for(subscriber) && self.watchers.iter().any(|w| w == subscriber)
    }
}

/// Post-mutation hooks called by the blueprint actions
///
/// `origin` is the id of the request that caused the change.
pub trait Notifier: Send + Sync {
    fn record_created(&self, model: &str, id: &Value, record: &Value, origin: Option<&str>);

    fn record_updated(
        &self,
        model: &str,
        id: &Value,
        record: &Value,
        previous: Option<&Value>,
        origin: Option<&str>,
    );

    fn record_destroyed(&self, model: &str, id: &Value, record: &Value, origin: Option<&str>);

    fn link_added(
        &self,
        model: &str,
        alias: &str,
        parent_id: &Value,
        child_id: &Value,
        origin: Option<&str>,
    );

    fn link_removed(
        &self,
        model: &str,
        alias: &str,
        parent_id: &Value,
        child_id: &Value,
        origin: Option<&str>,
    );

    /// Subscribe `origin` to records created in `model`
    fn watch(&self, model: &str, origin: &str);

    /// Stop delivering `model` creations to `origin`
    fn unwatch(&self, _model: &str, _origin: &str) {}
}

/// Broadcast-based event bus
///
/// Cheap to clone; clones share the channel and the watcher table.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<EventEnvelope>,
    watchers: Arc<RwLock<HashMap<String, IndexSet<String>>>>,
    watch_capacity: usize,
    mirror: bool,
}

impl EventBus {
    /// Create a bus buffering up to `capacity` events per slow receiver
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            watchers: Arc::new(RwLock::new(HashMap::new())),
            watch_capacity: DEFAULT_WATCH_CAPACITY,
            mirror: false,
        }
    }

    /// Remember at most `capacity` watchers per model
    pub fn with_watch_capacity(mut self, capacity: usize) -> Self {
        self.watch_capacity = capacity.max(1);
        self
    }

    /// Deliver events to the request that caused them as well
    pub fn with_mirror(mut self, mirror: bool) -> Self {
        self.mirror = mirror;
        self
    }

    /// Publish an event; returns how many receivers got it
    pub fn publish(&self, event: BlueprintEvent, origin: Option<&str>) -> usize {
        let exclude = if self.mirror {
            None
        } else {
            origin.map(str::to_string)
        };
        let watchers = match &event {
            BlueprintEvent::Record(RecordEvent::Created { model, .. }) => self.watchers(model),
            _ => Vec::new(),
        };
        tracing::debug!(model = event.model(), action = event.action(), "publishing event");
        // send() only fails when nobody listens
        self.sender
            .send(EventEnvelope::new(event, exclude).with_watchers(watchers))
            .unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.sender.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Subscribers watching `model` for new records, least recent first
    pub fn watchers(&self, model: &str) -> Vec<String> {
        match self.watchers.read() {
            Ok(watchers) => watchers
                .get(model)
                .map(|set| set.iter().cloned().collect())
                .unwrap_or_default(),
            Err(e) => {
                tracing::warn!("watcher table unavailable: {}", e);
                Vec::new()
            }
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl Notifier for EventBus {
    fn record_created(&self, model: &str, id: &Value, record: &Value, origin: Option<&str>) {
        self.publish(
            BlueprintEvent::Record(RecordEvent::Created {
                model: model.to_string(),
                id: id.clone(),
                data: record.clone(),
            }),
            origin,
        );
    }

    fn record_updated(
        &self,
        model: &str,
        id: &Value,
        record: &Value,
        previous: Option<&Value>,
        origin: Option<&str>,
    ) {
        self.publish(
            BlueprintEvent::Record(RecordEvent::Updated {
                model: model.to_string(),
                id: id.clone(),
                data: record.clone(),
                previous: previous.cloned(),
            }),
            origin,
        );
    }

    fn record_destroyed(&self, model: &str, id: &Value, record: &Value, origin: Option<&str>) {
        self.publish(
            BlueprintEvent::Record(RecordEvent::Destroyed {
                model: model.to_string(),
                id: id.clone(),
                data: record.clone(),
            }),
            origin,
        );
    }

    fn link_added(
        &self,
        model: &str,
        alias: &str,
        parent_id: &Value,
        child_id: &Value,
        origin: Option<&str>,
    ) {
        self.publish(
            BlueprintEvent::Link(LinkEvent::Added {
                model: model.to_string(),
                alias: alias.to_string(),
                parent_id: parent_id.clone(),
                child_id: child_id.clone(),
            }),
            origin,
        );
    }

    fn link_removed(
        &self,
        model: &str,
        alias: &str,
        parent_id: &Value,
        child_id: &Value,
        origin: Option<&str>,
    ) {
        self.publish(
            BlueprintEvent::Link(LinkEvent::Removed {
                model: model.to_string(),
                alias: alias.to_string(),
                parent_id: parent_id.clone(),
                child_id: child_id.clone(),
            }),
            origin,
        );
    }

    fn watch(&self, model: &str, origin: &str) {
        match self.watchers.write() {
            Ok(mut watchers) => {
                let set = watchers.entry(model.to_string()).or_default();
                set.shift_remove(origin);
                set.insert(origin.to_string());
                while set.len() > self.watch_capacity {
                    if let Some(dropped) = set.shift_remove_index(0) {
                        tracing::trace!(model, watcher = %dropped, "watcher evicted");
                    }
                }
            }
            Err(e) => tracing::warn!("watcher table unavailable: {}", e),
        }
    }

    fn unwatch(&self, model: &str, origin: &str) {
        match self.watchers.write() {
            Ok(mut watchers) => {
                if let Some(set) = watchers.get_mut(model) {
                    set.shift_remove(origin);
                    if set.is_empty() {
                        watchers.remove(model);
                    }
                }
            }
            Err(e) => tracing::warn!("watcher table unavailable: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_record_event_serialization() {
        let event = BlueprintEvent::Record(RecordEvent::Created {
            model: "widget".into(),
            id: json!(9),
            data: json!({"name": "bolt"}),
        });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"], "record");
        assert_eq!(json["action"], "created");
        assert_eq!(json["model"], "widget");
    }

    #[tokio::test]
    async fn test_origin_is_excluded_unless_mirrored() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.link_added("widget", "parts", &json!(9), &json!(4), Some("req-1"));
        let envelope = rx.recv().await.unwrap();
        assert!(!envelope.is_for("req-1"));
        assert!(envelope.is_for("req-2"));
        assert_eq!(envelope.event.action(), "added");

        let mirrored = EventBus::new(16).with_mirror(true);
        let mut rx = mirrored.subscribe();
        mirrored.record_destroyed("widget", &json!(9), &json!({}), Some("req-1"));
        assert!(rx.recv().await.unwrap().is_for("req-1"));
    }

    #[tokio::test]
    async fn test_multiple_subscribers_share_the_envelope() {
        let bus = EventBus::new(16);
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        bus.record_updated("widget", &json!(1), &json!({"a": 2}), Some(&json!({"a": 1})), None);

        let e1 = rx1.recv().await.unwrap();
        let e2 = rx2.recv().await.unwrap();
        assert_eq!(e1.id, e2.id);
        assert!(e1.exclude.is_none());
    }

    #[test]
    fn test_publish_without_subscribers() {
        let bus = EventBus::default();
        assert_eq!(
            bus.publish(
                BlueprintEvent::Link(LinkEvent::Removed {
                    model: "widget".into(),
                    alias: "parts".into(),
                    parent_id: json!(1),
                    child_id: json!(2),
                }),
                None
            ),
            0
        );
    }

    #[test]
    fn test_watchers_are_shared_between_clones() {
        let bus = EventBus::default();
        bus.clone().watch("widget", "req-1");
        bus.watch("widget", "req-1");
        bus.watch("widget", "req-2");
        assert_eq!(bus.watchers("widget"), vec!["req-1", "req-2"]);
        assert!(bus.watchers("part").is_empty());
    }

    #[test]
    fn test_watchers_are_capped_least_recent_first() {
        let bus = EventBus::default().with_watch_capacity(3);
        for i in 0..5 {
            bus.watch("widget", &format!("req-{i}"));
        }
        assert_eq!(bus.watchers("widget"), vec!["req-2", "req-3", "req-4"]);

        // watching again refreshes the entry
        bus.watch("widget", "req-2");
        bus.watch("widget", "req-5");
        assert_eq!(bus.watchers("widget"), vec!["req-4", "req-2", "req-5"]);

        bus.unwatch("widget", "req-4");
        assert_eq!(bus.watchers("widget"), vec!["req-2", "req-5"]);
    }

    #[tokio::test]
    async fn test_created_envelopes_name_the_watchers() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();
        bus.watch("widget", "req-1");
        bus.watch("widget", "req-2");

        bus.record_created("widget", &json!(1), &json!({"name": "a"}), Some("req-2"));
        let envelope = rx.recv().await.unwrap();
        assert!(envelope.is_watched_by("req-1"));
        assert!(!envelope.is_watched_by("req-2"));
        assert!(!envelope.is_watched_by("req-3"));

        bus.record_created("part", &json!(1), &json!({}), None);
        assert!(rx.recv().await.unwrap().watchers.is_empty());

        bus.record_destroyed("widget", &json!(1), &json!({}), None);
        assert!(rx.recv().await.unwrap().watchers.is_empty());
    }
}
