/// Domain events for capture zones
///
/// Events are rendered by the messaging provider:
/// - Each event carries a message key (`capture.captured`, `koth.started`, ...)
/// - Params are the event's serialized fields, stringified
/// - Delivery outcome is ignored by the runtime

use crate::contract::PlayerId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Domain event types for zones and KOTH sessions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum ZoneEvent {
    /// Zone ownership changed
    Captured(CapturedEvent),
    /// Contest halted without ownership change
    Stopped(StoppedEvent),
    /// KOTH session started or zones joined it
    KothStarted(KothStartedEvent),
    /// Zones left the KOTH session
    KothStopped(KothStoppedEvent),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapturedEvent {
    pub zone_id: String,
    pub owner: String,
    pub reward: f64,
    /// Whether an admin forced the capture
    pub forced: bool,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoppedEvent {
    pub zone_id: String,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KothStartedEvent {
    pub zones: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KothStoppedEvent {
    pub zones: Vec<String>,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
}

/// Who receives an announcement
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Audience {
    Broadcast,
    World(String),
    Player(PlayerId),
}

/// Messaging provider boundary
///
/// Implementations render `key` with `params` in the player's locale and
/// deliver it. The runtime never depends on the outcome.
#[async_trait::async_trait]
pub trait Announcer: Send + Sync {
    async fn announce(
        &self,
        audience: Audience,
        key: &str,
        params: &BTreeMap<String, String>,
    ) -> anyhow::Result<()>;

    /// Re-read message templates
    async fn reload_messages(&self) -> anyhow::Result<()>;
}

/// No-op announcer for testing or when messaging is disabled
pub struct NoOpAnnouncer;

#[async_trait::async_trait]
impl Announcer for NoOpAnnouncer {
    async fn announce(
        &self,
        _audience: Audience,
        _key: &str,
        _params: &BTreeMap<String, String>,
    ) -> anyhow::Result<()> {
        Ok(())
    }

    async fn reload_messages(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

impl ZoneEvent {
    pub fn captured(zone_id: &str, owner: &PlayerId, reward: f64, forced: bool) -> Self {
        ZoneEvent::Captured(CapturedEvent {
            zone_id: zone_id.to_string(),
            owner: owner.to_string(),
            reward,
            forced,
            timestamp: Utc::now(),
        })
    }

    pub fn stopped(zone_id: &str, reason: &str) -> Self {
        ZoneEvent::Stopped(StoppedEvent {
            zone_id: zone_id.to_string(),
            reason: reason.to_string(),
            timestamp: Utc::now(),
        })
    }

    pub fn koth_started(zones: Vec<String>) -> Self {
        ZoneEvent::KothStarted(KothStartedEvent {
            zones,
            timestamp: Utc::now(),
        })
    }

    pub fn koth_stopped(zones: Vec<String>, reason: &str) -> Self {
        ZoneEvent::KothStopped(KothStoppedEvent {
            zones,
            reason: reason.to_string(),
            timestamp: Utc::now(),
        })
    }

    /// Message template key for the messaging provider
    pub fn message_key(&self) -> &'static str {
        match self {
            ZoneEvent::Captured(_) => "capture.captured",
            ZoneEvent::Stopped(_) => "capture.stopped",
            ZoneEvent::KothStarted(_) => "koth.started",
            ZoneEvent::KothStopped(_) => "koth.stopped",
        }
    }

    /// Event fields as template params; lists are comma-joined
    pub fn params(&self) -> BTreeMap<String, String> {
        let mut params = BTreeMap::new();
        let Ok(serde_json::Value::Object(fields)) = serde_json::to_value(self) else {
            return params;
        };
        for (key, value) in fields {
            let rendered = match value {
                serde_json::Value::String(s) => s,
                serde_json::Value::Array(items) => items
                    .iter()
                    .map(|item| match item {
                        serde_json::Value::String(s) => s.clone(),
                        other => other.to_string(),
                    })
                    .collect::<Vec<_>>()
                    .join(", "),
                other => other.to_string(),
            };
            params.insert(key, rendered);
        }
        params
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_captured_event_params() {
        let event = ZoneEvent::captured("A1", &PlayerId::from("Steve"), 50.0, true);

        let params = event.params();
        assert_eq!(event.message_key(), "capture.captured");
        assert_eq!(params.get("zone_id").map(String::as_str), Some("A1"));
        assert_eq!(params.get("owner").map(String::as_str), Some("Steve"));
        assert_eq!(params.get("reward").map(String::as_str), Some("50.0"));
        assert_eq!(params.get("event_type").map(String::as_str), Some("captured"));
    }

    #[test]
    fn test_koth_event_joins_zone_list() {
        let event = ZoneEvent::koth_started(vec!["z1".to_string(), "z2".to_string()]);

        assert_eq!(event.params().get("zones").map(String::as_str), Some("z1, z2"));
    }

    #[tokio::test]
    async fn test_noop_announcer() {
        let announcer = NoOpAnnouncer;
        let event = ZoneEvent::stopped("A1", "admin");

        let result = announcer
            .announce(Audience::Broadcast, event.message_key(), &event.params())
            .await;
        assert!(result.is_ok());
        assert!(announcer.reload_messages().await.is_ok());
    }
}
