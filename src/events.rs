// 📜 Audit Trail - "Every change is an event"
//
// The registry appends one event per committed mutation. Failed operations
// leave no trace here.

use crate::access::Principal;
use crate::entities::EntityKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Event {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub entity_type: String,
    pub entity_id: String,
    pub data: serde_json::Value,
    pub actor: String,
}

impl Event {
    pub fn new(
        event_type: &str,
        entity_type: &str,
        entity_id: &str,
        data: serde_json::Value,
        actor: &str,
    ) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event_type: event_type.to_string(),
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            data,
            actor: actor.to_string(),
        }
    }

    /// Event about a registry entity, attributed to the calling principal
    pub fn record(
        event_type: &str,
        kind: EntityKind,
        entity_id: impl ToString,
        data: serde_json::Value,
        actor: &Principal,
    ) -> Self {
        Self::new(
            event_type,
            kind.tag(),
            &entity_id.to_string(),
            data,
            actor.as_str(),
        )
    }
}
