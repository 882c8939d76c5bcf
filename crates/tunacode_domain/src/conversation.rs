use chrono::{DateTime, Utc};
use derive_more::Display;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::compaction::CompactionRecord;
use crate::message::Message;
use crate::usage::Metrics;

/// Opaque conversation identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(Uuid);

impl ConversationId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn parse(value: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(value)?))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaData {
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MetaData {
    fn new() -> Self {
        let now = Utc::now();
        Self { created_at: now, updated_at: now }
    }
}

/// The full state a [`crate::message::Message`] history, its running
/// [`Metrics`], and the last-applied [`CompactionRecord`] form together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: ConversationId,
    pub title: Option<String>,
    pub history: Vec<Message>,
    pub metrics: Metrics,
    pub metadata: MetaData,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compaction: Option<CompactionRecord>,
}

impl Conversation {
    pub fn new() -> Self {
        Self {
            id: ConversationId::generate(),
            title: None,
            history: Vec::new(),
            metrics: Metrics::new(),
            metadata: MetaData::new(),
            compaction: None,
        }
    }

    pub fn push(&mut self, message: Message) {
        self.metadata.updated_at = Utc::now();
        self.history.push(message);
    }

    pub fn token_count_approx(&self) -> usize {
        self.history.iter().map(Message::token_count_approx).sum()
    }
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn push_updates_history_and_touches_updated_at() {
        let mut conversation = Conversation::new();
        let created = conversation.metadata.updated_at;
        conversation.push(Message::user("hello"));

        assert_eq!(conversation.history.len(), 1);
        assert!(conversation.metadata.updated_at >= created);
    }

    #[test]
    fn conversation_id_round_trips_through_string() {
        let id = ConversationId::generate();
        let parsed = ConversationId::parse(&id.to_string()).unwrap();
        assert_eq!(id, parsed);
    }
}
