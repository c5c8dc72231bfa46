//! Socket contracts and message framing.
//!
//! A socket contract is two independent sets of named events: those the
//! server emits (and the client validates) and those the client emits
//! (and the server validates). Messages travel as WebSocket text frames:
//!
//! ```text
//! {"event": "sendMessage", "data": {"content": "hi"}}
//! ```
//!
//! Receivers check every inbound message with [`EventSet::check`]. Unknown
//! names and payloads failing their schema are dropped by the receiver;
//! the peer is never told.

use std::collections::HashSet;
use std::sync::Arc;

use contractkit_core::{IntoSchema, SchemaError, SchemaRef};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::MAX_MESSAGE_SIZE;
use crate::error::{ProtocolError, ProtocolResult};

/// One named event with its payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SocketMessage {
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

impl SocketMessage {
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }

    /// Encodes the message as the text of one frame.
    ///
    /// # Example
    ///
    /// ```rust
    /// use contractkit_protocol::SocketMessage;
    /// use serde_json::json;
    ///
    /// let text = SocketMessage::new("ping", json!(1)).encode().unwrap();
    /// assert_eq!(text, r#"{"event":"ping","data":1}"#);
    /// ```
    pub fn encode(&self) -> ProtocolResult<String> {
        let text = serde_json::to_string(self)?;
        if text.len() > MAX_MESSAGE_SIZE {
            return Err(ProtocolError::MessageTooLarge {
                size: text.len(),
                max: MAX_MESSAGE_SIZE,
            });
        }
        Ok(text)
    }

    /// Decodes the text of one frame.
    pub fn decode(text: &str) -> ProtocolResult<Self> {
        if text.trim().is_empty() {
            return Err(ProtocolError::EmptyMessage);
        }
        if text.len() > MAX_MESSAGE_SIZE {
            return Err(ProtocolError::MessageTooLarge {
                size: text.len(),
                max: MAX_MESSAGE_SIZE,
            });
        }
        Ok(serde_json::from_str(text)?)
    }
}

/// Result of checking an inbound message against an [`EventSet`].
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// Known event; carries the parsed payload.
    Accepted(Value),
    /// No event of that name in the set.
    Unknown,
    /// Payload failed the event schema.
    Rejected(SchemaError),
}

/// Named payload schemas for one direction of a socket.
#[derive(Debug, Clone, Default)]
pub struct EventSet {
    events: Arc<Vec<(String, SchemaRef)>>,
}

impl EventSet {
    /// Returns the schema of `event`.
    pub fn get(&self, event: &str) -> Option<&SchemaRef> {
        self.events
            .iter()
            .find(|(name, _)| name == event)
            .map(|(_, schema)| schema)
    }

    pub fn contains(&self, event: &str) -> bool {
        self.get(event).is_some()
    }

    /// Event names in declaration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.events.iter().map(|(name, _)| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SchemaRef)> {
        self.events.iter().map(|(name, schema)| (name.as_str(), schema))
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Looks the message up and validates its payload.
    pub fn check(&self, message: &SocketMessage) -> Inbound {
        match self.get(&message.event) {
            None => Inbound::Unknown,
            Some(schema) => match schema.parse(&message.data) {
                Ok(data) => Inbound::Accepted(data),
                Err(error) => Inbound::Rejected(error),
            },
        }
    }
}

/// Both directions of a socket contract.
#[derive(Debug, Clone, Default)]
pub struct SocketDefinition {
    server_events: EventSet,
    client_events: EventSet,
}

impl SocketDefinition {
    pub fn builder() -> SocketDefinitionBuilder {
        SocketDefinitionBuilder::default()
    }

    /// Events the server emits and the client validates.
    pub fn server_events(&self) -> &EventSet {
        &self.server_events
    }

    /// Events the client emits and the server validates.
    pub fn client_events(&self) -> &EventSet {
        &self.client_events
    }
}

/// Builder for [`SocketDefinition`].
#[derive(Debug, Default)]
pub struct SocketDefinitionBuilder {
    server_events: Vec<(String, SchemaRef)>,
    client_events: Vec<(String, SchemaRef)>,
}

impl SocketDefinitionBuilder {
    /// Declares an event emitted by the server.
    pub fn server_event(mut self, name: impl Into<String>, schema: impl IntoSchema) -> Self {
        self.server_events.push((name.into(), schema.into_schema()));
        self
    }

    /// Declares an event emitted by the client.
    pub fn client_event(mut self, name: impl Into<String>, schema: impl IntoSchema) -> Self {
        self.client_events.push((name.into(), schema.into_schema()));
        self
    }

    /// Checks name uniqueness within each direction.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::DuplicateEvent`] if a name repeats within
    /// one direction. The same name in both directions is allowed.
    pub fn build(self) -> ProtocolResult<SocketDefinition> {
        Ok(SocketDefinition {
            server_events: unique(self.server_events)?,
            client_events: unique(self.client_events)?,
        })
    }
}

fn unique(events: Vec<(String, SchemaRef)>) -> ProtocolResult<EventSet> {
    let mut seen = HashSet::new();
    for (name, _) in &events {
        if !seen.insert(name.as_str()) {
            return Err(ProtocolError::DuplicateEvent(name.clone()));
        }
    }
    Ok(EventSet {
        events: Arc::new(events),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use contractkit_core::schema;
    use serde_json::json;

    fn chat() -> SocketDefinition {
        SocketDefinition::builder()
            .server_event(
                "message",
                schema::object()
                    .field("content", schema::string())
                    .field("timestamp", schema::number()),
            )
            .client_event("sendMessage", schema::object().field("content", schema::string()))
            .build()
            .unwrap()
    }

    #[test]
    fn directions_are_independent() {
        let definition = chat();
        assert!(definition.server_events().contains("message"));
        assert!(!definition.server_events().contains("sendMessage"));
        assert!(definition.client_events().contains("sendMessage"));
        assert_eq!(definition.client_events().len(), 1);

        let both = SocketDefinition::builder()
            .server_event("sync", schema::any())
            .client_event("sync", schema::any())
            .build();
        assert!(both.is_ok());
    }

    #[test]
    fn duplicate_events_are_rejected() {
        let err = SocketDefinition::builder()
            .client_event("ping", schema::any())
            .client_event("ping", schema::any())
            .build()
            .unwrap_err();
        assert!(matches!(err, ProtocolError::DuplicateEvent(name) if name == "ping"));
    }

    #[test]
    fn check_sorts_inbound_messages() {
        let events = chat().client_events().clone();

        let accepted = events.check(&SocketMessage::new("sendMessage", json!({ "content": "hi" })));
        assert_eq!(accepted, Inbound::Accepted(json!({ "content": "hi" })));

        let unknown = events.check(&SocketMessage::new("shout", json!({ "content": "hi" })));
        assert_eq!(unknown, Inbound::Unknown);

        let rejected = events.check(&SocketMessage::new("sendMessage", json!({ "content": 1 })));
        assert!(matches!(rejected, Inbound::Rejected(_)));
    }

    #[test]
    fn decode_frames() {
        let message = SocketMessage::decode(r#"{"event":"sendMessage","data":{"content":"hi"}}"#)
            .unwrap();
        assert_eq!(message.event, "sendMessage");
        assert_eq!(message.data, json!({ "content": "hi" }));

        let bare = SocketMessage::decode(r#"{"event":"ping"}"#).unwrap();
        assert_eq!(bare.data, Value::Null);

        assert!(matches!(SocketMessage::decode("  "), Err(ProtocolError::EmptyMessage)));
        assert!(matches!(
            SocketMessage::decode("not json"),
            Err(ProtocolError::Serialization(_))
        ));
    }

    #[test]
    fn oversized_messages_are_rejected() {
        let big = "x".repeat(MAX_MESSAGE_SIZE);
        let err = SocketMessage::new("blob", json!(big)).encode().unwrap_err();
        assert!(matches!(err, ProtocolError::MessageTooLarge { max, .. } if max == MAX_MESSAGE_SIZE));

        let text = format!(r#"{{"event":"blob","data":"{}"}}"#, big);
        assert!(matches!(
            SocketMessage::decode(&text),
            Err(ProtocolError::MessageTooLarge { .. })
        ));
    }
}
