use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::error::CoreError;

/// Subscription lifecycle transitions understood by the worker.
///
/// The ordinal of each variant is part of the wire contract: producers may
/// send the event as its name or as its position in this list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SubscriptionEvent {
    Create,
    Update,
    Suspend,
    Delete,
    Reinstate,
}

impl SubscriptionEvent {
    /// Every recognised event, in ordinal order.
    pub const ALL: [Self; 5] = [
        Self::Create,
        Self::Update,
        Self::Suspend,
        Self::Delete,
        Self::Reinstate,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "Create",
            Self::Update => "Update",
            Self::Suspend => "Suspend",
            Self::Delete => "Delete",
            Self::Reinstate => "Reinstate",
        }
    }

    /// Position of the event in the wire enumeration.
    #[must_use]
    pub fn ordinal(self) -> u8 {
        match self {
            Self::Create => 0,
            Self::Update => 1,
            Self::Suspend => 2,
            Self::Delete => 3,
            Self::Reinstate => 4,
        }
    }

    /// Resolve a wire ordinal, returning `None` for anything out of range.
    #[must_use]
    pub fn from_ordinal(ordinal: i64) -> Option<Self> {
        usize::try_from(ordinal)
            .ok()
            .and_then(|i| Self::ALL.get(i).copied())
    }
}

impl fmt::Display for SubscriptionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubscriptionEvent {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if let Ok(ordinal) = trimmed.parse::<i64>() {
            return Self::from_ordinal(ordinal)
                .ok_or_else(|| CoreError::UnknownEvent(trimmed.to_owned()));
        }
        Self::ALL
            .into_iter()
            .find(|event| event.as_str().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| CoreError::UnknownEvent(trimmed.to_owned()))
    }
}

/// The event carried by an inbound action.
///
/// Unrecognised values are kept verbatim instead of failing deserialization,
/// so the worker can answer them with a failed result rather than treating
/// the whole message as malformed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    Known(SubscriptionEvent),
    Unsupported(Value),
}

impl EventKind {
    /// Classify a raw JSON event value.
    #[must_use]
    pub fn from_value(raw: Value) -> Self {
        let known = match &raw {
            Value::Number(n) => n.as_i64().and_then(SubscriptionEvent::from_ordinal),
            Value::String(s) => s.parse().ok(),
            _ => None,
        };
        known.map_or(Self::Unsupported(raw), Self::Known)
    }

    /// The recognised event, if any.
    #[must_use]
    pub fn known(&self) -> Option<SubscriptionEvent> {
        match self {
            Self::Known(event) => Some(*event),
            Self::Unsupported(_) => None,
        }
    }

    #[must_use]
    pub fn is_supported(&self) -> bool {
        matches!(self, Self::Known(_))
    }
}

impl From<SubscriptionEvent> for EventKind {
    fn from(event: SubscriptionEvent) -> Self {
        Self::Known(event)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Known(event) => f.write_str(event.as_str()),
            Self::Unsupported(Value::String(raw)) => f.write_str(raw),
            Self::Unsupported(raw) => write!(f, "{raw}"),
        }
    }
}

impl Serialize for EventKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Known(event) => serializer.serialize_str(event.as_str()),
            Self::Unsupported(raw) => raw.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for EventKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Value::deserialize(deserializer).map(Self::from_value)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn ordinals_match_wire_enumeration() {
        for (i, event) in SubscriptionEvent::ALL.into_iter().enumerate() {
            assert_eq!(usize::from(event.ordinal()), i);
            assert_eq!(SubscriptionEvent::from_ordinal(i as i64), Some(event));
        }
        assert_eq!(SubscriptionEvent::from_ordinal(5), None);
        assert_eq!(SubscriptionEvent::from_ordinal(-1), None);
    }

    #[test]
    fn parses_names_case_insensitively() {
        assert_eq!(
            "reinstate".parse::<SubscriptionEvent>().unwrap(),
            SubscriptionEvent::Reinstate
        );
        assert_eq!(
            " SUSPEND ".parse::<SubscriptionEvent>().unwrap(),
            SubscriptionEvent::Suspend
        );
        assert_eq!(
            "3".parse::<SubscriptionEvent>().unwrap(),
            SubscriptionEvent::Delete
        );
        let err = "Pause".parse::<SubscriptionEvent>().unwrap_err();
        assert_eq!(err.to_string(), "unknown subscription event: Pause");
    }

    #[test]
    fn event_kind_accepts_numbers_and_names() {
        let kind: EventKind = serde_json::from_value(json!(1)).unwrap();
        assert_eq!(kind, EventKind::Known(SubscriptionEvent::Update));

        let kind: EventKind = serde_json::from_value(json!("Create")).unwrap();
        assert_eq!(kind.known(), Some(SubscriptionEvent::Create));
    }

    #[test]
    fn event_kind_keeps_unsupported_values() {
        let kind: EventKind = serde_json::from_value(json!(999)).unwrap();
        assert!(!kind.is_supported());
        assert_eq!(kind.to_string(), "999");

        let kind: EventKind = serde_json::from_value(json!("Pause")).unwrap();
        assert_eq!(kind, EventKind::Unsupported(json!("Pause")));
        assert_eq!(kind.to_string(), "Pause");
        assert_eq!(serde_json::to_value(&kind).unwrap(), json!("Pause"));
    }

    #[test]
    fn known_event_serializes_as_name() {
        let kind = EventKind::from(SubscriptionEvent::Suspend);
        assert_eq!(serde_json::to_value(&kind).unwrap(), json!("Suspend"));
    }
}
