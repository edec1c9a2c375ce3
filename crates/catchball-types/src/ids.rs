//! Type-safe identifier wrappers.
//!
//! Runtime entities created by the simulator (messages, responses,
//! escalations, scheduled events) use UUID v7 newtypes so identifiers are
//! time-ordered and cannot be mixed up at compile time. Personas are the
//! exception: their identifiers come from the population records supplied
//! by the caller, so [`PersonaId`] wraps the caller's string key.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Generates a newtype wrapper around [`Uuid`] with standard derives.
macro_rules! define_id {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Create a new identifier using UUID v7 (time-ordered).
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            /// Return the inner [`Uuid`] value.
            pub const fn into_inner(self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }

        impl From<$name> for Uuid {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

define_id! {
    /// Unique identifier for a strategic message.
    MessageId
}

define_id! {
    /// Unique identifier for a persona's response to a message.
    ResponseId
}

define_id! {
    /// Unique identifier for a consultation (catchball round).
    ConsultationId
}

define_id! {
    /// Unique identifier for an escalation audit record.
    EscalationId
}

define_id! {
    /// Unique identifier for an event held by the scheduler.
    ScheduledEventId
}

define_id! {
    /// Unique identifier for an entry in the simulation event log.
    SimulationEventId
}

/// Identifier of a persona, as supplied by the population records.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PersonaId(String);

impl PersonaId {
    /// Wrap a caller-supplied persona key.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the underlying key.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the key is empty or whitespace only.
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl core::fmt::Display for PersonaId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PersonaId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

impl From<String> for PersonaId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn message_ids_are_time_ordered() {
        let first = MessageId::new();
        let second = MessageId::new();
        assert!(first < second);
    }

    #[test]
    fn persona_id_serializes_as_plain_string() {
        let id = PersonaId::from("ceo-001");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"ceo-001\"");
        let back: PersonaId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn blank_persona_id_is_detected() {
        assert!(PersonaId::new("  ").is_blank());
        assert!(!PersonaId::new("eng-7").is_blank());
    }
}
