//! Core entity structs: personas, messages, responses, escalations and
//! consultations.

use std::collections::{BTreeMap, VecDeque};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::enums::{
    ConsultationStatus, MessageKind, PersonaState, PersonalityTrait, ResponseKind,
    SimulationEventKind,
};
use crate::ids::{
    ConsultationId, EscalationId, MessageId, PersonaId, ResponseId, SimulationEventId,
};

/// Value used for any trait or relationship that has no explicit value.
pub const NEUTRAL: f64 = 0.5;

// ---------------------------------------------------------------------------
// Persona
// ---------------------------------------------------------------------------

/// Personality vector. Every trait is always present, each in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PersonalityProfile {
    /// Appetite for uncertain outcomes.
    pub risk_tolerance: f64,
    /// Deference to hierarchy and directives.
    pub authority_response: f64,
    /// Directness of communication.
    pub communication_style: f64,
    /// Ease of accepting change.
    pub change_adaptability: f64,
    /// How strongly workload affects behaviour.
    pub workload_sensitivity: f64,
    /// Preference for working with others.
    pub collaboration_preference: f64,
}

impl PersonalityProfile {
    /// A profile with every trait set to `value` (clamped to `[0, 1]`).
    pub fn uniform(value: f64) -> Self {
        let v = value.clamp(0.0, 1.0);
        Self {
            risk_tolerance: v,
            authority_response: v,
            communication_style: v,
            change_adaptability: v,
            workload_sensitivity: v,
            collaboration_preference: v,
        }
    }

    /// Build a complete profile from a partial trait map. Traits missing
    /// from `traits` are set to [`NEUTRAL`]; supplied values are clamped.
    pub fn from_partial(traits: &BTreeMap<PersonalityTrait, f64>) -> Self {
        let mut profile = Self::uniform(NEUTRAL);
        for (&t, &value) in traits {
            profile.set(t, value);
        }
        profile
    }

    /// Read one trait.
    pub const fn get(&self, t: PersonalityTrait) -> f64 {
        match t {
            PersonalityTrait::RiskTolerance => self.risk_tolerance,
            PersonalityTrait::AuthorityResponse => self.authority_response,
            PersonalityTrait::CommunicationStyle => self.communication_style,
            PersonalityTrait::ChangeAdaptability => self.change_adaptability,
            PersonalityTrait::WorkloadSensitivity => self.workload_sensitivity,
            PersonalityTrait::CollaborationPreference => self.collaboration_preference,
        }
    }

    /// Write one trait, clamped to `[0, 1]`.
    pub fn set(&mut self, t: PersonalityTrait, value: f64) {
        let v = value.clamp(0.0, 1.0);
        match t {
            PersonalityTrait::RiskTolerance => self.risk_tolerance = v,
            PersonalityTrait::AuthorityResponse => self.authority_response = v,
            PersonalityTrait::CommunicationStyle => self.communication_style = v,
            PersonalityTrait::ChangeAdaptability => self.change_adaptability = v,
            PersonalityTrait::WorkloadSensitivity => self.workload_sensitivity = v,
            PersonalityTrait::CollaborationPreference => self.collaboration_preference = v,
        }
    }
}

impl Default for PersonalityProfile {
    fn default() -> Self {
        Self::uniform(NEUTRAL)
    }
}

/// Position of a persona inside the organization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfessionalProfile {
    /// Department name (e.g. "Engineering").
    pub department: String,
    /// Role title (e.g. "Engineering Manager").
    pub role: String,
    /// Seniority level, 1 (individual contributor) to 5 (executive).
    pub seniority: u8,
    /// Workload the persona can carry before becoming busy.
    pub workload_capacity: f64,
    /// Workload currently carried.
    pub current_workload: f64,
    /// Manager, if any.
    pub manager: Option<PersonaId>,
    /// Direct reports.
    pub direct_reports: Vec<PersonaId>,
    /// Areas of expertise.
    pub expertise: Vec<String>,
}

impl ProfessionalProfile {
    /// Current workload divided by capacity. Zero capacity reads as fully
    /// loaded.
    pub fn workload_ratio(&self) -> f64 {
        if self.workload_capacity > 0.0 {
            self.current_workload / self.workload_capacity
        } else {
            1.0
        }
    }
}

/// One entry in a persona's interaction history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteractionRecord {
    /// Simulated time of the interaction.
    pub at: DateTime<Utc>,
    /// The other party (the message sender).
    pub counterpart: PersonaId,
    /// Message that prompted the interaction.
    pub message_id: MessageId,
    /// Kind of the message.
    pub message_kind: MessageKind,
    /// How the persona responded.
    pub response_kind: ResponseKind,
}

/// Mutable memory of a persona.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonaMemory {
    /// Stress level in `[0, 1]`.
    pub stress_level: f64,
    /// Relationship strength with other personas, each in `[0, 1]`.
    pub relationships: BTreeMap<PersonaId, f64>,
    /// Most recent interactions, oldest first.
    pub interactions: VecDeque<InteractionRecord>,
    /// Simulated time of the last change.
    pub last_updated: DateTime<Utc>,
}

impl PersonaMemory {
    /// Fresh memory with the given stress level and no history.
    pub fn new(stress_level: f64, now: DateTime<Utc>) -> Self {
        Self {
            stress_level: stress_level.clamp(0.0, 1.0),
            relationships: BTreeMap::new(),
            interactions: VecDeque::new(),
            last_updated: now,
        }
    }

    /// Relationship strength with `other`, [`NEUTRAL`] when unknown.
    pub fn relationship_with(&self, other: &PersonaId) -> f64 {
        self.relationships.get(other).copied().unwrap_or(NEUTRAL)
    }

    /// Append an interaction, dropping the oldest entries beyond `limit`.
    pub fn record_interaction(&mut self, record: InteractionRecord, limit: usize) {
        self.interactions.push_back(record);
        while self.interactions.len() > limit {
            self.interactions.pop_front();
        }
    }
}

/// A synthetic organizational member.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Persona {
    /// Caller-supplied identifier.
    pub id: PersonaId,
    /// Display name.
    pub name: String,
    /// Optional contact address.
    pub email: Option<String>,
    /// Personality vector.
    pub personality: PersonalityProfile,
    /// Organizational position and workload.
    pub profile: ProfessionalProfile,
    /// Stress, relationships and history.
    pub memory: PersonaMemory,
    /// Availability state.
    pub state: PersonaState,
}

// ---------------------------------------------------------------------------
// Messages and responses
// ---------------------------------------------------------------------------

/// A persona's reaction to a message. Immutable once recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// Unique identifier.
    pub id: ResponseId,
    /// Message being answered.
    pub message_id: MessageId,
    /// Responding persona.
    pub persona_id: PersonaId,
    /// Response kind.
    pub kind: ResponseKind,
    /// Free-text content.
    pub content: String,
    /// Sentiment in `[-1, 1]`.
    pub sentiment: f64,
    /// Confidence in `[0, 1]`.
    pub confidence: f64,
    /// Whether the persona actually committed to action.
    pub action_taken: bool,
    /// Estimated completion time for committed work.
    pub estimated_completion: Option<DateTime<Utc>>,
    /// Simulated time the response was made.
    pub created_at: DateTime<Utc>,
}

/// A strategic communication and the responses it has collected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Unique identifier.
    pub id: MessageId,
    /// Message kind.
    pub kind: MessageKind,
    /// Sending persona.
    pub sender: PersonaId,
    /// Recipients, in the order they were addressed.
    pub recipients: Vec<PersonaId>,
    /// Subject line.
    pub subject: String,
    /// Body text.
    pub content: String,
    /// Priority, 1 (lowest) to 5 (highest).
    pub priority: u8,
    /// Simulated creation time.
    pub created_at: DateTime<Utc>,
    /// Optional simulated deadline.
    pub deadline: Option<DateTime<Utc>>,
    /// Number of nudge rounds processed so far.
    pub nudge_count: u32,
    /// Nudge rounds tolerated before escalation.
    pub escalation_threshold: u32,
    /// The message this one escalated from, if any.
    pub escalated_from: Option<MessageId>,
    /// Responses collected, in arrival order.
    pub responses: Vec<Response>,
}

impl Message {
    /// Whether `persona` is among the recipients.
    pub fn is_addressed_to(&self, persona: &PersonaId) -> bool {
        self.recipients.contains(persona)
    }

    /// The most recent response from `persona`, if any.
    pub fn latest_response_from(&self, persona: &PersonaId) -> Option<&Response> {
        self.responses.iter().rev().find(|r| &r.persona_id == persona)
    }
}

// ---------------------------------------------------------------------------
// Escalation
// ---------------------------------------------------------------------------

/// Audit entry written every time a message escalates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscalationRecord {
    /// Unique identifier.
    pub id: EscalationId,
    /// Simulated time of the escalation.
    pub at: DateTime<Utc>,
    /// The message that escalated.
    pub original_message_id: MessageId,
    /// The order created in its place.
    pub escalated_message_id: MessageId,
    /// Sender of both messages.
    pub sender: PersonaId,
    /// Recipients that had not responded.
    pub non_responsive: Vec<PersonaId>,
    /// Nudge count when the escalation happened.
    pub nudge_count: u32,
    /// Threshold that was crossed.
    pub threshold: u32,
    /// Kind of the original message.
    pub original_kind: MessageKind,
    /// Kind of the escalated message.
    pub escalated_kind: MessageKind,
    /// Priority gained by escalating.
    pub priority_increase: u8,
}

// ---------------------------------------------------------------------------
// Consultations and feedback
// ---------------------------------------------------------------------------

/// Feedback left by one participant of a consultation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsultationFeedback {
    /// Participant.
    pub persona_id: PersonaId,
    /// Participant's department.
    pub department: String,
    /// Participant's role.
    pub role: String,
    /// Free-text feedback.
    pub content: String,
    /// Sentiment in `[-1, 1]`.
    pub sentiment: f64,
    /// Confidence in `[0, 1]`.
    pub confidence: f64,
    /// Concerns raised.
    pub concerns: Vec<String>,
    /// Suggestions made.
    pub suggestions: Vec<String>,
    /// Simulated submission time.
    pub submitted_at: DateTime<Utc>,
}

/// A request for input on a proposed change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Consultation {
    /// Unique identifier.
    pub id: ConsultationId,
    /// Persona asking for input.
    pub requester: PersonaId,
    /// Short title.
    pub title: String,
    /// Longer description.
    pub description: String,
    /// The change being proposed.
    pub proposed_change: String,
    /// Invited participants.
    pub invited: Vec<PersonaId>,
    /// Optional simulated deadline.
    pub deadline: Option<DateTime<Utc>>,
    /// Simulated creation time.
    pub created_at: DateTime<Utc>,
    /// Lifecycle state.
    pub status: ConsultationStatus,
    /// Collected feedback.
    pub feedback: Vec<ConsultationFeedback>,
}

/// One piece of feedback fed into the wisdom analyzer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatchballFeedback {
    /// Author of the feedback.
    pub persona_id: PersonaId,
    /// Author's department.
    pub department: String,
    /// Author's role.
    pub role: String,
    /// Free-text feedback.
    pub content: String,
    /// How the author responded.
    pub response_kind: ResponseKind,
    /// Hours between the request and the feedback.
    pub response_delay_hours: f64,
    /// Confidence in `[0, 1]`.
    pub confidence: f64,
    /// Sentiment in `[-1, 1]`.
    pub sentiment: f64,
    /// Commitment level in `[0, 1]`.
    pub commitment: f64,
    /// Priorities the author explicitly named.
    pub priorities_mentioned: Vec<String>,
}

// ---------------------------------------------------------------------------
// Event log
// ---------------------------------------------------------------------------

/// Entry in the orchestrator's bounded event log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationEvent {
    /// Unique identifier.
    pub id: SimulationEventId,
    /// What happened.
    pub kind: SimulationEventKind,
    /// Simulated time.
    pub at: DateTime<Utc>,
    /// Related message, if any.
    pub message_id: Option<MessageId>,
    /// Related persona, if any.
    pub persona_id: Option<PersonaId>,
    /// Human-readable detail.
    pub detail: String,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn partial_traits_are_completed_with_neutral() {
        let mut traits = BTreeMap::new();
        traits.insert(PersonalityTrait::AuthorityResponse, 0.9);
        traits.insert(PersonalityTrait::RiskTolerance, 1.7);
        let profile = PersonalityProfile::from_partial(&traits);
        assert!((profile.authority_response - 0.9).abs() < f64::EPSILON);
        assert!((profile.risk_tolerance - 1.0).abs() < f64::EPSILON);
        for t in [
            PersonalityTrait::CommunicationStyle,
            PersonalityTrait::ChangeAdaptability,
            PersonalityTrait::WorkloadSensitivity,
            PersonalityTrait::CollaborationPreference,
        ] {
            assert!((profile.get(t) - NEUTRAL).abs() < f64::EPSILON);
        }
    }

    #[test]
    fn interaction_history_is_bounded() {
        let now = Utc::now();
        let mut memory = PersonaMemory::new(0.2, now);
        for _ in 0..5 {
            memory.record_interaction(
                InteractionRecord {
                    at: now,
                    counterpart: PersonaId::from("ceo"),
                    message_id: MessageId::new(),
                    message_kind: MessageKind::Nudge,
                    response_kind: ResponseKind::Ignore,
                },
                3,
            );
        }
        assert_eq!(memory.interactions.len(), 3);
    }

    #[test]
    fn unknown_relationship_is_neutral() {
        let memory = PersonaMemory::new(0.0, Utc::now());
        assert!((memory.relationship_with(&PersonaId::from("x")) - NEUTRAL).abs() < f64::EPSILON);
    }

    #[test]
    fn zero_capacity_reads_as_fully_loaded() {
        let profile = ProfessionalProfile {
            department: String::from("Ops"),
            role: String::from("Analyst"),
            seniority: 1,
            workload_capacity: 0.0,
            current_workload: 0.4,
            manager: None,
            direct_reports: Vec::new(),
            expertise: Vec::new(),
        };
        assert!((profile.workload_ratio() - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn message_round_trips_through_json() {
        let msg = Message {
            id: MessageId::new(),
            kind: MessageKind::WisdomRequest,
            sender: PersonaId::from("ceo"),
            recipients: vec![PersonaId::from("vp")],
            subject: String::from("Q3 plan"),
            content: String::from("Thoughts?"),
            priority: 3,
            created_at: Utc::now(),
            deadline: None,
            nudge_count: 0,
            escalation_threshold: 5,
            escalated_from: None,
            responses: Vec::new(),
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"wisdom_request\""));
        let back: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(back, msg);
    }
}
