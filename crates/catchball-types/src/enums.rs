//! Enumeration types for the Catchball simulator.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

/// Kind of a strategic communication.
///
/// `Nudge`, `Recommendation` and `Order` form the escalation ladder, in
/// that order of pressure. `Catchball` and `WisdomRequest` are side
/// channels used to gather feedback and never escalate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// Low-pressure voluntary prompt.
    Nudge,
    /// Mid-pressure strategic suggestion.
    Recommendation,
    /// Mandatory directive.
    Order,
    /// Two-way consensus-building round.
    Catchball,
    /// Request for collective feedback.
    WisdomRequest,
}

impl MessageKind {
    /// All message kinds, in declaration order.
    pub const ALL: [Self; 5] = [
        Self::Nudge,
        Self::Recommendation,
        Self::Order,
        Self::Catchball,
        Self::WisdomRequest,
    ];

    /// Position on the escalation ladder, or `None` for side channels.
    pub const fn ladder_rank(self) -> Option<u8> {
        match self {
            Self::Nudge => Some(0),
            Self::Recommendation => Some(1),
            Self::Order => Some(2),
            Self::Catchball | Self::WisdomRequest => None,
        }
    }

    /// Whether messages of this kind can escalate into an order.
    pub const fn is_escalatable(self) -> bool {
        matches!(self, Self::Nudge | Self::Recommendation)
    }

    /// Whether responses to this kind are collected as catchball feedback.
    pub const fn gathers_feedback(self) -> bool {
        matches!(self, Self::Catchball | Self::WisdomRequest)
    }

    /// Stable `snake_case` name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Nudge => "nudge",
            Self::Recommendation => "recommendation",
            Self::Order => "order",
            Self::Catchball => "catchball",
            Self::WisdomRequest => "wisdom_request",
        }
    }
}

impl core::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a persona responded to a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseKind {
    /// No reaction.
    Ignore,
    /// Commits to doing the requested work.
    TakeAction,
    /// Asks questions before committing.
    SeekClarification,
    /// Offers an opinion on the proposal.
    ProvideFeedback,
    /// Pushes the matter up the hierarchy.
    Escalate,
    /// Hands the work to a direct report.
    Delegate,
}

impl ResponseKind {
    /// All response kinds, in declaration (and sampling) order.
    pub const ALL: [Self; 6] = [
        Self::Ignore,
        Self::TakeAction,
        Self::SeekClarification,
        Self::ProvideFeedback,
        Self::Escalate,
        Self::Delegate,
    ];

    /// Kinds that imply the responder committed to doing work.
    pub const fn implies_commitment(self) -> bool {
        matches!(self, Self::TakeAction | Self::Delegate)
    }

    /// Stable `snake_case` name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ignore => "ignore",
            Self::TakeAction => "take_action",
            Self::SeekClarification => "seek_clarification",
            Self::ProvideFeedback => "provide_feedback",
            Self::Escalate => "escalate",
            Self::Delegate => "delegate",
        }
    }
}

impl core::fmt::Display for ResponseKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Personas
// ---------------------------------------------------------------------------

/// Availability state of a persona.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersonaState {
    /// Free to respond.
    #[default]
    Available,
    /// Loaded but coping.
    Busy,
    /// Workload beyond capacity.
    Overwhelmed,
    /// Absent; never responds. Only changed externally.
    OnLeave,
    /// Temporarily occupied; treated like [`PersonaState::Busy`].
    InMeeting,
}

/// A named personality trait. Every persona carries all of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersonalityTrait {
    /// Appetite for uncertain outcomes.
    RiskTolerance,
    /// Deference to hierarchy and directives.
    AuthorityResponse,
    /// Directness of communication.
    CommunicationStyle,
    /// Ease of accepting change.
    ChangeAdaptability,
    /// How strongly workload affects behaviour.
    WorkloadSensitivity,
    /// Preference for working with others.
    CollaborationPreference,
}

impl PersonalityTrait {
    /// All traits, in declaration order.
    pub const ALL: [Self; 6] = [
        Self::RiskTolerance,
        Self::AuthorityResponse,
        Self::CommunicationStyle,
        Self::ChangeAdaptability,
        Self::WorkloadSensitivity,
        Self::CollaborationPreference,
    ];

    /// Stable `snake_case` name, as used in population records.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RiskTolerance => "risk_tolerance",
            Self::AuthorityResponse => "authority_response",
            Self::CommunicationStyle => "communication_style",
            Self::ChangeAdaptability => "change_adaptability",
            Self::WorkloadSensitivity => "workload_sensitivity",
            Self::CollaborationPreference => "collaboration_preference",
        }
    }

    /// Look a trait up by its `snake_case` name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == name)
    }
}

// ---------------------------------------------------------------------------
// Analysis
// ---------------------------------------------------------------------------

/// Hesitation pattern detected in feedback text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HesitationPattern {
    /// Deferring the answer.
    Delayed,
    /// Unsure about the request.
    Uncertain,
    /// Torn between competing demands.
    Conflicted,
    /// No room to take more on.
    Overwhelmed,
    /// Disagrees with the direction.
    Resistant,
}

impl HesitationPattern {
    /// All patterns, in declaration order.
    pub const ALL: [Self; 5] = [
        Self::Delayed,
        Self::Uncertain,
        Self::Conflicted,
        Self::Overwhelmed,
        Self::Resistant,
    ];
}

/// Confidence bucket of a piece of feedback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceBand {
    /// Confidence below 0.3.
    Low,
    /// Confidence in [0.3, 0.7).
    Medium,
    /// Confidence of 0.7 or more.
    High,
}

impl ConfidenceBand {
    /// Bucket a confidence value.
    pub fn from_confidence(confidence: f64) -> Self {
        if confidence < 0.3 {
            Self::Low
        } else if confidence < 0.7 {
            Self::Medium
        } else {
            Self::High
        }
    }
}

/// Category of a priority term found in feedback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriorityCategory {
    /// Budget, headcount, capacity.
    Resource,
    /// Deadlines and schedules.
    Timeline,
    /// Strategy and method.
    Approach,
    /// Culture and principles.
    Values,
}

/// Bucketed likelihood that a message will escalate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    /// Score below 0.2.
    Minimal,
    /// Score in [0.2, 0.4).
    Low,
    /// Score in [0.4, 0.7).
    Medium,
    /// Score of 0.7 or more.
    High,
}

impl RiskLevel {
    /// Bucket a risk score.
    pub fn from_score(score: f64) -> Self {
        if score >= 0.7 {
            Self::High
        } else if score >= 0.4 {
            Self::Medium
        } else if score >= 0.2 {
            Self::Low
        } else {
            Self::Minimal
        }
    }
}

/// Severity attached to a detected conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Minor.
    Low,
    /// Worth attention.
    Medium,
    /// Blocking.
    High,
}

/// Lifecycle of a consultation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsultationStatus {
    /// Waiting for feedback.
    #[default]
    Open,
    /// Feedback collected.
    Closed,
}

/// Kind of entry in the simulation event log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimulationEventKind {
    /// The simulation was started.
    SimulationStarted,
    /// A message was sent.
    MessageSent,
    /// A persona responded to a message.
    ResponseRecorded,
    /// A message was escalated to an order.
    MessageEscalated,
    /// A consultation was opened.
    ConsultationCreated,
    /// Consultation feedback was collected.
    ConsultationFeedback,
    /// The evening metrics snapshot was taken.
    DailySummary,
    /// The simulation was stopped.
    SimulationStopped,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ladder_orders_pressure() {
        assert!(MessageKind::Nudge.ladder_rank() < MessageKind::Recommendation.ladder_rank());
        assert!(MessageKind::Recommendation.ladder_rank() < MessageKind::Order.ladder_rank());
        assert_eq!(MessageKind::Catchball.ladder_rank(), None);
    }

    #[test]
    fn only_nudge_and_recommendation_escalate() {
        let escalatable: Vec<MessageKind> = MessageKind::ALL
            .into_iter()
            .filter(|k| k.is_escalatable())
            .collect();
        assert_eq!(
            escalatable,
            vec![MessageKind::Nudge, MessageKind::Recommendation]
        );
    }

    #[test]
    fn trait_names_round_trip() {
        for t in PersonalityTrait::ALL {
            assert_eq!(PersonalityTrait::from_name(t.as_str()), Some(t));
        }
        assert_eq!(PersonalityTrait::from_name("charisma"), None);
    }

    #[test]
    fn confidence_bands() {
        assert_eq!(ConfidenceBand::from_confidence(0.1), ConfidenceBand::Low);
        assert_eq!(ConfidenceBand::from_confidence(0.3), ConfidenceBand::Medium);
        assert_eq!(ConfidenceBand::from_confidence(0.69), ConfidenceBand::Medium);
        assert_eq!(ConfidenceBand::from_confidence(0.7), ConfidenceBand::High);
    }

    #[test]
    fn risk_levels() {
        assert_eq!(RiskLevel::from_score(0.0), RiskLevel::Minimal);
        assert_eq!(RiskLevel::from_score(0.2), RiskLevel::Low);
        assert_eq!(RiskLevel::from_score(0.45), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_score(0.9), RiskLevel::High);
    }
}
