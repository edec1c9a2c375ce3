//! Shared type definitions for the Catchball simulator.
//!
//! This crate is the single source of truth for the value types that flow
//! between the pure engines (`catchball-agents`), the orchestrator
//! (`catchball-core`) and any reporting layer sitting on top of them.
//!
//! # Modules
//!
//! - [`ids`] -- Type-safe identifiers for personas, messages and events
//! - [`enums`] -- Message kinds, response kinds, persona states, traits
//! - [`structs`] -- Personas, messages, responses, escalation records
//! - [`reports`] -- Derived outputs (wisdom reports, metrics reports)

pub mod enums;
pub mod ids;
pub mod reports;
pub mod structs;

// Re-export all public types at crate root for convenience.
pub use enums::{
    ConfidenceBand, ConsultationStatus, HesitationPattern, MessageKind, PersonaState,
    PersonalityTrait, PriorityCategory, ResponseKind, RiskLevel, Severity, SimulationEventKind,
};
pub use ids::{
    ConsultationId, EscalationId, MessageId, PersonaId, ResponseId, ScheduledEventId,
    SimulationEventId,
};
pub use reports::{
    CrossDepartmentConflict, DepartmentInsight, DepartmentMetrics, FeedbackClassification,
    MetricsReport, WisdomRecommendations, WisdomReport,
};
pub use structs::{
    CatchballFeedback, Consultation, ConsultationFeedback, EscalationRecord, InteractionRecord,
    Message, Persona, PersonaMemory, PersonalityProfile, ProfessionalProfile, Response,
    SimulationEvent,
};
