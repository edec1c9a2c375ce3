//! Error types for the catchball-agents crate.
//!
//! All operations that can fail return typed errors rather than panicking.

use catchball_types::PersonaId;

/// A population record failed validation.
///
/// Carries the offending record's identifier and the name of the field
/// that was rejected, so ingestion adapters can report or skip it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid persona record `{record_id}`: field `{field}` {reason}")]
pub struct ValidationError {
    /// Identifier of the rejected record (may be empty if the id itself is
    /// what failed).
    pub record_id: String,
    /// Name of the rejected field.
    pub field: String,
    /// What is wrong with it.
    pub reason: String,
}

impl ValidationError {
    /// Build a validation error for `field` of record `record_id`.
    pub fn new(record_id: &str, field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            record_id: record_id.to_owned(),
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Errors that can occur during persona operations.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    /// Persona with the given id is not part of the population.
    #[error("persona not found: {0}")]
    PersonaNotFound(PersonaId),

    /// A persona with the same id was already added.
    #[error("duplicate persona id: {0}")]
    DuplicatePersona(PersonaId),

    /// A record failed validation.
    #[error("validation failed: {source}")]
    Validation {
        /// The underlying validation error.
        #[from]
        source: ValidationError,
    },
}
