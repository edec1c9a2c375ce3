//! Persona logic for the Catchball simulator.
//!
//! This crate contains the pure engines that operate on personas and
//! messages without touching the clock, the scheduler or any I/O. It sits
//! between `catchball-types` (the data structures) and `catchball-core`
//! (time, scheduling and orchestration).
//!
//! # Modules
//!
//! - [`config`] -- Tunable behaviour parameters ([`BehaviorConfig`])
//! - [`consultation`] -- Feedback generation for consultation participants
//! - [`error`] -- Error types ([`AgentError`], [`ValidationError`])
//! - [`escalation`] -- Escalation policy, audit log and risk prediction
//! - [`population`] -- Record validation, persona factory and [`Population`]
//! - [`response`] -- The per-persona response decision procedure
//! - [`wisdom`] -- Consensus and conflict analysis of catchball feedback

pub mod config;
pub mod consultation;
pub mod error;
pub mod escalation;
pub mod population;
pub mod response;
pub mod wisdom;

pub use config::BehaviorConfig;
pub use error::{AgentError, ValidationError};
pub use population::{PersonaRecord, Population};
