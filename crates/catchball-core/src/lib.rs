//! Simulated time, scheduling and orchestration for the Catchball
//! simulator.
//!
//! [`Simulation`] owns one run: an accelerated clock, a priority queue of
//! future work, the persona population and every message in flight. The
//! [`runner`] drives it tick by tick under operator control.
//!
//! # Modules
//!
//! - [`clock`] -- Accelerated simulation clock over an injectable
//!   [`TimeSource`]
//! - [`config`] -- YAML configuration loading and validation
//! - [`metrics`] -- Counters and organizational health metrics
//! - [`operator`] -- Shared stop flag, tick speed, bounds and command queue
//! - [`runner`] -- The bounded tick loop
//! - [`scheduler`] -- Time-ordered event queue with daily recurrence
//! - [`simulation`] -- The orchestrator
//!
//! [`Simulation`]: simulation::Simulation
//! [`TimeSource`]: clock::TimeSource

pub mod clock;
pub mod config;
pub mod metrics;
pub mod operator;
pub mod runner;
pub mod scheduler;
pub mod simulation;

pub use config::SimulationConfig;
pub use simulation::{ConsultationDraft, MessageDraft, Simulation, SimulationError};
