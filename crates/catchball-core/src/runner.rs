//! Tick loop with operator controls.
//!
//! [`run_simulation`] drives a started [`Simulation`] until an operator
//! stop or a configured bound ends the run:
//!
//! - **Bounded run**: stop after `max_ticks` or `max_real_time_seconds`
//! - **Variable tick speed**: the interval is re-read before every sleep
//! - **Command queue**: queued operator commands are applied at the start
//!   of each tick
//! - **Clean shutdown**: the simulation is stopped, pending events are
//!   dropped and a final metrics snapshot is returned

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::{Duration, sleep};
use tracing::{info, warn};

use catchball_types::MetricsReport;

use crate::operator::{OperatorCommand, OperatorState, RunEndReason};
use crate::simulation::{Simulation, SimulationError};

/// Errors that end a run early.
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    /// The simulation rejected the run.
    #[error("simulation error: {source}")]
    Simulation {
        /// The underlying simulation error.
        #[from]
        source: SimulationError,
    },
}

/// Error returned by a [`TickCallback`]. Logged, never fatal.
#[derive(Debug, thiserror::Error)]
pub enum CallbackError {
    /// The callback could not complete.
    #[error("tick callback failed: {reason}")]
    Failed {
        /// What went wrong.
        reason: String,
    },
}

/// What one tick of the loop did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TickSummary {
    /// 1-based tick number.
    pub tick: u64,
    /// Simulated time after the tick.
    pub at: DateTime<Utc>,
    /// Scheduled events that ran.
    pub fired: u64,
    /// Scheduled events that failed.
    pub failed: u64,
    /// Whether background maintenance ran.
    pub maintenance_ran: bool,
}

/// Outcome of a completed run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    /// Why the run ended.
    pub end_reason: RunEndReason,
    /// Ticks executed.
    pub total_ticks: u64,
    /// Operator commands applied successfully.
    pub commands_applied: u64,
    /// Operator commands rejected by the simulation.
    pub commands_failed: u64,
    /// Metrics taken when the simulation stopped.
    pub final_metrics: MetricsReport,
}

/// Hook invoked after every tick.
pub trait TickCallback: Send {
    /// Called with the tick summary and the simulation after each tick.
    ///
    /// # Errors
    ///
    /// A returned error is logged and the loop continues.
    fn on_tick(&mut self, summary: &TickSummary, sim: &Simulation) -> Result<(), CallbackError>;
}

/// Callback that does nothing.
pub struct NoOpCallback;

impl TickCallback for NoOpCallback {
    fn on_tick(&mut self, _summary: &TickSummary, _sim: &Simulation) -> Result<(), CallbackError> {
        Ok(())
    }
}

/// Apply one queued operator command.
///
/// # Errors
///
/// Returns whatever the corresponding [`Simulation`] operation returns.
pub fn apply_command(sim: &mut Simulation, command: OperatorCommand) -> Result<(), SimulationError> {
    match command {
        OperatorCommand::Send(draft) => sim.send(draft).map(|_| ()),
        OperatorCommand::Resend(message_id) => sim.resend(message_id),
        OperatorCommand::ReportResponse {
            message_id,
            response,
        } => sim.report_response(message_id, response).map(|_| ()),
        OperatorCommand::CreateConsultation(draft) => sim.create_consultation(draft).map(|_| ()),
    }
}

/// Run the tick loop until an operator stop or a bound is reached.
///
/// Each iteration checks the stop flag and the wall-clock bound, applies
/// queued commands, runs one tick, calls `callback`, checks the tick
/// bound and sleeps for the current tick interval. When the loop ends the
/// simulation is stopped.
///
/// # Errors
///
/// Returns [`SimulationError::NotRunning`] (wrapped) if `sim` was not
/// started.
pub async fn run_simulation(
    sim: &mut Simulation,
    operator: &Arc<OperatorState>,
    callback: &mut dyn TickCallback,
) -> Result<RunSummary, RunnerError> {
    if !sim.is_running() {
        return Err(SimulationError::NotRunning.into());
    }

    let mut total_ticks: u64 = 0;
    let mut commands_applied: u64 = 0;
    let mut commands_failed: u64 = 0;

    info!(
        max_ticks = operator.max_ticks(),
        max_real_time_seconds = operator.max_real_time_seconds(),
        tick_interval_ms = operator.tick_interval_ms(),
        "Run loop starting"
    );

    let end_reason = loop {
        if operator.is_stop_requested() {
            info!("Operator stop requested");
            break RunEndReason::OperatorStop;
        }

        if operator.time_limit_reached() {
            info!(
                max_seconds = operator.max_real_time_seconds(),
                elapsed = operator.elapsed_seconds(),
                "Real-time limit reached"
            );
            break RunEndReason::MaxRealTimeReached;
        }

        for command in operator.drain_commands().await {
            match apply_command(sim, command) {
                Ok(()) => commands_applied = commands_applied.saturating_add(1),
                Err(e) => {
                    warn!(error = %e, "Operator command rejected");
                    commands_failed = commands_failed.saturating_add(1);
                }
            }
        }

        let report = sim.on_tick();
        total_ticks = total_ticks.saturating_add(1);
        let summary = TickSummary {
            tick: total_ticks,
            at: sim.clock().now(),
            fired: report.fired,
            failed: report.failed,
            maintenance_ran: report.maintenance_ran,
        };

        if let Err(e) = callback.on_tick(&summary, sim) {
            warn!(tick = summary.tick, error = %e, "Tick callback failed");
        }

        if operator.tick_limit_reached(total_ticks) {
            info!(
                tick = total_ticks,
                max_ticks = operator.max_ticks(),
                "Tick limit reached"
            );
            break RunEndReason::MaxTicksReached;
        }

        let interval_ms = operator.tick_interval_ms();
        if interval_ms > 0 {
            sleep(Duration::from_millis(interval_ms)).await;
        }
    };

    operator.set_end_reason(end_reason).await;
    let final_metrics = sim.stop().unwrap_or_else(|| sim.metrics());

    Ok(RunSummary {
        end_reason,
        total_ticks,
        commands_applied,
        commands_failed,
        final_metrics,
    })
}

/// Log the outcome of a run.
pub fn log_run_end(summary: &RunSummary) {
    info!(
        reason = ?summary.end_reason,
        total_ticks = summary.total_ticks,
        commands_applied = summary.commands_applied,
        commands_failed = summary.commands_failed,
        "Run ended"
    );

    let m = &summary.final_metrics;
    if summary.total_ticks == 0 {
        warn!("Run ended with no ticks executed");
    }
    info!(
        messages_sent = m.messages_sent,
        responses = m.responses,
        escalations = m.escalations,
        response_rate = m.response_rate,
        escalation_rate = m.escalation_rate,
        average_stress = m.average_stress,
        friction_score = m.friction_score,
        "Final metrics"
    );
}
