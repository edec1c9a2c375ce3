//! Tick callback that reports progress through the log.

use catchball_core::Simulation;
use catchball_core::runner::{CallbackError, TickCallback, TickSummary};
use tracing::{debug, info};

/// Logs a status line every `every` ticks and each tick that fired events.
pub struct ProgressCallback {
    every: u64,
}

impl ProgressCallback {
    /// Report every `every` ticks; 0 is treated as 1.
    pub const fn new(every: u64) -> Self {
        Self {
            every: if every == 0 { 1 } else { every },
        }
    }
}

impl TickCallback for ProgressCallback {
    fn on_tick(&mut self, summary: &TickSummary, sim: &Simulation) -> Result<(), CallbackError> {
        if summary.fired > 0 || summary.failed > 0 {
            debug!(
                tick = summary.tick,
                sim_time = %summary.at,
                fired = summary.fired,
                failed = summary.failed,
                "Scheduled work ran"
            );
        }
        if summary.tick.checked_rem(self.every) != Some(0) {
            return Ok(());
        }

        let status = sim.status();
        let metrics = sim.metrics();
        let status_json = serde_json::to_string(&status).map_err(|e| CallbackError::Failed {
            reason: format!("status serialization failed: {e}"),
        })?;
        info!(
            tick = summary.tick,
            sim_time = %summary.at,
            sim_days = status.clock.simulated_days_elapsed,
            active_messages = status.active_messages,
            pending_events = status.pending_events,
            escalations = status.escalations,
            response_rate = metrics.response_rate,
            friction_score = metrics.friction_score,
            "Progress"
        );
        debug!(status = %status_json, "Status snapshot");
        Ok(())
    }
}
