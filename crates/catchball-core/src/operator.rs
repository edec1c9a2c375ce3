//! Operator control state shared with the tick loop.
//!
//! Callers outside the loop never touch the [`Simulation`] directly. They
//! flip atomic flags (stop, tick speed) or queue [`OperatorCommand`]s,
//! which the runner drains at the start of every tick. All simulation
//! mutation therefore happens on the loop itself.
//!
//! [`Simulation`]: crate::simulation::Simulation

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use catchball_agents::response::ReportedResponse;
use catchball_types::MessageId;

use crate::config::SimulationBoundsConfig;
use crate::simulation::{ConsultationDraft, MessageDraft};

/// Smallest accepted tick interval in milliseconds.
pub const MIN_TICK_INTERVAL_MS: u64 = 100;

/// Why a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunEndReason {
    /// Reached the configured `max_ticks`.
    MaxTicksReached,
    /// Reached the configured `max_real_time_seconds`.
    MaxRealTimeReached,
    /// An operator asked the loop to stop.
    OperatorStop,
}

/// A mutation queued for the next tick.
#[derive(Debug, Clone)]
pub enum OperatorCommand {
    /// Send a new message.
    Send(MessageDraft),
    /// Schedule another round for a nudge or recommendation.
    Resend(MessageId),
    /// Record a response reported by a delivery adapter.
    ReportResponse {
        /// The message responded to.
        message_id: MessageId,
        /// The reported response.
        response: ReportedResponse,
    },
    /// Open a consultation.
    CreateConsultation(ConsultationDraft),
}

/// Shared operator control state.
///
/// Wrapped in an `Arc` and shared between the tick loop and whoever
/// drives it. Flags are atomics so the loop reads them without locking.
#[derive(Debug)]
pub struct OperatorState {
    stop_requested: AtomicBool,

    /// Tick interval in milliseconds, adjustable at runtime.
    tick_interval_ms: AtomicU64,

    started_at: DateTime<Utc>,

    /// 0 means unlimited.
    max_ticks: u64,

    /// 0 means unlimited.
    max_real_time_seconds: u64,

    commands: Mutex<Vec<OperatorCommand>>,

    end_reason: Mutex<Option<RunEndReason>>,
}

impl OperatorState {
    /// Create operator state from configuration.
    pub fn new(tick_interval_ms: u64, bounds: &SimulationBoundsConfig) -> Self {
        Self {
            stop_requested: AtomicBool::new(false),
            tick_interval_ms: AtomicU64::new(tick_interval_ms),
            started_at: Utc::now(),
            max_ticks: bounds.max_ticks,
            max_real_time_seconds: bounds.max_real_time_seconds,
            commands: Mutex::new(Vec::new()),
            end_reason: Mutex::new(None),
        }
    }

    // -----------------------------------------------------------------------
    // Stop
    // -----------------------------------------------------------------------

    /// Ask the loop to stop before its next tick.
    pub fn request_stop(&self) {
        self.stop_requested.store(true, Ordering::Release);
    }

    /// Whether a stop has been requested.
    pub fn is_stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::Acquire)
    }

    /// Record why the run ended.
    pub async fn set_end_reason(&self, reason: RunEndReason) {
        *self.end_reason.lock().await = Some(reason);
    }

    /// Why the run ended, if it has.
    pub async fn end_reason(&self) -> Option<RunEndReason> {
        *self.end_reason.lock().await
    }

    // -----------------------------------------------------------------------
    // Tick speed
    // -----------------------------------------------------------------------

    /// Current tick interval in milliseconds.
    pub fn tick_interval_ms(&self) -> u64 {
        self.tick_interval_ms.load(Ordering::Acquire)
    }

    /// Change the tick interval. Returns the previous interval, or `None`
    /// if `ms` is below [`MIN_TICK_INTERVAL_MS`].
    pub fn set_tick_interval_ms(&self, ms: u64) -> Option<u64> {
        if ms < MIN_TICK_INTERVAL_MS {
            return None;
        }
        Some(self.tick_interval_ms.swap(ms, Ordering::AcqRel))
    }

    // -----------------------------------------------------------------------
    // Bounds
    // -----------------------------------------------------------------------

    /// Whether `ticks_run` has reached a non-zero `max_ticks`.
    pub const fn tick_limit_reached(&self, ticks_run: u64) -> bool {
        self.max_ticks > 0 && ticks_run >= self.max_ticks
    }

    /// Whether a non-zero `max_real_time_seconds` has elapsed.
    pub fn time_limit_reached(&self) -> bool {
        self.max_real_time_seconds > 0 && self.elapsed_seconds() >= self.max_real_time_seconds
    }

    /// Wall-clock seconds since this state was created.
    pub fn elapsed_seconds(&self) -> u64 {
        let elapsed = Utc::now()
            .signed_duration_since(self.started_at)
            .num_seconds();
        u64::try_from(elapsed.max(0)).unwrap_or(u64::MAX)
    }

    /// Configured tick bound.
    pub const fn max_ticks(&self) -> u64 {
        self.max_ticks
    }

    /// Configured wall-clock bound in seconds.
    pub const fn max_real_time_seconds(&self) -> u64 {
        self.max_real_time_seconds
    }

    // -----------------------------------------------------------------------
    // Commands
    // -----------------------------------------------------------------------

    /// Queue a command for the next tick.
    pub async fn submit(&self, command: OperatorCommand) {
        self.commands.lock().await.push(command);
    }

    /// Take every queued command, oldest first.
    pub async fn drain_commands(&self) -> Vec<OperatorCommand> {
        std::mem::take(&mut *self.commands.lock().await)
    }
}

#[cfg(test)]
mod tests {
    use catchball_types::{MessageKind, PersonaId};

    use super::*;

    fn unbounded() -> SimulationBoundsConfig {
        SimulationBoundsConfig::default()
    }

    #[test]
    fn stop_request() {
        let state = OperatorState::new(1000, &unbounded());
        assert!(!state.is_stop_requested());
        state.request_stop();
        assert!(state.is_stop_requested());
    }

    #[test]
    fn tick_interval_is_adjustable() {
        let state = OperatorState::new(1000, &unbounded());
        assert_eq!(state.set_tick_interval_ms(250), Some(1000));
        assert_eq!(state.tick_interval_ms(), 250);
        assert_eq!(state.set_tick_interval_ms(50), None);
        assert_eq!(state.tick_interval_ms(), 250);
    }

    #[test]
    fn zero_bounds_mean_unlimited() {
        let state = OperatorState::new(1000, &unbounded());
        assert!(!state.tick_limit_reached(u64::MAX));
        assert!(!state.time_limit_reached());
    }

    #[test]
    fn tick_limit() {
        let bounds = SimulationBoundsConfig {
            max_ticks: 10,
            max_real_time_seconds: 0,
        };
        let state = OperatorState::new(1000, &bounds);
        assert!(!state.tick_limit_reached(9));
        assert!(state.tick_limit_reached(10));
    }

    #[tokio::test]
    async fn commands_drain_in_order() {
        let state = OperatorState::new(1000, &unbounded());
        let first = MessageId::new();
        state.submit(OperatorCommand::Resend(first)).await;
        state
            .submit(OperatorCommand::Send(MessageDraft::new(
                MessageKind::Nudge,
                "ceo",
                [PersonaId::from("eng")],
                "subject",
                "body",
            )))
            .await;

        let drained = state.drain_commands().await;
        assert_eq!(drained.len(), 2);
        assert!(matches!(drained.first(), Some(OperatorCommand::Resend(id)) if *id == first));
        assert!(state.drain_commands().await.is_empty());
    }

    #[tokio::test]
    async fn end_reason_is_recorded() {
        let state = OperatorState::new(1000, &unbounded());
        assert_eq!(state.end_reason().await, None);
        state.set_end_reason(RunEndReason::OperatorStop).await;
        assert_eq!(state.end_reason().await, Some(RunEndReason::OperatorStop));
    }
}
