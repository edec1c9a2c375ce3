//! Accelerated simulation clock.
//!
//! The clock maps wall-clock time onto simulated time:
//!
//! ```text
//! now = sim_start + (wall_now - real_start) * acceleration_factor
//! ```
//!
//! while running, and returns the frozen `sim_start` while stopped.
//! Stopping moves `sim_start` to the current simulated time, so a later
//! start resumes from where the clock stopped and simulated time never
//! goes backwards across restarts.
//!
//! Wall-clock time comes from a [`TimeSource`]. Production code uses
//! [`SystemTimeSource`], which is anchored to a monotonic [`Instant`];
//! tests use [`ManualTimeSource`] and advance it by hand.
//!
//! All conversions use checked microsecond arithmetic.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use tracing::info;

/// Errors that can occur during clock operations.
#[derive(Debug, thiserror::Error)]
pub enum ClockError {
    /// `start` was called on a running clock.
    #[error("simulation clock is already running")]
    AlreadyRunning,

    /// Invalid clock configuration (e.g. zero acceleration).
    #[error("invalid clock configuration: {reason}")]
    InvalidConfig {
        /// Explanation of what is wrong with the configuration.
        reason: String,
    },

    /// A time conversion left the representable range.
    #[error("time conversion overflowed")]
    TimeOverflow,
}

/// Source of wall-clock time.
pub trait TimeSource: Send + Sync + fmt::Debug {
    /// Current wall-clock time.
    fn wall_now(&self) -> DateTime<Utc>;
}

/// Wall-clock time read from the operating system.
///
/// The reading is anchored once and then advanced with a monotonic
/// [`Instant`], so system clock adjustments cannot move it backwards.
#[derive(Debug)]
pub struct SystemTimeSource {
    anchor_instant: Instant,
    anchor_wall: DateTime<Utc>,
}

impl SystemTimeSource {
    /// Anchor a new source at the current system time.
    pub fn new() -> Self {
        Self {
            anchor_instant: Instant::now(),
            anchor_wall: Utc::now(),
        }
    }
}

impl Default for SystemTimeSource {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for SystemTimeSource {
    fn wall_now(&self) -> DateTime<Utc> {
        TimeDelta::from_std(self.anchor_instant.elapsed())
            .ok()
            .and_then(|elapsed| self.anchor_wall.checked_add_signed(elapsed))
            .unwrap_or(self.anchor_wall)
    }
}

/// Hand-driven wall clock.
#[derive(Debug)]
pub struct ManualTimeSource {
    now: Mutex<DateTime<Utc>>,
}

impl ManualTimeSource {
    /// Create a source frozen at `start`.
    pub const fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Move the wall clock forward by `delta`. Saturates at the end of the
    /// representable range.
    pub fn advance(&self, delta: TimeDelta) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now = now.checked_add_signed(delta).unwrap_or(*now);
    }

    /// Set the wall clock to `at`.
    pub fn set(&self, at: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner) = at;
    }
}

impl TimeSource for ManualTimeSource {
    fn wall_now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Snapshot of the clock for status reporting.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClockInfo {
    /// Whether the clock is running.
    pub running: bool,
    /// Simulated seconds per wall-clock second.
    pub acceleration_factor: u32,
    /// Wall-clock time of the latest start.
    pub real_start: DateTime<Utc>,
    /// Simulated time at the latest start.
    pub sim_start: DateTime<Utc>,
    /// Current simulated time.
    pub now: DateTime<Utc>,
    /// Wall-clock seconds since the latest start; 0 while stopped.
    pub real_elapsed_seconds: i64,
    /// Simulated seconds since the clock was created.
    pub simulated_elapsed_seconds: i64,
    /// Simulated days since the clock was created.
    pub simulated_days_elapsed: i64,
}

/// Time-accelerated clock driving the simulation.
#[derive(Debug, Clone)]
pub struct SimulationClock {
    acceleration_factor: u32,
    time_source: Arc<dyn TimeSource>,
    /// Simulated time when the clock was created.
    origin: DateTime<Utc>,
    real_start: DateTime<Utc>,
    sim_start: DateTime<Utc>,
    running: bool,
}

impl SimulationClock {
    /// Create a stopped clock whose simulated time starts at `sim_start`.
    ///
    /// # Errors
    ///
    /// Returns [`ClockError::InvalidConfig`] if `acceleration_factor` is 0.
    pub fn new(
        acceleration_factor: u32,
        sim_start: DateTime<Utc>,
        time_source: Arc<dyn TimeSource>,
    ) -> Result<Self, ClockError> {
        if acceleration_factor == 0 {
            return Err(ClockError::InvalidConfig {
                reason: "acceleration_factor must be at least 1".to_owned(),
            });
        }
        let real_start = time_source.wall_now();
        Ok(Self {
            acceleration_factor,
            time_source,
            origin: sim_start,
            real_start,
            sim_start,
            running: false,
        })
    }

    /// Create a clock backed by the system time.
    ///
    /// # Errors
    ///
    /// Returns [`ClockError::InvalidConfig`] if `acceleration_factor` is 0.
    pub fn with_system_time(
        acceleration_factor: u32,
        sim_start: DateTime<Utc>,
    ) -> Result<Self, ClockError> {
        Self::new(
            acceleration_factor,
            sim_start,
            Arc::new(SystemTimeSource::new()),
        )
    }

    /// Start tracking time.
    ///
    /// # Errors
    ///
    /// Returns [`ClockError::AlreadyRunning`] if the clock is running.
    pub fn start(&mut self) -> Result<(), ClockError> {
        if self.running {
            return Err(ClockError::AlreadyRunning);
        }
        self.real_start = self.time_source.wall_now();
        self.running = true;
        info!(
            acceleration_factor = self.acceleration_factor,
            sim_start = %self.sim_start,
            "Simulation clock started"
        );
        Ok(())
    }

    /// Stop the clock, freezing simulated time. No-op when stopped.
    pub fn stop(&mut self) {
        if !self.running {
            return;
        }
        self.sim_start = self.now();
        self.running = false;
        info!(sim_time = %self.sim_start, "Simulation clock stopped");
    }

    /// Whether the clock is running.
    pub const fn is_running(&self) -> bool {
        self.running
    }

    /// Simulated seconds per wall-clock second.
    pub const fn acceleration_factor(&self) -> u32 {
        self.acceleration_factor
    }

    /// Current simulated time.
    ///
    /// Saturates at the largest representable time if the accelerated
    /// offset overflows.
    pub fn now(&self) -> DateTime<Utc> {
        if !self.running {
            return self.sim_start;
        }
        self.to_simulated(self.time_source.wall_now())
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// Convert a wall-clock time to simulated time.
    ///
    /// # Errors
    ///
    /// Returns [`ClockError::TimeOverflow`] if the result is out of range.
    pub fn to_simulated(&self, wall: DateTime<Utc>) -> Result<DateTime<Utc>, ClockError> {
        let micros = wall
            .signed_duration_since(self.real_start)
            .num_microseconds()
            .and_then(|m| m.checked_mul(i64::from(self.acceleration_factor)))
            .ok_or(ClockError::TimeOverflow)?;
        self.sim_start
            .checked_add_signed(TimeDelta::microseconds(micros))
            .ok_or(ClockError::TimeOverflow)
    }

    /// Convert a simulated time to wall-clock time.
    ///
    /// # Errors
    ///
    /// Returns [`ClockError::TimeOverflow`] if the result is out of range.
    pub fn to_wall_clock(&self, sim: DateTime<Utc>) -> Result<DateTime<Utc>, ClockError> {
        let micros = sim
            .signed_duration_since(self.sim_start)
            .num_microseconds()
            .and_then(|m| m.checked_div(i64::from(self.acceleration_factor)))
            .ok_or(ClockError::TimeOverflow)?;
        self.real_start
            .checked_add_signed(TimeDelta::microseconds(micros))
            .ok_or(ClockError::TimeOverflow)
    }

    /// Status snapshot.
    pub fn time_info(&self) -> ClockInfo {
        let now = self.now();
        let real_elapsed_seconds = if self.running {
            self.time_source
                .wall_now()
                .signed_duration_since(self.real_start)
                .num_seconds()
        } else {
            0
        };
        let simulated = now.signed_duration_since(self.origin);
        ClockInfo {
            running: self.running,
            acceleration_factor: self.acceleration_factor,
            real_start: self.real_start,
            sim_start: self.sim_start,
            now,
            real_elapsed_seconds,
            simulated_elapsed_seconds: simulated.num_seconds(),
            simulated_days_elapsed: simulated.num_days(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn manual_clock(factor: u32) -> (SimulationClock, Arc<ManualTimeSource>) {
        let wall = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        let sim = Utc.with_ymd_and_hms(2025, 1, 6, 8, 0, 0).unwrap();
        let source = Arc::new(ManualTimeSource::new(wall));
        let clock = SimulationClock::new(factor, sim, source.clone()).unwrap();
        (clock, source)
    }

    #[test]
    fn zero_acceleration_is_rejected() {
        let result = SimulationClock::with_system_time(0, Utc::now());
        assert!(matches!(result, Err(ClockError::InvalidConfig { .. })));
    }

    #[test]
    fn stopped_clock_is_frozen() {
        let (clock, source) = manual_clock(60);
        let before = clock.now();
        source.advance(TimeDelta::seconds(10));
        assert_eq!(clock.now(), before);
    }

    #[test]
    fn running_clock_is_accelerated() {
        let (mut clock, source) = manual_clock(60);
        let start = clock.now();
        clock.start().unwrap();
        source.advance(TimeDelta::seconds(10));
        assert_eq!(clock.now(), start + TimeDelta::minutes(10));
    }

    #[test]
    fn double_start_fails() {
        let (mut clock, _source) = manual_clock(1);
        clock.start().unwrap();
        assert!(matches!(clock.start(), Err(ClockError::AlreadyRunning)));
    }

    #[test]
    fn stop_is_idempotent_and_freezes_current_time() {
        let (mut clock, source) = manual_clock(10);
        clock.stop();
        clock.start().unwrap();
        source.advance(TimeDelta::seconds(6));
        clock.stop();
        let frozen = clock.now();
        source.advance(TimeDelta::hours(1));
        clock.stop();
        assert_eq!(clock.now(), frozen);

        clock.start().unwrap();
        source.advance(TimeDelta::seconds(1));
        assert_eq!(clock.now(), frozen + TimeDelta::seconds(10));
    }

    #[test]
    fn conversions_are_inverse() {
        let (mut clock, source) = manual_clock(144);
        clock.start().unwrap();
        source.advance(TimeDelta::seconds(30));
        let wall = source.wall_now();
        let sim = clock.to_simulated(wall).unwrap();
        assert_eq!(sim, clock.now());
        assert_eq!(clock.to_wall_clock(sim).unwrap(), wall);
    }

    #[test]
    fn now_is_monotonic() {
        let (mut clock, source) = manual_clock(1000);
        clock.start().unwrap();
        let mut last = clock.now();
        for step in 0..50 {
            source.advance(TimeDelta::milliseconds(step * 7));
            let now = clock.now();
            assert!(now >= last);
            last = now;
        }
    }

    #[test]
    fn time_info_reports_elapsed() {
        let (mut clock, source) = manual_clock(144);
        clock.start().unwrap();
        source.advance(TimeDelta::minutes(10));
        let info = clock.time_info();
        assert!(info.running);
        assert_eq!(info.real_elapsed_seconds, 600);
        assert_eq!(info.simulated_elapsed_seconds, 600 * 144);
        assert_eq!(info.simulated_days_elapsed, 1);
    }

    #[test]
    fn system_source_does_not_go_backwards() {
        let source = SystemTimeSource::new();
        let a = source.wall_now();
        let b = source.wall_now();
        assert!(b >= a);
    }
}
