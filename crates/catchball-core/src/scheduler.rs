//! Deferred-event scheduler keyed on simulated time.
//!
//! Events live in a binary min-heap ordered by target time, with ties
//! broken by insertion order. The scheduler is generic over its payload;
//! the simulation uses [`SimEvent`](crate::simulation::SimEvent).
//!
//! Daily events re-arm themselves: [`EventScheduler::pop_due`] inserts the
//! next day's occurrence before handing the fired event back, so a failing
//! handler cannot break the recurrence.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::fmt;

use chrono::{DateTime, NaiveTime, TimeDelta, Utc};
use serde::Serialize;
use tracing::{debug, warn};

use catchball_types::ScheduledEventId;

use crate::clock::SimulationClock;

/// Errors that can occur when scheduling events.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    /// Hour or minute out of range for a daily event.
    #[error("invalid time of day {hour:02}:{minute:02}")]
    InvalidTimeOfDay {
        /// Requested hour.
        hour: u32,
        /// Requested minute.
        minute: u32,
    },

    /// The target time is out of the representable range.
    #[error("scheduled time overflowed")]
    TimeOverflow,
}

/// How an event repeats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Recurrence {
    /// Fires once.
    Once,
    /// Fires every day at the given time.
    Daily {
        /// Hour of day, 0-23.
        hour: u32,
        /// Minute of hour, 0-59.
        minute: u32,
    },
}

/// An event held by the scheduler.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledEvent<T> {
    /// Stable identifier; kept across daily re-arms.
    pub id: ScheduledEventId,
    /// Simulated time at which the event is due.
    pub at: DateTime<Utc>,
    /// Repetition rule.
    pub recurrence: Recurrence,
    /// What to do when the event fires.
    pub payload: T,
}

/// Read-only description of a pending event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScheduledEventInfo {
    /// Event identifier.
    pub id: ScheduledEventId,
    /// Simulated due time.
    pub at: DateTime<Utc>,
    /// Simulated seconds until the event is due; negative when overdue.
    pub seconds_until: i64,
    /// Repetition rule.
    pub recurrence: Recurrence,
    /// Debug rendering of the payload.
    pub label: String,
}

/// Outcome of [`EventScheduler::fire_due`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FiringReport {
    /// Events whose handler succeeded.
    pub fired: u64,
    /// Events whose handler returned an error.
    pub failed: u64,
}

struct Entry<T> {
    seq: u64,
    event: ScheduledEvent<T>,
}

impl<T> Entry<T> {
    fn key(&self) -> (DateTime<Utc>, u64) {
        (self.event.at, self.seq)
    }
}

impl<T> PartialEq for Entry<T> {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl<T> Eq for Entry<T> {}

impl<T> PartialOrd for Entry<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Entry<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

/// Priority queue of events ordered by due time.
pub struct EventScheduler<T> {
    queue: BinaryHeap<Reverse<Entry<T>>>,
    next_seq: u64,
}

impl<T> fmt::Debug for EventScheduler<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventScheduler")
            .field("pending", &self.queue.len())
            .field("next_seq", &self.next_seq)
            .finish()
    }
}

impl<T> Default for EventScheduler<T> {
    fn default() -> Self {
        Self {
            queue: BinaryHeap::new(),
            next_seq: 0,
        }
    }
}

impl<T> EventScheduler<T> {
    /// Create an empty scheduler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule a one-off event at `at`.
    pub fn schedule_at(&mut self, at: DateTime<Utc>, payload: T) -> ScheduledEventId {
        let id = ScheduledEventId::new();
        self.push(ScheduledEvent {
            id,
            at,
            recurrence: Recurrence::Once,
            payload,
        });
        debug!(event_id = %id, at = %at, "Event scheduled");
        id
    }

    /// Schedule a one-off event `delay` after the clock's current time.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::TimeOverflow`] if the target time is out
    /// of range.
    pub fn schedule_after(
        &mut self,
        clock: &SimulationClock,
        delay: TimeDelta,
        payload: T,
    ) -> Result<ScheduledEventId, SchedulerError> {
        let at = clock
            .now()
            .checked_add_signed(delay)
            .ok_or(SchedulerError::TimeOverflow)?;
        Ok(self.schedule_at(at, payload))
    }

    /// Schedule an event every day at `hour:minute`, first at the next
    /// occurrence at or after the clock's current time.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::InvalidTimeOfDay`] for an out-of-range
    /// hour or minute, or [`SchedulerError::TimeOverflow`].
    pub fn schedule_daily(
        &mut self,
        clock: &SimulationClock,
        hour: u32,
        minute: u32,
        payload: T,
    ) -> Result<ScheduledEventId, SchedulerError> {
        let at = next_daily_occurrence(clock.now(), hour, minute)?;
        let id = ScheduledEventId::new();
        self.push(ScheduledEvent {
            id,
            at,
            recurrence: Recurrence::Daily { hour, minute },
            payload,
        });
        debug!(event_id = %id, at = %at, hour, minute, "Daily event scheduled");
        Ok(id)
    }

    /// Remove a pending event. Returns whether it was found.
    pub fn cancel(&mut self, id: ScheduledEventId) -> bool {
        let before = self.queue.len();
        self.queue.retain(|Reverse(entry)| entry.event.id != id);
        self.queue.len() < before
    }

    /// Drop every pending event. Returns how many were dropped.
    pub fn clear(&mut self) -> usize {
        let dropped = self.queue.len();
        self.queue.clear();
        dropped
    }

    /// Number of pending events.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Whether nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Due time of the earliest pending event.
    pub fn next_due(&self) -> Option<DateTime<Utc>> {
        self.queue.peek().map(|Reverse(entry)| entry.event.at)
    }

    /// Pending events in firing order.
    pub fn pending(&self) -> Vec<&ScheduledEvent<T>> {
        let mut entries: Vec<&Entry<T>> = self.queue.iter().map(|Reverse(e)| e).collect();
        entries.sort();
        entries.into_iter().map(|e| &e.event).collect()
    }

    fn push(&mut self, event: ScheduledEvent<T>) {
        let seq = self.next_seq;
        self.next_seq = self.next_seq.saturating_add(1);
        self.queue.push(Reverse(Entry { seq, event }));
    }
}

impl<T: fmt::Debug> EventScheduler<T> {
    /// Describe pending events relative to `now`, in firing order.
    pub fn scheduled_events_info(&self, now: DateTime<Utc>) -> Vec<ScheduledEventInfo> {
        self.pending()
            .into_iter()
            .map(|event| ScheduledEventInfo {
                id: event.id,
                at: event.at,
                seconds_until: event.at.signed_duration_since(now).num_seconds(),
                recurrence: event.recurrence,
                label: format!("{:?}", event.payload),
            })
            .collect()
    }
}

impl<T: Clone> EventScheduler<T> {
    /// Pop the earliest event if it is due at `now`.
    ///
    /// A daily event is re-armed for the following day before it is
    /// returned.
    pub fn pop_due(&mut self, now: DateTime<Utc>) -> Option<ScheduledEvent<T>> {
        if self.next_due()? > now {
            return None;
        }
        let Reverse(entry) = self.queue.pop()?;
        let event = entry.event;

        if let Recurrence::Daily { .. } = event.recurrence {
            match event.at.checked_add_signed(TimeDelta::days(1)) {
                Some(next) => self.push(ScheduledEvent {
                    id: event.id,
                    at: next,
                    recurrence: event.recurrence,
                    payload: event.payload.clone(),
                }),
                None => warn!(event_id = %event.id, "Daily event could not be re-armed"),
            }
        }
        Some(event)
    }

    /// Fire every event due at `now`, in time order.
    ///
    /// A failing handler is logged with the event id and does not stop
    /// the remaining due events from firing.
    pub fn fire_due<E, F>(&mut self, now: DateTime<Utc>, mut handler: F) -> FiringReport
    where
        E: fmt::Display,
        F: FnMut(ScheduledEvent<T>) -> Result<(), E>,
    {
        let mut report = FiringReport::default();
        while let Some(event) = self.pop_due(now) {
            let id = event.id;
            match handler(event) {
                Ok(()) => report.fired = report.fired.saturating_add(1),
                Err(e) => {
                    warn!(event_id = %id, error = %e, "Scheduled event failed");
                    report.failed = report.failed.saturating_add(1);
                }
            }
        }
        report
    }
}

/// Next time at or after `now` whose wall time is `hour:minute` UTC.
///
/// # Errors
///
/// Returns [`SchedulerError::InvalidTimeOfDay`] for an out-of-range hour
/// or minute, or [`SchedulerError::TimeOverflow`].
pub fn next_daily_occurrence(
    now: DateTime<Utc>,
    hour: u32,
    minute: u32,
) -> Result<DateTime<Utc>, SchedulerError> {
    let time = NaiveTime::from_hms_opt(hour, minute, 0)
        .ok_or(SchedulerError::InvalidTimeOfDay { hour, minute })?;
    let today = now.date_naive().and_time(time).and_utc();
    if today >= now {
        Ok(today)
    } else {
        today
            .checked_add_signed(TimeDelta::days(1))
            .ok_or(SchedulerError::TimeOverflow)
    }
}
