//! The simulation orchestrator.
//!
//! [`Simulation`] owns every piece of mutable run state: the clock, the
//! scheduler, the population, active messages and consultations, the
//! escalation log, counters and the seeded random source. Nothing is
//! shared; callers hold the instance and drive it through
//! [`Simulation::on_tick`], normally from [`run_simulation`].
//!
//! Work that has to wait (recipients reading a message, participants
//! answering a consultation) is scheduled into simulated future time and
//! runs inside a later tick. Within a tick, due events run one at a time
//! in time order; a failing event is logged and the rest still run.
//!
//! [`run_simulation`]: crate::runner::run_simulation

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tracing::{debug, info, warn};

use catchball_agents::consultation::{self, to_catchball_feedback};
use catchball_agents::escalation::{
    self, Escalation, EscalationLog, EscalationMetrics, EscalationPolicy, EscalationRisk,
};
use catchball_agents::population::IngestReport;
use catchball_agents::response::{ReportedResponse, ResponseEngine, recompute_state};
use catchball_agents::wisdom::{self, CatchballRound};
use catchball_agents::{AgentError, PersonaRecord, Population};
use catchball_types::{
    CatchballFeedback, Consultation, ConsultationId, ConsultationStatus, EscalationRecord,
    Message, MessageId, MessageKind, MetricsReport, Persona, PersonaId, PersonaState, Response,
    ScheduledEventId, SimulationEvent, SimulationEventId, SimulationEventKind, WisdomReport,
};

use crate::clock::{ClockError, ClockInfo, SimulationClock, SystemTimeSource, TimeSource};
use crate::config::{ConfigError, SimulationConfig};
use crate::metrics::{self, Counters};
use crate::scheduler::{EventScheduler, ScheduledEventInfo, SchedulerError};

/// Entries kept in the event log.
const EVENT_LOG_LIMIT: usize = 1000;

/// Metrics snapshots kept.
const SNAPSHOT_LIMIT: usize = 30;

/// Lowest and highest message priority.
const PRIORITY_RANGE: (u8, u8) = (1, 5);

/// Errors returned by simulation operations.
#[derive(Debug, thiserror::Error)]
pub enum SimulationError {
    /// A clock operation failed.
    #[error("clock error: {source}")]
    Clock {
        /// The underlying clock error.
        #[from]
        source: ClockError,
    },

    /// Scheduling an event failed.
    #[error("scheduler error: {source}")]
    Scheduler {
        /// The underlying scheduler error.
        #[from]
        source: SchedulerError,
    },

    /// A persona operation failed.
    #[error("agent error: {source}")]
    Agent {
        /// The underlying agent error.
        #[from]
        source: AgentError,
    },

    /// The configuration is invalid.
    #[error("config error: {source}")]
    Config {
        /// The underlying configuration error.
        #[from]
        source: ConfigError,
    },

    /// The operation needs a running simulation.
    #[error("simulation is not running")]
    NotRunning,

    /// No active message has this id.
    #[error("unknown message {message_id}")]
    UnknownMessage {
        /// The id that was looked up.
        message_id: MessageId,
    },

    /// No active consultation has this id.
    #[error("unknown consultation {consultation_id}")]
    UnknownConsultation {
        /// The id that was looked up.
        consultation_id: ConsultationId,
    },

    /// A response was reported by someone the message was not sent to.
    #[error("{persona_id} is not a recipient of message {message_id}")]
    NotARecipient {
        /// The message responded to.
        message_id: MessageId,
        /// The persona that responded.
        persona_id: PersonaId,
    },

    /// None of the requested recipients exist.
    #[error("no valid recipients")]
    NoValidRecipients,

    /// Only nudges and recommendations can be re-sent.
    #[error("message {message_id} is not a nudge or recommendation")]
    NotEscalatable {
        /// The message that was re-sent.
        message_id: MessageId,
    },

    /// Only catchball and wisdom requests carry analysable feedback.
    #[error("message {message_id} does not request feedback")]
    NotAFeedbackRequest {
        /// The message that was analysed.
        message_id: MessageId,
    },
}

/// Payload of a scheduled simulation event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimEvent {
    /// Run one processing round for a message.
    ProcessMessage(MessageId),
    /// Gather feedback for a consultation.
    ProcessConsultation(ConsultationId),
    /// Daily retention cleanup.
    MorningCleanup,
    /// Daily metrics snapshot.
    EveningSnapshot,
}

/// A message to be sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageDraft {
    /// Message kind.
    pub kind: MessageKind,
    /// Sending persona.
    pub sender: PersonaId,
    /// Intended recipients; unknown ids are skipped.
    pub recipients: Vec<PersonaId>,
    /// Subject line.
    pub subject: String,
    /// Body.
    pub content: String,
    /// Priority, clamped to 1-5.
    pub priority: u8,
    /// Optional simulated deadline.
    pub deadline: Option<DateTime<Utc>>,
    /// Escalation threshold; the configured default when absent.
    pub escalation_threshold: Option<u32>,
}

impl MessageDraft {
    /// Draft with priority 3, no deadline and the default threshold.
    pub fn new(
        kind: MessageKind,
        sender: impl Into<PersonaId>,
        recipients: impl IntoIterator<Item = PersonaId>,
        subject: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            sender: sender.into(),
            recipients: recipients.into_iter().collect(),
            subject: subject.into(),
            content: content.into(),
            priority: 3,
            deadline: None,
            escalation_threshold: None,
        }
    }

    /// Set the priority.
    #[must_use]
    pub const fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    /// Set a deadline.
    #[must_use]
    pub const fn with_deadline(mut self, deadline: DateTime<Utc>) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Override the escalation threshold.
    #[must_use]
    pub const fn with_escalation_threshold(mut self, threshold: u32) -> Self {
        self.escalation_threshold = Some(threshold);
        self
    }
}

/// A consultation to be opened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsultationDraft {
    /// Persona asking for input.
    pub requester: PersonaId,
    /// Short title.
    pub title: String,
    /// Longer description.
    pub description: String,
    /// The change being proposed.
    pub proposed_change: String,
    /// Invited participants; unknown ids are skipped.
    pub invited: Vec<PersonaId>,
    /// Optional simulated deadline.
    pub deadline: Option<DateTime<Utc>>,
}

/// What happened during one tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TickReport {
    /// Scheduled events that ran successfully.
    pub fired: u64,
    /// Scheduled events that failed.
    pub failed: u64,
    /// Whether background maintenance ran.
    pub maintenance_ran: bool,
}

/// Point-in-time status of a simulation.
#[derive(Debug, Clone, Serialize)]
pub struct SimulationStatus {
    /// Configured simulation name.
    pub name: String,
    /// Whether the simulation is running.
    pub running: bool,
    /// Clock snapshot.
    pub clock: ClockInfo,
    /// Personas in the population.
    pub personas: usize,
    /// Messages retained.
    pub active_messages: usize,
    /// Consultations still open.
    pub active_consultations: usize,
    /// Scheduled events waiting to fire.
    pub pending_events: usize,
    /// Escalations recorded.
    pub escalations: usize,
    /// Most recent metrics snapshot.
    pub latest_metrics: Option<MetricsReport>,
}

/// A simulation run and all of its state.
#[derive(Debug)]
pub struct Simulation {
    config: SimulationConfig,
    clock: SimulationClock,
    scheduler: EventScheduler<SimEvent>,
    population: Population,
    engine: ResponseEngine,
    policy: EscalationPolicy,
    escalation_log: EscalationLog,
    messages: BTreeMap<MessageId, Message>,
    consultations: BTreeMap<ConsultationId, Consultation>,
    counters: Counters,
    rng: StdRng,
    snapshots: VecDeque<MetricsReport>,
    events: VecDeque<SimulationEvent>,
}

impl Simulation {
    /// Create a stopped simulation driven by the system clock.
    ///
    /// # Errors
    ///
    /// Returns [`SimulationError::Config`] if the configuration is invalid.
    pub fn new(config: SimulationConfig) -> Result<Self, SimulationError> {
        Self::with_time_source(config, Arc::new(SystemTimeSource::new()))
    }

    /// Create a stopped simulation reading wall-clock time from `source`.
    ///
    /// # Errors
    ///
    /// Returns [`SimulationError::Config`] if the configuration is invalid.
    pub fn with_time_source(
        config: SimulationConfig,
        source: Arc<dyn TimeSource>,
    ) -> Result<Self, SimulationError> {
        config.validate()?;
        let sim_start = config.world.start_time.unwrap_or_else(|| source.wall_now());
        let clock = SimulationClock::new(config.world.acceleration_factor, sim_start, source)?;
        Ok(Self {
            rng: StdRng::seed_from_u64(config.world.seed),
            engine: ResponseEngine::new(config.behavior.clone()),
            policy: EscalationPolicy::new(config.messaging.default_escalation_threshold),
            config,
            clock,
            scheduler: EventScheduler::new(),
            population: Population::new(),
            escalation_log: EscalationLog::new(),
            messages: BTreeMap::new(),
            consultations: BTreeMap::new(),
            counters: Counters::default(),
            snapshots: VecDeque::new(),
            events: VecDeque::new(),
        })
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Build the population from `records`, start the clock and arm the
    /// daily cleanup and snapshot events.
    ///
    /// Malformed records are rejected individually and listed in the
    /// returned report.
    ///
    /// # Errors
    ///
    /// Returns [`ClockError::AlreadyRunning`] (wrapped) if the simulation
    /// is already running.
    pub fn start(&mut self, records: &[PersonaRecord]) -> Result<IngestReport, SimulationError> {
        if self.clock.is_running() {
            return Err(ClockError::AlreadyRunning.into());
        }

        let (population, report) = Population::ingest(records, self.clock.now(), &mut self.rng);
        self.population = population;
        self.clock.start()?;

        let maintenance = &self.config.maintenance;
        self.scheduler
            .schedule_daily(&self.clock, maintenance.morning_hour, 0, SimEvent::MorningCleanup)?;
        self.scheduler
            .schedule_daily(&self.clock, maintenance.evening_hour, 0, SimEvent::EveningSnapshot)?;

        self.log_event(
            SimulationEventKind::SimulationStarted,
            None,
            None,
            format!("{} personas", self.population.len()),
        );
        info!(
            name = %self.config.world.name,
            personas = self.population.len(),
            rejected = report.rejected.len(),
            sim_time = %self.clock.now(),
            "Simulation started"
        );
        Ok(report)
    }

    /// Stop the clock, drop every pending event and take a final metrics
    /// snapshot. Returns `None` if the simulation was not running.
    pub fn stop(&mut self) -> Option<MetricsReport> {
        if !self.clock.is_running() {
            return None;
        }
        self.clock.stop();
        let dropped = self.scheduler.clear();
        let report = self.metrics();
        self.push_snapshot(report.clone());
        self.log_event(
            SimulationEventKind::SimulationStopped,
            None,
            None,
            format!("{dropped} pending events dropped"),
        );
        info!(
            dropped,
            friction_score = report.friction_score,
            response_rate = report.response_rate,
            "Simulation stopped"
        );
        Some(report)
    }

    /// Whether the simulation is running.
    pub const fn is_running(&self) -> bool {
        self.clock.is_running()
    }

    /// Run every due event, then maybe run background maintenance.
    /// Does nothing while stopped.
    pub fn on_tick(&mut self) -> TickReport {
        let mut report = TickReport::default();
        if !self.clock.is_running() {
            return report;
        }

        let now = self.clock.now();
        while let Some(event) = self.scheduler.pop_due(now) {
            let id = event.id;
            match self.handle_event(event.payload) {
                Ok(()) => report.fired = report.fired.saturating_add(1),
                Err(e) => {
                    warn!(event_id = %id, payload = ?event.payload, error = %e, "Scheduled event failed");
                    report.failed = report.failed.saturating_add(1);
                }
            }
        }

        if self.rng.random::<f64>() < self.config.maintenance.probability {
            self.run_maintenance();
            report.maintenance_ran = true;
        }
        report
    }

    // -----------------------------------------------------------------------
    // Operations
    // -----------------------------------------------------------------------

    /// Create a message and schedule its first processing round after a
    /// random human-latency delay.
    ///
    /// Unknown recipients are skipped with a warning; duplicates are
    /// dropped.
    ///
    /// # Errors
    ///
    /// Returns [`SimulationError::NotRunning`] while stopped, or
    /// [`SimulationError::NoValidRecipients`] if no recipient exists.
    pub fn send(&mut self, draft: MessageDraft) -> Result<Message, SimulationError> {
        self.ensure_running()?;

        let recipients = self.known_personas(draft.recipients, "recipient");
        if recipients.is_empty() {
            return Err(SimulationError::NoValidRecipients);
        }

        let message = Message {
            id: MessageId::new(),
            kind: draft.kind,
            sender: draft.sender,
            recipients,
            subject: draft.subject,
            content: draft.content,
            priority: draft.priority.clamp(PRIORITY_RANGE.0, PRIORITY_RANGE.1),
            created_at: self.clock.now(),
            deadline: draft.deadline,
            nudge_count: 0,
            escalation_threshold: draft
                .escalation_threshold
                .unwrap_or_else(|| self.policy.default_threshold()),
            escalated_from: None,
            responses: Vec::new(),
        };

        let delay = self.response_delay()?;
        self.scheduler
            .schedule_after(&self.clock, delay, SimEvent::ProcessMessage(message.id))?;
        self.counters.messages_sent = self.counters.messages_sent.saturating_add(1);

        info!(
            message_id = %message.id,
            kind = %message.kind,
            sender = %message.sender,
            recipients = message.recipients.len(),
            priority = message.priority,
            delay_seconds = delay.num_seconds(),
            "Message sent"
        );
        self.log_event(
            SimulationEventKind::MessageSent,
            Some(message.id),
            Some(message.sender.clone()),
            message.subject.clone(),
        );
        self.messages.insert(message.id, message.clone());
        Ok(message)
    }

    /// Schedule another processing round for a nudge or recommendation.
    ///
    /// # Errors
    ///
    /// Returns [`SimulationError::UnknownMessage`] or
    /// [`SimulationError::NotEscalatable`].
    pub fn resend(&mut self, message_id: MessageId) -> Result<(), SimulationError> {
        self.ensure_running()?;
        let message = self
            .messages
            .get(&message_id)
            .ok_or(SimulationError::UnknownMessage { message_id })?;
        if !message.kind.is_escalatable() {
            return Err(SimulationError::NotEscalatable { message_id });
        }
        let round = message.nudge_count.saturating_add(1);

        let delay = self.response_delay()?;
        self.scheduler
            .schedule_after(&self.clock, delay, SimEvent::ProcessMessage(message_id))?;
        info!(%message_id, round, "Message re-sent");
        Ok(())
    }

    /// Record a response reported by a delivery adapter and apply the
    /// usual persona update.
    ///
    /// # Errors
    ///
    /// Returns [`SimulationError::UnknownMessage`],
    /// [`SimulationError::NotARecipient`], or an agent error if the
    /// persona does not exist.
    pub fn report_response(
        &mut self,
        message_id: MessageId,
        reported: ReportedResponse,
    ) -> Result<Response, SimulationError> {
        self.ensure_running()?;
        let now = self.clock.now();
        let persona_id = reported.persona_id.clone();

        let message = self
            .messages
            .get_mut(&message_id)
            .ok_or(SimulationError::UnknownMessage { message_id })?;
        if !message.is_addressed_to(&persona_id) {
            return Err(SimulationError::NotARecipient {
                message_id,
                persona_id,
            });
        }
        let persona = self.population.require_mut(&persona_id)?;

        let response = reported.into_response(message_id, now);
        self.engine.apply(persona, message, &response, now);
        message.responses.push(response.clone());
        self.counters.record_response(&persona.profile.department);

        info!(%message_id, %persona_id, kind = %response.kind, "Reported response recorded");
        self.log_event(
            SimulationEventKind::ResponseRecorded,
            Some(message_id),
            Some(persona_id),
            response.kind.as_str().to_owned(),
        );
        Ok(response)
    }

    /// Open a consultation and schedule feedback gathering.
    ///
    /// # Errors
    ///
    /// Returns [`SimulationError::NotRunning`] while stopped, or
    /// [`SimulationError::NoValidRecipients`] if no invitee exists.
    pub fn create_consultation(
        &mut self,
        draft: ConsultationDraft,
    ) -> Result<Consultation, SimulationError> {
        self.ensure_running()?;

        let invited = self.known_personas(draft.invited, "invitee");
        if invited.is_empty() {
            return Err(SimulationError::NoValidRecipients);
        }

        let consultation = Consultation {
            id: ConsultationId::new(),
            requester: draft.requester,
            title: draft.title,
            description: draft.description,
            proposed_change: draft.proposed_change,
            invited,
            deadline: draft.deadline,
            created_at: self.clock.now(),
            status: ConsultationStatus::Open,
            feedback: Vec::new(),
        };

        let (min, max) = (
            self.config.messaging.consultation_delay_min_secs,
            self.config.messaging.consultation_delay_max_secs,
        );
        let delay = self.sample_delay(min, max)?;
        self.scheduler.schedule_after(
            &self.clock,
            delay,
            SimEvent::ProcessConsultation(consultation.id),
        )?;

        info!(
            consultation_id = %consultation.id,
            requester = %consultation.requester,
            invited = consultation.invited.len(),
            "Consultation created"
        );
        self.log_event(
            SimulationEventKind::ConsultationCreated,
            None,
            Some(consultation.requester.clone()),
            consultation.title.clone(),
        );
        self.consultations
            .insert(consultation.id, consultation.clone());
        Ok(consultation)
    }

    // -----------------------------------------------------------------------
    // Scheduled work
    // -----------------------------------------------------------------------

    fn handle_event(&mut self, event: SimEvent) -> Result<(), SimulationError> {
        match event {
            SimEvent::ProcessMessage(id) => self.process_message(id),
            SimEvent::ProcessConsultation(id) => self.process_consultation(id),
            SimEvent::MorningCleanup => {
                self.morning_cleanup();
                Ok(())
            }
            SimEvent::EveningSnapshot => {
                self.evening_snapshot();
                Ok(())
            }
        }
    }

    /// One processing round: every pending recipient decides, then the
    /// escalation policy runs.
    ///
    /// For nudges and recommendations the round counter goes up by one and
    /// only currently non-responsive recipients are asked again. Other
    /// kinds ask every recipient that has not answered yet.
    fn process_message(&mut self, message_id: MessageId) -> Result<(), SimulationError> {
        let now = self.clock.now();
        let snapshot = {
            let message = self
                .messages
                .get_mut(&message_id)
                .ok_or(SimulationError::UnknownMessage { message_id })?;
            if message.kind.is_escalatable() {
                message.nudge_count = message.nudge_count.saturating_add(1);
            }
            message.clone()
        };

        let targets: Vec<PersonaId> = if snapshot.kind.is_escalatable() {
            self.counters.nudges_sent = self.counters.nudges_sent.saturating_add(1);
            escalation::non_responsive_recipients(&snapshot)
        } else {
            snapshot
                .recipients
                .iter()
                .filter(|r| snapshot.latest_response_from(r).is_none())
                .cloned()
                .collect()
        };

        let mut responses = Vec::new();
        for recipient in &targets {
            self.counters.deliveries = self.counters.deliveries.saturating_add(1);
            match self
                .engine
                .respond(&mut self.population, recipient, &snapshot, &mut self.rng, now)
            {
                Ok(Some(response)) => {
                    if let Some(p) = self.population.get(recipient) {
                        self.counters.record_response(&p.profile.department);
                    }
                    debug!(%message_id, persona_id = %recipient, kind = %response.kind, "Response recorded");
                    responses.push(response);
                }
                Ok(None) => debug!(%message_id, persona_id = %recipient, "No response"),
                Err(e) => warn!(%message_id, persona_id = %recipient, error = %e, "Recipient skipped"),
            }
        }

        for response in &responses {
            self.log_event(
                SimulationEventKind::ResponseRecorded,
                Some(message_id),
                Some(response.persona_id.clone()),
                response.kind.as_str().to_owned(),
            );
        }
        let responded = responses.len();

        let escalation = {
            let message = self
                .messages
                .get_mut(&message_id)
                .ok_or(SimulationError::UnknownMessage { message_id })?;
            message.responses.extend(responses);
            self.policy.evaluate(message, &self.population, now)
        };

        info!(
            %message_id,
            kind = %snapshot.kind,
            round = snapshot.nudge_count,
            processed = targets.len(),
            responded,
            "Message processed"
        );

        if let Some(escalation) = escalation {
            self.record_escalation(escalation)?;
        }
        Ok(())
    }

    fn record_escalation(&mut self, escalation: Escalation) -> Result<(), SimulationError> {
        let Escalation { message, record } = escalation;
        let (min, max) = (
            self.config.messaging.escalation_delay_min_secs,
            self.config.messaging.escalation_delay_max_secs,
        );
        let delay = self.sample_delay(min, max)?;
        self.scheduler
            .schedule_after(&self.clock, delay, SimEvent::ProcessMessage(message.id))?;

        self.counters.escalations = self.counters.escalations.saturating_add(1);
        self.counters.messages_sent = self.counters.messages_sent.saturating_add(1);
        self.log_event(
            SimulationEventKind::MessageEscalated,
            Some(record.original_message_id),
            Some(record.sender.clone()),
            format!(
                "escalated to order {} for {} recipients",
                message.id,
                record.non_responsive.len()
            ),
        );
        self.escalation_log.record(record);
        self.messages.insert(message.id, message);
        Ok(())
    }

    fn process_consultation(&mut self, consultation_id: ConsultationId) -> Result<(), SimulationError> {
        let now = self.clock.now();
        let participation = self.config.messaging.consultation_participation;

        let consultation = self
            .consultations
            .get(&consultation_id)
            .ok_or(SimulationError::UnknownConsultation { consultation_id })?;
        if consultation.status == ConsultationStatus::Closed {
            return Ok(());
        }

        let mut gathered = Vec::new();
        for invitee in &consultation.invited {
            let Some(persona) = self.population.get(invitee) else {
                continue;
            };
            if persona.state == PersonaState::OnLeave {
                continue;
            }
            if consultation::participates(participation, &mut self.rng) {
                gathered.push(consultation::generate_feedback(
                    persona,
                    consultation,
                    &mut self.rng,
                    now,
                ));
            }
        }

        let invited = consultation.invited.len();
        for feedback in &gathered {
            self.log_event(
                SimulationEventKind::ConsultationFeedback,
                None,
                Some(feedback.persona_id.clone()),
                format!("consultation {consultation_id}"),
            );
        }
        let participants = gathered.len();

        if let Some(consultation) = self.consultations.get_mut(&consultation_id) {
            consultation.feedback.extend(gathered);
            consultation.status = ConsultationStatus::Closed;
        }
        info!(%consultation_id, invited, participants, "Consultation feedback gathered");
        Ok(())
    }

    /// Drop messages and consultations past the retention window, and
    /// closed consultations.
    fn morning_cleanup(&mut self) {
        let now = self.clock.now();
        let cutoff = TimeDelta::try_days(i64::from(self.config.messaging.retention_days))
            .and_then(|retention| now.checked_sub_signed(retention))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);

        let messages_before = self.messages.len();
        self.messages.retain(|_, m| m.created_at >= cutoff);
        let consultations_before = self.consultations.len();
        self.consultations
            .retain(|_, c| c.status == ConsultationStatus::Open && c.created_at >= cutoff);

        // Rounds still queued for dropped messages or consultations.
        let orphaned: Vec<ScheduledEventId> = self
            .scheduler
            .pending()
            .into_iter()
            .filter(|event| match event.payload {
                SimEvent::ProcessMessage(id) => !self.messages.contains_key(&id),
                SimEvent::ProcessConsultation(id) => !self.consultations.contains_key(&id),
                SimEvent::MorningCleanup | SimEvent::EveningSnapshot => false,
            })
            .map(|event| event.id)
            .collect();
        let events_cancelled = orphaned
            .into_iter()
            .filter(|id| self.scheduler.cancel(*id))
            .count();

        info!(
            messages_removed = messages_before.saturating_sub(self.messages.len()),
            consultations_removed = consultations_before.saturating_sub(self.consultations.len()),
            events_cancelled,
            "Morning cleanup"
        );
    }

    fn evening_snapshot(&mut self) {
        let report = self.metrics();
        info!(
            friction_score = report.friction_score,
            response_rate = report.response_rate,
            escalation_rate = report.escalation_rate,
            average_stress = report.average_stress,
            "Evening metrics snapshot"
        );
        self.log_event(
            SimulationEventKind::DailySummary,
            None,
            None,
            format!(
                "friction {:.2}, response rate {:.2}",
                report.friction_score, report.response_rate
            ),
        );
        self.push_snapshot(report);
    }

    /// Decay stress and workload toward baseline and recompute states.
    fn run_maintenance(&mut self) {
        let m = &self.config.maintenance;
        for persona in self.population.iter_mut() {
            persona.memory.stress_level = (persona.memory.stress_level - m.stress_decay).max(0.0);
            let workload = persona.profile.current_workload;
            if workload > m.workload_floor {
                persona.profile.current_workload = (workload - m.workload_decay).max(m.workload_floor);
            }
            recompute_state(persona);
        }
        debug!(personas = self.population.len(), "Maintenance pass");
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Current metrics report.
    pub fn metrics(&self) -> MetricsReport {
        let open = self
            .consultations
            .values()
            .filter(|c| c.status == ConsultationStatus::Open)
            .count();
        metrics::compute(
            self.clock.now(),
            &self.population,
            &self.counters,
            self.messages.len(),
            open,
        )
    }

    /// Stored metrics snapshots, oldest first.
    pub fn snapshots(&self) -> impl Iterator<Item = &MetricsReport> {
        self.snapshots.iter()
    }

    /// The escalation audit log.
    pub fn escalations(&self) -> &[EscalationRecord] {
        self.escalation_log.records()
    }

    /// Aggregate escalation metrics.
    pub fn escalation_metrics(&self) -> EscalationMetrics {
        self.escalation_log.metrics(self.counters.nudges_sent)
    }

    /// Escalation likelihood of a message; `None` for kinds that never
    /// escalate.
    ///
    /// # Errors
    ///
    /// Returns [`SimulationError::UnknownMessage`].
    pub fn predict_escalation_risk(
        &self,
        message_id: MessageId,
    ) -> Result<Option<EscalationRisk>, SimulationError> {
        let message = self
            .messages
            .get(&message_id)
            .ok_or(SimulationError::UnknownMessage { message_id })?;
        Ok(self.policy.predict_risk(message, &self.escalation_log))
    }

    /// Analyse the responses to a catchball or wisdom request.
    ///
    /// # Errors
    ///
    /// Returns [`SimulationError::UnknownMessage`] or
    /// [`SimulationError::NotAFeedbackRequest`].
    pub fn analyze_message_feedback(
        &self,
        message_id: MessageId,
    ) -> Result<WisdomReport, SimulationError> {
        let message = self
            .messages
            .get(&message_id)
            .ok_or(SimulationError::UnknownMessage { message_id })?;
        if !message.kind.gathers_feedback() {
            return Err(SimulationError::NotAFeedbackRequest { message_id });
        }
        let feedback = message
            .responses
            .iter()
            .filter_map(|r| {
                let persona = self.population.get(&r.persona_id)?;
                Some(response_feedback(r, persona, message.created_at))
            })
            .collect();
        Ok(wisdom::analyze(&CatchballRound {
            feedback,
            invited_per_department: self.invited_per_department(&message.recipients),
        }))
    }

    /// Analyse the feedback gathered for a consultation.
    ///
    /// # Errors
    ///
    /// Returns [`SimulationError::UnknownConsultation`].
    pub fn analyze_consultation(
        &self,
        consultation_id: ConsultationId,
    ) -> Result<WisdomReport, SimulationError> {
        let consultation = self
            .consultations
            .get(&consultation_id)
            .ok_or(SimulationError::UnknownConsultation { consultation_id })?;
        let feedback = consultation
            .feedback
            .iter()
            .map(|f| to_catchball_feedback(f, consultation.created_at))
            .collect();
        Ok(wisdom::analyze(&CatchballRound {
            feedback,
            invited_per_department: self.invited_per_department(&consultation.invited),
        }))
    }

    /// Status snapshot.
    pub fn status(&self) -> SimulationStatus {
        SimulationStatus {
            name: self.config.world.name.clone(),
            running: self.clock.is_running(),
            clock: self.clock.time_info(),
            personas: self.population.len(),
            active_messages: self.messages.len(),
            active_consultations: self
                .consultations
                .values()
                .filter(|c| c.status == ConsultationStatus::Open)
                .count(),
            pending_events: self.scheduler.len(),
            escalations: self.escalation_log.len(),
            latest_metrics: self.snapshots.back().cloned(),
        }
    }

    /// Pending scheduled events in firing order.
    pub fn scheduled_events_info(&self) -> Vec<ScheduledEventInfo> {
        self.scheduler.scheduled_events_info(self.clock.now())
    }

    /// The event log, oldest first.
    pub fn events(&self) -> impl Iterator<Item = &SimulationEvent> {
        self.events.iter()
    }

    /// The configuration in use.
    pub const fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// The simulation clock.
    pub const fn clock(&self) -> &SimulationClock {
        &self.clock
    }

    /// The population.
    pub const fn population(&self) -> &Population {
        &self.population
    }

    /// Mutable access to the population, for external state changes such
    /// as putting a persona on leave.
    pub const fn population_mut(&mut self) -> &mut Population {
        &mut self.population
    }

    /// A retained message.
    pub fn message(&self, message_id: MessageId) -> Option<&Message> {
        self.messages.get(&message_id)
    }

    /// All retained messages, in id order.
    pub fn messages(&self) -> impl Iterator<Item = &Message> {
        self.messages.values()
    }

    /// A retained consultation.
    pub fn consultation(&self, consultation_id: ConsultationId) -> Option<&Consultation> {
        self.consultations.get(&consultation_id)
    }

    /// Running counters.
    pub const fn counters(&self) -> &Counters {
        &self.counters
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    const fn ensure_running(&self) -> Result<(), SimulationError> {
        if self.clock.is_running() {
            Ok(())
        } else {
            Err(SimulationError::NotRunning)
        }
    }

    fn known_personas(&self, ids: Vec<PersonaId>, role: &str) -> Vec<PersonaId> {
        let mut known: Vec<PersonaId> = Vec::with_capacity(ids.len());
        for id in ids {
            if !self.population.contains(&id) {
                warn!(persona_id = %id, role, "Skipping unknown persona");
            } else if !known.contains(&id) {
                known.push(id);
            }
        }
        known
    }

    fn invited_per_department(&self, ids: &[PersonaId]) -> BTreeMap<String, u32> {
        let mut counts: BTreeMap<String, u32> = BTreeMap::new();
        for persona in ids.iter().filter_map(|id| self.population.get(id)) {
            let n = counts.entry(persona.profile.department.clone()).or_insert(0);
            *n = n.saturating_add(1);
        }
        counts
    }

    fn response_delay(&mut self) -> Result<TimeDelta, SimulationError> {
        let (min, max) = (
            self.config.messaging.response_delay_min_secs,
            self.config.messaging.response_delay_max_secs,
        );
        self.sample_delay(min, max)
    }

    fn sample_delay(&mut self, min_secs: u64, max_secs: u64) -> Result<TimeDelta, SimulationError> {
        let secs = self.rng.random_range(min_secs..=max_secs.max(min_secs));
        i64::try_from(secs)
            .ok()
            .and_then(TimeDelta::try_seconds)
            .ok_or_else(|| SchedulerError::TimeOverflow.into())
    }

    fn push_snapshot(&mut self, report: MetricsReport) {
        self.snapshots.push_back(report);
        while self.snapshots.len() > SNAPSHOT_LIMIT {
            self.snapshots.pop_front();
        }
    }

    fn log_event(
        &mut self,
        kind: SimulationEventKind,
        message_id: Option<MessageId>,
        persona_id: Option<PersonaId>,
        detail: String,
    ) {
        self.events.push_back(SimulationEvent {
            id: SimulationEventId::new(),
            kind,
            at: self.clock.now(),
            message_id,
            persona_id,
            detail,
        });
        while self.events.len() > EVENT_LOG_LIMIT {
            self.events.pop_front();
        }
    }
}

/// Convert a message response into analyzer input. Commitment is the
/// response confidence when the persona committed to action, else 0.
fn response_feedback(
    response: &Response,
    persona: &Persona,
    requested_at: DateTime<Utc>,
) -> CatchballFeedback {
    CatchballFeedback {
        persona_id: response.persona_id.clone(),
        department: persona.profile.department.clone(),
        role: persona.profile.role.clone(),
        content: response.content.clone(),
        response_kind: response.kind,
        response_delay_hours: consultation::delay_hours(
            response.created_at.signed_duration_since(requested_at),
        ),
        confidence: response.confidence,
        sentiment: response.sentiment,
        commitment: if response.action_taken {
            response.confidence
        } else {
            0.0
        },
        priorities_mentioned: Vec::new(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::clock::ManualTimeSource;
    use catchball_types::ResponseKind;

    fn config() -> SimulationConfig {
        let mut config = SimulationConfig::default();
        config.world.acceleration_factor = 1;
        config.world.start_time = Some(Utc.with_ymd_and_hms(2025, 1, 6, 8, 0, 0).unwrap());
        config.messaging.response_delay_min_secs = 10;
        config.messaging.response_delay_max_secs = 20;
        config.messaging.escalation_delay_min_secs = 10;
        config.messaging.escalation_delay_max_secs = 20;
        config.messaging.consultation_delay_min_secs = 10;
        config.messaging.consultation_delay_max_secs = 20;
        config.maintenance.probability = 0.0;
        config
    }

    fn record(id: &str, department: &str, role: &str) -> PersonaRecord {
        let mut r = PersonaRecord::new(id, id.to_uppercase(), department, role);
        r.state = Some(PersonaState::Available);
        r.stress_level = Some(0.2);
        r.current_workload = Some(0.3);
        r
    }

    fn records() -> Vec<PersonaRecord> {
        vec![
            record("ceo", "Executive", "CEO"),
            record("eng", "Engineering", "Engineer"),
            record("ops", "Operations", "Operations Manager"),
            record("rep", "Sales", "Sales Rep"),
        ]
    }

    fn started(config: SimulationConfig) -> (Simulation, Arc<ManualTimeSource>) {
        let source = Arc::new(ManualTimeSource::new(Utc::now()));
        let mut sim = Simulation::with_time_source(config, source.clone()).unwrap();
        sim.start(&records()).unwrap();
        (sim, source)
    }

    fn advance(sim: &mut Simulation, source: &ManualTimeSource, seconds: i64) -> TickReport {
        source.advance(TimeDelta::seconds(seconds));
        sim.on_tick()
    }

    fn put_on_leave(sim: &mut Simulation, id: &str) {
        sim.population_mut()
            .get_mut(&PersonaId::from(id))
            .unwrap()
            .state = PersonaState::OnLeave;
    }

    #[test]
    fn double_start_is_an_error() {
        let (mut sim, _source) = started(config());
        let err = sim.start(&records()).unwrap_err();
        assert!(matches!(
            err,
            SimulationError::Clock {
                source: ClockError::AlreadyRunning
            }
        ));
    }

    #[test]
    fn send_requires_running() {
        let mut sim = Simulation::new(config()).unwrap();
        let draft = MessageDraft::new(MessageKind::Nudge, "ceo", [PersonaId::from("eng")], "s", "b");
        assert!(matches!(sim.send(draft), Err(SimulationError::NotRunning)));
    }

    #[test]
    fn unknown_recipients_are_skipped() {
        let (mut sim, _source) = started(config());
        let draft = MessageDraft::new(
            MessageKind::Nudge,
            "ceo",
            [PersonaId::from("eng"), PersonaId::from("ghost"), PersonaId::from("eng")],
            "s",
            "b",
        )
        .with_priority(9);
        let message = sim.send(draft).unwrap();
        assert_eq!(message.recipients, vec![PersonaId::from("eng")]);
        assert_eq!(message.priority, 5);
        assert_eq!(message.escalation_threshold, 5);

        let none = MessageDraft::new(MessageKind::Nudge, "ceo", [PersonaId::from("ghost")], "s", "b");
        assert!(matches!(sim.send(none), Err(SimulationError::NoValidRecipients)));
    }

    #[test]
    fn nudge_counter_advances_once_per_round() {
        let (mut sim, source) = started(config());
        put_on_leave(&mut sim, "eng");
        let draft = MessageDraft::new(MessageKind::Nudge, "ceo", [PersonaId::from("eng")], "s", "b")
            .with_escalation_threshold(10);
        let message = sim.send(draft).unwrap();

        advance(&mut sim, &source, 30);
        assert_eq!(sim.message(message.id).unwrap().nudge_count, 1);

        sim.resend(message.id).unwrap();
        advance(&mut sim, &source, 30);
        assert_eq!(sim.message(message.id).unwrap().nudge_count, 2);
        assert_eq!(sim.counters().nudges_sent, 2);
        assert_eq!(sim.counters().deliveries, 2);
    }

    #[test]
    fn unanswered_nudge_escalates_to_order() {
        let (mut sim, source) = started(config());
        put_on_leave(&mut sim, "eng");
        let draft = MessageDraft::new(MessageKind::Nudge, "ceo", [PersonaId::from("eng")], "Plan", "Send it")
            .with_priority(3)
            .with_escalation_threshold(2);
        let original = sim.send(draft).unwrap();

        advance(&mut sim, &source, 30);
        assert!(sim.escalations().is_empty());

        sim.resend(original.id).unwrap();
        advance(&mut sim, &source, 30);

        assert_eq!(sim.escalations().len(), 1);
        let order = sim
            .messages()
            .find(|m| m.escalated_from == Some(original.id))
            .unwrap();
        assert_eq!(order.kind, MessageKind::Order);
        assert_eq!(order.recipients, vec![PersonaId::from("eng")]);
        assert_eq!(order.priority, 4);
        assert_eq!(order.nudge_count, 0);
        assert_eq!(sim.message(original.id).unwrap().kind, MessageKind::Nudge);
        assert!(
            sim.events()
                .any(|e| e.kind == SimulationEventKind::MessageEscalated)
        );
        assert_eq!(sim.escalation_metrics().total_escalations, 1);
    }

    #[test]
    fn resend_rejects_orders() {
        let (mut sim, _source) = started(config());
        let draft = MessageDraft::new(MessageKind::Order, "ceo", [PersonaId::from("eng")], "s", "b");
        let order = sim.send(draft).unwrap();
        assert!(matches!(
            sim.resend(order.id),
            Err(SimulationError::NotEscalatable { .. })
        ));
        assert!(matches!(
            sim.resend(MessageId::new()),
            Err(SimulationError::UnknownMessage { .. })
        ));
    }

    #[test]
    fn reported_responses_update_state() {
        let (mut sim, _source) = started(config());
        let draft = MessageDraft::new(MessageKind::Recommendation, "ceo", [PersonaId::from("eng")], "s", "b");
        let message = sim.send(draft).unwrap();

        let report = |who: &str| ReportedResponse {
            persona_id: PersonaId::from(who),
            kind: ResponseKind::TakeAction,
            action_taken: true,
            content: String::from("Done"),
            sentiment: None,
            confidence: None,
            estimated_completion: None,
        };
        assert!(matches!(
            sim.report_response(message.id, report("ops")),
            Err(SimulationError::NotARecipient { .. })
        ));

        let stress_before = sim.population().get(&PersonaId::from("eng")).unwrap().memory.stress_level;
        let response = sim.report_response(message.id, report("eng")).unwrap();
        assert_eq!(response.kind, ResponseKind::TakeAction);
        let eng = sim.population().get(&PersonaId::from("eng")).unwrap();
        assert!((eng.memory.stress_level - (stress_before + 0.1)).abs() < 1e-9);
        assert_eq!(sim.message(message.id).unwrap().responses.len(), 1);
        assert_eq!(sim.counters().responses, 1);
    }

    #[test]
    fn stop_drops_pending_events_and_snapshots() {
        let (mut sim, source) = started(config());
        let draft = MessageDraft::new(MessageKind::Order, "ceo", [PersonaId::from("eng")], "s", "b");
        let message = sim.send(draft).unwrap();
        assert!(sim.status().pending_events >= 3);

        let report = sim.stop().unwrap();
        assert_eq!(report.messages_sent, 1);
        assert_eq!(sim.status().pending_events, 0);
        assert!(sim.stop().is_none());

        let tick = advance(&mut sim, &source, 3600);
        assert_eq!(tick, TickReport::default());
        assert!(sim.message(message.id).unwrap().responses.is_empty());
        assert_eq!(sim.snapshots().count(), 1);
    }

    #[test]
    fn consultation_gathers_feedback_and_closes() {
        let mut cfg = config();
        cfg.messaging.consultation_participation = 1.0;
        let (mut sim, source) = started(cfg);
        put_on_leave(&mut sim, "rep");

        let consultation = sim
            .create_consultation(ConsultationDraft {
                requester: PersonaId::from("ceo"),
                title: String::from("Platform"),
                description: String::from("New platform"),
                proposed_change: String::from("Adopt a new deployment process"),
                invited: vec![PersonaId::from("eng"), PersonaId::from("ops"), PersonaId::from("rep")],
                deadline: None,
            })
            .unwrap();

        advance(&mut sim, &source, 30);
        let closed = sim.consultation(consultation.id).unwrap();
        assert_eq!(closed.status, ConsultationStatus::Closed);
        assert_eq!(closed.feedback.len(), 2);

        let report = sim.analyze_consultation(consultation.id).unwrap();
        assert_eq!(report.feedback_count, 2);
        assert!((0.0..=1.0).contains(&report.consensus_score));
        let sales = report.department_insights.get("Sales");
        assert!(sales.is_none());
    }

    #[test]
    fn message_feedback_analysis_requires_feedback_kind() {
        let (mut sim, source) = started(config());
        let nudge = sim
            .send(MessageDraft::new(MessageKind::Nudge, "ceo", [PersonaId::from("eng")], "s", "b"))
            .unwrap();
        assert!(matches!(
            sim.analyze_message_feedback(nudge.id),
            Err(SimulationError::NotAFeedbackRequest { .. })
        ));

        let ask = sim
            .send(MessageDraft::new(
                MessageKind::Catchball,
                "ceo",
                [PersonaId::from("eng"), PersonaId::from("ops")],
                "Q3 plan",
                "Thoughts?",
            ))
            .unwrap();
        advance(&mut sim, &source, 30);
        let report = sim.analyze_message_feedback(ask.id).unwrap();
        assert_eq!(
            report.feedback_count,
            sim.message(ask.id).unwrap().responses.len()
        );
    }

    #[test]
    fn daily_events_clean_up_and_snapshot() {
        let (mut sim, source) = started(config());
        let draft = MessageDraft::new(MessageKind::Order, "ceo", [PersonaId::from("eng")], "s", "b");
        let message = sim.send(draft).unwrap();

        let tick = advance(&mut sim, &source, 8 * 24 * 3600);
        assert!(tick.fired >= 17);
        assert_eq!(tick.failed, 0);
        assert!(sim.message(message.id).is_none());
        assert!(sim.snapshots().count() >= 8);
        assert!(
            sim.events()
                .any(|e| e.kind == SimulationEventKind::DailySummary)
        );
    }

    #[test]
    fn cleanup_cancels_rounds_of_dropped_messages() {
        let mut cfg = config();
        cfg.messaging.retention_days = 1;
        cfg.messaging.response_delay_min_secs = 3 * 24 * 3600;
        cfg.messaging.response_delay_max_secs = 3 * 24 * 3600;
        let (mut sim, source) = started(cfg);
        let draft = MessageDraft::new(MessageKind::Nudge, "ceo", [PersonaId::from("eng")], "s", "b");
        let message = sim.send(draft).unwrap();
        assert_eq!(sim.status().pending_events, 3);

        let mut failed = 0_u64;
        for _ in 0..80 {
            failed = failed.saturating_add(advance(&mut sim, &source, 3600).failed);
        }

        assert_eq!(failed, 0);
        assert!(sim.message(message.id).is_none());
        assert_eq!(sim.status().pending_events, 2);
        assert_eq!(sim.counters().nudges_sent, 0);
    }

    #[test]
    fn maintenance_decays_stress() {
        let mut cfg = config();
        cfg.maintenance.probability = 1.0;
        let (mut sim, source) = started(cfg);
        let tick = advance(&mut sim, &source, 1);
        assert!(tick.maintenance_ran);
        let eng = sim.population().get(&PersonaId::from("eng")).unwrap();
        assert!((eng.memory.stress_level - 0.19).abs() < 1e-9);
        assert!((eng.profile.current_workload - 0.25).abs() < 1e-9);
    }

    #[test]
    fn status_reflects_run() {
        let (sim, _source) = started(config());
        let status = sim.status();
        assert!(status.running);
        assert_eq!(status.personas, 4);
        assert_eq!(status.pending_events, 2);
        assert_eq!(sim.scheduled_events_info().len(), 2);
        assert!(status.latest_metrics.is_none());
    }
}
