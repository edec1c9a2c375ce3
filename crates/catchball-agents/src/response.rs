//! The per-persona response decision procedure.
//!
//! Given a persona, a message and the population, [`ResponseEngine`]
//! decides whether the persona answers, samples a response kind from a
//! context-adjusted distribution, generates the response's content and
//! metrics, and finally updates the persona's stress, workload,
//! relationships and availability.
//!
//! Deciding ([`ResponseEngine::decide`]) and updating
//! ([`ResponseEngine::apply`]) are separate steps so a delivery adapter can
//! report a real response and run only the update path. All randomness
//! comes from the caller's [`Rng`], which keeps runs reproducible.

use chrono::{DateTime, TimeDelta, Utc};
use rand::Rng;

use catchball_types::{
    InteractionRecord, Message, MessageId, MessageKind, Persona, PersonaId, PersonaState,
    Response, ResponseId, ResponseKind,
};

use crate::config::BehaviorConfig;
use crate::error::AgentError;
use crate::population::{Population, WORKLOAD_CEILING};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Relationship strength above which the sender is trusted.
const STRONG_RELATIONSHIP: f64 = 0.7;

/// Relationship strength below which the sender is distrusted.
const WEAK_RELATIONSHIP: f64 = 0.3;

/// Stress level above which personas disengage.
const HIGH_STRESS: f64 = 0.7;

/// Workload ratio above which personas shed work.
const HIGH_WORKLOAD: f64 = 0.8;

/// Workload ratio above which a persona is overwhelmed.
const OVERWHELMED_RATIO: f64 = 1.1;

/// Neutral message priority; take-action scales around it.
const NEUTRAL_PRIORITY: f64 = 3.0;

/// Workload added by taking action.
const ACTION_WORKLOAD: f64 = 0.10;

/// Relationship gained by taking action for the sender.
const ACTION_RELATIONSHIP_GAIN: f64 = 0.05;

/// Relationship lost by ignoring the sender.
const IGNORE_RELATIONSHIP_LOSS: f64 = 0.10;

const TAKE_ACTION_CONTENT: &[&str] = &[
    "I'll take care of this right away.",
    "Understood. I'll make this a priority.",
    "Got it. I'll start working on this immediately.",
    "Will do. I'll keep you updated on progress.",
];

const CLARIFICATION_CONTENT: &[&str] = &[
    "Could you provide more details about the expected timeline?",
    "I want to make sure I understand correctly. Could you clarify the scope?",
    "What resources will be available for this?",
    "How does this fit with our current priorities?",
];

const FEEDBACK_CONTENT: &[&str] = &[
    "I have some thoughts on this approach. We might have some issues with capacity this quarter.",
    "This is challenging, but there is a real opportunity here if we sequence it well.",
    "I'm not sure the timeline works given our current deadline commitments.",
    "I see a clear benefit here. My main concern is the impact on our process.",
];

const ESCALATE_CONTENT: &[&str] = &[
    "I think this needs to be discussed at a higher level.",
    "This conflicts with other priorities, so I'm raising it with leadership.",
    "I need to consult with my manager before committing to this.",
];

// ---------------------------------------------------------------------------
// Distribution
// ---------------------------------------------------------------------------

/// A probability distribution over response kinds.
///
/// Entries are kept in [`ResponseKind::ALL`] order so sampling with the
/// same random draw always picks the same kind.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseDistribution {
    entries: Vec<(ResponseKind, f64)>,
}

impl ResponseDistribution {
    /// Build a distribution from unnormalized weights. Negative or
    /// non-finite weights count as zero.
    pub fn from_weights(weights: impl IntoIterator<Item = (ResponseKind, f64)>) -> Self {
        let mut entries: Vec<(ResponseKind, f64)> = ResponseKind::ALL
            .into_iter()
            .map(|kind| (kind, 0.0))
            .collect();
        for (kind, weight) in weights {
            if let Some(entry) = entries.iter_mut().find(|(k, _)| *k == kind) {
                if weight.is_finite() && weight > 0.0 {
                    entry.1 += weight;
                }
            }
        }
        let mut distribution = Self { entries };
        distribution.normalize();
        distribution
    }

    /// Probability assigned to `kind`.
    pub fn probability(&self, kind: ResponseKind) -> f64 {
        self.entries
            .iter()
            .find(|(k, _)| *k == kind)
            .map_or(0.0, |(_, p)| *p)
    }

    /// Sum of all probabilities (1 unless every weight was zero).
    pub fn total(&self) -> f64 {
        self.entries.iter().map(|(_, p)| p).sum()
    }

    /// Draw one kind by cumulative probability, falling back to
    /// [`ResponseKind::Ignore`].
    pub fn sample(&self, rng: &mut impl Rng) -> ResponseKind {
        let roll: f64 = rng.random();
        let mut cumulative = 0.0;
        for &(kind, p) in &self.entries {
            cumulative += p;
            if p > 0.0 && roll < cumulative {
                return kind;
            }
        }
        ResponseKind::Ignore
    }

    fn scale(&mut self, kind: ResponseKind, factor: f64) {
        if let Some(entry) = self.entries.iter_mut().find(|(k, _)| *k == kind) {
            entry.1 = (entry.1 * factor).max(0.0);
        }
    }

    fn normalize(&mut self) {
        let total = self.total();
        if total > 0.0 {
            for entry in &mut self.entries {
                entry.1 /= total;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Reported responses
// ---------------------------------------------------------------------------

/// A response reported back by a delivery adapter rather than simulated.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportedResponse {
    /// Responding persona.
    pub persona_id: PersonaId,
    /// Response kind.
    pub kind: ResponseKind,
    /// Whether the persona committed to action.
    pub action_taken: bool,
    /// Free-text content.
    pub content: String,
    /// Sentiment; midpoint of the kind's range when absent.
    pub sentiment: Option<f64>,
    /// Confidence; midpoint of the kind's range when absent.
    pub confidence: Option<f64>,
    /// Estimated completion time.
    pub estimated_completion: Option<DateTime<Utc>>,
}

impl ReportedResponse {
    /// Turn the report into an immutable [`Response`] for `message_id`.
    pub fn into_response(self, message_id: MessageId, now: DateTime<Utc>) -> Response {
        let (sentiment_range, confidence_range) = metric_ranges(self.kind);
        Response {
            id: ResponseId::new(),
            message_id,
            persona_id: self.persona_id,
            kind: self.kind,
            content: self.content,
            sentiment: self
                .sentiment
                .unwrap_or_else(|| midpoint(sentiment_range))
                .clamp(-1.0, 1.0),
            confidence: self
                .confidence
                .unwrap_or_else(|| midpoint(confidence_range))
                .clamp(0.0, 1.0),
            action_taken: self.action_taken,
            estimated_completion: self.estimated_completion,
            created_at: now,
        }
    }
}

// ---------------------------------------------------------------------------
// ResponseEngine
// ---------------------------------------------------------------------------

/// Decides how personas respond to messages.
#[derive(Debug, Clone, Default)]
pub struct ResponseEngine {
    config: BehaviorConfig,
}

impl ResponseEngine {
    /// Create an engine with the given behaviour configuration.
    pub const fn new(config: BehaviorConfig) -> Self {
        Self { config }
    }

    /// The behaviour configuration in use.
    pub const fn config(&self) -> &BehaviorConfig {
        &self.config
    }

    /// Probability that `persona` answers `message` at all.
    pub fn response_probability(&self, persona: &Persona, message: &Message) -> f64 {
        let gate = &self.config.gate;
        let p = match persona.state {
            PersonaState::OnLeave => 0.0,
            _ if message.kind == MessageKind::Order => gate.order_probability,
            PersonaState::Overwhelmed => gate.overwhelmed_probability,
            PersonaState::Busy | PersonaState::InMeeting
                if message.priority < gate.busy_priority_override =>
            {
                gate.busy_probability
            }
            _ => gate
                .authority_weight
                .mul_add(persona.personality.authority_response, gate.base_probability),
        };
        p.clamp(0.0, 1.0)
    }

    /// Roll the response gate.
    pub fn will_respond(&self, persona: &Persona, message: &Message, rng: &mut impl Rng) -> bool {
        let p = self.response_probability(persona, message);
        if p <= 0.0 {
            return false;
        }
        rng.random::<f64>() < p
    }

    /// Response-kind distribution seeded from the weight table.
    pub fn base_distribution(&self, persona: &Persona, message: &Message) -> ResponseDistribution {
        ResponseDistribution::from_weights(
            self.config
                .weights
                .rows(message.kind)
                .iter()
                .map(|row| (row.kind, row.weight_for(&persona.personality))),
        )
    }

    /// Base distribution adjusted for relationship, stress, workload and
    /// priority, renormalized.
    pub fn adjusted_distribution(
        &self,
        persona: &Persona,
        message: &Message,
    ) -> ResponseDistribution {
        let mut d = self.base_distribution(persona, message);

        let relationship = persona.memory.relationship_with(&message.sender);
        if relationship > STRONG_RELATIONSHIP {
            d.scale(ResponseKind::TakeAction, 1.3);
            d.scale(ResponseKind::Ignore, 0.7);
        } else if relationship < WEAK_RELATIONSHIP {
            d.scale(ResponseKind::Ignore, 1.4);
            d.scale(ResponseKind::TakeAction, 0.8);
        }

        if persona.memory.stress_level > HIGH_STRESS {
            d.scale(ResponseKind::Ignore, 1.2);
            d.scale(ResponseKind::SeekClarification, 1.1);
        }

        if persona.profile.workload_ratio() > HIGH_WORKLOAD {
            d.scale(ResponseKind::Ignore, 1.3);
            d.scale(ResponseKind::Delegate, 1.2);
        }

        let priority = f64::from(message.priority);
        d.scale(
            ResponseKind::TakeAction,
            0.2f64.mul_add(priority - NEUTRAL_PRIORITY, 1.0),
        );

        d.normalize();
        d
    }

    /// Run the gate, sampling and content steps. Does not touch the
    /// persona; returns `None` when the persona does not respond.
    pub fn decide(
        &self,
        persona: &Persona,
        message: &Message,
        population: &Population,
        rng: &mut impl Rng,
        now: DateTime<Utc>,
    ) -> Option<Response> {
        if !self.will_respond(persona, message, rng) {
            return None;
        }

        let mut kind = self.adjusted_distribution(persona, message).sample(rng);

        let content = match kind {
            ResponseKind::Ignore => String::new(),
            ResponseKind::TakeAction => pick(TAKE_ACTION_CONTENT, rng),
            ResponseKind::SeekClarification => pick(CLARIFICATION_CONTENT, rng),
            ResponseKind::ProvideFeedback => pick(FEEDBACK_CONTENT, rng),
            ResponseKind::Escalate => pick(ESCALATE_CONTENT, rng),
            ResponseKind::Delegate => {
                if let Some(delegate) = pick_report(persona, population, rng) {
                    format!("I've asked {delegate} to take the lead on this and will follow up.")
                } else {
                    kind = ResponseKind::TakeAction;
                    pick(TAKE_ACTION_CONTENT, rng)
                }
            }
        };

        let (sentiment_range, confidence_range) = metric_ranges(kind);
        let sentiment = sample_range(sentiment_range, rng);
        let confidence = sample_range(confidence_range, rng);
        let action_taken = kind.implies_commitment();
        let estimated_completion = if action_taken {
            estimate_completion(persona, message.priority, rng, now)
        } else {
            None
        };

        Some(Response {
            id: ResponseId::new(),
            message_id: message.id,
            persona_id: persona.id.clone(),
            kind,
            content,
            sentiment,
            confidence,
            action_taken,
            estimated_completion,
            created_at: now,
        })
    }

    /// Update a persona after it responded to `message`.
    pub fn apply(
        &self,
        persona: &mut Persona,
        message: &Message,
        response: &Response,
        now: DateTime<Utc>,
    ) {
        persona.memory.record_interaction(
            InteractionRecord {
                at: now,
                counterpart: message.sender.clone(),
                message_id: message.id,
                message_kind: message.kind,
                response_kind: response.kind,
            },
            self.config.interaction_history_limit,
        );

        let stress_delta = match response.kind {
            ResponseKind::Ignore => 0.05,
            ResponseKind::TakeAction => 0.10,
            ResponseKind::SeekClarification => 0.02,
            ResponseKind::ProvideFeedback | ResponseKind::Escalate | ResponseKind::Delegate => 0.0,
        };
        persona.memory.stress_level = (persona.memory.stress_level + stress_delta).clamp(0.0, 1.0);

        if response.kind == ResponseKind::TakeAction {
            let ceiling = WORKLOAD_CEILING * persona.profile.workload_capacity;
            persona.profile.current_workload =
                (persona.profile.current_workload + ACTION_WORKLOAD).clamp(0.0, ceiling.max(0.0));
        }

        let relationship_delta = match response.kind {
            ResponseKind::TakeAction => ACTION_RELATIONSHIP_GAIN,
            ResponseKind::Ignore => -IGNORE_RELATIONSHIP_LOSS,
            _ => 0.0,
        };
        if relationship_delta.abs() > f64::EPSILON && message.sender != persona.id {
            let current = persona.memory.relationship_with(&message.sender);
            persona.memory.relationships.insert(
                message.sender.clone(),
                (current + relationship_delta).clamp(0.0, 1.0),
            );
        }

        recompute_state(persona);
        persona.memory.last_updated = now;
    }

    /// Decide and, if the persona responds, apply the update.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::PersonaNotFound`] if `recipient` is not in the
    /// population.
    pub fn respond(
        &self,
        population: &mut Population,
        recipient: &PersonaId,
        message: &Message,
        rng: &mut impl Rng,
        now: DateTime<Utc>,
    ) -> Result<Option<Response>, AgentError> {
        let decision = {
            let persona = population.require(recipient)?;
            self.decide(persona, message, population, rng, now)
        };
        let Some(response) = decision else {
            return Ok(None);
        };
        let persona = population.require_mut(recipient)?;
        self.apply(persona, message, &response, now);
        Ok(Some(response))
    }
}

/// Recompute availability from the workload ratio. Personas on leave stay
/// on leave.
pub fn recompute_state(persona: &mut Persona) {
    if persona.state == PersonaState::OnLeave {
        return;
    }
    let ratio = persona.profile.workload_ratio();
    persona.state = if ratio > OVERWHELMED_RATIO {
        PersonaState::Overwhelmed
    } else if ratio > HIGH_WORKLOAD {
        PersonaState::Busy
    } else {
        PersonaState::Available
    };
}

/// Sentiment and confidence ranges per response kind.
const fn metric_ranges(kind: ResponseKind) -> ((f64, f64), (f64, f64)) {
    match kind {
        ResponseKind::Ignore => ((0.0, 0.0), (0.3, 0.3)),
        ResponseKind::TakeAction => ((0.3, 0.8), (0.6, 0.9)),
        ResponseKind::SeekClarification => ((0.1, 0.5), (0.4, 0.7)),
        ResponseKind::ProvideFeedback => ((0.2, 0.7), (0.5, 0.8)),
        ResponseKind::Escalate => ((-0.2, 0.3), (0.6, 0.8)),
        ResponseKind::Delegate => ((0.3, 0.6), (0.7, 0.9)),
    }
}

fn midpoint((low, high): (f64, f64)) -> f64 {
    (low + high) / 2.0
}

fn sample_range((low, high): (f64, f64), rng: &mut impl Rng) -> f64 {
    if high > low {
        rng.random_range(low..high)
    } else {
        low
    }
}

fn pick(pool: &[&str], rng: &mut impl Rng) -> String {
    if pool.is_empty() {
        return String::new();
    }
    let idx = rng.random_range(0..pool.len());
    pool.get(idx).map(|s| (*s).to_owned()).unwrap_or_default()
}

fn pick_report(persona: &Persona, population: &Population, rng: &mut impl Rng) -> Option<String> {
    let reports: Vec<&Persona> = persona
        .profile
        .direct_reports
        .iter()
        .filter_map(|id| population.get(id))
        .collect();
    if reports.is_empty() {
        return None;
    }
    let idx = rng.random_range(0..reports.len());
    reports.get(idx).map(|p| p.name.clone())
}

/// Base hour range for a message priority.
const fn base_hours(priority: u8) -> (f64, f64) {
    match priority {
        0 | 1 => (24.0, 72.0),
        2 => (12.0, 48.0),
        3 => (8.0, 24.0),
        4 => (4.0, 12.0),
        _ => (1.0, 6.0),
    }
}

/// Completion estimate: base hours by priority, stretched by workload and
/// shortened by seniority.
#[allow(clippy::cast_possible_truncation)]
fn estimate_completion(
    persona: &Persona,
    priority: u8,
    rng: &mut impl Rng,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    let hours = sample_range(base_hours(priority), rng);
    let workload_factor = 1.0 + persona.profile.workload_ratio();
    let seniority_factor =
        0.1f64.mul_add(-(f64::from(persona.profile.seniority) - 1.0), 1.0);
    let seconds = (hours * workload_factor * seniority_factor * 3600.0).round();
    if !seconds.is_finite() {
        return None;
    }
    let delta = TimeDelta::try_seconds(seconds as i64)?;
    now.checked_add_signed(delta)
}
