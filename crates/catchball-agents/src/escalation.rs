//! Escalation policy, audit log and risk prediction.
//!
//! Only nudges and recommendations escalate. A message is eligible once its
//! nudge counter has reached its escalation threshold and at least one
//! recipient is non-responsive. Escalating never mutates the original: a
//! new order is built for the non-responsive subset and an
//! [`EscalationRecord`] is written.
//!
//! A recipient is non-responsive when their latest response is missing, is
//! an ignore or escalate, or is a take-action whose commitment flag is
//! false.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::warn;

use catchball_types::{
    EscalationId, EscalationRecord, Message, MessageId, MessageKind, PersonaId, Response,
    ResponseKind, RiskLevel,
};

use crate::population::Population;

/// Highest message priority.
const MAX_PRIORITY: u8 = 5;

/// Number of entries in the top-sender and top-recipient lists.
const TOP_N: usize = 5;

/// Escalations sent above which a sender counts as escalation-prone.
const HIGH_TENDENCY_THRESHOLD: usize = 3;

/// Non-responsive occurrences above which a persona counts as unresponsive.
const LOW_RESPONSIVENESS_THRESHOLD: usize = 2;

/// Signature used when the sender is not in the population.
const FALLBACK_SIGNATURE: &str = "Management";

/// Whether a recipient's latest response leaves them non-responsive.
pub fn is_non_responsive(latest: Option<&Response>) -> bool {
    match latest {
        None => true,
        Some(r) => match r.kind {
            ResponseKind::Ignore | ResponseKind::Escalate => true,
            ResponseKind::TakeAction => !r.action_taken,
            ResponseKind::SeekClarification
            | ResponseKind::ProvideFeedback
            | ResponseKind::Delegate => false,
        },
    }
}

/// Recipients of `message` that are currently non-responsive, in
/// recipient order.
pub fn non_responsive_recipients(message: &Message) -> Vec<PersonaId> {
    message
        .recipients
        .iter()
        .filter(|r| is_non_responsive(message.latest_response_from(r)))
        .cloned()
        .collect()
}

/// A freshly built escalation: the new order and its audit record.
#[derive(Debug, Clone, PartialEq)]
pub struct Escalation {
    /// The order addressed to the non-responsive recipients.
    pub message: Message,
    /// The audit entry to append to the log.
    pub record: EscalationRecord,
}

/// Decides when and how messages escalate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EscalationPolicy {
    default_threshold: u32,
}

impl Default for EscalationPolicy {
    fn default() -> Self {
        Self::new(5)
    }
}

impl EscalationPolicy {
    /// Create a policy. `default_threshold` is given to escalated orders.
    pub const fn new(default_threshold: u32) -> Self {
        Self { default_threshold }
    }

    /// Threshold applied to newly created messages.
    pub const fn default_threshold(&self) -> u32 {
        self.default_threshold
    }

    /// Whether `message` should escalate now.
    pub fn is_eligible(&self, message: &Message) -> bool {
        message.kind.is_escalatable()
            && message.nudge_count >= message.escalation_threshold
            && !non_responsive_recipients(message).is_empty()
    }

    /// Build an escalation for `message` if it is eligible.
    pub fn evaluate(
        &self,
        message: &Message,
        population: &Population,
        now: DateTime<Utc>,
    ) -> Option<Escalation> {
        if !self.is_eligible(message) {
            return None;
        }
        let non_responsive = non_responsive_recipients(message);

        let sender_name = population
            .get(&message.sender)
            .map_or(FALLBACK_SIGNATURE, |p| p.name.as_str());
        let priority = message.priority.saturating_add(1).min(MAX_PRIORITY);

        let escalated = Message {
            id: MessageId::new(),
            kind: MessageKind::Order,
            sender: message.sender.clone(),
            recipients: non_responsive.clone(),
            subject: format!("URGENT: {}", message.subject),
            content: directive_content(message, sender_name),
            priority,
            created_at: now,
            deadline: message.deadline,
            nudge_count: 0,
            escalation_threshold: self.default_threshold,
            escalated_from: Some(message.id),
            responses: Vec::new(),
        };

        let record = EscalationRecord {
            id: EscalationId::new(),
            at: now,
            original_message_id: message.id,
            escalated_message_id: escalated.id,
            sender: message.sender.clone(),
            non_responsive,
            nudge_count: message.nudge_count,
            threshold: message.escalation_threshold,
            original_kind: message.kind,
            escalated_kind: MessageKind::Order,
            priority_increase: priority.saturating_sub(message.priority),
        };

        warn!(
            original_message_id = %message.id,
            escalated_message_id = %escalated.id,
            sender = %message.sender,
            non_responsive = record.non_responsive.len(),
            nudge_count = message.nudge_count,
            threshold = message.escalation_threshold,
            "Message escalated to order"
        );

        Some(Escalation {
            message: escalated,
            record,
        })
    }

    /// Score how likely `message` is to escalate, using the sender's
    /// history in `log`. Returns `None` for kinds that never escalate.
    pub fn predict_risk(&self, message: &Message, log: &EscalationLog) -> Option<EscalationRisk> {
        if !message.kind.is_escalatable() {
            return None;
        }

        let nudge_progress = if message.escalation_threshold == 0 {
            1.0
        } else {
            (f64::from(message.nudge_count) / f64::from(message.escalation_threshold)).min(1.0)
        };
        let non_responsive_count = non_responsive_recipients(message).len();

        let mut score = 0.0;
        let mut factors = Vec::new();

        if nudge_progress > 0.6 {
            score += 0.3;
            factors.push(String::from("Approaching escalation threshold"));
        }

        if non_responsive_count > 0 && !message.recipients.is_empty() {
            score += 0.2 * ratio(non_responsive_count, message.recipients.len());
            factors.push(format!("{non_responsive_count} non-responsive recipients"));
        }

        if log.profile(&message.sender).high_escalation_tendency {
            score += 0.2;
            factors.push(String::from("Sender has high escalation tendency"));
        }

        if message.priority >= 4 {
            score += 0.1;
            factors.push(String::from("High priority message"));
        }

        Some(EscalationRisk {
            level: RiskLevel::from_score(score),
            score: (score * 100.0).round() / 100.0,
            nudge_progress,
            non_responsive_count,
            factors,
        })
    }
}

fn directive_content(original: &Message, sender_name: &str) -> String {
    format!(
        "This is a direct order following {count} previous communications on this matter.\n\n\
         ORIGINAL REQUEST: {subject}\n{body}\n\n\
         IMMEDIATE ACTION REQUIRED. Please confirm receipt and provide a detailed action plan \
         within 2 hours.\n\n- {sender_name}",
        count = original.nudge_count,
        subject = original.subject,
        body = original.content,
    )
}

#[allow(clippy::cast_precision_loss)]
fn ratio(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}

// ---------------------------------------------------------------------------
// Risk
// ---------------------------------------------------------------------------

/// Escalation likelihood for one message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EscalationRisk {
    /// Bucketed level.
    pub level: RiskLevel,
    /// Raw score, rounded to two decimals.
    pub score: f64,
    /// Nudge count divided by threshold, capped at 1.
    pub nudge_progress: f64,
    /// Recipients currently non-responsive.
    pub non_responsive_count: usize,
    /// Human-readable contributing factors.
    pub factors: Vec<String>,
}

// ---------------------------------------------------------------------------
// Log
// ---------------------------------------------------------------------------

/// Aggregate view over the escalation log.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EscalationMetrics {
    /// Escalations recorded.
    pub total_escalations: usize,
    /// Mean nudge count at escalation time.
    pub average_nudge_count: f64,
    /// Senders with the most escalations, highest first.
    pub top_senders: Vec<(PersonaId, usize)>,
    /// Personas most often non-responsive, highest first.
    pub top_non_responsive: Vec<(PersonaId, usize)>,
    /// Escalations per nudge round processed, as a fraction. Not the
    /// same figure as the per-message escalation rate in metrics reports.
    pub escalations_per_nudge: f64,
}

/// One persona's escalation history.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EscalationProfile {
    /// Escalations where the persona was the sender.
    pub escalations_sent: usize,
    /// Escalations where the persona was non-responsive.
    pub times_non_responsive: usize,
    /// Mean nudge count across the persona's sent escalations.
    pub average_nudges_before_escalation: f64,
    /// More than three escalations sent.
    pub high_escalation_tendency: bool,
    /// Non-responsive more than twice.
    pub low_responsiveness: bool,
}

/// Append-only audit log of escalations.
#[derive(Debug, Clone, Default)]
pub struct EscalationLog {
    records: Vec<EscalationRecord>,
}

impl EscalationLog {
    /// Create an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record.
    pub fn record(&mut self, record: EscalationRecord) {
        self.records.push(record);
    }

    /// All records, oldest first.
    pub fn records(&self) -> &[EscalationRecord] {
        &self.records
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the log is empty.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Aggregate metrics. `nudges_sent` is the number of escalatable
    /// messages sent so far.
    pub fn metrics(&self, nudges_sent: u64) -> EscalationMetrics {
        let mut senders: BTreeMap<&PersonaId, usize> = BTreeMap::new();
        let mut recipients: BTreeMap<&PersonaId, usize> = BTreeMap::new();
        let mut nudge_total: u64 = 0;
        for record in &self.records {
            let n = senders.entry(&record.sender).or_default();
            *n = n.saturating_add(1);
            for r in &record.non_responsive {
                let n = recipients.entry(r).or_default();
                *n = n.saturating_add(1);
            }
            nudge_total = nudge_total.saturating_add(u64::from(record.nudge_count));
        }

        #[allow(clippy::cast_precision_loss)]
        let average_nudge_count = if self.records.is_empty() {
            0.0
        } else {
            nudge_total as f64 / self.records.len() as f64
        };
        #[allow(clippy::cast_precision_loss)]
        let escalations_per_nudge = self.records.len() as f64 / nudges_sent.max(1) as f64;

        EscalationMetrics {
            total_escalations: self.records.len(),
            average_nudge_count,
            top_senders: top_n(senders),
            top_non_responsive: top_n(recipients),
            escalations_per_nudge,
        }
    }

    /// Escalation history of one persona.
    pub fn profile(&self, persona: &PersonaId) -> EscalationProfile {
        let sent: Vec<&EscalationRecord> = self
            .records
            .iter()
            .filter(|r| &r.sender == persona)
            .collect();
        let times_non_responsive = self
            .records
            .iter()
            .filter(|r| r.non_responsive.contains(persona))
            .count();
        let nudges: u64 = sent.iter().map(|r| u64::from(r.nudge_count)).sum();
        #[allow(clippy::cast_precision_loss)]
        let average = if sent.is_empty() {
            0.0
        } else {
            nudges as f64 / sent.len() as f64
        };
        EscalationProfile {
            escalations_sent: sent.len(),
            times_non_responsive,
            average_nudges_before_escalation: average,
            high_escalation_tendency: sent.len() > HIGH_TENDENCY_THRESHOLD,
            low_responsiveness: times_non_responsive > LOW_RESPONSIVENESS_THRESHOLD,
        }
    }
}

fn top_n(counts: BTreeMap<&PersonaId, usize>) -> Vec<(PersonaId, usize)> {
    let mut entries: Vec<(PersonaId, usize)> = counts
        .into_iter()
        .map(|(id, n)| (id.clone(), n))
        .collect();
    // Ties keep id order because the map iterates sorted and the sort is stable.
    entries.sort_by(|a, b| b.1.cmp(&a.1));
    entries.truncate(TOP_N);
    entries
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use catchball_types::ResponseId;

    fn message(kind: MessageKind, recipients: &[&str], nudge_count: u32, threshold: u32) -> Message {
        Message {
            id: MessageId::new(),
            kind,
            sender: PersonaId::from("boss"),
            recipients: recipients.iter().map(|r| PersonaId::from(*r)).collect(),
            subject: String::from("Quarterly goals"),
            content: String::from("Please update your goals."),
            priority: 3,
            created_at: Utc::now(),
            deadline: None,
            nudge_count,
            escalation_threshold: threshold,
            escalated_from: None,
            responses: Vec::new(),
        }
    }

    fn response(message: &Message, persona: &str, kind: ResponseKind, action_taken: bool) -> Response {
        Response {
            id: ResponseId::new(),
            message_id: message.id,
            persona_id: PersonaId::from(persona),
            kind,
            content: String::new(),
            sentiment: 0.0,
            confidence: 0.5,
            action_taken,
            estimated_completion: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn non_responsive_definition() {
        assert!(is_non_responsive(None));
        let msg = message(MessageKind::Nudge, &["a"], 0, 2);
        for (kind, taken, expected) in [
            (ResponseKind::Ignore, false, true),
            (ResponseKind::Escalate, false, true),
            (ResponseKind::TakeAction, false, true),
            (ResponseKind::TakeAction, true, false),
            (ResponseKind::SeekClarification, false, false),
            (ResponseKind::ProvideFeedback, false, false),
            (ResponseKind::Delegate, true, false),
        ] {
            let r = response(&msg, "a", kind, taken);
            assert_eq!(is_non_responsive(Some(&r)), expected, "{kind} taken={taken}");
        }
    }

    #[test]
    fn latest_response_wins() {
        let mut msg = message(MessageKind::Nudge, &["a"], 2, 2);
        msg.responses.push(response(&msg, "a", ResponseKind::Ignore, false));
        msg.responses.push(response(&msg, "a", ResponseKind::TakeAction, true));
        assert!(non_responsive_recipients(&msg).is_empty());
    }

    #[test]
    fn escalates_only_non_responsive_subset() {
        let policy = EscalationPolicy::new(5);
        let mut msg = message(MessageKind::Nudge, &["a", "b", "c"], 2, 2);
        msg.responses.push(response(&msg, "b", ResponseKind::TakeAction, true));
        msg.responses.push(response(&msg, "c", ResponseKind::Ignore, false));

        let escalation = policy
            .evaluate(&msg, &Population::new(), Utc::now())
            .unwrap();
        let order = &escalation.message;
        assert_eq!(order.kind, MessageKind::Order);
        assert_eq!(order.recipients, vec![PersonaId::from("a"), PersonaId::from("c")]);
        assert_eq!(order.priority, 4);
        assert_eq!(order.nudge_count, 0);
        assert_eq!(order.escalated_from, Some(msg.id));
        assert_eq!(order.subject, "URGENT: Quarterly goals");
        assert!(order.content.contains("following 2 previous communications"));
        assert!(order.content.contains("- Management"));

        let record = &escalation.record;
        assert_eq!(record.original_message_id, msg.id);
        assert_eq!(record.escalated_message_id, order.id);
        assert_eq!(record.nudge_count, 2);
        assert_eq!(record.priority_increase, 1);
        // The original is untouched.
        assert_eq!(msg.kind, MessageKind::Nudge);
    }

    #[test]
    fn below_threshold_or_wrong_kind_does_not_escalate() {
        let policy = EscalationPolicy::default();
        let population = Population::new();
        let below = message(MessageKind::Nudge, &["a"], 1, 2);
        assert!(policy.evaluate(&below, &population, Utc::now()).is_none());
        assert!(!policy.is_eligible(&below));

        let order = message(MessageKind::Order, &["a"], 9, 2);
        assert!(policy.evaluate(&order, &population, Utc::now()).is_none());

        let catchball = message(MessageKind::Catchball, &["a"], 9, 2);
        assert!(policy.evaluate(&catchball, &population, Utc::now()).is_none());
    }

    #[test]
    fn evaluate_agrees_with_eligibility() {
        let policy = EscalationPolicy::default();
        let population = Population::new();
        for kind in [
            MessageKind::Nudge,
            MessageKind::Recommendation,
            MessageKind::Order,
            MessageKind::WisdomRequest,
        ] {
            for nudge_count in 0..4 {
                let mut msg = message(kind, &["a", "b"], nudge_count, 2);
                if nudge_count == 3 {
                    msg.responses.push(response(&msg, "a", ResponseKind::TakeAction, true));
                    msg.responses.push(response(&msg, "b", ResponseKind::Delegate, true));
                }
                let escalated = policy.evaluate(&msg, &population, Utc::now()).is_some();
                assert_eq!(escalated, policy.is_eligible(&msg), "{kind} round {nudge_count}");
            }
        }
    }

    #[test]
    fn all_responsive_does_not_escalate() {
        let policy = EscalationPolicy::default();
        let mut msg = message(MessageKind::Recommendation, &["a"], 3, 2);
        msg.responses
            .push(response(&msg, "a", ResponseKind::SeekClarification, false));
        assert!(policy.evaluate(&msg, &Population::new(), Utc::now()).is_none());
    }

    #[test]
    fn priority_is_capped_at_five() {
        let policy = EscalationPolicy::default();
        let mut msg = message(MessageKind::Nudge, &["a"], 2, 2);
        msg.priority = 5;
        let escalation = policy.evaluate(&msg, &Population::new(), Utc::now()).unwrap();
        assert_eq!(escalation.message.priority, 5);
        assert_eq!(escalation.record.priority_increase, 0);
    }

    #[test]
    fn risk_prediction_buckets() {
        let policy = EscalationPolicy::default();
        let log = EscalationLog::new();

        let mut calm = message(MessageKind::Nudge, &["a"], 0, 5);
        calm.responses.push(response(&calm, "a", ResponseKind::TakeAction, true));
        let risk = policy.predict_risk(&calm, &log).unwrap();
        assert_eq!(risk.level, RiskLevel::Minimal);
        assert!(risk.factors.is_empty());

        let mut hot = message(MessageKind::Nudge, &["a", "b"], 4, 5);
        hot.priority = 4;
        let risk = policy.predict_risk(&hot, &log).unwrap();
        // 0.3 progress + 0.2 non-responsive + 0.1 priority
        assert!((risk.score - 0.6).abs() < 1e-9);
        assert_eq!(risk.level, RiskLevel::Medium);
        assert_eq!(risk.non_responsive_count, 2);

        let order = message(MessageKind::Order, &["a"], 0, 5);
        assert!(policy.predict_risk(&order, &log).is_none());
    }

    #[test]
    fn log_metrics_and_profiles() {
        let policy = EscalationPolicy::default();
        let population = Population::new();
        let mut log = EscalationLog::new();
        for _ in 0..4 {
            let msg = message(MessageKind::Nudge, &["a", "b"], 2, 2);
            let escalation = policy.evaluate(&msg, &population, Utc::now()).unwrap();
            log.record(escalation.record);
        }

        let metrics = log.metrics(8);
        assert_eq!(metrics.total_escalations, 4);
        assert!((metrics.average_nudge_count - 2.0).abs() < 1e-9);
        assert!((metrics.escalations_per_nudge - 0.5).abs() < 1e-9);
        assert_eq!(metrics.top_senders, vec![(PersonaId::from("boss"), 4)]);
        assert_eq!(
            metrics.top_non_responsive,
            vec![(PersonaId::from("a"), 4), (PersonaId::from("b"), 4)]
        );

        let boss = log.profile(&PersonaId::from("boss"));
        assert_eq!(boss.escalations_sent, 4);
        assert!(boss.high_escalation_tendency);
        let a = log.profile(&PersonaId::from("a"));
        assert_eq!(a.times_non_responsive, 4);
        assert!(a.low_responsiveness);

        let hot = message(MessageKind::Nudge, &["a"], 0, 5);
        let risk = policy.predict_risk(&hot, &log).unwrap();
        assert!(risk.factors.iter().any(|f| f.contains("escalation tendency")));
    }

    #[test]
    fn empty_log_metrics_are_zero() {
        let metrics = EscalationLog::new().metrics(0);
        assert_eq!(metrics.total_escalations, 0);
        assert!(metrics.average_nudge_count.abs() < f64::EPSILON);
        assert!(metrics.escalations_per_nudge.abs() < f64::EPSILON);
    }
}
