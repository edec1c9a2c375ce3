//! Derived outputs: wisdom reports and metrics reports.
//!
//! These are recomputed on demand and never mutated after construction.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::enums::{ConfidenceBand, HesitationPattern, Severity};
use crate::ids::PersonaId;

// ---------------------------------------------------------------------------
// Wisdom
// ---------------------------------------------------------------------------

/// How one piece of feedback was classified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackClassification {
    /// Author of the feedback.
    pub persona_id: PersonaId,
    /// Hesitation patterns found in the text.
    pub hesitations: Vec<HesitationPattern>,
    /// Confidence bucket.
    pub confidence_band: ConfidenceBand,
    /// Priority terms found in the text or explicitly mentioned.
    pub priority_terms: Vec<String>,
}

/// Aggregated view of one department's feedback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepartmentInsight {
    /// Number of feedback entries.
    pub feedback_count: usize,
    /// Feedback received divided by personas invited.
    pub response_rate: f64,
    /// Mean confidence.
    pub mean_confidence: f64,
    /// Mean sentiment.
    pub mean_sentiment: f64,
    /// Mean commitment.
    pub mean_commitment: f64,
    /// Up to three concerns taken from negative feedback.
    pub top_concerns: Vec<String>,
}

/// Two departments naming the same priorities.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrossDepartmentConflict {
    /// First department (alphabetical).
    pub first_department: String,
    /// Second department (alphabetical).
    pub second_department: String,
    /// Priority terms both departments mentioned.
    pub shared_priorities: Vec<String>,
    /// Severity of the conflict.
    pub severity: Severity,
}

/// Fixed-rule recommendations derived from a wisdom report.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WisdomRecommendations {
    /// Actions to take before implementation.
    pub immediate_actions: Vec<String>,
    /// Conditions that call for leadership intervention.
    pub escalation_triggers: Vec<String>,
    /// Suggestions for the next catchball round.
    pub catchball_suggestions: Vec<String>,
}

/// Result of analysing one catchball round.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WisdomReport {
    /// Number of feedback entries analysed.
    pub feedback_count: usize,
    /// Mean response delay in hours.
    pub mean_response_delay_hours: f64,
    /// Feedback count per hesitation pattern.
    pub hesitation_counts: BTreeMap<HesitationPattern, usize>,
    /// Feedback count per confidence band.
    pub confidence_distribution: BTreeMap<ConfidenceBand, usize>,
    /// Per-feedback classification, in input order.
    pub classifications: Vec<FeedbackClassification>,
    /// Candidate conflicts.
    pub conflicts: Vec<String>,
    /// Candidate bottlenecks.
    pub bottlenecks: Vec<String>,
    /// Candidate risks.
    pub risks: Vec<String>,
    /// Candidate opportunities.
    pub opportunities: Vec<String>,
    /// Insights keyed by department.
    pub department_insights: BTreeMap<String, DepartmentInsight>,
    /// Department pairs with overlapping priorities.
    pub cross_department_conflicts: Vec<CrossDepartmentConflict>,
    /// Consensus score in `[0, 1]`.
    pub consensus_score: f64,
    /// Recommended follow-ups.
    pub recommendations: WisdomRecommendations,
}

// ---------------------------------------------------------------------------
// Metrics
// ---------------------------------------------------------------------------

/// Per-department slice of a metrics report.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DepartmentMetrics {
    /// Personas in the department.
    pub personas: usize,
    /// Mean stress level.
    pub average_stress: f64,
    /// Mean workload ratio.
    pub average_workload_ratio: f64,
    /// Responses given by the department.
    pub responses: u64,
}

/// Flat snapshot of organizational health.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsReport {
    /// Simulated time of the snapshot.
    pub at: DateTime<Utc>,
    /// Personas in the population.
    pub total_personas: usize,
    /// Messages sent, escalations included.
    pub messages_sent: u64,
    /// Recipient slots processed.
    pub deliveries: u64,
    /// Responses recorded.
    pub responses: u64,
    /// Escalations performed.
    pub escalations: u64,
    /// Responses per delivery, in `[0, 1]`.
    pub response_rate: f64,
    /// Escalations per message sent, in `[0, 1]`.
    pub escalation_rate: f64,
    /// `1 - response_rate`, or 0 before any delivery.
    pub non_response_rate: f64,
    /// `1 - escalation_rate`.
    pub compliance_rate: f64,
    /// Mean stress across the population.
    pub average_stress: f64,
    /// Weighted blend of stress, escalation and non-response, in `[0, 1]`.
    pub friction_score: f64,
    /// Messages still retained.
    pub active_messages: usize,
    /// Consultations still open.
    pub active_consultations: usize,
    /// Breakdown keyed by department.
    pub departments: BTreeMap<String, DepartmentMetrics>,
}
