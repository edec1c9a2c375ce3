//! Consensus and conflict analysis of catchball feedback.
//!
//! [`analyze`] turns one round of feedback into a [`WisdomReport`]. All
//! text classification is fixed, case-insensitive phrase and keyword
//! matching against the lexicons below. An empty round yields the default
//! (all-zero) report.

use std::collections::{BTreeMap, BTreeSet};

use catchball_types::{
    CatchballFeedback, ConfidenceBand, CrossDepartmentConflict, DepartmentInsight,
    FeedbackClassification, HesitationPattern, PriorityCategory, ResponseKind, Severity,
    WisdomRecommendations, WisdomReport,
};

/// Sentiment above which feedback counts as positive for consensus.
const POSITIVE_SENTIMENT: f64 = 0.3;

/// Sentiment below which feedback content is surfaced as a concern.
const CONCERN_SENTIMENT: f64 = 0.3;

/// Consensus below which leadership should step in.
const LOW_CONSENSUS: f64 = 0.4;

/// Share of conflicted feedback above which conflict is flagged.
const HIGH_CONFLICT_SHARE: f64 = 0.3;

/// Characters of feedback quoted in risks, opportunities and concerns.
const EXCERPT_CHARS: usize = 100;

/// Concerns kept per department.
const TOP_CONCERNS: usize = 3;

const HESITATION_PHRASES: [(HesitationPattern, [&str; 3]); 5] = [
    (
        HesitationPattern::Delayed,
        [
            "i'll need to think about this",
            "let me get back to you",
            "i need to consult",
        ],
    ),
    (
        HesitationPattern::Uncertain,
        [
            "i'm not sure",
            "this is challenging",
            "we might have some issues",
        ],
    ),
    (
        HesitationPattern::Conflicted,
        [
            "this conflicts with",
            "we have competing priorities",
            "this will impact",
        ],
    ),
    (
        HesitationPattern::Overwhelmed,
        [
            "we're already at capacity",
            "this is a lot to take on",
            "we're stretched thin",
        ],
    ),
    (
        HesitationPattern::Resistant,
        [
            "this doesn't align with",
            "we have different priorities",
            "this isn't feasible",
        ],
    ),
];

const PRIORITY_INDICATORS: [(PriorityCategory, [&str; 5]); 4] = [
    (
        PriorityCategory::Resource,
        ["budget", "headcount", "capacity", "resources", "funding"],
    ),
    (
        PriorityCategory::Timeline,
        ["deadline", "timeline", "schedule", "quarter", "timing"],
    ),
    (
        PriorityCategory::Approach,
        ["strategy", "method", "approach", "process", "methodology"],
    ),
    (
        PriorityCategory::Values,
        ["culture", "values", "principles", "ethics", "standards"],
    ),
];

const BOTTLENECK_TERMS: [&str; 4] = ["budget", "headcount", "capacity", "resources"];
const TIMELINE_CONFLICT_TERMS: [&str; 4] = ["deadline", "timeline", "schedule", "quarter"];
const APPROACH_CONFLICT_TERMS: [&str; 4] = ["strategy", "approach", "method", "process"];
const VALUES_CONFLICT_TERMS: [&str; 4] = ["culture", "values", "principles", "ethics"];
const RISK_TERMS: [&str; 5] = ["risk", "concern", "issue", "problem", "challenge"];
const OPPORTUNITY_TERMS: [&str; 4] = ["opportunity", "potential", "benefit", "advantage"];

/// All feedback gathered for one catchball round.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CatchballRound {
    /// Feedback entries, in arrival order.
    pub feedback: Vec<CatchballFeedback>,
    /// Personas asked per department. Departments missing here report a
    /// response rate of 1.
    pub invited_per_department: BTreeMap<String, u32>,
}

impl CatchballRound {
    /// Round with no invitation counts.
    pub fn new(feedback: Vec<CatchballFeedback>) -> Self {
        Self {
            feedback,
            invited_per_department: BTreeMap::new(),
        }
    }
}

/// Hesitation patterns found in `content`, each at most once.
pub fn hesitations(content: &str) -> Vec<HesitationPattern> {
    let text = content.to_lowercase();
    HESITATION_PHRASES
        .iter()
        .filter(|(_, phrases)| phrases.iter().any(|p| text.contains(p)))
        .map(|(pattern, _)| *pattern)
        .collect()
}

/// Priority indicator words found in `content`, grouped by category.
pub fn priority_indicators(content: &str) -> BTreeMap<PriorityCategory, Vec<&'static str>> {
    let text = content.to_lowercase();
    let mut found = BTreeMap::new();
    for (category, words) in &PRIORITY_INDICATORS {
        let hits: Vec<&'static str> = words.iter().copied().filter(|w| text.contains(w)).collect();
        if !hits.is_empty() {
            found.insert(*category, hits);
        }
    }
    found
}

/// Classify one piece of feedback.
pub fn classify(feedback: &CatchballFeedback) -> FeedbackClassification {
    FeedbackClassification {
        persona_id: feedback.persona_id.clone(),
        hesitations: hesitations(&feedback.content),
        confidence_band: ConfidenceBand::from_confidence(feedback.confidence),
        priority_terms: priority_terms(feedback).into_iter().collect(),
    }
}

/// Consensus score in `[0, 1]`: the mean of the positive-sentiment share
/// and the take-action share.
pub fn consensus_score(feedback: &[CatchballFeedback]) -> f64 {
    if feedback.is_empty() {
        return 0.0;
    }
    let positive = feedback
        .iter()
        .filter(|f| f.sentiment > POSITIVE_SENTIMENT)
        .count();
    let acting = feedback
        .iter()
        .filter(|f| f.response_kind == ResponseKind::TakeAction)
        .count();
    ratio(positive.saturating_add(acting), feedback.len().saturating_mul(2)).clamp(0.0, 1.0)
}

/// Analyse one catchball round.
pub fn analyze(round: &CatchballRound) -> WisdomReport {
    let feedback = &round.feedback;
    if feedback.is_empty() {
        return WisdomReport::default();
    }

    let classifications: Vec<FeedbackClassification> = feedback.iter().map(classify).collect();

    let mut hesitation_counts: BTreeMap<HesitationPattern, usize> = BTreeMap::new();
    let mut confidence_distribution: BTreeMap<ConfidenceBand, usize> = BTreeMap::new();
    for c in &classifications {
        for h in &c.hesitations {
            let n = hesitation_counts.entry(*h).or_insert(0);
            *n = n.saturating_add(1);
        }
        let n = confidence_distribution.entry(c.confidence_band).or_insert(0);
        *n = n.saturating_add(1);
    }

    let signals = extract_signals(feedback);
    let department_insights = department_insights(round);
    let cross_department_conflicts = cross_department_conflicts(feedback);
    let consensus = consensus_score(feedback);

    let conflicted = hesitation_counts
        .get(&HesitationPattern::Conflicted)
        .copied()
        .unwrap_or(0);
    let recommendations = recommend(consensus, ratio(conflicted, feedback.len()), &signals);

    WisdomReport {
        feedback_count: feedback.len(),
        mean_response_delay_hours: mean(feedback.iter().map(|f| f.response_delay_hours)),
        hesitation_counts,
        confidence_distribution,
        classifications,
        conflicts: signals.conflicts,
        bottlenecks: signals.bottlenecks,
        risks: signals.risks,
        opportunities: signals.opportunities,
        department_insights,
        cross_department_conflicts,
        consensus_score: consensus,
        recommendations,
    }
}

#[derive(Debug, Default)]
struct Signals {
    conflicts: Vec<String>,
    bottlenecks: Vec<String>,
    risks: Vec<String>,
    opportunities: Vec<String>,
}

fn extract_signals(feedback: &[CatchballFeedback]) -> Signals {
    let mut signals = Signals::default();
    for f in feedback {
        let text = f.content.to_lowercase();
        let dept = &f.department;

        if mentions_any(&text, &BOTTLENECK_TERMS) {
            push_unique(&mut signals.bottlenecks, format!("Resource constraint in {dept}"));
        }
        if mentions_any(&text, &TIMELINE_CONFLICT_TERMS) {
            push_unique(&mut signals.conflicts, format!("Timeline conflict in {dept}"));
        }
        if mentions_any(&text, &APPROACH_CONFLICT_TERMS) {
            push_unique(&mut signals.conflicts, format!("Approach conflict in {dept}"));
        }
        if mentions_any(&text, &VALUES_CONFLICT_TERMS) {
            push_unique(&mut signals.conflicts, format!("Values conflict in {dept}"));
        }
        if mentions_any(&text, &RISK_TERMS) {
            signals.risks.push(format!(
                "Risk identified by {dept}: {}",
                excerpt(&f.content)
            ));
        }
        if mentions_any(&text, &OPPORTUNITY_TERMS) {
            signals.opportunities.push(format!(
                "Opportunity identified by {dept}: {}",
                excerpt(&f.content)
            ));
        }
    }
    signals
}

fn department_insights(round: &CatchballRound) -> BTreeMap<String, DepartmentInsight> {
    let mut by_department: BTreeMap<&str, Vec<&CatchballFeedback>> = BTreeMap::new();
    for f in &round.feedback {
        by_department.entry(f.department.as_str()).or_default().push(f);
    }

    by_department
        .into_iter()
        .map(|(dept, entries)| {
            let n = entries.len();
            let response_rate = match round.invited_per_department.get(dept) {
                Some(&invited) if invited > 0 => {
                    ratio(n, usize::try_from(invited).map_or(n, |i| i.max(n)))
                }
                _ => 1.0,
            };
            let top_concerns = entries
                .iter()
                .filter(|f| f.sentiment < CONCERN_SENTIMENT)
                .take(TOP_CONCERNS)
                .map(|f| excerpt(&f.content))
                .collect();
            let insight = DepartmentInsight {
                feedback_count: n,
                response_rate,
                mean_confidence: mean(entries.iter().map(|f| f.confidence)),
                mean_sentiment: mean(entries.iter().map(|f| f.sentiment)),
                mean_commitment: mean(entries.iter().map(|f| f.commitment)),
                top_concerns,
            };
            (dept.to_owned(), insight)
        })
        .collect()
}

fn cross_department_conflicts(feedback: &[CatchballFeedback]) -> Vec<CrossDepartmentConflict> {
    let mut terms: BTreeMap<&str, BTreeSet<String>> = BTreeMap::new();
    for f in feedback {
        terms
            .entry(f.department.as_str())
            .or_default()
            .extend(priority_terms(f));
    }

    let departments: Vec<(&str, BTreeSet<String>)> = terms.into_iter().collect();
    let mut conflicts = Vec::new();
    for (i, (first, first_terms)) in departments.iter().enumerate() {
        for (second, second_terms) in departments.iter().skip(i.saturating_add(1)) {
            let shared: Vec<String> = first_terms.intersection(second_terms).cloned().collect();
            if !shared.is_empty() {
                conflicts.push(CrossDepartmentConflict {
                    first_department: (*first).to_owned(),
                    second_department: (*second).to_owned(),
                    shared_priorities: shared,
                    severity: Severity::Medium,
                });
            }
        }
    }
    conflicts
}

fn recommend(consensus: f64, conflicted_share: f64, signals: &Signals) -> WisdomRecommendations {
    let mut recs = WisdomRecommendations::default();

    if consensus < LOW_CONSENSUS {
        recs.escalation_triggers
            .push(String::from("Low consensus detected - consider executive intervention"));
        recs.catchball_suggestions
            .push(String::from("Schedule executive alignment meeting"));
    }
    if conflicted_share > HIGH_CONFLICT_SHARE {
        recs.escalation_triggers
            .push(String::from("High conflict level detected"));
        recs.catchball_suggestions
            .push(String::from("Address competing priorities before proceeding"));
    }
    if !signals.bottlenecks.is_empty() {
        recs.immediate_actions
            .push(String::from("Address resource constraints before implementation"));
    }
    if !signals.risks.is_empty() {
        recs.immediate_actions
            .push(String::from("Develop risk mitigation strategies"));
    }
    if !signals.opportunities.is_empty() {
        recs.immediate_actions
            .push(String::from("Capture identified opportunities"));
    }
    recs
}

/// Indicator words in the text plus explicitly mentioned priorities,
/// lowercased.
fn priority_terms(feedback: &CatchballFeedback) -> BTreeSet<String> {
    let mut terms: BTreeSet<String> = priority_indicators(&feedback.content)
        .into_values()
        .flatten()
        .map(str::to_owned)
        .collect();
    terms.extend(
        feedback
            .priorities_mentioned
            .iter()
            .map(|p| p.trim().to_lowercase())
            .filter(|p| !p.is_empty()),
    );
    terms
}

fn mentions_any(text: &str, words: &[&str]) -> bool {
    words.iter().any(|w| text.contains(w))
}

fn push_unique(list: &mut Vec<String>, item: String) {
    if !list.contains(&item) {
        list.push(item);
    }
}

fn excerpt(content: &str) -> String {
    content.chars().take(EXCERPT_CHARS).collect()
}

#[allow(clippy::cast_precision_loss)]
fn ratio(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}

#[allow(clippy::cast_precision_loss)]
fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, n) = values.fold((0.0, 0_usize), |(s, n), v| (s + v, n.saturating_add(1)));
    if n == 0 { 0.0 } else { sum / n as f64 }
}
