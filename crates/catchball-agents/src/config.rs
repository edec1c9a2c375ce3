//! Tunable parameters for persona behaviour.
//!
//! [`BehaviorConfig`] bundles the response gate probabilities, the
//! response-kind weight table and the interaction-history bound. It is
//! deserialized from the `behavior` section of the simulation YAML; every
//! field has a default so partial files work.
//!
//! # Response weight table
//!
//! For each message kind the table lists one row per response kind. The
//! unnormalized weight of a row is
//!
//! ```text
//! max(0, base + authority * authority_response + workload * workload_sensitivity)
//! ```
//!
//! where `authority_response` and `workload_sensitivity` are the
//! responder's traits. Contextual adjustments are applied afterwards and
//! the distribution is renormalized. Rows are evaluated in response-kind
//! declaration order, which keeps sampling deterministic for a given seed.
//!
//! | message kind     | take_action   | clarify       | feedback | ignore        | escalate | delegate |
//! |------------------|---------------|---------------|----------|---------------|----------|----------|
//! | `order`          | 0.70 + 0.25a  | 0.20 - 0.10a  | 0.02     | 0.10 - 0.05a  | 0.03     | 0.03     |
//! | `nudge`          | 0.30 + 0.20a  | 0.30          | 0.05     | 0.40 + 0.30w  | 0.02     | 0.03     |
//! | `recommendation` | 0.50 + 0.20a  | 0.30          | 0.10     | 0.20 + 0.20w  | 0.03     | 0.05     |
//! | `catchball`      | 0.15 + 0.10a  | 0.20          | 0.50     | 0.10 + 0.10w  | 0.02     | 0.03     |
//! | `wisdom_request` | 0.15 + 0.10a  | 0.20          | 0.50     | 0.10 + 0.10w  | 0.02     | 0.03     |

use std::collections::BTreeMap;

use catchball_types::{MessageKind, PersonalityProfile, ResponseKind};
use serde::Deserialize;

/// Behaviour configuration for the response decision engine.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BehaviorConfig {
    /// Probabilities deciding whether a persona responds at all.
    #[serde(default)]
    pub gate: GateConfig,

    /// Base response-kind weights per message kind.
    #[serde(default = "default_weights")]
    pub weights: ResponseWeightTable,

    /// Maximum interactions kept in a persona's history.
    #[serde(default = "default_interaction_history_limit")]
    pub interaction_history_limit: usize,
}

impl Default for BehaviorConfig {
    fn default() -> Self {
        Self {
            gate: GateConfig::default(),
            weights: default_weights(),
            interaction_history_limit: default_interaction_history_limit(),
        }
    }
}

/// Response gate probabilities.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GateConfig {
    /// Probability of answering an order, whatever the persona's state.
    #[serde(default = "default_order_probability")]
    pub order_probability: f64,

    /// Probability of answering while overwhelmed.
    #[serde(default = "default_overwhelmed_probability")]
    pub overwhelmed_probability: f64,

    /// Probability of answering while busy or in a meeting.
    #[serde(default = "default_busy_probability")]
    pub busy_probability: f64,

    /// Priority at which busy personas answer as if available.
    #[serde(default = "default_busy_priority_override")]
    pub busy_priority_override: u8,

    /// Base probability for available personas.
    #[serde(default = "default_base_probability")]
    pub base_probability: f64,

    /// Added probability per unit of `authority_response`.
    #[serde(default = "default_authority_weight")]
    pub authority_weight: f64,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            order_probability: default_order_probability(),
            overwhelmed_probability: default_overwhelmed_probability(),
            busy_probability: default_busy_probability(),
            busy_priority_override: default_busy_priority_override(),
            base_probability: default_base_probability(),
            authority_weight: default_authority_weight(),
        }
    }
}

/// One row of the response weight table.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct WeightEntry {
    /// Response kind this row weighs.
    pub kind: ResponseKind,
    /// Constant part of the weight.
    pub base: f64,
    /// Coefficient on the `authority_response` trait.
    #[serde(default)]
    pub authority: f64,
    /// Coefficient on the `workload_sensitivity` trait.
    #[serde(default)]
    pub workload: f64,
}

impl WeightEntry {
    const fn new(kind: ResponseKind, base: f64, authority: f64, workload: f64) -> Self {
        Self {
            kind,
            base,
            authority,
            workload,
        }
    }

    /// Unnormalized weight of this row for the given personality.
    pub fn weight_for(&self, personality: &PersonalityProfile) -> f64 {
        let w = self.authority.mul_add(
            personality.authority_response,
            self.workload
                .mul_add(personality.workload_sensitivity, self.base),
        );
        w.max(0.0)
    }
}

/// Base response-kind weights keyed by message kind.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct ResponseWeightTable {
    rows: BTreeMap<MessageKind, Vec<WeightEntry>>,
}

impl ResponseWeightTable {
    /// Build a table from explicit rows.
    pub const fn new(rows: BTreeMap<MessageKind, Vec<WeightEntry>>) -> Self {
        Self { rows }
    }

    /// Rows for a message kind; empty when the kind is not configured.
    pub fn rows(&self, kind: MessageKind) -> &[WeightEntry] {
        self.rows.get(&kind).map_or(&[], Vec::as_slice)
    }
}

impl Default for ResponseWeightTable {
    fn default() -> Self {
        default_weights()
    }
}

fn default_weights() -> ResponseWeightTable {
    use ResponseKind::{Delegate, Escalate, Ignore, ProvideFeedback, SeekClarification, TakeAction};

    let feedback_rows = vec![
        WeightEntry::new(TakeAction, 0.15, 0.10, 0.0),
        WeightEntry::new(SeekClarification, 0.20, 0.0, 0.0),
        WeightEntry::new(ProvideFeedback, 0.50, 0.0, 0.0),
        WeightEntry::new(Ignore, 0.10, 0.0, 0.10),
        WeightEntry::new(Escalate, 0.02, 0.0, 0.0),
        WeightEntry::new(Delegate, 0.03, 0.0, 0.0),
    ];

    let mut rows = BTreeMap::new();
    rows.insert(
        MessageKind::Order,
        vec![
            WeightEntry::new(TakeAction, 0.70, 0.25, 0.0),
            WeightEntry::new(SeekClarification, 0.20, -0.10, 0.0),
            WeightEntry::new(ProvideFeedback, 0.02, 0.0, 0.0),
            WeightEntry::new(Ignore, 0.10, -0.05, 0.0),
            WeightEntry::new(Escalate, 0.03, 0.0, 0.0),
            WeightEntry::new(Delegate, 0.03, 0.0, 0.0),
        ],
    );
    rows.insert(
        MessageKind::Nudge,
        vec![
            WeightEntry::new(TakeAction, 0.30, 0.20, 0.0),
            WeightEntry::new(SeekClarification, 0.30, 0.0, 0.0),
            WeightEntry::new(ProvideFeedback, 0.05, 0.0, 0.0),
            WeightEntry::new(Ignore, 0.40, 0.0, 0.30),
            WeightEntry::new(Escalate, 0.02, 0.0, 0.0),
            WeightEntry::new(Delegate, 0.03, 0.0, 0.0),
        ],
    );
    rows.insert(
        MessageKind::Recommendation,
        vec![
            WeightEntry::new(TakeAction, 0.50, 0.20, 0.0),
            WeightEntry::new(SeekClarification, 0.30, 0.0, 0.0),
            WeightEntry::new(ProvideFeedback, 0.10, 0.0, 0.0),
            WeightEntry::new(Ignore, 0.20, 0.0, 0.20),
            WeightEntry::new(Escalate, 0.03, 0.0, 0.0),
            WeightEntry::new(Delegate, 0.05, 0.0, 0.0),
        ],
    );
    rows.insert(MessageKind::Catchball, feedback_rows.clone());
    rows.insert(MessageKind::WisdomRequest, feedback_rows);
    ResponseWeightTable::new(rows)
}

const fn default_order_probability() -> f64 {
    0.95
}

const fn default_overwhelmed_probability() -> f64 {
    0.3
}

const fn default_busy_probability() -> f64 {
    0.6
}

const fn default_busy_priority_override() -> u8 {
    4
}

const fn default_base_probability() -> f64 {
    0.5
}

const fn default_authority_weight() -> f64 {
    0.3
}

const fn default_interaction_history_limit() -> usize {
    100
}
