//! Organizational health metrics.
//!
//! The friction score blends three signals, each in `[0, 1]`:
//!
//! ```text
//! friction = min(1, 0.4 * average_stress + 0.4 * escalation_rate + 0.2 * non_response_rate)
//! ```

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use catchball_agents::Population;
use catchball_types::{DepartmentMetrics, MetricsReport};

const STRESS_WEIGHT: f64 = 0.4;
const ESCALATION_WEIGHT: f64 = 0.4;
const NON_RESPONSE_WEIGHT: f64 = 0.2;

/// Running communication counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Counters {
    /// Messages created, escalations included.
    pub messages_sent: u64,
    /// Processing rounds of nudges and recommendations, resends included.
    pub nudges_sent: u64,
    /// Recipient slots processed.
    pub deliveries: u64,
    /// Responses recorded, simulated or reported.
    pub responses: u64,
    /// Escalations performed.
    pub escalations: u64,
    /// Responses keyed by the responder's department.
    pub responses_by_department: BTreeMap<String, u64>,
}

impl Counters {
    /// Count one response from a persona in `department`.
    pub fn record_response(&mut self, department: &str) {
        self.responses = self.responses.saturating_add(1);
        let n = self
            .responses_by_department
            .entry(department.to_owned())
            .or_insert(0);
        *n = n.saturating_add(1);
    }
}

/// Weighted friction score in `[0, 1]`.
pub fn friction_score(average_stress: f64, escalation_rate: f64, non_response_rate: f64) -> f64 {
    NON_RESPONSE_WEIGHT
        .mul_add(
            non_response_rate,
            STRESS_WEIGHT.mul_add(average_stress, ESCALATION_WEIGHT * escalation_rate),
        )
        .clamp(0.0, 1.0)
}

/// Build a metrics report.
///
/// Rates are 0 when their denominator is 0, so an idle simulation reports
/// no non-response and no friction beyond stress.
pub fn compute(
    at: DateTime<Utc>,
    population: &Population,
    counters: &Counters,
    active_messages: usize,
    active_consultations: usize,
) -> MetricsReport {
    let response_rate = rate(counters.responses, counters.deliveries);
    let escalation_rate = rate(counters.escalations, counters.messages_sent);
    let non_response_rate = if counters.deliveries == 0 {
        0.0
    } else {
        1.0 - response_rate
    };
    let average_stress = mean(population.iter().map(|p| p.memory.stress_level));

    let mut grouped: BTreeMap<String, (Vec<f64>, Vec<f64>)> = BTreeMap::new();
    for persona in population.iter() {
        let (stress, workload) = grouped
            .entry(persona.profile.department.clone())
            .or_default();
        stress.push(persona.memory.stress_level);
        workload.push(persona.profile.workload_ratio());
    }
    let departments = grouped
        .into_iter()
        .map(|(department, (stress, workload))| {
            let responses = counters
                .responses_by_department
                .get(&department)
                .copied()
                .unwrap_or(0);
            let metrics = DepartmentMetrics {
                personas: stress.len(),
                average_stress: mean(stress.into_iter()),
                average_workload_ratio: mean(workload.into_iter()),
                responses,
            };
            (department, metrics)
        })
        .collect();

    MetricsReport {
        at,
        total_personas: population.len(),
        messages_sent: counters.messages_sent,
        deliveries: counters.deliveries,
        responses: counters.responses,
        escalations: counters.escalations,
        response_rate,
        escalation_rate,
        non_response_rate,
        compliance_rate: 1.0 - escalation_rate,
        average_stress,
        friction_score: friction_score(average_stress, escalation_rate, non_response_rate),
        active_messages,
        active_consultations,
        departments,
    }
}

#[allow(clippy::cast_precision_loss)]
fn rate(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        (part as f64 / whole as f64).clamp(0.0, 1.0)
    }
}

#[allow(clippy::cast_precision_loss)]
fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, n) = values.fold((0.0, 0_u64), |(s, n), v| (s + v, n.saturating_add(1)));
    if n == 0 { 0.0 } else { sum / n as f64 }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use catchball_agents::PersonaRecord;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn population() -> Population {
        let mut a = PersonaRecord::new("a", "Ada", "Engineering", "Engineer");
        a.stress_level = Some(0.2);
        a.current_workload = Some(0.5);
        a.workload_capacity = Some(1.0);
        let mut b = PersonaRecord::new("b", "Bo", "Engineering", "Engineer");
        b.stress_level = Some(0.4);
        b.current_workload = Some(1.0);
        b.workload_capacity = Some(1.0);
        let mut c = PersonaRecord::new("c", "Cy", "Sales", "Rep");
        c.stress_level = Some(0.6);
        let mut rng = StdRng::seed_from_u64(3);
        Population::ingest(&[a, b, c], Utc::now(), &mut rng).0
    }

    #[test]
    fn friction_is_clamped() {
        assert!((friction_score(1.0, 1.0, 1.0) - 1.0).abs() < 1e-9);
        assert!(friction_score(0.0, 0.0, 0.0).abs() < 1e-9);
        assert!((friction_score(0.5, 0.25, 0.5) - 0.4).abs() < 1e-9);
    }

    #[test]
    fn idle_simulation_reports_zero_rates() {
        let report = compute(Utc::now(), &Population::new(), &Counters::default(), 0, 0);
        assert!(report.response_rate.abs() < f64::EPSILON);
        assert!(report.non_response_rate.abs() < f64::EPSILON);
        assert!(report.friction_score.abs() < f64::EPSILON);
        assert!((report.compliance_rate - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn rates_and_departments() {
        let population = population();
        let mut counters = Counters {
            messages_sent: 4,
            nudges_sent: 2,
            deliveries: 8,
            escalations: 1,
            ..Counters::default()
        };
        for _ in 0..5 {
            counters.record_response("Engineering");
        }
        counters.record_response("Sales");

        let report = compute(Utc::now(), &population, &counters, 3, 1);
        assert_eq!(report.total_personas, 3);
        assert!((report.response_rate - 0.75).abs() < 1e-9);
        assert!((report.non_response_rate - 0.25).abs() < 1e-9);
        assert!((report.escalation_rate - 0.25).abs() < 1e-9);
        assert!((report.average_stress - 0.4).abs() < 1e-9);
        let expected = 0.2f64.mul_add(0.25, 0.4f64.mul_add(0.4, 0.4 * 0.25));
        assert!((report.friction_score - expected).abs() < 1e-9);

        let eng = &report.departments["Engineering"];
        assert_eq!(eng.personas, 2);
        assert_eq!(eng.responses, 5);
        assert!((eng.average_stress - 0.3).abs() < 1e-9);
        assert!((eng.average_workload_ratio - 0.75).abs() < 1e-9);
        assert_eq!(report.departments["Sales"].responses, 1);
    }
}
