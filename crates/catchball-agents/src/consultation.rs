//! Feedback generation for consultation participants.
//!
//! A consultation asks invited personas for input on a proposed change.
//! Each invitee participates with a fixed probability; participants whose
//! expertise appears in the proposal answer with higher confidence.

use chrono::{DateTime, Utc};
use rand::Rng;

use catchball_types::{
    CatchballFeedback, Consultation, ConsultationFeedback, Persona, ResponseKind,
};

/// Risk tolerance below which participants voice operational concerns.
const CAUTIOUS_RISK_TOLERANCE: f64 = 0.4;

/// Roll whether an invitee takes part.
pub fn participates(participation_probability: f64, rng: &mut impl Rng) -> bool {
    rng.random::<f64>() < participation_probability.clamp(0.0, 1.0)
}

/// Generate one participant's feedback on `consultation`.
pub fn generate_feedback(
    persona: &Persona,
    consultation: &Consultation,
    rng: &mut impl Rng,
    now: DateTime<Utc>,
) -> ConsultationFeedback {
    let proposal = consultation.proposed_change.to_lowercase();
    let relevant = persona.profile.expertise.iter().find(|area| {
        let spaced = area.replace('_', " ");
        proposal.contains(area.as_str()) || proposal.contains(&spaced)
    });

    let (confidence, sentiment, mut content) = match relevant {
        Some(area) => (
            rng.random_range(0.6..0.9),
            rng.random_range(0.2..0.8),
            format!(
                "Based on my {} experience, I think this change could deliver a real benefit.",
                area.replace('_', " ")
            ),
        ),
        None => (
            rng.random_range(0.3..0.6),
            rng.random_range(0.0..0.6),
            String::from(
                "From my perspective, this proposed change might work if it is sequenced carefully.",
            ),
        ),
    };

    let mut concerns = Vec::new();
    if persona.personality.risk_tolerance < CAUTIOUS_RISK_TOLERANCE {
        concerns.push(String::from("Potential risks to current operations"));
        concerns.push(String::from("Need for thorough testing before implementation"));
    }

    let department = persona.profile.department.to_lowercase();
    let suggestions = if department.contains("engineering") {
        vec![
            String::from("Consider technical implementation challenges"),
            String::from("Ensure proper testing and rollback procedures"),
        ]
    } else if department.contains("sales") {
        vec![
            String::from("Assess customer impact and communication strategy"),
            String::from("Consider timing with sales cycles"),
        ]
    } else {
        Vec::new()
    };

    if !concerns.is_empty() {
        content.push_str(" My concern: ");
        content.push_str(&concerns.join("; ").to_lowercase());
        content.push('.');
    }

    ConsultationFeedback {
        persona_id: persona.id.clone(),
        department: persona.profile.department.clone(),
        role: persona.profile.role.clone(),
        content,
        sentiment,
        confidence,
        concerns,
        suggestions,
        submitted_at: now,
    }
}

/// Convert consultation feedback into analyzer input.
///
/// Commitment is the confidence scaled by how positive the sentiment is.
pub fn to_catchball_feedback(
    feedback: &ConsultationFeedback,
    requested_at: DateTime<Utc>,
) -> CatchballFeedback {
    let delay = feedback.submitted_at.signed_duration_since(requested_at);
    let delay_hours = delay_hours(delay);
    let positivity = (feedback.sentiment.clamp(-1.0, 1.0) + 1.0) / 2.0;
    CatchballFeedback {
        persona_id: feedback.persona_id.clone(),
        department: feedback.department.clone(),
        role: feedback.role.clone(),
        content: feedback.content.clone(),
        response_kind: ResponseKind::ProvideFeedback,
        response_delay_hours: delay_hours,
        confidence: feedback.confidence,
        sentiment: feedback.sentiment,
        commitment: (positivity * feedback.confidence).clamp(0.0, 1.0),
        priorities_mentioned: Vec::new(),
    }
}

/// Non-negative hours in a time delta.
#[allow(clippy::cast_precision_loss)]
pub fn delay_hours(delay: chrono::TimeDelta) -> f64 {
    (delay.num_seconds() as f64 / 3600.0).max(0.0)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use catchball_types::{
        ConsultationId, ConsultationStatus, PersonaId, PersonaMemory, PersonaState,
        PersonalityProfile, ProfessionalProfile,
    };
    use chrono::TimeDelta;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn persona(department: &str, risk: f64, expertise: &[&str]) -> Persona {
        let mut personality = PersonalityProfile::uniform(0.5);
        personality.risk_tolerance = risk;
        Persona {
            id: PersonaId::from("p"),
            name: String::from("P"),
            email: None,
            personality,
            profile: ProfessionalProfile {
                department: department.to_owned(),
                role: String::from("Engineer"),
                seniority: 1,
                workload_capacity: 1.0,
                current_workload: 0.5,
                manager: None,
                direct_reports: Vec::new(),
                expertise: expertise.iter().map(|e| (*e).to_owned()).collect(),
            },
            memory: PersonaMemory::new(0.2, Utc::now()),
            state: PersonaState::Available,
        }
    }

    fn consultation(change: &str) -> Consultation {
        Consultation {
            id: ConsultationId::new(),
            requester: PersonaId::from("ceo"),
            title: String::from("Platform migration"),
            description: String::from("Move to the new platform"),
            proposed_change: change.to_owned(),
            invited: vec![PersonaId::from("p")],
            deadline: None,
            created_at: Utc::now(),
            status: ConsultationStatus::Open,
            feedback: Vec::new(),
        }
    }

    #[test]
    fn matching_expertise_raises_confidence() {
        let p = persona("Engineering", 0.8, &["system_architecture"]);
        let c = consultation("Rework the system architecture of billing");
        let mut rng = StdRng::seed_from_u64(9);
        let fb = generate_feedback(&p, &c, &mut rng, Utc::now());
        assert!(fb.confidence >= 0.6);
        assert!(fb.content.contains("system architecture"));
        assert_eq!(fb.suggestions.len(), 2);
        assert!(fb.concerns.is_empty());
    }

    #[test]
    fn cautious_personas_raise_concerns() {
        let p = persona("Finance", 0.2, &[]);
        let c = consultation("Adopt a four-day week");
        let mut rng = StdRng::seed_from_u64(9);
        let fb = generate_feedback(&p, &c, &mut rng, Utc::now());
        assert!(fb.confidence < 0.6);
        assert_eq!(fb.concerns.len(), 2);
        assert!(fb.content.contains("risks"));
        assert!(fb.suggestions.is_empty());
    }

    #[test]
    fn participation_extremes() {
        let mut rng = StdRng::seed_from_u64(1);
        assert!(!participates(0.0, &mut rng));
        assert!(participates(1.0, &mut rng));
    }

    #[test]
    fn conversion_computes_delay_and_commitment() {
        let requested = Utc::now();
        let fb = ConsultationFeedback {
            persona_id: PersonaId::from("p"),
            department: String::from("Sales"),
            role: String::from("Rep"),
            content: String::from("Looks good"),
            sentiment: 1.0,
            confidence: 0.8,
            concerns: Vec::new(),
            suggestions: Vec::new(),
            submitted_at: requested + TimeDelta::hours(3),
        };
        let converted = to_catchball_feedback(&fb, requested);
        assert!((converted.response_delay_hours - 3.0).abs() < 1e-9);
        assert!((converted.commitment - 0.8).abs() < 1e-9);
        assert_eq!(converted.response_kind, ResponseKind::ProvideFeedback);
    }
}
