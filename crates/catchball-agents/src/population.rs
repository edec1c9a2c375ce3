//! Population ingestion: record validation, the persona factory and the
//! [`Population`] container.
//!
//! Records come from an external adapter (organization file, HR export,
//! test fixture). Each record is validated on its own; a malformed record
//! yields a [`ValidationError`] naming the field, and the rest of the batch
//! is still ingested. Values the record leaves out are derived:
//!
//! - seniority from the role title,
//! - workload capacity from seniority,
//! - personality from a role/department archetype with random variation
//!   (only when the record supplies no traits at all; a partial trait map is
//!   completed with neutral values instead),
//! - initial workload, stress and availability from seeded randomness,
//! - relationship strengths from reporting lines and department membership.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use catchball_types::{
    Persona, PersonaId, PersonaMemory, PersonaState, PersonalityProfile, PersonalityTrait,
    ProfessionalProfile,
};

use crate::error::{AgentError, ValidationError};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Lowest seniority level.
pub const MIN_SENIORITY: u8 = 1;

/// Highest seniority level.
pub const MAX_SENIORITY: u8 = 5;

/// Workload ceiling as a multiple of capacity.
pub const WORKLOAD_CEILING: f64 = 1.2;

/// Maximum derived workload capacity.
const MAX_DERIVED_CAPACITY: f64 = 1.5;

/// Half-width of the random variation applied to archetype traits.
const TRAIT_VARIATION: f64 = 0.2;

/// Half-width of the random noise applied to initial relationships.
const RELATIONSHIP_NOISE: f64 = 0.2;

/// Initial availability distribution for records without a state.
const INITIAL_STATES: [(PersonaState, f64); 4] = [
    (PersonaState::Available, 0.6),
    (PersonaState::Busy, 0.3),
    (PersonaState::InMeeting, 0.08),
    (PersonaState::Overwhelmed, 0.02),
];

/// Role/department archetypes, matched case-insensitively against the role
/// first and the department second. Trait order follows
/// [`PersonalityTrait::ALL`].
const ARCHETYPES: [(&str, [f64; 6]); 9] = [
    ("ceo", [0.8, 0.3, 0.9, 0.9, 0.2, 0.7]),
    ("vp", [0.7, 0.6, 0.8, 0.8, 0.3, 0.8]),
    ("director", [0.6, 0.7, 0.7, 0.7, 0.4, 0.8]),
    ("manager", [0.5, 0.8, 0.6, 0.6, 0.5, 0.7]),
    ("engineer", [0.4, 0.6, 0.4, 0.7, 0.6, 0.6]),
    ("sales", [0.7, 0.7, 0.8, 0.8, 0.4, 0.9]),
    ("hr", [0.3, 0.8, 0.3, 0.6, 0.5, 0.9]),
    ("operations", [0.2, 0.9, 0.5, 0.4, 0.6, 0.6]),
    ("marketing", [0.6, 0.7, 0.7, 0.8, 0.5, 0.8]),
];

/// Default expertise per department.
const DEPARTMENT_EXPERTISE: [(&str, [&str; 4]); 7] = [
    (
        "engineering",
        ["software_development", "system_architecture", "technical_design", "code_review"],
    ),
    (
        "sales",
        ["customer_relations", "negotiation", "market_analysis", "revenue_optimization"],
    ),
    (
        "marketing",
        ["brand_management", "content_creation", "market_research", "campaign_management"],
    ),
    (
        "hr",
        ["talent_acquisition", "employee_relations", "policy_development", "performance_management"],
    ),
    (
        "operations",
        ["process_optimization", "resource_management", "quality_assurance", "logistics"],
    ),
    (
        "it",
        ["infrastructure", "security", "data_management", "technical_support"],
    ),
    (
        "finance",
        ["financial_analysis", "budgeting", "risk_assessment", "compliance"],
    ),
];

// ---------------------------------------------------------------------------
// PersonaRecord
// ---------------------------------------------------------------------------

/// A persona as supplied by an ingestion adapter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersonaRecord {
    /// Caller-chosen unique key.
    pub id: String,
    /// Display name. Derived from `email` when blank.
    #[serde(default)]
    pub name: String,
    /// Contact address.
    #[serde(default)]
    pub email: Option<String>,
    /// Department name.
    pub department: String,
    /// Role title.
    pub role: String,
    /// Seniority 1-5; inferred from the role when absent.
    #[serde(default)]
    pub seniority: Option<i64>,
    /// Trait values keyed by `snake_case` trait name.
    #[serde(default)]
    pub traits: BTreeMap<String, f64>,
    /// Manager's record id.
    #[serde(default)]
    pub manager_id: Option<String>,
    /// Direct reports' record ids.
    #[serde(default)]
    pub direct_reports: Vec<String>,
    /// Workload capacity; derived from seniority when absent.
    #[serde(default)]
    pub workload_capacity: Option<f64>,
    /// Current workload; random when absent.
    #[serde(default)]
    pub current_workload: Option<f64>,
    /// Stress level; random when absent.
    #[serde(default)]
    pub stress_level: Option<f64>,
    /// Expertise areas; department defaults when empty.
    #[serde(default)]
    pub expertise: Vec<String>,
    /// Availability; sampled when absent.
    #[serde(default)]
    pub state: Option<PersonaState>,
}

impl PersonaRecord {
    /// Minimal record with the required fields set.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        department: impl Into<String>,
        role: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            department: department.into(),
            role: role.into(),
            ..Self::default()
        }
    }

    /// Check every field, returning the first problem found.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] naming the rejected field.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let id = self.id.as_str();
        if id.trim().is_empty() {
            return Err(ValidationError::new(id, "id", "must not be blank"));
        }
        if self.name.trim().is_empty() && self.email.as_deref().is_none_or(|e| e.trim().is_empty())
        {
            return Err(ValidationError::new(
                id,
                "name",
                "must not be blank when no email is given",
            ));
        }
        if self.department.trim().is_empty() {
            return Err(ValidationError::new(id, "department", "must not be blank"));
        }
        if self.role.trim().is_empty() {
            return Err(ValidationError::new(id, "role", "must not be blank"));
        }
        if let Some(seniority) = self.seniority {
            if !(i64::from(MIN_SENIORITY)..=i64::from(MAX_SENIORITY)).contains(&seniority) {
                return Err(ValidationError::new(
                    id,
                    "seniority",
                    format!("must be between {MIN_SENIORITY} and {MAX_SENIORITY}, got {seniority}"),
                ));
            }
        }
        for (name, &value) in &self.traits {
            let field = format!("traits.{name}");
            if PersonalityTrait::from_name(name).is_none() {
                return Err(ValidationError::new(id, field, "is not a known trait"));
            }
            if !unit_interval(value) {
                return Err(ValidationError::new(
                    id,
                    field,
                    format!("must be within [0, 1], got {value}"),
                ));
            }
        }
        if let Some(capacity) = self.workload_capacity {
            if !capacity.is_finite() || capacity <= 0.0 {
                return Err(ValidationError::new(
                    id,
                    "workload_capacity",
                    format!("must be positive, got {capacity}"),
                ));
            }
        }
        if let Some(workload) = self.current_workload {
            if !workload.is_finite() || workload < 0.0 {
                return Err(ValidationError::new(
                    id,
                    "current_workload",
                    format!("must not be negative, got {workload}"),
                ));
            }
        }
        if let Some(stress) = self.stress_level {
            if !unit_interval(stress) {
                return Err(ValidationError::new(
                    id,
                    "stress_level",
                    format!("must be within [0, 1], got {stress}"),
                ));
            }
        }
        if self.manager_id.as_deref() == Some(id) {
            return Err(ValidationError::new(id, "manager_id", "must not reference itself"));
        }
        if self.direct_reports.iter().any(|r| r == id) {
            return Err(ValidationError::new(
                id,
                "direct_reports",
                "must not reference itself",
            ));
        }
        Ok(())
    }
}

fn unit_interval(value: f64) -> bool {
    value.is_finite() && (0.0..=1.0).contains(&value)
}

// ---------------------------------------------------------------------------
// Factory
// ---------------------------------------------------------------------------

/// Build a persona from a single record.
///
/// Reporting references are copied as-is; [`Population::ingest`] drops the
/// ones that do not resolve. Relationships start empty.
///
/// # Errors
///
/// Returns a [`ValidationError`] if the record is malformed.
pub fn build_persona(
    record: &PersonaRecord,
    now: DateTime<Utc>,
    rng: &mut impl Rng,
) -> Result<Persona, ValidationError> {
    record.validate()?;

    let seniority = record
        .seniority
        .and_then(|s| u8::try_from(s).ok())
        .unwrap_or_else(|| infer_seniority(&record.role));
    let workload_capacity = record
        .workload_capacity
        .unwrap_or_else(|| derived_capacity(seniority));
    let workload_ceiling = WORKLOAD_CEILING * workload_capacity;
    let current_workload = match record.current_workload {
        Some(workload) if workload > workload_ceiling => {
            warn!(
                persona_id = %record.id,
                workload,
                ceiling = workload_ceiling,
                "Workload above ceiling, clamped"
            );
            workload_ceiling
        }
        Some(workload) => workload,
        None => rng.random_range(0.3..0.8_f64).min(workload_ceiling),
    };
    let stress_level = record
        .stress_level
        .unwrap_or_else(|| rng.random_range(0.1..0.4));

    let personality = if record.traits.is_empty() {
        archetype_personality(&record.role, &record.department, rng)
    } else {
        let traits: BTreeMap<PersonalityTrait, f64> = record
            .traits
            .iter()
            .filter_map(|(name, &v)| PersonalityTrait::from_name(name).map(|t| (t, v)))
            .collect();
        PersonalityProfile::from_partial(&traits)
    };

    let expertise = if record.expertise.is_empty() {
        default_expertise(&record.department, &record.role)
    } else {
        record.expertise.clone()
    };

    let state = record.state.unwrap_or_else(|| sample_initial_state(rng));

    let name = if record.name.trim().is_empty() {
        name_from_email(record.email.as_deref().unwrap_or_default())
    } else {
        record.name.clone()
    };

    Ok(Persona {
        id: PersonaId::new(record.id.clone()),
        name,
        email: record.email.clone(),
        personality,
        profile: ProfessionalProfile {
            department: record.department.clone(),
            role: record.role.clone(),
            seniority,
            workload_capacity,
            current_workload,
            manager: record.manager_id.clone().map(PersonaId::new),
            direct_reports: record
                .direct_reports
                .iter()
                .cloned()
                .map(PersonaId::new)
                .collect(),
            expertise,
        },
        memory: PersonaMemory::new(stress_level, now),
        state,
    })
}

/// Infer seniority from keywords in a role title.
pub fn infer_seniority(role: &str) -> u8 {
    let role = role.to_lowercase();
    let has = |words: &[&str]| words.iter().any(|w| role.contains(w));
    if has(&["ceo", "chief", "president"]) && !role.contains("vice president") {
        5
    } else if has(&["vp", "vice president"]) {
        4
    } else if has(&["director", "head of"]) {
        3
    } else if has(&["manager", "lead"]) {
        2
    } else {
        1
    }
}

/// Workload capacity grows with seniority, capped at 1.5.
pub fn derived_capacity(seniority: u8) -> f64 {
    0.1f64
        .mul_add(f64::from(seniority), 0.8)
        .min(MAX_DERIVED_CAPACITY)
}

fn archetype_personality(role: &str, department: &str, rng: &mut impl Rng) -> PersonalityProfile {
    let role = role.to_lowercase();
    let department = department.to_lowercase();
    let base = ARCHETYPES
        .iter()
        .find(|(key, _)| role_matches(&role, key))
        .or_else(|| ARCHETYPES.iter().find(|(key, _)| role_matches(&department, key)))
        .map(|(_, traits)| *traits);

    let mut profile = PersonalityProfile::default();
    for (i, t) in PersonalityTrait::ALL.into_iter().enumerate() {
        let value = base
            .as_ref()
            .and_then(|traits| traits.get(i).copied())
            .unwrap_or(catchball_types::structs::NEUTRAL);
        let variation = rng.random_range(-TRAIT_VARIATION..TRAIT_VARIATION);
        profile.set(t, value + variation);
    }
    profile
}

/// Short keys like "hr" or "vp" only match whole words.
fn role_matches(text: &str, key: &str) -> bool {
    if key.len() <= 2 {
        text.split(|c: char| !c.is_alphanumeric()).any(|w| w == key)
    } else {
        text.contains(key)
    }
}

fn default_expertise(department: &str, role: &str) -> Vec<String> {
    let department = department.to_lowercase();
    let mut expertise: Vec<String> = DEPARTMENT_EXPERTISE
        .iter()
        .find(|(key, _)| role_matches(&department, key))
        .map_or_else(
            || vec![String::from("general_business")],
            |(_, areas)| areas.iter().map(|a| (*a).to_owned()).collect(),
        );

    let role = role.to_lowercase();
    if role.contains("senior") || role.contains("lead") {
        expertise.push(String::from("mentoring"));
    }
    if role.contains("manager") || role.contains("director") {
        expertise.push(String::from("team_management"));
        expertise.push(String::from("strategic_planning"));
    }
    if infer_seniority(&role) >= 4 {
        expertise.push(String::from("executive_leadership"));
        expertise.push(String::from("organizational_strategy"));
    }
    expertise
}

fn sample_initial_state(rng: &mut impl Rng) -> PersonaState {
    let roll: f64 = rng.random();
    let mut cumulative = 0.0;
    for (state, probability) in INITIAL_STATES {
        cumulative += probability;
        if roll <= cumulative {
            return state;
        }
    }
    PersonaState::Available
}

/// Turn `jane.doe@corp.example` into `Jane Doe`.
fn name_from_email(email: &str) -> String {
    let local = email.split('@').next().unwrap_or_default();
    let parts: Vec<String> = local
        .split(['.', '_'])
        .filter(|p| !p.is_empty())
        .map(|p| {
            let mut chars = p.chars();
            chars.next().map_or_else(String::new, |first| {
                first.to_uppercase().chain(chars).collect()
            })
        })
        .collect();
    if parts.is_empty() {
        String::from("Unknown")
    } else {
        parts.join(" ")
    }
}

// ---------------------------------------------------------------------------
// Population
// ---------------------------------------------------------------------------

/// Outcome of ingesting a batch of records.
#[derive(Debug)]
pub struct IngestReport {
    /// Ids of the personas that were added.
    pub accepted: Vec<PersonaId>,
    /// Records that were rejected, with the reason.
    pub rejected: Vec<ValidationError>,
}

/// The set of personas in a simulation run, keyed by id.
///
/// Personas are created once at population build time and never removed
/// during a run.
#[derive(Debug, Clone, Default)]
pub struct Population {
    personas: BTreeMap<PersonaId, Persona>,
}

impl Population {
    /// Create an empty population.
    pub fn new() -> Self {
        Self::default()
    }

    /// Ingest a batch of records.
    ///
    /// Malformed records and duplicate ids are rejected individually.
    /// Manager and report references to ids outside the resulting
    /// population are dropped. Relationships are then initialized for
    /// every pair of accepted personas.
    pub fn ingest(
        records: &[PersonaRecord],
        now: DateTime<Utc>,
        rng: &mut impl Rng,
    ) -> (Self, IngestReport) {
        let mut population = Self::new();
        let mut report = IngestReport {
            accepted: Vec::new(),
            rejected: Vec::new(),
        };

        for record in records {
            let persona = match build_persona(record, now, rng) {
                Ok(persona) => persona,
                Err(e) => {
                    warn!(record_id = %record.id, field = %e.field, reason = %e.reason, "Rejected persona record");
                    report.rejected.push(e);
                    continue;
                }
            };
            let id = persona.id.clone();
            match population.insert(persona) {
                Ok(()) => report.accepted.push(id),
                Err(_) => {
                    let e = ValidationError::new(id.as_str(), "id", "duplicates an earlier record");
                    warn!(record_id = %id, "Rejected duplicate persona record");
                    report.rejected.push(e);
                }
            }
        }

        population.resolve_references();
        population.initialize_relationships(rng);
        debug!(
            accepted = report.accepted.len(),
            rejected = report.rejected.len(),
            "Population ingested"
        );
        (population, report)
    }

    /// Add a fully built persona.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::DuplicatePersona`] if the id is already taken.
    pub fn insert(&mut self, persona: Persona) -> Result<(), AgentError> {
        if self.personas.contains_key(&persona.id) {
            return Err(AgentError::DuplicatePersona(persona.id));
        }
        self.personas.insert(persona.id.clone(), persona);
        Ok(())
    }

    /// Look up a persona.
    pub fn get(&self, id: &PersonaId) -> Option<&Persona> {
        self.personas.get(id)
    }

    /// Look up a persona for mutation.
    pub fn get_mut(&mut self, id: &PersonaId) -> Option<&mut Persona> {
        self.personas.get_mut(id)
    }

    /// Look up a persona, failing if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::PersonaNotFound`] if `id` is unknown.
    pub fn require(&self, id: &PersonaId) -> Result<&Persona, AgentError> {
        self.personas
            .get(id)
            .ok_or_else(|| AgentError::PersonaNotFound(id.clone()))
    }

    /// Look up a persona for mutation, failing if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::PersonaNotFound`] if `id` is unknown.
    pub fn require_mut(&mut self, id: &PersonaId) -> Result<&mut Persona, AgentError> {
        self.personas
            .get_mut(id)
            .ok_or_else(|| AgentError::PersonaNotFound(id.clone()))
    }

    /// Whether a persona with this id exists.
    pub fn contains(&self, id: &PersonaId) -> bool {
        self.personas.contains_key(id)
    }

    /// Number of personas.
    pub fn len(&self) -> usize {
        self.personas.len()
    }

    /// Whether the population is empty.
    pub fn is_empty(&self) -> bool {
        self.personas.is_empty()
    }

    /// Iterate over personas in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Persona> {
        self.personas.values()
    }

    /// Iterate mutably over personas in id order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Persona> {
        self.personas.values_mut()
    }

    /// All persona ids, in order.
    pub fn ids(&self) -> Vec<PersonaId> {
        self.personas.keys().cloned().collect()
    }

    /// Ids of every persona in `department` (case-insensitive).
    pub fn department_members(&self, department: &str) -> Vec<PersonaId> {
        self.personas
            .values()
            .filter(|p| p.profile.department.eq_ignore_ascii_case(department))
            .map(|p| p.id.clone())
            .collect()
    }

    fn resolve_references(&mut self) {
        let known: BTreeSet<PersonaId> = self.personas.keys().cloned().collect();
        for persona in self.personas.values_mut() {
            if let Some(manager) = persona.profile.manager.take() {
                if known.contains(&manager) {
                    persona.profile.manager = Some(manager);
                } else {
                    warn!(persona = %persona.id, manager = %manager, "Dropping unknown manager reference");
                }
            }
            let before = persona.profile.direct_reports.len();
            persona.profile.direct_reports.retain(|r| known.contains(r));
            if persona.profile.direct_reports.len() < before {
                warn!(persona = %persona.id, "Dropping unknown direct-report references");
            }
        }

        // A manager link implies the reverse report link.
        let links: Vec<(PersonaId, PersonaId)> = self
            .personas
            .values()
            .filter_map(|p| p.profile.manager.clone().map(|m| (m, p.id.clone())))
            .collect();
        for (manager, report) in links {
            if let Some(m) = self.personas.get_mut(&manager) {
                if !m.profile.direct_reports.contains(&report) {
                    m.profile.direct_reports.push(report);
                }
            }
        }
    }

    fn initialize_relationships(&mut self, rng: &mut impl Rng) {
        let snapshot: Vec<(PersonaId, String, u8, Option<PersonaId>)> = self
            .personas
            .values()
            .map(|p| {
                (
                    p.id.clone(),
                    p.profile.department.clone(),
                    p.profile.seniority,
                    p.profile.manager.clone(),
                )
            })
            .collect();

        for persona in self.personas.values_mut() {
            for (other_id, other_department, other_seniority, other_manager) in &snapshot {
                if other_id == &persona.id {
                    continue;
                }
                let mut score = catchball_types::structs::NEUTRAL;
                if persona.profile.department == *other_department {
                    score += 0.2;
                }
                if persona.profile.manager.as_ref() == Some(other_id) {
                    score += 0.3;
                }
                if other_manager.as_ref() == Some(&persona.id) {
                    score += 0.2;
                }
                if persona.profile.seniority.abs_diff(*other_seniority) <= 1 {
                    score += 0.1;
                }
                score += rng.random_range(-RELATIONSHIP_NOISE..RELATIONSHIP_NOISE);
                persona
                    .memory
                    .relationships
                    .insert(other_id.clone(), score.clamp(0.0, 1.0));
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(42)
    }

    fn record(id: &str, department: &str, role: &str) -> PersonaRecord {
        PersonaRecord::new(id, format!("Person {id}"), department, role)
    }

    #[test]
    fn blank_id_is_rejected_by_field() {
        let err = record(" ", "Sales", "Rep").validate().unwrap_err();
        assert_eq!(err.field, "id");
    }

    #[test]
    fn out_of_range_seniority_is_rejected() {
        let mut r = record("a", "Sales", "Rep");
        r.seniority = Some(7);
        let err = r.validate().unwrap_err();
        assert_eq!(err.field, "seniority");
        assert_eq!(err.record_id, "a");
    }

    #[test]
    fn unknown_and_out_of_range_traits_are_rejected() {
        let mut r = record("a", "Sales", "Rep");
        r.traits.insert(String::from("charisma"), 0.5);
        assert_eq!(r.validate().unwrap_err().field, "traits.charisma");

        let mut r = record("b", "Sales", "Rep");
        r.traits.insert(String::from("risk_tolerance"), 1.5);
        assert_eq!(r.validate().unwrap_err().field, "traits.risk_tolerance");
    }

    #[test]
    fn self_referencing_manager_is_rejected() {
        let mut r = record("a", "Sales", "Rep");
        r.manager_id = Some(String::from("a"));
        assert_eq!(r.validate().unwrap_err().field, "manager_id");
    }

    #[test]
    fn name_can_come_from_email() {
        let mut r = PersonaRecord::new("a", "", "Sales", "Rep");
        r.email = Some(String::from("jane.doe@corp.example"));
        let persona = build_persona(&r, Utc::now(), &mut rng()).unwrap();
        assert_eq!(persona.name, "Jane Doe");
    }

    #[test]
    fn seniority_is_inferred_from_role() {
        assert_eq!(infer_seniority("CEO"), 5);
        assert_eq!(infer_seniority("Chief Technology Officer"), 5);
        assert_eq!(infer_seniority("VP Engineering"), 4);
        assert_eq!(infer_seniority("Vice President, Sales"), 4);
        assert_eq!(infer_seniority("Director of Marketing"), 3);
        assert_eq!(infer_seniority("Team Lead"), 2);
        assert_eq!(infer_seniority("Software Engineer"), 1);
    }

    #[test]
    fn workload_starts_within_capacity_ceiling() {
        let mut small = record("small", "Sales", "Rep");
        small.workload_capacity = Some(0.2);
        let mut heavy = record("heavy", "Sales", "Rep");
        heavy.current_workload = Some(5.0);

        let mut rng = rng();
        let (population, report) = Population::ingest(&[small, heavy], Utc::now(), &mut rng);
        assert!(report.rejected.is_empty());

        let small = population.get(&PersonaId::from("small")).unwrap();
        assert!(small.profile.current_workload <= WORKLOAD_CEILING * 0.2 + 1e-9);

        let heavy = population.get(&PersonaId::from("heavy")).unwrap();
        let ceiling = WORKLOAD_CEILING * heavy.profile.workload_capacity;
        assert!((heavy.profile.current_workload - ceiling).abs() < 1e-9);
    }

    #[test]
    fn capacity_is_capped() {
        assert!((derived_capacity(1) - 0.9).abs() < 1e-9);
        assert!((derived_capacity(5) - 1.3).abs() < 1e-9);
        assert!(derived_capacity(5) <= MAX_DERIVED_CAPACITY);
    }

    #[test]
    fn partial_traits_fill_with_neutral() {
        let mut r = record("a", "Engineering", "Engineer");
        r.traits.insert(String::from("authority_response"), 0.9);
        let persona = build_persona(&r, Utc::now(), &mut rng()).unwrap();
        assert!((persona.personality.authority_response - 0.9).abs() < f64::EPSILON);
        assert!((persona.personality.risk_tolerance - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn archetype_traits_stay_in_unit_interval() {
        let mut rng = rng();
        for role in ["CEO", "HR Partner", "Operations Analyst", "Intern"] {
            let persona = build_persona(&record("a", "Ops", role), Utc::now(), &mut rng).unwrap();
            for t in PersonalityTrait::ALL {
                let v = persona.personality.get(t);
                assert!((0.0..=1.0).contains(&v), "{role}: {t:?}={v}");
            }
        }
    }

    #[test]
    fn ingest_rejects_bad_records_individually() {
        let mut bad = record("bad", "Sales", "Rep");
        bad.seniority = Some(0);
        let records = vec![
            record("a", "Sales", "Rep"),
            bad,
            record("a", "Sales", "Duplicate"),
            record("b", "Sales", "Manager"),
        ];
        let (population, report) = Population::ingest(&records, Utc::now(), &mut rng());
        assert_eq!(population.len(), 2);
        assert_eq!(report.accepted.len(), 2);
        assert_eq!(report.rejected.len(), 2);
        assert_eq!(report.rejected.first().unwrap().field, "seniority");
    }

    #[test]
    fn dangling_references_are_dropped_and_links_mirrored() {
        let mut report = record("r", "Engineering", "Engineer");
        report.manager_id = Some(String::from("m"));
        let mut manager = record("m", "Engineering", "Engineering Manager");
        manager.direct_reports = vec![String::from("ghost")];
        let mut orphan = record("o", "Sales", "Rep");
        orphan.manager_id = Some(String::from("nobody"));

        let (population, _) =
            Population::ingest(&[report, manager, orphan], Utc::now(), &mut rng());
        let m = population.get(&PersonaId::from("m")).unwrap();
        assert_eq!(m.profile.direct_reports, vec![PersonaId::from("r")]);
        let o = population.get(&PersonaId::from("o")).unwrap();
        assert_eq!(o.profile.manager, None);
    }

    #[test]
    fn relationships_cover_every_other_persona() {
        let records = vec![
            record("a", "Sales", "Rep"),
            record("b", "Sales", "Rep"),
            record("c", "HR", "Partner"),
        ];
        let (population, _) = Population::ingest(&records, Utc::now(), &mut rng());
        for persona in population.iter() {
            assert_eq!(persona.memory.relationships.len(), 2);
            assert!(!persona.memory.relationships.contains_key(&persona.id));
            for &score in persona.memory.relationships.values() {
                assert!((0.0..=1.0).contains(&score));
            }
        }
    }

    #[test]
    fn ingestion_is_reproducible_for_a_seed() {
        let records = vec![record("a", "Sales", "Rep"), record("b", "HR", "Partner")];
        let (first, _) = Population::ingest(&records, Utc::now(), &mut rng());
        let (second, _) = Population::ingest(&records, Utc::now(), &mut rng());
        for (x, y) in first.iter().zip(second.iter()) {
            assert_eq!(x.personality, y.personality);
            assert_eq!(x.state, y.state);
            assert_eq!(x.memory.relationships, y.memory.relationships);
        }
    }
}
