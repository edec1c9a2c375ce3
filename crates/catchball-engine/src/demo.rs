//! Built-in demo organization and opening messages.
//!
//! Loading a real organization is the job of an ingestion adapter; the
//! binary ships with a small company so it can run out of the box.

use catchball_agents::PersonaRecord;
use catchball_core::{ConsultationDraft, MessageDraft, Simulation, SimulationError};
use catchball_types::{MessageId, MessageKind, PersonaId, PersonaState};

/// Messages sent at startup that later steps refer back to.
#[derive(Debug, Clone, Default)]
pub struct OpeningMessages {
    /// Nudges and recommendations the re-nudge task keeps chasing.
    pub chased: Vec<MessageId>,
    /// Catchball and wisdom requests analysed at the end of the run.
    pub feedback_requests: Vec<MessageId>,
}

/// One row of the demo org chart.
struct Member {
    id: &'static str,
    name: &'static str,
    department: &'static str,
    role: &'static str,
    manager: Option<&'static str>,
}

const MEMBERS: [Member; 12] = [
    Member { id: "ceo", name: "Morgan Hale", department: "Executive", role: "CEO", manager: None },
    Member { id: "vp-eng", name: "Priya Natarajan", department: "Engineering", role: "VP Engineering", manager: Some("ceo") },
    Member { id: "eng-lead", name: "Tomas Ortega", department: "Engineering", role: "Engineering Manager", manager: Some("vp-eng") },
    Member { id: "eng-1", name: "Wen Li", department: "Engineering", role: "Software Engineer", manager: Some("eng-lead") },
    Member { id: "eng-2", name: "Sofia Rossi", department: "Engineering", role: "Senior Software Engineer", manager: Some("eng-lead") },
    Member { id: "vp-sales", name: "Marcus Bell", department: "Sales", role: "VP Sales", manager: Some("ceo") },
    Member { id: "sales-1", name: "Ana Costa", department: "Sales", role: "Account Executive", manager: Some("vp-sales") },
    Member { id: "sales-2", name: "Jun Park", department: "Sales", role: "Sales Representative", manager: Some("vp-sales") },
    Member { id: "dir-ops", name: "Hannah Okafor", department: "Operations", role: "Director of Operations", manager: Some("ceo") },
    Member { id: "ops-1", name: "Ravi Menon", department: "Operations", role: "Operations Analyst", manager: Some("dir-ops") },
    Member { id: "hr-lead", name: "Lena Fischer", department: "HR", role: "HR Manager", manager: Some("ceo") },
    Member { id: "mkt-1", name: "Diego Alvarez", department: "Marketing", role: "Marketing Specialist", manager: Some("ceo") },
];

/// Persona records for the demo company.
///
/// One engineer starts overloaded and the marketing specialist is on
/// leave, so escalations show up early in a run.
pub fn organization() -> Vec<PersonaRecord> {
    MEMBERS
        .iter()
        .map(|m| {
            let mut record = PersonaRecord::new(m.id, m.name, m.department, m.role);
            record.email = Some(format!("{}@catchball.example", m.id));
            record.manager_id = m.manager.map(str::to_owned);
            record.direct_reports = MEMBERS
                .iter()
                .filter(|r| r.manager == Some(m.id))
                .map(|r| r.id.to_owned())
                .collect();
            match m.id {
                "eng-2" => {
                    record.current_workload = Some(1.05);
                    record.stress_level = Some(0.7);
                }
                "mkt-1" => record.state = Some(PersonaState::OnLeave),
                _ => {}
            }
            record
        })
        .collect()
}

fn ids(ids: &[&str]) -> Vec<PersonaId> {
    ids.iter().map(|id| PersonaId::from(*id)).collect()
}

fn everyone() -> Vec<PersonaId> {
    MEMBERS
        .iter()
        .filter(|m| m.id != "ceo")
        .map(|m| PersonaId::from(m.id))
        .collect()
}

/// Send the opening round of messages.
///
/// # Errors
///
/// Propagates the first rejected send.
pub fn send_opening_messages(sim: &mut Simulation) -> Result<OpeningMessages, SimulationError> {
    let mut opening = OpeningMessages::default();

    sim.send(
        MessageDraft::new(
            MessageKind::Order,
            "ceo",
            ids(&["vp-eng", "vp-sales", "dir-ops", "hr-lead"]),
            "Q3 budget freeze",
            "All discretionary spend is frozen until the Q3 review. Confirm with your teams.",
        )
        .with_priority(4),
    )?;

    let runbook = sim.send(
        MessageDraft::new(
            MessageKind::Nudge,
            "vp-eng",
            ids(&["eng-1", "eng-2", "mkt-1"]),
            "Deployment runbook",
            "Please update the deployment runbook before the next release.",
        )
        .with_priority(2)
        .with_escalation_threshold(3),
    )?;
    opening.chased.push(runbook.id);

    let leave = sim.send(MessageDraft::new(
        MessageKind::Recommendation,
        "hr-lead",
        everyone(),
        "Remaining leave",
        "Please plan your remaining leave days for this year.",
    ))?;
    opening.chased.push(leave.id);

    let pilot = sim.send(MessageDraft::new(
        MessageKind::Catchball,
        "ceo",
        everyone(),
        "Four-day week pilot",
        "We are considering a four-day week pilot next quarter. What would it mean for your team?",
    ))?;
    opening.feedback_requests.push(pilot.id);

    let bottlenecks = sim.send(MessageDraft::new(
        MessageKind::WisdomRequest,
        "dir-ops",
        ids(&["eng-lead", "sales-1", "ops-1"]),
        "Where are we stuck?",
        "Where do handoffs between our teams slow down the most?",
    ))?;
    opening.feedback_requests.push(bottlenecks.id);

    Ok(opening)
}

/// The consultation opened at startup.
pub fn opening_consultation() -> ConsultationDraft {
    ConsultationDraft {
        requester: PersonaId::from("vp-eng"),
        title: String::from("Continuous deployment"),
        description: String::from("Move every service to continuous deployment by year end."),
        proposed_change: String::from(
            "Adopt continuous deployment with automated system design reviews and process optimization checks",
        ),
        invited: ids(&["eng-lead", "eng-1", "eng-2", "dir-ops", "ops-1", "vp-sales"]),
        deadline: None,
    }
}
