//! End-to-end scenarios across the clock, scheduler, persona engines and
//! orchestrator.
//!
//! Wall-clock time is driven by [`ManualTimeSource`], so every scenario is
//! deterministic for a given seed.

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use std::sync::Arc;

use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use catchball_agents::PersonaRecord;
use catchball_core::clock::{ManualTimeSource, SimulationClock};
use catchball_core::config::SimulationConfig;
use catchball_core::operator::{OperatorCommand, OperatorState, RunEndReason};
use catchball_core::runner::{NoOpCallback, run_simulation};
use catchball_core::scheduler::EventScheduler;
use catchball_core::{MessageDraft, Simulation};
use catchball_types::{MessageKind, PersonaId, PersonaState};

fn sim_start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 3, 8, 0, 0).unwrap()
}

fn config(seed: u64) -> SimulationConfig {
    let mut config = SimulationConfig::default();
    config.world.seed = seed;
    config.world.acceleration_factor = 1;
    config.world.start_time = Some(sim_start());
    config.messaging.response_delay_min_secs = 60;
    config.messaging.response_delay_max_secs = 600;
    config.messaging.escalation_delay_min_secs = 60;
    config.messaging.escalation_delay_max_secs = 600;
    config.maintenance.probability = 0.0;
    config
}

fn organization() -> Vec<PersonaRecord> {
    let people = [
        ("ceo", "Morgan Lee", "Executive", "CEO"),
        ("vp-eng", "Sam Park", "Engineering", "VP Engineering"),
        ("dev", "Alex Kim", "Engineering", "Software Engineer"),
        ("sales", "Jordan Diaz", "Sales", "Account Manager"),
        ("ops", "Riley Chen", "Operations", "Operations Lead"),
    ];
    people
        .iter()
        .map(|(id, name, department, role)| {
            let mut r = PersonaRecord::new(*id, *name, *department, *role);
            r.state = Some(PersonaState::Available);
            r.current_workload = Some(0.3);
            r.stress_level = Some(0.2);
            r
        })
        .collect()
}

fn started(seed: u64) -> (Simulation, Arc<ManualTimeSource>) {
    let source = Arc::new(ManualTimeSource::new(sim_start()));
    let mut sim = Simulation::with_time_source(config(seed), source.clone()).unwrap();
    let report = sim.start(&organization()).unwrap();
    assert!(report.rejected.is_empty());
    (sim, source)
}

fn ids(ids: &[&str]) -> Vec<PersonaId> {
    ids.iter().map(|id| PersonaId::from(*id)).collect()
}

#[test]
fn orders_are_answered_by_almost_everyone() {
    let recipients = ["vp-eng", "dev", "sales", "ops"];
    let runs = 50_usize;
    let mut answered = 0_usize;

    for seed in 0..50_u64 {
        let (mut sim, source) = started(seed);
        let order = sim
            .send(MessageDraft::new(
                MessageKind::Order,
                "ceo",
                ids(&recipients),
                "Quarterly targets",
                "Update your forecasts by Friday.",
            ))
            .unwrap();
        source.advance(TimeDelta::hours(1));
        sim.on_tick();
        answered = answered.saturating_add(sim.message(order.id).unwrap().responses.len());
    }

    let trials = recipients.len().saturating_mul(runs);
    assert!(
        answered.saturating_mul(10) >= trials.saturating_mul(9),
        "only {answered} of {trials} order deliveries were answered"
    );
}

#[test]
fn silent_recipient_receives_an_escalated_order() {
    let (mut sim, source) = started(7);
    sim.population_mut()
        .get_mut(&PersonaId::from("dev"))
        .unwrap()
        .state = PersonaState::OnLeave;

    let nudge = sim
        .send(
            MessageDraft::new(
                MessageKind::Nudge,
                "vp-eng",
                ids(&["dev", "ops"]),
                "Architecture review",
                "Please share your notes on the new design.",
            )
            .with_priority(2)
            .with_escalation_threshold(2),
        )
        .unwrap();

    source.advance(TimeDelta::hours(1));
    sim.on_tick();
    assert!(sim.escalations().is_empty());

    sim.resend(nudge.id).unwrap();
    source.advance(TimeDelta::hours(1));
    sim.on_tick();

    assert_eq!(sim.escalations().len(), 1);
    let record = sim.escalations()[0].clone();
    assert_eq!(record.original_message_id, nudge.id);
    assert_eq!(record.nudge_count, 2);
    assert_eq!(record.priority_increase, 1);
    assert!(record.non_responsive.contains(&PersonaId::from("dev")));

    let order = sim.message(record.escalated_message_id).unwrap();
    assert_eq!(order.kind, MessageKind::Order);
    assert_eq!(order.priority, 3);
    assert_eq!(order.recipients, record.non_responsive);
    assert!(order.subject.starts_with("URGENT: "));
    assert!(order.content.contains("Sam Park"));

    source.advance(TimeDelta::hours(1));
    sim.on_tick();
    assert_eq!(sim.escalations().len(), 1);
    let order = sim.message(record.escalated_message_id).unwrap();
    assert!(order.latest_response_from(&PersonaId::from("dev")).is_none());
    assert_eq!(sim.metrics().escalations, 1);
}

#[test]
fn hundred_events_fire_in_time_order() {
    let source = Arc::new(ManualTimeSource::new(sim_start()));
    let mut clock = SimulationClock::new(1, sim_start(), source.clone()).unwrap();
    clock.start().unwrap();

    let mut rng = StdRng::seed_from_u64(11);
    let mut scheduler: EventScheduler<u32> = EventScheduler::new();
    for n in 0..100_u32 {
        let delay = TimeDelta::seconds(rng.random_range(0..3600));
        scheduler.schedule_after(&clock, delay, n).unwrap();
    }

    let mut fired: Vec<DateTime<Utc>> = Vec::new();
    for _ in 0..61 {
        source.advance(TimeDelta::minutes(1));
        let now = clock.now();
        let report = scheduler.fire_due(now, |event| {
            assert!(event.at <= now);
            fired.push(event.at);
            Ok::<(), String>(())
        });
        assert_eq!(report.failed, 0);
    }

    assert_eq!(fired.len(), 100);
    assert!(fired.windows(2).all(|w| w[0] <= w[1]));
    assert!(scheduler.is_empty());
}

#[test]
fn clock_never_runs_backwards_across_restarts() {
    let source = Arc::new(ManualTimeSource::new(sim_start()));
    let mut clock = SimulationClock::new(144, sim_start(), source.clone()).unwrap();
    clock.start().unwrap();

    let mut last = clock.now();
    for step in 0..20 {
        source.advance(TimeDelta::seconds(5));
        if step % 5 == 0 {
            clock.stop();
            source.advance(TimeDelta::minutes(10));
            clock.start().unwrap();
        }
        let now = clock.now();
        assert!(now >= last);
        last = now;
    }
    assert!(last > sim_start());
}

#[test]
fn persona_state_stays_in_bounds_under_load() {
    let (mut sim, source) = started(3);
    let everyone = ["vp-eng", "dev", "sales", "ops"];
    for round in 0..30 {
        sim.send(MessageDraft::new(
            MessageKind::Order,
            "ceo",
            ids(&everyone),
            format!("Task {round}"),
            "Please handle this today.",
        ))
        .unwrap();
        source.advance(TimeDelta::minutes(15));
        sim.on_tick();
    }
    source.advance(TimeDelta::hours(2));
    sim.on_tick();

    for persona in sim.population().iter() {
        assert!((0.0..=1.0).contains(&persona.memory.stress_level));
        assert!(persona.profile.current_workload >= 0.0);
        assert!(persona.profile.current_workload <= 1.2 * persona.profile.workload_capacity + 1e-9);
        for strength in persona.memory.relationships.values() {
            assert!((0.0..=1.0).contains(strength));
        }
    }
    let metrics = sim.metrics();
    assert!((0.0..=1.0).contains(&metrics.friction_score));
    assert!(metrics.responses <= metrics.deliveries);
}

#[test]
fn same_seed_same_outcome() {
    let run = |seed: u64| {
        let (mut sim, source) = started(seed);
        for subject in ["Budget", "Hiring", "Roadmap"] {
            sim.send(
                MessageDraft::new(
                    MessageKind::Recommendation,
                    "ceo",
                    ids(&["vp-eng", "dev", "sales", "ops"]),
                    subject,
                    "Consider this when planning next quarter.",
                )
                .with_escalation_threshold(1),
            )
            .unwrap();
        }
        source.advance(TimeDelta::hours(3));
        sim.on_tick();
        source.advance(TimeDelta::hours(3));
        sim.on_tick();
        sim.counters().clone()
    };

    assert_eq!(run(21), run(21));
}

#[tokio::test]
async fn runner_applies_commands_and_stops_cleanly() {
    let (mut sim, _source) = started(5);
    let mut bounds = config(5).simulation;
    bounds.max_ticks = 4;
    let operator = Arc::new(OperatorState::new(0, &bounds));
    operator
        .submit(OperatorCommand::Send(MessageDraft::new(
            MessageKind::Catchball,
            "ceo",
            ids(&["vp-eng", "sales"]),
            "Pricing change",
            "How would a 5% price increase land with your teams?",
        )))
        .await;

    let summary = run_simulation(&mut sim, &operator, &mut NoOpCallback)
        .await
        .unwrap();

    assert_eq!(summary.end_reason, RunEndReason::MaxTicksReached);
    assert_eq!(summary.total_ticks, 4);
    assert_eq!(summary.commands_applied, 1);
    assert_eq!(summary.final_metrics.messages_sent, 1);
    assert!(!sim.is_running());
    assert_eq!(sim.status().pending_events, 0);
    assert!(sim.send(MessageDraft::new(MessageKind::Nudge, "ceo", ids(&["dev"]), "s", "b")).is_err());
}
