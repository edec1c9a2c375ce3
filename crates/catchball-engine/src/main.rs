//! Catchball simulator binary.
//!
//! Runs the built-in demo organization through a bounded simulation and
//! logs what happened.
//!
//! # Startup Sequence
//!
//! 1. Load configuration (first argument, `catchball-config.yaml`, or
//!    defaults)
//! 2. Initialize structured logging (tracing)
//! 3. Build the simulation and ingest the demo organization
//! 4. Send the opening messages and open a consultation
//! 5. Create operator state; wire Ctrl-C and the re-nudge task to it
//! 6. Run the tick loop
//! 7. Log the run summary and the catchball analyses

mod demo;
mod error;
mod progress;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use catchball_core::config::{LoggingConfig, SimulationConfig};
use catchball_core::operator::{OperatorCommand, OperatorState};
use catchball_core::runner;
use catchball_core::Simulation;
use catchball_types::MessageId;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::error::EngineError;
use crate::progress::ProgressCallback;

/// Config file looked up in the working directory when no path is given.
const DEFAULT_CONFIG_FILE: &str = "catchball-config.yaml";

/// Ticks between progress log lines.
const PROGRESS_EVERY_TICKS: u64 = 30;

/// Ticks between automatic re-nudges of unanswered messages.
const RENUDGE_EVERY_TICKS: u32 = 120;

/// Application entry point.
///
/// # Errors
///
/// Returns an error if configuration, startup or the run itself fails.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Load configuration.
    let config = load_config(std::env::args_os().nth(1).map(PathBuf::from))?;

    // 2. Initialize structured logging.
    init_logging(&config.logging);
    info!("catchball-engine starting");
    info!(
        name = %config.world.name,
        seed = config.world.seed,
        acceleration_factor = config.world.acceleration_factor,
        tick_interval_ms = config.world.tick_interval_ms,
        max_ticks = config.simulation.max_ticks,
        max_real_time_seconds = config.simulation.max_real_time_seconds,
        "Configuration loaded"
    );

    // 3. Build the simulation.
    let mut sim = Simulation::new(config.clone()).map_err(EngineError::from)?;
    let ingest = sim.start(&demo::organization()).map_err(EngineError::from)?;
    info!(
        accepted = ingest.accepted.len(),
        rejected = ingest.rejected.len(),
        "Demo organization loaded"
    );

    // 4. Opening messages.
    let opening = demo::send_opening_messages(&mut sim).map_err(EngineError::from)?;
    let consultation = sim
        .create_consultation(demo::opening_consultation())
        .map_err(EngineError::from)?;
    info!(
        messages = sim.messages().count(),
        consultation_id = %consultation.id,
        "Opening round sent"
    );

    // 5. Operator state, Ctrl-C and the re-nudge task.
    let operator = Arc::new(OperatorState::new(
        config.world.tick_interval_ms,
        &config.simulation,
    ));
    info!(
        max_ticks = operator.max_ticks(),
        max_real_time_seconds = operator.max_real_time_seconds(),
        tick_interval_ms = operator.tick_interval_ms(),
        "Operator state initialized"
    );

    let interrupt = Arc::clone(&operator);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received, stopping after the current tick");
            interrupt.request_stop();
        }
    });

    let renudger = tokio::spawn(renudge(Arc::clone(&operator), opening.chased.clone()));

    // 6. Run the tick loop.
    let mut callback = ProgressCallback::new(PROGRESS_EVERY_TICKS);
    let summary = runner::run_simulation(&mut sim, &operator, &mut callback)
        .await
        .map_err(EngineError::from)?;
    renudger.abort();

    // 7. Log results.
    runner::log_run_end(&summary);
    log_analyses(&sim, &opening.feedback_requests, consultation.id);

    let escalation_metrics = sim.escalation_metrics();
    info!(
        total_escalations = escalation_metrics.total_escalations,
        average_nudge_count = escalation_metrics.average_nudge_count,
        escalations_per_nudge = escalation_metrics.escalations_per_nudge,
        "Escalation summary"
    );
    info!(
        end_reason = ?summary.end_reason,
        total_ticks = summary.total_ticks,
        "catchball-engine shutdown complete"
    );

    Ok(())
}

/// Install the tracing subscriber. `RUST_LOG` wins over the configured
/// level.
fn init_logging(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);
    if logging.format.eq_ignore_ascii_case("json") {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Load configuration from `path`, or from [`DEFAULT_CONFIG_FILE`] when it
/// exists, or fall back to defaults.
fn load_config(path: Option<PathBuf>) -> Result<SimulationConfig, EngineError> {
    if let Some(path) = path {
        return Ok(SimulationConfig::from_file(&path)?);
    }
    let default_path = Path::new(DEFAULT_CONFIG_FILE);
    if default_path.exists() {
        Ok(SimulationConfig::from_file(default_path)?)
    } else {
        Ok(SimulationConfig::default())
    }
}

/// Periodically queue a re-send of every chased message until a stop is
/// requested.
async fn renudge(operator: Arc<OperatorState>, chased: Vec<MessageId>) {
    loop {
        let period = operator
            .tick_interval_ms()
            .saturating_mul(u64::from(RENUDGE_EVERY_TICKS))
            .max(1);
        tokio::time::sleep(Duration::from_millis(period)).await;
        if operator.is_stop_requested() {
            break;
        }
        for message_id in &chased {
            operator.submit(OperatorCommand::Resend(*message_id)).await;
        }
        info!(messages = chased.len(), "Re-nudge queued");
    }
}

fn log_analyses(
    sim: &Simulation,
    feedback_requests: &[MessageId],
    consultation_id: catchball_types::ConsultationId,
) {
    for &message_id in feedback_requests {
        match sim.analyze_message_feedback(message_id) {
            Ok(report) => info!(
                %message_id,
                feedback = report.feedback_count,
                consensus = report.consensus_score,
                conflicts = report.cross_department_conflicts.len(),
                immediate_actions = ?report.recommendations.immediate_actions,
                "Catchball analysis"
            ),
            Err(e) => warn!(%message_id, error = %e, "Catchball analysis unavailable"),
        }
    }

    match sim.analyze_consultation(consultation_id) {
        Ok(report) => info!(
            %consultation_id,
            feedback = report.feedback_count,
            consensus = report.consensus_score,
            risks = report.risks.len(),
            opportunities = report.opportunities.len(),
            "Consultation analysis"
        ),
        Err(e) => warn!(%consultation_id, error = %e, "Consultation analysis unavailable"),
    }
}
