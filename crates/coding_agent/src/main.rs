use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use agent_provider::CancelSignal;
use anyhow::bail;
use coding_agent::{AgentConfig, AgentFactory, OutputEvent, RunOutcome};
use tracing_subscriber::EnvFilter;

/// Runs one instruction with the configured entry role and prints every
/// event as a JSON line on stdout.
fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let instruction = std::env::args().skip(1).collect::<Vec<_>>().join(" ");
    if instruction.trim().is_empty() {
        bail!("usage: coding_agent <instruction>");
    }

    let config = AgentConfig::from_env()?;
    let agent = AgentFactory::from_config(&config)?.agent(config.entry_role);
    let cancel: CancelSignal = Arc::new(AtomicBool::new(false));

    let outcome = agent.run(&instruction, &cancel, &mut |event: OutputEvent| {
        println!("{}", event.to_json());
    });
    println!("{}", OutputEvent::end().to_json());

    match outcome {
        RunOutcome::Failed(error) => Err(error.into()),
        RunOutcome::Report(_) | RunOutcome::Exited | RunOutcome::Preempted | RunOutcome::Stopped => {
            Ok(())
        }
    }
}
