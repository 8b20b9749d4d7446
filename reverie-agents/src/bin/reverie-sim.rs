//! Run a multi-agent conversation from a TOML file.
//!
//! ```sh
//! REVERIE_CONFIG=sim.toml reverie-sim
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use chrono::{Duration, Utc};
use reverie_agents::{Collaborators, ConversationSession, SimulationConfig, build_agent};
use reverie_core::service::SortOrder;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let path = PathBuf::from(
        std::env::var("REVERIE_CONFIG").unwrap_or_else(|_| "reverie.toml".to_string()),
    );
    let config = SimulationConfig::from_file(&path)
        .with_context(|| format!("loading {}", path.display()))?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.reverie.general.log_level.as_str().into()),
        )
        .init();

    if config.agents.len() < 2 {
        bail!(
            "{} defines {} agents; at least two are required",
            path.display(),
            config.agents.len()
        );
    }

    let core = &config.reverie;
    let collaborators = Collaborators::from_config(core)?;
    let start = config.simulation.start_time.unwrap_or_else(Utc::now);

    let mut brains = Vec::with_capacity(config.agents.len());
    for spec in &config.agents {
        let mut brain = build_agent(spec.to_profile()?, core, &collaborators);
        for seed in &spec.seeds {
            brain.ingest_seed_memory(&seed.content, start, seed.importance).await?;
        }
        info!(agent = %spec.id, seeds = spec.seeds.len(), "Agent ready");
        brains.push(brain);
    }

    let session = ConversationSession::new(brains, &core.session)?;
    let turns = session
        .run(
            config.simulation.turns,
            start,
            Duration::minutes(config.simulation.turn_minutes),
        )
        .await?;

    for record in &turns {
        match &record.utterance {
            Some(text) => println!("[{:02}] {}: {text}", record.turn + 1, record.speaker),
            None => println!("[{:02}] {}: ...", record.turn + 1, record.speaker),
        }
    }

    println!("\nRecent memories");
    for id in session.agent_ids() {
        let brain = session.brain(&id).await?;
        println!("\n- {}", brain.name());
        let recent = brain
            .memory()
            .get_recent_memories(Some(config.simulation.report_limit), SortOrder::Descending);
        for memory in recent {
            println!("  [{}] {}", memory.kind, memory.content);
        }
    }
    Ok(())
}
