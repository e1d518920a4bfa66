//! CLI interface for playbook-engine

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::sync::Arc;

use crate::config::{self, Config};
use crate::llm::OpenRouterClient;
use crate::playbook::PlaybookStorage;
use crate::session::{GroundTruthEnvironment, Session};
use crate::types::Sample;

#[derive(Parser)]
#[command(name = "playbook-engine")]
#[command(about = "Self-improving knowledge playbook engine", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the playbook as the roles see it
    Show,
    /// Print playbook statistics
    Stats,
    /// Reset the persisted playbook to empty
    Reset,
    /// Run one episode against the persisted playbook
    Run {
        /// The question to answer
        question: String,
        /// Additional context for the question
        #[arg(short, long)]
        context: Option<String>,
        /// Expected answer, used to score the generated one
        #[arg(short, long)]
        ground_truth: Option<String>,
        /// Print per-stage audit snapshots
        #[arg(long)]
        audit: bool,
    },
    /// Show the active configuration
    Config,
}

/// Parse arguments and dispatch.
pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    let storage = PlaybookStorage::in_dir(config::data_dir()?);

    match cli.command {
        Commands::Show => {
            let playbook = storage.load().await?;
            let rendered = playbook.as_prompt();
            if rendered.is_empty() {
                println!("(the playbook is empty)");
            } else {
                println!("{rendered}");
            }
        }
        Commands::Stats => {
            let playbook = storage.load().await?;
            let stats = playbook.stats();
            println!("{stats}");
            for section in playbook.sections() {
                let count = stats.sections.get(section).copied().unwrap_or(0);
                println!("  {section}: {count}");
            }
        }
        Commands::Reset => {
            storage.reset().await?;
            println!("Playbook reset.");
        }
        Commands::Run {
            question,
            context,
            ground_truth,
            audit,
        } => {
            let config = Config::load()?;
            let client = Arc::new(OpenRouterClient::from_env()?);
            let playbook = storage.load().await?;

            let mut session = Session::new(client, Arc::new(GroundTruthEnvironment), &config)
                .with_playbook(playbook);
            if audit {
                session = session.with_audit();
            }

            let mut sample = Sample::new(question);
            if let Some(context) = context {
                sample = sample.with_context(context);
            }
            if let Some(ground_truth) = ground_truth {
                sample = sample.with_ground_truth(ground_truth);
            }

            let outcome = session.run_episode(&sample).await?;

            println!("Answer: {}", outcome.generator.final_answer);
            println!("Feedback: {}", outcome.environment.feedback);
            println!("Key insight: {}", outcome.reflection.key_insight);
            println!(
                "Playbook changes: +{} added, {} updated, -{} deleted, {} skipped",
                outcome.applied.added,
                outcome.applied.updated,
                outcome.applied.deleted,
                outcome.applied.skipped
            );
            if audit {
                for step in &outcome.steps {
                    println!("--- {} ---", step.stage);
                    println!("{}", serde_json::to_string_pretty(&step.artifact)?);
                }
            }

            storage.save(session.playbook()).await?;
        }
        Commands::Config => {
            let config = Config::load()?;
            println!("# {}", config::config_path()?.display());
            println!("{}", toml::to_string_pretty(&config)?);
        }
    }

    Ok(())
}
