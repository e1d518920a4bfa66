//! playbook-engine - Self-Improving Knowledge Playbook Engine
//!
//! Lets a language-model-backed agent accumulate, score, and revise reusable
//! knowledge snippets ("bullets") across repeated question/answer episodes,
//! without retraining the underlying model:
//! - Playbook: the mutable bullet store, the only state across episodes
//! - Delta batches: the explicit, auditable mutation protocol
//! - Generator / Reflector / Curator: the three pipeline roles
//! - Session: composes one episode end to end against a task environment
//!
//! # Example
//!
//! ```ignore
//! use playbook_engine::config::Config;
//! use playbook_engine::llm::OpenRouterClient;
//! use playbook_engine::session::{GroundTruthEnvironment, Session};
//! use playbook_engine::types::Sample;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load()?;
//!     let client = Arc::new(OpenRouterClient::from_env()?);
//!     let mut session = Session::new(client, Arc::new(GroundTruthEnvironment), &config);
//!     let sample = Sample::new("What is the capital of France?").with_ground_truth("Paris");
//!     let outcome = session.run_episode(&sample).await?;
//!     println!("{}", outcome.generator.final_answer);
//!     Ok(())
//! }
//! ```

// Core modules (order matters for cross-module dependencies)
pub mod error;
pub mod types;
pub mod playbook; // Must come before roles since roles read the store
pub mod llm;
pub mod roles;
pub mod config;
pub mod session;
pub mod cli;

// Re-export commonly used types for convenience
pub use config::{Config, RetryPolicy};
pub use error::RoleError;
pub use llm::{CompletionClient, CompletionOptions, OpenRouterClient};
pub use playbook::{
    Bullet, DeltaBatch, DeltaKind, DeltaOperation, Playbook, PlaybookStats, PlaybookStorage,
};
pub use roles::{Curator, Generator, Reflector};
pub use session::{EpisodeOutcome, GroundTruthEnvironment, Session, TaskEnvironment};
pub use types::{
    AdapterStepResult, BulletTag, CuratorOutput, EnvironmentResult, GeneratorOutput,
    PipelineStage, ReflectorOutput, Sample,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
