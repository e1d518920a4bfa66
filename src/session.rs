//! Episode session
//!
//! Composes the three roles and the task environment into the per-episode
//! sequence: Generate -> Evaluate -> Reflect -> Curate -> Apply. The session
//! owns the playbook; it is the only state carried across episodes, and the
//! session serializes access to it by running one episode at a time.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::Config;
use crate::llm::CompletionClient;
use crate::playbook::{ApplyReport, Playbook};
use crate::roles::{Curator, Generator, Reflector};
use crate::types::{
    AdapterStepResult, CuratorOutput, EnvironmentResult, GeneratorOutput, PipelineStage,
    ReflectorOutput, Sample,
};

/// The external collaborator that scores a generated answer.
#[async_trait]
pub trait TaskEnvironment: Send + Sync {
    async fn evaluate(
        &self,
        sample: &Sample,
        output: &GeneratorOutput,
    ) -> Result<EnvironmentResult>;
}

/// Environment that scores an answer by normalized comparison against the
/// sample's ground truth. Accuracy is 1.0 on a match, 0.0 otherwise; samples
/// without ground truth get feedback but no accuracy metric.
pub struct GroundTruthEnvironment;

fn normalize(text: &str) -> String {
    text.trim().to_lowercase()
}

#[async_trait]
impl TaskEnvironment for GroundTruthEnvironment {
    async fn evaluate(
        &self,
        sample: &Sample,
        output: &GeneratorOutput,
    ) -> Result<EnvironmentResult> {
        let mut metrics = HashMap::new();
        let (feedback, ground_truth) = match &sample.ground_truth {
            Some(expected) => {
                let correct = normalize(&output.final_answer) == normalize(expected);
                metrics.insert("accuracy".to_string(), if correct { 1.0 } else { 0.0 });
                let feedback = if correct {
                    "The answer matches the expected result.".to_string()
                } else {
                    format!(
                        "The answer does not match the expected result. Got: '{}'.",
                        output.final_answer
                    )
                };
                (feedback, Some(expected.clone()))
            }
            None => (
                "No ground truth available for this sample.".to_string(),
                None,
            ),
        };

        Ok(EnvironmentResult {
            feedback,
            ground_truth,
            metrics,
        })
    }
}

/// Everything one episode produced, handed back to the caller. All of it is
/// episode-scoped; only the playbook inside the session persists.
#[derive(Debug, Clone)]
pub struct EpisodeOutcome {
    pub generator: GeneratorOutput,
    pub environment: EnvironmentResult,
    pub reflection: ReflectorOutput,
    pub curation: CuratorOutput,
    pub applied: ApplyReport,
    /// Audit snapshots, one per stage; empty unless auditing is enabled.
    pub steps: Vec<AdapterStepResult>,
}

/// Owns one playbook and runs episodes against it sequentially.
pub struct Session {
    generator: Generator,
    reflector: Reflector,
    curator: Curator,
    environment: Arc<dyn TaskEnvironment>,
    playbook: Playbook,
    audit: bool,
    episodes_run: u32,
    last_reflection: Option<String>,
}

impl Session {
    /// Build a session from a completion client and a task environment,
    /// with role models and retry policy taken from the config.
    pub fn new(
        client: Arc<dyn CompletionClient>,
        environment: Arc<dyn TaskEnvironment>,
        config: &Config,
    ) -> Self {
        let generator = Generator::new(client.clone(), config.models.generator.clone())
            .with_retry(config.retry);
        let reflector = Reflector::new(client.clone(), config.models.reflector.clone())
            .with_retry(config.retry)
            .with_rounds(config.reflection.max_refinement_rounds);
        let curator = Curator::new(client, config.models.curator.clone())
            .with_retry(config.retry);

        Self {
            generator,
            reflector,
            curator,
            environment,
            playbook: Playbook::new(config.playbook.sections.clone()),
            audit: false,
            episodes_run: 0,
            last_reflection: None,
        }
    }

    /// Start from an existing (e.g. persisted or pre-seeded) playbook.
    pub fn with_playbook(mut self, playbook: Playbook) -> Self {
        self.playbook = playbook;
        self
    }

    /// Record an `AdapterStepResult` snapshot per pipeline stage.
    pub fn with_audit(mut self) -> Self {
        self.audit = true;
        self
    }

    pub fn playbook(&self) -> &Playbook {
        &self.playbook
    }

    /// Hand the playbook back, consuming the session (e.g. to persist it).
    pub fn into_playbook(self) -> Playbook {
        self.playbook
    }

    pub fn episodes_run(&self) -> u32 {
        self.episodes_run
    }

    /// Run one full episode. Role failures abort the episode and propagate;
    /// the playbook keeps whatever state it had before the failing stage.
    pub async fn run_episode(&mut self, sample: &Sample) -> Result<EpisodeOutcome> {
        let episode = self.episodes_run + 1;
        info!(episode, question = sample.question.as_str(), "starting episode");
        let mut steps = Vec::new();

        // Generate
        let generator_output = self
            .generator
            .generate(
                &sample.question,
                sample.context.as_deref(),
                &self.playbook,
                self.last_reflection.as_deref(),
            )
            .await?;
        self.snapshot(&mut steps, PipelineStage::Generation, &generator_output);

        // Evaluate (external collaborator)
        let environment_result = self.environment.evaluate(sample, &generator_output).await?;
        self.snapshot(&mut steps, PipelineStage::Evaluation, &environment_result);

        // Reflect, seeing only the referenced bullets
        let ground_truth = environment_result
            .ground_truth
            .as_deref()
            .or(sample.ground_truth.as_deref());
        let reflection = self
            .reflector
            .reflect(
                &sample.question,
                &generator_output,
                &self.playbook,
                ground_truth,
                Some(&environment_result.feedback),
            )
            .await?;
        self.snapshot(&mut steps, PipelineStage::Reflection, &reflection);

        // The reflector's helpful/harmful labels feed the bullet counters
        // and tag sets; unknown ids are absorbed by the store.
        for tag in &reflection.bullet_tags {
            match tag.tag.as_str() {
                "helpful" => self.playbook.mark_helpful(&tag.id),
                "harmful" => self.playbook.mark_harmful(&tag.id),
                _ => {}
            }
            self.playbook.tag_bullet(&tag.id, &tag.tag);
        }

        // Curate
        let progress = format!("episode {}", episode);
        let question_context = sample.context.as_deref().unwrap_or(&sample.question);
        let curation = self
            .curator
            .curate(&reflection, &self.playbook, question_context, &progress)
            .await?;
        self.snapshot(&mut steps, PipelineStage::Curation, &curation);

        // Apply — the explicit commit point for the proposed batch
        let applied = self.playbook.apply_delta(&curation.batch);
        self.snapshot(&mut steps, PipelineStage::Application, &applied);

        self.last_reflection = Some(reflection.as_feedback());
        self.episodes_run = episode;
        debug!(episode, ?applied, "episode complete");

        Ok(EpisodeOutcome {
            generator: generator_output,
            environment: environment_result,
            reflection,
            curation,
            applied,
            steps,
        })
    }

    fn snapshot<T: serde::Serialize>(
        &self,
        steps: &mut Vec<AdapterStepResult>,
        stage: PipelineStage,
        artifact: &T,
    ) {
        if !self.audit {
            return;
        }
        let artifact = serde_json::to_value(artifact).unwrap_or(serde_json::Value::Null);
        steps.push(AdapterStepResult::new(
            stage,
            artifact,
            self.playbook.as_prompt(),
        ));
    }
}
