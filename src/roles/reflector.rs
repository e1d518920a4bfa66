//! Reflector role
//!
//! Compares a generated answer against ground truth and environment
//! feedback, explains the discrepancy, and labels the consulted bullets
//! helpful or harmful. Only the bullets the generator actually referenced
//! enter the critique prompt, which keeps it bounded.

use std::sync::Arc;
use tracing::{debug, warn};

use super::parse::{self, ParseFailure};
use crate::config::RetryPolicy;
use crate::error::RoleError;
use crate::llm::{CompletionClient, CompletionOptions};
use crate::playbook::Playbook;
use crate::types::{BulletTag, GeneratorOutput, ReflectorOutput};

/// The critique role.
pub struct Reflector {
    client: Arc<dyn CompletionClient>,
    options: CompletionOptions,
    retry: RetryPolicy,
    max_refinement_rounds: u32,
}

impl Reflector {
    pub fn new(client: Arc<dyn CompletionClient>, model: impl Into<String>) -> Self {
        Self {
            client,
            options: CompletionOptions::for_model(model),
            retry: RetryPolicy::default(),
            max_refinement_rounds: 1,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Override the number of refinement rounds (default 1). Each round gets
    /// its own full retry budget.
    pub fn with_rounds(mut self, rounds: u32) -> Self {
        self.max_refinement_rounds = rounds.max(1);
        self
    }

    /// Critique one generated answer.
    ///
    /// Runs up to the configured refinement rounds, each with an inner retry
    /// loop; the first successfully parsed response returns. Exhausting every
    /// round raises a reflection failure carrying the last parse error.
    pub async fn reflect(
        &self,
        question: &str,
        generator_output: &GeneratorOutput,
        playbook: &Playbook,
        ground_truth: Option<&str>,
        feedback: Option<&str>,
    ) -> Result<ReflectorOutput, RoleError> {
        let prompt = self.build_prompt(question, generator_output, playbook, ground_truth, feedback);
        debug!(prompt_len = prompt.len(), "reflector prompt built");

        let mut last_error = String::new();
        let mut total_attempts = 0;

        for round in 1..=self.max_refinement_rounds {
            for attempt in 1..=self.retry.max_attempts {
                self.retry.pause_before(attempt).await;
                total_attempts += 1;

                let text = match self.client.complete(&prompt, &self.options).await {
                    Ok(text) => text,
                    Err(e) => {
                        last_error = ParseFailure::Client(e.to_string()).to_string();
                        warn!(round, attempt, error = last_error.as_str(), "reflector attempt failed");
                        continue;
                    }
                };

                match parse::extract_object(&text) {
                    Ok(value) => {
                        debug!(round, attempt, "reflector response parsed");
                        return Ok(output_from_value(value));
                    }
                    Err(e) => {
                        last_error = e.to_string();
                        warn!(round, attempt, error = last_error.as_str(), "reflector parse failed");
                    }
                }
            }
        }

        Err(RoleError::Reflection {
            rounds: self.max_refinement_rounds,
            attempts: total_attempts,
            last_error,
        })
    }

    fn build_prompt(
        &self,
        question: &str,
        generator_output: &GeneratorOutput,
        playbook: &Playbook,
        ground_truth: Option<&str>,
        feedback: Option<&str>,
    ) -> String {
        let excerpt = playbook.excerpt(&generator_output.bullet_ids);
        let excerpt_text = if excerpt.is_empty() {
            "(no playbook bullets were referenced)".to_string()
        } else {
            excerpt
        };

        format!(
            r#"You are a reflector. Analyze the generated answer below against the ground truth and environment feedback, explain what went wrong (or right), and judge each consulted playbook bullet.

QUESTION:
{question}

GENERATOR REASONING:
{reasoning}

GENERATED ANSWER:
{answer}

CONSULTED PLAYBOOK BULLETS:
{excerpt_text}

GROUND TRUTH:
{ground_truth}

ENVIRONMENT FEEDBACK:
{feedback}

Respond with exactly one JSON object:
{{"reasoning": "...", "error_identification": "...", "root_cause_analysis": "...", "correct_approach": "...", "key_insight": "...", "bullet_tags": [{{"id": "<bullet id>", "tag": "helpful" or "harmful"}}]}}
Only tag bullets that appear in the consulted list."#,
            question = question,
            reasoning = generator_output.reasoning,
            answer = generator_output.final_answer,
            excerpt_text = excerpt_text,
            ground_truth = ground_truth.unwrap_or("none"),
            feedback = feedback.unwrap_or("none"),
        )
    }
}

fn output_from_value(value: serde_json::Value) -> ReflectorOutput {
    ReflectorOutput {
        reasoning: parse::string_field(&value, "reasoning"),
        error_identification: parse::string_field(&value, "error_identification"),
        root_cause_analysis: parse::string_field(&value, "root_cause_analysis"),
        correct_approach: parse::string_field(&value, "correct_approach"),
        key_insight: parse::string_field(&value, "key_insight"),
        bullet_tags: tags_from_value(&value),
        raw: value,
    }
}

/// Parse the `bullet_tags` list. Malformed entries are dropped individually
/// rather than failing the whole reflection; tags are lower-cased on
/// ingestion.
fn tags_from_value(value: &serde_json::Value) -> Vec<BulletTag> {
    let entries = match value.get("bullet_tags").and_then(|v| v.as_array()) {
        Some(arr) => arr,
        None => return Vec::new(),
    };

    let mut tags = Vec::with_capacity(entries.len());
    for entry in entries {
        let id = entry.get("id").and_then(|v| v.as_str());
        let tag = entry.get("tag").and_then(|v| v.as_str());
        match (id, tag) {
            (Some(id), Some(tag)) if !id.is_empty() && !tag.is_empty() => tags.push(BulletTag {
                id: id.to_string(),
                tag: tag.to_lowercase(),
            }),
            _ => debug!("dropping malformed bullet tag entry"),
        }
    }
    tags
}
