//! Generator role
//!
//! Produces a candidate answer plus reasoning, conditioned on the current
//! playbook and an optional prior critique. Never mutates the playbook.

use std::sync::Arc;
use tracing::{debug, warn};

use super::parse::{self, ParseFailure};
use crate::config::RetryPolicy;
use crate::error::RoleError;
use crate::llm::{CompletionClient, CompletionOptions};
use crate::playbook::Playbook;
use crate::types::GeneratorOutput;

/// The answer-generation role.
pub struct Generator {
    client: Arc<dyn CompletionClient>,
    options: CompletionOptions,
    retry: RetryPolicy,
}

impl Generator {
    pub fn new(client: Arc<dyn CompletionClient>, model: impl Into<String>) -> Self {
        Self {
            client,
            options: CompletionOptions::for_model(model),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Generate an answer for `question`.
    ///
    /// The response must parse as a JSON object; `reasoning`,
    /// `final_answer`, and `bullet_ids` default to empty values when absent.
    /// Parse failures retry immediately up to the configured attempt budget;
    /// exhaustion raises a generation failure carrying the last parse error.
    pub async fn generate(
        &self,
        question: &str,
        context: Option<&str>,
        playbook: &Playbook,
        prior_reflection: Option<&str>,
    ) -> Result<GeneratorOutput, RoleError> {
        let prompt = self.build_prompt(question, context, playbook, prior_reflection);
        debug!(prompt_len = prompt.len(), "generator prompt built");

        let mut last_error = String::new();
        for attempt in 1..=self.retry.max_attempts {
            self.retry.pause_before(attempt).await;

            let text = match self.client.complete(&prompt, &self.options).await {
                Ok(text) => text,
                Err(e) => {
                    last_error = ParseFailure::Client(e.to_string()).to_string();
                    warn!(attempt, error = last_error.as_str(), "generator attempt failed");
                    continue;
                }
            };

            match parse::extract_object(&text) {
                Ok(value) => {
                    debug!(attempt, "generator response parsed");
                    return Ok(output_from_value(value));
                }
                Err(e) => {
                    last_error = e.to_string();
                    warn!(attempt, error = last_error.as_str(), "generator parse failed");
                }
            }
        }

        Err(RoleError::Generation {
            attempts: self.retry.max_attempts,
            last_error,
        })
    }

    fn build_prompt(
        &self,
        question: &str,
        context: Option<&str>,
        playbook: &Playbook,
        prior_reflection: Option<&str>,
    ) -> String {
        let playbook_text = if playbook.is_empty() {
            "(the playbook is empty)".to_string()
        } else {
            playbook.as_prompt()
        };
        let reflection_text = prior_reflection.unwrap_or("none");
        let context_text = context.unwrap_or("none");

        format!(
            r#"You are an answer generator. Use the accumulated playbook below to answer the question. Bullets are scored by how often they helped or hurt past answers.

PLAYBOOK:
{playbook_text}

PRIOR REFLECTION:
{reflection_text}

QUESTION:
{question}

CONTEXT:
{context_text}

Respond with exactly one JSON object:
{{"reasoning": "<how you arrived at the answer>", "final_answer": "<the answer>", "bullet_ids": ["<ids of playbook bullets your answer actually relied on>"]}}"#
        )
    }
}

fn output_from_value(value: serde_json::Value) -> GeneratorOutput {
    GeneratorOutput {
        reasoning: parse::string_field(&value, "reasoning"),
        final_answer: parse::string_field(&value, "final_answer"),
        bullet_ids: parse::string_list_field(&value, "bullet_ids"),
        raw: value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Stub client that pops canned responses in order.
    struct ScriptedClient {
        responses: Mutex<Vec<Result<String, String>>>,
    }

    impl ScriptedClient {
        fn new(responses: Vec<Result<String, String>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses),
            })
        }
    }

    #[async_trait]
    impl CompletionClient for ScriptedClient {
        async fn complete(&self, _prompt: &str, _options: &CompletionOptions) -> Result<String> {
            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                anyhow::bail!("scripted client ran out of responses");
            }
            responses.remove(0).map_err(|e| anyhow::anyhow!(e))
        }
    }

    #[tokio::test]
    async fn test_generate_parses_valid_response() {
        let client = ScriptedClient::new(vec![Ok(
            r#"{"reasoning": "looked it up", "final_answer": "Paris", "bullet_ids": ["b-1"]}"#
                .to_string(),
        )]);
        let generator = Generator::new(client, "test-model");
        let playbook = Playbook::default();

        let output = generator
            .generate("Capital of France?", None, &playbook, None)
            .await
            .unwrap();
        assert_eq!(output.final_answer, "Paris");
        assert_eq!(output.bullet_ids, vec!["b-1"]);
    }

    #[tokio::test]
    async fn test_missing_fields_default() {
        let client = ScriptedClient::new(vec![Ok(r#"{"final_answer": "Paris"}"#.to_string())]);
        let generator = Generator::new(client, "test-model");
        let playbook = Playbook::default();

        let output = generator
            .generate("Capital of France?", None, &playbook, None)
            .await
            .unwrap();
        assert_eq!(output.reasoning, "");
        assert!(output.bullet_ids.is_empty());
    }

    #[tokio::test]
    async fn test_retry_succeeds_on_third_attempt() {
        let client = ScriptedClient::new(vec![
            Ok("not json at all".to_string()),
            Ok("still not json".to_string()),
            Ok(r#"{"final_answer": "Paris"}"#.to_string()),
        ]);
        let generator = Generator::new(client, "test-model");
        let playbook = Playbook::default();

        let output = generator
            .generate("Capital of France?", None, &playbook, None)
            .await
            .unwrap();
        assert_eq!(output.final_answer, "Paris");
    }

    #[tokio::test]
    async fn test_exhausted_retries_carry_last_error() {
        let client = ScriptedClient::new(vec![
            Ok("nope".to_string()),
            Ok("nope".to_string()),
            Ok("nope".to_string()),
        ]);
        let generator = Generator::new(client, "test-model");
        let playbook = Playbook::default();

        let err = generator
            .generate("Capital of France?", None, &playbook, None)
            .await
            .unwrap_err();
        match err {
            RoleError::Generation { attempts, ref last_error } => {
                assert_eq!(attempts, 3);
                assert!(last_error.contains("JSON"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_prompt_marks_empty_playbook() {
        let generator = Generator::new(
            ScriptedClient::new(vec![]),
            "test-model",
        );
        let playbook = Playbook::default();
        let prompt = generator.build_prompt("Q?", None, &playbook, None);
        assert!(prompt.contains("(the playbook is empty)"));
        assert!(prompt.contains("PRIOR REFLECTION:\nnone"));
        assert!(prompt.contains("CONTEXT:\nnone"));
    }
}
