//! Curator role
//!
//! Translates a reflection into a concrete delta batch. The curator only
//! proposes mutations; applying the batch to the playbook is the caller's
//! explicit next step, so a batch can be inspected or vetoed before commit.

use std::sync::Arc;
use tracing::{debug, warn};

use super::parse::{self, ParseFailure};
use crate::config::RetryPolicy;
use crate::error::RoleError;
use crate::llm::{CompletionClient, CompletionOptions};
use crate::playbook::{DeltaBatch, Playbook};
use crate::types::{CuratorOutput, ReflectorOutput};

/// The knowledge-curation role.
pub struct Curator {
    client: Arc<dyn CompletionClient>,
    options: CompletionOptions,
    retry: RetryPolicy,
}

impl Curator {
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

    /// Turn a reflection into a delta batch.
    ///
    /// The response must parse as a JSON object with an `operations` array;
    /// individual malformed operations are dropped by the batch deserializer
    /// without failing the curation. Exhausting the retry budget raises a
    /// curation failure carrying the last parse error.
    pub async fn curate(
        &self,
        reflection: &ReflectorOutput,
        playbook: &Playbook,
        question_context: &str,
        progress: &str,
    ) -> Result<CuratorOutput, RoleError> {
        let prompt = self.build_prompt(reflection, playbook, question_context, progress);
        debug!(prompt_len = prompt.len(), "curator prompt built");

        let mut last_error = String::new();
        for attempt in 1..=self.retry.max_attempts {
            self.retry.pause_before(attempt).await;

            let text = match self.client.complete(&prompt, &self.options).await {
                Ok(text) => text,
                Err(e) => {
                    last_error = ParseFailure::Client(e.to_string()).to_string();
                    warn!(attempt, error = last_error.as_str(), "curator attempt failed");
                    continue;
                }
            };

            match self.parse_operations(&text) {
                Ok(output) => {
                    debug!(attempt, operations = output.batch.len(), "curator response parsed");
                    return Ok(output);
                }
                Err(e) => {
                    last_error = e.to_string();
                    warn!(attempt, error = last_error.as_str(), "curator parse failed");
                }
            }
        }

        Err(RoleError::Curation {
            attempts: self.retry.max_attempts,
            last_error,
        })
    }

    fn parse_operations(&self, text: &str) -> Result<CuratorOutput, ParseFailure> {
        let value = parse::extract_object(text)?;
        let operations = value
            .get("operations")
            .ok_or(ParseFailure::MissingField("operations"))?;
        if !operations.is_array() {
            return Err(ParseFailure::WrongFieldType("operations"));
        }
        let batch = DeltaBatch::from_operations_value(operations);
        Ok(CuratorOutput { batch, raw: value })
    }

    fn build_prompt(
        &self,
        reflection: &ReflectorOutput,
        playbook: &Playbook,
        question_context: &str,
        progress: &str,
    ) -> String {
        let stats = playbook.stats();
        let playbook_text = if playbook.is_empty() {
            "(the playbook is empty)".to_string()
        } else {
            playbook.as_prompt()
        };
        let reflection_payload = raw_reflection_payload(reflection);
        let sections = playbook.sections().join(", ");

        format!(
            r#"You are a knowledge curator. Evolve the playbook below so future answers avoid the mistakes described in the reflection. Add new bullets for missing knowledge, update bullets that are wrong or imprecise, and delete bullets that proved harmful.

PROGRESS: {progress}

PLAYBOOK STATS: {stats}

REFLECTION:
{reflection_payload}

CURRENT PLAYBOOK:
{playbook_text}

QUESTION CONTEXT:
{question_context}

Valid sections: {sections}

Respond with exactly one JSON object:
{{"operations": [{{"type": "ADD" | "UPDATE" | "DELETE", "section": "<section>", "content": "<bullet text>", "bullet_id": "<required for UPDATE/DELETE>"}}]}}
An empty operations list is valid when no change is warranted."#
        )
    }
}

/// The full raw reflection payload for the curator prompt. Falls back to
/// re-serializing the structured output when the raw payload is absent
/// (e.g. a hand-built reflection in tests).
fn raw_reflection_payload(reflection: &ReflectorOutput) -> String {
    if reflection.raw.is_null() {
        serde_json::to_string_pretty(reflection).unwrap_or_else(|_| reflection.as_feedback())
    } else {
        serde_json::to_string_pretty(&reflection.raw)
            .unwrap_or_else(|_| reflection.raw.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    struct ScriptedClient {
        responses: Mutex<Vec<String>>,
    }

    impl ScriptedClient {
        fn new(responses: Vec<String>) -> Arc<Self> {
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
            Ok(responses.remove(0))
        }
    }

    fn reflection() -> ReflectorOutput {
        ReflectorOutput {
            reasoning: "checked the feedback".to_string(),
            error_identification: "missed a caveat".to_string(),
            root_cause_analysis: "no warning bullet existed".to_string(),
            correct_approach: "warn about unverifiable claims".to_string(),
            key_insight: "avoid unverifiable claims".to_string(),
            bullet_tags: vec![],
            raw: serde_json::Value::Null,
        }
    }

    #[tokio::test]
    async fn test_curate_parses_operations() {
        let response = json!({
            "operations": [
                {"type": "ADD", "section": "guidelines", "content": "prefer primary evidence"},
                {"type": "ADD", "section": "warnings", "content": "avoid unverifiable claims"},
                {"type": "ADD", "content": "malformed, no section"}
            ]
        });
        let client = ScriptedClient::new(vec![response.to_string()]);
        let curator = Curator::new(client, "test-model");
        let playbook = Playbook::default();

        let output = curator
            .curate(&reflection(), &playbook, "geography quiz", "episode 1")
            .await
            .unwrap();
        // the malformed third entry is dropped by the deserializer
        assert_eq!(output.batch.len(), 2);
    }

    #[tokio::test]
    async fn test_missing_operations_field_is_parse_failure() {
        let client = ScriptedClient::new(vec![
            json!({"ops": []}).to_string(),
            json!({"operations": "not a list"}).to_string(),
            json!({"operations": []}).to_string(),
        ]);
        let curator = Curator::new(client, "test-model");
        let playbook = Playbook::default();

        // first two responses fail the parse bar, the third succeeds
        let output = curator
            .curate(&reflection(), &playbook, "ctx", "episode 1")
            .await
            .unwrap();
        assert!(output.batch.is_empty());
    }

    #[tokio::test]
    async fn test_exhausted_retries_raise_curation_failure() {
        let responses: Vec<String> = (0..3).map(|_| "not json".to_string()).collect();
        let client = ScriptedClient::new(responses);
        let curator = Curator::new(client, "test-model");
        let playbook = Playbook::default();

        let err = curator
            .curate(&reflection(), &playbook, "ctx", "episode 1")
            .await
            .unwrap_err();
        match err {
            RoleError::Curation { attempts, ref last_error } => {
                assert_eq!(attempts, 3);
                assert!(!last_error.is_empty());
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_prompt_embeds_stats_and_playbook() {
        let mut playbook = Playbook::default();
        playbook.apply_delta(&DeltaBatch::new(vec![
            crate::playbook::DeltaOperation::add("guidelines", "existing wisdom"),
        ]));

        let curator = Curator::new(ScriptedClient::new(vec![]), "test-model");
        let prompt = curator.build_prompt(&reflection(), &playbook, "ctx", "episode 4");
        assert!(prompt.contains("episode 4"));
        assert!(prompt.contains("1 bullet(s)"));
        assert!(prompt.contains("existing wisdom"));
        assert!(prompt.contains("missed a caveat"));
    }
}
