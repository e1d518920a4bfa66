//! Shared episode artifact types
//!
//! This module contains the per-episode records passed hand-to-hand through
//! the pipeline. None of these survive past the episode; only the Playbook
//! does.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One task instance: a question, optional context, optional ground truth.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sample {
    pub question: String,
    #[serde(default)]
    pub context: Option<String>,
    #[serde(default)]
    pub ground_truth: Option<String>,
}

impl Sample {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            context: None,
            ground_truth: None,
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn with_ground_truth(mut self, ground_truth: impl Into<String>) -> Self {
        self.ground_truth = Some(ground_truth.into());
        self
    }
}

/// Output of the generator role.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratorOutput {
    /// The model's working-through of the problem.
    pub reasoning: String,
    /// The candidate answer.
    pub final_answer: String,
    /// Ids of the playbook bullets the answer actually relied on.
    pub bullet_ids: Vec<String>,
    /// The raw parsed payload, kept for auditing.
    pub raw: serde_json::Value,
}

/// Score and feedback produced by the task environment for one answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvironmentResult {
    /// Free-text feedback on the answer.
    pub feedback: String,
    #[serde(default)]
    pub ground_truth: Option<String>,
    /// Numeric metrics, e.g. `accuracy`.
    #[serde(default)]
    pub metrics: HashMap<String, f64>,
}

/// A helpful/harmful label the reflector attaches to one consulted bullet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulletTag {
    pub id: String,
    /// Lower-cased on ingestion.
    pub tag: String,
}

/// Output of the reflector role: the structured critique of one answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReflectorOutput {
    pub reasoning: String,
    pub error_identification: String,
    pub root_cause_analysis: String,
    pub correct_approach: String,
    pub key_insight: String,
    /// Per-bullet helpful/harmful labels for the bullets the generator used.
    pub bullet_tags: Vec<BulletTag>,
    pub raw: serde_json::Value,
}

impl ReflectorOutput {
    /// Render the critique as free text suitable for conditioning the next
    /// generator call.
    pub fn as_feedback(&self) -> String {
        format!(
            "Error: {}\nRoot cause: {}\nCorrect approach: {}\nKey insight: {}",
            self.error_identification,
            self.root_cause_analysis,
            self.correct_approach,
            self.key_insight
        )
    }
}

/// Output of the curator role: the proposed playbook mutations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CuratorOutput {
    pub batch: crate::playbook::DeltaBatch,
    pub raw: serde_json::Value,
}

/// Pipeline stage names used in audit snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PipelineStage {
    Generation,
    Evaluation,
    Reflection,
    Curation,
    Application,
}

impl std::fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineStage::Generation => write!(f, "generation"),
            PipelineStage::Evaluation => write!(f, "evaluation"),
            PipelineStage::Reflection => write!(f, "reflection"),
            PipelineStage::Curation => write!(f, "curation"),
            PipelineStage::Application => write!(f, "application"),
        }
    }
}

/// Audit snapshot of one pipeline step: the stage's artifact alongside the
/// playbook's serialized state at that moment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdapterStepResult {
    pub stage: PipelineStage,
    pub artifact: serde_json::Value,
    /// `Playbook::as_prompt()` at the time of the step.
    pub playbook: String,
    pub timestamp: DateTime<Utc>,
}

impl AdapterStepResult {
    pub fn new(stage: PipelineStage, artifact: serde_json::Value, playbook: String) -> Self {
        Self {
            stage,
            artifact,
            playbook,
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_builder() {
        let sample = Sample::new("What is the capital of France?")
            .with_context("European geography")
            .with_ground_truth("Paris");
        assert_eq!(sample.question, "What is the capital of France?");
        assert_eq!(sample.context.as_deref(), Some("European geography"));
        assert_eq!(sample.ground_truth.as_deref(), Some("Paris"));
    }

    #[test]
    fn test_reflection_as_feedback() {
        let reflection = ReflectorOutput {
            reasoning: "thought about it".to_string(),
            error_identification: "answer was stale".to_string(),
            root_cause_analysis: "relied on an outdated bullet".to_string(),
            correct_approach: "check dates".to_string(),
            key_insight: "prefer recent sources".to_string(),
            bullet_tags: vec![],
            raw: serde_json::Value::Null,
        };
        let feedback = reflection.as_feedback();
        assert!(feedback.contains("answer was stale"));
        assert!(feedback.contains("prefer recent sources"));
    }
}
