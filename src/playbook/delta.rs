//! The playbook mutation protocol
//!
//! A delta batch is an ordered list of add/update/delete operations,
//! deserialized from an untrusted model-authored JSON payload. Entries
//! missing a required field are dropped here, before application, so the
//! store never sees a malformed operation.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

/// The three mutation kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DeltaKind {
    Add,
    Update,
    Delete,
}

impl DeltaKind {
    fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "ADD" => Some(DeltaKind::Add),
            "UPDATE" => Some(DeltaKind::Update),
            "DELETE" => Some(DeltaKind::Delete),
            _ => None,
        }
    }
}

/// Counter overrides carried by an operation. Absent fields leave the
/// existing counter untouched on UPDATE (shallow merge, incoming keys win).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeltaMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub helpful: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub harmful: Option<u32>,
}

/// One mutation instruction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeltaOperation {
    pub kind: DeltaKind,
    pub section: String,
    pub content: String,
    #[serde(default)]
    pub metadata: DeltaMetadata,
    /// Required for UPDATE/DELETE; optional for ADD (an id is generated).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bullet_id: Option<String>,
}

impl DeltaOperation {
    pub fn add(section: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            kind: DeltaKind::Add,
            section: section.into(),
            content: content.into(),
            metadata: DeltaMetadata::default(),
            bullet_id: None,
        }
    }

    pub fn update(
        bullet_id: impl Into<String>,
        section: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            kind: DeltaKind::Update,
            section: section.into(),
            content: content.into(),
            metadata: DeltaMetadata::default(),
            bullet_id: Some(bullet_id.into()),
        }
    }

    pub fn delete(bullet_id: impl Into<String>, section: impl Into<String>) -> Self {
        Self {
            kind: DeltaKind::Delete,
            section: section.into(),
            content: String::new(),
            metadata: DeltaMetadata::default(),
            bullet_id: Some(bullet_id.into()),
        }
    }

    /// Parse a single untrusted operation entry. Returns `None` when `type`,
    /// `section`, or `content` is missing or the type is unrecognized.
    fn from_value(value: &Value) -> Option<Self> {
        let kind = DeltaKind::parse(value.get("type")?.as_str()?)?;
        let section = value.get("section")?.as_str()?.to_string();
        let content = value.get("content")?.as_str()?.to_string();

        let metadata = value
            .get("metadata")
            .map(|m| DeltaMetadata {
                helpful: m.get("helpful").and_then(Value::as_u64).map(|v| v as u32),
                harmful: m.get("harmful").and_then(Value::as_u64).map(|v| v as u32),
            })
            .unwrap_or_default();

        let bullet_id = value
            .get("bullet_id")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string());

        Some(Self {
            kind,
            section,
            content,
            metadata,
            bullet_id,
        })
    }
}

/// An ordered sequence of delta operations.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeltaBatch {
    pub operations: Vec<DeltaOperation>,
}

impl DeltaBatch {
    pub fn new(operations: Vec<DeltaOperation>) -> Self {
        Self { operations }
    }

    /// Deserialize a batch from an untrusted `operations` array.
    ///
    /// Malformed entries (missing `type`, `section`, or `content`, or a
    /// non-object entry) are dropped with a warning; well-formed entries keep
    /// their original order.
    pub fn from_operations_value(operations: &Value) -> Self {
        let entries = match operations.as_array() {
            Some(arr) => arr,
            None => {
                warn!("delta payload is not an array, dropping it entirely");
                return Self::default();
            }
        };

        let mut parsed = Vec::with_capacity(entries.len());
        for (index, entry) in entries.iter().enumerate() {
            match DeltaOperation::from_value(entry) {
                Some(op) => parsed.push(op),
                None => warn!(index, "dropping malformed delta operation"),
            }
        }
        Self { operations: parsed }
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }
}
