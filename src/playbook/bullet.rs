//! A single reusable knowledge unit

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Helpful/harmful counters for one bullet.
///
/// Counters only ever increase; the reflector increments them over time via
/// its helpful/harmful tags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulletMetadata {
    #[serde(default)]
    pub helpful: u32,
    #[serde(default)]
    pub harmful: u32,
}

impl BulletMetadata {
    /// Signed "helpful minus harmful" score used in the prompt rendering.
    pub fn score(&self) -> i64 {
        self.helpful as i64 - self.harmful as i64
    }
}

/// One scored, taggable knowledge snippet stored in a section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bullet {
    /// Stable unique identifier within a playbook.
    pub id: String,
    /// Free-text knowledge snippet.
    pub content: String,
    /// One of the playbook's declared sections.
    pub section: String,
    #[serde(default)]
    pub metadata: BulletMetadata,
    /// Append-only set of free-text labels attached by the reflector.
    #[serde(default)]
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Bullet {
    /// Create a bullet with a freshly generated id.
    pub fn new(section: impl Into<String>, content: impl Into<String>) -> Self {
        Self::with_id(generate_bullet_id(), section, content)
    }

    /// Create a bullet with a caller-supplied id (pre-seeding, delta ADD).
    pub fn with_id(
        id: impl Into<String>,
        section: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            content: content.into(),
            section: section.into(),
            metadata: BulletMetadata::default(),
            tags: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Append a tag if not already present. Idempotent.
    pub fn add_tag(&mut self, tag: impl Into<String>) {
        let tag = tag.into();
        if !self.tags.contains(&tag) {
            self.tags.push(tag);
            self.updated_at = Utc::now();
        }
    }

    /// Increment the helpful counter.
    pub fn mark_helpful(&mut self) {
        self.metadata.helpful += 1;
        self.updated_at = Utc::now();
    }

    /// Increment the harmful counter.
    pub fn mark_harmful(&mut self) {
        self.metadata.harmful += 1;
        self.updated_at = Utc::now();
    }
}

/// Generate a short unique bullet id.
pub fn generate_bullet_id() -> String {
    let uuid = Uuid::new_v4().simple().to_string();
    format!("b-{}", &uuid[..8])
}
