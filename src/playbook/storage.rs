//! Playbook persistence
//!
//! The core types are storage-agnostic; this module gives the owning
//! application a JSON file round-trip under its data directory.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

use super::store::Playbook;

/// JSON-file-backed playbook storage.
pub struct PlaybookStorage {
    path: PathBuf,
}

impl PlaybookStorage {
    /// Storage rooted at an explicit file path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Storage at the default location inside a base directory.
    pub fn in_dir(base_dir: impl AsRef<Path>) -> Self {
        Self {
            path: base_dir.as_ref().join("playbook.json"),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the playbook, or a fresh default one when no file exists yet.
    pub async fn load(&self) -> Result<Playbook> {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "no playbook file, starting empty");
            return Ok(Playbook::default());
        }

        let content = fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("Failed to read {}", self.path.display()))?;
        let playbook: Playbook =
            serde_json::from_str(&content).context("Failed to parse playbook JSON")?;

        debug!(
            bullets = playbook.bullets().len(),
            "loaded playbook from {}",
            self.path.display()
        );
        Ok(playbook)
    }

    /// Save the playbook, creating parent directories as needed.
    pub async fn save(&self, playbook: &Playbook) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let json = serde_json::to_string_pretty(playbook).context("Failed to serialize playbook")?;
        fs::write(&self.path, json)
            .await
            .with_context(|| format!("Failed to write {}", self.path.display()))?;

        info!(
            bullets = playbook.bullets().len(),
            "saved playbook to {}",
            self.path.display()
        );
        Ok(())
    }

    /// Reset to an empty playbook on disk.
    pub async fn reset(&self) -> Result<Playbook> {
        let playbook = Playbook::default();
        self.save(&playbook).await?;
        Ok(playbook)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playbook::delta::{DeltaBatch, DeltaOperation};
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_load_missing_file_returns_empty() {
        let dir = tempdir().unwrap();
        let storage = PlaybookStorage::in_dir(dir.path());
        let playbook = storage.load().await.unwrap();
        assert!(playbook.is_empty());
    }

    #[tokio::test]
    async fn test_round_trip_preserves_state() {
        let dir = tempdir().unwrap();
        let storage = PlaybookStorage::in_dir(dir.path());

        let mut playbook = Playbook::default();
        playbook.apply_delta(&DeltaBatch::new(vec![
            DeltaOperation::add("guidelines", "prefer primary evidence"),
            DeltaOperation::add("warnings", "avoid unverifiable claims"),
        ]));
        let id = playbook.bullets()[0].id.clone();
        playbook.mark_helpful(&id);
        playbook.tag_bullet(&id, "helpful");

        storage.save(&playbook).await.unwrap();
        let loaded = storage.load().await.unwrap();

        assert_eq!(loaded.stats().total_bullets, 2);
        let bullet = loaded.get_bullet(&id).unwrap();
        assert_eq!(bullet.metadata.helpful, 1);
        assert_eq!(bullet.tags, vec!["helpful".to_string()]);
        assert_eq!(loaded.sections(), playbook.sections());
    }

    #[tokio::test]
    async fn test_reset_clears_store() {
        let dir = tempdir().unwrap();
        let storage = PlaybookStorage::in_dir(dir.path());

        let mut playbook = Playbook::default();
        playbook.apply_delta(&DeltaBatch::new(vec![DeltaOperation::add(
            "defaults",
            "short-lived",
        )]));
        storage.save(&playbook).await.unwrap();

        let reset = storage.reset().await.unwrap();
        assert!(reset.is_empty());
        assert!(storage.load().await.unwrap().is_empty());
    }
}
