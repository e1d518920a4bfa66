//! The knowledge store
//!
//! Owns the mutable bullet collection and the fixed ordered section list.
//! Mutation happens only through `apply_delta` and `tag_bullet`; the store
//! carries no lock, so concurrent episodes sharing one instance must be
//! serialized by the caller.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info, warn};

use super::bullet::{generate_bullet_id, Bullet, BulletMetadata};
use super::delta::{DeltaBatch, DeltaKind};

/// Section names used when a caller does not declare its own.
pub const DEFAULT_SECTIONS: &[&str] = &["defaults", "guidelines", "examples", "warnings"];

/// Aggregate statistics over a playbook.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybookStats {
    pub total_bullets: usize,
    /// Bullets whose helpful counter strictly exceeds harmful.
    pub helpful_bullets: usize,
    /// Bullets whose harmful counter strictly exceeds helpful. Ties count
    /// toward neither bucket.
    pub harmful_bullets: usize,
    /// Bullet count per declared section.
    pub sections: HashMap<String, usize>,
}

impl std::fmt::Display for PlaybookStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} bullet(s), {} helpful, {} harmful",
            self.total_bullets, self.helpful_bullets, self.harmful_bullets
        )
    }
}

/// Counts of what one `apply_delta` call actually did. Informational only;
/// a batch never fails part-way.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyReport {
    pub added: usize,
    pub updated: usize,
    pub deleted: usize,
    pub skipped: usize,
}

/// The knowledge store: an ordered bullet list grouped into declared
/// sections. The only state that survives across episodes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Playbook {
    sections: Vec<String>,
    bullets: Vec<Bullet>,
}

impl Default for Playbook {
    fn default() -> Self {
        Self::new(DEFAULT_SECTIONS.iter().map(|s| s.to_string()).collect())
    }
}

impl Playbook {
    /// Create an empty playbook with the given ordered section names.
    pub fn new(sections: Vec<String>) -> Self {
        Self {
            sections,
            bullets: Vec::new(),
        }
    }

    /// Pre-seed a bullet, bypassing the delta protocol. Intended for session
    /// setup; panics are avoided by silently replacing a duplicate id.
    pub fn seed_bullet(&mut self, bullet: Bullet) {
        self.bullets.retain(|b| b.id != bullet.id);
        self.bullets.push(bullet);
    }

    /// The declared section names, in order.
    pub fn sections(&self) -> &[String] {
        &self.sections
    }

    /// All bullets in insertion order.
    pub fn bullets(&self) -> &[Bullet] {
        &self.bullets
    }

    pub fn is_empty(&self) -> bool {
        self.bullets.is_empty()
    }

    /// Look up a bullet by id.
    pub fn get_bullet(&self, id: &str) -> Option<&Bullet> {
        self.bullets.iter().find(|b| b.id == id)
    }

    /// Append `tag` to a bullet's tag set if not already present.
    ///
    /// A missing id is a no-op, not an error: the reflector may reference
    /// ids the model hallucinated.
    pub fn tag_bullet(&mut self, id: &str, tag: &str) {
        match self.bullets.iter_mut().find(|b| b.id == id) {
            Some(bullet) => bullet.add_tag(tag),
            None => debug!(id, tag, "tag_bullet: unknown bullet id, skipping"),
        }
    }

    /// Increment a bullet's helpful counter. Missing ids are skipped.
    pub fn mark_helpful(&mut self, id: &str) {
        match self.bullets.iter_mut().find(|b| b.id == id) {
            Some(bullet) => bullet.mark_helpful(),
            None => debug!(id, "mark_helpful: unknown bullet id, skipping"),
        }
    }

    /// Increment a bullet's harmful counter. Missing ids are skipped.
    pub fn mark_harmful(&mut self, id: &str) {
        match self.bullets.iter_mut().find(|b| b.id == id) {
            Some(bullet) => bullet.mark_harmful(),
            None => debug!(id, "mark_harmful: unknown bullet id, skipping"),
        }
    }

    /// Serialize the playbook for prompt embedding.
    ///
    /// Bullets are grouped by section in declared order; empty sections are
    /// skipped. Each bullet renders as its id, content, and signed
    /// helpful-minus-harmful score. Deterministic for a given bullet set.
    /// Returns an empty string when no bullets exist.
    pub fn as_prompt(&self) -> String {
        if self.bullets.is_empty() {
            return String::new();
        }

        let mut out = String::with_capacity(self.bullets.len() * 64);
        for section in &self.sections {
            let in_section: Vec<&Bullet> = self
                .bullets
                .iter()
                .filter(|b| &b.section == section)
                .collect();
            if in_section.is_empty() {
                continue;
            }

            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str(&format!("## {}\n", section));
            for bullet in in_section {
                out.push_str(&format!(
                    "- [{}] {} (score: {:+})\n",
                    bullet.id,
                    bullet.content,
                    bullet.metadata.score()
                ));
            }
        }
        out
    }

    /// Serialize a bounded excerpt containing only the given bullet ids.
    ///
    /// Ids are deduplicated and lookup misses silently dropped; the result
    /// keeps the same section grouping as `as_prompt`. Used by the reflector
    /// to keep its critique prompt focused on the consulted bullets.
    pub fn excerpt(&self, ids: &[String]) -> String {
        let mut seen = Vec::new();
        for id in ids {
            if !seen.contains(id) && self.get_bullet(id).is_some() {
                seen.push(id.clone());
            } else if self.get_bullet(id).is_none() {
                debug!(id = id.as_str(), "excerpt: unknown bullet id, dropping");
            }
        }
        if seen.is_empty() {
            return String::new();
        }

        let mut out = String::new();
        for section in &self.sections {
            let in_section: Vec<&Bullet> = seen
                .iter()
                .filter_map(|id| self.get_bullet(id))
                .filter(|b| &b.section == section)
                .collect();
            if in_section.is_empty() {
                continue;
            }
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str(&format!("## {}\n", section));
            for bullet in in_section {
                out.push_str(&format!(
                    "- [{}] {} (score: {:+})\n",
                    bullet.id,
                    bullet.content,
                    bullet.metadata.score()
                ));
            }
        }
        out
    }

    /// Apply a delta batch, operation by operation, in order.
    ///
    /// There is no rollback across the batch and no operation-level error:
    /// unknown ids and undeclared sections are skipped (and logged), never
    /// raised. Malformed operations were already filtered out during
    /// deserialization.
    pub fn apply_delta(&mut self, batch: &DeltaBatch) -> ApplyReport {
        let mut report = ApplyReport::default();

        for op in &batch.operations {
            match op.kind {
                DeltaKind::Add => {
                    if !self.sections.contains(&op.section) {
                        warn!(section = op.section.as_str(), "ADD targets undeclared section, skipping");
                        report.skipped += 1;
                        continue;
                    }
                    let id = op
                        .bullet_id
                        .clone()
                        .unwrap_or_else(generate_bullet_id);
                    if self.bullets.iter().any(|b| b.id == id) {
                        warn!(id = id.as_str(), "ADD reuses an existing bullet id, skipping");
                        report.skipped += 1;
                        continue;
                    }
                    let mut bullet = Bullet::with_id(id, op.section.clone(), op.content.clone());
                    bullet.metadata = BulletMetadata {
                        helpful: op.metadata.helpful.unwrap_or(0),
                        harmful: op.metadata.harmful.unwrap_or(0),
                    };
                    self.bullets.push(bullet);
                    report.added += 1;
                }
                DeltaKind::Update => {
                    if !self.sections.contains(&op.section) {
                        warn!(section = op.section.as_str(), "UPDATE targets undeclared section, skipping");
                        report.skipped += 1;
                        continue;
                    }
                    let id = match op.bullet_id.as_deref() {
                        Some(id) => id,
                        None => {
                            warn!("UPDATE without bullet_id, skipping");
                            report.skipped += 1;
                            continue;
                        }
                    };
                    match self.bullets.iter_mut().find(|b| b.id == id) {
                        Some(bullet) => {
                            bullet.content = op.content.clone();
                            bullet.section = op.section.clone();
                            // Shallow merge: incoming counters win, absent
                            // counters keep their current value.
                            if let Some(helpful) = op.metadata.helpful {
                                bullet.metadata.helpful = helpful;
                            }
                            if let Some(harmful) = op.metadata.harmful {
                                bullet.metadata.harmful = harmful;
                            }
                            bullet.updated_at = chrono::Utc::now();
                            report.updated += 1;
                        }
                        None => {
                            warn!(id, "UPDATE references unknown bullet id, skipping");
                            report.skipped += 1;
                        }
                    }
                }
                DeltaKind::Delete => {
                    let id = match op.bullet_id.as_deref() {
                        Some(id) => id,
                        None => {
                            warn!("DELETE without bullet_id, skipping");
                            report.skipped += 1;
                            continue;
                        }
                    };
                    let before = self.bullets.len();
                    self.bullets.retain(|b| b.id != id);
                    if self.bullets.len() < before {
                        report.deleted += 1;
                    } else {
                        warn!(id, "DELETE references unknown bullet id, skipping");
                        report.skipped += 1;
                    }
                }
            }
        }

        info!(
            added = report.added,
            updated = report.updated,
            deleted = report.deleted,
            skipped = report.skipped,
            "applied delta batch"
        );
        report
    }

    /// Aggregate statistics: bullet totals, helpful/harmful buckets (strict
    /// inequalities, ties count toward neither), and per-section counts for
    /// every declared section.
    pub fn stats(&self) -> PlaybookStats {
        let mut sections: HashMap<String, usize> =
            self.sections.iter().map(|s| (s.clone(), 0)).collect();
        let mut helpful_bullets = 0;
        let mut harmful_bullets = 0;

        for bullet in &self.bullets {
            if let Some(count) = sections.get_mut(&bullet.section) {
                *count += 1;
            }
            if bullet.metadata.helpful > bullet.metadata.harmful {
                helpful_bullets += 1;
            } else if bullet.metadata.harmful > bullet.metadata.helpful {
                harmful_bullets += 1;
            }
        }

        PlaybookStats {
            total_bullets: self.bullets.len(),
            helpful_bullets,
            harmful_bullets,
            sections,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playbook::delta::DeltaOperation;

    fn add_op(section: &str, content: &str) -> DeltaOperation {
        DeltaOperation::add(section, content)
    }

    #[test]
    fn test_empty_playbook_renders_empty_string() {
        let playbook = Playbook::default();
        assert_eq!(playbook.as_prompt(), "");
    }

    #[test]
    fn test_adds_count_per_section() {
        let mut playbook = Playbook::default();
        let batch = DeltaBatch::new(vec![
            add_op("guidelines", "prefer primary evidence"),
            add_op("guidelines", "cite the source"),
            add_op("warnings", "avoid unverifiable claims"),
        ]);
        let report = playbook.apply_delta(&batch);
        assert_eq!(report.added, 3);

        let stats = playbook.stats();
        assert_eq!(stats.total_bullets, 3);
        assert_eq!(stats.sections["guidelines"], 2);
        assert_eq!(stats.sections["warnings"], 1);
        assert_eq!(stats.sections["defaults"], 0);
    }

    #[test]
    fn test_update_preserves_id_and_count() {
        let mut playbook = Playbook::default();
        playbook.apply_delta(&DeltaBatch::new(vec![add_op("guidelines", "original")]));
        let id = playbook.bullets()[0].id.clone();

        let report = playbook.apply_delta(&DeltaBatch::new(vec![DeltaOperation::update(
            id.clone(),
            "warnings",
            "revised",
        )]));
        assert_eq!(report.updated, 1);
        assert_eq!(playbook.stats().total_bullets, 1);

        let bullet = playbook.get_bullet(&id).unwrap();
        assert_eq!(bullet.content, "revised");
        assert_eq!(bullet.section, "warnings");
    }

    #[test]
    fn test_update_unknown_id_is_noop() {
        let mut playbook = Playbook::default();
        playbook.apply_delta(&DeltaBatch::new(vec![add_op("guidelines", "keep")]));

        let report = playbook.apply_delta(&DeltaBatch::new(vec![DeltaOperation::update(
            "b-missing",
            "guidelines",
            "never lands",
        )]));
        assert_eq!(report.updated, 0);
        assert_eq!(report.skipped, 1);
        assert_eq!(playbook.stats().total_bullets, 1);
        assert_eq!(playbook.bullets()[0].content, "keep");
    }

    #[test]
    fn test_delete_existing_and_missing() {
        let mut playbook = Playbook::default();
        playbook.apply_delta(&DeltaBatch::new(vec![add_op("examples", "one")]));
        let id = playbook.bullets()[0].id.clone();

        let report = playbook.apply_delta(&DeltaBatch::new(vec![
            DeltaOperation::delete(id, "examples"),
            DeltaOperation::delete("b-missing", "examples"),
        ]));
        assert_eq!(report.deleted, 1);
        assert_eq!(report.skipped, 1);
        assert_eq!(playbook.stats().total_bullets, 0);
    }

    #[test]
    fn test_tag_bullet_idempotent_and_missing_id() {
        let mut playbook = Playbook::default();
        playbook.apply_delta(&DeltaBatch::new(vec![add_op("defaults", "tagged")]));
        let id = playbook.bullets()[0].id.clone();

        playbook.tag_bullet(&id, "x");
        playbook.tag_bullet(&id, "x");
        playbook.tag_bullet("b-missing", "x");

        let tags = &playbook.get_bullet(&id).unwrap().tags;
        assert_eq!(tags.iter().filter(|t| t.as_str() == "x").count(), 1);
    }

    #[test]
    fn test_as_prompt_skips_empty_sections() {
        let mut playbook = Playbook::default();
        playbook.apply_delta(&DeltaBatch::new(vec![add_op("warnings", "only warnings")]));

        let rendered = playbook.as_prompt();
        assert!(rendered.contains("## warnings"));
        assert!(!rendered.contains("## defaults"));
        assert!(!rendered.contains("## guidelines"));
        assert!(!rendered.contains("## examples"));
    }

    #[test]
    fn test_as_prompt_section_order_and_score() {
        let mut playbook = Playbook::default();
        playbook.apply_delta(&DeltaBatch::new(vec![
            add_op("warnings", "late section"),
            add_op("guidelines", "early section"),
        ]));
        let id = playbook
            .bullets()
            .iter()
            .find(|b| b.section == "guidelines")
            .unwrap()
            .id
            .clone();
        playbook.mark_helpful(&id);
        playbook.mark_helpful(&id);

        let rendered = playbook.as_prompt();
        let guidelines_pos = rendered.find("## guidelines").unwrap();
        let warnings_pos = rendered.find("## warnings").unwrap();
        assert!(guidelines_pos < warnings_pos);
        assert!(rendered.contains("(score: +2)"));
    }

    #[test]
    fn test_stats_tie_counts_neither() {
        let mut playbook = Playbook::default();
        playbook.apply_delta(&DeltaBatch::new(vec![add_op("defaults", "tied")]));
        let id = playbook.bullets()[0].id.clone();
        for _ in 0..2 {
            playbook.mark_helpful(&id);
            playbook.mark_harmful(&id);
        }

        let stats = playbook.stats();
        assert_eq!(playbook.get_bullet(&id).unwrap().metadata.helpful, 2);
        assert_eq!(playbook.get_bullet(&id).unwrap().metadata.harmful, 2);
        assert_eq!(stats.helpful_bullets, 0);
        assert_eq!(stats.harmful_bullets, 0);
    }

    #[test]
    fn test_add_with_metadata_override() {
        let mut playbook = Playbook::default();
        let mut op = add_op("defaults", "seeded with history");
        op.metadata.helpful = Some(5);
        playbook.apply_delta(&DeltaBatch::new(vec![op]));
        assert_eq!(playbook.bullets()[0].metadata.helpful, 5);
        assert_eq!(playbook.bullets()[0].metadata.harmful, 0);
    }

    #[test]
    fn test_add_duplicate_id_is_skipped() {
        let mut playbook = Playbook::default();
        let mut first = add_op("defaults", "original");
        first.bullet_id = Some("b-dup".to_string());
        let mut second = add_op("defaults", "impostor");
        second.bullet_id = Some("b-dup".to_string());

        let report = playbook.apply_delta(&DeltaBatch::new(vec![first, second]));
        assert_eq!(report.added, 1);
        assert_eq!(report.skipped, 1);
        assert_eq!(playbook.get_bullet("b-dup").unwrap().content, "original");
    }

    #[test]
    fn test_add_undeclared_section_is_skipped() {
        let mut playbook = Playbook::default();
        let report = playbook.apply_delta(&DeltaBatch::new(vec![add_op("folklore", "nope")]));
        assert_eq!(report.added, 0);
        assert_eq!(report.skipped, 1);
        assert!(playbook.is_empty());
    }

    #[test]
    fn test_excerpt_dedupes_and_drops_misses() {
        let mut playbook = Playbook::default();
        playbook.apply_delta(&DeltaBatch::new(vec![
            add_op("guidelines", "first"),
            add_op("warnings", "second"),
        ]));
        let id = playbook.bullets()[0].id.clone();

        let excerpt = playbook.excerpt(&[id.clone(), id.clone(), "b-missing".to_string()]);
        assert_eq!(excerpt.matches("first").count(), 1);
        assert!(!excerpt.contains("second"));
        assert!(!excerpt.contains("b-missing"));
    }
}
