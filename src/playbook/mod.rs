//! Knowledge playbook: the bullet store and its mutation protocol
//!
//! The playbook is the only state that survives across episodes. It is
//! mutated exclusively through delta batches so every change stays auditable.

pub mod bullet;
pub mod delta;
pub mod storage;
pub mod store;

pub use bullet::{generate_bullet_id, Bullet, BulletMetadata};
pub use delta::{DeltaBatch, DeltaKind, DeltaMetadata, DeltaOperation};
pub use storage::PlaybookStorage;
pub use store::{ApplyReport, Playbook, PlaybookStats, DEFAULT_SECTIONS};
