//! # stackpack-build
//!
//! Drives one build of a deployment target through a fixed stage list:
//! `validation → configuration → template_render → asset_resolution →
//! compose_merge → linting → packaging`.
//!
//! Handles:
//! - **Model**: Target, member, and configuration records plus build status.
//! - **Context**: The single mutable record threaded through every stage.
//! - **Variables**: Layered resolution and flattening of variable trees.
//! - **Store**: Persistence and byte storage seams with in-memory and
//!   filesystem implementations.
//! - **Orchestrator**: Stage sequencing, status reporting, and outcomes.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used, clippy::panic))]

pub mod context;
pub mod error;
pub mod model;
pub mod orchestrator;
pub mod stage;
mod stages;
pub mod store;
pub mod variables;

pub use context::BuildContext;
pub use error::{BuildError, StageError};
pub use model::{
    AssetDecl, AssetMode, BuildOutcome, BuildStatus, ConfigFile, Configuration, FileKind, Member,
    Target,
};
pub use orchestrator::{BuildOrchestrator, BuildReport};
pub use stage::Stage;
pub use store::{ArtifactStore, BuildRecords, FsStore, MemoryStore};
