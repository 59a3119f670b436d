//! Infrastructure layer.
//!
//! Adapters for ambient, non-domain concerns: configuration loading and
//! structured logging. The orchestrator's own collaborators (`SpawnAgent`,
//! `Decomposer`, `QualityJudge`, `ArtifactCheck`) are ports a caller wires
//! up separately; this crate carries no transport-layer implementation of
//! them.

pub mod config;
pub mod logging;
