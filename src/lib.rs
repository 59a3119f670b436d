//! Swarm orchestrator: task graph scheduling, budget pooling, and
//! resilience recovery for a worker pool of LLM agents.
//!
//! The crate is organized in four layers:
//! - [`domain`] — pure models (`TaskGraph`, `BudgetPool`, `CircuitBreakerState`,
//!   `SwarmConfig`, `SwarmEvent`) and the ports external collaborators must
//!   implement (`SpawnAgent`, `Decomposer`, `QualityJudge`, `ArtifactCheck`).
//! - [`services`] — the worker pool, hollow-output detector, and quality
//!   gate built on top of the domain model.
//! - [`application`] — the orchestrator that drives a task graph to
//!   completion by composing the domain model with the services layer.
//! - [`infrastructure`] — ambient adapters: configuration loading and
//!   structured logging.

pub mod application;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

pub use application::{CancelHandle, Orchestrator};
pub use domain::models::SwarmConfig;
