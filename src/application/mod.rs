//! Application layer: the orchestrator (C6) that drives a task graph to
//! completion by composing the domain model with the C3-C5 services.

pub mod orchestrator;

pub use orchestrator::{CancelHandle, Orchestrator};
