//! Services: the worker pool, hollow detector, and quality gate (C3-C5).

pub mod hollow_detector;
pub mod quality_gate;
pub mod worker_pool;

pub use hollow_detector::is_hollow;
pub use quality_gate::{QualityGate, QualityOutcome};
pub use worker_pool::WorkerPool;
