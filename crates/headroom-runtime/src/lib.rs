//! Orchestration and concurrency: the auto-compression state machine and
//! the batching, caching operation controller built on it

mod cache;
mod controller;
mod orchestrator;

pub use cache::{CacheStats, LruCache};
pub use controller::{
    canonical_json, BatchResult, Controller, ControllerError, Operation, OperationError,
    OperationHandler, OperationResult,
};
pub use orchestrator::{OrchestratorState, Orchestrator, ProcessResult, ProcessStatus};
