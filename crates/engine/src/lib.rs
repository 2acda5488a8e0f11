//! # Cascade Engine
//!
//! The wave-based DAG scheduler.
//!
//! The core loop is small: plan a wave of ready nodes, dispatch them in
//! parallel up to the run's `max_parallelism`, await the barrier, record
//! results, route edges (conditions, handles, bounded loops), checkpoint,
//! repeat. The [`ExecutionManager`] owns that loop along with run
//! start/resume/cancel, resource alias resolution, retry driving, and
//! event emission.
//!
//! Guarantees: at most one active run per execution id, topological
//! dispatch (a node runs only after every non-loop predecessor settled),
//! per-execution event ordering, and a checkpoint between consecutive
//! waves.

pub mod error;
pub mod manager;
pub mod options;
pub mod planner;
pub mod router;
mod runner;

pub use error::EngineError;
pub use manager::ExecutionManager;
pub use options::RunOptions;
pub use planner::{PlanOutcome, WavePlanner};
pub use router::{EdgeOutcome, EdgeRouter, RouteResult, SatisfiedEdge};
