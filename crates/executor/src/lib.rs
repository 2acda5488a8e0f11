//! # Cascade Executor
//!
//! The uniform contract every node implementation plugs into, and the
//! registry the engine resolves type names through.
//!
//! An [`Executor`] exposes exactly two operations: `validate(config)`,
//! called at workflow import/update time, and `execute(ctx, config,
//! input)`, called at dispatch. Executors must not mutate shared engine
//! state; their sole observable effect on the engine is the returned
//! value.
//!
//! The reserved type names `comment` and `sub_workflow` never resolve to
//! registered executors: `comment` nodes are inert and `sub_workflow`
//! nodes are handled by the engine itself.

pub mod context;
pub mod error;
pub mod executor;
pub mod registry;

pub use context::NodeContext;
pub use error::ExecutorError;
pub use executor::Executor;
pub use registry::{ExecutorRegistry, RegistryError};
