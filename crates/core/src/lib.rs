//! # Cascade Core
//!
//! Core types shared by every other Cascade crate.
//!
//! - **Identifiers**: [`ExecutionId`], [`WorkflowId`], [`TriggerId`],
//!   [`ResourceId`] — strongly-typed UUIDs that cannot be mixed up at
//!   compile time.
//! - **Keys**: [`NodeKey`] and [`EdgeKey`] — domain-typed string
//!   identifiers that are stable across workflow versions and
//!   user-visible in graphs, events, and checkpoints.
//! - **Error classes**: [`ErrorClass`] — the closed set of failure
//!   categories visible in events, node errors, and retry filters.
//! - **Constants**: engine-wide defaults and limits.

pub mod class;
pub mod constants;
pub mod id;
pub mod key;

pub use class::ErrorClass;
pub use id::{ExecutionId, ResourceId, TriggerId, WorkflowId};
pub use key::{EdgeKey, KeyParseError, NodeKey};

/// Common prelude for Cascade crates.
pub mod prelude {
    pub use crate::class::ErrorClass;
    pub use crate::id::{ExecutionId, ResourceId, TriggerId, WorkflowId};
    pub use crate::key::{EdgeKey, KeyParseError, NodeKey};
}
