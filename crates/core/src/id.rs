//! Unique identifiers for Cascade entities.
//!
//! Strongly-typed UUID identifiers built on [`domain-key`](https://crates.io/crates/domain-key)
//! `Uuid<D>` wrappers. Each identifier type is parameterized by a unique
//! domain marker, so an [`ExecutionId`] can never be passed where a
//! [`WorkflowId`] is expected.
//!
//! All ID types are `Copy` (16 bytes) and support `v4()`, `nil()`,
//! `parse(&str)`, full serde (as UUID string), `Display`, `FromStr`,
//! `Eq`, `Ord`, and `Hash`.

use domain_key::define_uuid;

// Re-export for downstream parse error handling
pub use domain_key::UuidParseError;

define_uuid!(pub ExecutionIdDomain => ExecutionId);
define_uuid!(pub WorkflowIdDomain => WorkflowId);
define_uuid!(pub TriggerIdDomain => TriggerId);
define_uuid!(pub ResourceIdDomain => ResourceId);
