//! Validated string keys for graph entities.
//!
//! Node and edge identifiers are author-chosen strings, stable across
//! workflow versions and visible in events, templates, and checkpoints.
//! They are [`domain-key`](https://crates.io/crates/domain-key) `Key<D>`
//! types, parameterized by a domain marker so a [`NodeKey`] can never be
//! passed where an [`EdgeKey`] is expected, and validated at construction
//! against the domain's rules (non-empty, at most
//! [`MAX_KEY_LEN`](crate::constants::MAX_KEY_LEN) characters).
//!
//! Template addressability (node ids restricted to `[A-Za-z0-9_-]` so
//! `{{ node.field }}` paths stay unambiguous) is a workflow-level rule,
//! enforced by workflow validation rather than by the key type.

use domain_key::{Domain, Key, KeyDomain};

// Re-export for downstream parse error handling
pub use domain_key::KeyParseError;

use crate::constants::MAX_KEY_LEN;

/// Domain marker for node identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeDomain;

impl Domain for NodeDomain {
    const DOMAIN_NAME: &'static str = "node";
}

impl KeyDomain for NodeDomain {
    const MAX_LENGTH: usize = MAX_KEY_LEN;

    fn validation_help() -> Option<&'static str> {
        Some("Node ids use letters, digits, '_' and '-', at most 100 characters")
    }
}

/// Domain marker for edge identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EdgeDomain;

impl Domain for EdgeDomain {
    const DOMAIN_NAME: &'static str = "edge";
}

impl KeyDomain for EdgeDomain {
    const MAX_LENGTH: usize = MAX_KEY_LEN;

    fn validation_help() -> Option<&'static str> {
        Some("Edge ids use letters, digits, '_' and '-', at most 100 characters")
    }
}

/// Identifier of a node within a workflow, unique per workflow.
pub type NodeKey = Key<NodeDomain>;

/// Identifier of an edge within a workflow, unique per workflow.
pub type EdgeKey = Key<EdgeDomain>;
