//! # Cascade Expression
//!
//! `{{ path }}` template expansion and boolean condition evaluation over a
//! run's namespace.
//!
//! Templates are parsed once per node at dispatch time and substituted
//! lazily, so outputs of earlier waves are visible to later nodes. A
//! template that is exactly one expression substitutes the whole value,
//! preserving JSON types; anything else interpolates with leaf
//! stringification. An unresolved reference is a hard error unless the
//! expression carries a `| default("…")` suffix.
//!
//! Conditions are the edge router's language: equality and ordering over
//! numbers and strings, `exists(path)`, and `and` / `or` / `not` with
//! left-to-right short-circuit evaluation.

pub mod condition;
pub mod context;
pub mod error;
pub mod template;

pub use condition::Condition;
pub use context::ResolveContext;
pub use error::ExpressionError;
pub use template::{resolve_config, resolve_value, Template};
