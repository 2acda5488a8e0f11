//! `{{ path }}` template parsing and rendering.

use serde_json::Value;

use crate::context::ResolveContext;
use crate::error::{ExpressionError, ExpressionResult};

/// One parsed segment of a template.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Part {
    /// Literal text, copied through untouched.
    Static(String),
    /// A `{{ path }}` or `{{ path | default("…") }}` expression.
    Expression {
        path: String,
        default: Option<String>,
    },
}

/// A parsed template.
///
/// Parsing happens once per node at dispatch; rendering substitutes
/// against the run's current [`ResolveContext`].
#[derive(Debug, Clone)]
pub struct Template {
    parts: Vec<Part>,
}

impl Template {
    /// Parse a template string.
    pub fn parse(source: &str) -> ExpressionResult<Self> {
        let mut parts = Vec::new();
        let mut rest = source;

        while let Some(open) = rest.find("{{") {
            if !rest[..open].is_empty() {
                parts.push(Part::Static(rest[..open].to_string()));
            }
            let after_open = &rest[open + 2..];
            let close = after_open
                .find("}}")
                .ok_or(ExpressionError::UnclosedDelimiter)?;
            let inner = &after_open[..close];
            parts.push(parse_expression(inner)?);
            rest = &after_open[close + 2..];
        }
        if !rest.is_empty() {
            parts.push(Part::Static(rest.to_string()));
        }

        Ok(Self { parts })
    }

    /// Returns `true` if the template contains at least one expression.
    #[must_use]
    pub fn has_expressions(&self) -> bool {
        self.parts
            .iter()
            .any(|p| matches!(p, Part::Expression { .. }))
    }

    /// Render against a context.
    ///
    /// A template that is exactly one expression substitutes the whole
    /// value, preserving its JSON type. Anything else interpolates into a
    /// string, stringifying leaf values (strings unquoted, other values
    /// as compact JSON).
    pub fn render(&self, ctx: &ResolveContext) -> ExpressionResult<Value> {
        if let [Part::Expression { path, default }] = self.parts.as_slice() {
            return match ctx.resolve_path(path) {
                Some(value) => Ok(value),
                None => default
                    .clone()
                    .map(Value::String)
                    .ok_or_else(|| ExpressionError::Unresolved(path.clone())),
            };
        }

        let mut out = String::new();
        for part in &self.parts {
            match part {
                Part::Static(text) => out.push_str(text),
                Part::Expression { path, default } => match ctx.resolve_path(path) {
                    Some(value) => out.push_str(&stringify(&value)),
                    None => match default {
                        Some(text) => out.push_str(text),
                        None => return Err(ExpressionError::Unresolved(path.clone())),
                    },
                },
            }
        }
        Ok(Value::String(out))
    }
}

/// Parse the inside of a `{{ … }}` expression: a path with an optional
/// `| default("…")` suffix.
fn parse_expression(inner: &str) -> ExpressionResult<Part> {
    let (path_part, filter_part) = match inner.split_once('|') {
        Some((path, filter)) => (path, Some(filter)),
        None => (inner, None),
    };

    let path = path_part.trim();
    if path.is_empty() {
        return Err(ExpressionError::Parse("empty expression".into()));
    }

    let default = match filter_part {
        None => None,
        Some(filter) => Some(parse_default(filter.trim())?),
    };

    Ok(Part::Expression {
        path: path.to_string(),
        default,
    })
}

/// Parse `default("literal")` / `default('literal')`.
fn parse_default(filter: &str) -> ExpressionResult<String> {
    let body = filter
        .strip_prefix("default(")
        .and_then(|rest| rest.strip_suffix(')'))
        .ok_or_else(|| ExpressionError::Parse(format!("unknown filter '{filter}'")))?;
    let body = body.trim();

    let unquoted = body
        .strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
        .or_else(|| {
            body.strip_prefix('\'')
                .and_then(|rest| rest.strip_suffix('\''))
        })
        .ok_or_else(|| {
            ExpressionError::Parse(format!("default argument must be a quoted string: {body}"))
        })?;
    Ok(unquoted.to_string())
}

/// Stringification of a leaf during interpolation.
fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Resolve every template inside a JSON value, recursing through objects
/// and arrays. Non-string leaves pass through unchanged.
pub fn resolve_value(value: &Value, ctx: &ResolveContext) -> ExpressionResult<Value> {
    match value {
        Value::String(s) => {
            let template = Template::parse(s)?;
            if template.has_expressions() {
                template.render(ctx)
            } else {
                Ok(value.clone())
            }
        }
        Value::Array(items) => items
            .iter()
            .map(|item| resolve_value(item, ctx))
            .collect::<ExpressionResult<Vec<_>>>()
            .map(Value::Array),
        Value::Object(map) => map
            .iter()
            .map(|(k, v)| Ok((k.clone(), resolve_value(v, ctx)?)))
            .collect::<ExpressionResult<serde_json::Map<_, _>>>()
            .map(Value::Object),
        other => Ok(other.clone()),
    }
}

/// Resolve every template inside a configuration mapping.
pub fn resolve_config(
    config: &serde_json::Map<String, Value>,
    ctx: &ResolveContext,
) -> ExpressionResult<serde_json::Map<String, Value>> {
    config
        .iter()
        .map(|(k, v)| Ok((k.clone(), resolve_value(v, ctx)?)))
        .collect()
}
