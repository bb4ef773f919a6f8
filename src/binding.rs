//! # Binding Resolver
//!
//! Resolves `{{expr}}` templates embedded in flow documents against the
//! invocation context and the state store. Resolution never fails: an
//! expression that matches nothing yields `None` and coerces to the empty
//! string inside a larger template.

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;
use tracing::trace;

use crate::context::Ctx;
use crate::path::StatePath;
use crate::store::{self, StateStore};

lazy_static! {
    /// A string that is exactly one marker, nothing else.
    static ref EXACT_MARKER: Regex = Regex::new(r"^\{\{\s*(.+?)\s*\}\}$").unwrap();
    /// Every marker occurrence, for mixed literal/marker strings.
    static ref MARKER: Regex = Regex::new(r"\{\{\s*(.+?)\s*\}\}").unwrap();
}

/// Resolves a single dotted expression. Context scopes are consulted before
/// the store, in a fixed order:
///
/// 1. `route.params.<key>` reads the active route's parameters
/// 2. `item.<path>` reads into the collection element being rendered
/// 3. `params.<path>` reads into the action invocation's parameters
/// 4. `value` yields the node-bound scalar
/// 5. anything else is a store path, with a trailing `.length` resolving to
///    the array length at the base path (or 0 when absent or not an array)
pub fn resolve_expr(expr: &str, ctx: &Ctx, store: &StateStore) -> Option<Value> {
    if expr.is_empty() {
        return None;
    }

    if let Some(key) = expr.strip_prefix("route.params.") {
        return ctx.route_params.get(key).map(|v| Value::String(v.clone()));
    }
    if let Some(rest) = expr.strip_prefix("item.") {
        return lookup_in(ctx.item.as_ref()?, rest);
    }
    if let Some(rest) = expr.strip_prefix("params.") {
        return lookup_in(ctx.params.as_ref()?, rest);
    }
    if expr == "value" {
        return ctx.value.clone();
    }

    if let Some(base) = expr.strip_suffix(".length") {
        let len = match StatePath::parse(base).ok().and_then(|p| store.get(&p)) {
            Some(Value::Array(items)) => items.len(),
            _ => 0,
        };
        return Some(Value::from(len));
    }

    StatePath::parse(expr).ok().and_then(|p| store.get(&p))
}

/// Recursively walks a template value, resolving every marker it contains.
///
/// A string that is exactly one marker resolves to the raw value, preserving
/// its type; a string mixing markers with literal text coerces each resolved
/// value to a string (`null` and missing become empty). Arrays and objects
/// are rebuilt with each element interpolated; other scalars pass through.
pub fn interpolate(template: &Value, ctx: &Ctx, store: &StateStore) -> Value {
    match template {
        Value::String(s) => {
            if let Some(caps) = EXACT_MARKER.captures(s) {
                let expr = caps[1].trim();
                let resolved = resolve_expr(expr, ctx, store);
                trace!("{{{{{}}}}} => {:?}", expr, resolved);
                return resolved.unwrap_or(Value::Null);
            }
            let replaced = MARKER.replace_all(s, |caps: &regex::Captures<'_>| {
                match resolve_expr(caps[1].trim(), ctx, store) {
                    Some(v) => coerce_to_string(&v),
                    None => String::new(),
                }
            });
            Value::String(replaced.into_owned())
        }
        Value::Array(items) => Value::Array(
            items.iter().map(|item| interpolate(item, ctx, store)).collect(),
        ),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), interpolate(v, ctx, store)))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Interpolates a string template and coerces the result to a string. Used
/// for effect paths and event targets, which must stay strings.
pub fn interpolate_str(template: &str, ctx: &Ctx, store: &StateStore) -> String {
    match interpolate(&Value::String(template.to_string()), ctx, store) {
        Value::String(s) => s,
        other => coerce_to_string(&other),
    }
}

fn lookup_in(root: &Value, dotted: &str) -> Option<Value> {
    let segments: Vec<String> = dotted.split('.').map(str::to_string).collect();
    store::lookup(root, &segments).cloned()
}

fn coerce_to_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        // Composite values have no natural display form, keep them readable.
        composite => composite.to_string(),
    }
}
