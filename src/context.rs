//! Invocation context carried through binding resolution, guard evaluation
//! and action execution.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

/// Callback invoked when an action targets the reserved `navigate` topic.
pub type NavigateFn = Arc<dyn Fn(&str) + Send + Sync>;

/// The ambient data an expression may read besides the state document.
///
/// All scopes are optional; an absent scope simply never matches during
/// resolution and lookup falls through to the next one.
#[derive(Clone, Default)]
pub struct Ctx {
    /// Parameters extracted from the active route, e.g. `prospectId`.
    pub route_params: HashMap<String, String>,
    /// The element of a collection currently being rendered.
    pub item: Option<Value>,
    /// A scalar bound by the enclosing node, addressed as `value`.
    pub value: Option<Value>,
    /// Parameters of the action invocation in flight.
    pub params: Option<Value>,
    /// Route switcher, present while an action runs under the runtime.
    pub navigate: Option<NavigateFn>,
}

impl Ctx {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_route_params(mut self, route_params: HashMap<String, String>) -> Self {
        self.route_params = route_params;
        self
    }

    pub fn with_item(mut self, item: Value) -> Self {
        self.item = Some(item);
        self
    }

    pub fn with_value(mut self, value: Value) -> Self {
        self.value = Some(value);
        self
    }

    pub fn with_params(mut self, params: Value) -> Self {
        self.params = Some(params);
        self
    }

    pub fn with_navigate(mut self, navigate: NavigateFn) -> Self {
        self.navigate = Some(navigate);
        self
    }
}

impl fmt::Debug for Ctx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ctx")
            .field("route_params", &self.route_params)
            .field("item", &self.item)
            .field("value", &self.value)
            .field("params", &self.params)
            .field("navigate", &self.navigate.as_ref().map(|_| "<fn>"))
            .finish()
    }
}
