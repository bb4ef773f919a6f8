//! # Action Interpreter
//!
//! Executes the ordered effect list of a named action against the store and
//! the event bus. Effects run strictly in document order on the caller's
//! task; anything asynchronous happens behind a `dispatch` on the bus, never
//! here.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, instrument};

use crate::binding::{interpolate, interpolate_str};
use crate::context::Ctx;
use crate::event_bus::EventBus;
use crate::flow::{ActionDef, ActionKind, Effect};
use crate::store::StateStore;

/// Event target reserved for route changes; dispatches to it go through the
/// context's navigate callback instead of the bus.
pub const NAVIGATE_TARGET: &str = "navigate";

pub struct ActionRunner {
    store: Arc<StateStore>,
    bus: Arc<EventBus>,
}

impl ActionRunner {
    pub fn new(store: Arc<StateStore>, bus: Arc<EventBus>) -> Self {
        Self { store, bus }
    }

    /// Runs `action` under `ctx`. An absent action is a silent no-op so that
    /// dangling `$action` references in a flow document degrade gracefully.
    #[instrument(skip_all, fields(action = name))]
    pub fn run(&self, name: &str, action: Option<&ActionDef>, ctx: &Ctx) {
        let Some(action) = action else {
            debug!("unknown action, ignoring");
            return;
        };

        for effect in &action.effects {
            self.apply(effect, ctx);
        }

        // Navigate-typed actions route after their effects complete. A
        // destination declared on the action wins; otherwise the route
        // parameter `to` supplies it.
        if action.kind == ActionKind::Navigate {
            let to = action
                .params
                .as_ref()
                .and_then(|p| p.get("to"))
                .and_then(Value::as_str)
                .map(|to| interpolate_str(to, ctx, &self.store))
                .or_else(|| ctx.route_params.get("to").cloned());
            if let (Some(to), Some(navigate)) = (to, &ctx.navigate) {
                navigate(&to);
            }
        }
    }

    fn apply(&self, effect: &Effect, ctx: &Ctx) {
        match effect {
            Effect::Set { path, value } => {
                let path = interpolate_str(path, ctx, &self.store);
                self.store.set_str(&path, interpolate(value, ctx, &self.store));
            }
            Effect::Push { path, value } => {
                let path = interpolate_str(path, ctx, &self.store);
                self.store.push_str(&path, interpolate(value, ctx, &self.store));
            }
            Effect::Dispatch { target, payload } => {
                let payload = if payload.is_null() {
                    Value::Object(Default::default())
                } else {
                    interpolate(payload, ctx, &self.store)
                };
                if target == NAVIGATE_TARGET {
                    let to = payload.get("to").and_then(Value::as_str);
                    if let (Some(to), Some(navigate)) = (to, &ctx.navigate) {
                        navigate(to);
                    }
                } else {
                    self.bus.emit(target, payload);
                }
            }
        }
    }
}
