//! # Screen Lifecycle Controller
//!
//! Tracks the active screen through its Entering -> Active -> Exiting phases,
//! commits route parameters into the store and fires a screen's `onEnter`
//! actions.
//!
//! `onEnter` dispatch is deferred to a spawned task rather than executed
//! inline, so entering a screen never mutates state in the middle of the
//! render pass that triggered it. Leaving the screen before the deferred
//! task runs aborts it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde_json::{json, Value};
use tokio::task::JoinHandle;
use tracing::{debug, instrument};

use crate::action::ActionRunner;
use crate::binding::interpolate;
use crate::context::{Ctx, NavigateFn};
use crate::flow::Flow;
use crate::path::StatePath;
use crate::store::StateStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScreenPhase {
    Entering,
    Active,
    Exiting,
}

struct ActiveScreen {
    screen_id: String,
    phase: ScreenPhase,
    on_enter: Option<JoinHandle<()>>,
}

pub struct ScreenController {
    flow: Arc<Flow>,
    store: Arc<StateStore>,
    runner: Arc<ActionRunner>,
    route_params_path: StatePath,
    active: Arc<Mutex<Option<ActiveScreen>>>,
}

impl ScreenController {
    pub fn new(
        flow: Arc<Flow>,
        store: Arc<StateStore>,
        runner: Arc<ActionRunner>,
        route_params_path: StatePath,
    ) -> Self {
        Self {
            flow,
            store,
            runner,
            route_params_path,
            active: Arc::new(Mutex::new(None)),
        }
    }

    /// Makes `screen_id` the active screen. The previous screen exits first,
    /// cancelling its `onEnter` dispatch if it has not fired yet.
    #[instrument(skip_all, fields(screen = screen_id))]
    pub fn enter(
        &self,
        screen_id: &str,
        route_params: HashMap<String, String>,
        navigate: Option<NavigateFn>,
    ) {
        self.exit_current();

        self.sync_route_params(&route_params);

        let Some(screen) = self.flow.screen(screen_id) else {
            debug!("no such screen, nothing becomes active");
            return;
        };

        if screen.on_enter.is_empty() {
            *self.active.lock().unwrap() = Some(ActiveScreen {
                screen_id: screen_id.to_string(),
                phase: ScreenPhase::Active,
                on_enter: None,
            });
            return;
        }

        let steps = screen.on_enter.clone();
        let flow = self.flow.clone();
        let store = self.store.clone();
        let runner = self.runner.clone();
        let active = self.active.clone();
        let entered_id = screen_id.to_string();
        let handle = tokio::spawn(async move {
            // One suspension point between route commit and enter actions.
            tokio::task::yield_now().await;

            let route_ctx = Ctx::new().with_route_params(route_params.clone());
            for step in &steps {
                if step.op != "action" {
                    debug!("unsupported onEnter op {:?}", step.op);
                    continue;
                }
                let params = step
                    .params
                    .as_ref()
                    .map(|p| interpolate(p, &route_ctx, &store))
                    .unwrap_or_else(|| json!({}));
                let mut ctx = Ctx::new()
                    .with_route_params(route_params.clone())
                    .with_params(params);
                ctx.navigate = navigate.clone();
                runner.run(&step.name, flow.action(&step.name), &ctx);
            }

            let mut guard = active.lock().unwrap();
            if let Some(current) = guard.as_mut() {
                if current.screen_id == entered_id {
                    current.phase = ScreenPhase::Active;
                }
            }
        });

        *self.active.lock().unwrap() = Some(ActiveScreen {
            screen_id: screen_id.to_string(),
            phase: ScreenPhase::Entering,
            on_enter: Some(handle),
        });
    }

    pub fn active_screen(&self) -> Option<String> {
        self.active
            .lock()
            .unwrap()
            .as_ref()
            .map(|a| a.screen_id.clone())
    }

    pub fn phase(&self) -> Option<ScreenPhase> {
        self.active.lock().unwrap().as_ref().map(|a| a.phase)
    }

    /// Commits route parameters to the store only when they differ from the
    /// committed set, compared by serialized form.
    fn sync_route_params(&self, route_params: &HashMap<String, String>) {
        let incoming = Value::Object(
            route_params
                .iter()
                .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                .collect(),
        );
        let current = self
            .store
            .get(&self.route_params_path)
            .unwrap_or(Value::Null);
        if current.to_string() != incoming.to_string() {
            self.store.set(&self.route_params_path, incoming);
        }
    }

    /// Exits whatever screen is active, aborting deferred enter work.
    pub fn exit(&self) {
        self.exit_current();
    }

    fn exit_current(&self) {
        let mut guard = self.active.lock().unwrap();
        if let Some(mut current) = guard.take() {
            current.phase = ScreenPhase::Exiting;
            if let Some(handle) = current.on_enter.take() {
                handle.abort();
            }
        }
    }
}
