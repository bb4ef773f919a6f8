//! # Flow Runtime
//!
//! Owns the wired-together system: one store, one bus, one action runner,
//! one renderer and one screen controller, all built from a single immutable
//! flow document. Hosts drive it with `navigate`, `invoke` and
//! `render_current`, and observe it through the store's revision channel.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

use serde_json::Value;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::action::ActionRunner;
use crate::collaborator::{register_workspace_handlers, Orchestrator};
use crate::config::RuntimeConfig;
use crate::context::{Ctx, NavigateFn};
use crate::event_bus::{EventBus, Subscription};
use crate::flow::{Flow, Route};
use crate::path::StatePath;
use crate::persistence;
use crate::renderer::{Rendered, Renderer};
use crate::screen::{ScreenController, ScreenPhase};
use crate::store::StateStore;
use crate::InternalResult;

#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("no route matches {0}")]
    NoRouteMatch(String),
    #[error("route {route} names unknown screen {screen_id}")]
    UnknownScreen { route: String, screen_id: String },
    #[error("no screen is active")]
    NoActiveScreen,
}

pub struct FlowRuntime {
    flow: Arc<Flow>,
    store: Arc<StateStore>,
    bus: Arc<EventBus>,
    runner: Arc<ActionRunner>,
    renderer: Renderer,
    screens: ScreenController,
    config: RuntimeConfig,
    route_params_path: StatePath,
    current_route: Mutex<Option<String>>,
    subscriptions: Mutex<Vec<Subscription>>,
    weak_self: Mutex<Weak<FlowRuntime>>,
}

impl FlowRuntime {
    pub fn new(flow: Flow, config: RuntimeConfig) -> InternalResult<Arc<Self>> {
        let flow = Arc::new(flow);
        let store = Arc::new(StateStore::new());
        let bus = Arc::new(EventBus::new());
        let runner = Arc::new(ActionRunner::new(store.clone(), bus.clone()));
        let route_params_path = StatePath::parse(&config.route_params_path)?;
        let renderer = Renderer::new(store.clone());
        let screens = ScreenController::new(
            flow.clone(),
            store.clone(),
            runner.clone(),
            route_params_path.clone(),
        );

        let runtime = Arc::new(Self {
            flow,
            store,
            bus,
            runner,
            renderer,
            screens,
            config,
            route_params_path,
            current_route: Mutex::new(None),
            subscriptions: Mutex::new(Vec::new()),
            weak_self: Mutex::new(Weak::new()),
        });
        *runtime.weak_self.lock().unwrap() = Arc::downgrade(&runtime);
        Ok(runtime)
    }

    /// Rehydrates persisted state, seeds declared store regions on first
    /// run, wires the workspace collaborators and enters the initial route.
    pub fn boot(self: &Arc<Self>, orchestrator: Arc<dyn Orchestrator>) -> InternalResult<()> {
        if let Some(state_path) = &self.config.state_path {
            if let Some(document) = persistence::load(state_path)? {
                info!("rehydrating state from {}", state_path.display());
                self.store.restore(document);
            }
        }

        // Seed any declared region the document does not already carry.
        // Persisted snapshots omit the ephemeral regions, so those come
        // back fresh from their flow initials on every boot.
        for (name, decl) in &self.flow.state.stores {
            if self.store.get_str(name).is_none() {
                debug!("seeding store region {}", name);
                self.store.set_str(name, decl.initial.clone());
            }
        }

        let subs = register_workspace_handlers(
            &self.bus,
            self.store.clone(),
            orchestrator,
            Some(self.navigate_fn()),
        );
        self.subscriptions.lock().unwrap().extend(subs);

        let initial = self.flow.app.routing.initial_route.clone();
        self.navigate(&initial)
    }

    /// Matches `route` against the flow's route table and enters the
    /// corresponding screen, binding any `:param` segments.
    pub fn navigate(&self, route: &str) -> InternalResult<()> {
        let (matched, params) = self
            .match_route(route)
            .ok_or_else(|| RuntimeError::NoRouteMatch(route.to_string()))?;
        if self.flow.screen(&matched.screen_id).is_none() {
            return Err(RuntimeError::UnknownScreen {
                route: route.to_string(),
                screen_id: matched.screen_id.clone(),
            }
            .into());
        }

        info!("navigate {} -> {}", route, matched.screen_id);
        *self.current_route.lock().unwrap() = Some(route.to_string());
        self.screens
            .enter(&matched.screen_id, params, Some(self.navigate_fn()));
        Ok(())
    }

    /// Runs a named action as a host interaction (a `$action` binding).
    pub fn invoke(&self, name: &str, params: Option<Value>) {
        let mut ctx = Ctx::new().with_route_params(self.route_params());
        if let Some(params) = params {
            ctx = ctx.with_params(params);
        }
        ctx.navigate = Some(self.navigate_fn());
        self.runner.run(name, self.flow.action(name), &ctx);
    }

    /// Renders the active screen's layout tree.
    pub fn render_current(&self) -> InternalResult<Rendered> {
        let screen_id = self
            .screens
            .active_screen()
            .ok_or(RuntimeError::NoActiveScreen)?;
        let screen = self
            .flow
            .screen(&screen_id)
            .ok_or(RuntimeError::NoActiveScreen)?;
        let ctx = Ctx::new().with_route_params(self.route_params());
        Ok(self.renderer.render(&screen.layout, &ctx))
    }

    /// Revision channel; every store mutation ticks it, regardless of which
    /// path changed.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.store.subscribe()
    }

    pub fn active_screen(&self) -> Option<String> {
        self.screens.active_screen()
    }

    pub fn screen_phase(&self) -> Option<ScreenPhase> {
        self.screens.phase()
    }

    pub fn current_route(&self) -> Option<String> {
        self.current_route.lock().unwrap().clone()
    }

    pub fn store(&self) -> &Arc<StateStore> {
        &self.store
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub fn flow(&self) -> &Flow {
        &self.flow
    }

    /// Persists the non-ephemeral state subset, when persistence is
    /// configured.
    pub fn shutdown(&self) -> InternalResult<()> {
        if let Some(state_path) = &self.config.state_path {
            persistence::save(
                state_path,
                &self.store.snapshot(),
                &self.config.ephemeral_regions,
            )?;
        }
        self.screens.exit();
        for sub in self.subscriptions.lock().unwrap().drain(..) {
            sub.unsubscribe();
        }
        Ok(())
    }

    fn navigate_fn(&self) -> NavigateFn {
        let weak = self.weak_self.lock().unwrap().clone();
        Arc::new(move |to: &str| {
            if let Some(runtime) = weak.upgrade() {
                if let Err(err) = runtime.navigate(to) {
                    debug!("navigation to {} rejected: {}", to, err);
                }
            }
        })
    }

    fn route_params(&self) -> HashMap<String, String> {
        match self.store.get(&self.route_params_path) {
            Some(Value::Object(map)) => map
                .into_iter()
                .filter_map(|(k, v)| v.as_str().map(|s| (k, s.to_string())))
                .collect(),
            _ => HashMap::new(),
        }
    }

    fn match_route(&self, route: &str) -> Option<(&Route, HashMap<String, String>)> {
        let actual: Vec<&str> = route.split('/').filter(|s| !s.is_empty()).collect();
        self.flow.app.routing.routes.iter().find_map(|candidate| {
            let pattern: Vec<&str> = candidate
                .path
                .split('/')
                .filter(|s| !s.is_empty())
                .collect();
            if pattern.len() != actual.len() {
                return None;
            }
            let mut params = HashMap::new();
            for (pat, act) in pattern.iter().zip(&actual) {
                if let Some(name) = pat.strip_prefix(':') {
                    params.insert(name.to_string(), (*act).to_string());
                } else if pat != act {
                    return None;
                }
            }
            Some((candidate, params))
        })
    }
}
