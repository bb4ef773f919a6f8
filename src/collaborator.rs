//! # Collaborators
//!
//! Business logic living behind the event bus. The runtime core never calls
//! any of this directly: it emits topics, the handlers registered here do
//! the work and report results back exclusively through the store's path
//! API, where bound UI picks them up.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::context::NavigateFn;
use crate::event_bus::{EventBus, EventError, Subscription};
use crate::flow::{AgentStatus, Artifact};
use crate::store::{Patches, StateStore};

#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("agent {agent} failed: {message}")]
    AgentFailed { agent: String, message: String },
    #[error("unknown agent: {0}")]
    UnknownAgent(String),
}

/// Result of one agent run.
#[derive(Debug, Clone)]
pub struct AgentRun {
    pub prospect_id: String,
    pub agent_name: String,
    pub artifacts: Vec<Artifact>,
}

/// External generation service. Implementations may take arbitrarily long
/// and are never cancelled; completions land whenever they land.
#[async_trait]
pub trait Orchestrator: Send + Sync {
    async fn run_agent(
        &self,
        prospect_id: &str,
        agent_name: &str,
    ) -> Result<AgentRun, OrchestratorError>;
}

/// Offline stand-in producing canned artifacts after a configurable delay.
pub struct MockOrchestrator {
    delay: Duration,
}

impl Default for MockOrchestrator {
    fn default() -> Self {
        Self {
            delay: Duration::from_millis(1500),
        }
    }
}

impl MockOrchestrator {
    pub fn new() -> Self {
        Self::default()
    }

    /// No artificial latency; completions apply on the next poll.
    pub fn instant() -> Self {
        Self {
            delay: Duration::ZERO,
        }
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self { delay }
    }

    fn mock_artifact(agent_name: &str) -> Artifact {
        let id = format!("mock_{}", &Uuid::new_v4().simple().to_string()[..6]);
        if agent_name == "scraper" {
            Artifact {
                id,
                kind: "data".to_string(),
                title: "Company Data (Mock)".to_string(),
                default_tab: Some("profile".to_string()),
                data: json!({
                    "company": "Acme Corp (Mock)",
                    "foundingYear": 2024,
                    "industry": "Explosives",
                    "summary": "Leading provider of anvils and coyote countermeasures.",
                    "metrics": {"employees": 150, "revenue": "$50M"}
                }),
            }
        } else {
            Artifact {
                id,
                kind: "copy".to_string(),
                title: "Marketing Copy (Mock)".to_string(),
                default_tab: Some("copy".to_string()),
                data: json!({
                    "headline": "Catch the Roadrunner.",
                    "subheadline": "Precision tools for the modern predator.",
                    "heroBody": "Stop failing at lunch. Start succeeding with Acme.",
                    "features": ["Reliable Anvils", "Fast Rockets", "Free Shipping"],
                    "callToAction": "Shop Now"
                }),
            }
        }
    }
}

#[async_trait]
impl Orchestrator for MockOrchestrator {
    async fn run_agent(
        &self,
        prospect_id: &str,
        agent_name: &str,
    ) -> Result<AgentRun, OrchestratorError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(AgentRun {
            prospect_id: prospect_id.to_string(),
            agent_name: agent_name.to_string(),
            artifacts: vec![Self::mock_artifact(agent_name)],
        })
    }
}

/// Wires the standard workspace collaborators onto the bus. The returned
/// subscriptions keep the handlers alive for explicit teardown.
pub fn register_workspace_handlers(
    bus: &Arc<EventBus>,
    store: Arc<StateStore>,
    orchestrator: Arc<dyn Orchestrator>,
    navigate: Option<NavigateFn>,
) -> Vec<Subscription> {
    let mut subscriptions = Vec::new();

    {
        let store = store.clone();
        let navigate = navigate.clone();
        subscriptions.push(bus.on("workspace.create", move |payload| {
            let id = Uuid::new_v4()
                .to_string()
                .split('-')
                .next()
                .unwrap_or_default()
                .to_string();
            let name = payload
                .get("draft")
                .and_then(|d| d.get("prospectName"))
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .unwrap_or("New Project")
                .to_string();
            info!("creating workspace {} ({})", id, name);
            store.set_str("workspace.prospectId", json!(id));
            store.set_str("workspace.prospectName", json!(name));
            store.set_str("workspace.status", json!("INTAKE_RECEIVED"));
            store.set_str("workspace.artifacts", json!([]));
            if let Some(navigate) = &navigate {
                navigate(&format!("/workspace/{}", id));
            }
        }));
    }

    {
        let store = store.clone();
        subscriptions.push(bus.on("workspace.load", move |payload| {
            if let Some(id) = payload.get("prospectId") {
                store.set_str("workspace.prospectId", id.clone());
            }
        }));
    }

    {
        let store = store.clone();
        let orchestrator = orchestrator.clone();
        subscriptions.push(bus.on("orchestrator.runAgent", move |payload| {
            let Some(agent_name) = payload
                .get("agentName")
                .and_then(Value::as_str)
                .map(str::to_string)
            else {
                warn!(
                    "{}",
                    EventError::MalformedPayload {
                        topic: "orchestrator.runAgent".to_string(),
                        message: "missing agentName".to_string(),
                    }
                );
                return;
            };
            let prospect_id = payload
                .get("prospectId")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();

            // Visible before the emitter regains control.
            let status_path = format!("workspace.stateByAgent.{}.status", agent_name);
            store.set_str(&status_path, json!(AgentStatus::Running));
            store.set_str("workspace.currentAgent", json!(agent_name.clone()));

            let store = store.clone();
            let orchestrator = orchestrator.clone();
            tokio::spawn(async move {
                match orchestrator.run_agent(&prospect_id, &agent_name).await {
                    Ok(run) => {
                        store.set_str(&status_path, json!(AgentStatus::Done));
                        if let Some(last) = run.artifacts.last() {
                            let selected = last.id.clone();
                            let tab = last
                                .default_tab
                                .clone()
                                .unwrap_or_else(|| "profile".to_string());
                            for artifact in run.artifacts {
                                match serde_json::to_value(artifact) {
                                    Ok(v) => store.push_str("workspace.artifacts", v),
                                    Err(err) => warn!("unserializable artifact: {}", err),
                                }
                            }
                            store.set_str("workspace.selectedArtifactId", json!(selected));
                            store.set_str("workspace.selectedTab", json!(tab));
                        }
                    }
                    Err(err) => {
                        warn!("agent {} failed: {}", agent_name, err);
                        store.set_str(&status_path, json!(AgentStatus::Failed));
                        store.push_str(
                            "workspace.errors",
                            json!({"agentName": agent_name, "message": err.to_string()}),
                        );
                        notify(&store, "error", &format!("Agent {} failed", agent_name));
                    }
                }
            });
        }));
    }

    {
        let store = store.clone();
        subscriptions.push(bus.on("artifacts.applyPatch", move |payload| {
            let artifact_id = payload.get("artifactId").and_then(Value::as_str);
            let patch = payload.get("patch").cloned();
            match (artifact_id, patch) {
                (Some(id), Some(patch)) => match serde_json::from_value::<Patches>(patch) {
                    Ok(patches) => store.apply_artifact_patch(id, patches),
                    Err(err) => {
                        warn!("malformed artifact patch: {}", err);
                        notify(&store, "error", &format!("Invalid patch: {}", err));
                    }
                },
                _ => {
                    warn!(
                        "{}",
                        EventError::MalformedPayload {
                            topic: "artifacts.applyPatch".to_string(),
                            message: "missing artifactId or patch".to_string(),
                        }
                    );
                    notify(&store, "error", "Invalid patch request");
                }
            }
        }));
    }

    {
        let store = store.clone();
        subscriptions.push(bus.on("versions.snapshot", move |payload| {
            let note = payload
                .get("note")
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .unwrap_or("Snapshot");
            let workspace = store.get_str("workspace").unwrap_or(Value::Null);
            store.push_str(
                "workspace.versions",
                json!({
                    "id": Uuid::new_v4().to_string(),
                    "at": Utc::now().to_rfc3339(),
                    "note": note,
                    "workspace": workspace,
                }),
            );
        }));
    }

    {
        let store = store.clone();
        subscriptions.push(bus.on("ui.notify", move |payload| {
            let kind = payload
                .get("type")
                .and_then(Value::as_str)
                .unwrap_or("info")
                .to_string();
            let message = payload
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            notify(&store, &kind, &message);
        }));
    }

    {
        let store = store.clone();
        subscriptions.push(bus.on("app.toggleTheme", move |_| {
            let current = store
                .get_str("app.settings.grayscale")
                .and_then(|v| v.as_bool())
                .unwrap_or(false);
            store.set_str("app.settings.grayscale", json!(!current));
        }));
    }

    subscriptions
}

fn notify(store: &StateStore, kind: &str, message: &str) {
    store.push_str(
        "notifications",
        json!({
            "id": Uuid::new_v4().to_string(),
            "type": kind,
            "message": message,
        }),
    );
}
