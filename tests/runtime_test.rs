use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use serde_json::{json, Value};

use flowlet::collaborator::{AgentRun, MockOrchestrator, Orchestrator, OrchestratorError};
use flowlet::config::RuntimeConfig;
use flowlet::{Flow, FlowRuntime};

fn sample_flow() -> Flow {
    Flow::from_value(json!({
        "app": {
            "id": "prospect-builder",
            "name": "Prospect Builder",
            "routing": {
                "initialRoute": "/intake",
                "routes": [
                    {"path": "/intake", "screenId": "intake"},
                    {"path": "/workspace/:prospectId", "screenId": "workspace"}
                ]
            }
        },
        "state": {
            "stores": {
                "workspace": {"initial": {"status": "IDLE", "artifacts": []}},
                "draftIntake": {"initial": {"url": "", "prospectName": ""}}
            }
        },
        "actions": {
            "createWorkspace": {
                "type": "command",
                "effects": [
                    {"op": "dispatch", "target": "workspace.create",
                     "payload": {"draft": "{{draftIntake}}"}}
                ]
            },
            "loadWorkspace": {
                "type": "command",
                "effects": [
                    {"op": "dispatch", "target": "workspace.load",
                     "payload": {"prospectId": "{{params.prospectId}}"}}
                ]
            },
            "runScraper": {
                "type": "command",
                "effects": [
                    {"op": "dispatch", "target": "orchestrator.runAgent",
                     "payload": {"agentName": "scraper",
                                 "prospectId": "{{workspace.prospectId}}"}}
                ]
            },
            "saveArtifact": {
                "type": "command",
                "effects": [
                    {"op": "dispatch", "target": "artifacts.applyPatch",
                     "payload": {"artifactId": "{{params.artifactId}}",
                                 "patch": "{{params.patch}}"}}
                ]
            }
        },
        "screens": [
            {"id": "intake", "layout": {"type": "Stack", "children": [
                {"type": "TextInput", "path": "draftIntake.url"},
                {"type": "Button", "label": "Create",
                 "onClick": {"$action": "createWorkspace"}}
            ]}},
            {"id": "workspace",
             "onEnter": [{"op": "action", "name": "loadWorkspace",
                          "params": {"prospectId": "{{route.params.prospectId}}"}}],
             "layout": {"type": "Stack", "children": [
                {"type": "ArtifactsExplorer", "bind": "workspace.artifacts"}
             ]}}
        ]
    }))
    .unwrap()
}

struct FailingOrchestrator;

#[async_trait::async_trait]
impl Orchestrator for FailingOrchestrator {
    async fn run_agent(
        &self,
        _prospect_id: &str,
        agent_name: &str,
    ) -> Result<AgentRun, OrchestratorError> {
        Err(OrchestratorError::AgentFailed {
            agent: agent_name.to_string(),
            message: "quota exhausted".to_string(),
        })
    }
}

fn booted(orchestrator: Arc<dyn Orchestrator>) -> Arc<FlowRuntime> {
    let runtime = FlowRuntime::new(sample_flow(), RuntimeConfig::default()).unwrap();
    runtime.boot(orchestrator).unwrap();
    runtime
}

async fn wait_until<F: Fn() -> bool>(cond: F) {
    for _ in 0..400 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached in time");
}

#[tokio::test]
async fn boot_on_empty_storage_seeds_the_declared_state() {
    let runtime = booted(Arc::new(MockOrchestrator::instant()));

    assert_eq!(
        runtime.store().get_str("workspace.status").unwrap(),
        json!("IDLE")
    );
    assert_eq!(
        runtime.store().get_str("workspace.artifacts").unwrap(),
        json!([])
    );
    assert_eq!(runtime.active_screen(), Some("intake".to_string()));
}

#[tokio::test]
async fn create_workspace_transitions_status_and_navigates() {
    let runtime = booted(Arc::new(MockOrchestrator::instant()));
    runtime
        .store()
        .set_str("draftIntake.prospectName", json!("Acme"));

    runtime.invoke("createWorkspace", None);

    assert_eq!(
        runtime.store().get_str("workspace.status").unwrap(),
        json!("INTAKE_RECEIVED")
    );
    let prospect_id = runtime.store().get_str("workspace.prospectId").unwrap();
    let prospect_id = prospect_id.as_str().unwrap();
    assert!(!prospect_id.is_empty());
    assert_eq!(
        runtime.current_route(),
        Some(format!("/workspace/{}", prospect_id))
    );
    assert_eq!(runtime.active_screen(), Some("workspace".to_string()));
}

#[tokio::test]
async fn entering_the_workspace_route_loads_the_prospect() {
    let runtime = booted(Arc::new(MockOrchestrator::instant()));

    runtime.navigate("/workspace/p-77").unwrap();
    // onEnter is deferred past the navigation itself.
    wait_until(|| runtime.store().get_str("workspace.prospectId") == Some(json!("p-77"))).await;
}

#[tokio::test]
async fn run_agent_goes_running_then_done_and_selects_the_artifact() {
    let runtime = booted(Arc::new(MockOrchestrator::with_delay(
        Duration::from_millis(30),
    )));
    runtime
        .store()
        .set_str("workspace.prospectId", json!("p-1"));

    runtime.invoke("runScraper", None);

    // Visible immediately, before the async completion.
    assert_eq!(
        runtime
            .store()
            .get_str("workspace.stateByAgent.scraper.status")
            .unwrap(),
        json!("running")
    );

    wait_until(|| {
        runtime.store().get_str("workspace.stateByAgent.scraper.status") == Some(json!("done"))
    })
    .await;

    let artifacts = runtime.store().get_str("workspace.artifacts").unwrap();
    let artifacts = artifacts.as_array().unwrap().clone();
    assert_eq!(artifacts.len(), 1);
    assert_eq!(artifacts[0]["kind"], json!("data"));
    assert_eq!(
        runtime
            .store()
            .get_str("workspace.selectedArtifactId")
            .unwrap(),
        artifacts[0]["id"]
    );
}

#[tokio::test]
async fn failed_agent_records_failed_status_and_one_error() {
    let runtime = booted(Arc::new(FailingOrchestrator));
    runtime
        .store()
        .set_str("workspace.prospectId", json!("p-1"));

    runtime.invoke("runScraper", None);

    wait_until(|| {
        runtime.store().get_str("workspace.stateByAgent.scraper.status") == Some(json!("failed"))
    })
    .await;

    let errors = runtime.store().get_str("workspace.errors").unwrap();
    let errors = errors.as_array().unwrap().clone();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0]["agentName"], json!("scraper"));
    assert_eq!(
        runtime.store().get_str("workspace.artifacts").unwrap(),
        json!([])
    );
}

#[tokio::test]
async fn artifact_patches_apply_in_order_through_the_action_layer() {
    let runtime = booted(Arc::new(MockOrchestrator::instant()));
    runtime.store().push_str(
        "workspace.artifacts",
        json!({"id": "a1", "kind": "copy", "title": "Draft", "data": {"headline": "old"}}),
    );

    runtime.invoke(
        "saveArtifact",
        Some(json!({
            "artifactId": "a1",
            "patch": [
                {"op": "set", "path": "data.headline", "value": "new"},
                {"op": "set", "path": "data.headline", "value": "newest"}
            ]
        })),
    );

    let artifacts = runtime.store().get_str("workspace.artifacts").unwrap();
    assert_eq!(artifacts[0]["data"]["headline"], json!("newest"));
}

#[tokio::test]
async fn shutdown_persists_and_a_second_boot_rehydrates() {
    let dir = tempfile::tempdir().unwrap();
    let config = RuntimeConfig {
        state_path: Some(dir.path().join("state.json")),
        ..RuntimeConfig::default()
    };

    let first = FlowRuntime::new(sample_flow(), config.clone()).unwrap();
    first.boot(Arc::new(MockOrchestrator::instant())).unwrap();
    first
        .store()
        .set_str("workspace.prospectName", json!("Acme"));
    first.store().set_str("ui.selectedTab", json!("profile"));
    first
        .store()
        .set_str("draftIntake.url", json!("https://acme.io"));
    first.shutdown().unwrap();

    let second = FlowRuntime::new(sample_flow(), config).unwrap();
    second.boot(Arc::new(MockOrchestrator::instant())).unwrap();

    assert_eq!(
        second.store().get_str("workspace.prospectName").unwrap(),
        json!("Acme")
    );
    // Ephemeral regions start fresh from their declared initials.
    assert_eq!(second.store().get_str("ui.selectedTab"), None);
    assert_eq!(
        second.store().get_str("draftIntake").unwrap(),
        json!({"url": "", "prospectName": ""})
    );
}

#[tokio::test]
async fn rendered_tree_reflects_the_store_after_every_mutation() {
    let runtime = booted(Arc::new(MockOrchestrator::instant()));

    let rendered = runtime.render_current().unwrap();
    let tree = serde_json::to_value(&rendered).unwrap();
    assert_eq!(tree["children"][0]["props"]["value"], json!(""));

    runtime
        .store()
        .set_str("draftIntake.url", json!("https://acme.io"));
    let rendered = runtime.render_current().unwrap();
    let tree = serde_json::to_value(&rendered).unwrap();
    assert_eq!(
        tree["children"][0]["props"]["value"],
        json!("https://acme.io")
    );
}

#[tokio::test]
async fn last_completion_wins_when_the_same_agent_runs_twice() {
    let runtime = booted(Arc::new(MockOrchestrator::with_delay(
        Duration::from_millis(10),
    )));
    runtime
        .store()
        .set_str("workspace.prospectId", json!("p-1"));

    runtime.invoke("runScraper", None);
    runtime.invoke("runScraper", None);

    wait_until(|| {
        runtime
            .store()
            .get_str("workspace.artifacts")
            .and_then(|v: Value| v.as_array().map(|a| a.len()))
            == Some(2)
    })
    .await;

    // Both completions land; the selection points at whichever finished
    // last.
    let artifacts = runtime.store().get_str("workspace.artifacts").unwrap();
    let selected = runtime
        .store()
        .get_str("workspace.selectedArtifactId")
        .unwrap();
    let ids: Vec<Value> = artifacts
        .as_array()
        .unwrap()
        .iter()
        .map(|a| a["id"].clone())
        .collect();
    assert!(ids.contains(&selected));
}
