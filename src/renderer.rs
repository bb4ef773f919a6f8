//! # Node Renderer
//!
//! Walks a screen's UI node tree and produces a [`Rendered`] tree, the
//! headless output consumed by whatever host presents it. Dispatch is over
//! the node's `type` tag against a registry of [`NodeKind`] implementations;
//! unknown tags render nothing rather than erroring, so a flow document can
//! reference node kinds a given host does not ship.
//!
//! Rendering is a pure read: it resolves bindings and evaluates guards but
//! never mutates the store. Interaction affordances (`$action` bindings)
//! pass through verbatim for the host to feed back into the action
//! interpreter.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::debug;

use crate::binding::interpolate;
use crate::context::Ctx;
use crate::flow::UiNode;
use crate::guard::eval_expr;
use crate::store::StateStore;

const ARTIFACTS_PATH: &str = "workspace.artifacts";
const SELECTED_ARTIFACT_PATH: &str = "workspace.selectedArtifactId";
const WARNINGS_PATH: &str = "workspace.warnings";
const ERRORS_PATH: &str = "workspace.errors";

/// Host-facing render output.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Rendered {
    Element(Element),
    Text(String),
    Nothing,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Element {
    pub kind: String,
    pub props: Map<String, Value>,
    pub children: Vec<Rendered>,
}

impl Element {
    fn new(kind: &str) -> Self {
        Self {
            kind: kind.to_string(),
            props: Map::new(),
            children: Vec::new(),
        }
    }

    fn prop(mut self, key: &str, value: Value) -> Self {
        self.props.insert(key.to_string(), value);
        self
    }

    fn maybe_prop(self, key: &str, value: Option<Value>) -> Self {
        match value {
            Some(v) => self.prop(key, v),
            None => self,
        }
    }

    fn children(mut self, children: Vec<Rendered>) -> Self {
        self.children = children;
        self
    }

    fn done(self) -> Rendered {
        Rendered::Element(self)
    }
}

pub trait NodeKind: Send + Sync {
    fn render(&self, node: &UiNode, ctx: &Ctx, renderer: &Renderer) -> Rendered;
}

pub struct Renderer {
    store: Arc<StateStore>,
    registry: HashMap<String, Arc<dyn NodeKind>>,
}

impl Renderer {
    /// Builds a renderer with every built-in node kind registered.
    pub fn new(store: Arc<StateStore>) -> Self {
        let mut renderer = Self {
            store,
            registry: HashMap::new(),
        };
        renderer.register("Stack", Stack);
        renderer.register("Grid", Grid);
        renderer.register("Card", Card);
        renderer.register("TextInput", TextInput);
        renderer.register("StatsCard", StatsCard);
        renderer.register("Button", Button);
        renderer.register("Workspace3Pane", Workspace3Pane);
        renderer.register("ArtifactsExplorer", ArtifactsExplorer);
        renderer.register("AgentsRail", AgentsRail);
        renderer.register("Canvas", Canvas);
        renderer.register("Inspector", Inspector);
        renderer
    }

    /// Registers (or replaces) a node kind under `tag`.
    pub fn register<K: NodeKind + 'static>(&mut self, tag: &str, kind: K) {
        self.registry.insert(tag.to_string(), Arc::new(kind));
    }

    pub fn render(&self, node: &UiNode, ctx: &Ctx) -> Rendered {
        match self.registry.get(&node.kind) {
            Some(kind) => kind.clone().render(node, ctx, self),
            None => {
                debug!("no renderer for node kind {:?}", node.kind);
                Rendered::Nothing
            }
        }
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    fn render_children(&self, node: &UiNode, ctx: &Ctx) -> Vec<Rendered> {
        node.children.iter().map(|c| self.render(c, ctx)).collect()
    }

    /// Interpolates a prop through the binding resolver.
    fn resolved_prop(&self, node: &UiNode, key: &str, ctx: &Ctx) -> Option<Value> {
        node.props.get(key).map(|v| interpolate(v, ctx, &self.store))
    }

    /// Interpolates a prop and coerces it to display text.
    fn text_prop(&self, node: &UiNode, key: &str, ctx: &Ctx) -> Option<String> {
        self.resolved_prop(node, key, ctx).map(|v| match v {
            Value::String(s) => s,
            Value::Null => String::new(),
            other => other.to_string(),
        })
    }

    fn store_value(&self, path: &Value) -> Option<Value> {
        path.as_str().and_then(|p| self.store.get_str(p))
    }
}

/// Synthesizes a node from a props object, for compound kinds whose regions
/// are described inline rather than as child nodes.
fn node_from(kind: &str, props: &Value) -> UiNode {
    UiNode {
        kind: kind.to_string(),
        children: Vec::new(),
        props: props.as_object().cloned().unwrap_or_default(),
    }
}

struct Stack;

impl NodeKind for Stack {
    fn render(&self, node: &UiNode, ctx: &Ctx, r: &Renderer) -> Rendered {
        Element::new("Stack")
            .prop("gap", node.props.get("gap").cloned().unwrap_or(Value::from(4)))
            .children(r.render_children(node, ctx))
            .done()
    }
}

struct Grid;

impl NodeKind for Grid {
    fn render(&self, node: &UiNode, ctx: &Ctx, r: &Renderer) -> Rendered {
        Element::new("Grid")
            .prop("gap", node.props.get("gap").cloned().unwrap_or(Value::from(4)))
            .prop(
                "columns",
                node.props.get("columns").cloned().unwrap_or(Value::from(1)),
            )
            .children(r.render_children(node, ctx))
            .done()
    }
}

struct Card;

impl NodeKind for Card {
    fn render(&self, node: &UiNode, ctx: &Ctx, r: &Renderer) -> Rendered {
        Element::new("Card")
            .maybe_prop("title", r.text_prop(node, "title", ctx).map(Value::String))
            .children(r.render_children(node, ctx))
            .done()
    }
}

/// Mirrors the store value at `path` so the host can show the current text
/// and write edits back through the same path.
struct TextInput;

impl NodeKind for TextInput {
    fn render(&self, node: &UiNode, _ctx: &Ctx, r: &Renderer) -> Rendered {
        let current = node
            .props
            .get("path")
            .and_then(|p| r.store_value(p))
            .unwrap_or(Value::String(String::new()));
        Element::new("TextInput")
            .maybe_prop("label", node.props.get("label").cloned())
            .maybe_prop("path", node.props.get("path").cloned())
            .maybe_prop("placeholder", node.props.get("placeholder").cloned())
            .prop("value", current)
            .done()
    }
}

struct StatsCard;

impl NodeKind for StatsCard {
    fn render(&self, node: &UiNode, ctx: &Ctx, r: &Renderer) -> Rendered {
        Element::new("StatsCard")
            .maybe_prop("label", node.props.get("label").cloned())
            .prop(
                "value",
                Value::String(r.text_prop(node, "value", ctx).unwrap_or_default()),
            )
            .done()
    }
}

struct Button;

impl NodeKind for Button {
    fn render(&self, node: &UiNode, ctx: &Ctx, r: &Renderer) -> Rendered {
        Element::new("Button")
            .prop(
                "label",
                Value::String(r.text_prop(node, "label", ctx).unwrap_or_default()),
            )
            .prop(
                "variant",
                node.props
                    .get("variant")
                    .cloned()
                    .unwrap_or(Value::String("secondary".into())),
            )
            .maybe_prop("onClick", node.props.get("onClick").cloned())
            .done()
    }
}

/// Three-region layout: a header with action buttons, an agents rail on the
/// left, a canvas in the center and an inspector on the right. Regions are
/// inline prop objects, not child nodes.
struct Workspace3Pane;

impl NodeKind for Workspace3Pane {
    fn render(&self, node: &UiNode, ctx: &Ctx, r: &Renderer) -> Rendered {
        let header = node.props.get("header");
        let title = header
            .and_then(|h| h.get("title"))
            .map(|t| interpolate(t, ctx, r.store()));
        let subtitle = header
            .and_then(|h| h.get("subtitle"))
            .map(|t| interpolate(t, ctx, r.store()));
        let actions: Vec<Rendered> = header
            .and_then(|h| h.get("actions"))
            .and_then(Value::as_array)
            .map(|actions| {
                actions
                    .iter()
                    .map(|a| r.render(&node_from("Button", a), ctx))
                    .collect()
            })
            .unwrap_or_default();

        let mut children = Vec::new();
        if let Some(left) = node.props.get("left") {
            children.push(r.render(&node_from("AgentsRail", left), ctx));
            if let Some(secondary) = left.get("secondary") {
                if let Ok(secondary) = serde_json::from_value::<UiNode>(secondary.clone()) {
                    children.push(r.render(&secondary, ctx));
                }
            }
        }
        if let Some(center) = node.props.get("center") {
            if let Ok(center) = serde_json::from_value::<UiNode>(center.clone()) {
                children.push(r.render(&center, ctx));
            }
        }
        if let Some(right) = node.props.get("right") {
            children.push(r.render(&node_from("Inspector", right), ctx));
        }

        Element::new("Workspace3Pane")
            .maybe_prop("title", title)
            .maybe_prop("subtitle", subtitle)
            .prop(
                "headerActions",
                serde_json::to_value(actions).unwrap_or(Value::Null),
            )
            .children(children)
            .done()
    }
}

/// One entry per configured agent, with its live status read from the store
/// path the flow document names for it.
struct AgentsRail;

impl NodeKind for AgentsRail {
    fn render(&self, node: &UiNode, _ctx: &Ctx, r: &Renderer) -> Rendered {
        let agents = node
            .props
            .get("agents")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let items = agents
            .iter()
            .map(|agent| {
                let status = agent
                    .get("statusPath")
                    .and_then(|p| r.store_value(p))
                    .and_then(|v| v.as_str().map(str::to_string))
                    .unwrap_or_else(|| "idle".to_string());
                let running = status == "running";
                let primary = agent.get("primaryAction");
                Element::new("AgentItem")
                    .maybe_prop("name", agent.get("name").cloned())
                    .prop("status", Value::String(status))
                    .prop("disabled", Value::Bool(running))
                    .maybe_prop(
                        "label",
                        if running {
                            Some(Value::String("Running".into()))
                        } else {
                            primary.and_then(|p| p.get("label")).cloned()
                        },
                    )
                    .maybe_prop("onClick", primary.and_then(|p| p.get("onClick")).cloned())
                    .done()
            })
            .collect();

        Element::new("AgentsRail").children(items).done()
    }
}

/// The artifact list bound at `bind`. With declared children, each artifact
/// renders those children under an `item` binding; otherwise a default item
/// row is produced per artifact.
struct ArtifactsExplorer;

impl NodeKind for ArtifactsExplorer {
    fn render(&self, node: &UiNode, ctx: &Ctx, r: &Renderer) -> Rendered {
        let artifacts = node
            .props
            .get("bind")
            .and_then(|p| r.store_value(p))
            .and_then(|v| v.as_array().cloned())
            .unwrap_or_default();
        let selected = r
            .store
            .get_str(SELECTED_ARTIFACT_PATH)
            .and_then(|v| v.as_str().map(str::to_string));

        let items = artifacts
            .iter()
            .map(|artifact| {
                let id = artifact.get("id").and_then(Value::as_str).unwrap_or("");
                let element = Element::new("ArtifactItem")
                    .prop("id", Value::String(id.to_string()))
                    .maybe_prop("title", artifact.get("title").cloned())
                    .maybe_prop("kind", artifact.get("kind").cloned())
                    .prop("selected", Value::Bool(selected.as_deref() == Some(id)))
                    .maybe_prop("onOpen", node.props.get("onOpen").cloned());
                if node.children.is_empty() {
                    element.done()
                } else {
                    let item_ctx = ctx.clone().with_item(artifact.clone());
                    element.children(r.render_children(node, &item_ctx)).done()
                }
            })
            .collect::<Vec<_>>();

        Element::new("ArtifactsExplorer")
            .prop("empty", Value::Bool(items.is_empty()))
            .children(items)
            .done()
    }
}

/// Tabbed artifact viewer. Shows its empty state when the configured guard
/// holds (or, without a guard, when the artifact list is empty); otherwise
/// exposes the selected tab and the artifact addressed by the editor's id
/// path.
struct Canvas;

impl NodeKind for Canvas {
    fn render(&self, node: &UiNode, ctx: &Ctx, r: &Renderer) -> Rendered {
        if let Some(empty_state) = node.props.get("emptyState") {
            let show = match empty_state.get("when").and_then(Value::as_str) {
                Some(when) => eval_expr(when, ctx, r.store()),
                None => artifacts_empty(r.store()),
            };
            if show {
                return Element::new("EmptyState")
                    .maybe_prop(
                        "title",
                        empty_state.get("title").map(|t| interpolate(t, ctx, r.store())),
                    )
                    .maybe_prop(
                        "text",
                        empty_state.get("text").map(|t| interpolate(t, ctx, r.store())),
                    )
                    .maybe_prop("primary", empty_state.get("primary").cloned())
                    .done();
            }
        }

        let tabs = node
            .props
            .get("tabs")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        let selected_tab = node
            .props
            .get("selectedTabPath")
            .and_then(|p| r.store_value(p))
            .or_else(|| tabs.first().and_then(|t| t.get("id")).cloned());

        let editor = node.props.get("editor");
        let artifact = editor
            .and_then(|e| e.get("artifactIdPath"))
            .and_then(|p| r.store_value(p))
            .and_then(|id| find_artifact(r.store(), &id));

        let children = match &artifact {
            Some(artifact) => vec![Element::new("ArtifactEditor")
                .maybe_prop("artifactId", artifact.get("id").cloned())
                .maybe_prop("data", artifact.get("data").cloned())
                .maybe_prop("onSave", editor.and_then(|e| e.get("onSave")).cloned())
                .done()],
            None => Vec::new(),
        };

        Element::new("Canvas")
            .prop("tabs", Value::Array(tabs))
            .maybe_prop("selectedTab", selected_tab)
            .children(children)
            .done()
    }
}

/// Health sections: counters over the warning and error lists, and
/// checklists whose items read a boolean off a store path.
struct Inspector;

impl NodeKind for Inspector {
    fn render(&self, node: &UiNode, _ctx: &Ctx, r: &Renderer) -> Rendered {
        let sections = node
            .props
            .get("sections")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let children = sections
            .iter()
            .filter_map(|section| match section.get("type").and_then(Value::as_str) {
                Some("Status") => Some(
                    Element::new("Status")
                        .prop("warnings", Value::from(list_len(r.store(), WARNINGS_PATH)))
                        .prop("errors", Value::from(list_len(r.store(), ERRORS_PATH)))
                        .done(),
                ),
                Some("Checklist") => {
                    let items = section
                        .get("items")
                        .and_then(Value::as_array)
                        .map(|items| {
                            items
                                .iter()
                                .map(|item| {
                                    let checked = item
                                        .get("path")
                                        .and_then(|p| r.store_value(p))
                                        .map(|v| truthy(&v))
                                        .unwrap_or(false);
                                    Element::new("ChecklistItem")
                                        .maybe_prop("id", item.get("id").cloned())
                                        .maybe_prop("label", item.get("label").cloned())
                                        .prop("checked", Value::Bool(checked))
                                        .done()
                                })
                                .collect()
                        })
                        .unwrap_or_default();
                    Some(
                        Element::new("Checklist")
                            .maybe_prop("title", section.get("title").cloned())
                            .children(items)
                            .done(),
                    )
                }
                _ => None,
            })
            .collect();

        Element::new("Inspector").children(children).done()
    }
}

fn artifacts_empty(store: &StateStore) -> bool {
    list_len(store, ARTIFACTS_PATH) == 0
}

fn list_len(store: &StateStore, path: &str) -> usize {
    store
        .get_str(path)
        .and_then(|v| v.as_array().map(|a| a.len()))
        .unwrap_or(0)
}

fn find_artifact(store: &StateStore, id: &Value) -> Option<Value> {
    let artifacts = store.get_str(ARTIFACTS_PATH)?;
    artifacts
        .as_array()?
        .iter()
        .find(|a| a.get("id") == Some(id))
        .cloned()
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
