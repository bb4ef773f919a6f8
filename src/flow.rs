//! Flow definition data model.
//!
//! A flow document is loaded once at startup and immutable afterwards: only
//! the state document mutates, and only through the store API. The structs
//! here mirror the on-disk JSON shape (camelCase keys).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum_macros::{Display, EnumString};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FlowError {
    #[error("failed to parse flow document: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("flow declares no screens")]
    NoScreens,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Flow {
    pub app: AppMeta,
    #[serde(default)]
    pub state: StateDecl,
    #[serde(default)]
    pub actions: HashMap<String, ActionDef>,
    pub screens: Vec<ScreenDef>,
}

impl Flow {
    pub fn from_json(raw: &str) -> Result<Self, FlowError> {
        let flow: Flow = serde_json::from_str(raw)?;
        if flow.screens.is_empty() {
            return Err(FlowError::NoScreens);
        }
        Ok(flow)
    }

    pub fn from_value(value: Value) -> Result<Self, FlowError> {
        let flow: Flow = serde_json::from_value(value)?;
        if flow.screens.is_empty() {
            return Err(FlowError::NoScreens);
        }
        Ok(flow)
    }

    pub fn screen(&self, id: &str) -> Option<&ScreenDef> {
        self.screens.iter().find(|s| s.id == id)
    }

    pub fn action(&self, name: &str) -> Option<&ActionDef> {
        self.actions.get(name)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppMeta {
    pub id: String,
    pub name: String,
    pub routing: Routing,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Routing {
    #[serde(rename = "initialRoute")]
    pub initial_route: String,
    pub routes: Vec<Route>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Route {
    pub path: String,
    #[serde(rename = "screenId")]
    pub screen_id: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StateDecl {
    #[serde(default)]
    pub stores: HashMap<String, StoreDecl>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreDecl {
    #[serde(default)]
    pub initial: Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ActionDef {
    #[serde(rename = "type")]
    pub kind: ActionKind,
    #[serde(default)]
    pub params: Option<Value>,
    #[serde(default)]
    pub effects: Vec<Effect>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Navigate,
    Set,
    Command,
}

/// One step of an action. `value`/`payload` are templates, resolved against
/// the invocation context when the effect executes; `path` may itself embed
/// template markers.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum Effect {
    Set {
        path: String,
        #[serde(default)]
        value: Value,
    },
    Push {
        path: String,
        #[serde(default)]
        value: Value,
    },
    Dispatch {
        target: String,
        #[serde(default)]
        payload: Value,
    },
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScreenDef {
    pub id: String,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, rename = "onEnter")]
    pub on_enter: Vec<EnterStep>,
    pub layout: UiNode,
}

/// An `onEnter` step; only `op: "action"` is defined today.
#[derive(Debug, Clone, Deserialize)]
pub struct EnterStep {
    pub op: String,
    pub name: String,
    #[serde(default)]
    pub params: Option<Value>,
}

/// A node of a screen's layout tree. The discriminant is the `type` tag;
/// everything except `type` and `children` is collected into `props`.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct UiNode {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub children: Vec<UiNode>,
    #[serde(flatten)]
    pub props: serde_json::Map<String, Value>,
}

/// An identified unit of generated content, kept in the ordered list at
/// `workspace.artifacts`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Artifact {
    pub id: String,
    pub kind: String,
    pub title: String,
    #[serde(default, rename = "defaultTab", skip_serializing_if = "Option::is_none")]
    pub default_tab: Option<String>,
    pub data: Value,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum AgentStatus {
    #[default]
    Idle,
    Running,
    Done,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Notification {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub message: String,
}
