//! Flowlet turns a static JSON flow document into a live, stateful
//! application: screens, actions and initial state come from the document,
//! while mutation flows through a single state store and business logic
//! stays behind an event bus.

pub mod action;
pub mod binding;
pub mod collaborator;
pub mod config;
pub mod context;
pub mod error;
pub mod event_bus;
pub mod flow;
pub mod guard;
pub mod path;
pub mod persistence;
pub mod renderer;
pub mod runtime;
pub mod screen;
pub mod store;

// Re-exports
pub use context::Ctx;
pub use error::*;
pub use flow::Flow;
pub use runtime::FlowRuntime;
pub use store::StateStore;
