use thiserror::Error;

use crate::collaborator::OrchestratorError;
use crate::event_bus::EventError;
use crate::flow::FlowError;
use crate::guard::GuardError;
use crate::path::PathError;
use crate::persistence::PersistenceError;
use crate::runtime::RuntimeError;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Flow error: {0}")]
    Flow(#[from] FlowError),
    #[error("Runtime error: {0}")]
    Runtime(#[from] RuntimeError),
    #[error("Path error: {0}")]
    Path(#[from] PathError),
    #[error("Guard error: {0}")]
    Guard(#[from] GuardError),
    #[error("Event error: {0}")]
    Event(#[from] EventError),
    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),
    #[error("Orchestrator error: {0}")]
    Orchestrator(#[from] OrchestratorError),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type InternalResult<T> = Result<T, Error>;

impl Error {
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Error::Internal(message.into())
    }
}
