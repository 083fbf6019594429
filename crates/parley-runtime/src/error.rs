//! Runtime error types.

use parley_core::{DispatchError, RegistrationError, RoutingError, SessionError};
use thiserror::Error;

use crate::config::ConfigError;
use crate::store::StoreError;

/// Errors that stop the runtime from starting or end its event loop.
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Registration(#[from] RegistrationError),

    #[error(transparent)]
    Routing(#[from] RoutingError),

    /// A handler failed while the fault policy was `propagate`.
    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// The bot selected as the only recipient does not exist.
    #[error("No bot named {0}")]
    UnknownTarget(String),
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
