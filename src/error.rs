//! Top-level error type aggregating the core's sub-errors.

use thiserror::Error;

use crate::engine::EngineError;
use crate::registry::RegistryError;

#[derive(Error, Debug)]
pub enum ReconcilerError {
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, ReconcilerError>;
