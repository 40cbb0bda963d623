use thiserror::Error;
use tracer_core::BusError;

use crate::config::ConfigError;
use crate::session::SessionState;

/// Errors surfaced to the control side of the tracer.
#[derive(Debug, Error)]
pub enum TracerError {
    #[error("bus ownership refused: {0}")]
    BusGrant(BusError),
    #[error("priming target memory failed: {0}")]
    Priming(BusError),
    #[error("target reset failed: {0}")]
    Reset(BusError),
    #[error("unexpected {ack} acknowledgement while {state:?}")]
    UnexpectedAcknowledge { ack: &'static str, state: SessionState },
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("malformed command: {0}")]
    Command(#[from] serde_json::Error),
}
