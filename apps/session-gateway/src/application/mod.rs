use core_lib::CoreError;
use core_lib::domain::role::Role;
use http::StatusCode;

pub mod commands;
pub mod guard;
pub mod query;
pub mod router;
pub mod routing;
pub mod transport;

use transport::TransportError;

/// Everything a gateway call can end in besides data.
#[derive(thiserror::Error, Debug)]
pub enum GatewayError {
    /// The request never got an HTTP answer. Not retried automatically.
    #[error("Transport error: {message}")]
    Transport { message: String, retryable: bool },

    /// The server rejected the role's credential; the role has been logged out.
    #[error("Session ended for {role}")]
    SessionEnded { role: Role },

    /// The role's credential changed while the request was in flight.
    #[error("Discarded stale response for {role} (issued at epoch {issued}, now {current})")]
    StaleResponse { role: Role, issued: u64, current: u64 },

    /// A newer query for the same view was started before this one finished.
    #[error("Superseded by a newer query")]
    Superseded,

    #[error("Server responded {code}: {message}")]
    Status { code: StatusCode, message: String },

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Core error: {0}")]
    Core(#[from] CoreError),
}

impl GatewayError {
    pub fn is_retryable(&self) -> bool {
        match self {
            GatewayError::Transport { retryable, .. } => *retryable,
            GatewayError::Status { code, .. } => code.is_server_error(),
            _ => false,
        }
    }
}

impl From<TransportError> for GatewayError {
    fn from(error: TransportError) -> Self {
        GatewayError::Transport {
            retryable: error.is_retryable(),
            message: error.to_string(),
        }
    }
}
