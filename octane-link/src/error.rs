//! Error type shared by every octane-link operation.

use crate::signature::FuncType;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the registry, the ID pools and the renderer connection.
///
/// Invoking a callback ID that is no longer registered is deliberately *not*
/// represented here: the renderer may race an unregister, and the dispatch
/// layer answers with the signature's default value instead.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Every ID in `1..=max` is currently handed out for this signature.
    #[error("callback pool for {func_type} exhausted ({max} ids in use)")]
    PoolExhausted { func_type: FuncType, max: u32 },

    /// The ID is not tracked as used: double release, or never allocated.
    #[error("callback id {id} is not in use for {func_type}")]
    IdNotInUse { func_type: FuncType, id: u32 },

    /// A callback is already stored under this ID.
    #[error("callback id {id} is already registered for {func_type}")]
    AlreadyRegistered { func_type: FuncType, id: u32 },

    /// The configured server address could not be turned into an endpoint.
    #[error("invalid server address: {0}")]
    InvalidAddress(String),

    /// The renderer rejected the call's arguments (`INVALID_ARGUMENT`).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Any other non-OK gRPC status.
    #[error("rpc failed with {code:?}: {message}")]
    Rpc { code: tonic::Code, message: String },

    /// The channel itself failed (connect, TLS, socket).
    #[error("transport error: {0}")]
    Transport(#[from] tonic::transport::Error),

    /// A callback-stream message arrived without a usable payload.
    #[error("malformed callback event: {0}")]
    MalformedEvent(String),

    /// The configuration file could not be read or parsed.
    #[error("config error: {0}")]
    Config(String),
}

impl From<tonic::Status> for Error {
    fn from(status: tonic::Status) -> Self {
        match status.code() {
            tonic::Code::InvalidArgument => Error::InvalidArgument(status.message().to_string()),
            code => Error::Rpc {
                code,
                message: status.message().to_string(),
            },
        }
    }
}
