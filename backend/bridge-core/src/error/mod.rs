pub mod bridge;
pub mod config;
pub mod dispatch;
pub mod pipeline;
pub mod protocol;
pub mod retry;
pub mod service;

pub use bridge::{BridgeError, TimeoutOperation};
pub use config::ConfigError;
pub use dispatch::HandlerError;
pub use pipeline::PipelineError;
pub use protocol::ProtocolError;
pub use retry::RetryError;
pub use service::ServiceError;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Bridge(#[from] bridge::BridgeError),

    #[error(transparent)]
    Protocol(#[from] protocol::ProtocolError),

    #[error(transparent)]
    Retry(#[from] retry::RetryError),

    #[error(transparent)]
    Pipeline(#[from] pipeline::PipelineError),

    #[error(transparent)]
    Config(#[from] config::ConfigError),

    #[error(transparent)]
    Service(#[from] service::ServiceError),
}
