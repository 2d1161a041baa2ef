mod config;
mod store;

pub use config::{DEVNET_NODE_URL, GATEWAY_URL, GatewayConfig, MAINNET_NODE_URL};
pub use store::GatewayStore;

use sd_core::OffloadError;
use thiserror::Error;

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error("Got HTTP {0} with content '{1}'")]
    HttpFailWithBody(u16, String),
    #[error("unexpected reply from {0}: {1}")]
    UnexpectedReply(String, String),

    #[error(transparent)]
    Reqwest(#[from] reqwest::Error),
    #[error(transparent)]
    SerdeJson(#[from] serde_json::Error),
}

impl From<Error> for OffloadError {
    fn from(error: Error) -> Self {
        OffloadError::Transport(error.into())
    }
}
