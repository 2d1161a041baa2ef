use serde::{Deserialize, Serialize};

pub const GATEWAY_URL: &str = "https://arweave.net";
pub const MAINNET_NODE_URL: &str = "https://node1.bundlr.network";
pub const DEVNET_NODE_URL: &str = "https://devnet.bundlr.network";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Serves uploaded payloads by id.
    #[serde(default = "default_gateway_url")]
    pub gateway_url: String,
    /// Accepts uploads and quotes prices.
    pub node_url: String,
    /// Wallet address whose upload balance is queried.
    pub address: String,
}

fn default_gateway_url() -> String {
    GATEWAY_URL.to_owned()
}

impl GatewayConfig {
    /// Defaults for a cluster: mainnet uploads go to the production node,
    /// every other cluster to the devnet node.
    pub fn for_cluster(mainnet: bool, address: impl Into<String>) -> Self {
        let node_url = if mainnet {
            MAINNET_NODE_URL
        } else {
            DEVNET_NODE_URL
        };
        Self {
            gateway_url: default_gateway_url(),
            node_url: node_url.to_owned(),
            address: address.into(),
        }
    }
}
