use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};

use anyhow::{Context, Result};
use sd_client::{EncryptionConfig, OffloadPolicy};
use sd_core::{Keypair, Pubkey, SOLDRIVE_PROGRAM_ID, Signer};
use sd_ledger_rpc::{Commitment, RpcLedgerConfig};
use sd_offload_gateway::GatewayConfig;
use serde::{Deserialize, Serialize};

pub const MAINNET_URL: &str = "https://api.mainnet-beta.solana.com";
pub const DEVNET_URL: &str = "https://api.devnet.solana.com";
pub const LOCALNET_URL: &str = "http://127.0.0.1:8899";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SoldriveConfig {
    pub wallet: WalletConfig,
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub offload: Option<OffloadConfig>,
    #[serde(default)]
    pub encryption: EncryptionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletConfig {
    /// Secret key file; relative paths resolve against the profile's
    /// directory.
    pub keypair_file: PathBuf,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Cluster {
    Mainnet,
    #[default]
    Devnet,
    Localnet,
}

impl Cluster {
    pub fn url(&self) -> &'static str {
        match self {
            Cluster::Mainnet => MAINNET_URL,
            Cluster::Devnet => DEVNET_URL,
            Cluster::Localnet => LOCALNET_URL,
        }
    }

    pub fn is_mainnet(&self) -> bool {
        matches!(self, Cluster::Mainnet)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum LedgerConfig {
    Rpc {
        #[serde(default)]
        cluster: Cluster,
        /// Overrides the cluster's endpoint.
        #[serde(default)]
        url: Option<String>,
        #[serde(default)]
        commitment: Commitment,
        #[serde(default)]
        program_id: Option<String>,
    },
}

impl LedgerConfig {
    pub fn cluster(&self) -> Cluster {
        match self {
            LedgerConfig::Rpc { cluster, .. } => *cluster,
        }
    }

    pub fn program_id(&self) -> Result<Pubkey> {
        match self {
            LedgerConfig::Rpc {
                program_id: Some(id),
                ..
            } => Pubkey::from_str(id).with_context(|| format!("invalid program id '{id}'")),
            LedgerConfig::Rpc { .. } => Ok(SOLDRIVE_PROGRAM_ID),
        }
    }

    pub fn rpc_config(&self) -> RpcLedgerConfig {
        match self {
            LedgerConfig::Rpc {
                cluster,
                url,
                commitment,
                ..
            } => {
                let mut config = RpcLedgerConfig::new(url.as_deref().unwrap_or(cluster.url()));
                config.commitment = *commitment;
                config
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum OffloadConfig {
    Gateway {
        #[serde(default)]
        gateway_url: Option<String>,
        #[serde(default)]
        node_url: Option<String>,
        #[serde(default)]
        policy: OffloadPolicy,
    },
}

impl OffloadConfig {
    pub fn policy(&self) -> OffloadPolicy {
        match self {
            OffloadConfig::Gateway { policy, .. } => *policy,
        }
    }

    /// Gateway settings for `owner`, defaulting to the nodes that serve
    /// `cluster`.
    pub fn gateway_config(&self, cluster: Cluster, owner: &Pubkey) -> GatewayConfig {
        match self {
            OffloadConfig::Gateway {
                gateway_url,
                node_url,
                ..
            } => {
                let mut config = GatewayConfig::for_cluster(cluster.is_mainnet(), owner.to_string());
                if let Some(url) = gateway_url {
                    config.gateway_url = url.clone();
                }
                if let Some(url) = node_url {
                    config.node_url = url.clone();
                }
                config
            }
        }
    }
}

impl SoldriveConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).with_context(|| {
            format!("could not read profile {path:?}, run `soldrive config init` first")
        })?;
        toml::from_str(&content).with_context(|| format!("could not parse profile {path:?}"))
    }

    pub fn keypair_path(&self, config_file: &Path) -> PathBuf {
        match config_file.parent() {
            Some(dir) if self.wallet.keypair_file.is_relative() => {
                dir.join(&self.wallet.keypair_file)
            }
            _ => self.wallet.keypair_file.clone(),
        }
    }

    pub fn load_keypair(&self, config_file: &Path) -> Result<Keypair> {
        let path = self.keypair_path(config_file);
        let bytes = fs::read(&path).with_context(|| format!("could not read keypair {path:?}"))?;
        let keypair = Keypair::from_secret_bytes(&bytes)
            .with_context(|| format!("invalid keypair file {path:?}"))?;
        tracing::debug!(owner = %keypair.pubkey(), "wallet loaded");
        Ok(keypair)
    }
}
