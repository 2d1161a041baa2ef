use std::time::Duration;

use serde::{Deserialize, Serialize};

/// How far a transaction must have progressed before it counts as landed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Commitment {
    #[default]
    Processed,
    Confirmed,
    Finalized,
}

impl Commitment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Commitment::Processed => "processed",
            Commitment::Confirmed => "confirmed",
            Commitment::Finalized => "finalized",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcLedgerConfig {
    /// JSON-RPC endpoint.
    pub url: String,
    #[serde(default)]
    pub commitment: Commitment,
    /// Status polls before a submitted transaction is reported unconfirmed.
    #[serde(default = "default_confirm_attempts")]
    pub confirm_attempts: u32,
    #[serde(default = "default_confirm_interval_ms")]
    pub confirm_interval_ms: u64,
}

fn default_confirm_attempts() -> u32 {
    60
}

fn default_confirm_interval_ms() -> u64 {
    500
}

impl RpcLedgerConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            commitment: Commitment::default(),
            confirm_attempts: default_confirm_attempts(),
            confirm_interval_ms: default_confirm_interval_ms(),
        }
    }

    pub fn confirm_interval(&self) -> Duration {
        Duration::from_millis(self.confirm_interval_ms)
    }
}
