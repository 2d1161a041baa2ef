use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD};
use sd_core::{
    Account, AccountFilter, Blockhash, Ledger, LedgerError, LedgerResult, Pubkey, Signature,
    Transaction,
};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use crate::{
    Error, RpcLedgerConfig,
    rpc::{
        KeyedUiAccount, LatestBlockhash, Request, Response, SignatureStatus, UiAccount,
        WithContext, filter_json,
    },
};

/// A ledger reached over the JSON-RPC interface of a validator node.
///
/// Each operation makes a single attempt; failed requests are reported to
/// the caller rather than retried.
#[derive(Debug)]
pub struct RpcLedger {
    config: RpcLedgerConfig,
    reqwest_client: reqwest::Client,
    next_id: AtomicU64,
}

impl RpcLedger {
    pub fn new(config: RpcLedgerConfig) -> Self {
        Self {
            config,
            reqwest_client: reqwest::Client::new(),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn config(&self) -> &RpcLedgerConfig {
        &self.config
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, Error> {
        let request = Request {
            jsonrpc: "2.0",
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            method,
            params,
        };
        tracing::trace!(method, id = request.id, "rpc request");
        let res = self
            .reqwest_client
            .post(&self.config.url)
            .json(&request)
            .send()
            .await?;

        if !res.status().is_success() {
            let status = res.status().as_u16();
            let body = res.text().await.unwrap_or_default();
            return Err(Error::HttpFailWithBody(status, body));
        }
        res.json::<Response<T>>().await?.into_result()
    }

    fn commitment(&self) -> Value {
        json!({ "commitment": self.config.commitment.as_str() })
    }

    /// Polls the signature status until it reaches the configured
    /// commitment or fails.
    async fn confirm(&self, signature: Signature) -> Result<Signature, Error> {
        for _ in 0..self.config.confirm_attempts {
            let statuses: WithContext<Vec<Option<SignatureStatus>>> = self
                .call(
                    "getSignatureStatuses",
                    json!([[signature.to_string()], { "searchTransactionHistory": false }]),
                )
                .await?;
            if let Some(Some(status)) = statuses.value.into_iter().next() {
                if let Some(err) = status.err {
                    return Err(Error::TransactionFailed(signature, err));
                }
                if status
                    .confirmation_status
                    .is_some_and(|reached| reached >= self.config.commitment)
                {
                    tracing::debug!(%signature, "transaction confirmed");
                    return Ok(signature);
                }
            }
            tokio::time::sleep(self.config.confirm_interval()).await;
        }
        Err(Error::Unconfirmed {
            signature,
            attempts: self.config.confirm_attempts,
        })
    }

    fn parse_signature(raw: &str) -> Result<Signature, Error> {
        raw.parse()
            .map_err(|e| Error::Malformed(format!("signature {raw}: {e}")))
    }
}

#[async_trait]
impl Ledger for RpcLedger {
    async fn get_account(&self, address: &Pubkey) -> LedgerResult<Option<Account>> {
        let found: WithContext<Option<UiAccount>> = self
            .call(
                "getAccountInfo",
                json!([address.to_string(), {
                    "encoding": "base64",
                    "commitment": self.config.commitment.as_str(),
                }]),
            )
            .await?;
        Ok(found.value.map(UiAccount::decode).transpose()?)
    }

    async fn get_program_accounts(
        &self,
        program_id: &Pubkey,
        filters: &[AccountFilter],
    ) -> LedgerResult<Vec<(Pubkey, Account)>> {
        let filters: Vec<Value> = filters.iter().map(filter_json).collect();
        let found: Vec<KeyedUiAccount> = self
            .call(
                "getProgramAccounts",
                json!([program_id.to_string(), {
                    "encoding": "base64",
                    "commitment": self.config.commitment.as_str(),
                    "filters": filters,
                }]),
            )
            .await?;
        tracing::debug!(program = %program_id.fmt_short(), count = found.len(), "scanned program accounts");
        found
            .into_iter()
            .map(|keyed| {
                let address = keyed
                    .pubkey
                    .parse::<Pubkey>()
                    .map_err(|e| Error::Malformed(e.to_string()))?;
                Ok((address, keyed.account.decode()?))
            })
            .collect::<Result<Vec<_>, Error>>()
            .map_err(LedgerError::from)
    }

    async fn latest_blockhash(&self) -> LedgerResult<Blockhash> {
        let latest: WithContext<LatestBlockhash> =
            self.call("getLatestBlockhash", json!([self.commitment()])).await?;
        latest
            .value
            .blockhash
            .parse()
            .map_err(|e| Error::Malformed(format!("blockhash: {e}")).into())
    }

    async fn send_transaction(&self, transaction: &Transaction) -> LedgerResult<Signature> {
        let wire = transaction.serialize()?;
        let raw: String = self
            .call(
                "sendTransaction",
                json!([STANDARD.encode(&wire), {
                    "encoding": "base64",
                    "preflightCommitment": self.config.commitment.as_str(),
                }]),
            )
            .await?;
        let signature = Self::parse_signature(&raw)?;
        tracing::debug!(%signature, bytes = wire.len(), "transaction submitted");
        Ok(self.confirm(signature).await?)
    }

    async fn minimum_balance_for_rent_exemption(&self, data_len: usize) -> LedgerResult<u64> {
        Ok(self
            .call(
                "getMinimumBalanceForRentExemption",
                json!([data_len, self.commitment()]),
            )
            .await?)
    }

    async fn get_balance(&self, address: &Pubkey) -> LedgerResult<u64> {
        let balance: WithContext<u64> = self
            .call("getBalance", json!([address.to_string(), self.commitment()]))
            .await?;
        Ok(balance.value)
    }

    async fn request_airdrop(&self, address: &Pubkey, lamports: u64) -> LedgerResult<Signature> {
        let raw: String = self
            .call(
                "requestAirdrop",
                json!([address.to_string(), lamports, self.commitment()]),
            )
            .await?;
        let signature = Self::parse_signature(&raw)?;
        tracing::info!(address = %address.fmt_short(), lamports, "airdrop requested");
        Ok(self.confirm(signature).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Commitment;

    #[test]
    fn requests_are_json_rpc_2() {
        let request = Request {
            jsonrpc: "2.0",
            id: 7,
            method: "getBalance",
            params: json!(["11111111111111111111111111111111", { "commitment": "processed" }]),
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["jsonrpc"], "2.0");
        assert_eq!(value["id"], 7);
        assert_eq!(value["method"], "getBalance");
        assert_eq!(value["params"][1]["commitment"], "processed");
    }

    #[test]
    fn config_defaults_fill_missing_fields() {
        let config: RpcLedgerConfig =
            serde_json::from_value(json!({ "url": "http://127.0.0.1:8899" })).unwrap();
        assert_eq!(config, RpcLedgerConfig::new("http://127.0.0.1:8899"));
        assert_eq!(config.commitment, Commitment::Processed);
        let ledger = RpcLedger::new(config);
        assert_eq!(ledger.commitment(), json!({ "commitment": "processed" }));
    }

    #[tokio::test]
    async fn unreachable_node_is_a_transport_error() {
        let mut config = RpcLedgerConfig::new("http://127.0.0.1:9");
        config.confirm_attempts = 1;
        let ledger = RpcLedger::new(config);
        let err = ledger.get_balance(&Pubkey::default()).await.unwrap_err();
        assert!(matches!(err, LedgerError::Transport(_)), "{err:?}");
    }
}
