use async_trait::async_trait;
use bytes::Bytes;
use sd_core::{
    ContentId,
    offload::{ContentStore, OffloadError, OffloadResult},
};
use serde::Deserialize;
use serde_json::Value;

use crate::{Error, GatewayConfig};

#[derive(Debug, Deserialize)]
struct UploadReply {
    id: String,
}

#[derive(Debug, Deserialize)]
struct BalanceReply {
    balance: Value,
}

/// Parses an amount that nodes send either as a JSON number or as a
/// decimal string.
fn parse_amount(url: &str, value: &Value) -> Result<u64, Error> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
    .ok_or_else(|| Error::UnexpectedReply(url.to_owned(), value.to_string()))
}

/// Client of an upload node plus the read gateway of the external storage
/// network.
#[derive(Debug, Clone)]
pub struct GatewayStore {
    config: GatewayConfig,
    reqwest_client: reqwest::Client,
}

impl GatewayStore {
    pub fn new(config: GatewayConfig) -> Self {
        Self {
            config,
            reqwest_client: reqwest::Client::new(),
        }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    fn content_url(&self, id: &ContentId) -> String {
        format!("{}/{}", self.config.gateway_url.trim_end_matches('/'), id)
    }

    fn node_url(&self, path: &str) -> String {
        format!("{}/{}", self.config.node_url.trim_end_matches('/'), path)
    }

    async fn get_checked(&self, url: &str) -> Result<reqwest::Response, Error> {
        let res = self.reqwest_client.get(url).send().await?;
        if !res.status().is_success() {
            let status = res.status().as_u16();
            let body = res.text().await.unwrap_or_default();
            return Err(Error::HttpFailWithBody(status, body));
        }
        Ok(res)
    }
}

#[async_trait]
impl ContentStore for GatewayStore {
    async fn put(&self, data: Bytes) -> OffloadResult<ContentId> {
        let url = self.node_url("upload");
        let len = data.len();
        let res = self
            .reqwest_client
            .post(&url)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(data)
            .send()
            .await
            .map_err(Error::from)?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(OffloadError::UploadFailed(format!("HTTP {status}: {body}")));
        }
        let reply: UploadReply = res.json().await.map_err(Error::from)?;
        tracing::info!(id = %reply.id, len, "uploaded payload");
        Ok(ContentId::new(reply.id))
    }

    async fn get(&self, id: &ContentId) -> OffloadResult<Bytes> {
        let res = self
            .reqwest_client
            .get(self.content_url(id))
            .send()
            .await
            .map_err(Error::from)?;
        if res.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(OffloadError::NotFound(id.clone()));
        }
        if !res.status().is_success() {
            let status = res.status().as_u16();
            let body = res.text().await.unwrap_or_default();
            return Err(Error::HttpFailWithBody(status, body).into());
        }
        let bytes = res.bytes().await.map_err(Error::from)?;
        tracing::debug!(%id, len = bytes.len(), "downloaded payload");
        Ok(bytes)
    }

    async fn price(&self, len: u64) -> OffloadResult<u64> {
        let url = self.node_url(&format!("price/solana/{len}"));
        let body = self.get_checked(&url).await?.text().await.map_err(Error::from)?;
        let value = serde_json::from_str::<Value>(&body)
            .unwrap_or_else(|_| Value::String(body.clone()));
        Ok(parse_amount(&url, &value)?)
    }

    async fn balance(&self) -> OffloadResult<u64> {
        let url = self.node_url(&format!(
            "account/balance/solana?address={}",
            self.config.address
        ));
        let reply: BalanceReply = self
            .get_checked(&url)
            .await?
            .json()
            .await
            .map_err(Error::from)?;
        Ok(parse_amount(&url, &reply.balance)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn urls_join_without_double_slashes() {
        let store = GatewayStore::new(GatewayConfig {
            gateway_url: "https://arweave.net/".into(),
            node_url: "https://devnet.bundlr.network".into(),
            address: "addr".into(),
        });
        assert_eq!(
            store.content_url(&ContentId::new("abc")),
            "https://arweave.net/abc"
        );
        assert_eq!(
            store.node_url("price/solana/10"),
            "https://devnet.bundlr.network/price/solana/10"
        );
    }

    #[test]
    fn amounts_accept_numbers_and_strings() {
        assert_eq!(parse_amount("u", &json!(42)).unwrap(), 42);
        assert_eq!(parse_amount("u", &json!("1000")).unwrap(), 1000);
        assert!(matches!(
            parse_amount("u", &json!({ "x": 1 })),
            Err(Error::UnexpectedReply(..))
        ));
    }

    #[test]
    fn cluster_defaults() {
        let mainnet = GatewayConfig::for_cluster(true, "a");
        assert_eq!(mainnet.node_url, crate::MAINNET_NODE_URL);
        let devnet = GatewayConfig::for_cluster(false, "a");
        assert_eq!(devnet.node_url, crate::DEVNET_NODE_URL);
        assert_eq!(devnet.gateway_url, crate::GATEWAY_URL);
    }

    #[tokio::test]
    async fn unreachable_node_is_a_transport_error() {
        let store = GatewayStore::new(GatewayConfig {
            gateway_url: "http://127.0.0.1:9".into(),
            node_url: "http://127.0.0.1:9".into(),
            address: "addr".into(),
        });
        let err = store.balance().await.unwrap_err();
        assert!(matches!(err, OffloadError::Transport(_)));
    }
}
