//! JSON-RPC envelopes and result shapes.

use base64::{Engine, engine::general_purpose::STANDARD};
use bytes::Bytes;
use sd_core::{Account, AccountFilter, Pubkey};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::Error;

#[derive(Debug, Serialize)]
pub(crate) struct Request<'a> {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: &'a str,
    pub params: Value,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ErrorBody {
    pub code: i64,
    pub message: String,
    #[serde(default)]
    pub data: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Response<T> {
    pub result: Option<T>,
    pub error: Option<ErrorBody>,
}

impl<T> Response<T> {
    pub fn into_result(self) -> Result<T, Error> {
        if let Some(error) = self.error {
            return Err(Error::Rpc {
                code: error.code,
                message: error.message,
                data: error.data,
            });
        }
        self.result
            .ok_or_else(|| Error::Malformed("response has neither result nor error".into()))
    }
}

/// Results annotated with the slot they were read at.
#[derive(Debug, Deserialize)]
pub(crate) struct WithContext<T> {
    pub value: T,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct UiAccount {
    pub lamports: u64,
    pub owner: String,
    /// `[payload, encoding]`
    pub data: (String, String),
}

impl UiAccount {
    pub fn decode(self) -> Result<Account, Error> {
        let (payload, encoding) = self.data;
        if encoding != "base64" {
            return Err(Error::Malformed(format!("unexpected encoding {encoding}")));
        }
        let owner = self
            .owner
            .parse::<Pubkey>()
            .map_err(|e| Error::Malformed(e.to_string()))?;
        Ok(Account {
            lamports: self.lamports,
            owner,
            data: Bytes::from(STANDARD.decode(payload)?),
        })
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct KeyedUiAccount {
    pub pubkey: String,
    pub account: UiAccount,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct LatestBlockhash {
    pub blockhash: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SignatureStatus {
    #[serde(default)]
    pub err: Option<Value>,
    #[serde(default)]
    pub confirmation_status: Option<crate::Commitment>,
}

pub(crate) fn filter_json(filter: &AccountFilter) -> Value {
    match filter {
        AccountFilter::Memcmp { offset, bytes } => json!({
            "memcmp": { "offset": offset, "bytes": bs58::encode(bytes).into_string() }
        }),
        AccountFilter::DataSize(len) => json!({ "dataSize": len }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_account_info() {
        let raw = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "result": {
                "context": { "slot": 9 },
                "value": {
                    "data": ["AQID", "base64"],
                    "executable": false,
                    "lamports": 1_461_600,
                    "owner": "11111111111111111111111111111111",
                    "rentEpoch": 0
                }
            }
        });
        let response: Response<WithContext<Option<UiAccount>>> =
            serde_json::from_value(raw).unwrap();
        let account = response.into_result().unwrap().value.unwrap().decode().unwrap();
        assert_eq!(account.lamports, 1_461_600);
        assert_eq!(account.owner, sd_core::pubkey::system_program::ID);
        assert_eq!(&account.data[..], &[1, 2, 3]);
    }

    #[test]
    fn missing_account_is_null_value() {
        let raw = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "result": { "context": { "slot": 9 }, "value": null }
        });
        let response: Response<WithContext<Option<UiAccount>>> =
            serde_json::from_value(raw).unwrap();
        assert!(response.into_result().unwrap().value.is_none());
    }

    #[test]
    fn error_envelope_wins() {
        let raw = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "error": { "code": -32602, "message": "Invalid param" }
        });
        let response: Response<u64> = serde_json::from_value(raw).unwrap();
        match response.into_result() {
            Err(Error::Rpc { code, message, .. }) => {
                assert_eq!(code, -32602);
                assert_eq!(message, "Invalid param");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn signature_status_parses() {
        let raw = json!({
            "context": { "slot": 3 },
            "value": [
                null,
                { "slot": 3, "confirmations": null, "err": null, "confirmationStatus": "finalized" }
            ]
        });
        let statuses: WithContext<Vec<Option<SignatureStatus>>> =
            serde_json::from_value(raw).unwrap();
        assert!(statuses.value[0].is_none());
        let landed = statuses.value[1].as_ref().unwrap();
        assert!(landed.err.is_none());
        assert_eq!(landed.confirmation_status, Some(crate::Commitment::Finalized));
    }

    #[test]
    fn filters_use_base58_bytes() {
        let filter = AccountFilter::memcmp(8, vec![0u8; 4]);
        assert_eq!(
            filter_json(&filter),
            json!({ "memcmp": { "offset": 8, "bytes": "1111" } })
        );
        assert_eq!(
            filter_json(&AccountFilter::DataSize(85)),
            json!({ "dataSize": 85 })
        );
    }
}
