mod config;
mod ledger;
mod rpc;

pub use config::{Commitment, RpcLedgerConfig};
pub use ledger::RpcLedger;

use sd_core::{LedgerError, ProgramError, Signature};
use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error("Got HTTP {0} with content '{1}'")]
    HttpFailWithBody(u16, String),

    #[error("RPC error {code}: {message}")]
    Rpc {
        code: i64,
        message: String,
        data: Option<Value>,
    },
    #[error("transaction {0} failed: {1}")]
    TransactionFailed(Signature, Value),
    #[error("transaction {signature} not confirmed after {attempts} status checks")]
    Unconfirmed { signature: Signature, attempts: u32 },
    #[error("malformed RPC response: {0}")]
    Malformed(String),

    #[error(transparent)]
    Reqwest(#[from] reqwest::Error),
    #[error(transparent)]
    SerdeJson(#[from] serde_json::Error),
    #[error(transparent)]
    Base64(#[from] base64::DecodeError),
}

/// Extracts the program error from a transaction error object of the form
/// `{"InstructionError": [index, {"Custom": code}]}`.
fn custom_program_error(err: &Value) -> Option<ProgramError> {
    let code = err.get("InstructionError")?.get(1)?.get("Custom")?.as_u64()?;
    ProgramError::from_code(u32::try_from(code).ok()?)
}

impl From<Error> for LedgerError {
    fn from(error: Error) -> Self {
        match error {
            Error::Rpc {
                ref message,
                ref data,
                ..
            } => {
                let program = data
                    .as_ref()
                    .and_then(|d| d.get("err"))
                    .and_then(custom_program_error);
                match program {
                    Some(program) => LedgerError::Program(program),
                    None => LedgerError::Rejected(message.clone()),
                }
            }
            Error::TransactionFailed(_, ref err) => match custom_program_error(err) {
                Some(program) => LedgerError::Program(program),
                None => LedgerError::Rejected(error.to_string()),
            },
            other => LedgerError::Transport(other.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn preflight_custom_error_maps_to_program_error() {
        let error = Error::Rpc {
            code: -32002,
            message: "Transaction simulation failed: Error processing Instruction 0: custom program error: 0x1773".into(),
            data: Some(json!({
                "err": { "InstructionError": [0, { "Custom": 6003 }] },
                "logs": []
            })),
        };
        let mapped: LedgerError = error.into();
        assert!(matches!(
            mapped,
            LedgerError::Program(ProgramError::DataSizeExceeded)
        ));
    }

    #[test]
    fn other_rpc_errors_are_rejections() {
        let error = Error::Rpc {
            code: -32002,
            message: "Transaction simulation failed: Blockhash not found".into(),
            data: Some(json!({ "err": "BlockhashNotFound" })),
        };
        let mapped: LedgerError = error.into();
        match mapped {
            LedgerError::Rejected(message) => assert!(message.contains("Blockhash not found")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn unknown_custom_codes_are_rejections() {
        let err = json!({ "InstructionError": [1, { "Custom": 2006 }] });
        let mapped: LedgerError = Error::TransactionFailed(Signature::default(), err).into();
        assert!(matches!(mapped, LedgerError::Rejected(_)));
    }

    #[test]
    fn transport_failures_keep_their_message() {
        let mapped: LedgerError = Error::HttpFailWithBody(502, "bad gateway".into()).into();
        assert!(matches!(mapped, LedgerError::Transport(_)));
        assert!(mapped.to_string().contains("502"));
    }
}
