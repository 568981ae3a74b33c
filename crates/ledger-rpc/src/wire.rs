//! JSON-RPC envelopes and the handful of result shapes the client reads.

use base64::Engine as _;
use ledger_ix::{AccountSnapshot, Address, Commitment, IxError};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

pub(crate) fn b64() -> base64::engine::GeneralPurpose {
    base64::engine::general_purpose::STANDARD
}

pub fn request(id: u64, method: &str, params: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": method,
        "params": params,
    })
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorObject>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RpcErrorObject {
    pub code: i64,
    pub message: String,
    #[serde(default)]
    pub data: Option<Value>,
}

impl RpcErrorObject {
    /// Program logs attached to a failed preflight simulation.
    pub fn logs(&self) -> Vec<String> {
        self.data
            .as_ref()
            .and_then(|d| d.get("logs"))
            .and_then(Value::as_array)
            .map(|logs| {
                logs.iter()
                    .filter_map(|l| l.as_str().map(str::to_owned))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn into_error(self, method: &str) -> IxError {
        let logs = self.logs();
        if method == "sendTransaction" {
            IxError::SubmissionFailure {
                message: self.message,
                logs,
            }
        } else {
            IxError::Transport(format!("{method}: rpc error {}: {}", self.code, self.message))
        }
    }
}

/// Unwrap a JSON-RPC response body into its typed `result`.
pub fn parse_response<T: DeserializeOwned>(method: &str, body: Value) -> Result<T, IxError> {
    let envelope: Envelope = serde_json::from_value(body)
        .map_err(|e| IxError::Transport(format!("{method}: malformed response: {e}")))?;
    if let Some(error) = envelope.error {
        return Err(error.into_error(method));
    }
    let result = envelope.result.unwrap_or(Value::Null);
    serde_json::from_value(result)
        .map_err(|e| IxError::Transport(format!("{method}: unexpected result: {e}")))
}

/// `{ context, value }` wrapper used by most account and status calls.
#[derive(Debug, Deserialize)]
pub struct WithContext<T> {
    pub value: T,
}

#[derive(Debug, Deserialize)]
pub struct LatestBlockhash {
    pub blockhash: String,
}

impl LatestBlockhash {
    pub fn to_bytes(&self) -> Result<[u8; 32], IxError> {
        let raw = bs58::decode(&self.blockhash)
            .into_vec()
            .map_err(|e| IxError::Transport(format!("blockhash is not base58: {e}")))?;
        raw.as_slice()
            .try_into()
            .map_err(|_| IxError::Transport(format!("blockhash is {} bytes", raw.len())))
    }
}

#[derive(Debug, Deserialize)]
pub struct UiAccount {
    pub lamports: u64,
    pub owner: String,
    /// `[payload, encoding]`
    pub data: (String, String),
    pub executable: bool,
}

impl UiAccount {
    pub fn into_snapshot(self, address: Address) -> Result<AccountSnapshot, IxError> {
        let (payload, encoding) = self.data;
        if encoding != "base64" {
            return Err(IxError::Transport(format!(
                "account {address}: unexpected data encoding {encoding}"
            )));
        }
        let data = b64()
            .decode(payload)
            .map_err(|e| IxError::Transport(format!("account {address}: bad base64: {e}")))?;
        Ok(AccountSnapshot {
            address,
            owner: self.owner.parse()?,
            lamports: self.lamports,
            data,
            executable: self.executable,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureStatus {
    #[serde(default)]
    pub confirmation_status: Option<String>,
    #[serde(default)]
    pub err: Option<Value>,
}

impl SignatureStatus {
    /// Reached commitment; a failed transaction is a [`IxError::SubmissionFailure`].
    pub fn commitment(&self) -> Result<Commitment, IxError> {
        if let Some(err) = &self.err {
            return Err(IxError::SubmissionFailure {
                message: format!("transaction failed: {err}"),
                logs: Vec::new(),
            });
        }
        // Nodes that omit the field only report rooted statuses.
        match &self.confirmation_status {
            Some(level) => level.parse(),
            None => Ok(Commitment::Finalized),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // -- Envelopes ----------------------------------------------------------

    #[test]
    fn request_envelope_shape() {
        let req = request(7, "getBalance", json!(["11111111111111111111111111111111"]));
        assert_eq!(req["jsonrpc"], "2.0");
        assert_eq!(req["id"], 7);
        assert_eq!(req["method"], "getBalance");
        assert_eq!(req["params"][0], "11111111111111111111111111111111");
    }

    #[test]
    fn parses_plain_result() {
        let body = json!({"jsonrpc": "2.0", "id": 1, "result": 1_461_600u64});
        let lamports: u64 = parse_response("getMinimumBalanceForRentExemption", body).unwrap();
        assert_eq!(lamports, 1_461_600);
    }

    #[test]
    fn null_result_reads_as_none() {
        let body = json!({"jsonrpc": "2.0", "id": 1, "result": {"context": {"slot": 5}, "value": null}});
        let parsed: WithContext<Option<UiAccount>> = parse_response("getAccountInfo", body).unwrap();
        assert!(parsed.value.is_none());
    }

    // -- Errors -------------------------------------------------------------

    #[test]
    fn preflight_failure_keeps_logs() {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "error": {
                "code": -32002,
                "message": "Transaction simulation failed: Error processing Instruction 0: custom program error: 0x1770",
                "data": {
                    "err": {"InstructionError": [0, {"Custom": 6000}]},
                    "logs": [
                        "Program 6crPEdUww61S2GifdDKHWkFiZXw1EdFu8zR6XBXFjKL3 invoke [1]",
                        "Program log: AnchorError occurred. Error Code: NoSolSent. Error Number: 6000.",
                    ]
                }
            }
        });
        let err = parse_response::<String>("sendTransaction", body).unwrap_err();
        match err {
            IxError::SubmissionFailure { message, logs } => {
                assert!(message.contains("0x1770"));
                assert_eq!(logs.len(), 2);
                assert!(logs[1].contains("Error Number: 6000"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn read_errors_are_transport() {
        let body = json!({"jsonrpc": "2.0", "id": 1, "error": {"code": -32602, "message": "Invalid param"}});
        let err = parse_response::<u64>("getAccountInfo", body).unwrap_err();
        assert!(matches!(err, IxError::Transport(ref m) if m.contains("-32602")));
    }

    #[test]
    fn garbage_body_is_transport() {
        let err = parse_response::<u64>("getSlot", json!("not an envelope")).unwrap_err();
        assert!(matches!(err, IxError::Transport(_)));
    }

    // -- Results ------------------------------------------------------------

    #[test]
    fn blockhash_decodes_to_32_bytes() {
        let hash = LatestBlockhash {
            blockhash: bs58::encode([9u8; 32]).into_string(),
        };
        assert_eq!(hash.to_bytes().unwrap(), [9u8; 32]);

        let short = LatestBlockhash { blockhash: "3yZe7d".into() };
        assert!(short.to_bytes().is_err());
    }

    #[test]
    fn account_snapshot_from_base64() {
        let account = UiAccount {
            lamports: 42,
            owner: "TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA".into(),
            data: (b64().encode([1u8, 2, 3]), "base64".into()),
            executable: false,
        };
        let address = Address::new([5; 32]);
        let snap = account.into_snapshot(address).unwrap();

        assert_eq!(snap.address, address);
        assert_eq!(snap.owner.to_string(), "TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA");
        assert_eq!(snap.data, vec![1, 2, 3]);
        assert_eq!(snap.lamports, 42);
    }

    #[test]
    fn account_rejects_other_encodings() {
        let account = UiAccount {
            lamports: 0,
            owner: "11111111111111111111111111111111".into(),
            data: ("AQID".into(), "base58".into()),
            executable: false,
        };
        assert!(account.into_snapshot(Address::new([5; 32])).is_err());
    }

    #[test]
    fn status_levels() {
        let status: SignatureStatus =
            serde_json::from_value(json!({"slot": 1, "confirmations": 0, "err": null, "confirmationStatus": "confirmed"}))
                .unwrap();
        assert_eq!(status.commitment().unwrap(), Commitment::Confirmed);

        let rooted: SignatureStatus =
            serde_json::from_value(json!({"slot": 1, "confirmations": null, "err": null})).unwrap();
        assert_eq!(rooted.commitment().unwrap(), Commitment::Finalized);
    }

    #[test]
    fn failed_status_is_submission_failure() {
        let status: SignatureStatus = serde_json::from_value(json!({
            "err": {"InstructionError": [0, {"Custom": 6003}]},
            "confirmationStatus": "confirmed"
        }))
        .unwrap();
        let err = status.commitment().unwrap_err();
        assert!(matches!(err, IxError::SubmissionFailure { ref message, .. } if message.contains("6003")));
    }
}
