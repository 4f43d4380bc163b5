//! Off-box sub-protocol provider client.
//!
//! Providers serve opaque payload bytes per voting round over HTTP; the
//! client treats them as blobs with a status flag.

use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::{Address, Bytes};
use quill_epoch::retry::execute_with_retry;
use quill_epoch::ExecuteStatus;
use serde::Deserialize;
use tokio::task::JoinHandle;
use url::Url;

use crate::{SubmitterError, DATA_FETCH_RETRY_INTERVAL};

/// The only provider status the client accepts.
pub const STATUS_OK: &str = "OK";

/// Signature payload data is fixed-width.
pub const SIGNATURE_DATA_LEN: usize = 38;

/// Room left for additional data after the fixed entry header.
pub const MAX_ADDITIONAL_DATA_LEN: usize = u16::MAX as usize - 104;

/// Opaque provider response.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct SubProtocolResponse {
    /// Provider status; only `"OK"` is accepted.
    pub status: String,
    /// Payload bytes.
    #[serde(default)]
    pub data: Bytes,
    /// Trailing bytes appended verbatim to signature entries.
    #[serde(default, rename = "additionalData")]
    pub additional_data: Bytes,
}

/// Response checks applied before a fetch counts as successful.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataVerifier {
    /// Accept anything; the plain submitters filter on status themselves.
    Identity,
    /// Enforce the signature-entry preconditions.
    Signature,
}

impl DataVerifier {
    /// Verify `response` against this policy.
    pub fn verify(&self, response: &SubProtocolResponse) -> Result<(), SubmitterError> {
        match self {
            DataVerifier::Identity => Ok(()),
            DataVerifier::Signature => {
                if response.status != STATUS_OK {
                    return Err(SubmitterError::BadStatus(response.status.clone()));
                }
                if response.data.len() != SIGNATURE_DATA_LEN {
                    return Err(SubmitterError::BadDataLength(response.data.len()));
                }
                if response.additional_data.len() > MAX_ADDITIONAL_DATA_LEN {
                    return Err(SubmitterError::AdditionalDataTooLong(
                        response.additional_data.len(),
                    ));
                }
                Ok(())
            }
        }
    }
}

/// One configured sub-protocol provider.
pub struct SubProtocol {
    /// Sub-protocol id, for logs.
    pub id: u8,
    api_endpoint: Url,
    http: reqwest::Client,
}

impl SubProtocol {
    /// Build a provider client for `api_endpoint`.
    pub fn new(id: u8, api_endpoint: &str) -> Result<Self, SubmitterError> {
        Ok(Self {
            id,
            api_endpoint: Url::parse(api_endpoint)?,
            http: reqwest::Client::new(),
        })
    }

    fn request_url(
        &self,
        endpoint_name: &str,
        voting_round: i64,
        submit_address: Address,
    ) -> Result<Url, SubmitterError> {
        let base = self.api_endpoint.as_str().trim_end_matches('/');
        Ok(Url::parse(&format!(
            "{base}/{endpoint_name}/{voting_round}/{submit_address}"
        ))?)
    }

    /// One provider fetch, verified.
    pub async fn get_data(
        &self,
        voting_round: i64,
        endpoint_name: &str,
        submit_address: Address,
        timeout: Duration,
        verifier: DataVerifier,
    ) -> Result<SubProtocolResponse, SubmitterError> {
        let url = self.request_url(endpoint_name, voting_round, submit_address)?;
        let response: SubProtocolResponse = self
            .http
            .get(url)
            .timeout(timeout)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        verifier.verify(&response)?;
        Ok(response)
    }

    /// Launch a retried fetch on its own task; the handle yields exactly
    /// one [`ExecuteStatus`].
    pub fn spawn_fetch(
        self: &Arc<Self>,
        voting_round: i64,
        endpoint_name: &str,
        submit_address: Address,
        retries: u32,
        timeout: Duration,
        verifier: DataVerifier,
    ) -> JoinHandle<ExecuteStatus<SubProtocolResponse>> {
        let protocol = Arc::clone(self);
        let endpoint_name = endpoint_name.to_string();
        tokio::spawn(async move {
            execute_with_retry(
                || {
                    protocol.get_data(
                        voting_round,
                        &endpoint_name,
                        submit_address,
                        timeout,
                        verifier,
                    )
                },
                retries,
                DATA_FETCH_RETRY_INTERVAL,
            )
            .await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(status: &str, data_len: usize, additional_len: usize) -> SubProtocolResponse {
        SubProtocolResponse {
            status: status.to_string(),
            data: Bytes::from(vec![0u8; data_len]),
            additional_data: Bytes::from(vec![0u8; additional_len]),
        }
    }

    #[test]
    fn identity_verifier_accepts_everything() {
        assert!(DataVerifier::Identity.verify(&response("ERR", 0, 0)).is_ok());
    }

    #[test]
    fn signature_verifier_enforces_preconditions() {
        let verifier = DataVerifier::Signature;
        assert!(verifier.verify(&response("OK", 38, 0)).is_ok());
        assert!(verifier
            .verify(&response("OK", 38, MAX_ADDITIONAL_DATA_LEN))
            .is_ok());

        assert!(matches!(
            verifier.verify(&response("ERR", 38, 0)),
            Err(SubmitterError::BadStatus(_))
        ));
        assert!(matches!(
            verifier.verify(&response("OK", 37, 0)),
            Err(SubmitterError::BadDataLength(37))
        ));
        assert!(matches!(
            verifier.verify(&response("OK", 38, MAX_ADDITIONAL_DATA_LEN + 1)),
            Err(SubmitterError::AdditionalDataTooLong(_))
        ));
    }

    #[test]
    fn request_url_shape() {
        let protocol = SubProtocol::new(100, "https://provider.example/api/").unwrap();
        let addr = Address::repeat_byte(0xab);
        let url = protocol.request_url("submit1", 12345, addr).unwrap();
        // trailing slash on the endpoint does not double up
        assert_eq!(
            url.as_str(),
            format!("https://provider.example/api/submit1/12345/{addr}")
        );
    }

    #[test]
    fn response_decodes_hex_fields() {
        let parsed: SubProtocolResponse =
            serde_json::from_str(r#"{"status":"OK","data":"0x0102","additionalData":"0xff"}"#)
                .unwrap();
        assert_eq!(parsed.status, "OK");
        assert_eq!(parsed.data, Bytes::from(vec![1, 2]));
        assert_eq!(parsed.additional_data, Bytes::from(vec![0xff]));

        // absent fields default to empty
        let bare: SubProtocolResponse = serde_json::from_str(r#"{"status":"ERR"}"#).unwrap();
        assert!(bare.data.is_empty());
    }
}
