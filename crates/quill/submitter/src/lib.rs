//! Per-voting-round protocol submission.
//!
//! Three staggered plain submitters (`submit1`, `submit2`, `submit3`) and
//! one multi-round signature submitter run concurrently, each driven by
//! its own epoch ticker. They share nothing mutable; every outbound
//! transaction goes through the retry harness.

#![cfg_attr(not(test), warn(unused_crate_dependencies))]

pub mod client;
pub mod context;
pub mod payload;
pub mod runner;
pub mod sub_protocol;
pub mod submitter;

pub use client::{ProtocolClient, SubmitterHandle};
pub use context::ProtocolContext;
pub use runner::{run, EpochRunner};
pub use sub_protocol::{DataVerifier, SubProtocol, SubProtocolResponse};
pub use submitter::{SignatureSubmitter, Submitter};

use std::time::Duration;

use alloy_primitives::{Address, B256};
use async_trait::async_trait;
use k256::ecdsa::SigningKey;
use quill_chain::{ChainClient, ChainError};
use thiserror::Error;

/// Provider fetch timeout for the plain submitters.
pub const SUBMITTER_DATA_TIMEOUT: Duration = Duration::from_secs(5);

/// Provider fetch timeout for the signature submitter.
pub const SIGNATURE_SUBMITTER_DATA_TIMEOUT: Duration = Duration::from_secs(1);

/// Delay between provider fetch attempts.
pub const DATA_FETCH_RETRY_INTERVAL: Duration = Duration::from_secs(1);

/// Submission pipeline failures.
#[derive(Debug, Error)]
pub enum SubmitterError {
    /// The provider answered with a status other than `OK`.
    #[error("provider returned status {0:?}")]
    BadStatus(String),

    /// Signature payload data must be exactly 38 bytes.
    #[error("provider data must be 38 bytes, got {0}")]
    BadDataLength(usize),

    /// Additional data must leave room for the fixed entry header.
    #[error("additional data too long: {0} bytes")]
    AdditionalDataTooLong(usize),

    /// Transport or HTTP-status failure talking to the provider.
    #[error("provider request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The provider endpoint is not a valid URL.
    #[error("invalid provider endpoint: {0}")]
    Endpoint(#[from] url::ParseError),

    /// Chain-side failure.
    #[error(transparent)]
    Chain(#[from] ChainError),
}

/// The one chain operation submitters need; lets harnesses script
/// submission outcomes.
#[async_trait]
pub trait SubmissionClient: Send + Sync {
    /// Sign and broadcast `payload` to the submission contract.
    async fn send_raw_tx(
        &self,
        key: &SigningKey,
        to: Address,
        payload: Vec<u8>,
    ) -> Result<B256, ChainError>;
}

#[async_trait]
impl SubmissionClient for ChainClient {
    async fn send_raw_tx(
        &self,
        key: &SigningKey,
        to: Address,
        payload: Vec<u8>,
    ) -> Result<B256, ChainError> {
        ChainClient::send_raw_tx(self, key, to, payload).await
    }
}
