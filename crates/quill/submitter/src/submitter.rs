//! The plain and signature submitters.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::Address;
use async_trait::async_trait;
use k256::ecdsa::SigningKey;
use quill_config::{SubmitConfig, SubmitSignaturesConfig};
use quill_epoch::retry::{execute_with_retry, TX_RETRY_INTERVAL};
use quill_epoch::{Epoch, EpochTicker, ExecuteStatus};
use quill_telemetry::Telemetry;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::payload::write_signature_entry;
use crate::runner::EpochRunner;
use crate::sub_protocol::{DataVerifier, SubProtocol, SubProtocolResponse, STATUS_OK};
use crate::{
    ProtocolContext, SubmissionClient, SIGNATURE_SUBMITTER_DATA_TIMEOUT, SUBMITTER_DATA_TIMEOUT,
};

/// State shared by both submitter kinds. Each instance owns its ticker
/// and retry context; nothing here is shared across submitters.
struct SubmitterBase {
    chain: Arc<dyn SubmissionClient>,
    context: Arc<ProtocolContext>,
    epoch: Epoch,
    selector: [u8; 4],
    sub_protocols: Vec<Arc<SubProtocol>>,
    start_offset: Duration,
    submit_retries: u32,
    /// Key this submitter signs its transactions with.
    submit_key: SigningKey,
    /// Address providers see in fetch URLs.
    fetch_address: Address,
    name: String,
}

impl SubmitterBase {
    /// Send `payload` to the submission contract through the retry
    /// harness. Returns whether the broadcast went out.
    async fn submit(&self, payload: Vec<u8>) -> bool {
        let status = execute_with_retry(
            || {
                let payload = payload.clone();
                async move {
                    self.chain
                        .send_raw_tx(
                            &self.submit_key,
                            self.context.submit_contract_address,
                            payload,
                        )
                        .await
                        .map(|_| ())
                }
            },
            self.submit_retries,
            TX_RETRY_INTERVAL,
        )
        .await;

        match status {
            ExecuteStatus::Success(()) => {
                info!(target: "quill::submitter", submitter = %self.name, "submitted tx");
                Telemetry::global().record_tx_submitted(&self.name);
                true
            }
            ExecuteStatus::Failure(message) => {
                error!(target: "quill::submitter", submitter = %self.name, %message, "error sending submit tx");
                Telemetry::global().record_tx_failure(&self.name);
                false
            }
        }
    }

    fn log_epoch(&self, current_epoch: i64) {
        debug!(
            target: "quill::submitter",
            submitter = %self.name,
            current_epoch,
            epoch_start = ?self.epoch.start_time(current_epoch),
            epoch_end = ?self.epoch.end_time(current_epoch),
            "running epoch"
        );
    }
}

/// A plain submitter: one fan-out of provider fetches, one transaction
/// per tick.
pub struct Submitter {
    base: SubmitterBase,
    /// Offset added to the tick index to pick the fetched round.
    epoch_offset: i64,
}

impl Submitter {
    /// Build a plain submitter.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        chain: Arc<dyn SubmissionClient>,
        context: Arc<ProtocolContext>,
        epoch: Epoch,
        config: &SubmitConfig,
        selector: [u8; 4],
        sub_protocols: Vec<Arc<SubProtocol>>,
        epoch_offset: i64,
        name: &str,
    ) -> Self {
        Self {
            base: SubmitterBase {
                chain,
                submit_key: context.submit_key.clone(),
                fetch_address: context.submit_address,
                context,
                epoch,
                selector,
                sub_protocols,
                start_offset: config.start_offset,
                submit_retries: config.tx_submit_retries.max(1),
                name: name.to_string(),
            },
            epoch_offset,
        }
    }

    /// Assemble the tick payload: the selector, then the data of every
    /// successful fetch in sub-protocol order. Failed protocols are
    /// skipped, never aborting the batch.
    async fn payload_for(&self, current_epoch: i64) -> Vec<u8> {
        let fetches: Vec<JoinHandle<ExecuteStatus<SubProtocolResponse>>> = self
            .base
            .sub_protocols
            .iter()
            .map(|protocol| {
                protocol.spawn_fetch(
                    current_epoch + self.epoch_offset,
                    &self.base.name,
                    self.base.fetch_address,
                    1,
                    SUBMITTER_DATA_TIMEOUT,
                    DataVerifier::Identity,
                )
            })
            .collect();

        let mut buffer = self.base.selector.to_vec();
        for (index, fetch) in fetches.into_iter().enumerate() {
            let status = fetch
                .await
                .unwrap_or_else(|err| ExecuteStatus::Failure(err.to_string()));
            match status {
                ExecuteStatus::Success(response) if response.status == STATUS_OK => {
                    buffer.extend_from_slice(&response.data);
                }
                ExecuteStatus::Success(response) => {
                    error!(
                        target: "quill::submitter",
                        submitter = %self.base.name,
                        protocol = index,
                        status = %response.status,
                        "error getting data"
                    );
                    Telemetry::global().record_fetch_failure(&self.base.name);
                }
                ExecuteStatus::Failure(message) => {
                    error!(
                        target: "quill::submitter",
                        submitter = %self.base.name,
                        protocol = index,
                        %message,
                        "error getting data"
                    );
                    Telemetry::global().record_fetch_failure(&self.base.name);
                }
            }
        }
        buffer
    }
}

#[async_trait]
impl EpochRunner for Submitter {
    fn name(&self) -> &str {
        &self.base.name
    }

    fn epoch_ticker(&self) -> EpochTicker {
        EpochTicker::spawn(self.base.epoch, self.base.start_offset)
    }

    async fn run_epoch(&self, current_epoch: i64) {
        self.base.log_epoch(current_epoch);
        let payload = self.payload_for(current_epoch).await;
        self.base.submit(payload).await;
    }
}

/// The signature submitter: per tick it fetches attestation data for the
/// previous round from every provider and aggregates signed entries over
/// up to `max_rounds` rounds, carrying unincluded protocols over.
pub struct SignatureSubmitter {
    base: SubmitterBase,
    max_rounds: u32,
    data_fetch_retries: u32,
}

impl SignatureSubmitter {
    /// Build the signature submitter.
    pub fn new(
        chain: Arc<dyn SubmissionClient>,
        context: Arc<ProtocolContext>,
        epoch: Epoch,
        config: &SubmitSignaturesConfig,
        selector: [u8; 4],
        sub_protocols: Vec<Arc<SubProtocol>>,
    ) -> Self {
        Self {
            base: SubmitterBase {
                chain,
                submit_key: context.submit_signatures_key.clone(),
                fetch_address: context.submit_signatures_address,
                context,
                epoch,
                selector,
                sub_protocols,
                start_offset: config.start_offset,
                submit_retries: config.tx_submit_retries.max(1),
                name: "submitSignatures".to_string(),
            },
            max_rounds: config.max_rounds,
            data_fetch_retries: config.data_fetch_retries,
        }
    }

    async fn run_rounds(&self, current_epoch: i64) {
        let target_epoch = current_epoch - 1;
        let count = self.base.sub_protocols.len();
        let mut outstanding: BTreeSet<usize> = (0..count).collect();

        let mut round = 0u32;
        while round < self.max_rounds && !outstanding.is_empty() {
            round += 1;

            let mut fetches: Vec<Option<JoinHandle<ExecuteStatus<SubProtocolResponse>>>> =
                (0..count).map(|_| None).collect();
            for (index, protocol) in self.base.sub_protocols.iter().enumerate() {
                if !outstanding.contains(&index) {
                    continue;
                }
                fetches[index] = Some(protocol.spawn_fetch(
                    target_epoch,
                    &self.base.name,
                    self.base.fetch_address,
                    self.data_fetch_retries,
                    SIGNATURE_SUBMITTER_DATA_TIMEOUT,
                    DataVerifier::Signature,
                ));
            }

            // snapshot in case the submission fails below
            let outstanding_before = outstanding.clone();

            let mut buffer = self.base.selector.to_vec();
            for index in 0..count {
                if !outstanding_before.contains(&index) {
                    continue;
                }
                let Some(fetch) = fetches[index].take() else {
                    continue;
                };
                let status = fetch
                    .await
                    .unwrap_or_else(|err| ExecuteStatus::Failure(err.to_string()));
                let response = match status {
                    ExecuteStatus::Success(response) => response,
                    ExecuteStatus::Failure(message) => {
                        error!(
                            target: "quill::submitter",
                            submitter = %self.base.name,
                            protocol = index,
                            %message,
                            "error getting data"
                        );
                        Telemetry::global().record_fetch_failure(&self.base.name);
                        continue;
                    }
                };
                if let Err(err) = write_signature_entry(
                    &mut buffer,
                    &self.base.context.signer_key,
                    target_epoch,
                    &response,
                ) {
                    error!(
                        target: "quill::submitter",
                        submitter = %self.base.name,
                        protocol = index,
                        error = %err,
                        "error writing payload"
                    );
                    continue;
                }
                outstanding.remove(&index);
            }

            if outstanding.len() < outstanding_before.len() {
                if !self.base.submit(buffer).await {
                    // the chain never saw those entries, retry the set
                    outstanding = outstanding_before;
                }
            } else {
                info!(
                    target: "quill::submitter",
                    submitter = %self.base.name,
                    round,
                    "did not get any new data"
                );
            }
        }
    }
}

#[async_trait]
impl EpochRunner for SignatureSubmitter {
    fn name(&self) -> &str {
        &self.base.name
    }

    fn epoch_ticker(&self) -> EpochTicker {
        EpochTicker::spawn(self.base.epoch, self.base.start_offset)
    }

    async fn run_epoch(&self, current_epoch: i64) {
        self.base.log_epoch(current_epoch);
        self.run_rounds(current_epoch).await;
    }
}
