//! Wiring of the four submitters.

use std::sync::Arc;

use quill_chain::abi::selector;
use quill_config::ClientConfig;
use quill_epoch::Epoch;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::runner::{run, EpochRunner};
use crate::submitter::{SignatureSubmitter, Submitter};
use crate::sub_protocol::SubProtocol;
use crate::{ProtocolContext, SubmissionClient, SubmitterError};

/// Control surface of one spawned submitter.
pub struct SubmitterHandle {
    /// Submitter name.
    pub name: String,
    /// Send an epoch index after which the submitter exits.
    pub stop_at: UnboundedSender<i64>,
    /// Receives the last epoch the submitter actually ran.
    pub last_epoch: UnboundedReceiver<i64>,
    /// The submitter task.
    pub task: JoinHandle<()>,
}

/// The assembled voting-round submission pipeline: `submit1`, `submit2`,
/// `submit3` and the signature submitter over one shared provider list.
pub struct ProtocolClient {
    submitter1: Submitter,
    submitter2: Submitter,
    submitter3: Submitter,
    signature_submitter: SignatureSubmitter,
}

impl ProtocolClient {
    /// Build the pipeline from configuration. Selectors come from the
    /// fixed submission-contract method list.
    pub fn new(
        chain: Arc<dyn SubmissionClient>,
        context: Arc<ProtocolContext>,
        voting_epoch: Epoch,
        config: &ClientConfig,
    ) -> Result<Self, SubmitterError> {
        let sub_protocols = config
            .protocol
            .values()
            .map(|p| SubProtocol::new(p.id, &p.api_endpoint).map(Arc::new))
            .collect::<Result<Vec<_>, _>>()?;
        for protocol in &sub_protocols {
            debug!(target: "quill::submitter", id = protocol.id, "configured sub-protocol provider");
        }

        let submitter1 = Submitter::new(
            Arc::clone(&chain),
            Arc::clone(&context),
            voting_epoch,
            &config.submit1,
            selector("submit1()"),
            sub_protocols.clone(),
            0,
            "submit1",
        );
        let submitter2 = Submitter::new(
            Arc::clone(&chain),
            Arc::clone(&context),
            voting_epoch,
            &config.submit2,
            selector("submit2()"),
            sub_protocols.clone(),
            -1,
            "submit2",
        );
        let submitter3 = Submitter::new(
            Arc::clone(&chain),
            Arc::clone(&context),
            voting_epoch,
            &config.submit3,
            selector("submit3()"),
            sub_protocols.clone(),
            0,
            "submit3",
        );
        let signature_submitter = SignatureSubmitter::new(
            chain,
            context,
            voting_epoch,
            &config.submit_signatures,
            selector("submitSignatures()"),
            sub_protocols,
        );

        Ok(Self {
            submitter1,
            submitter2,
            submitter3,
            signature_submitter,
        })
    }

    /// Spawn all four submitter loops under `cancel`.
    pub fn spawn(self, cancel: &CancellationToken) -> Vec<SubmitterHandle> {
        vec![
            spawn_submitter(self.submitter1, cancel),
            spawn_submitter(self.submitter2, cancel),
            spawn_submitter(self.submitter3, cancel),
            spawn_submitter(self.signature_submitter, cancel),
        ]
    }
}

fn spawn_submitter<R: EpochRunner + 'static>(
    runner: R,
    cancel: &CancellationToken,
) -> SubmitterHandle {
    let (stop_tx, stop_rx) = unbounded_channel();
    let (last_tx, last_rx) = unbounded_channel();
    let name = runner.name().to_string();
    let task = tokio::spawn(run(runner, cancel.clone(), stop_rx, last_tx));
    SubmitterHandle {
        name,
        stop_at: stop_tx,
        last_epoch: last_rx,
        task,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{Address, B256};
    use async_trait::async_trait;
    use k256::ecdsa::SigningKey;
    use quill_chain::ChainError;
    use quill_config::ProtocolConfig;
    use std::time::Duration;

    struct NullChain;

    #[async_trait]
    impl SubmissionClient for NullChain {
        async fn send_raw_tx(
            &self,
            _key: &SigningKey,
            _to: Address,
            _payload: Vec<u8>,
        ) -> Result<B256, ChainError> {
            Ok(B256::ZERO)
        }
    }

    fn key(fill: u8) -> SigningKey {
        let mut bytes = [0u8; 32];
        bytes[31] = fill;
        SigningKey::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn spawns_four_submitters_and_cancels_them() {
        let mut config = ClientConfig::default();
        config.protocol.insert(
            "ftso".to_string(),
            ProtocolConfig {
                id: 100,
                api_endpoint: "http://127.0.0.1:19800".to_string(),
            },
        );

        let context = Arc::new(ProtocolContext::new(
            key(1),
            key(2),
            key(3),
            Address::repeat_byte(0xc0),
        ));
        let client = ProtocolClient::new(
            Arc::new(NullChain),
            context,
            Epoch::new(0, Duration::from_secs(90)),
            &config,
        )
        .unwrap();

        let cancel = CancellationToken::new();
        let handles = client.spawn(&cancel);
        assert_eq!(handles.len(), 4);
        let names: Vec<_> = handles.iter().map(|h| h.name.clone()).collect();
        assert_eq!(names, ["submit1", "submit2", "submit3", "submitSignatures"]);

        cancel.cancel();
        for handle in handles {
            handle.task.await.unwrap();
        }
    }

    #[test]
    fn bad_provider_endpoint_is_rejected() {
        let mut config = ClientConfig::default();
        config.protocol.insert(
            "bad".to_string(),
            ProtocolConfig {
                id: 1,
                api_endpoint: "not a url".to_string(),
            },
        );
        let context = Arc::new(ProtocolContext::new(
            key(1),
            key(2),
            key(3),
            Address::ZERO,
        ));
        // the constructor surfaces the endpoint error at startup
        let result = ProtocolClient::new(
            Arc::new(NullChain),
            context,
            Epoch::new(0, Duration::from_secs(90)),
            &config,
        );
        assert!(matches!(result, Err(SubmitterError::Endpoint(_))));
    }
}
