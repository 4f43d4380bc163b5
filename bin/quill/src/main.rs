//! Quill: a protocol client for a delegated-voting chain.
//!
//! Runs alongside a full node and participates, on behalf of a configured
//! identity, in the reward-epoch registration ritual and the per-voting-
//! round protocol submissions. Startup is fatal on configuration errors;
//! everything after that is logged and retried, never fatal.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use eyre::WrapErr;
use k256::ecdsa::SigningKey;
use quill_chain::tx::parse_private_key;
use quill_chain::{ChainClient, LogStore, MysqlLogStore};
use quill_config::{read_file_to_string, ClientConfig};
use quill_policy::PolicyStore;
use quill_registration::{
    reward_epoch_from_chain, voting_epoch_from_chain, RegistrationError, RegistrationPipeline,
    RegistryContract, RelayContract, SystemsManagerContract,
};
use quill_submitter::{ProtocolClient, ProtocolContext};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

mod logging;
mod metrics;

/// Log-database pool size; the tailers issue one query at a time each.
const DB_POOL_CONNECTIONS: u32 = 4;

#[derive(Debug, Parser)]
#[command(name = "quill", about = "Delegated-voting protocol client", version)]
struct Cli {
    /// Path to the configuration file.
    #[arg(long, default_value = quill_config::DEFAULT_CONFIG_FILE)]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    let cli = Cli::parse();
    let config = ClientConfig::load(&cli.config).wrap_err("loading configuration")?;
    logging::init(&config.logger)?;

    info!(target: "quill::cli", config = %cli.config.display(), "starting quill client");

    let cancel = CancellationToken::new();

    if !config.metrics.prometheus_address.is_empty() {
        metrics::serve(&config.metrics.prometheus_address, &cancel).await?;
    }

    let mut tasks: Vec<JoinHandle<()>> = Vec::new();

    if config.voting.enabled_registration || config.voting.enabled_protocol_voting {
        let chain = Arc::new(
            ChainClient::new(
                &config.chain.eth_rpc_url,
                config.chain.api_key(),
                config.chain.chain_id,
            )
            .wrap_err("building chain client")?,
        );

        // epoch parameters are read from the chain once; an unreachable
        // node is a fatal startup error
        let system_manager = config.contract_addresses.system_manager;
        let reward_epoch = reward_epoch_from_chain(&chain, system_manager)
            .await
            .wrap_err("reading reward epoch parameters")?;
        let voting_epoch = voting_epoch_from_chain(&chain, system_manager)
            .await
            .wrap_err("reading voting epoch parameters")?;
        info!(
            target: "quill::cli",
            reward_period = ?reward_epoch.period(),
            voting_period = ?voting_epoch.period(),
            "epoch parameters loaded"
        );

        let policies = Arc::new(PolicyStore::new());

        if config.voting.enabled_registration {
            let logs: Arc<dyn LogStore> = Arc::new(
                MysqlLogStore::connect(&config.db.url(), DB_POOL_CONNECTIONS)
                    .await
                    .wrap_err("connecting to log database")?,
            );
            let sender_key = load_key(&config.credentials.system_manager_sender_private_key_file)
                .wrap_err("reading sender private key")?;
            let signer_key = load_key(&config.credentials.signing_policy_private_key_file)
                .wrap_err("reading signer private key")?;

            let pipeline = RegistrationPipeline::new(
                logs,
                SystemsManagerContract::new(
                    Arc::clone(&chain),
                    system_manager,
                    sender_key.clone(),
                    signer_key,
                ),
                RelayContract::new(config.contract_addresses.relay),
                RegistryContract::new(
                    Arc::clone(&chain),
                    config.contract_addresses.voter_registry,
                    sender_key,
                ),
                Arc::clone(&policies),
                config.credentials.identity_address,
                reward_epoch,
            );

            let pipeline_cancel = cancel.clone();
            tasks.push(tokio::spawn(async move {
                match pipeline.run(pipeline_cancel).await {
                    Err(RegistrationError::Cancelled) => {
                        info!(target: "quill::registration", "registration pipeline cancelled")
                    }
                    Err(err) => {
                        error!(target: "quill::registration", error = %err, "registration pipeline exited")
                    }
                    Ok(()) => {}
                }
            }));
        }

        if config.voting.enabled_protocol_voting {
            let signer_key = load_key(&config.credentials.signing_policy_private_key_file)
                .wrap_err("reading signer private key")?;
            let submit_key = load_key(&config.credentials.protocol_manager_submit_private_key_file)
                .wrap_err("reading submit private key")?;
            let submit_signatures_key = load_key(
                &config
                    .credentials
                    .protocol_manager_submit_signatures_private_key_file,
            )
            .wrap_err("reading submit signatures private key")?;

            let context = Arc::new(ProtocolContext::new(
                submit_key,
                submit_signatures_key,
                signer_key,
                config.contract_addresses.submission,
            ));
            let client = ProtocolClient::new(chain, context, voting_epoch, &config)
                .wrap_err("building protocol client")?;
            for handle in client.spawn(&cancel) {
                tasks.push(handle.task);
            }
        }
    } else {
        info!(target: "quill::cli", "all pipelines disabled, idling until shutdown");
    }

    tokio::signal::ctrl_c()
        .await
        .wrap_err("listening for shutdown signal")?;
    info!(target: "quill::cli", "shutdown signal received");
    cancel.cancel();
    for task in tasks {
        let _ = task.await;
    }
    Ok(())
}

fn load_key(path: &str) -> eyre::Result<SigningKey> {
    let raw = read_file_to_string(Path::new(path))?;
    Ok(parse_private_key(&raw)?)
}
