//! Process-global Prometheus metrics.
//!
//! Components record through the global handle; the binary serves the
//! encoded registry on the configured metrics address.

#![cfg_attr(not(test), warn(unused_crate_dependencies))]

use std::sync::OnceLock;

use prometheus_client::encoding::text::encode;
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::registry::Registry;

static TELEMETRY: OnceLock<Telemetry> = OnceLock::new();

/// Labels for per-submitter counters.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct SubmitterLabels {
    /// Submitter name, e.g. `submit1` or `submitSignatures`.
    pub submitter: String,
}

/// Labels for per-event counters.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct EventLabels {
    /// Event name as emitted on chain.
    pub event: String,
}

/// All quill metrics plus their registry.
pub struct Telemetry {
    registry: Registry,
    txs_submitted: Family<SubmitterLabels, Counter>,
    tx_failures: Family<SubmitterLabels, Counter>,
    provider_fetch_failures: Family<SubmitterLabels, Counter>,
    events_observed: Family<EventLabels, Counter>,
    registrations: Counter,
    policies_signed: Counter,
}

impl Telemetry {
    fn new() -> Self {
        let mut registry = Registry::with_prefix("quill");

        let txs_submitted = Family::<SubmitterLabels, Counter>::default();
        registry.register(
            "txs_submitted",
            "Protocol transactions broadcast, by submitter",
            txs_submitted.clone(),
        );
        let tx_failures = Family::<SubmitterLabels, Counter>::default();
        registry.register(
            "tx_failures",
            "Protocol transaction submissions that exhausted their retries, by submitter",
            tx_failures.clone(),
        );
        let provider_fetch_failures = Family::<SubmitterLabels, Counter>::default();
        registry.register(
            "provider_fetch_failures",
            "Sub-protocol provider fetches that failed verification or transport, by submitter",
            provider_fetch_failures.clone(),
        );
        let events_observed = Family::<EventLabels, Counter>::default();
        registry.register(
            "events_observed",
            "Chain events delivered by the log tailers, by event",
            events_observed.clone(),
        );
        let registrations = Counter::default();
        registry.register(
            "registrations",
            "Successful voter registrations",
            registrations.clone(),
        );
        let policies_signed = Counter::default();
        registry.register(
            "policies_signed",
            "Successful signing-policy signatures",
            policies_signed.clone(),
        );

        Self {
            registry,
            txs_submitted,
            tx_failures,
            provider_fetch_failures,
            events_observed,
            registrations,
            policies_signed,
        }
    }

    /// The global handle.
    pub fn global() -> &'static Telemetry {
        TELEMETRY.get_or_init(Telemetry::new)
    }

    /// Record a broadcast protocol transaction.
    pub fn record_tx_submitted(&self, submitter: &str) {
        self.txs_submitted
            .get_or_create(&SubmitterLabels {
                submitter: submitter.to_string(),
            })
            .inc();
    }

    /// Record a submission that exhausted its retries.
    pub fn record_tx_failure(&self, submitter: &str) {
        self.tx_failures
            .get_or_create(&SubmitterLabels {
                submitter: submitter.to_string(),
            })
            .inc();
    }

    /// Record a failed provider fetch.
    pub fn record_fetch_failure(&self, submitter: &str) {
        self.provider_fetch_failures
            .get_or_create(&SubmitterLabels {
                submitter: submitter.to_string(),
            })
            .inc();
    }

    /// Record a tailer-delivered chain event.
    pub fn record_event_observed(&self, event: &str) {
        self.events_observed
            .get_or_create(&EventLabels {
                event: event.to_string(),
            })
            .inc();
    }

    /// Record a successful voter registration.
    pub fn record_registration(&self) {
        self.registrations.inc();
    }

    /// Record a successfully signed signing policy.
    pub fn record_policy_signed(&self) {
        self.policies_signed.inc();
    }

    /// Encode the registry in Prometheus text exposition format.
    pub fn encode_metrics(&self) -> String {
        let mut buffer = String::new();
        // encoding into a String cannot fail
        let _ = encode(&mut buffer, &self.registry);
        buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_show_up_in_exposition() {
        let telemetry = Telemetry::global();
        telemetry.record_tx_submitted("submit1");
        telemetry.record_event_observed("VotePowerBlockSelected");
        telemetry.record_registration();

        let text = telemetry.encode_metrics();
        assert!(text.contains("quill_txs_submitted_total"));
        assert!(text.contains("submitter=\"submit1\""));
        assert!(text.contains("quill_events_observed_total"));
        assert!(text.contains("quill_registrations_total"));
    }
}
