//! Event-log tailer.
//!
//! Polls the log store for `(contract, topic0)` over a rolling window and
//! delivers the last event of each non-empty poll downstream. Intermediate
//! events within one poll are deliberately dropped: only the terminal
//! state matters to the consumers (latest vote-power block, latest signing
//! policy).

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use alloy_primitives::{Address, B256};
use tokio::sync::mpsc;
use tracing::error;

use crate::events::{LogStore, Timestamped};
use crate::{ChainError, EventLog};

/// Log-store polling cadence.
pub const LISTENER_INTERVAL: Duration = Duration::from_secs(2);

/// Spawn a tailer for `(address, topic0)` starting just after `from_unix`.
/// Each non-empty poll parses the last log only and advances the cursor to
/// that event's carried timestamp. Fetch and parse errors are logged and
/// the cursor stays put, so the next poll retries the same window.
pub fn spawn_event_listener<T, P>(
    store: Arc<dyn LogStore>,
    address: Address,
    topic0: B256,
    from_unix: i64,
    parse: P,
) -> mpsc::UnboundedReceiver<T>
where
    T: Timestamped + Send + 'static,
    P: Fn(&EventLog) -> Result<T, ChainError> + Send + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        let mut cursor = from_unix;
        loop {
            tokio::time::sleep(LISTENER_INTERVAL).await;
            let now = unix_now();
            let logs = match store
                .fetch_logs_by_address_and_topic0(address, topic0, cursor, now)
                .await
            {
                Ok(logs) => logs,
                Err(err) => {
                    error!(target: "quill::tailer", %address, error = %err, "error fetching logs");
                    continue;
                }
            };
            let Some(last) = logs.last() else { continue };
            match parse(last) {
                Ok(event) => {
                    let event_ts = event.event_timestamp() as i64;
                    if tx.send(event).is_err() {
                        // consumer gone, stop polling
                        break;
                    }
                    cursor = event_ts;
                }
                Err(err) => {
                    error!(target: "quill::tailer", %address, error = %err, "error parsing event");
                }
            }
        }
    });
    rx
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::Bytes;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct Seen {
        marker: u8,
        timestamp: u64,
    }

    impl Timestamped for Seen {
        fn event_timestamp(&self) -> u64 {
            self.timestamp
        }
    }

    /// Scripted store: each poll pops the next batch and records the
    /// window it was asked for.
    struct ScriptedStore {
        batches: Mutex<Vec<Vec<EventLog>>>,
        windows: Mutex<Vec<(i64, i64)>>,
    }

    #[async_trait]
    impl LogStore for ScriptedStore {
        async fn fetch_logs_by_address_and_topic0(
            &self,
            _address: Address,
            _topic0: B256,
            from_unix: i64,
            to_unix: i64,
        ) -> Result<Vec<EventLog>, ChainError> {
            self.windows.lock().unwrap().push((from_unix, to_unix));
            let mut batches = self.batches.lock().unwrap();
            if batches.is_empty() {
                Ok(Vec::new())
            } else {
                Ok(batches.remove(0))
            }
        }
    }

    fn log(marker: u8, timestamp: u64) -> EventLog {
        EventLog {
            address: Address::ZERO,
            topics: vec![B256::ZERO],
            data: Bytes::from(vec![marker]),
            block_number: 1,
            timestamp,
        }
    }

    fn parse_marker(log: &EventLog) -> Result<Seen, ChainError> {
        if log.data.is_empty() {
            return Err(ChainError::Abi("empty".to_string()));
        }
        Ok(Seen {
            marker: log.data[0],
            timestamp: log.timestamp,
        })
    }

    #[tokio::test(start_paused = true)]
    async fn delivers_last_log_and_advances_cursor() {
        let store = Arc::new(ScriptedStore {
            batches: Mutex::new(vec![
                vec![log(1, 100), log(2, 110), log(3, 120)],
                vec![log(4, 130)],
            ]),
            windows: Mutex::new(Vec::new()),
        });

        let mut rx = spawn_event_listener(
            Arc::clone(&store) as Arc<dyn LogStore>,
            Address::ZERO,
            B256::ZERO,
            50,
            parse_marker,
        );

        // only the last log of the first poll is delivered
        let first = rx.recv().await.unwrap();
        assert_eq!(first.marker, 3);
        let second = rx.recv().await.unwrap();
        assert_eq!(second.marker, 4);

        let windows = store.windows.lock().unwrap();
        assert_eq!(windows[0].0, 50);
        // the second poll starts at the delivered event's timestamp
        assert_eq!(windows[1].0, 120);
    }

    #[tokio::test(start_paused = true)]
    async fn parse_error_does_not_advance_cursor() {
        let bad = EventLog {
            address: Address::ZERO,
            topics: vec![B256::ZERO],
            data: Bytes::new(),
            block_number: 1,
            timestamp: 200,
        };
        let store = Arc::new(ScriptedStore {
            batches: Mutex::new(vec![vec![bad], vec![log(9, 300)]]),
            windows: Mutex::new(Vec::new()),
        });

        let mut rx = spawn_event_listener(
            Arc::clone(&store) as Arc<dyn LogStore>,
            Address::ZERO,
            B256::ZERO,
            50,
            parse_marker,
        );

        let only = rx.recv().await.unwrap();
        assert_eq!(only.marker, 9);

        let windows = store.windows.lock().unwrap();
        // the malformed poll left the cursor at its starting point
        assert_eq!(windows[0].0, 50);
        assert_eq!(windows[1].0, 50);
    }
}
