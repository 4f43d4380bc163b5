//! The epoch-driven submitter loop.
//!
//! Each submitter runs this loop on its own task: wait for a tick, run
//! the epoch, repeat. A `stop_at` channel bounds the run to an epoch
//! index; the loop publishes the last epoch it actually ran on exit. A
//! submitter that has entered an epoch completes it before exiting.

use async_trait::async_trait;
use quill_epoch::EpochTicker;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio_util::sync::CancellationToken;
use tracing::info;

/// An epoch-driven worker: a ticker and a per-epoch body.
#[async_trait]
pub trait EpochRunner: Send + Sync {
    /// Submitter name for logs.
    fn name(&self) -> &str;

    /// A fresh ticker at this submitter's offset.
    fn epoch_ticker(&self) -> EpochTicker;

    /// Process one epoch tick.
    async fn run_epoch(&self, current_epoch: i64);
}

/// Drive `runner` until cancellation or its stop epoch.
pub async fn run<R: EpochRunner>(
    runner: R,
    cancel: CancellationToken,
    mut stop_at: UnboundedReceiver<i64>,
    last_epoch: UnboundedSender<i64>,
) {
    let mut ticker = runner.epoch_ticker();
    let mut epoch = 0i64;
    let mut stop_after = i64::MAX;
    let mut stop_open = true;

    loop {
        if epoch >= stop_after {
            let _ = last_epoch.send(epoch);
            break;
        }
        tokio::select! {
            _ = cancel.cancelled() => break,
            stop = stop_at.recv(), if stop_open => {
                match stop {
                    Some(stop) => {
                        stop_after = stop;
                        let _ = last_epoch.send(epoch);
                        info!(
                            target: "quill::submitter",
                            submitter = runner.name(),
                            stop_after,
                            "stopping submitter after epoch"
                        );
                    }
                    None => stop_open = false,
                }
            }
            tick = ticker.tick() => {
                let Some(tick) = tick else { break };
                epoch = tick;
                runner.run_epoch(epoch).await;
            }
        }
    }
    info!(target: "quill::submitter", submitter = runner.name(), "submitter stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::sync::mpsc::unbounded_channel;
    use tokio::sync::watch;

    struct FakeRunner {
        ticker: Mutex<Option<EpochTicker>>,
        ran: UnboundedSender<i64>,
    }

    #[async_trait]
    impl EpochRunner for FakeRunner {
        fn name(&self) -> &str {
            "fake"
        }

        fn epoch_ticker(&self) -> EpochTicker {
            self.ticker.lock().unwrap().take().expect("single run")
        }

        async fn run_epoch(&self, current_epoch: i64) {
            self.ran.send(current_epoch).unwrap();
        }
    }

    struct Loop {
        ticks: watch::Sender<i64>,
        ran: UnboundedReceiver<i64>,
        stop_tx: UnboundedSender<i64>,
        last_rx: UnboundedReceiver<i64>,
        cancel: CancellationToken,
        handle: tokio::task::JoinHandle<()>,
    }

    fn start() -> Loop {
        let (ticks, ticker) = EpochTicker::manual();
        let (ran_tx, ran) = unbounded_channel();
        let (stop_tx, stop_rx) = unbounded_channel();
        let (last_tx, last_rx) = unbounded_channel();
        let cancel = CancellationToken::new();

        let runner = FakeRunner {
            ticker: Mutex::new(Some(ticker)),
            ran: ran_tx,
        };
        let handle = tokio::spawn(run(runner, cancel.clone(), stop_rx, last_tx));
        Loop {
            ticks,
            ran,
            stop_tx,
            last_rx,
            cancel,
            handle,
        }
    }

    async fn recv(rx: &mut UnboundedReceiver<i64>) -> i64 {
        tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("value expected")
            .expect("channel open")
    }

    #[tokio::test]
    async fn runs_each_tick_in_order() {
        let mut l = start();
        l.ticks.send(5).unwrap();
        assert_eq!(recv(&mut l.ran).await, 5);
        l.ticks.send(6).unwrap();
        assert_eq!(recv(&mut l.ran).await, 6);
        l.cancel.cancel();
        l.handle.await.unwrap();
    }

    #[tokio::test]
    async fn stop_at_bounds_the_run_and_publishes_last_epoch() {
        let mut l = start();
        l.ticks.send(5).unwrap();
        assert_eq!(recv(&mut l.ran).await, 5);

        l.stop_tx.send(6).unwrap();
        // the stop signal publishes the epoch the submitter is at
        assert_eq!(recv(&mut l.last_rx).await, 5);

        // the stop epoch itself still runs to completion
        l.ticks.send(6).unwrap();
        assert_eq!(recv(&mut l.ran).await, 6);
        assert_eq!(recv(&mut l.last_rx).await, 6);

        l.handle.await.unwrap();
        // no further epochs ran
        assert!(l.ran.try_recv().is_err());
    }

    #[tokio::test]
    async fn cancellation_exits_at_the_ticker_read() {
        let l = start();
        l.cancel.cancel();
        l.handle.await.unwrap();
    }
}
