//! The per-request watch session: classification loop, bounded delivery
//! queue, and stop control.

use api_types::RegistryEvent;
use error_stack::Report;
use tokio::select;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::error;

use crate::k8s::classifier;
use crate::k8s::types::RegistryError;
use crate::k8s::watch::WatchSubscription;

/// Capacity of the consumer-facing result queue.
///
/// Once full, the session task blocks on enqueue, which stops it draining
/// the upstream subscription: a slow consumer throttles the whole pipeline
/// without dropping events. The upstream source itself is unaffected.
pub(crate) const RESULT_QUEUE_CAPACITY: usize = 10;

/// A running watch over registry changes.
///
/// Owns one upstream pod watch and one background task translating raw
/// events into [`RegistryEvent`]s. The session ends when [`stop`](Self::stop)
/// is called, the upstream watch ends, or an event fails classification;
/// after that every [`next`](Self::next) call reports
/// [`RegistryError::StreamClosed`]. A stopped session cannot be restarted;
/// open a new one for continued monitoring.
pub struct WatchSession {
    results: mpsc::Receiver<RegistryEvent>,
    cancel: CancellationToken,
}

/// Cloneable stop control for a [`WatchSession`], detached from the receive
/// half so another task can shut the session down while a `next` call is in
/// flight.
#[derive(Clone)]
pub struct SessionHandle {
    cancel: CancellationToken,
}

impl SessionHandle {
    /// Request the session to stop. Idempotent.
    pub fn stop(&self) {
        self.cancel.cancel();
    }
}

impl WatchSession {
    /// Spawn the session task over an open subscription.
    pub fn start(mut subscription: WatchSubscription) -> Self {
        let (results_tx, results_rx) = mpsc::channel(RESULT_QUEUE_CAPACITY);
        let cancel = CancellationToken::new();
        let task_cancel = cancel.clone();

        tokio::spawn(async move {
            run_session(&mut subscription, results_tx, task_cancel).await;
            subscription.stop();
            debug!("watch session stopped");
        });

        Self {
            results: results_rx,
            cancel,
        }
    }

    /// Receive the next registry event.
    ///
    /// Blocks until an event is available. Events already queued when the
    /// session stops are still delivered; afterwards this fails with
    /// [`RegistryError::StreamClosed`] on every call instead of blocking
    /// forever.
    pub async fn next(&mut self) -> Result<RegistryEvent, Report<RegistryError>> {
        self.results
            .recv()
            .await
            .ok_or_else(|| Report::new(RegistryError::StreamClosed))
    }

    /// Stop the session. Idempotent; safe while a `next` call is in flight
    /// and while the session task is mid-enqueue.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// A stop control usable from another task.
    pub fn handle(&self) -> SessionHandle {
        SessionHandle {
            cancel: self.cancel.clone(),
        }
    }
}

impl Drop for WatchSession {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Classification loop.
///
/// The stop token is checked around both await points, so a stop request
/// unblocks the task whether it is waiting for the next raw event or for
/// queue capacity. The result queue is closed by dropping `results_tx` when
/// this returns; only this task ever holds the send half, so a send can
/// never race a close.
async fn run_session(
    subscription: &mut WatchSubscription,
    results_tx: mpsc::Sender<RegistryEvent>,
    cancel: CancellationToken,
) {
    loop {
        let raw = select! {
            _ = cancel.cancelled() => return,
            raw = subscription.next_event() => match raw {
                Some(raw) => raw,
                None => {
                    debug!("upstream pod watch ended");
                    return;
                }
            },
        };

        let result = match classifier::classify(raw) {
            Ok(Some(result)) => result,
            Ok(None) => continue,
            Err(report) => {
                error!("fatal watch event, stopping session: {report:?}");
                return;
            }
        };

        select! {
            _ = cancel.cancelled() => return,
            sent = results_tx.send(result) => {
                if sent.is_err() {
                    // Consumer dropped the session.
                    return;
                }
            }
        }
    }
}
