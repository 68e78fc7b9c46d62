//! Pod watch subscriptions over the Kubernetes watch API.

use std::collections::BTreeMap;

use error_stack::Report;
use error_stack::ResultExt;
use futures::TryStreamExt;
use kube::api::WatchEvent;
use kube::api::WatchParams;
use kube::core::Request;
use kube::Client;
use tokio::select;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::warn;

use crate::k8s::selector;
use crate::k8s::types::RawEventKind;
use crate::k8s::types::RawWatchEvent;
use crate::k8s::types::RegistryError;

/// Raw events buffered between the API-server stream and the session loop.
const EVENT_BUFFER: usize = 32;

/// One open pod watch: a pull end for raw events plus a stop control.
///
/// `next_event` returns `None` once the watch has ended, either because the
/// server closed it or because [`stop`](Self::stop) was called.
pub struct WatchSubscription {
    events: mpsc::Receiver<RawWatchEvent>,
    cancel: CancellationToken,
}

impl WatchSubscription {
    /// Assemble a subscription from a raw event channel and its stop token.
    pub fn new(events: mpsc::Receiver<RawWatchEvent>, cancel: CancellationToken) -> Self {
        Self { events, cancel }
    }

    /// Receive the next raw event; `None` when the watch has ended.
    pub async fn next_event(&mut self) -> Option<RawWatchEvent> {
        self.events.recv().await
    }

    /// Release the upstream watch. Idempotent.
    pub fn stop(&self) {
        self.cancel.cancel();
    }
}

/// Open a pod watch scoped by `selector` and bridge it onto a
/// [`WatchSubscription`].
///
/// A driver task owns the HTTP watch stream and forwards its events until
/// the server ends the watch, the subscription is stopped, or the receiving
/// side goes away.
///
/// # Errors
///
/// - [`RegistryError::WatchFailed`] if the watch request cannot be opened
pub(crate) async fn watch_pods(
    client: &Client,
    namespace: Option<&str>,
    selector: &BTreeMap<String, String>,
) -> Result<WatchSubscription, Report<RegistryError>> {
    let path = match namespace {
        Some(namespace) => format!("/api/v1/namespaces/{namespace}/pods"),
        None => "/api/v1/pods".to_string(),
    };
    let params = WatchParams::default().labels(&selector::to_query(selector));
    let request =
        Request::new(path)
            .watch(&params, "0")
            .change_context(RegistryError::WatchFailed {
                message: "invalid watch request".to_string(),
            })?;

    let stream = client
        .request_events::<serde_json::Value>(request)
        .await
        .change_context(RegistryError::WatchFailed {
            message: "failed to open pod watch".to_string(),
        })?;

    let (events_tx, events_rx) = mpsc::channel(EVENT_BUFFER);
    let cancel = CancellationToken::new();
    let driver_cancel = cancel.clone();

    tokio::spawn(async move {
        let mut stream = Box::pin(stream);
        loop {
            let event = select! {
                _ = driver_cancel.cancelled() => break,
                event = stream.try_next() => event,
            };
            let raw = match event {
                Ok(Some(event)) => to_raw_event(event),
                Ok(None) => break,
                Err(error) => {
                    warn!(%error, "pod watch stream failed");
                    break;
                }
            };
            let Some(raw) = raw else { continue };
            if events_tx.send(raw).await.is_err() {
                break;
            }
        }
        debug!("pod watch driver exited");
    });

    Ok(WatchSubscription::new(events_rx, cancel))
}

/// Convert a typed watch event into the wire-shaped raw event.
///
/// Bookmarks carry no resource and are dropped here.
fn to_raw_event(event: WatchEvent<serde_json::Value>) -> Option<RawWatchEvent> {
    let raw = match event {
        WatchEvent::Added(object) => RawWatchEvent {
            kind: RawEventKind::Added,
            object,
        },
        WatchEvent::Modified(object) => RawWatchEvent {
            kind: RawEventKind::Modified,
            object,
        },
        WatchEvent::Deleted(object) => RawWatchEvent {
            kind: RawEventKind::Deleted,
            object,
        },
        WatchEvent::Error(status) => RawWatchEvent {
            kind: RawEventKind::Error,
            object: serde_json::to_value(&status).unwrap_or_default(),
        },
        WatchEvent::Bookmark(_) => return None,
    };
    Some(raw)
}

#[cfg(test)]
mod tests {
    use kube::core::ErrorResponse;
    use serde_json::json;

    use super::*;

    #[test]
    fn typed_events_map_onto_raw_kinds() {
        let object = json!({"metadata": {"name": "orders-7"}});

        let raw = to_raw_event(WatchEvent::Added(object.clone())).unwrap();
        assert_eq!(raw.kind, RawEventKind::Added);
        assert_eq!(raw.object, object);

        let raw = to_raw_event(WatchEvent::Deleted(object.clone())).unwrap();
        assert_eq!(raw.kind, RawEventKind::Deleted);
    }

    #[test]
    fn error_events_carry_the_status_payload() {
        let status = ErrorResponse {
            status: "Failure".to_string(),
            message: "too old resource version".to_string(),
            reason: "Expired".to_string(),
            code: 410,
        };
        let raw = to_raw_event(WatchEvent::Error(status)).unwrap();
        assert_eq!(raw.kind, RawEventKind::Error);
        assert_eq!(raw.object["code"], 410);
    }

    #[tokio::test]
    async fn subscription_ends_after_stop() {
        let (tx, rx) = mpsc::channel(4);
        let cancel = CancellationToken::new();
        let mut subscription = WatchSubscription::new(rx, cancel.clone());

        subscription.stop();
        subscription.stop();
        assert!(cancel.is_cancelled());

        drop(tx);
        assert!(subscription.next_event().await.is_none());
    }
}
