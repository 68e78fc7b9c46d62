use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

/// Kind discriminator of a raw pod watch event, as sent by the API server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RawEventKind {
    Added,
    Modified,
    Deleted,
    Error,
    /// Catch-all for kind strings this client does not recognize.
    #[serde(other)]
    Unknown,
}

impl std::fmt::Display for RawEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

/// An unprocessed change notification from the pod watch API.
///
/// `object` carries the raw serialized resource. For `Added`, `Modified` and
/// `Deleted` events that is a pod manifest; `Error` events carry the server's
/// status payload instead. The event only lives for one classification pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawWatchEvent {
    /// What happened to the resource
    #[serde(rename = "type")]
    pub kind: RawEventKind,
    /// The affected resource, still serialized
    pub object: serde_json::Value,
}

/// Errors that can occur during registry operations.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("failed to connect to Kubernetes API: {message}")]
    ConnectionFailed { message: String },
    #[error("failed to watch pods: {message}")]
    WatchFailed { message: String },
    #[error("watch event payload is not a valid pod manifest")]
    InvalidPodPayload,
    #[error("unexpected watch event kind {kind}")]
    UnexpectedEventKind { kind: RawEventKind },
    #[error("watch stream closed")]
    StreamClosed,
    #[error("Kubernetes API request failed: {message}")]
    ApiRequestFailed { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_event_kind_decodes_wire_names() {
        let kind: RawEventKind = serde_json::from_str("\"ADDED\"").unwrap();
        assert_eq!(kind, RawEventKind::Added);
        let kind: RawEventKind = serde_json::from_str("\"DELETED\"").unwrap();
        assert_eq!(kind, RawEventKind::Deleted);
    }

    #[test]
    fn unrecognized_kind_decodes_as_unknown() {
        let kind: RawEventKind = serde_json::from_str("\"BOOKMARK\"").unwrap();
        assert_eq!(kind, RawEventKind::Unknown);
    }

    #[test]
    fn raw_event_decodes_type_and_object() {
        let event: RawWatchEvent = serde_json::from_str(
            r#"{"type": "MODIFIED", "object": {"metadata": {"name": "orders-7"}}}"#,
        )
        .unwrap();
        assert_eq!(event.kind, RawEventKind::Modified);
        assert_eq!(event.object["metadata"]["name"], "orders-7");
    }
}
