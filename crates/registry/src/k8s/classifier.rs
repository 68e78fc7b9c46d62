//! Translation of raw pod watch events into registry change events.

use api_types::RegistryAction;
use api_types::RegistryEvent;
use error_stack::Report;
use error_stack::ResultExt;
use k8s_openapi::api::core::v1::Pod;
use tracing::debug;

use crate::k8s::annotations;
use crate::k8s::selector::POD_RUNNING;
use crate::k8s::types::RawEventKind;
use crate::k8s::types::RawWatchEvent;
use crate::k8s::types::RegistryError;

/// Classify one raw watch event into at most one registry event.
///
/// Added and Modified events announce a live service instance only while the
/// pod reports phase Running; any other phase produces nothing. Deleted
/// always yields a delete, whatever phase the final manifest carries.
/// Classification never consults prior state: every event is self-describing
/// through the pod's current phase and annotations.
///
/// # Errors
///
/// - [`RegistryError::InvalidPodPayload`] if the payload does not decode as a pod
/// - [`RegistryError::UnexpectedEventKind`] for error or unrecognized kinds
///
/// Both are fatal to the enclosing session.
pub(crate) fn classify(
    event: RawWatchEvent,
) -> Result<Option<RegistryEvent>, Report<RegistryError>> {
    let RawWatchEvent { kind, object } = event;

    let pod: Pod =
        serde_json::from_value(object).change_context(RegistryError::InvalidPodPayload)?;
    let phase = pod.status.as_ref().and_then(|status| status.phase.as_deref());

    debug!(
        %kind,
        pod = pod.metadata.name.as_deref().unwrap_or("unknown"),
        phase = phase.unwrap_or(""),
        "pod watch event"
    );

    let action = match kind {
        RawEventKind::Added | RawEventKind::Modified if phase == Some(POD_RUNNING) => {
            RegistryAction::Create
        }
        RawEventKind::Added | RawEventKind::Modified => return Ok(None),
        RawEventKind::Deleted => RegistryAction::Delete,
        RawEventKind::Error | RawEventKind::Unknown => {
            return Err(Report::new(RegistryError::UnexpectedEventKind { kind }));
        }
    };

    let annotations = pod.metadata.annotations.unwrap_or_default();
    Ok(annotations::extract_service(&annotations).map(|service| RegistryEvent { action, service }))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn pod_event(kind: RawEventKind, phase: &str, annotations: serde_json::Value) -> RawWatchEvent {
        RawWatchEvent {
            kind,
            object: json!({
                "metadata": {
                    "name": "orders-7",
                    "annotations": annotations,
                },
                "status": {"phase": phase},
            }),
        }
    }

    fn orders_annotations() -> serde_json::Value {
        json!({
            "podmesh.io/service-orders":
                r#"{"name": "orders", "version": "1.0.0", "nodes": [{"id": "orders-7", "address": "10.0.0.7:8080"}]}"#,
        })
    }

    #[test]
    fn added_running_pod_yields_create() {
        let event = pod_event(RawEventKind::Added, "Running", orders_annotations());
        let result = classify(event).unwrap().unwrap();
        assert_eq!(result.action, RegistryAction::Create);
        assert_eq!(result.service.name, "orders");
    }

    #[test]
    fn modified_running_pod_yields_create() {
        let event = pod_event(RawEventKind::Modified, "Running", orders_annotations());
        let result = classify(event).unwrap().unwrap();
        assert_eq!(result.action, RegistryAction::Create);
    }

    #[test]
    fn modified_pending_pod_is_dropped() {
        let event = pod_event(RawEventKind::Modified, "Pending", orders_annotations());
        assert_eq!(classify(event).unwrap(), None);
    }

    #[test]
    fn deleted_pod_yields_delete_regardless_of_phase() {
        for phase in ["Running", "Succeeded", "Failed"] {
            let event = pod_event(RawEventKind::Deleted, phase, orders_annotations());
            let result = classify(event).unwrap().unwrap();
            assert_eq!(result.action, RegistryAction::Delete);
            assert_eq!(result.service.name, "orders");
        }
    }

    #[test]
    fn running_pod_without_service_annotation_is_dropped() {
        let event = pod_event(
            RawEventKind::Added,
            "Running",
            json!({"prometheus.io/scrape": "true"}),
        );
        assert_eq!(classify(event).unwrap(), None);
    }

    #[test]
    fn undecodable_payload_is_fatal() {
        let event = RawWatchEvent {
            kind: RawEventKind::Added,
            object: json!("not a pod"),
        };
        let report = classify(event).unwrap_err();
        assert!(matches!(
            report.current_context(),
            RegistryError::InvalidPodPayload
        ));
    }

    #[test]
    fn error_and_unknown_kinds_are_fatal() {
        for kind in [RawEventKind::Error, RawEventKind::Unknown] {
            let event = pod_event(kind, "Running", orders_annotations());
            let report = classify(event).unwrap_err();
            assert!(matches!(
                report.current_context(),
                RegistryError::UnexpectedEventKind { .. }
            ));
        }
    }
}
