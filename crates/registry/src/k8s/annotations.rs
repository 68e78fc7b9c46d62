//! Extraction of embedded service descriptors from pod annotations.

use std::collections::BTreeMap;

use api_types::ServiceDescriptor;
use tracing::warn;

use crate::k8s::selector::SERVICE_ANNOTATION_PREFIX;

/// Find a service descriptor embedded in a pod's annotations.
///
/// Scans for keys carrying the reserved prefix and returns the first value
/// that decodes as a [`ServiceDescriptor`]. A qualifying annotation that
/// fails to decode is logged and skipped; it never aborts the scan. Returns
/// `None` when nothing qualifies and decodes.
///
/// Annotation maps are unordered as far as callers may assume; when several
/// annotations qualify, which one wins is unspecified.
pub(crate) fn extract_service(annotations: &BTreeMap<String, String>) -> Option<ServiceDescriptor> {
    for (key, value) in annotations {
        if !key.starts_with(SERVICE_ANNOTATION_PREFIX) {
            continue;
        }
        match serde_json::from_str::<ServiceDescriptor>(value) {
            Ok(service) => return Some(service),
            Err(error) => {
                warn!(annotation = %key, %error, "skipping service annotation that failed to decode");
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    fn descriptor_json(name: &str) -> String {
        format!(
            r#"{{"name": "{name}", "version": "1.0.0", "nodes": [{{"id": "{name}-1", "address": "10.0.0.7:8080"}}]}}"#
        )
    }

    #[test]
    fn returns_none_without_qualifying_annotations() {
        let mut annotations = BTreeMap::new();
        annotations.insert("prometheus.io/scrape".to_string(), "true".to_string());
        // valid descriptor JSON under a foreign key does not qualify
        annotations.insert("other.io/service-orders".to_string(), descriptor_json("orders"));

        assert_eq!(extract_service(&annotations), None);
        assert_eq!(extract_service(&BTreeMap::new()), None);
    }

    #[test]
    fn returns_the_embedded_descriptor() {
        let mut annotations = BTreeMap::new();
        annotations.insert(
            "podmesh.io/service-orders".to_string(),
            descriptor_json("orders"),
        );

        let service = extract_service(&annotations).unwrap();
        assert_eq!(service.name, "orders");
        assert_eq!(service.version, "1.0.0");
        assert_eq!(service.nodes.len(), 1);
        assert_eq!(service.nodes[0].address, "10.0.0.7:8080");
    }

    #[test]
    fn malformed_qualifying_annotation_does_not_abort_the_scan() {
        let mut annotations = BTreeMap::new();
        annotations.insert(
            "podmesh.io/service-broken".to_string(),
            "{not json".to_string(),
        );
        annotations.insert(
            "podmesh.io/service-orders".to_string(),
            descriptor_json("orders"),
        );

        let service = extract_service(&annotations).unwrap();
        assert_eq!(service.name, "orders");
    }

    #[test]
    fn some_valid_descriptor_wins_when_several_qualify() {
        let mut annotations = BTreeMap::new();
        annotations.insert(
            "podmesh.io/service-orders".to_string(),
            descriptor_json("orders"),
        );
        annotations.insert(
            "podmesh.io/service-payments".to_string(),
            descriptor_json("payments"),
        );

        // Iteration order is an implementation detail; any qualifying
        // descriptor is a valid outcome, but one must be returned.
        let service = extract_service(&annotations).unwrap();
        assert!(service.name == "orders" || service.name == "payments");
    }
}
