//! Label selectors scoping which pods a watch or lookup observes.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;

/// Annotation key prefix under which service descriptors are embedded.
pub const SERVICE_ANNOTATION_PREFIX: &str = "podmesh.io/service-";

/// Label key prefix for per-service selectors.
pub const SERVICE_SELECTOR_PREFIX: &str = "podmesh.io/selector-";

/// Label key marking a pod as registry-managed.
pub const REGISTRY_LABEL: &str = "podmesh.io/registry";

/// Value assigned to every registry-owned label.
pub const SELECTOR_VALUE: &str = "service";

/// Pod phase in which a service instance counts as live.
pub(crate) const POD_RUNNING: &str = "Running";

/// Process-wide default selector matching every registry-managed pod.
static DEFAULT_SELECTOR: Lazy<BTreeMap<String, String>> =
    Lazy::new(|| BTreeMap::from([(REGISTRY_LABEL.to_string(), SELECTOR_VALUE.to_string())]));

/// Compute the label selector for a watch or lookup.
///
/// An absent or empty service name selects the process-wide default; a
/// service name narrows to pods carrying that service's selector label. The
/// two forms never combine.
pub(crate) fn for_service(service: Option<&str>) -> BTreeMap<String, String> {
    match service {
        Some(name) if !name.is_empty() => BTreeMap::from([(
            format!("{SERVICE_SELECTOR_PREFIX}{}", label_safe(name)),
            SELECTOR_VALUE.to_string(),
        )]),
        _ => DEFAULT_SELECTOR.clone(),
    }
}

/// Map a service name onto a string valid inside a label key.
///
/// Deterministic: the same name always yields the same fragment. Characters
/// outside `[A-Za-z0-9._-]` become `-`.
pub(crate) fn label_safe(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '-'
            }
        })
        .collect()
}

/// Render a selector mapping in the `key=value,key=value` form the API
/// server expects in `labelSelector` query parameters.
pub(crate) fn to_query(selector: &BTreeMap<String, String>) -> String {
    selector
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_or_empty_service_selects_default() {
        let default = BTreeMap::from([(REGISTRY_LABEL.to_string(), SELECTOR_VALUE.to_string())]);
        assert_eq!(for_service(None), default);
        assert_eq!(for_service(Some("")), default);
    }

    #[test]
    fn service_selector_is_deterministic() {
        let first = for_service(Some("orders"));
        let second = for_service(Some("orders"));
        assert_eq!(first, second);
        assert_eq!(
            first.get("podmesh.io/selector-orders").map(String::as_str),
            Some(SELECTOR_VALUE)
        );
    }

    #[test]
    fn service_selector_does_not_union_with_default() {
        let selector = for_service(Some("orders"));
        assert_eq!(selector.len(), 1);
        assert!(!selector.contains_key(REGISTRY_LABEL));
    }

    #[test]
    fn label_safe_replaces_invalid_characters() {
        assert_eq!(label_safe("orders"), "orders");
        assert_eq!(label_safe("com.example/orders v2"), "com.example-orders-v2");
        assert_eq!(label_safe("a_b-c.d"), "a_b-c.d");
    }

    #[test]
    fn to_query_joins_pairs() {
        let selector = BTreeMap::from([
            ("a".to_string(), "1".to_string()),
            ("b".to_string(), "2".to_string()),
        ]);
        assert_eq!(to_query(&selector), "a=1,b=2");
    }
}
