//! Consumer-facing registry backed by pod labels and annotations.
//!
//! Services advertise themselves by annotating their own pod with a
//! JSON-encoded [`ServiceDescriptor`] and carrying the registry's selector
//! labels; lookups list matching pods and decode those annotations back, and
//! watches translate pod events into a stream of registry change events.

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::env;
use std::path::PathBuf;

use api_types::ServiceDescriptor;
use error_stack::Report;
use error_stack::ResultExt;
use k8s_openapi::api::core::v1::Pod;
use kube::api::ListParams;
use kube::api::Patch;
use kube::api::PatchParams;
use kube::Api;
use kube::Client;
use serde_json::json;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::k8s::selector;
use crate::k8s::selector::POD_RUNNING;
use crate::k8s::selector::REGISTRY_LABEL;
use crate::k8s::selector::SELECTOR_VALUE;
use crate::k8s::selector::SERVICE_ANNOTATION_PREFIX;
use crate::k8s::selector::SERVICE_SELECTOR_PREFIX;
use crate::k8s::session::WatchSession;
use crate::k8s::watch;
use crate::k8s::RegistryError;
use crate::kube_client;

/// Connection options for [`KubeRegistry`].
#[derive(Debug, Clone, Default)]
pub struct RegistryOptions {
    /// Explicit kubeconfig path; default client chain when unset.
    pub kubeconfig: Option<PathBuf>,
    /// Namespace to operate in; all namespaces when unset.
    pub namespace: Option<String>,
    /// Name of the pod to annotate on register; `$HOSTNAME` when unset,
    /// which inside a cluster is the pod's own name.
    pub pod_name: Option<String>,
}

/// A service registry stored in the cluster itself.
pub struct KubeRegistry {
    client: Client,
    namespace: Option<String>,
    pod_name: Option<String>,
}

impl KubeRegistry {
    /// Connect to the cluster and build a registry handle.
    ///
    /// # Errors
    ///
    /// - [`RegistryError::ConnectionFailed`] if no client can be built
    pub async fn new(options: RegistryOptions) -> Result<Self, Report<RegistryError>> {
        let client = kube_client::init_kube_client(options.kubeconfig).await?;
        Ok(Self {
            client,
            namespace: options.namespace,
            pod_name: options.pod_name,
        })
    }

    /// Open a watch session over registry changes.
    ///
    /// `service` narrows the watch to one service; `None` watches every
    /// registry-managed pod. Failure to open the upstream watch fails the
    /// request itself; no session is created.
    ///
    /// # Errors
    ///
    /// - [`RegistryError::WatchFailed`] if the pod watch cannot be opened
    pub async fn watch(
        &self,
        service: Option<&str>,
    ) -> Result<WatchSession, Report<RegistryError>> {
        let selector = selector::for_service(service);
        debug!(?selector, "opening registry watch");
        let subscription =
            watch::watch_pods(&self.client, self.namespace.as_deref(), &selector).await?;
        Ok(WatchSession::start(subscription))
    }

    /// Advertise `service` by patching this pod's labels and annotations.
    ///
    /// # Errors
    ///
    /// - [`RegistryError::ApiRequestFailed`] if the pod cannot be patched
    pub async fn register(&self, service: &ServiceDescriptor) -> Result<(), Report<RegistryError>> {
        let pod_name = self.own_pod_name()?;
        let encoded =
            serde_json::to_string(service).change_context(RegistryError::ApiRequestFailed {
                message: format!("service {} does not serialize", service.name),
            })?;

        let name_label = selector::label_safe(&service.name);
        let labels = BTreeMap::from([
            (REGISTRY_LABEL.to_string(), SELECTOR_VALUE.to_string()),
            (
                format!("{SERVICE_SELECTOR_PREFIX}{name_label}"),
                SELECTOR_VALUE.to_string(),
            ),
        ]);
        let annotations = BTreeMap::from([(
            format!("{SERVICE_ANNOTATION_PREFIX}{name_label}"),
            encoded,
        )]);
        let patch = json!({"metadata": {"labels": labels, "annotations": annotations}});

        self.pod_api()
            .patch(&pod_name, &PatchParams::default(), &Patch::Strategic(patch))
            .await
            .map_err(|error| {
                Report::new(RegistryError::ApiRequestFailed {
                    message: format!("failed to register {} on pod {pod_name}: {error}", service.name),
                })
            })?;
        info!(service = %service.name, pod = %pod_name, "registered service");
        Ok(())
    }

    /// Withdraw `service` by clearing its annotation and selector label on
    /// this pod. The registry marker label stays; other services may still
    /// be registered on the same pod.
    ///
    /// # Errors
    ///
    /// - [`RegistryError::ApiRequestFailed`] if the pod cannot be patched
    pub async fn deregister(
        &self,
        service: &ServiceDescriptor,
    ) -> Result<(), Report<RegistryError>> {
        let pod_name = self.own_pod_name()?;
        let name_label = selector::label_safe(&service.name);
        let labels = BTreeMap::from([(
            format!("{SERVICE_SELECTOR_PREFIX}{name_label}"),
            serde_json::Value::Null,
        )]);
        let annotations = BTreeMap::from([(
            format!("{SERVICE_ANNOTATION_PREFIX}{name_label}"),
            serde_json::Value::Null,
        )]);
        let patch = json!({"metadata": {"labels": labels, "annotations": annotations}});

        self.pod_api()
            .patch(&pod_name, &PatchParams::default(), &Patch::Strategic(patch))
            .await
            .map_err(|error| {
                Report::new(RegistryError::ApiRequestFailed {
                    message: format!(
                        "failed to deregister {} on pod {pod_name}: {error}",
                        service.name
                    ),
                })
            })?;
        info!(service = %service.name, pod = %pod_name, "deregistered service");
        Ok(())
    }

    /// Look up a service by name.
    ///
    /// Lists Running pods carrying the service's selector label and merges
    /// their descriptors: one entry per version, nodes appended across pods.
    ///
    /// # Errors
    ///
    /// - [`RegistryError::ApiRequestFailed`] if the pod listing fails
    pub async fn get_service(
        &self,
        name: &str,
    ) -> Result<Vec<ServiceDescriptor>, Report<RegistryError>> {
        let pods = self.list_pods(selector::for_service(Some(name))).await?;
        let annotation_key = format!(
            "{SERVICE_ANNOTATION_PREFIX}{}",
            selector::label_safe(name)
        );
        Ok(merge_running_descriptors(pods, &annotation_key))
    }

    /// List every service currently registered.
    ///
    /// Collects all decodable service annotations from registry-managed
    /// pods, deduplicated by name and version.
    ///
    /// # Errors
    ///
    /// - [`RegistryError::ApiRequestFailed`] if the pod listing fails
    pub async fn list_services(&self) -> Result<Vec<ServiceDescriptor>, Report<RegistryError>> {
        let pods = self.list_pods(selector::for_service(None)).await?;
        Ok(collect_descriptors(pods))
    }

    async fn list_pods(
        &self,
        selector: BTreeMap<String, String>,
    ) -> Result<Vec<Pod>, Report<RegistryError>> {
        let params = ListParams::default().labels(&selector::to_query(&selector));
        let pods = self.lookup_api().list(&params).await.map_err(|error| {
            Report::new(RegistryError::ApiRequestFailed {
                message: format!("failed to list pods: {error}"),
            })
        })?;
        Ok(pods.items)
    }

    /// Api handle for lookups; spans all namespaces unless one was
    /// configured.
    fn lookup_api(&self) -> Api<Pod> {
        match &self.namespace {
            Some(namespace) => Api::namespaced(self.client.clone(), namespace),
            None => Api::all(self.client.clone()),
        }
    }

    /// Api handle for patching this pod; registration always happens in a
    /// concrete namespace.
    fn pod_api(&self) -> Api<Pod> {
        match &self.namespace {
            Some(namespace) => Api::namespaced(self.client.clone(), namespace),
            None => Api::default_namespaced(self.client.clone()),
        }
    }

    fn own_pod_name(&self) -> Result<String, Report<RegistryError>> {
        if let Some(name) = &self.pod_name {
            return Ok(name.clone());
        }
        env::var("HOSTNAME").change_context(RegistryError::ApiRequestFailed {
            message: "pod name not configured and HOSTNAME is unset".to_string(),
        })
    }
}

/// Merge one service's descriptors across its Running pods: one entry per
/// version, nodes appended in listing order.
fn merge_running_descriptors(pods: Vec<Pod>, annotation_key: &str) -> Vec<ServiceDescriptor> {
    let mut by_version: BTreeMap<String, ServiceDescriptor> = BTreeMap::new();
    for pod in pods {
        let phase = pod.status.as_ref().and_then(|status| status.phase.as_deref());
        if phase != Some(POD_RUNNING) {
            continue;
        }
        let Some(value) = pod
            .metadata
            .annotations
            .as_ref()
            .and_then(|annotations| annotations.get(annotation_key))
        else {
            continue;
        };
        let service: ServiceDescriptor = match serde_json::from_str(value) {
            Ok(service) => service,
            Err(error) => {
                warn!(
                    pod = pod.metadata.name.as_deref().unwrap_or("unknown"),
                    %error,
                    "skipping service annotation that failed to decode"
                );
                continue;
            }
        };
        match by_version.get_mut(&service.version) {
            Some(merged) => merged.nodes.extend(service.nodes),
            None => {
                by_version.insert(service.version.clone(), service);
            }
        }
    }
    by_version.into_values().collect()
}

/// Collect every decodable service annotation, deduplicated by name and
/// version.
fn collect_descriptors(pods: Vec<Pod>) -> Vec<ServiceDescriptor> {
    let mut seen = BTreeSet::new();
    let mut services = Vec::new();
    for pod in pods {
        for (key, value) in pod.metadata.annotations.unwrap_or_default() {
            if !key.starts_with(SERVICE_ANNOTATION_PREFIX) {
                continue;
            }
            let service: ServiceDescriptor = match serde_json::from_str(&value) {
                Ok(service) => service,
                Err(error) => {
                    warn!(annotation = %key, %error, "skipping service annotation that failed to decode");
                    continue;
                }
            };
            if seen.insert((service.name.clone(), service.version.clone())) {
                services.push(service);
            }
        }
    }
    services
}
