//! podmesh-registry: service discovery over Kubernetes pods.
//!
//! Services advertise themselves through annotations on their own pod; this
//! crate turns the cluster's pod watch API into a normalized stream of
//! registry change events and offers register/lookup operations over the
//! same labels and annotations.

pub mod config;
pub mod k8s;
pub mod kube_client;
pub mod logging;
pub mod registry;

pub use k8s::RawEventKind;
pub use k8s::RawWatchEvent;
pub use k8s::RegistryError;
pub use k8s::SessionHandle;
pub use k8s::WatchSession;
pub use k8s::WatchSubscription;
pub use registry::KubeRegistry;
pub use registry::RegistryOptions;
