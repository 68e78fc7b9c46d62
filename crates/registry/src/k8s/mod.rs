//! Kubernetes integration module.
//!
//! This module turns low-level pod watch notifications into the normalized
//! registry change events consumed through [`WatchSession`].
//!
//! The main components are:
//! - [`selector`]: computes the label selector scoping a watch or lookup
//! - `annotations`: extracts embedded service descriptors from pod annotations
//! - `classifier`: maps raw watch events onto registry actions
//! - [`WatchSubscription`]: one open upstream pod watch
//! - [`WatchSession`]: the per-request session owning subscription and queue

pub(crate) mod annotations;
pub(crate) mod classifier;
pub mod selector;
pub mod session;
pub mod types;
pub mod watch;

pub use session::SessionHandle;
pub use session::WatchSession;
pub use types::RawEventKind;
pub use types::RawWatchEvent;
pub use types::RegistryError;
pub use watch::WatchSubscription;
