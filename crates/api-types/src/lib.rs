//! Shared registry type definitions
//!
//! This crate contains the serde type definitions exchanged between the
//! registry and its consumers: service descriptors with their endpoints and
//! nodes, and the change events emitted by a registry watch. Descriptors are
//! also what gets embedded, JSON-encoded, in pod annotations.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;

/// Kind of change carried by a registry event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegistryAction {
    Create,
    Update,
    Delete,
}

impl std::fmt::Display for RegistryAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Create => write!(f, "create"),
            Self::Update => write!(f, "update"),
            Self::Delete => write!(f, "delete"),
        }
    }
}

/// A service as advertised through the registry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceDescriptor {
    /// Service name
    pub name: String,
    /// Service version
    #[serde(default)]
    pub version: String,
    /// Free-form service metadata
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    /// Callable endpoints exposed by the service
    #[serde(default)]
    pub endpoints: Vec<ServiceEndpoint>,
    /// Instances backing the service
    #[serde(default)]
    pub nodes: Vec<ServiceNode>,
}

/// A single named endpoint of a service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceEndpoint {
    /// Endpoint name
    pub name: String,
    /// Endpoint metadata (transport, handler options, ...)
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

/// One addressable instance of a service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceNode {
    /// Unique node id
    pub id: String,
    /// `host:port` the node answers on
    pub address: String,
    /// Node metadata
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

/// A single registry change, as delivered to a watch consumer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryEvent {
    /// What happened to the service
    pub action: RegistryAction,
    /// The affected service descriptor
    pub service: ServiceDescriptor,
}
