#[macro_use]
extern crate log;

extern crate ushadow_core;
extern crate ushadow_definitions;
extern crate ushadow_filebacked;
extern crate ushadow_settings;

pub use ushadow_definitions::{Error, ErrorKind, Result};

/// Kubernetes cluster registry: the leader-side wrapper around
/// `ushadow_core`'s stateless `KubernetesBackend`.
pub mod clusters;

/// Shared application state: the filebacked stores, the deployment
/// manager, the fleet, and the cluster registry.
pub mod state;

/// HTTP handlers, one module per resource group.
pub mod routes;
