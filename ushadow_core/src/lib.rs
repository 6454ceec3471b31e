#[macro_use]
extern crate serde_derive;
#[macro_use]
extern crate log;
#[macro_use]
extern crate error_chain;

extern crate ushadow_definitions;
extern crate ushadow_filebacked;
extern crate ushadow_settings;

/// The capability resolver: turns an instance + its wiring into a
/// concrete environment map (spec.md 4.3).
pub mod resolver;
pub use resolver::CapabilityResolver;

/// The local mesh-VPN agent wrapper used for peer discovery and routing
/// (spec.md 4.6).
pub mod mesh;
pub use mesh::{MeshPeer, MeshRouter, ProcessMeshRouter};

/// Symmetric encryption for node secrets and kubeconfigs at rest (spec.md 4.5/5).
pub mod crypto;
pub use crypto::SecretBox;

/// Deployment backends (Docker local/remote, Kubernetes) and the manager
/// that picks between them (spec.md 4.4).
pub mod deploy;
pub use deploy::{Backend, DeploymentManager};

/// The node fleet: join tokens, registration, heartbeats (spec.md 4.5).
pub mod fleet;
pub use fleet::FleetManager;

/// On-demand deployed-vs-current comparison (no reconciliation loop).
pub mod diff;
pub use diff::DiffEntry;
