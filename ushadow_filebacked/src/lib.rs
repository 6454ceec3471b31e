#[macro_use]
extern crate serde_derive;
#[macro_use]
extern crate log;
#[macro_use]
extern crate error_chain;

extern crate ushadow_definitions;
extern crate ushadow_settings;

mod util;
pub use util::Require;

/// Template discovery: scans `compose/` and `providers/` (spec.md 4.1).
pub mod templates;
pub use templates::TemplateRegistry;

/// The instance CRUD store backed by `instances.yaml` (spec.md 4.2).
pub mod instances;
pub use instances::{InstancePatch, InstanceStore};

/// The wiring CRUD store backed by `wiring.yaml` (spec.md 4.2).
pub mod wiring;
pub use wiring::WiringStore;
