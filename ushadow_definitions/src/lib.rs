#![allow(non_snake_case)]

#[macro_use]
extern crate serde_derive;
extern crate serde;
extern crate serde_json;
extern crate serde_yaml;

#[macro_use]
extern crate log;

extern crate chrono;
extern crate rand;
extern crate regex;
extern crate reqwest;
extern crate url;
extern crate uuid;

extern crate ushadow_settings;

#[macro_use]
extern crate error_chain;

error_chain! {
    types {
        Error, ErrorKind, ResultExt, Result;
    }
    links {}
    foreign_links {
        Io(::std::io::Error);
        SerdeY(serde_yaml::Error);
        SerdeJ(serde_json::Error);
        Url(url::ParseError);
        Reqw(reqwest::Error);
        Settings(ushadow_settings::Error);
    }
    errors {
        UnknownTemplate(id: String) {
            description("unknown template")
            display("unknown template '{}'", id)
        }
        UnknownInstance(id: String) {
            description("unknown instance")
            display("unknown instance '{}'", id)
        }
        DuplicateId(id: String) {
            description("id already exists")
            display("id '{}' already exists", id)
        }
        InvalidSlug(id: String) {
            description("id is not a valid slug")
            display("'{}' is not a valid lowercase slug", id)
        }
        MissingCapability(capability: String) {
            description("required capability unresolved")
            display("required capability '{}' has no provider", capability)
        }
        ResolutionFailed(missing: Vec<String>) {
            description("service resolution failed")
            display("Service resolution failed: missing required input(s): {}", missing.join(", "))
        }
        ActiveDeploymentsBlockDelete(id: String) {
            description("cannot delete while deployments are active")
            display("'{}' has active deployments and cannot be deleted", id)
        }
        ConcurrentDeploy(key: String) {
            description("a deployment for this target is already in progress")
            display("a deployment for '{}' is already in progress", key)
        }
        BackendError(detail: String) {
            description("backend action failed")
            display("backend error: {}", detail)
        }
        UnsupportedSchemaVersion(file: String, found: String, current: String) {
            description("store schema newer than this binary")
            display("'{}' declares schema_version {}, but this ushadow is {} — upgrade before loading it", file, found, current)
        }
    }
}

/// Templates: read-only, discovered descriptions of things instantiable.
pub mod template;
pub use template::{ConfigField, FieldType, Mode, Source, Template};

/// Instances: persistent user-created configuration over a template.
pub mod instance;
pub use instance::{Instance, InstanceStatus};

/// Wiring: edges binding one instance's capability to another's requirement.
pub mod wiring;
pub use wiring::{DefaultsMap, Wiring};

/// Deployment records: the runtime shadow of one deploy action.
pub mod deployment;
pub use deployment::{BackendType, Deployment, DeploymentStatus};

/// The node fleet: workers, join tokens, Kubernetes clusters.
pub mod node;
pub use node::{JoinToken, Node, NodeCapabilities, NodePlatform, NodeRole, NodeStatus, NodeType};

pub mod kubernetes;
pub use kubernetes::KubernetesCluster;

/// The portable currency handed from the resolver/deployment manager to any backend.
pub mod resolved;
pub use resolved::{EnvSource, ResolvedEnv, ResolvedServiceDefinition};

/// Small id/slug helpers shared by the store and the HTTP layer.
pub mod ids;
