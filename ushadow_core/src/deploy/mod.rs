pub mod backend;
pub mod compose;
pub mod docker;
pub mod kubernetes;
pub mod manager;

pub use backend::Backend;
pub use manager::{DeploymentManager, PreparedDeploy};
