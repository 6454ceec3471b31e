use async_trait::async_trait;

use ushadow_definitions::resolved::ResolvedServiceDefinition;
use ushadow_definitions::{Deployment, DeploymentStatus, Result};

/// The uniform interface every deployment target implements (spec.md
/// 4.4.2). Backends are stateless: `list_deployments` and status
/// derivation always read from the target runtime, never from the
/// control-plane's own record.
#[async_trait]
pub trait Backend: Send + Sync {
    async fn deploy(
        &self,
        target: &str,
        resolved: &ResolvedServiceDefinition,
        deployment_id: &str,
        namespace: Option<&str>,
    ) -> Result<Deployment>;

    async fn stop(&self, target: &str, deployment: &Deployment) -> Result<bool>;

    async fn remove(&self, target: &str, deployment: &Deployment) -> Result<bool>;

    async fn restart(&self, target: &str, deployment: &Deployment) -> Result<bool>;

    async fn get_status(&self, target: &str, deployment: &Deployment) -> Result<DeploymentStatus>;

    async fn get_logs(&self, target: &str, deployment: &Deployment, tail: usize) -> Result<Vec<String>>;

    async fn list_deployments(&self, target: &str, service_id: Option<&str>) -> Result<Vec<Deployment>>;
}
