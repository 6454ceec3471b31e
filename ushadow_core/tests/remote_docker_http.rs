//! Exercises `RemoteDockerBackend`'s worker-RPC HTTP boundary (spec.md
//! 4.4.3, remote case) against a mocked unode agent, the same way the
//! audit webhook's HTTP boundary is tested.

use mockito::mock;

use ushadow_core::deploy::docker::RemoteDockerBackend;
use ushadow_core::Backend;
use ushadow_definitions::{BackendType, Deployment, DeploymentStatus};

// mockito's mock server binds a fixed local port; point the backend's
// agent port there instead of the real unode agent's 7780.
const MOCK_AGENT_PORT: u16 = 1234;

fn deployment(id: &str) -> Deployment {
    Deployment::new(id.to_string(), "my-db".to_string(), "postgres".to_string(), BackendType::Docker, "node-1".to_string())
}

#[tokio::test]
async fn get_status_maps_404_to_not_applicable() {
    let _m = mock("GET", "/containers/abc123/status").with_status(404).create();

    let backend = RemoteDockerBackend::with_agent_port(reqwest::Client::new(), MOCK_AGENT_PORT);
    let status = backend.get_status("127.0.0.1", &deployment("abc123")).await.unwrap();
    assert_eq!(status, DeploymentStatus::NotApplicable);
}

#[tokio::test]
async fn get_status_relays_agents_reported_status() {
    let _m = mock("GET", "/containers/abc123/status")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body("\"running\"")
        .create();

    let backend = RemoteDockerBackend::with_agent_port(reqwest::Client::new(), MOCK_AGENT_PORT);
    let status = backend.get_status("127.0.0.1", &deployment("abc123")).await.unwrap();
    assert_eq!(status, DeploymentStatus::Running);
}

#[tokio::test]
async fn remove_reflects_the_agents_http_status() {
    let ok_mock = mock("POST", "/containers/abc123/remove").with_status(200).create();
    let backend = RemoteDockerBackend::with_agent_port(reqwest::Client::new(), MOCK_AGENT_PORT);
    assert!(backend.remove("127.0.0.1", &deployment("abc123")).await.unwrap());
    ok_mock.assert();
}

#[tokio::test]
async fn remove_on_agent_rejection_returns_false_not_an_error() {
    let _m = mock("POST", "/containers/missing/remove").with_status(404).create();

    let backend = RemoteDockerBackend::with_agent_port(reqwest::Client::new(), MOCK_AGENT_PORT);
    let ok = backend.remove("127.0.0.1", &deployment("missing")).await.unwrap();
    assert!(!ok);
}

#[tokio::test]
async fn list_deployments_filters_by_instance_id_query_param() {
    let _m = mock("GET", "/containers?instance_id=my-db")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body("[]")
        .create();

    let backend = RemoteDockerBackend::with_agent_port(reqwest::Client::new(), MOCK_AGENT_PORT);
    let deployments = backend.list_deployments("127.0.0.1", Some("my-db")).await.unwrap();
    assert!(deployments.is_empty());
}
