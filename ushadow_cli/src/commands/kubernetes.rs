//! Cluster registry and infra scans are also leader-only in-memory state
//! (see [`crate::commands::nodes`]), so these commands talk HTTP too.

use ushadow_definitions::kubernetes::InfraScan;
use ushadow_definitions::{KubernetesCluster, Result};

fn url(leader_url: &str, path: &str) -> String {
    format!("{}/api/v1{}", leader_url.trim_end_matches('/'), path)
}

pub async fn list(leader_url: &str) -> Result<()> {
    let clusters: Vec<KubernetesCluster> = reqwest::get(url(leader_url, "/kubernetes/clusters")).await?.json().await?;
    for c in clusters {
        println!("{:<20} {:<30} {:?}", c.id, c.display_name, c.status);
    }
    Ok(())
}

pub async fn register(leader_url: &str, id: &str, display_name: &str, kubeconfig_path: &std::path::Path) -> Result<()> {
    let kubeconfig = std::fs::read_to_string(kubeconfig_path)?;
    let client = reqwest::Client::new();
    let body = serde_json::json!({ "id": id, "display_name": display_name, "kubeconfig": kubeconfig });
    let resp = client.post(url(leader_url, "/kubernetes/clusters")).json(&body).send().await?;
    let cluster: KubernetesCluster = resp.error_for_status()?.json().await?;
    println!("registered cluster '{}'", cluster.id);
    Ok(())
}

pub async fn remove(leader_url: &str, id: &str) -> Result<()> {
    let client = reqwest::Client::new();
    client.delete(url(leader_url, &format!("/kubernetes/clusters/{}", id))).send().await?.error_for_status()?;
    println!("removed cluster '{}'", id);
    Ok(())
}

pub async fn scan_infra(leader_url: &str, id: &str, namespace: &str) -> Result<()> {
    let client = reqwest::Client::new();
    let resp = client
        .post(url(leader_url, &format!("/kubernetes/clusters/{}/scan", id)))
        .query(&[("namespace", namespace)])
        .send()
        .await?;
    let scan: InfraScan = resp.error_for_status()?.json().await?;
    println!("{}", serde_yaml::to_string(&scan)?);
    Ok(())
}
