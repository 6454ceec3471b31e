//! Fleet state lives only in `ushadowd`'s in-memory `FleetManager` — there is
//! no local file to read, so these commands are a thin `reqwest` client
//! against the leader's `/api/v1/nodes/*` surface instead of touching a
//! store directly the way the templates/instances/wiring commands do.

use serde::Deserialize;
use ushadow_definitions::node::Node;
use ushadow_definitions::Result;

fn url(leader_url: &str, path: &str) -> String {
    format!("{}/api/v1{}", leader_url.trim_end_matches('/'), path)
}

pub async fn list(leader_url: &str) -> Result<()> {
    let nodes: Vec<Node> = reqwest::get(url(leader_url, "/nodes")).await?.json().await?;
    for node in nodes {
        println!("{:<20} {:<10} {:?} {:?}", node.id, node.display_name, node.node_type, node.status);
    }
    Ok(())
}

#[derive(Deserialize)]
struct TokenResponse {
    token: String,
    install_command: String,
}

pub async fn token(leader_url: &str, shell: Option<&str>) -> Result<()> {
    let client = reqwest::Client::new();
    let body = serde_json::json!({ "shell": shell });
    let resp: TokenResponse = client.post(url(leader_url, "/nodes/join-token")).json(&body).send().await?.json().await?;
    println!("token: {}", resp.token);
    println!("{}", resp.install_command);
    Ok(())
}

pub async fn register_info(leader_url: &str) -> Result<()> {
    let info: serde_json::Value = reqwest::get(url(leader_url, "/leader-info")).await?.json().await?;
    println!("{}", serde_yaml::to_string(&info)?);
    Ok(())
}
