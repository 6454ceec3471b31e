use async_trait::async_trait;
use tokio::process::Command;

use ushadow_definitions::{ErrorKind, Result};

/// Checks the mesh agent binary is on `PATH`.
pub fn mexists(binary: &str) -> Result<()> {
    if which::which(binary).is_err() {
        return Err(ErrorKind::BackendError(format!("mesh agent executable '{}' not found on PATH", binary)).into());
    }
    Ok(())
}

async fn mout(binary: &str, args: &[String]) -> Result<String> {
    mexists(binary)?;
    debug!("{} {}", binary, args.join(" "));
    let out = Command::new(binary).args(args).output().await?;
    if !out.status.success() {
        let err = String::from_utf8_lossy(&out.stderr).into_owned();
        return Err(ErrorKind::BackendError(format!("mesh agent '{}' failed: {}", binary, err)).into());
    }
    Ok(String::from_utf8_lossy(&out.stdout).into_owned())
}

async fn mexec(binary: &str, args: &[String]) -> Result<()> {
    mexists(binary)?;
    debug!("{} {}", binary, args.join(" "));
    let status = Command::new(binary).args(args).status().await?;
    if !status.success() {
        return Err(ErrorKind::BackendError(format!(
            "mesh agent '{}' exited with {}",
            binary,
            status.code().unwrap_or(1001)
        ))
        .into());
    }
    Ok(())
}

/// One peer visible to the local mesh agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeshPeer {
    pub node_id: String,
    pub mesh_address: String,
    pub reachable: bool,
}

/// The overlay-network surface a node manager needs: peer discovery and
/// per-peer addressing, plus the route plumbing remote-Docker-over-mesh
/// deploys rely on (spec.md 4.6). Never reimplemented in-process; every
/// implementation shells out to the real mesh agent CLI the same way the
/// compose resolver shells out to the compose tool, so mesh membership
/// stays the single source of truth the agent itself maintains.
#[async_trait]
pub trait MeshRouter: Send + Sync {
    async fn peers(&self) -> Result<Vec<MeshPeer>>;

    async fn address_of(&self, node_id: &str) -> Result<Option<String>>;

    /// Advertises `subnet` as reachable behind `node_id` — VPN-level subnet
    /// routing used when a remote unode joins the mesh (spec.md 4.5).
    async fn add_route(&self, node_id: &str, subnet: &str) -> Result<()>;

    async fn remove_route(&self, node_id: &str, subnet: &str) -> Result<()>;

    /// Registers a `<path> → <container_name>:<port>` entry in the local
    /// mesh-VPN reverse proxy for a locally-deployed service (spec.md 4.6,
    /// distinct from the VPN subnet routing above).
    async fn add_path_route(&self, path: &str, container_name: &str, port: u16) -> Result<()>;

    async fn remove_path_route(&self, path: &str) -> Result<()>;
}

/// A [`MeshRouter`] backed by a locally installed mesh agent CLI (e.g. a
/// Tailscale/Headscale or WireGuard-mesh style client). Every call shells
/// out fresh; the agent's own daemon is the only thing that holds state.
pub struct ProcessMeshRouter {
    binary: String,
}

impl ProcessMeshRouter {
    pub fn new(binary: impl Into<String>) -> Self {
        ProcessMeshRouter { binary: binary.into() }
    }
}

impl Default for ProcessMeshRouter {
    fn default() -> Self {
        ProcessMeshRouter::new("tailscale")
    }
}

#[async_trait]
impl MeshRouter for ProcessMeshRouter {
    async fn peers(&self) -> Result<Vec<MeshPeer>> {
        let out = mout(&self.binary, &["status".to_string(), "--json".to_string()]).await?;
        let doc: serde_json::Value = serde_json::from_str(&out)
            .map_err(|e| ErrorKind::BackendError(format!("could not parse mesh status: {}", e)))?;

        let peers = doc
            .get("Peer")
            .and_then(|p| p.as_object())
            .map(|obj| {
                obj.values()
                    .filter_map(|peer| {
                        let node_id = peer.get("HostName").and_then(|v| v.as_str())?.to_string();
                        let mesh_address = peer
                            .get("TailscaleIPs")
                            .and_then(|v| v.as_array())
                            .and_then(|a| a.first())
                            .and_then(|v| v.as_str())?
                            .to_string();
                        let reachable = peer.get("Online").and_then(|v| v.as_bool()).unwrap_or(false);
                        Some(MeshPeer { node_id, mesh_address, reachable })
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(peers)
    }

    async fn address_of(&self, node_id: &str) -> Result<Option<String>> {
        let peers = self.peers().await?;
        Ok(peers.into_iter().find(|p| p.node_id == node_id).map(|p| p.mesh_address))
    }

    async fn add_route(&self, node_id: &str, subnet: &str) -> Result<()> {
        mexec(
            &self.binary,
            &["set".to_string(), format!("--advertise-routes={}", subnet), node_id.to_string()],
        )
        .await
    }

    async fn remove_route(&self, node_id: &str, subnet: &str) -> Result<()> {
        debug!("withdrawing route {} for {}", subnet, node_id);
        mexec(&self.binary, &["set".to_string(), "--advertise-routes=".to_string(), node_id.to_string()]).await
    }

    async fn add_path_route(&self, path: &str, container_name: &str, port: u16) -> Result<()> {
        let target = format!("http://{}:{}", container_name, port);
        debug!("routing {} -> {}", path, target);
        mexec(
            &self.binary,
            &["serve".to_string(), "--bg".to_string(), "--set-path".to_string(), path.to_string(), target],
        )
        .await
    }

    async fn remove_path_route(&self, path: &str) -> Result<()> {
        debug!("withdrawing route {}", path);
        mexec(&self.binary, &["serve".to_string(), "--remove".to_string(), path.to_string()]).await
    }
}
