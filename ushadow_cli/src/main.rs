#[macro_use]
extern crate log;

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};

use ushadow_cli::context::CliContext;
use ushadow_cli::{audit, commands, Error, ErrorKind, Result};
use ushadow_definitions::BackendType;

#[derive(Parser)]
#[command(name = "ushadowctl", about = "Operator CLI for local inspection, dry-run and deployment of ushadow instances")]
struct Cli {
    /// Increase verbosity (-v, -vv, ...)
    #[arg(short = 'v', long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Directory holding instances.yaml/wiring.yaml/settings.yaml and template sources
    #[arg(long, global = true, env = "USHADOW_DATA_DIR", default_value = "./data")]
    data_dir: PathBuf,

    /// Base URL of a running ushadowd, used by the nodes/k8s commands
    #[arg(long, global = true, env = "USHADOW_LEADER_URL", default_value = "http://127.0.0.1:7777")]
    leader_url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Inspect discovered compose/provider templates
    Templates {
        #[command(subcommand)]
        action: TemplatesAction,
    },
    /// Manage instances and their deployments
    Instances {
        #[command(subcommand)]
        action: InstancesAction,
    },
    /// Manage capability wiring between instances
    Wiring {
        #[command(subcommand)]
        action: WiringAction,
    },
    /// Inspect the node fleet (talks to ushadowd over HTTP)
    Nodes {
        #[command(subcommand)]
        action: NodesAction,
    },
    /// Manage registered Kubernetes clusters (talks to ushadowd over HTTP)
    K8s {
        #[command(subcommand)]
        action: K8sAction,
    },
}

#[derive(Subcommand)]
enum TemplatesAction {
    List,
    Get { id: String },
    Reload,
}

#[derive(Subcommand)]
enum InstancesAction {
    List,
    Get { id: String },
    Create { id: String, template_id: String, display_name: String },
    Update { id: String, display_name: String },
    Delete { id: String },
    Deploy {
        id: String,
        /// "docker" or "kubernetes"
        #[arg(long, default_value = "docker")]
        backend: String,
        /// Node id (docker) or cluster id (kubernetes) to deploy to
        #[arg(long, default_value = "local")]
        target: String,
        #[arg(long)]
        namespace: Option<String>,
        /// Print the resolved service definition without deploying
        #[arg(long)]
        dry_run: bool,
    },
    Undeploy {
        deployment_id: String,
        instance_id: String,
        #[arg(long, default_value = "docker")]
        backend: String,
        #[arg(long, default_value = "local")]
        target: String,
        #[arg(long)]
        namespace: Option<String>,
    },
    /// Compare a previously-deployed config against what the instance would resolve to now
    Diff {
        instance_id: String,
        /// Path to a YAML dump of the deployment's `deployed_config`
        deployed_config: PathBuf,
    },
}

#[derive(Subcommand)]
enum WiringAction {
    List,
    Create { id: String, source_instance_id: String, source_capability: String, target_instance_id: String, target_capability: String },
    Delete { id: String },
}

#[derive(Subcommand)]
enum NodesAction {
    List,
    Token {
        #[arg(long)]
        shell: Option<String>,
    },
    RegisterInfo,
}

#[derive(Subcommand)]
enum K8sAction {
    Clusters {
        #[command(subcommand)]
        action: ClustersAction,
    },
    ScanInfra {
        id: String,
        #[arg(long, default_value = "default")]
        namespace: String,
    },
}

#[derive(Subcommand)]
enum ClustersAction {
    List,
    Register { id: String, display_name: String, kubeconfig: PathBuf },
    Remove { id: String },
}

fn parse_backend(s: &str) -> Result<BackendType> {
    match s {
        "docker" => Ok(BackendType::Docker),
        "kubernetes" | "k8s" => Ok(BackendType::Kubernetes),
        other => Err(ErrorKind::BackendError(format!("unknown backend type '{}'", other)).into()),
    }
}

/// Warns (doesn't abort) if `docker`/`docker-compose`/`kubectl` aren't on
/// `PATH` — local deploys and k8s scans will fail later with a clearer
/// error, but templates/instances/wiring commands don't need any of them.
fn check_external_binaries() {
    for bin in ["docker", "docker-compose", "kubectl"] {
        if which::which(bin).is_err() {
            warn!("'{}' not found on PATH; commands that shell out to it will fail", bin);
        }
    }
}

fn print_error_debug(e: &Error) {
    for cause in e.iter().skip(1) {
        warn!("caused by: {}", cause);
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    loggerv::Logger::new()
        .verbosity(u64::from(cli.verbose) + 1)
        .module_path(false)
        .init()
        .unwrap();

    check_external_binaries();

    if let Err(e) = run(cli).await {
        error!("{}", e);
        print_error_debug(&e);
        process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut ctx = CliContext::load(cli.data_dir)?;
    let audit_path = ctx.audit_log_path();
    let leader_url = cli.leader_url;

    match cli.command {
        Commands::Templates { action } => match action {
            TemplatesAction::List => commands::templates::list(&ctx),
            TemplatesAction::Get { id } => commands::templates::get(&ctx, &id),
            TemplatesAction::Reload => commands::templates::reload(&mut ctx),
        },
        Commands::Instances { action } => match action {
            InstancesAction::List => commands::instances::list(&ctx),
            InstancesAction::Get { id } => commands::instances::get(&ctx, &id),
            InstancesAction::Create { id, template_id, display_name } => {
                let result = commands::instances::create(&mut ctx, &id, &template_id, &display_name);
                audit::record(&audit_path, "create", &id, result.is_ok(), result.as_ref().err().map(|e| e.to_string()));
                result
            }
            InstancesAction::Update { id, display_name } => {
                let result = commands::instances::update_display_name(&mut ctx, &id, &display_name);
                audit::record(&audit_path, "update", &id, result.is_ok(), result.as_ref().err().map(|e| e.to_string()));
                result
            }
            InstancesAction::Delete { id } => {
                let result = commands::instances::delete(&mut ctx, &id);
                audit::record(&audit_path, "delete", &id, result.is_ok(), result.as_ref().err().map(|e| e.to_string()));
                result
            }
            InstancesAction::Deploy { id, backend, target, namespace, dry_run } => {
                let backend_type = parse_backend(&backend)?;
                let result = commands::instances::deploy(&mut ctx, &id, backend_type, &target, namespace.as_deref(), dry_run).await;
                if !dry_run {
                    audit::record(&audit_path, "deploy", &id, result.is_ok(), result.as_ref().err().map(|e| e.to_string()));
                }
                result
            }
            InstancesAction::Undeploy { deployment_id, instance_id, backend, target, namespace } => {
                let backend_type = parse_backend(&backend)?;
                let result = commands::instances::undeploy(&ctx, &deployment_id, &instance_id, backend_type, &target, namespace.as_deref()).await;
                audit::record(&audit_path, "undeploy", &deployment_id, result.is_ok(), result.as_ref().err().map(|e| e.to_string()));
                result
            }
            InstancesAction::Diff { instance_id, deployed_config } => commands::instances::diff(&mut ctx, &instance_id, &deployed_config).await,
        },
        Commands::Wiring { action } => match action {
            WiringAction::List => commands::wiring::list(&ctx),
            WiringAction::Create { id, source_instance_id, source_capability, target_instance_id, target_capability } => {
                let result = commands::wiring::create(&mut ctx, &id, &source_instance_id, &source_capability, &target_instance_id, &target_capability);
                audit::record(&audit_path, "create", &id, result.is_ok(), result.as_ref().err().map(|e| e.to_string()));
                result
            }
            WiringAction::Delete { id } => {
                let result = commands::wiring::delete(&mut ctx, &id);
                audit::record(&audit_path, "delete", &id, result.is_ok(), result.as_ref().err().map(|e| e.to_string()));
                result
            }
        },
        Commands::Nodes { action } => match action {
            NodesAction::List => commands::nodes::list(&leader_url).await,
            NodesAction::Token { shell } => commands::nodes::token(&leader_url, shell.as_deref()).await,
            NodesAction::RegisterInfo => commands::nodes::register_info(&leader_url).await,
        },
        Commands::K8s { action } => match action {
            K8sAction::Clusters { action } => match action {
                ClustersAction::List => commands::kubernetes::list(&leader_url).await,
                ClustersAction::Register { id, display_name, kubeconfig } => {
                    let result = commands::kubernetes::register(&leader_url, &id, &display_name, &kubeconfig).await;
                    audit::record(&audit_path, "register-cluster", &id, result.is_ok(), result.as_ref().err().map(|e| e.to_string()));
                    result
                }
                ClustersAction::Remove { id } => {
                    let result = commands::kubernetes::remove(&leader_url, &id).await;
                    audit::record(&audit_path, "remove-cluster", &id, result.is_ok(), result.as_ref().err().map(|e| e.to_string()));
                    result
                }
            },
            K8sAction::ScanInfra { id, namespace } => commands::kubernetes::scan_infra(&leader_url, &id, &namespace).await,
        },
    }
}
