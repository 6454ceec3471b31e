use ushadow_definitions::{BackendType, Instance, Result};
use ushadow_filebacked::InstancePatch;

use crate::context::CliContext;

pub fn list(ctx: &CliContext) -> Result<()> {
    for inst in ctx.instances.list() {
        println!("{:<20} {:<12} {:?}", inst.id, inst.template_id, inst.status);
    }
    Ok(())
}

pub fn get(ctx: &CliContext, id: &str) -> Result<()> {
    let inst = ctx.instances.require(id)?;
    println!("{}", serde_yaml::to_string(inst)?);
    Ok(())
}

pub fn create(ctx: &mut CliContext, id: &str, template_id: &str, display_name: &str) -> Result<()> {
    ctx.templates.require(template_id)?;
    let inst = Instance::new(id.to_string(), template_id.to_string(), display_name.to_string());
    ctx.instances.create(inst)?;
    println!("created instance '{}'", id);
    Ok(())
}

pub fn delete(ctx: &mut CliContext, id: &str) -> Result<()> {
    ctx.instances.delete(id)?;
    ctx.wiring.remove_instance_references(id)?;
    println!("deleted instance '{}'", id);
    Ok(())
}

pub fn update_display_name(ctx: &mut CliContext, id: &str, display_name: &str) -> Result<()> {
    let patch = InstancePatch { display_name: Some(display_name.to_string()), ..Default::default() };
    ctx.instances.update(id, patch)?;
    println!("updated instance '{}'", id);
    Ok(())
}

/// Resolves `id`'s environment and, unless `dry_run`, ships it to the
/// chosen backend/target — the same `prepare_deploy`/`deploy_resolved`
/// split `ushadowd` uses, just awaited on the CLI's own tokio runtime
/// instead of inside an HTTP handler.
pub async fn deploy(ctx: &mut CliContext, id: &str, backend_type: BackendType, target: &str, namespace: Option<&str>, dry_run: bool) -> Result<()> {
    let prepared =
        ctx.deployer.prepare_deploy(&ctx.templates, &ctx.instances, &ctx.wiring, &mut ctx.settings.lock().unwrap(), id)?;

    if dry_run {
        let resolved = ctx.deployer.resolve(prepared).await?;
        println!("{}", serde_yaml::to_string(&resolved)?);
        return Ok(());
    }

    let deployment = ctx.deployer.deploy_resolved(prepared, backend_type, target, namespace).await?;
    ctx.instances.update_status(id, ushadow_definitions::InstanceStatus::Deployed, deployment.access_url.clone(), None)?;
    println!("{}", serde_yaml::to_string(&deployment)?);
    Ok(())
}

/// The CLI keeps no deployment records of its own — those live only in
/// `ushadowd`'s in-memory registry — so an ad-hoc undeploy rebuilds just
/// enough of a [`ushadow_definitions::Deployment`] from the identifiers the
/// operator supplies to address the backend call.
pub async fn undeploy(
    ctx: &CliContext,
    deployment_id: &str,
    instance_id: &str,
    backend_type: BackendType,
    target: &str,
    namespace: Option<&str>,
) -> Result<()> {
    let instance = ctx.instances.require(instance_id)?;
    let mut deployment = ushadow_definitions::Deployment::new(
        deployment_id.to_string(),
        instance_id.to_string(),
        instance.template_id.clone(),
        backend_type,
        target.to_string(),
    );
    if let Some(ns) = namespace {
        deployment.backend_metadata.insert("namespace".to_string(), ns.to_string());
    }
    ctx.deployer.remove(&deployment).await?;
    println!("removed deployment '{}'", deployment_id);
    Ok(())
}

/// Prints a read-only comparison of `deployment_id`'s last-known resolved
/// config against what `instance_id` would resolve to right now. No
/// deployment store to pull `deployed_config` from locally, so this takes it
/// directly as a YAML file the operator saved off the leader's response.
pub async fn diff(ctx: &mut CliContext, instance_id: &str, deployed_config_path: &std::path::Path) -> Result<()> {
    let deployed_config: ushadow_definitions::resolved::ResolvedServiceDefinition =
        serde_yaml::from_str(&std::fs::read_to_string(deployed_config_path)?)?;
    let prepared = ctx.deployer.prepare_deploy(
        &ctx.templates,
        &ctx.instances,
        &ctx.wiring,
        &mut ctx.settings.lock().unwrap(),
        instance_id,
    )?;
    let current = ctx.deployer.resolve(prepared).await?;
    let entries = ushadow_core::diff::diff_resolved(&deployed_config, &current);
    if entries.is_empty() {
        println!("no differences");
    } else {
        for entry in entries {
            println!("{:<20} deployed={:<30} current={}", entry.field, entry.deployed, entry.current);
        }
    }
    Ok(())
}
