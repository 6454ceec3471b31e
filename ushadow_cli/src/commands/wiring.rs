use ushadow_definitions::{Result, Wiring};

use crate::context::CliContext;

pub fn list(ctx: &CliContext) -> Result<()> {
    for w in ctx.wiring.list() {
        println!("{:<20} {}.{} -> {}.{}", w.id, w.source_instance_id, w.source_capability, w.target_instance_id, w.target_capability);
    }
    Ok(())
}

/// Upserts a wiring row on `(target_instance_id, target_capability)`
/// (spec.md 4.2), after checking both endpoints actually exist — the same
/// validation `ushadowd`'s wiring route performs before calling
/// `WiringStore::create`.
pub fn create(
    ctx: &mut CliContext,
    id: &str,
    source_instance_id: &str,
    source_capability: &str,
    target_instance_id: &str,
    target_capability: &str,
) -> Result<()> {
    ctx.instances.require(source_instance_id)?;
    ctx.instances.require(target_instance_id)?;
    let wiring = Wiring::new(
        id.to_string(),
        source_instance_id.to_string(),
        source_capability.to_string(),
        target_instance_id.to_string(),
        target_capability.to_string(),
    );
    ctx.wiring.create(wiring)?;
    println!("created wiring '{}'", id);
    Ok(())
}

pub fn delete(ctx: &mut CliContext, id: &str) -> Result<()> {
    ctx.wiring.delete(id)?;
    println!("deleted wiring '{}'", id);
    Ok(())
}
