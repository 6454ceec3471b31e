use ushadow_definitions::Result;

use crate::context::CliContext;

pub fn list(ctx: &CliContext) -> Result<()> {
    for tpl in ctx.templates.list() {
        println!("{:<30} {:<10} {}", tpl.id, format!("{:?}", tpl.source), tpl.display_name);
    }
    Ok(())
}

pub fn get(ctx: &CliContext, id: &str) -> Result<()> {
    let tpl = ctx.templates.require(id)?;
    println!("{}", serde_yaml::to_string(tpl)?);
    Ok(())
}

pub fn reload(ctx: &mut CliContext) -> Result<()> {
    ctx.templates.reload()?;
    println!("reloaded {} templates", ctx.templates.list().len());
    Ok(())
}
