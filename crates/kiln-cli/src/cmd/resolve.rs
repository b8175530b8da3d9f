//! Resolve command

use anyhow::Result;
use kiln_core::PackageRequest;

use super::Context;
use crate::ui::table::plan_table;

/// Print the build plan for `packages`.
pub fn resolve(ctx: &Context, packages: &[PackageRequest], json: bool) -> Result<()> {
    let plan = kiln_core::plan(&ctx.store, packages)?;

    if json {
        println!("{}", plan.to_json()?);
    } else {
        println!("{}", plan_table(&plan));
    }
    Ok(())
}
