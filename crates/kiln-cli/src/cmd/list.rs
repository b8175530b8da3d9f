//! List command

use anyhow::Result;

use super::Context;
use crate::ui::table::list_table;

/// List every loaded blueprint.
pub fn list(ctx: &Context) -> Result<()> {
    if ctx.store.is_empty() {
        println!();
        println!("  No blueprints found.");
        println!("  Pass --blueprints <DIR> or set blueprint_dirs in ~/.kiln/config.toml.");
        return Ok(());
    }

    println!("{}", list_table(&ctx.store));
    Ok(())
}
