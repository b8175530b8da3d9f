//! Check command

use crossterm::style::Stylize;
use kiln_core::PackageRequest;

use super::Context;

/// Resolve every blueprint as a root and report the ones that fail.
///
/// Parse and duplicate errors already surfaced while loading the store;
/// this catches missing dependencies, cycles and undeclared versions.
/// Returns the number of failing blueprints.
pub fn check(ctx: &Context) -> usize {
    let mut failed = 0;

    for desc in ctx.store.iter() {
        let request = PackageRequest::new(&desc.name);
        match kiln_core::plan(&ctx.store, &[request]) {
            Ok(_) => {
                if !ctx.quiet {
                    println!("  {} {}", "✓".green(), desc.name);
                }
            }
            Err(e) => {
                failed += 1;
                println!("  {} {} {}", "✗".red(), desc.name, e.to_string().dark_grey());
            }
        }
    }

    println!();
    if failed == 0 {
        println!(
            "  {}",
            format!("{} blueprints OK", ctx.store.len()).green()
        );
    } else {
        println!(
            "  {}",
            format!("{failed} of {} blueprints failed", ctx.store.len()).red()
        );
    }
    failed
}
