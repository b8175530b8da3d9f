//! Info command

use anyhow::Result;
use crossterm::style::Stylize;
use kiln_core::packaging;

use super::Context;

/// Show everything a blueprint declares.
pub fn info(ctx: &Context, package: &str) -> Result<()> {
    let desc = ctx.store.get_by_name(package)?;
    let lw = 14;

    println!();
    println!(
        "  {} {}",
        desc.name.as_str().white().bold(),
        desc.default_version.as_str().dark_grey()
    );
    if !desc.description.is_empty() {
        println!("  {}", desc.description);
    }
    if desc.is_virtual {
        println!("  {}", "virtual package, nothing to build".dark_grey());
    }
    println!();

    if let Some(source) = ctx.store.source_of(package) {
        println!("  {:<lw$}{source}", "blueprint");
    }

    for (i, (version, source)) in desc.versions.iter().enumerate() {
        let label = if i == 0 { "versions" } else { "" };
        let marker = if *version == desc.default_version {
            " (default)"
        } else {
            ""
        };
        println!(
            "  {label:<lw$}{version}{marker} {}",
            source.describe().dark_grey()
        );
    }

    if !desc.dependencies.is_empty() {
        let deps: Vec<String> = desc
            .dependencies
            .iter()
            .map(|(name, constraint)| format!("{name} ({constraint})"))
            .collect();
        println!("  {:<lw$}{}", "requires", deps.join(", "));
    }

    if !desc.configure_args.is_empty() {
        println!("  {:<lw$}{}", "configure", desc.configure_args.join(" "));
    }

    for (key, value) in packaging::defines(&desc) {
        println!("  {key:<lw$}{value}");
    }

    Ok(())
}
