//! Static tables for `kiln resolve` and `kiln list`.

use comfy_table::presets::UTF8_HORIZONTAL_ONLY;
use comfy_table::{Cell, ContentArrangement, Table};
use kiln_core::{BuildPlan, DescriptorStore};
use kiln_schema::{PackageName, Version};

/// Render a build plan, one row per entry in build order.
pub fn plan_table(plan: &BuildPlan) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_HORIZONTAL_ONLY)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["#", "package", "version", "layer", "depends on"]);

    for (i, entry) in plan.iter().enumerate() {
        let mut name = entry.name().to_string();
        if entry.descriptor.is_virtual {
            name.push_str(" (virtual)");
        }
        let deps = entry
            .dependencies
            .iter()
            .map(PackageName::as_str)
            .collect::<Vec<_>>()
            .join(", ");
        table.add_row(vec![
            Cell::new(i + 1),
            Cell::new(name),
            Cell::new(&entry.version),
            Cell::new(entry.layer),
            Cell::new(deps),
        ]);
    }
    table
}

/// Render every blueprint in the store.
pub fn list_table(store: &DescriptorStore) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_HORIZONTAL_ONLY)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["package", "default", "versions", "description"]);

    for desc in store.iter() {
        let versions = desc
            .versions
            .keys()
            .map(Version::as_str)
            .collect::<Vec<_>>()
            .join(", ");
        table.add_row(vec![
            Cell::new(&desc.name),
            Cell::new(&desc.default_version),
            Cell::new(versions),
            Cell::new(&desc.description),
        ]);
    }
    table
}
