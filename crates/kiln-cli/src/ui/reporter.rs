//! Line-oriented progress output for `kiln build`.

use crossterm::style::Stylize;
use kiln_core::{BuildPlan, BuildReport, BuildStatus, Reporter, Step, Summary};
use kiln_schema::{PackageName, Version};

use super::theme::Theme;

/// Prints build progress to the terminal.
///
/// Progress lines go to stdout and are suppressed in quiet mode; failures,
/// warnings and the final summary are always shown.
#[derive(Debug, Clone, Default)]
pub struct TerminalReporter {
    theme: Theme,
    quiet: bool,
}

impl TerminalReporter {
    pub fn new(quiet: bool) -> Self {
        Self {
            theme: Theme::default(),
            quiet,
        }
    }

    fn row(&self, icon: String, name: &PackageName, version: &Version, detail: &str) -> String {
        let layout = &self.theme.layout;
        let name = format!("{:<w$}", name.as_str(), w = layout.name_width);
        let version = format!("{:<w$}", version.as_str(), w = layout.version_width);
        format!(
            "  {icon} {} {} {}",
            name.with(self.theme.colors.package_name),
            version.with(self.theme.colors.version),
            detail.with(self.theme.colors.detail)
        )
    }

    /// Print the full diagnostic of every failed node.
    pub fn print_failures(&self, report: &BuildReport) {
        let failures: Vec<_> = report.failures().collect();
        if failures.is_empty() {
            return;
        }

        eprintln!();
        eprintln!("{}", "Failures".bold());
        for result in failures {
            eprintln!(
                "  {} {} {}",
                self.theme.icons.failed.with(self.theme.colors.error),
                result.name.as_str().with(self.theme.colors.package_name),
                result.version.as_str().with(self.theme.colors.detail)
            );
            for line in result.error.as_deref().unwrap_or_default().lines() {
                eprintln!("      {line}");
            }
        }

        let skipped = report
            .results
            .iter()
            .filter(|r| r.status == BuildStatus::Skipped)
            .count();
        if skipped > 0 {
            eprintln!(
                "  {}",
                format!("{skipped} dependent package(s) were not built").dark_grey()
            );
        }
    }
}

impl Reporter for TerminalReporter {
    fn plan_ready(&self, plan: &BuildPlan) {
        if self.quiet {
            return;
        }
        println!();
        println!(
            "{} {} package{} in {} layer{}",
            "Building".bold(),
            plan.len(),
            if plan.len() == 1 { "" } else { "s" },
            plan.layer_count(),
            if plan.layer_count() == 1 { "" } else { "s" },
        );
    }

    fn step(&self, name: &PackageName, version: &Version, step: Step) {
        if self.quiet {
            return;
        }
        let icon = self
            .theme
            .icons
            .building
            .with(self.theme.colors.building)
            .to_string();
        println!(
            "{}",
            self.row(
                icon,
                name,
                version,
                &format!("{:<w$}", step.as_str(), w = self.theme.layout.step_width)
            )
        );
    }

    fn done(&self, name: &PackageName, version: &Version, elapsed_secs: f64) {
        if self.quiet {
            return;
        }
        let icon = self
            .theme
            .icons
            .built
            .with(self.theme.colors.success)
            .to_string();
        println!(
            "{}",
            self.row(icon, name, version, &format!("{elapsed_secs:.1}s"))
        );
    }

    fn failed(&self, name: &PackageName, version: &Version, reason: &str) {
        let icon = self
            .theme
            .icons
            .failed
            .with(self.theme.colors.error)
            .to_string();
        let headline = reason.lines().next().unwrap_or_default();
        println!("{}", self.row(icon, name, version, headline));
    }

    fn skipped(&self, name: &PackageName, version: &Version, reason: &str) {
        let icon = self
            .theme
            .icons
            .skipped
            .with(self.theme.colors.detail)
            .to_string();
        println!("{}", self.row(icon, name, version, reason));
    }

    fn info(&self, msg: &str) {
        if !self.quiet {
            println!("  {} {msg}", self.theme.icons.info);
        }
    }

    fn warning(&self, msg: &str) {
        eprintln!(
            "  {} {}",
            self.theme.icons.warning.with(self.theme.colors.warning),
            msg
        );
    }

    fn error(&self, msg: &str) {
        eprintln!(
            "  {} {}",
            self.theme.icons.failed.with(self.theme.colors.error),
            msg
        );
    }

    fn summary(&self, summary: &Summary, elapsed_secs: f64) {
        let msg = format!(
            "{} built, {} failed, {} skipped in {elapsed_secs:.1}s",
            summary.success, summary.failed, summary.skipped
        );
        println!();
        if summary.is_success() {
            println!(
                "  {} {}",
                self.theme.icons.built.with(self.theme.colors.success),
                msg.with(self.theme.colors.success)
            );
        } else {
            println!(
                "  {} {}",
                self.theme.icons.failed.with(self.theme.colors.error),
                msg.with(self.theme.colors.error)
            );
        }
    }
}
