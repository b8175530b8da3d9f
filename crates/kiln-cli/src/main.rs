//! kiln - resolve and build package blueprints

use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use crossterm::style::Stylize;
use tracing_subscriber::EnvFilter;

use kiln_cli::cmd::{self, Context};
use kiln_cli::{Cli, Commands, EXIT_RESOLVE};
use kiln_core::ResolveError;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // RUST_LOG wins; otherwise -v/-vv raise the default level
    let default_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {e:#}", "error:".red().bold());
            if e.downcast_ref::<ResolveError>().is_some() {
                ExitCode::from(EXIT_RESOLVE)
            } else {
                ExitCode::FAILURE
            }
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    if let Commands::Completions { shell } = cli.command {
        cmd::completions::completions(shell);
        return Ok(ExitCode::SUCCESS);
    }

    let ctx = Context::load(&cli)?;

    match cli.command {
        Commands::Resolve { packages, json } => {
            cmd::resolve::resolve(&ctx, &packages, json)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Build {
            packages,
            concurrency,
            dry_run,
        } => cmd::build::build(&ctx, &packages, concurrency, dry_run).await,
        Commands::List => {
            cmd::list::list(&ctx)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Info { package } => {
            cmd::info::info(&ctx, &package)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Check => Ok(if cmd::check::check(&ctx) == 0 {
            ExitCode::SUCCESS
        } else {
            ExitCode::from(EXIT_RESOLVE)
        }),
        Commands::Completions { .. } => Ok(ExitCode::SUCCESS),
    }
}
