// Copyright 2026 Harvest Contributors
// SPDX-License-Identifier: Apache-2.0

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use harvest_runtime::cli;
use harvest_runtime::cli::search_cmd::SearchArgs;
use harvest_runtime::export::ExportFormat;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "harvest",
    about = "Harvest: paced, authenticated profile collection over a real browser session",
    version,
    after_help = "Run 'harvest <command> --help' for details on each command."
)]
struct Cli {
    /// Enable verbose/debug logging
    #[arg(long, short, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    /// Suppress the progress bar and summary
    #[arg(long, short, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Search people and collect their profiles
    Search {
        /// Search keywords (e.g. "rust engineer berlin")
        keywords: String,
        /// Narrow results to a location (e.g. "London, UK")
        #[arg(long, short = 'l')]
        location: Option<String>,
        /// Narrow results to an industry (e.g. "Financial Services")
        #[arg(long, short = 'i')]
        industry: Option<String>,
        /// Maximum number of profiles to collect
        #[arg(long, short = 'n', default_value = "10")]
        max_results: usize,
        /// Only collect search cards; do not visit profiles
        #[arg(long)]
        no_details: bool,
        /// Output file (default: harvest_<keywords>_<timestamp>.<ext>)
        #[arg(long, short)]
        output: Option<PathBuf>,
        /// Output format
        #[arg(long, value_enum, default_value_t = ExportFormat::Json)]
        format: ExportFormat,
        /// Cookie file exported from a logged-in browser
        #[arg(long)]
        cookies: Option<PathBuf>,
        /// Show the browser window
        #[arg(long)]
        headful: bool,
        /// Maximum profile visits this session (hard limit 80)
        #[arg(long)]
        visit_cap: Option<u32>,
    },
    /// Check environment and diagnose issues
    Doctor,
    /// Generate shell completion scripts
    Completions {
        /// Shell type (bash, zsh, fish, powershell)
        shell: Shell,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    if !matches!(cli.command, Commands::Completions { .. }) {
        cli::init_tracing(cli.verbose, cli.log_json);
    }

    let result = match cli.command {
        Commands::Search {
            keywords,
            location,
            industry,
            max_results,
            no_details,
            output,
            format,
            cookies,
            headful,
            visit_cap,
        } => {
            cli::search_cmd::run(SearchArgs {
                keywords,
                location,
                industry,
                max_results,
                details: !no_details,
                output,
                format,
                cookies,
                headful,
                visit_cap,
                quiet: cli.quiet,
            })
            .await
        }
        Commands::Doctor => cli::doctor::run().await,
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "harvest", &mut std::io::stdout());
            Ok(())
        }
    };

    // Consistent exit codes: 0=success, 1=error
    if let Err(e) = &result {
        eprintln!("  Error: {e:#}");
        std::process::exit(1);
    }

    result
}
