// Copyright 2026 Harvest Contributors
// SPDX-License-Identifier: Apache-2.0

//! `harvest search`: run one paced session and export what it gathered.

use crate::auth;
use crate::config::RuntimeConfig;
use crate::export::{self, ExportFormat};
use crate::renderer::{ChromiumSession, LaunchOptions};
use anyhow::{Context, Result};
use harvest_core::{
    CancellationToken, EventBus, HarvestError, SearchQuery, SessionReport, VisitOrchestrator,
};
use std::path::PathBuf;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Options for one search session.
#[derive(Debug, Clone)]
pub struct SearchArgs {
    pub keywords: String,
    pub location: Option<String>,
    pub industry: Option<String>,
    pub max_results: usize,
    /// Visit every hit's profile; off yields search-card records only.
    pub details: bool,
    pub output: Option<PathBuf>,
    pub format: ExportFormat,
    pub cookies: Option<PathBuf>,
    pub headful: bool,
    pub visit_cap: Option<u32>,
    pub quiet: bool,
}

/// Apply command-line overrides on top of the environment.
pub fn apply_overrides(mut config: RuntimeConfig, args: &SearchArgs) -> RuntimeConfig {
    if let Some(path) = &args.cookies {
        config.cookie_file = path.clone();
    }
    if args.headful {
        config.headless = false;
    }
    if let Some(cap) = args.visit_cap {
        config.pacing.visit_cap = cap.max(1);
    }
    config
}

/// The query the flags describe; blank filters are dropped.
pub fn search_query(args: &SearchArgs) -> SearchQuery {
    let mut query = SearchQuery::new(args.keywords.trim());
    if let Some(location) = &args.location {
        query = query.with_location(location.as_str());
    }
    if let Some(industry) = &args.industry {
        query = query.with_industry(industry.as_str());
    }
    query
}

pub async fn run(args: SearchArgs) -> Result<()> {
    let config = apply_overrides(RuntimeConfig::from_env(), &args);
    let query = search_query(&args);
    if query.keywords.is_empty() {
        anyhow::bail!("search keywords must not be empty");
    }

    let cap = config.pacing.effective_visit_cap() as usize;
    if args.details && args.max_results > cap {
        warn!(
            "{} results requested but at most {cap} profiles are visited per session",
            args.max_results
        );
    }

    let cookies = auth::load_session_cookies(&config.cookie_file)?;
    let session = ChromiumSession::launch(&LaunchOptions {
        executable: config.chromium_path.clone(),
        headless: config.headless,
        ..LaunchOptions::default()
    })
    .await?;
    session.install_cookies(&cookies).await?;

    let bus = EventBus::default();
    let progress = super::progress::spawn(bus.subscribe(), args.max_results as u64, args.quiet);

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted; finishing the current visit and saving results");
            on_interrupt.cancel();
        }
    });

    let path = export::resolve_output(
        args.output.clone(),
        &config.output_dir,
        &query.keywords,
        args.format,
    );

    let mut orchestrator =
        VisitOrchestrator::new(session, config.orchestrator.clone(), config.pacing.clone())?
            .with_events(bus);
    let streaming = match args.format {
        ExportFormat::Jsonl => {
            let (tx, rx) = mpsc::unbounded_channel();
            orchestrator = orchestrator.with_record_sink(tx);
            Some(tokio::spawn(export::stream_jsonl(path.clone(), rx)))
        }
        ExportFormat::Json => None,
    };
    let outcome = orchestrator
        .run(&query, args.max_results, args.details, &cancel)
        .await;

    // Dropping the orchestrator closes the record sink.
    if let Err(e) = orchestrator.into_session().close().await {
        warn!("browser did not shut down cleanly: {e:#}");
    }
    let streamed = match streaming {
        Some(task) => match task.await {
            Ok(Ok(written)) => written,
            Ok(Err(e)) => {
                warn!("streaming export stopped: {e:#}");
                0
            }
            Err(e) => {
                warn!("streaming export task failed: {e}");
                0
            }
        },
        None => 0,
    };
    if streamed > 0 {
        info!("streamed {streamed} records to {}", path.display());
    }

    let report = match outcome {
        Ok(report) => report,
        Err(HarvestError::Unauthenticated) => {
            progress.abort();
            anyhow::bail!(
                "session is not logged in; export fresh cookies to {}",
                config.cookie_file.display()
            );
        }
        Err(e) => {
            progress.abort();
            return Err(e).context("search session failed");
        }
    };
    let _ = progress.await;

    // A complete stream is the export; anything else is rewritten whole.
    if streamed == 0 || streamed != report.records.len() {
        let written = export::write_records(&path, args.format, &report.records)?;
        info!("wrote {written} records to {}", path.display());
    }

    if !args.quiet {
        print_summary(&report, &path);
    }
    Ok(())
}

fn print_summary(report: &SessionReport, path: &std::path::Path) {
    eprintln!();
    eprintln!("  {}", report.summary());
    if !report.diagnostics.is_empty() {
        eprintln!("  {} visit problems:", report.diagnostics.len());
        for diagnostic in &report.diagnostics {
            eprintln!(
                "    {} ({:?}): {}",
                diagnostic.public_id, diagnostic.kind, diagnostic.message
            );
        }
    }
    let pacing = &report.pacing;
    eprintln!(
        "  {} of {} profile visits used in {:.0}s (backoff x{:.1}, {})",
        pacing.total_visits,
        pacing.visit_cap,
        pacing.elapsed_secs,
        pacing.multiplier,
        pacing.phase
    );
    eprintln!("  Saved {} records to {}", report.records.len(), path.display());
}
