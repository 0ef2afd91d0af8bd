// Copyright 2026 Harvest Contributors
// SPDX-License-Identifier: Apache-2.0

//! Terminal progress fed by the session event bus.

use harvest_core::{HarvestEvent, PauseKind};
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::debug;

const BAR_TEMPLATE: &str =
    "{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} {msg}";

/// Render events until the session finishes or the bus closes.
pub fn spawn(
    mut events: broadcast::Receiver<HarvestEvent>,
    requested: u64,
    hidden: bool,
) -> JoinHandle<()> {
    let bar = if hidden {
        ProgressBar::hidden()
    } else {
        ProgressBar::new(requested)
    };
    let style = ProgressStyle::with_template(BAR_TEMPLATE)
        .map(|style| style.progress_chars("#>-"))
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    bar.set_style(style);
    bar.enable_steady_tick(Duration::from_millis(120));
    bar.set_message("searching");

    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    apply(&bar, &event);
                    if event.is_terminal() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => debug!("progress skipped {skipped} events"),
                Err(RecvError::Closed) => break,
            }
        }
        if !bar.is_finished() {
            bar.finish_and_clear();
        }
    })
}

fn apply(bar: &ProgressBar, event: &HarvestEvent) {
    match event {
        HarvestEvent::SearchFinished { hits, .. } => {
            bar.set_length(*hits as u64);
            bar.set_position(0);
        }
        HarvestEvent::VisitStarted { total, .. } => bar.set_length(*total as u64),
        HarvestEvent::VisitFinished { index, .. } => bar.set_position(*index as u64),
        HarvestEvent::Halted { .. } => {
            bar.abandon_with_message(describe(event));
            return;
        }
        HarvestEvent::SessionFinished { summary, .. } => {
            bar.finish_with_message(summary.clone());
            return;
        }
        _ => {}
    }
    bar.set_message(describe(event));
}

/// One-line status text for an event.
pub fn describe(event: &HarvestEvent) -> String {
    match event {
        HarvestEvent::SearchPageCaptured {
            page, total_hits, ..
        } => format!("search page {page}: {total_hits} profiles"),
        HarvestEvent::SearchFinished { pages, hits } => {
            format!("found {hits} profiles over {pages} pages")
        }
        HarvestEvent::PauseStarted { kind, delay_ms } => {
            let secs = *delay_ms as f64 / 1000.0;
            match kind {
                PauseKind::Long => format!("taking a long break ({secs:.0}s)"),
                PauseKind::Visit | PauseKind::SearchPage => format!("waiting {secs:.1}s"),
            }
        }
        HarvestEvent::VisitStarted { public_id, .. } => format!("visiting {public_id}"),
        HarvestEvent::VisitFinished {
            public_id,
            outcome,
            groups,
            ..
        } => format!("{public_id}: {outcome:?} ({groups} field groups)"),
        HarvestEvent::Halted {
            consecutive_failures,
        } => format!("halted after {consecutive_failures} consecutive failures"),
        HarvestEvent::SessionFinished { summary, .. } => summary.clone(),
    }
}
