// Copyright 2026 Harvest Contributors
// SPDX-License-Identifier: Apache-2.0

//! Session driver: permission, navigation, capture, fallback, merge, report.
//!
//! Visits are strictly sequential. The orchestrator owns the correlator and
//! the rate controller by value, so there is never more than one capture
//! window and nothing else can touch pacing state. The only concurrent piece
//! is the browser's interception task, which feeds a bounded channel drained
//! here between and during visits.

use crate::correlator::{CaptureWindow, ResponseCorrelator};
use crate::error::{HarvestError, HarvestResult, NavigationError, PacingError};
use crate::events::{emit, EventBus, HarvestEvent};
use crate::fallback::FallbackExtractor;
use crate::merger::RecordMerger;
use crate::pacing::{AdaptiveRateController, Admission, PacingConfig, RateStats};
use crate::session::{BrowserSession, NavigationOutcome, SearchFilter};
use crate::types::{
    Cursor, FieldGroup, InterceptedResponse, Outcome, Provenance, Record, SearchHit,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// People-search results page.
pub const SEARCH_PEOPLE_URL: &str = "https://www.linkedin.com/search/results/people/";

/// Hard ceiling on search pages per query.
pub const MAX_SEARCH_PAGES: u32 = 100;

/// Orchestrator tunables.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    pub navigation_timeout: Duration,
    /// How long to keep the window open after navigation settles.
    pub capture_settle: Duration,
    /// Clamped to [`MAX_SEARCH_PAGES`].
    pub max_search_pages: u32,
    pub results_per_page: usize,
    pub search_url: String,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            navigation_timeout: Duration::from_secs(30),
            capture_settle: Duration::from_millis(1500),
            max_search_pages: MAX_SEARCH_PAGES,
            results_per_page: 10,
            search_url: SEARCH_PEOPLE_URL.to_string(),
        }
    }
}

/// A people search, optionally narrowed by location and industry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchQuery {
    pub keywords: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub industry: Option<String>,
}

impl SearchQuery {
    pub fn new(keywords: impl Into<String>) -> Self {
        Self {
            keywords: keywords.into(),
            location: None,
            industry: None,
        }
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = non_blank(location.into());
        self
    }

    pub fn with_industry(mut self, industry: impl Into<String>) -> Self {
        self.industry = non_blank(industry.into());
        self
    }

    /// Filters to apply to the first results page, location first.
    pub fn filters(&self) -> Vec<SearchFilter> {
        let location = self.location.clone().map(SearchFilter::Location);
        let industry = self.industry.clone().map(SearchFilter::Industry);
        location.into_iter().chain(industry).collect()
    }

    /// Point an already filtered results URL at the 1-based `page`.
    pub fn repage(filtered: &str, page: u32) -> HarvestResult<String> {
        let mut url = url::Url::parse(filtered)
            .map_err(|e| HarvestError::InvalidInput(format!("search url {filtered}: {e}")))?;
        let kept: Vec<(String, String)> = url
            .query_pairs()
            .filter(|(k, _)| k != "page")
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        {
            let mut pairs = url.query_pairs_mut();
            pairs.clear().extend_pairs(kept);
            if page > 1 {
                pairs.append_pair("page", &page.to_string());
            }
        }
        Ok(url.into())
    }

    /// URL of the 1-based `page` of results.
    pub fn page_url(&self, base: &str, page: u32) -> HarvestResult<String> {
        let mut url = url::Url::parse(base)
            .map_err(|e| HarvestError::InvalidInput(format!("search url {base}: {e}")))?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs
                .append_pair("keywords", self.keywords.trim())
                .append_pair("origin", "SWITCH_SEARCH_VERTICAL");
            if page > 1 {
                pairs.append_pair("page", &page.to_string());
            }
        }
        Ok(url.into())
    }
}

fn non_blank(value: String) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Why pagination stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchStop {
    ResultCap,
    PageCap,
    NoCursor,
    RepeatedCursor,
    NavigationFailed,
    Cancelled,
    Halted,
}

/// Hits gathered by a search, in page order.
#[derive(Debug, Clone)]
pub struct SearchOutcome {
    pub hits: Vec<SearchHit>,
    pub pages: u32,
    pub stop: SearchStop,
}

/// How a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum Termination {
    /// Every requested subject was visited.
    Completed,
    Cancelled,
    Halted { consecutive_failures: u32 },
    VisitCapReached { cap: u32 },
    /// Fewer seeds than requested were available.
    SeedsExhausted,
}

impl Termination {
    /// Whether the session stopped before the work ran out.
    pub fn is_early(&self) -> bool {
        matches!(
            self,
            Self::Cancelled | Self::Halted { .. } | Self::VisitCapReached { .. }
        )
    }
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed => write!(f, "completed"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Halted {
                consecutive_failures,
            } => write!(f, "halted after {consecutive_failures} consecutive failures"),
            Self::VisitCapReached { cap } => write!(f, "visit cap of {cap} reached"),
            Self::SeedsExhausted => write!(f, "no more search results"),
        }
    }
}

/// What went wrong during one visit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    Navigation,
    Decode,
    Overflow,
    PageContent,
}

/// A per-subject note kept alongside the records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisitDiagnostic {
    pub public_id: String,
    pub kind: DiagnosticKind,
    pub message: String,
}

impl VisitDiagnostic {
    fn new(public_id: &str, kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self {
            public_id: public_id.to_string(),
            kind,
            message: message.into(),
        }
    }
}

/// Everything a session produced. Records are in visit order.
#[derive(Debug, Clone, Serialize)]
pub struct SessionReport {
    pub records: Vec<Record>,
    pub diagnostics: Vec<VisitDiagnostic>,
    pub termination: Termination,
    pub requested: usize,
    /// Pacing counters at the end of the session.
    pub pacing: RateStats,
}

impl SessionReport {
    /// `completed: N of M subjects processed`, or the early-exit variant.
    pub fn summary(&self) -> String {
        let n = self.records.len();
        let m = self.requested;
        if self.termination.is_early() {
            format!(
                "session ended early ({}): {n} of {m} subjects processed",
                self.termination
            )
        } else {
            format!("{}: {n} of {m} subjects processed", self.termination)
        }
    }
}

/// Result of one profile visit.
struct Visit {
    record: Record,
    outcome: Outcome,
    diagnostics: Vec<VisitDiagnostic>,
}

/// Where pagination starts once search filters were attempted.
enum FilterSetup {
    /// Page from this filtered URL, or from the plain query URL on `None`.
    Ready(Option<String>),
    Stopped(SearchStop),
}

/// One navigation's worth of captured traffic.
struct Capture {
    navigation: Result<NavigationOutcome, NavigationError>,
    window: CaptureWindow,
}

/// Drives a browser session through searches and profile visits.
pub struct VisitOrchestrator<S: BrowserSession> {
    session: S,
    responses: mpsc::Receiver<InterceptedResponse>,
    correlator: ResponseCorrelator,
    controller: AdaptiveRateController,
    extractor: FallbackExtractor,
    config: OrchestratorConfig,
    events: Option<EventBus>,
    records_out: Option<mpsc::UnboundedSender<Record>>,
    authenticated: bool,
}

impl<S: BrowserSession> VisitOrchestrator<S> {
    /// Subscribe to the session's traffic and build a fresh controller.
    pub fn new(mut session: S, config: OrchestratorConfig, pacing: PacingConfig) -> HarvestResult<Self> {
        let responses = session.subscribe()?;
        Ok(Self {
            session,
            responses,
            correlator: ResponseCorrelator::new(),
            controller: AdaptiveRateController::new(pacing),
            extractor: FallbackExtractor::new(),
            config,
            events: None,
            records_out: None,
            authenticated: false,
        })
    }

    /// Replace the rate controller (seeded jitter in tests).
    pub fn with_controller(mut self, mut controller: AdaptiveRateController) -> Self {
        if let Some(bus) = &self.events {
            controller.set_events(bus.clone());
        }
        self.controller = controller;
        self
    }

    pub fn with_correlator(mut self, correlator: ResponseCorrelator) -> Self {
        self.correlator = correlator;
        self
    }

    pub fn with_events(mut self, bus: EventBus) -> Self {
        self.controller.set_events(bus.clone());
        self.events = Some(bus);
        self
    }

    /// Also send every record as soon as it is merged, ahead of the report.
    pub fn with_record_sink(mut self, sink: mpsc::UnboundedSender<Record>) -> Self {
        self.records_out = Some(sink);
        self
    }

    pub fn controller(&self) -> &AdaptiveRateController {
        &self.controller
    }

    pub fn session(&self) -> &S {
        &self.session
    }

    pub fn into_session(self) -> S {
        self.session
    }

    /// Search, then visit the hits in order.
    ///
    /// With `with_details` off no profile is visited and every hit becomes a
    /// seed-only record.
    pub async fn run(
        &mut self,
        query: &SearchQuery,
        requested: usize,
        with_details: bool,
        cancel: &CancellationToken,
    ) -> HarvestResult<SessionReport> {
        let search = self.search(query, requested, cancel).await?;
        info!(
            "Search found {} profiles over {} pages ({:?})",
            search.hits.len(),
            search.pages,
            search.stop
        );

        if with_details {
            return self
                .visit_profiles(&search.hits, requested, query, cancel)
                .await;
        }

        let merger = RecordMerger::new(&query.keywords).with_location(query.location.clone());
        let records: Vec<Record> = search
            .hits
            .iter()
            .map(|hit| {
                let record = merger.merge(hit, &[]);
                self.stream(&record);
                record
            })
            .collect();
        let termination = match search.stop {
            SearchStop::Cancelled => Termination::Cancelled,
            SearchStop::Halted => Termination::Halted {
                consecutive_failures: self.controller.state().consecutive_failures,
            },
            _ if records.len() < requested => Termination::SeedsExhausted,
            _ => Termination::Completed,
        };
        Ok(self.finish(records, Vec::new(), termination, requested))
    }

    /// Collect up to `max_results` hits, paging while a fresh cursor shows up.
    ///
    /// With a location or industry set, the first page is opened once to
    /// apply the filters and pagination then follows the filtered results.
    pub async fn search(
        &mut self,
        query: &SearchQuery,
        max_results: usize,
        cancel: &CancellationToken,
    ) -> HarvestResult<SearchOutcome> {
        if query.keywords.trim().is_empty() {
            return Err(HarvestError::InvalidInput("search keywords are empty".into()));
        }
        self.ensure_authenticated().await?;

        let filtered = match self.apply_filters(query, cancel).await? {
            FilterSetup::Ready(filtered) => filtered,
            FilterSetup::Stopped(stop) => return Ok(self.search_finished(Vec::new(), 0, stop)),
        };

        let page_limit = self.page_limit(max_results);
        let mut hits: Vec<SearchHit> = Vec::new();
        let mut ids = HashSet::new();
        let mut cursors: HashSet<Cursor> = HashSet::new();
        let mut pages = 0u32;

        let stop = loop {
            if hits.len() >= max_results {
                break SearchStop::ResultCap;
            }
            if pages >= page_limit {
                break SearchStop::PageCap;
            }
            match self.controller.pace_page(cancel).await {
                Ok(Admission::Proceed) => {}
                Ok(Admission::Cancelled) => break SearchStop::Cancelled,
                Err(e) => {
                    warn!("Search stopped: {e}");
                    break SearchStop::Halted;
                }
            }

            pages += 1;
            let url = match &filtered {
                Some(base) => SearchQuery::repage(base, pages)?,
                None => query.page_url(&self.config.search_url, pages)?,
            };
            info!("Search page {pages}: {url}");
            let capture = self.capture(None, &url).await?;
            if let Err(e) = &capture.navigation {
                warn!("Search page {pages} failed: {e}");
                self.controller.report(Outcome::HardFailure);
                break SearchStop::NavigationFailed;
            }

            let (page_hits, cursor, provenance) = self.page_results(capture.window).await;
            let found = page_hits.len();
            for hit in page_hits {
                if hits.len() >= max_results {
                    break;
                }
                if ids.insert(hit.public_id.clone()) {
                    hits.push(hit);
                }
            }
            debug!(page = pages, found, total = hits.len(), "search page captured");
            emit(
                &self.events,
                HarvestEvent::SearchPageCaptured {
                    page: pages,
                    hits: found,
                    total_hits: hits.len(),
                    provenance,
                },
            );

            match cursor {
                None => break SearchStop::NoCursor,
                Some(cursor) if !cursors.insert(cursor.clone()) => {
                    debug!("cursor {cursor} already seen, stopping");
                    break SearchStop::RepeatedCursor;
                }
                Some(_) => {}
            }
        };

        Ok(self.search_finished(hits, pages, stop))
    }

    fn search_finished(&self, hits: Vec<SearchHit>, pages: u32, stop: SearchStop) -> SearchOutcome {
        emit(
            &self.events,
            HarvestEvent::SearchFinished {
                pages,
                hits: hits.len(),
            },
        );
        SearchOutcome { hits, pages, stop }
    }

    /// Open the first results page and narrow it with the query's filters.
    ///
    /// A filter that fails or is unsupported is skipped with a warning and
    /// the search goes on without it.
    async fn apply_filters(
        &mut self,
        query: &SearchQuery,
        cancel: &CancellationToken,
    ) -> HarvestResult<FilterSetup> {
        let filters = query.filters();
        if filters.is_empty() {
            return Ok(FilterSetup::Ready(None));
        }
        match self.controller.pace_page(cancel).await {
            Ok(Admission::Proceed) => {}
            Ok(Admission::Cancelled) => return Ok(FilterSetup::Stopped(SearchStop::Cancelled)),
            Err(e) => {
                warn!("Search stopped: {e}");
                return Ok(FilterSetup::Stopped(SearchStop::Halted));
            }
        }

        let url = query.page_url(&self.config.search_url, 1)?;
        let capture = self.capture(None, &url).await?;
        if let Err(e) = capture.navigation {
            warn!("Search page for filters failed: {e}");
            self.controller.report(Outcome::HardFailure);
            return Ok(FilterSetup::Stopped(SearchStop::NavigationFailed));
        }

        let mut filtered = None;
        for filter in &filters {
            match self.session.apply_search_filter(filter).await {
                Ok(Some(url)) => {
                    info!("Search filter applied: {filter}");
                    filtered = Some(url);
                }
                Ok(None) => warn!("Search filter not supported by this session: {filter}"),
                Err(e) => warn!("Could not apply search filter {filter}: {e}"),
            }
        }
        Ok(FilterSetup::Ready(filtered))
    }

    /// Visit up to `requested` seeds in order, producing one record each.
    ///
    /// Stops early on cancellation, halt or the visit cap; the records
    /// gathered so far are always returned. A visit in flight when
    /// cancellation arrives is completed and kept.
    pub async fn visit_profiles(
        &mut self,
        seeds: &[SearchHit],
        requested: usize,
        query: &SearchQuery,
        cancel: &CancellationToken,
    ) -> HarvestResult<SessionReport> {
        self.ensure_authenticated().await?;

        let merger = RecordMerger::new(&query.keywords).with_location(query.location.clone());
        let total = requested.min(seeds.len());
        let mut records = Vec::with_capacity(total);
        let mut diagnostics = Vec::new();
        let mut stopped = None;

        for (index, seed) in seeds.iter().take(total).enumerate() {
            if cancel.is_cancelled() {
                stopped = Some(Termination::Cancelled);
                break;
            }
            match self.controller.admit(cancel).await {
                Ok(Admission::Proceed) => {}
                Ok(Admission::Cancelled) => {
                    stopped = Some(Termination::Cancelled);
                    break;
                }
                Err(PacingError::Halted {
                    consecutive_failures,
                }) => {
                    stopped = Some(Termination::Halted {
                        consecutive_failures,
                    });
                    break;
                }
                Err(PacingError::VisitCapReached { cap }) => {
                    stopped = Some(Termination::VisitCapReached { cap });
                    break;
                }
            }

            info!("[{}/{}] Visiting {}", index + 1, total, seed.public_id);
            emit(
                &self.events,
                HarvestEvent::VisitStarted {
                    index: index + 1,
                    total,
                    public_id: seed.public_id.clone(),
                },
            );

            let visit = self.visit(seed, &merger).await?;
            self.controller.report(visit.outcome);
            emit(
                &self.events,
                HarvestEvent::VisitFinished {
                    index: index + 1,
                    total,
                    public_id: seed.public_id.clone(),
                    outcome: visit.outcome,
                    groups: visit.record.fields.groups().len(),
                },
            );
            self.stream(&visit.record);
            records.push(visit.record);
            diagnostics.extend(visit.diagnostics);
        }

        let termination = stopped.unwrap_or_else(|| {
            if records.len() >= requested {
                Termination::Completed
            } else if self.controller.is_halted() {
                Termination::Halted {
                    consecutive_failures: self.controller.state().consecutive_failures,
                }
            } else {
                Termination::SeedsExhausted
            }
        });
        Ok(self.finish(records, diagnostics, termination, requested))
    }

    // ── Internals ──

    async fn ensure_authenticated(&mut self) -> HarvestResult<()> {
        if self.authenticated {
            return Ok(());
        }
        if !self.session.is_authenticated().await? {
            return Err(HarvestError::Unauthenticated);
        }
        self.authenticated = true;
        Ok(())
    }

    fn page_limit(&self, max_results: usize) -> u32 {
        let per_page = self.config.results_per_page.max(1);
        // One spare page absorbs duplicates across pages.
        let needed = u32::try_from(max_results.div_ceil(per_page)).unwrap_or(u32::MAX);
        needed
            .saturating_add(1)
            .min(self.config.max_search_pages.min(MAX_SEARCH_PAGES))
    }

    fn stream(&self, record: &Record) {
        if let Some(sink) = &self.records_out {
            if sink.send(record.clone()).is_err() {
                debug!("record sink closed; {} kept for the report only", record.public_id);
            }
        }
    }

    /// Feed everything buffered so far to the correlator.
    fn drain(&mut self) -> usize {
        let mut seen = 0;
        while let Ok(response) = self.responses.try_recv() {
            self.correlator.observe(&response);
            seen += 1;
        }
        seen
    }

    /// Navigate with a window open and return what it captured.
    async fn capture(&mut self, subject: Option<&str>, url: &str) -> HarvestResult<Capture> {
        let stale = self.drain();
        if stale > 0 {
            debug!(stale, "discarded responses that arrived between windows");
        }

        self.correlator.open(subject)?;
        let navigation = self
            .session
            .navigate(url, self.config.navigation_timeout)
            .await
            .and_then(|outcome| outcome.check_blocked(url));

        if navigation.is_ok() {
            if subject.is_some() {
                if let Err(e) = self.session.reveal_contact_info().await {
                    debug!("contact overlay not opened: {e}");
                }
            }
            tokio::time::sleep(self.config.capture_settle).await;
        }
        self.drain();

        let window = self.correlator.close().ok_or(HarvestError::WindowNotOpen)?;
        Ok(Capture { navigation, window })
    }

    async fn visit(&mut self, seed: &SearchHit, merger: &RecordMerger) -> HarvestResult<Visit> {
        let id = seed.public_id.as_str();
        let capture = self.capture(Some(id), &seed.profile_url).await?;
        let mut diagnostics = window_diagnostics(id, &capture.window);
        let mut fragments = capture.window.into_fragments();

        if let Err(e) = capture.navigation {
            warn!("Visit to {id} failed: {e}");
            diagnostics.push(VisitDiagnostic::new(id, DiagnosticKind::Navigation, e.to_string()));
            return Ok(Visit {
                record: merger.merge(seed, &fragments),
                outcome: Outcome::HardFailure,
                diagnostics,
            });
        }

        let missing = RecordMerger::missing_groups(seed, &fragments);
        let reachable = missing
            .iter()
            .any(|g| !matches!(g, FieldGroup::Industry | FieldGroup::Twitter));
        if reachable {
            match self.session.page_content().await {
                Ok(html) => {
                    if let Some(fragment) = self.extractor.extract(&html, &missing, id) {
                        fragments.push(fragment);
                    }
                }
                Err(e) => {
                    debug!("page content for {id} unavailable: {e}");
                    diagnostics.push(VisitDiagnostic::new(
                        id,
                        DiagnosticKind::PageContent,
                        e.to_string(),
                    ));
                }
            }
        }

        let record = merger.merge(seed, &fragments);
        let outcome = if record.has_non_identity() {
            Outcome::Success
        } else {
            Outcome::SoftFailure
        };
        Ok(Visit {
            record,
            outcome,
            diagnostics,
        })
    }

    /// Hits and cursor of one search page, falling back to result cards when
    /// the API yielded nothing.
    async fn page_results(
        &mut self,
        window: CaptureWindow,
    ) -> (Vec<SearchHit>, Option<Cursor>, Provenance) {
        let mut hits = Vec::new();
        let mut cursor = None;
        for page in window.search_pages() {
            hits.extend(page.hits.iter().cloned());
            if page.cursor.is_some() {
                cursor = page.cursor.clone();
            }
        }
        if !hits.is_empty() {
            return (hits, cursor, Provenance::Api);
        }

        match self.session.page_content().await {
            Ok(html) => {
                let hits = self
                    .extractor
                    .search_fragment(&html)
                    .and_then(|fragment| fragment.search_page().map(|page| page.hits.clone()))
                    .unwrap_or_default();
                if !hits.is_empty() {
                    debug!("search page parsed from result cards: {} hits", hits.len());
                }
                // Result cards never carry a cursor; an API cursor still counts.
                (hits, cursor, Provenance::Dom)
            }
            Err(e) => {
                debug!("search page content unavailable: {e}");
                (Vec::new(), cursor, Provenance::Dom)
            }
        }
    }

    fn finish(
        &self,
        records: Vec<Record>,
        diagnostics: Vec<VisitDiagnostic>,
        termination: Termination,
        requested: usize,
    ) -> SessionReport {
        let report = SessionReport {
            records,
            diagnostics,
            termination,
            requested,
            pacing: self.controller.stats(),
        };
        let summary = report.summary();
        if termination.is_early() {
            warn!("{summary}");
        } else {
            info!("{summary}");
        }
        emit(
            &self.events,
            HarvestEvent::SessionFinished {
                records: report.records.len(),
                requested,
                summary,
            },
        );
        report
    }
}

fn window_diagnostics(public_id: &str, window: &CaptureWindow) -> Vec<VisitDiagnostic> {
    let mut out: Vec<VisitDiagnostic> = window
        .decode_errors()
        .iter()
        .map(|e| VisitDiagnostic::new(public_id, DiagnosticKind::Decode, e.to_string()))
        .collect();
    if window.dropped() > 0 {
        out.push(VisitDiagnostic::new(
            public_id,
            DiagnosticKind::Overflow,
            format!("{} fragments dropped, capture window full", window.dropped()),
        ));
    }
    out
}
