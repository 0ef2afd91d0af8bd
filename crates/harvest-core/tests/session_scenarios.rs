// Copyright 2026 Harvest Contributors
// SPDX-License-Identifier: Apache-2.0

//! End-to-end visit scenarios against a scripted browser session.

mod common;

use common::*;
use harvest_core::{
    CancellationToken, FieldGroup, FieldSource, HarvestError, HarvestEvent, InterceptedResponse,
    NavigationError, PacingConfig, Provenance, RatePhase, SearchHit, SearchQuery, Termination,
};
use harvest_core::orchestrator::{DiagnosticKind, SEARCH_PEOPLE_URL};
use harvest_core::EventBus;
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};

fn seed(id: &str, name: &str) -> SearchHit {
    SearchHit::new(id, Provenance::Api)
        .with_name(name)
        .with_headline("from search")
        .with_location("Earth")
}

fn query() -> SearchQuery {
    SearchQuery::new("q")
}

fn seeds(n: usize) -> Vec<SearchHit> {
    (0..n).map(|i| seed(&format!("p{i}"), &format!("Person {i}"))).collect()
}

fn profile_page(id: &str) -> ScriptedPage {
    ScriptedPage::new().api(profile_api_url(id), profile_body(id, "First", id, "Computing"))
}

#[tokio::test(start_paused = true)]
async fn test_three_subjects_api_mixed_and_timeout() {
    let ada = seed("ada", "Ada L.");
    let bob = seed("bob", "Bob M.");
    let cyd = seed("cyd", "Cyd N.");

    let session = ScriptedSession::new()
        .page(
            &ada.profile_url,
            ScriptedPage::new()
                .api(profile_api_url("ada"), profile_body("ada", "Ada", "Lovelace", "Computing"))
                .api(contact_api_url("ada"), contact_body("ada@api.example"))
                .html(email_html("ada@dom.example")),
        )
        .page(
            &bob.profile_url,
            ScriptedPage::new()
                .api(profile_api_url("bob"), profile_body("bob", "Bob", "Marley", "Music"))
                .html(email_html("bob@dom.example")),
        )
        .page(
            &cyd.profile_url,
            ScriptedPage::new().fails(NavigationError::Timeout {
                url: cyd.profile_url.clone(),
                after_ms: 30_000,
            }),
        );
    let mut orchestrator = orchestrator(session);
    let cancel = CancellationToken::new();

    let report = assert_ok!(
        orchestrator
            .visit_profiles(&[ada, bob, cyd], 3, &SearchQuery::new("engineers"), &cancel)
            .await
    );

    assert_eq!(report.records.len(), 3);
    assert_eq!(report.termination, Termination::Completed);

    let ada = &report.records[0];
    assert_eq!(ada.fields.name.as_deref(), Some("Ada Lovelace"));
    assert_eq!(ada.fields.email.as_deref(), Some("ada@api.example"));
    assert_eq!(ada.source(FieldGroup::Email), FieldSource::Api);
    assert_eq!(ada.source(FieldGroup::Industry), FieldSource::Api);
    assert_eq!(ada.search_query, "engineers");
    assert_eq!(ada.search_location, None);

    let bob = &report.records[1];
    assert_eq!(bob.source(FieldGroup::Name), FieldSource::Api);
    assert_eq!(bob.fields.email.as_deref(), Some("bob@dom.example"));
    assert_eq!(bob.source(FieldGroup::Email), FieldSource::Dom);

    let cyd = &report.records[2];
    assert_eq!(cyd.fields.name.as_deref(), Some("Cyd N."));
    assert!(!cyd.has_non_identity());
    assert_eq!(cyd.source(FieldGroup::Email), FieldSource::Absent);

    let nav_failures: Vec<_> = report
        .diagnostics
        .iter()
        .filter(|d| d.kind == DiagnosticKind::Navigation)
        .collect();
    assert_eq!(nav_failures.len(), 1);
    assert_eq!(nav_failures[0].public_id, "cyd");

    let state = orchestrator.controller().state();
    assert_eq!(state.consecutive_failures, 1);
    assert_eq!(state.consecutive_hard_failures, 1);
    assert_eq!(state.total_visits, 3);

    assert_eq!(report.pacing.total_visits, 3);
    assert_eq!(report.pacing.consecutive_hard_failures, 1);
    assert_eq!(report.pacing.phase, RatePhase::Backoff);
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_keeps_in_flight_visit() {
    let seeds = seeds(10);
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();

    let mut session = ScriptedSession::new().on_navigate(move |count| {
        if count == 2 {
            trigger.cancel();
        }
    });
    for s in &seeds {
        session = session.page(&s.profile_url, profile_page(&s.public_id));
    }
    let navigations = session.navigations();
    let mut orchestrator = orchestrator(session);

    let report = assert_ok!(orchestrator.visit_profiles(&seeds, 10, &query(), &cancel).await);

    assert_eq!(report.records.len(), 2);
    assert_eq!(report.termination, Termination::Cancelled);
    assert_eq!(navigations.lock().unwrap().len(), 2);
    assert_eq!(
        report.summary(),
        "session ended early (cancelled): 2 of 10 subjects processed"
    );
}

#[tokio::test(start_paused = true)]
async fn test_halts_after_consecutive_hard_failures() {
    let seeds = seeds(10);
    let mut session = ScriptedSession::new();
    for s in &seeds {
        session = session.page(
            &s.profile_url,
            ScriptedPage::new().fails(NavigationError::Failed {
                url: s.profile_url.clone(),
                reason: "net::ERR_CONNECTION_RESET".into(),
            }),
        );
    }
    let navigations = session.navigations();
    let mut orchestrator = orchestrator(session);
    let cancel = CancellationToken::new();

    let report = assert_ok!(orchestrator.visit_profiles(&seeds, 10, &query(), &cancel).await);

    assert_eq!(report.records.len(), 3);
    assert_eq!(
        report.termination,
        Termination::Halted {
            consecutive_failures: 3
        }
    );
    assert_eq!(navigations.lock().unwrap().len(), 3);
    assert_eq!(orchestrator.controller().state().phase, RatePhase::Halted);

    // Halted is terminal for the rest of the session.
    let again = assert_ok!(orchestrator.visit_profiles(&seeds, 1, &query(), &cancel).await);
    assert!(again.records.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_soft_failures_halt_at_failure_threshold() {
    let seeds = seeds(8);
    let mut session = ScriptedSession::new();
    for s in &seeds {
        // Loads fine but yields nothing beyond the seed.
        session = session.page(&s.profile_url, ScriptedPage::new().html("<html></html>"));
    }
    let mut orchestrator = orchestrator(session);
    let cancel = CancellationToken::new();

    let report = assert_ok!(orchestrator.visit_profiles(&seeds, 8, &query(), &cancel).await);
    assert_eq!(report.records.len(), 5);
    assert!(matches!(report.termination, Termination::Halted { .. }));
    assert!(report.records.iter().all(|r| !r.has_non_identity()));
}

#[tokio::test(start_paused = true)]
async fn test_blocking_status_is_a_hard_failure() {
    let ada = seed("ada", "Ada L.");
    let session = ScriptedSession::new().page(
        &ada.profile_url,
        profile_page("ada").status(999),
    );
    let mut orchestrator = orchestrator(session);
    let cancel = CancellationToken::new();

    let report = assert_ok!(orchestrator.visit_profiles(&[ada], 1, &query(), &cancel).await);

    // Responses delivered before the failure are still merged.
    let record = &report.records[0];
    assert_eq!(record.source(FieldGroup::Industry), FieldSource::Api);
    assert_eq!(orchestrator.controller().state().consecutive_hard_failures, 1);
    assert!(report.diagnostics[0].message.contains("999"));
}

#[tokio::test(start_paused = true)]
async fn test_stale_traffic_is_not_attributed() {
    let bob = seed("bob", "Bob M.");
    let session = ScriptedSession::new().page(&bob.profile_url, profile_page("bob"));
    let sender = session.sender();
    let mut orchestrator = orchestrator(session);

    // Arrives before bob's window opens.
    sender
        .send(InterceptedResponse::new(
            contact_api_url("bob"),
            200,
            contact_body("late@example.com").to_string(),
        ))
        .await
        .unwrap();

    let cancel = CancellationToken::new();
    let report = assert_ok!(orchestrator.visit_profiles(&[bob], 1, &query(), &cancel).await);
    assert!(report.records[0].fields.email.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_malformed_body_is_a_diagnostic_not_a_failure() {
    let ada = seed("ada", "Ada L.");
    let session = ScriptedSession::new().page(
        &ada.profile_url,
        profile_page("ada").raw(contact_api_url("ada"), 200, "<html>oops</html>"),
    );
    let mut orchestrator = orchestrator(session);
    let cancel = CancellationToken::new();

    let report = assert_ok!(orchestrator.visit_profiles(&[ada], 1, &query(), &cancel).await);
    assert_eq!(report.termination, Termination::Completed);
    assert_eq!(report.records[0].source(FieldGroup::Industry), FieldSource::Api);
    assert_eq!(report.diagnostics.len(), 1);
    assert_eq!(report.diagnostics[0].kind, DiagnosticKind::Decode);
}

#[tokio::test(start_paused = true)]
async fn test_unauthenticated_session_fails_before_any_visit() {
    let session = ScriptedSession::new().logged_out();
    let navigations = session.navigations();
    let mut orchestrator = orchestrator(session);
    let cancel = CancellationToken::new();

    let err = assert_err!(orchestrator.visit_profiles(&seeds(2), 2, &query(), &cancel).await);
    assert!(matches!(err, HarvestError::Unauthenticated));
    assert!(navigations.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_visit_cap_and_seed_exhaustion() {
    let seeds = seeds(4);
    let mut session = ScriptedSession::new();
    for s in &seeds {
        session = session.page(&s.profile_url, profile_page(&s.public_id));
    }
    let pacing = PacingConfig {
        visit_cap: 2,
        ..PacingConfig::default()
    };
    let mut capped = orchestrator_with(session, pacing);
    let cancel = CancellationToken::new();

    let report = assert_ok!(capped.visit_profiles(&seeds, 4, &query(), &cancel).await);
    assert_eq!(report.records.len(), 2);
    assert_eq!(report.termination, Termination::VisitCapReached { cap: 2 });

    let mut session = ScriptedSession::new();
    for s in &seeds {
        session = session.page(&s.profile_url, profile_page(&s.public_id));
    }
    let mut uncapped = orchestrator(session);
    let report = assert_ok!(uncapped.visit_profiles(&seeds, 6, &query(), &cancel).await);
    assert_eq!(report.records.len(), 4);
    assert_eq!(report.termination, Termination::SeedsExhausted);
}

#[tokio::test(start_paused = true)]
async fn test_run_without_details_makes_seed_records() {
    let query = SearchQuery::new("rust");
    let url = assert_ok!(query.page_url(SEARCH_PEOPLE_URL, 1));
    let session = ScriptedSession::new().page(
        url,
        ScriptedPage::new().api(search_api_url(1), search_body(&["ann", "ben"], None)),
    );
    let navigations = session.navigations();
    let bus = EventBus::new(64);
    let mut events = bus.subscribe();
    let mut orchestrator = orchestrator(session).with_events(bus);
    let cancel = CancellationToken::new();

    let report = assert_ok!(orchestrator.run(&query, 5, false, &cancel).await);
    assert_eq!(report.records.len(), 2);
    assert_eq!(report.termination, Termination::SeedsExhausted);
    assert_eq!(report.records[0].public_id, "ann");
    assert_eq!(report.records[0].source(FieldGroup::Headline), FieldSource::Api);
    assert_eq!(navigations.lock().unwrap().len(), 1);

    let mut finished = false;
    while let Ok(event) = events.try_recv() {
        if let HarvestEvent::SessionFinished { records, .. } = event {
            assert_eq!(records, 2);
            finished = true;
        }
    }
    assert!(finished);
}

#[tokio::test(start_paused = true)]
async fn test_pacing_waits_between_visits() {
    let seeds = seeds(2);
    let mut session = ScriptedSession::new();
    for s in &seeds {
        session = session.page(&s.profile_url, profile_page(&s.public_id));
    }
    let mut orchestrator = orchestrator(session);
    let cancel = CancellationToken::new();

    let started = tokio::time::Instant::now();
    assert_ok!(orchestrator.visit_profiles(&seeds, 2, &query(), &cancel).await);
    // Two jittered delays of at least 3s plus two settle intervals.
    assert!(started.elapsed() >= Duration::from_secs(9));
}

#[tokio::test(start_paused = true)]
async fn test_record_sink_receives_records_as_visits_finish() {
    let seeds = seeds(5);
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

    let mut session = ScriptedSession::new().on_navigate(move |count| {
        if count == 3 {
            trigger.cancel();
        }
    });
    for s in &seeds {
        session = session.page(&s.profile_url, profile_page(&s.public_id));
    }
    let query = SearchQuery::new("rust").with_location("Lisbon");
    let mut orchestrator = orchestrator(session).with_record_sink(tx);

    let report = assert_ok!(orchestrator.visit_profiles(&seeds, 5, &query, &cancel).await);
    drop(orchestrator);

    let mut streamed = Vec::new();
    while let Some(record) = rx.recv().await {
        streamed.push(record);
    }
    assert_eq!(report.termination, Termination::Cancelled);
    assert_eq!(streamed, report.records);
    assert_eq!(streamed.len(), 3);
    assert!(streamed
        .iter()
        .all(|r| r.search_location.as_deref() == Some("Lisbon")));
}
