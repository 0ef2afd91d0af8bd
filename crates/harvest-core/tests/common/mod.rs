// Copyright 2026 Harvest Contributors
// SPDX-License-Identifier: Apache-2.0

//! Scripted in-memory browser session shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use harvest_core::{
    AdaptiveRateController, BrowserSession, InterceptedResponse, NavigationError,
    NavigationOutcome, OrchestratorConfig, PacingConfig, SearchFilter, SessionError,
    VisitOrchestrator,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

pub const API: &str = "https://www.linkedin.com/voyager/api";

/// Everything a URL does when navigated to.
#[derive(Clone, Default)]
pub struct ScriptedPage {
    responses: Vec<(String, u16, String)>,
    html: String,
    status: Option<u16>,
    failure: Option<NavigationError>,
}

impl ScriptedPage {
    pub fn new() -> Self {
        Self::default()
    }

    /// An API response delivered during navigation.
    pub fn api(mut self, url: impl Into<String>, body: Value) -> Self {
        self.responses.push((url.into(), 200, body.to_string()));
        self
    }

    pub fn raw(mut self, url: impl Into<String>, status: u16, body: &str) -> Self {
        self.responses.push((url.into(), status, body.to_string()));
        self
    }

    pub fn html(mut self, html: impl Into<String>) -> Self {
        self.html = html.into();
        self
    }

    pub fn status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    /// Navigation fails after delivering any scripted responses.
    pub fn fails(mut self, error: NavigationError) -> Self {
        self.failure = Some(error);
        self
    }
}

type Hook = Box<dyn FnMut(usize) + Send>;

pub struct ScriptedSession {
    pages: HashMap<String, ScriptedPage>,
    tx: mpsc::Sender<InterceptedResponse>,
    rx: Option<mpsc::Receiver<InterceptedResponse>>,
    authenticated: bool,
    current: Option<String>,
    navigations: Arc<Mutex<Vec<String>>>,
    on_navigate: Option<Hook>,
    filters: HashMap<SearchFilter, String>,
}

impl ScriptedSession {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel(64);
        Self {
            pages: HashMap::new(),
            tx,
            rx: Some(rx),
            authenticated: true,
            current: None,
            navigations: Arc::new(Mutex::new(Vec::new())),
            on_navigate: None,
            filters: HashMap::new(),
        }
    }

    pub fn page(mut self, url: impl Into<String>, page: ScriptedPage) -> Self {
        self.pages.insert(url.into(), page);
        self
    }

    /// Applying `filter` leads to the results at `url`; unscripted filters
    /// are unsupported.
    pub fn filter(mut self, filter: SearchFilter, url: impl Into<String>) -> Self {
        self.filters.insert(filter, url.into());
        self
    }

    pub fn logged_out(mut self) -> Self {
        self.authenticated = false;
        self
    }

    /// Called with the 1-based navigation count before each navigation.
    pub fn on_navigate(mut self, hook: impl FnMut(usize) + Send + 'static) -> Self {
        self.on_navigate = Some(Box::new(hook));
        self
    }

    /// Push traffic outside any navigation.
    pub fn sender(&self) -> mpsc::Sender<InterceptedResponse> {
        self.tx.clone()
    }

    /// Shared log of navigated URLs.
    pub fn navigations(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.navigations)
    }
}

#[async_trait]
impl BrowserSession for ScriptedSession {
    async fn is_authenticated(&mut self) -> Result<bool, SessionError> {
        Ok(self.authenticated)
    }

    fn subscribe(&mut self) -> Result<mpsc::Receiver<InterceptedResponse>, SessionError> {
        self.rx
            .take()
            .ok_or_else(|| SessionError::Interception("already subscribed".into()))
    }

    async fn navigate(
        &mut self,
        url: &str,
        _timeout: Duration,
    ) -> Result<NavigationOutcome, NavigationError> {
        let count = {
            let mut log = self.navigations.lock().unwrap();
            log.push(url.to_string());
            log.len()
        };
        if let Some(hook) = self.on_navigate.as_mut() {
            hook(count);
        }

        let Some(page) = self.pages.get(url).cloned() else {
            return Err(NavigationError::Failed {
                url: url.to_string(),
                reason: "no scripted page".into(),
            });
        };
        for (response_url, status, body) in page.responses {
            let _ = self
                .tx
                .try_send(InterceptedResponse::new(response_url, status, body));
        }
        self.current = Some(url.to_string());
        if let Some(error) = page.failure {
            return Err(error);
        }
        Ok(NavigationOutcome {
            final_url: url.to_string(),
            status: page.status.or(Some(200)),
        })
    }

    async fn page_content(&mut self) -> Result<String, SessionError> {
        self.current
            .as_ref()
            .and_then(|url| self.pages.get(url))
            .map(|page| page.html.clone())
            .ok_or_else(|| SessionError::Content("no page loaded".into()))
    }

    async fn apply_search_filter(
        &mut self,
        filter: &SearchFilter,
    ) -> Result<Option<String>, SessionError> {
        if self.current.is_none() {
            return Err(SessionError::Content("no results page loaded".into()));
        }
        Ok(self.filters.get(filter).cloned())
    }
}

// ── Fixtures ──

pub fn profile_api_url(id: &str) -> String {
    format!("{API}/identity/dash/profiles?q=memberIdentity&memberIdentity={id}")
}

pub fn contact_api_url(id: &str) -> String {
    format!("{API}/identity/profiles/{id}/profileContactInfo")
}

pub fn search_api_url(page: u32) -> String {
    format!("{API}/search/dash/clusters?q=all&start={}", (page - 1) * 10)
}

pub fn profile_body(id: &str, first: &str, last: &str, industry: &str) -> Value {
    json!({
        "included": [{
            "$type": "com.linkedin.voyager.identity.profile.Profile",
            "publicIdentifier": id,
            "entityUrn": format!("urn:li:fs_profile:{id}-urn"),
            "firstName": first,
            "lastName": last,
            "headline": format!("{first} at work"),
            "industryName": industry
        }]
    })
}

pub fn contact_body(email: &str) -> Value {
    json!({ "data": { "emailAddress": email } })
}

/// A search page body with `ids` as mini profiles.
pub fn search_body(ids: &[&str], cursor: Option<&str>) -> Value {
    let included: Vec<Value> = ids
        .iter()
        .map(|id| {
            json!({
                "$type": "com.linkedin.voyager.identity.shared.MiniProfile",
                "publicIdentifier": id,
                "firstName": id.to_uppercase(),
                "lastName": "Test",
                "occupation": "Engineer"
            })
        })
        .collect();
    match cursor {
        Some(token) => json!({ "included": included, "metadata": { "paginationToken": token } }),
        None => json!({ "included": included }),
    }
}

pub fn email_html(email: &str) -> String {
    format!(r#"<html><body><section class="ci-email"><a href="mailto:{email}">{email}</a></section></body></html>"#)
}

pub fn orchestrator(session: ScriptedSession) -> VisitOrchestrator<ScriptedSession> {
    orchestrator_with(session, PacingConfig::default())
}

pub fn orchestrator_with(
    session: ScriptedSession,
    pacing: PacingConfig,
) -> VisitOrchestrator<ScriptedSession> {
    let controller = AdaptiveRateController::with_seed(pacing.clone(), 42);
    VisitOrchestrator::new(session, OrchestratorConfig::default(), pacing)
        .expect("scripted session subscribes once")
        .with_controller(controller)
}
