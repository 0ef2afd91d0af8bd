// Copyright 2026 Harvest Contributors
// SPDX-License-Identifier: Apache-2.0

//! Chromium-backed browser session using chromiumoxide.
//!
//! One browser, one page. A background task listens to CDP network events,
//! fetches the body of every finished response whose URL matches the filter
//! and forwards it on a bounded channel. The task never touches capture or
//! pacing state; the orchestrator drains the channel on its own schedule.

use super::LaunchOptions;
use crate::auth::{self, StoredCookie, SESSION_CHECK_URL};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::element::Element;
use chromiumoxide::error::CdpError;
use chromiumoxide::cdp::browser_protocol::network::{
    CookieParam, EnableParams, EventLoadingFailed, EventLoadingFinished, EventResponseReceived,
    GetResponseBodyParams, RequestId, ResourceType, TimeSinceEpoch,
};
use chromiumoxide::listeners::EventStream;
use chromiumoxide::page::Page;
use futures::StreamExt;
use harvest_core::session::INTERCEPTION_BUFFER;
use harvest_core::{
    BrowserSession, InterceptedResponse, NavigationError, NavigationOutcome, SearchFilter,
    SessionError,
};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Opens the contact-info overlay on a profile page.
const CONTACT_INFO_SELECTOR: &str = "a[href*=\"/overlay/contact-info/\"]";

/// First typeahead suggestion in an open search filter.
const FILTER_OPTION_SELECTOR: &str = "[id*=\"basic-result-\"]";

const FILTER_APPLY_SELECTOR: &str =
    "button[data-test-reusables-filters--apply-btn], fieldset button[aria-label*=\"Apply\"]";

const FILTER_STEP_PAUSE: Duration = Duration::from_secs(1);
const FILTER_TYPEAHEAD_WAIT: Duration = Duration::from_secs(2);
const FILTER_SETTLE: Duration = Duration::from_secs(3);

/// Filter bar controls of one facet: button labels and the typeahead input.
#[derive(Debug, PartialEq, Eq)]
struct FilterControls {
    labels: &'static [&'static str],
    input: &'static str,
}

impl FilterControls {
    fn of(filter: &SearchFilter) -> Self {
        match filter {
            SearchFilter::Location(_) => Self {
                labels: &["Locations", "Lieux"],
                input: "input[placeholder=\"Add a location\"], input[placeholder=\"Ajouter un lieu\"]",
            },
            SearchFilter::Industry(_) => Self {
                labels: &["Industry", "Secteur"],
                input: "input[placeholder=\"Add an industry\"], input[placeholder=\"Ajouter un secteur\"]",
            },
        }
    }
}

/// Timeout for the session check navigation.
const SESSION_CHECK_TIMEOUT: Duration = Duration::from_secs(30);

/// Find the Chromium binary path.
pub fn find_chromium() -> Option<PathBuf> {
    // 1. HARVEST_CHROMIUM_PATH env
    if let Ok(p) = std::env::var("HARVEST_CHROMIUM_PATH") {
        let path = PathBuf::from(&p);
        if path.exists() {
            return Some(path);
        }
    }

    // 2. ~/.harvest/chromium/
    if let Some(home) = dirs::home_dir() {
        let candidates = if cfg!(target_os = "macos") {
            vec![
                home.join(".harvest/chromium/chrome-mac-arm64/Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing"),
                home.join(".harvest/chromium/chrome-mac-x64/Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing"),
            ]
        } else {
            vec![
                home.join(".harvest/chromium/chrome-linux64/chrome"),
                home.join(".harvest/chromium/chrome"),
            ]
        };
        if let Some(found) = candidates.into_iter().find(|c| c.exists()) {
            return Some(found);
        }
    }

    // 3. System PATH
    for name in ["google-chrome", "google-chrome-stable", "chromium", "chromium-browser"] {
        if let Ok(path) = which::which(name) {
            return Some(path);
        }
    }

    // 4. Common macOS location
    if cfg!(target_os = "macos") {
        let common = PathBuf::from("/Applications/Google Chrome.app/Contents/MacOS/Google Chrome");
        if common.exists() {
            return Some(common);
        }
    }

    None
}

/// A single-page Chromium session with network interception.
pub struct ChromiumSession {
    browser: Browser,
    page: Page,
    handler: JoinHandle<()>,
    interceptor: JoinHandle<()>,
    responses: Option<mpsc::Receiver<InterceptedResponse>>,
    /// Status of the first document response since the last navigation.
    document_status: Arc<AtomicU16>,
}

impl ChromiumSession {
    /// Launch Chromium and start intercepting network traffic.
    pub async fn launch(options: &LaunchOptions) -> Result<Self> {
        let chrome_path = options
            .executable
            .clone()
            .or_else(find_chromium)
            .context("Chromium not found. Install Chrome or set HARVEST_CHROMIUM_PATH.")?;
        info!("launching Chromium from {}", chrome_path.display());

        let (width, height) = options.window_size;
        let mut builder = BrowserConfig::builder()
            .chrome_executable(chrome_path)
            .window_size(width, height)
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .arg("--disable-background-networking");
        if options.headless {
            builder = builder.arg("--headless=new");
        } else {
            builder = builder.with_head();
        }
        let config = builder
            .build()
            .map_err(|e| anyhow!("failed to build browser config: {e}"))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .context("failed to launch Chromium")?;

        // Spawn the handler task
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("browser handler error: {e}");
                }
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .context("failed to create new page")?;
        page.execute(EnableParams::default())
            .await
            .context("failed to enable network events")?;

        let received = page
            .event_listener::<EventResponseReceived>()
            .await
            .context("failed to listen for responses")?;
        let finished = page
            .event_listener::<EventLoadingFinished>()
            .await
            .context("failed to listen for finished loads")?;
        let failed = page
            .event_listener::<EventLoadingFailed>()
            .await
            .context("failed to listen for failed loads")?;

        let (tx, rx) = mpsc::channel(INTERCEPTION_BUFFER);
        let document_status = Arc::new(AtomicU16::new(0));
        let interceptor = tokio::spawn(intercept(
            page.clone(),
            Listeners {
                received,
                finished,
                failed,
            },
            options.url_filter.clone(),
            Arc::clone(&document_status),
            tx,
        ));

        Ok(Self {
            browser,
            page,
            handler,
            interceptor,
            responses: Some(rx),
            document_status,
        })
    }

    /// Load exported cookies into the browser.
    pub async fn install_cookies(&self, cookies: &[StoredCookie]) -> Result<usize> {
        let params = cookies
            .iter()
            .map(cookie_param)
            .collect::<Result<Vec<_>>>()?;
        let count = params.len();
        self.page
            .set_cookies(params)
            .await
            .context("failed to set cookies")?;
        debug!("installed {count} cookies");
        Ok(count)
    }

    /// Shut the browser down.
    pub async fn close(mut self) -> Result<()> {
        self.interceptor.abort();
        if let Err(e) = self.browser.close().await {
            debug!("browser close: {e}");
        }
        let _ = self.browser.wait().await;
        self.handler.abort();
        Ok(())
    }

    async fn current_url(&self) -> Option<String> {
        self.page.url().await.ok().flatten()
    }

    /// The filter bar button whose label is one of `labels`.
    async fn filter_button(&self, labels: &[&str]) -> Result<Element, SessionError> {
        let buttons = self
            .page
            .find_elements("button")
            .await
            .map_err(|e| SessionError::Browser(e.to_string()))?;
        for button in buttons {
            if let Ok(Some(text)) = button.inner_text().await {
                if labels.contains(&text.trim()) {
                    return Ok(button);
                }
            }
        }
        Err(SessionError::Content(format!(
            "no filter button labelled {}",
            labels.join(" / ")
        )))
    }
}

fn cookie_param(cookie: &StoredCookie) -> Result<CookieParam> {
    let mut builder = CookieParam::builder()
        .name(cookie.name.clone())
        .value(cookie.value.clone())
        .domain(cookie.domain.clone())
        .path(cookie.path.clone())
        .secure(cookie.secure)
        .http_only(cookie.http_only);
    if let Some(expires) = cookie.expires.filter(|e| *e > 0.0) {
        builder = builder.expires(TimeSinceEpoch::new(expires));
    }
    builder
        .build()
        .map_err(|e| anyhow!("invalid cookie '{}': {e}", cookie.name))
}

/// A matching response whose body is still loading.
#[derive(Debug)]
struct PendingResponse {
    url: String,
    status: u16,
    received_at: DateTime<Utc>,
}

impl PendingResponse {
    /// The finished exchange, stamped when its headers arrived.
    fn complete(self, body: Vec<u8>) -> InterceptedResponse {
        InterceptedResponse::new(self.url, self.status, body).received_at(self.received_at)
    }
}

struct Listeners {
    received: EventStream<EventResponseReceived>,
    finished: EventStream<EventLoadingFinished>,
    failed: EventStream<EventLoadingFailed>,
}

/// Forward matching response bodies until the page goes away.
async fn intercept(
    page: Page,
    mut listeners: Listeners,
    url_filter: String,
    document_status: Arc<AtomicU16>,
    tx: mpsc::Sender<InterceptedResponse>,
) {
    let mut pending: HashMap<String, PendingResponse> = HashMap::new();

    loop {
        tokio::select! {
            Some(event) = listeners.received.next() => {
                let status = u16::try_from(event.response.status).unwrap_or(0);
                if event.r#type == ResourceType::Document {
                    let _ = document_status.compare_exchange(0, status, Ordering::SeqCst, Ordering::SeqCst);
                }
                if event.response.url.contains(&url_filter) {
                    pending.insert(
                        event.request_id.inner().clone(),
                        PendingResponse {
                            url: event.response.url.clone(),
                            status,
                            received_at: Utc::now(),
                        },
                    );
                }
            }
            Some(event) = listeners.finished.next() => {
                let Some(response) = pending.remove(event.request_id.inner()) else {
                    continue;
                };
                match response_body(&page, event.request_id.clone()).await {
                    Ok(body) => {
                        if let Err(e) = tx.try_send(response.complete(body)) {
                            warn!("dropping intercepted response: {e}");
                        }
                    }
                    Err(e) => debug!("no body for {}: {e:#}", response.url),
                }
            }
            Some(event) = listeners.failed.next() => {
                pending.remove(event.request_id.inner());
            }
            else => break,
        }
    }
    debug!("interception stopped");
}

async fn response_body(page: &Page, request_id: RequestId) -> Result<Vec<u8>> {
    let returns = page
        .execute(GetResponseBodyParams::new(request_id))
        .await
        .context("Network.getResponseBody failed")?
        .result;
    if returns.base64_encoded {
        BASE64
            .decode(returns.body.as_bytes())
            .context("response body is not valid base64")
    } else {
        Ok(returns.body.into_bytes())
    }
}

#[async_trait]
impl BrowserSession for ChromiumSession {
    async fn is_authenticated(&mut self) -> Result<bool, SessionError> {
        let cookies = self
            .page
            .get_cookies()
            .await
            .map_err(|e| SessionError::Browser(e.to_string()))?;
        if !auth::has_session_cookie(cookies.iter().map(|c| c.name.as_str())) {
            warn!("no session cookie in the browser");
            return Ok(false);
        }

        let outcome = self
            .navigate(SESSION_CHECK_URL, SESSION_CHECK_TIMEOUT)
            .await
            .map_err(|e| SessionError::Browser(e.to_string()))?;
        let live = !auth::is_login_wall(&outcome.final_url);
        if live {
            info!("session is authenticated");
        } else {
            warn!("session redirected to {}", outcome.final_url);
        }
        Ok(live)
    }

    fn subscribe(&mut self) -> Result<mpsc::Receiver<InterceptedResponse>, SessionError> {
        self.responses
            .take()
            .ok_or_else(|| SessionError::Interception("responses already subscribed".into()))
    }

    async fn navigate(
        &mut self,
        url: &str,
        timeout: Duration,
    ) -> Result<NavigationOutcome, NavigationError> {
        self.document_status.store(0, Ordering::SeqCst);

        match tokio::time::timeout(timeout, self.page.goto(url)).await {
            Ok(Ok(_)) => {
                let _ = self.page.wait_for_navigation().await;
                let final_url = self.current_url().await.unwrap_or_else(|| url.to_string());
                let status = match self.document_status.load(Ordering::SeqCst) {
                    0 => None,
                    status => Some(status),
                };
                debug!("navigated to {final_url} ({status:?})");
                Ok(NavigationOutcome { final_url, status })
            }
            Ok(Err(e)) => Err(NavigationError::Failed {
                url: url.to_string(),
                reason: e.to_string(),
            }),
            Err(_) => Err(NavigationError::Timeout {
                url: url.to_string(),
                after_ms: timeout.as_millis() as u64,
            }),
        }
    }

    async fn page_content(&mut self) -> Result<String, SessionError> {
        let result = self
            .page
            .evaluate("document.documentElement.outerHTML")
            .await
            .map_err(|e| SessionError::Content(e.to_string()))?;

        result
            .into_value::<String>()
            .map_err(|e| SessionError::Content(format!("failed to convert HTML result: {e:?}")))
    }

    async fn reveal_contact_info(&mut self) -> Result<(), SessionError> {
        let Ok(link) = self.page.find_element(CONTACT_INFO_SELECTOR).await else {
            debug!("no contact info link on this page");
            return Ok(());
        };
        link.click()
            .await
            .map_err(|e| SessionError::Browser(format!("contact info click failed: {e}")))?;
        Ok(())
    }

    async fn apply_search_filter(
        &mut self,
        filter: &SearchFilter,
    ) -> Result<Option<String>, SessionError> {
        let fail = |e: CdpError| SessionError::Browser(format!("{filter}: {e}"));
        let controls = FilterControls::of(filter);

        let button = self.filter_button(controls.labels).await?;
        button.click().await.map_err(fail)?;
        tokio::time::sleep(FILTER_STEP_PAUSE).await;

        let input = self.page.find_element(controls.input).await.map_err(fail)?;
        input
            .click()
            .await
            .map_err(fail)?
            .type_str(filter.value())
            .await
            .map_err(fail)?;
        tokio::time::sleep(FILTER_TYPEAHEAD_WAIT).await;

        let option = self
            .page
            .find_element(FILTER_OPTION_SELECTOR)
            .await
            .map_err(fail)?;
        option.click().await.map_err(fail)?;
        tokio::time::sleep(FILTER_STEP_PAUSE).await;

        // Without an apply button the dropdown closes from its own toggle.
        match self.page.find_element(FILTER_APPLY_SELECTOR).await {
            Ok(apply) => {
                apply.click().await.map_err(fail)?;
            }
            Err(_) => {
                button.click().await.map_err(fail)?;
            }
        }
        tokio::time::sleep(FILTER_SETTLE).await;

        let url = self.current_url().await;
        debug!("results after {filter}: {url:?}");
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use harvest_core::{BrowserSession, Observation, ResponseCorrelator};

    #[test]
    fn test_cookie_param_from_stored_cookie() {
        let cookie: StoredCookie = serde_json::from_str(
            r#"{"name":"li_at","value":"secret","domain":".linkedin.com","secure":true,"expires":1900000000.0}"#,
        )
        .unwrap();
        let param = cookie_param(&cookie).unwrap();
        assert_eq!(param.name, "li_at");
        assert_eq!(param.domain.as_deref(), Some(".linkedin.com"));
        assert_eq!(param.secure, Some(true));
        assert!(param.expires.is_some());
    }

    #[test]
    fn test_response_keeps_receipt_time() {
        let received_at = Utc::now() - chrono::Duration::seconds(5);
        let pending = PendingResponse {
            url: "https://www.linkedin.com/voyager/api/identity/profiles/ada/skills".into(),
            status: 200,
            received_at,
        };
        let mut correlator = ResponseCorrelator::new();
        correlator.open(Some("ada")).unwrap();

        // The body finished loading after the window opened; the headers did not.
        let response = pending.complete(br#"{"elements":[{"name":"Rust"}]}"#.to_vec());
        assert_eq!(response.timestamp, received_at);
        assert_eq!(correlator.observe(&response), Observation::Discarded);
    }

    #[test]
    fn test_filter_controls_per_facet() {
        let location = FilterControls::of(&SearchFilter::Location("Paris".into()));
        assert!(location.labels.contains(&"Locations"));
        assert!(location.input.contains("Add a location"));
        let industry = FilterControls::of(&SearchFilter::Industry("Finance".into()));
        assert!(industry.labels.contains(&"Secteur"));
        assert!(industry.input.contains("Add an industry"));
    }

    #[tokio::test]
    #[ignore] // Requires Chromium to be installed
    async fn test_chromium_navigate_and_read_content() {
        let mut session = ChromiumSession::launch(&LaunchOptions::default())
            .await
            .expect("failed to launch Chromium");
        let _responses = session.subscribe().expect("first subscription");
        assert!(session.subscribe().is_err());

        let outcome = session
            .navigate("data:text/html,<h1>Hello</h1>", Duration::from_secs(10))
            .await
            .expect("navigation failed");
        assert!(outcome.final_url.starts_with("data:"));

        let html = session.page_content().await.expect("page content");
        assert!(html.contains("<h1>Hello</h1>"));

        session.reveal_contact_info().await.expect("no-op without link");
        session.close().await.expect("close failed");
    }
}
