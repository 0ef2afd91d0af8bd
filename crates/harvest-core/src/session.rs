// Copyright 2026 Harvest Contributors
// SPDX-License-Identifier: Apache-2.0

//! Browser session abstraction.
//!
//! Defines the [`BrowserSession`] trait the orchestrator drives. The runtime
//! crate implements it over Chromium; tests implement it with scripted pages.

use crate::error::{NavigationError, SessionError};
use crate::types::InterceptedResponse;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::mpsc;

/// Statuses the site answers with when it refuses automated traffic.
pub const BLOCKING_STATUSES: [u16; 2] = [999, 429];

/// Bound on responses buffered between the interception task and the
/// orchestrator.
pub const INTERCEPTION_BUFFER: usize = 512;

/// Result of navigating to a URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NavigationOutcome {
    /// The final URL after any redirects.
    pub final_url: String,
    /// Status of the main document, when the browser reported one.
    pub status: Option<u16>,
}

impl NavigationOutcome {
    /// Turn a blocking status into a navigation error.
    pub fn check_blocked(self, url: &str) -> Result<Self, NavigationError> {
        match self.status {
            Some(status) if BLOCKING_STATUSES.contains(&status) => Err(NavigationError::Blocked {
                url: url.to_string(),
                status,
            }),
            _ => Ok(self),
        }
    }
}

/// A facet applied to people search results through the page's filter bar.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "facet", content = "value")]
pub enum SearchFilter {
    Location(String),
    Industry(String),
}

impl SearchFilter {
    pub fn facet(&self) -> &'static str {
        match self {
            Self::Location(_) => "location",
            Self::Industry(_) => "industry",
        }
    }

    pub fn value(&self) -> &str {
        match self {
            Self::Location(v) | Self::Industry(v) => v,
        }
    }
}

impl std::fmt::Display for SearchFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} = {}", self.facet(), self.value())
    }
}

/// An authenticated browser tab whose network traffic can be observed.
#[async_trait]
pub trait BrowserSession: Send {
    /// Whether the session holds a logged-in identity.
    async fn is_authenticated(&mut self) -> Result<bool, SessionError>;

    /// Start delivering completed responses. Called once per session; the
    /// channel is bounded and the sender side lives in the interception task.
    fn subscribe(&mut self) -> Result<mpsc::Receiver<InterceptedResponse>, SessionError>;

    /// Navigate to `url`, failing after `timeout`.
    async fn navigate(
        &mut self,
        url: &str,
        timeout: Duration,
    ) -> Result<NavigationOutcome, NavigationError>;

    /// Current page HTML.
    async fn page_content(&mut self) -> Result<String, SessionError>;

    /// Open the contact overlay so the page fires its contact request.
    async fn reveal_contact_info(&mut self) -> Result<(), SessionError> {
        Ok(())
    }

    /// Apply `filter` to the search results currently shown.
    ///
    /// Returns the URL of the filtered results, or `None` when the session
    /// cannot filter.
    async fn apply_search_filter(
        &mut self,
        filter: &SearchFilter,
    ) -> Result<Option<String>, SessionError> {
        let _ = filter;
        Ok(None)
    }
}
