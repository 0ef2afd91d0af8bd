// Copyright 2026 Harvest Contributors
// SPDX-License-Identifier: Apache-2.0

//! Browser sessions backing the core [`harvest_core::BrowserSession`] trait.
//!
//! Currently Chromium via chromiumoxide.

pub mod chromium;

pub use chromium::{find_chromium, ChromiumSession};

use std::path::PathBuf;

/// Substring that marks an intercepted response as structured API traffic.
pub const API_URL_FILTER: &str = "/voyager/api/";

/// How to launch the browser.
#[derive(Debug, Clone)]
pub struct LaunchOptions {
    /// Explicit binary; discovered with [`find_chromium`] when absent.
    pub executable: Option<PathBuf>,
    pub headless: bool,
    pub window_size: (u32, u32),
    /// Responses whose URL contains this substring are forwarded.
    pub url_filter: String,
}

impl Default for LaunchOptions {
    fn default() -> Self {
        Self {
            executable: None,
            headless: true,
            window_size: (1366, 900),
            url_filter: API_URL_FILTER.to_string(),
        }
    }
}
