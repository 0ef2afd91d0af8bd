// Copyright 2026 Harvest Contributors
// SPDX-License-Identifier: Apache-2.0

//! Cookie-based session authentication.
//!
//! The login flow itself happens outside harvest: the user exports the
//! browser's cookies as a JSON array (the format browser automation tools
//! and cookie-export extensions write) and points `--cookies` or
//! `HARVEST_COOKIE_FILE` at it. A session counts as authenticated when the
//! session cookie is present and the feed page loads without bouncing to a
//! login wall.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use url::Url;

/// Name of the long-lived session cookie.
pub const SESSION_COOKIE: &str = "li_at";

/// Loaded to confirm the session is live.
pub const SESSION_CHECK_URL: &str = "https://www.linkedin.com/feed/";

/// Default cookie file name, resolved under the harvest home directory.
pub const COOKIE_FILE_NAME: &str = "linkedin_cookies.json";

/// Path prefixes the site redirects to when the session is not accepted.
const LOGIN_WALLS: [&str; 4] = ["/login", "/authwall", "/checkpoint", "/uas/login"];

/// A browser cookie as exported to JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredCookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    #[serde(default = "default_path")]
    pub path: String,
    /// Seconds since the epoch; absent or negative for session cookies.
    #[serde(default)]
    pub expires: Option<f64>,
    #[serde(default)]
    pub http_only: bool,
    #[serde(default)]
    pub secure: bool,
    #[serde(default)]
    pub same_site: Option<String>,
}

fn default_path() -> String {
    "/".to_string()
}

impl StoredCookie {
    /// Whether the cookie carries an expiry that is already in the past.
    pub fn is_expired(&self, now_secs: f64) -> bool {
        matches!(self.expires, Some(expires) if expires > 0.0 && expires < now_secs)
    }
}

/// `~/.harvest/linkedin_cookies.json`.
pub fn default_cookie_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".harvest")
        .join(COOKIE_FILE_NAME)
}

/// Read a cookie file.
pub fn load_cookies(path: &Path) -> Result<Vec<StoredCookie>> {
    let raw = std::fs::read_to_string(path).with_context(|| {
        format!(
            "Cannot read cookie file at '{}'. Export your browser cookies \
             to this path or pass --cookies.",
            path.display()
        )
    })?;
    let cookies: Vec<StoredCookie> = serde_json::from_str(&raw)
        .with_context(|| format!("cookie file '{}' is not a JSON cookie array", path.display()))?;
    if cookies.is_empty() {
        bail!("cookie file '{}' contains no cookies", path.display());
    }
    Ok(cookies)
}

/// Load cookies and require a live session cookie among them.
pub fn load_session_cookies(path: &Path) -> Result<Vec<StoredCookie>> {
    let cookies = load_cookies(path)?;
    let now = chrono::Utc::now().timestamp() as f64;
    match cookies.iter().find(|c| c.name == SESSION_COOKIE) {
        None => bail!(
            "cookie file '{}' has no '{SESSION_COOKIE}' cookie; log in and export cookies again",
            path.display()
        ),
        Some(cookie) if cookie.is_expired(now) => bail!(
            "the '{SESSION_COOKIE}' cookie in '{}' has expired; log in and export cookies again",
            path.display()
        ),
        Some(_) => Ok(cookies),
    }
}

/// Whether the named session cookie is among `names`.
pub fn has_session_cookie<'a>(names: impl IntoIterator<Item = &'a str>) -> bool {
    names.into_iter().any(|name| name == SESSION_COOKIE)
}

/// Whether `url` is one of the pages an unauthenticated visitor lands on.
pub fn is_login_wall(url: &str) -> bool {
    let Ok(parsed) = Url::parse(url) else {
        return false;
    };
    let path = parsed.path();
    LOGIN_WALLS.iter().any(|wall| path.starts_with(wall))
}
