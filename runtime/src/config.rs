// Copyright 2026 Harvest Contributors
// SPDX-License-Identifier: Apache-2.0

//! Runtime configuration from `HARVEST_*` environment variables.
//!
//! Unset or unparsable variables fall back to the core defaults. CLI flags
//! are applied on top by the command that owns them.

use crate::auth;
use harvest_core::pacing::DelayRange;
use harvest_core::{OrchestratorConfig, PacingConfig};
use std::path::PathBuf;
use std::time::Duration;

/// Everything the `search` command needs before it launches a browser.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub pacing: PacingConfig,
    pub orchestrator: OrchestratorConfig,
    /// Explicit Chromium binary; discovered when absent.
    pub chromium_path: Option<PathBuf>,
    pub cookie_file: PathBuf,
    pub headless: bool,
    /// Where exports land when no output path is given.
    pub output_dir: PathBuf,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            pacing: PacingConfig::default(),
            orchestrator: OrchestratorConfig::default(),
            chromium_path: None,
            cookie_file: auth::default_cookie_path(),
            headless: true,
            output_dir: PathBuf::from("."),
        }
    }
}

impl RuntimeConfig {
    /// Read the process environment.
    pub fn from_env() -> Self {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable lookup.
    pub fn from_vars(vars: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let pacing = pacing_from_vars(&vars, defaults.pacing);
        let orchestrator = orchestrator_from_vars(&vars, defaults.orchestrator);

        Self {
            pacing,
            orchestrator,
            chromium_path: read_env_string(&vars, "HARVEST_CHROMIUM_PATH").map(PathBuf::from),
            cookie_file: read_env_string(&vars, "HARVEST_COOKIE_FILE")
                .map(PathBuf::from)
                .unwrap_or(defaults.cookie_file),
            headless: read_env_bool(&vars, "HARVEST_HEADLESS", defaults.headless),
            output_dir: read_env_string(&vars, "HARVEST_OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.output_dir),
        }
    }
}

fn pacing_from_vars(vars: &impl Fn(&str) -> Option<String>, defaults: PacingConfig) -> PacingConfig {
    PacingConfig {
        short_delay: read_env_range(
            vars,
            "HARVEST_SHORT_DELAY_MIN_SECS",
            "HARVEST_SHORT_DELAY_MAX_SECS",
            defaults.short_delay,
        ),
        long_pause: read_env_range(
            vars,
            "HARVEST_LONG_PAUSE_MIN_SECS",
            "HARVEST_LONG_PAUSE_MAX_SECS",
            defaults.long_pause,
        ),
        visits_per_long_pause: read_env_u32(
            vars,
            "HARVEST_VISITS_PER_LONG_PAUSE",
            defaults.visits_per_long_pause,
        ),
        search_page_delay: read_env_range(
            vars,
            "HARVEST_SEARCH_DELAY_MIN_SECS",
            "HARVEST_SEARCH_DELAY_MAX_SECS",
            defaults.search_page_delay,
        ),
        backoff_factor: read_env_f64(vars, "HARVEST_BACKOFF_FACTOR", defaults.backoff_factor)
            .max(1.0),
        max_multiplier: read_env_f64(vars, "HARVEST_MAX_BACKOFF_MULTIPLIER", defaults.max_multiplier)
            .max(defaults.min_multiplier),
        max_consecutive_failures: read_env_u32(
            vars,
            "HARVEST_MAX_CONSECUTIVE_FAILURES",
            defaults.max_consecutive_failures,
        )
        .max(1),
        max_consecutive_hard_failures: read_env_u32(
            vars,
            "HARVEST_MAX_CONSECUTIVE_HARD_FAILURES",
            defaults.max_consecutive_hard_failures,
        )
        .max(1),
        visit_cap: read_env_u32(vars, "HARVEST_VISIT_CAP", defaults.visit_cap).max(1),
        ..defaults
    }
}

fn orchestrator_from_vars(
    vars: &impl Fn(&str) -> Option<String>,
    defaults: OrchestratorConfig,
) -> OrchestratorConfig {
    OrchestratorConfig {
        navigation_timeout: Duration::from_millis(
            read_env_u64(
                vars,
                "HARVEST_NAVIGATION_TIMEOUT_MS",
                defaults.navigation_timeout.as_millis() as u64,
            )
            .max(1000),
        ),
        capture_settle: Duration::from_millis(read_env_u64(
            vars,
            "HARVEST_CAPTURE_SETTLE_MS",
            defaults.capture_settle.as_millis() as u64,
        )),
        max_search_pages: read_env_u32(vars, "HARVEST_MAX_SEARCH_PAGES", defaults.max_search_pages)
            .clamp(1, harvest_core::orchestrator::MAX_SEARCH_PAGES),
        ..defaults
    }
}

fn read_env_string(vars: &impl Fn(&str) -> Option<String>, name: &str) -> Option<String> {
    vars(name)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn read_env_u64(vars: &impl Fn(&str) -> Option<String>, name: &str, default: u64) -> u64 {
    read_env_string(vars, name)
        .and_then(|value| value.parse::<u64>().ok())
        .unwrap_or(default)
}

fn read_env_u32(vars: &impl Fn(&str) -> Option<String>, name: &str, default: u32) -> u32 {
    read_env_string(vars, name)
        .and_then(|value| value.parse::<u32>().ok())
        .unwrap_or(default)
}

fn read_env_f64(vars: &impl Fn(&str) -> Option<String>, name: &str, default: f64) -> f64 {
    read_env_string(vars, name)
        .and_then(|value| value.parse::<f64>().ok())
        .filter(|value| value.is_finite() && *value >= 0.0)
        .unwrap_or(default)
}

fn read_env_bool(vars: &impl Fn(&str) -> Option<String>, name: &str, default: bool) -> bool {
    match read_env_string(vars, name)
        .map(|value| value.to_ascii_lowercase())
        .as_deref()
    {
        Some("1" | "true" | "yes" | "on") => true,
        Some("0" | "false" | "no" | "off") => false,
        _ => default,
    }
}

/// A `[min, max]` pair; a max below the min collapses to the min.
fn read_env_range(
    vars: &impl Fn(&str) -> Option<String>,
    min_name: &str,
    max_name: &str,
    default: DelayRange,
) -> DelayRange {
    let min = read_env_f64(vars, min_name, default.min_secs);
    let max = read_env_f64(vars, max_name, default.max_secs).max(min);
    DelayRange::new(min, max)
}
