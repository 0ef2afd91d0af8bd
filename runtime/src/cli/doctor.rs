// Copyright 2026 Harvest Contributors
// SPDX-License-Identifier: Apache-2.0

//! Environment readiness check.

use crate::auth;
use crate::config::RuntimeConfig;
use crate::renderer::find_chromium;
use anyhow::Result;
use std::path::Path;

/// One readiness line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Check {
    pub ok: bool,
    pub message: String,
}

impl Check {
    fn ok(message: impl Into<String>) -> Self {
        Self {
            ok: true,
            message: message.into(),
        }
    }

    fn fail(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            message: message.into(),
        }
    }
}

/// Check Chromium, the cookie file and the output directory.
pub async fn run() -> Result<()> {
    let config = RuntimeConfig::from_env();

    println!("Harvest Doctor");
    println!("==============");
    println!();
    println!("OS:   {}", std::env::consts::OS);
    println!("Arch: {}", std::env::consts::ARCH);
    println!();

    let checks = [
        check_chromium(&config),
        check_cookies(&config.cookie_file),
        check_output_dir(&config.output_dir),
    ];
    for check in &checks {
        let mark = if check.ok { "[OK]" } else { "[!!]" };
        println!("{mark} {}", check.message);
    }

    println!();
    println!(
        "Pacing: {:.0}-{:.0}s between visits, long pause every {} visits, cap {} visits",
        config.pacing.short_delay.min_secs,
        config.pacing.short_delay.max_secs,
        config.pacing.visits_per_long_pause,
        config.pacing.effective_visit_cap()
    );

    println!();
    if checks.iter().all(|c| c.ok) {
        println!("Status: READY");
    } else {
        println!("Status: NOT READY");
    }
    Ok(())
}

fn check_chromium(config: &RuntimeConfig) -> Check {
    let found = config
        .chromium_path
        .clone()
        .filter(|p| p.exists())
        .or_else(find_chromium);
    match found {
        Some(path) => Check::ok(format!("Chromium found: {}", path.display())),
        None => Check::fail("Chromium NOT found. Install Chrome or set HARVEST_CHROMIUM_PATH."),
    }
}

/// The cookie file exists, parses and carries a live session cookie.
pub fn check_cookies(path: &Path) -> Check {
    match auth::load_session_cookies(path) {
        Ok(cookies) => Check::ok(format!(
            "Session cookies: {} cookies in {}",
            cookies.len(),
            path.display()
        )),
        Err(e) => Check::fail(format!("Session cookies: {e}")),
    }
}

/// The output directory exists or can be created.
pub fn check_output_dir(dir: &Path) -> Check {
    match std::fs::create_dir_all(dir) {
        Ok(()) => Check::ok(format!("Output directory {} is writable", dir.display())),
        Err(e) => Check::fail(format!("Output directory {}: {e}", dir.display())),
    }
}
