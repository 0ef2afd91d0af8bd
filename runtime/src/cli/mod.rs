// Copyright 2026 Harvest Contributors
// SPDX-License-Identifier: Apache-2.0

//! CLI subcommand implementations for the harvest binary.

pub mod doctor;
pub mod progress;
pub mod search_cmd;

/// Initialize tracing: `harvest=info` unless `RUST_LOG` says otherwise.
pub fn init_tracing(verbose: bool, json: bool) {
    let level = if verbose { "debug" } else { "info" };
    let mut filter = tracing_subscriber::EnvFilter::from_default_env();
    for target in ["harvest", "harvest_core", "harvest_runtime"] {
        if let Ok(directive) = format!("{target}={level}").parse() {
            filter = filter.add_directive(directive);
        }
    }

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}
