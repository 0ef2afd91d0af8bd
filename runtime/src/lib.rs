// Copyright 2026 Harvest Contributors
// SPDX-License-Identifier: Apache-2.0

//! Harvest runtime library: the Chromium browser session, cookie
//! authentication, configuration, export and the CLI commands behind the
//! `harvest` binary.
//!
//! This library crate exposes the modules for integration testing.

pub mod auth;
pub mod cli;
pub mod config;
pub mod export;
pub mod renderer;
