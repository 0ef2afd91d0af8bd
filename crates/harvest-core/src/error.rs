// Copyright 2026 Harvest Contributors
// SPDX-License-Identifier: Apache-2.0

//! Error taxonomy for the harvest engine.
//!
//! Errors are layered by blast radius: a [`DecodeError`] costs one fragment,
//! a [`NavigationError`] costs one visit, and a [`PacingError`] ends the
//! session. Only [`HarvestError`] ever reaches the caller of the
//! orchestrator, and only for preconditions that stop a session before the
//! first visit.

use crate::types::FragmentKind;

/// A known endpoint answered with a body that could not be decoded.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("cannot decode {kind} response from {url}: {reason}")]
pub struct DecodeError {
    pub kind: FragmentKind,
    pub url: String,
    pub reason: String,
}

/// A navigation did not produce a usable page.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum NavigationError {
    #[error("navigation to {url} timed out after {after_ms}ms")]
    Timeout { url: String, after_ms: u64 },

    #[error("navigation to {url} was blocked with status {status}")]
    Blocked { url: String, status: u16 },

    #[error("navigation to {url} failed: {reason}")]
    Failed { url: String, reason: String },
}

/// The browser collaborator failed outside of a navigation.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("Browser error: {0}")]
    Browser(String),

    #[error("Interception unavailable: {0}")]
    Interception(String),

    #[error("Page content unavailable: {0}")]
    Content(String),
}

/// The rate controller refused a visit.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacingError {
    #[error("rate controller halted after {consecutive_failures} consecutive failures")]
    Halted { consecutive_failures: u32 },

    #[error("session visit cap of {cap} reached")]
    VisitCapReached { cap: u32 },
}

/// All errors that can abort a harvest session before it starts.
#[derive(thiserror::Error, Debug)]
pub enum HarvestError {
    #[error("Browser session is not authenticated")]
    Unauthenticated,

    #[error("A capture window is already open for {0}")]
    WindowAlreadyOpen(String),

    #[error("No capture window is open")]
    WindowNotOpen,

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Pacing error: {0}")]
    Pacing(#[from] PacingError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

pub type HarvestResult<T> = Result<T, HarvestError>;
