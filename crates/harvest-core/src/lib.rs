// Copyright 2026 Harvest Contributors
// SPDX-License-Identifier: Apache-2.0

//! Harvest core: network-response correlation, DOM fallback, provenance-aware
//! merging and adaptive pacing for long-running authenticated browsing
//! sessions.

pub mod correlator;
pub mod error;
pub mod events;
pub mod fallback;
pub mod merger;
pub mod orchestrator;
pub mod pacing;
pub mod session;
pub mod types;

pub use correlator::{classify, CaptureWindow, Observation, ResponseCorrelator};
pub use error::{DecodeError, HarvestError, HarvestResult, NavigationError, PacingError, SessionError};
pub use events::{EventBus, HarvestEvent, PauseKind};
pub use fallback::FallbackExtractor;
pub use merger::RecordMerger;
pub use orchestrator::{
    OrchestratorConfig, SearchOutcome, SearchQuery, SearchStop, SessionReport, Termination,
    VisitDiagnostic, VisitOrchestrator,
};
pub use pacing::{AdaptiveRateController, Admission, PacingConfig, RatePhase, RateState, RateStats};
pub use session::{BrowserSession, NavigationOutcome, SearchFilter};
pub use tokio_util::sync::CancellationToken;
pub use types::*;
