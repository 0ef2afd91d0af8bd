// Copyright 2026 Harvest Contributors
// SPDX-License-Identifier: Apache-2.0

//! Adaptive rate controller: jittered pacing, periodic long pauses,
//! multiplicative backoff and a terminal circuit breaker.
//!
//! All pacing state lives in one [`RateState`] owned by the controller and is
//! advanced only by [`AdaptiveRateController::admit`],
//! [`AdaptiveRateController::pace_page`] and
//! [`AdaptiveRateController::report`]. Waits race the session
//! [`CancellationToken`], so a cancelled session never sits out a long pause.

use crate::error::PacingError;
use crate::events::{emit, EventBus, HarvestEvent, PauseKind};
use crate::types::Outcome;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Upper bound on visits per session, whatever the configuration says.
pub const HARD_VISIT_CAP: u32 = 80;

/// Longest single wait the controller will schedule.
pub const MAX_DELAY: Duration = Duration::from_secs(3600);

/// Ceiling for a configured backoff multiplier.
pub const MAX_BACKOFF_MULTIPLIER: f64 = 64.0;

/// A closed interval of seconds sampled uniformly.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DelayRange {
    pub min_secs: f64,
    pub max_secs: f64,
}

impl DelayRange {
    pub const fn new(min_secs: f64, max_secs: f64) -> Self {
        Self { min_secs, max_secs }
    }

    /// Finite, ordered and within [`MAX_DELAY`].
    fn clamped(self) -> Self {
        let cap = MAX_DELAY.as_secs_f64();
        let bound = |v: f64| if v.is_finite() { v.clamp(0.0, cap) } else { 0.0 };
        let min_secs = bound(self.min_secs);
        let max_secs = bound(self.max_secs).max(min_secs);
        Self { min_secs, max_secs }
    }

    fn sample(&self, rng: &mut StdRng) -> f64 {
        let lo = self.min_secs.max(0.0);
        let hi = self.max_secs.max(lo);
        if hi > lo {
            rng.gen_range(lo..=hi)
        } else {
            lo
        }
    }
}

/// Pacing parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PacingConfig {
    /// Jitter before every profile visit.
    pub short_delay: DelayRange,
    /// Periodic long pause.
    pub long_pause: DelayRange,
    /// Insert a long pause every N granted visits. Zero disables it.
    pub visits_per_long_pause: u32,
    /// Delay between search result pages.
    pub search_page_delay: DelayRange,
    pub backoff_factor: f64,
    pub min_multiplier: f64,
    pub max_multiplier: f64,
    /// Failures outstanding before the multiplier starts growing.
    pub backoff_after_failures: u32,
    /// Halt after this many consecutive failures of any kind.
    pub max_consecutive_failures: u32,
    /// Halt after this many consecutive hard failures.
    pub max_consecutive_hard_failures: u32,
    /// Requested visit cap; clamped to [`HARD_VISIT_CAP`].
    pub visit_cap: u32,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            short_delay: DelayRange::new(3.0, 7.0),
            long_pause: DelayRange::new(15.0, 30.0),
            visits_per_long_pause: 8,
            search_page_delay: DelayRange::new(5.0, 10.0),
            backoff_factor: 2.0,
            min_multiplier: 1.0,
            max_multiplier: 16.0,
            backoff_after_failures: 1,
            max_consecutive_failures: 5,
            max_consecutive_hard_failures: 3,
            visit_cap: 50,
        }
    }
}

impl PacingConfig {
    /// The cap actually enforced.
    pub fn effective_visit_cap(&self) -> u32 {
        self.visit_cap.min(HARD_VISIT_CAP)
    }

    /// The configuration the controller actually runs with: delay ranges
    /// ordered and capped at [`MAX_DELAY`], multiplier bounds ordered and
    /// within `1.0..=MAX_BACKOFF_MULTIPLIER`, halt thresholds at least one.
    pub fn normalized(&self) -> Self {
        let bound = |v: f64, fallback: f64| {
            if v.is_finite() {
                v.clamp(1.0, MAX_BACKOFF_MULTIPLIER)
            } else {
                fallback
            }
        };
        let min_multiplier = bound(self.min_multiplier, 1.0);
        let max_multiplier = bound(self.max_multiplier, MAX_BACKOFF_MULTIPLIER).max(min_multiplier);
        Self {
            short_delay: self.short_delay.clamped(),
            long_pause: self.long_pause.clamped(),
            search_page_delay: self.search_page_delay.clamped(),
            backoff_factor: bound(self.backoff_factor, 1.0),
            min_multiplier,
            max_multiplier,
            max_consecutive_failures: self.max_consecutive_failures.max(1),
            max_consecutive_hard_failures: self.max_consecutive_hard_failures.max(1),
            ..self.clone()
        }
    }
}

/// Seconds to a wait, saturating at [`MAX_DELAY`].
fn wait_for(secs: f64) -> Duration {
    if secs.is_nan() || secs <= 0.0 {
        return Duration::ZERO;
    }
    Duration::try_from_secs_f64(secs).map_or(MAX_DELAY, |d| d.min(MAX_DELAY))
}

/// Controller phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RatePhase {
    Idle,
    CoolingDown,
    LongPause,
    Backoff,
    /// Terminal.
    Halted,
}

impl std::fmt::Display for RatePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Idle => "idle",
            Self::CoolingDown => "cooling-down",
            Self::LongPause => "long-pause",
            Self::Backoff => "backoff",
            Self::Halted => "halted",
        })
    }
}

/// Everything the controller knows about the session so far.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateState {
    pub visits_since_pause: u32,
    pub total_visits: u32,
    pub consecutive_failures: u32,
    pub consecutive_hard_failures: u32,
    /// Floor for the next delay while failures are outstanding.
    pub base_delay: Duration,
    pub multiplier: f64,
    pub phase: RatePhase,
}

impl RateState {
    fn new(multiplier: f64) -> Self {
        Self {
            visits_since_pause: 0,
            total_visits: 0,
            consecutive_failures: 0,
            consecutive_hard_failures: 0,
            base_delay: Duration::ZERO,
            multiplier,
            phase: RatePhase::Idle,
        }
    }
}

/// A planned visit: the jittered delay plus an optional long pause before it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VisitPlan {
    pub delay: Duration,
    pub long_pause: Option<Duration>,
}

impl VisitPlan {
    pub fn total(&self) -> Duration {
        self.delay + self.long_pause.unwrap_or_default()
    }
}

/// Result of asking for permission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Proceed,
    /// The session was cancelled during the wait. Nothing was granted.
    Cancelled,
}

/// Read-only snapshot for reporting.
#[derive(Debug, Clone, Serialize)]
pub struct RateStats {
    pub total_visits: u32,
    pub visit_cap: u32,
    pub consecutive_failures: u32,
    pub consecutive_hard_failures: u32,
    pub multiplier: f64,
    pub phase: RatePhase,
    pub elapsed_secs: f64,
}

/// Stateful pacing, backoff and circuit breaker for one session.
pub struct AdaptiveRateController {
    config: PacingConfig,
    state: RateState,
    rng: StdRng,
    started: Instant,
    events: Option<EventBus>,
}

impl std::fmt::Debug for AdaptiveRateController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdaptiveRateController")
            .field("config", &self.config)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl AdaptiveRateController {
    pub fn new(config: PacingConfig) -> Self {
        Self::with_rng(config, StdRng::from_entropy())
    }

    /// Deterministic jitter, for tests and replays.
    pub fn with_seed(config: PacingConfig, seed: u64) -> Self {
        Self::with_rng(config, StdRng::seed_from_u64(seed))
    }

    fn with_rng(config: PacingConfig, rng: StdRng) -> Self {
        let config = config.normalized();
        let state = RateState::new(config.min_multiplier);
        Self {
            config,
            state,
            rng,
            started: Instant::now(),
            events: None,
        }
    }

    pub fn with_events(mut self, bus: EventBus) -> Self {
        self.set_events(bus);
        self
    }

    pub fn set_events(&mut self, bus: EventBus) {
        self.events = Some(bus);
    }

    pub fn config(&self) -> &PacingConfig {
        &self.config
    }

    pub fn state(&self) -> &RateState {
        &self.state
    }

    pub fn is_halted(&self) -> bool {
        self.state.phase == RatePhase::Halted
    }

    fn check_open(&self) -> Result<(), PacingError> {
        if self.is_halted() {
            return Err(PacingError::Halted {
                consecutive_failures: self.state.consecutive_failures,
            });
        }
        Ok(())
    }

    /// Plan the next visit without waiting.
    ///
    /// While failures are outstanding the delay is floored at the previous
    /// one, so it never decreases until successes clear the counter.
    pub fn plan_visit(&mut self) -> Result<VisitPlan, PacingError> {
        self.check_open()?;
        let cap = self.config.effective_visit_cap();
        if self.state.total_visits >= cap {
            return Err(PacingError::VisitCapReached { cap });
        }

        let jitter = self.config.short_delay.sample(&mut self.rng);
        let mut delay = wait_for(jitter * self.state.multiplier);
        if self.state.consecutive_failures > 0 {
            delay = delay.max(self.state.base_delay);
            self.state.base_delay = delay;
        }

        let every = self.config.visits_per_long_pause;
        let long_pause = (every > 0 && self.state.visits_since_pause >= every).then(|| {
            wait_for(self.config.long_pause.sample(&mut self.rng))
        });

        Ok(VisitPlan { delay, long_pause })
    }

    /// Wait for permission to visit.
    ///
    /// Fails once halted or when the visit cap is reached. A cancellation
    /// during the wait returns [`Admission::Cancelled`] and grants nothing.
    pub async fn admit(&mut self, cancel: &CancellationToken) -> Result<Admission, PacingError> {
        if cancel.is_cancelled() {
            return Ok(Admission::Cancelled);
        }
        let plan = self.plan_visit()?;

        if let Some(pause) = plan.long_pause {
            info!(
                "Long pause: {:.1}s (after {} visits)",
                pause.as_secs_f64(),
                self.state.total_visits
            );
            self.state.phase = RatePhase::LongPause;
            self.announce(PauseKind::Long, pause);
            if !sleep_or_cancel(pause, cancel).await {
                self.settle_phase();
                return Ok(Admission::Cancelled);
            }
            self.state.visits_since_pause = 0;
        }

        if self.state.consecutive_failures > 0 {
            info!(
                "Backoff: {:.1}s (consecutive failures: {})",
                plan.delay.as_secs_f64(),
                self.state.consecutive_failures
            );
        } else {
            debug!("Visit delay: {:.1}s", plan.delay.as_secs_f64());
        }
        self.state.phase = RatePhase::CoolingDown;
        self.announce(PauseKind::Visit, plan.delay);
        let completed = sleep_or_cancel(plan.delay, cancel).await;
        self.settle_phase();
        if !completed {
            return Ok(Admission::Cancelled);
        }

        self.state.total_visits += 1;
        self.state.visits_since_pause += 1;
        Ok(Admission::Proceed)
    }

    /// Wait between search pages. Not counted as a visit.
    pub async fn pace_page(&mut self, cancel: &CancellationToken) -> Result<Admission, PacingError> {
        if cancel.is_cancelled() {
            return Ok(Admission::Cancelled);
        }
        self.check_open()?;
        let delay = wait_for(self.config.search_page_delay.sample(&mut self.rng));
        debug!("Search page delay: {:.1}s", delay.as_secs_f64());
        self.announce(PauseKind::SearchPage, delay);
        if sleep_or_cancel(delay, cancel).await {
            Ok(Admission::Proceed)
        } else {
            Ok(Admission::Cancelled)
        }
    }

    /// Record the outcome of the last granted visit.
    pub fn report(&mut self, outcome: Outcome) {
        if self.is_halted() {
            return;
        }
        let s = &mut self.state;
        match outcome {
            Outcome::Success => {
                s.consecutive_failures = s.consecutive_failures.saturating_sub(1);
                s.consecutive_hard_failures = s.consecutive_hard_failures.saturating_sub(1);
                if s.consecutive_failures == 0 {
                    s.multiplier = self.config.min_multiplier;
                    s.base_delay = Duration::ZERO;
                }
            }
            Outcome::SoftFailure | Outcome::HardFailure => {
                s.consecutive_failures += 1;
                if outcome == Outcome::HardFailure {
                    s.consecutive_hard_failures += 1;
                } else {
                    s.consecutive_hard_failures = 0;
                }
                if s.consecutive_failures >= self.config.backoff_after_failures {
                    s.multiplier = (s.multiplier * self.config.backoff_factor)
                        .clamp(self.config.min_multiplier, self.config.max_multiplier);
                }
            }
        }

        let halt = s.consecutive_failures >= self.config.max_consecutive_failures
            || s.consecutive_hard_failures >= self.config.max_consecutive_hard_failures;
        if halt {
            warn!(
                failures = s.consecutive_failures,
                hard_failures = s.consecutive_hard_failures,
                "Rate controller halted"
            );
            s.phase = RatePhase::Halted;
            let consecutive_failures = s.consecutive_failures;
            emit(&self.events, HarvestEvent::Halted { consecutive_failures });
        } else {
            self.settle_phase();
        }
    }

    /// Snapshot of the session's pacing so far.
    pub fn stats(&self) -> RateStats {
        RateStats {
            total_visits: self.state.total_visits,
            visit_cap: self.config.effective_visit_cap(),
            consecutive_failures: self.state.consecutive_failures,
            consecutive_hard_failures: self.state.consecutive_hard_failures,
            multiplier: self.state.multiplier,
            phase: self.state.phase,
            elapsed_secs: self.started.elapsed().as_secs_f64(),
        }
    }

    fn settle_phase(&mut self) {
        if self.is_halted() {
            return;
        }
        self.state.phase = if self.state.consecutive_failures > 0 {
            RatePhase::Backoff
        } else {
            RatePhase::Idle
        };
    }

    fn announce(&self, kind: PauseKind, delay: Duration) {
        emit(
            &self.events,
            HarvestEvent::PauseStarted {
                kind,
                delay_ms: delay.as_millis() as u64,
            },
        );
    }
}

/// Sleep unless cancelled first. Returns whether the full wait elapsed.
async fn sleep_or_cancel(delay: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn controller() -> AdaptiveRateController {
        AdaptiveRateController::with_seed(PacingConfig::default(), 7)
    }

    #[test]
    fn test_defaults() {
        let config = PacingConfig::default();
        assert_eq!(config.effective_visit_cap(), 50);
        let wide = PacingConfig {
            visit_cap: 500,
            ..PacingConfig::default()
        };
        assert_eq!(wide.effective_visit_cap(), HARD_VISIT_CAP);
    }

    #[test]
    fn test_delay_within_short_range_when_healthy() {
        let mut c = controller();
        for _ in 0..20 {
            let plan = c.plan_visit().unwrap();
            let secs = plan.delay.as_secs_f64();
            assert!((3.0..=7.0).contains(&secs), "delay {secs}");
            assert!(plan.long_pause.is_none());
        }
    }

    #[test]
    fn test_delay_non_decreasing_under_failures_and_reset_after_recovery() {
        let mut c = controller();
        let mut previous = Duration::ZERO;
        c.report(Outcome::SoftFailure);
        for _ in 0..3 {
            let plan = c.plan_visit().unwrap();
            assert!(plan.delay >= previous);
            previous = plan.delay;
            c.report(Outcome::SoftFailure);
        }
        assert_eq!(c.state().consecutive_failures, 4);
        assert_eq!(c.state().multiplier, 16.0);

        // A partial recovery keeps the floor.
        c.report(Outcome::Success);
        assert!(c.plan_visit().unwrap().delay >= previous);

        for _ in 0..3 {
            c.report(Outcome::Success);
        }
        assert_eq!(c.state().consecutive_failures, 0);
        assert_eq!(c.state().multiplier, 1.0);
        assert_eq!(c.state().base_delay, Duration::ZERO);
        assert!(c.plan_visit().unwrap().delay <= Duration::from_secs(7));
    }

    #[test]
    fn test_halt_on_consecutive_failures_is_terminal() {
        let mut c = controller();
        for _ in 0..5 {
            c.report(Outcome::SoftFailure);
        }
        assert!(c.is_halted());
        assert_eq!(
            c.plan_visit(),
            Err(PacingError::Halted {
                consecutive_failures: 5
            })
        );
        c.report(Outcome::Success);
        assert!(c.is_halted());
        assert!(c.plan_visit().is_err());
    }

    #[test]
    fn test_halt_on_consecutive_hard_failures() {
        let mut c = controller();
        c.report(Outcome::HardFailure);
        c.report(Outcome::HardFailure);
        assert!(!c.is_halted());
        c.report(Outcome::HardFailure);
        assert!(c.is_halted());
        assert_eq!(c.state().phase, RatePhase::Halted);
    }

    #[test]
    fn test_soft_failure_breaks_hard_streak() {
        let mut c = controller();
        c.report(Outcome::HardFailure);
        c.report(Outcome::HardFailure);
        c.report(Outcome::SoftFailure);
        c.report(Outcome::HardFailure);
        assert!(!c.is_halted());
        assert_eq!(c.state().consecutive_hard_failures, 1);
        assert_eq!(c.state().consecutive_failures, 4);
    }

    #[test]
    fn test_backoff_after_threshold() {
        let config = PacingConfig {
            backoff_after_failures: 2,
            ..PacingConfig::default()
        };
        let mut c = AdaptiveRateController::with_seed(config, 1);
        c.report(Outcome::SoftFailure);
        assert_eq!(c.state().multiplier, 1.0);
        c.report(Outcome::SoftFailure);
        assert_eq!(c.state().multiplier, 2.0);
    }

    #[test]
    fn test_delay_non_decreasing_under_hard_failures() {
        let mut c = controller();
        let mut previous = Duration::ZERO;
        for _ in 0..2 {
            c.report(Outcome::HardFailure);
            let delay = c.plan_visit().unwrap().delay;
            assert!(delay >= previous, "{delay:?} < {previous:?}");
            previous = delay;
        }
        assert_eq!(c.state().consecutive_hard_failures, 2);
        assert_eq!(c.state().phase, RatePhase::Backoff);
    }

    #[test]
    fn test_delay_non_decreasing_under_mixed_failures() {
        let mut c = controller();
        let mut previous = Duration::ZERO;
        for outcome in [
            Outcome::HardFailure,
            Outcome::SoftFailure,
            Outcome::HardFailure,
            Outcome::SoftFailure,
        ] {
            c.report(outcome);
            let delay = c.plan_visit().unwrap().delay;
            assert!(delay >= previous, "{delay:?} < {previous:?}");
            previous = delay;
        }
        assert!(!c.is_halted());
        assert_eq!(c.state().consecutive_failures, 4);
        assert_eq!(c.state().consecutive_hard_failures, 0);
    }

    #[test]
    fn test_reversed_multiplier_bounds_are_ordered() {
        let config = PacingConfig {
            min_multiplier: 8.0,
            max_multiplier: 2.0,
            backoff_factor: 0.5,
            ..PacingConfig::default()
        };
        let mut c = AdaptiveRateController::with_seed(config, 5);
        assert_eq!(c.config().max_multiplier, 8.0);
        assert_eq!(c.config().backoff_factor, 1.0);
        c.report(Outcome::SoftFailure);
        assert_eq!(c.state().multiplier, 8.0);
        c.report(Outcome::Success);
        assert_eq!(c.state().multiplier, 8.0);
    }

    #[test]
    fn test_oversized_delays_saturate() {
        let config = PacingConfig {
            short_delay: DelayRange::new(1e300, f64::INFINITY),
            long_pause: DelayRange::new(-5.0, f64::NAN),
            max_multiplier: 1e9,
            visits_per_long_pause: 1,
            ..PacingConfig::default()
        };
        let mut c = AdaptiveRateController::with_seed(config, 9);
        assert_eq!(c.config().max_multiplier, MAX_BACKOFF_MULTIPLIER);
        c.report(Outcome::SoftFailure);
        c.report(Outcome::SoftFailure);
        let plan = c.plan_visit().unwrap();
        assert_eq!(plan.delay, MAX_DELAY);
        assert!(plan.long_pause.is_none());

        c.state.visits_since_pause = 1;
        assert_eq!(c.plan_visit().unwrap().long_pause, Some(Duration::ZERO));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stats_snapshot() {
        let mut c = controller();
        let cancel = CancellationToken::new();
        assert_eq!(c.admit(&cancel).await.unwrap(), Admission::Proceed);
        c.report(Outcome::SoftFailure);

        let stats = c.stats();
        assert_eq!(stats.total_visits, 1);
        assert_eq!(stats.visit_cap, 50);
        assert_eq!(stats.consecutive_failures, 1);
        assert_eq!(stats.multiplier, 2.0);
        assert_eq!(stats.phase, RatePhase::Backoff);
        assert_eq!(stats.phase.to_string(), "backoff");
        assert!(stats.elapsed_secs >= 3.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_admit_counts_visits_and_inserts_long_pause() {
        let config = PacingConfig {
            visits_per_long_pause: 2,
            ..PacingConfig::default()
        };
        let mut c = AdaptiveRateController::with_seed(config, 3);
        let cancel = CancellationToken::new();

        for _ in 0..2 {
            assert_eq!(c.admit(&cancel).await.unwrap(), Admission::Proceed);
        }
        assert_eq!(c.state().visits_since_pause, 2);
        assert!(c.plan_visit().unwrap().long_pause.is_some());

        let before = Instant::now();
        assert_eq!(c.admit(&cancel).await.unwrap(), Admission::Proceed);
        assert!(before.elapsed() >= Duration::from_secs(18));
        assert_eq!(c.state().visits_since_pause, 1);
        assert_eq!(c.state().total_visits, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_visit_cap() {
        let config = PacingConfig {
            visit_cap: 2,
            ..PacingConfig::default()
        };
        let mut c = AdaptiveRateController::with_seed(config, 3);
        let cancel = CancellationToken::new();
        c.admit(&cancel).await.unwrap();
        c.admit(&cancel).await.unwrap();
        assert_eq!(
            c.admit(&cancel).await,
            Err(PacingError::VisitCapReached { cap: 2 })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_during_wait_grants_nothing() {
        let mut c = controller();
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });
        assert_eq!(c.admit(&cancel).await.unwrap(), Admission::Cancelled);
        assert_eq!(c.state().total_visits, 0);
        assert_eq!(c.pace_page(&cancel).await.unwrap(), Admission::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pace_page_is_not_a_visit() {
        let mut c = controller();
        let cancel = CancellationToken::new();
        let before = Instant::now();
        assert_eq!(c.pace_page(&cancel).await.unwrap(), Admission::Proceed);
        assert!(before.elapsed() >= Duration::from_secs(5));
        assert_eq!(c.state().total_visits, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_halt_emits_event() {
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();
        let mut c = controller().with_events(bus);
        for _ in 0..3 {
            c.report(Outcome::HardFailure);
        }
        match rx.try_recv().unwrap() {
            HarvestEvent::Halted {
                consecutive_failures,
            } => assert_eq!(consecutive_failures, 3),
            other => panic!("unexpected event {other:?}"),
        }
        let cancel = CancellationToken::new();
        assert!(c.pace_page(&cancel).await.is_err());
    }
}
