//! Scan debouncer.
//!
//! Filters the raw candidate stream down to confirmed-scan events. Pure
//! state transitions over `(state, candidate)`, so the whole thing tests
//! without a camera: time enters only through the candidate's capture
//! instant.

use std::time::{Duration, Instant};

use cartwheel_core::{Barcode, ConfirmedScan, ScanCandidate, ScanSource};

/// Debouncer tuning.
#[derive(Debug, Clone, PartialEq)]
pub struct DebounceConfig {
    /// Maximum decoder error estimate a candidate may carry; anything
    /// above is dropped as noise.
    pub accept_threshold: f32,
    /// Minimum time before the same code may confirm again.
    pub cooldown: Duration,
}

impl Default for DebounceConfig {
    fn default() -> Self {
        Self {
            accept_threshold: 0.22,
            cooldown: Duration::from_millis(2000),
        }
    }
}

/// Debouncer state.
#[derive(Debug, Clone, PartialEq)]
pub enum DebounceState {
    /// No recent confirmation; the next acceptable candidate confirms.
    Idle,
    /// A code confirmed recently; repeats are suppressed until expiry.
    Cooldown {
        /// The cooling code.
        code: Barcode,
        /// When the suppression lapses.
        expires: Instant,
    },
}

/// The scan debouncer.
///
/// Transition rules, applied per candidate:
///
/// 1. Error estimate above the acceptance threshold: dropped, state
///    unchanged.
/// 2. Same code as the cooling one before expiry: dropped (duplicate).
/// 3. Otherwise: a [`ConfirmedScan`] is emitted and the code enters
///    cooldown. A *different* code is therefore always accepted
///    immediately; the same code only after the window lapses.
///
/// Cooldown decays purely by time: expiry is checked lazily against the
/// next candidate's capture instant, no timer task involved.
#[derive(Debug)]
pub struct Debouncer {
    config: DebounceConfig,
    state: DebounceState,
}

impl Debouncer {
    /// Create a debouncer in the idle state.
    #[must_use]
    pub const fn new(config: DebounceConfig) -> Self {
        Self {
            config,
            state: DebounceState::Idle,
        }
    }

    /// Current state, for diagnostics.
    #[must_use]
    pub const fn state(&self) -> &DebounceState {
        &self.state
    }

    /// Feed one candidate through the state machine.
    ///
    /// Returns the confirmed scan when the candidate survives. Candidates
    /// whose code fails [`Barcode::parse`] are dropped as decoder noise.
    pub fn observe(&mut self, candidate: &ScanCandidate) -> Option<ConfirmedScan> {
        if candidate.error > self.config.accept_threshold {
            return None;
        }

        let Ok(barcode) = Barcode::parse(&candidate.code) else {
            return None;
        };

        if let DebounceState::Cooldown { code, expires } = &self.state
            && *code == barcode
            && candidate.at < *expires
        {
            return None;
        }

        self.state = DebounceState::Cooldown {
            code: barcode.clone(),
            expires: candidate.at + self.config.cooldown,
        };

        Some(ConfirmedScan {
            barcode,
            source: ScanSource::Camera,
            at: candidate.at,
        })
    }

    /// Drop any pending cooldown and return to idle.
    pub fn reset(&mut self) {
        self.state = DebounceState::Idle;
    }
}
