//! Elo-style skill ratings.
//!
//! The expected score of `a` against `b` is
//! `1 / (1 + 10^((b - a) / 400))`. After a game both sides move by
//! `k * (actual - expected)` in opposite directions, so with equal `k` the
//! sum of both ratings is unchanged. A rating with `k = 0` never moves.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Rating of an engine that did not configure one.
pub const DEFAULT_RATING: f64 = 1500.0;

/// Adaptation rate of a newcomer.
pub const DEFAULT_K: f64 = 32.0;

/// A rating value and its adaptation rate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rating {
    value: f64,
    k: f64,
}

impl Rating {
    /// Creates a rating; a negative `k` is clamped to zero.
    pub fn new(value: f64, k: f64) -> Rating {
        Rating {
            value,
            k: k.max(0.0),
        }
    }

    /// A rating that never changes.
    pub fn pinned(value: f64) -> Rating {
        Rating::new(value, 0.0)
    }

    /// Current value.
    pub fn value(&self) -> f64 {
        self.value
    }

    /// Current adaptation rate.
    pub fn k(&self) -> f64 {
        self.k
    }

    /// Expected score of `self` against `opponent`, in `[0, 1]`.
    pub fn expected(&self, opponent: &Rating) -> f64 {
        1.0 / (1.0 + 10f64.powf((opponent.value - self.value) / 400.0))
    }

    /// `self` won against `opponent`.
    pub fn beat(&mut self, opponent: &mut Rating) {
        self.update(opponent, 1.0);
    }

    /// `self` drew with `opponent`.
    pub fn draw(&mut self, opponent: &mut Rating) {
        self.update(opponent, 0.5);
    }

    fn update(&mut self, opponent: &mut Rating, score: f64) {
        let expected = self.expected(opponent);
        self.value += self.k * (score - expected);
        opponent.value += opponent.k * (expected - score);
    }

    /// Moves the value by `offset` without touching `k`.
    pub(crate) fn shift(&mut self, offset: f64) {
        self.value += offset;
    }

    /// Applies one game's worth of adaptation-rate decay.
    pub fn decay(&mut self, schedule: &RatingDecay) {
        if self.k <= schedule.floor {
            return;
        }
        let factor = if self.k < schedule.threshold {
            schedule.fast_factor
        } else {
            schedule.factor
        };
        self.k = (self.k * factor).max(schedule.floor);
    }
}

impl fmt::Display for Rating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value.round())
    }
}

/// How fast adaptation rates shrink as engines play more games.
///
/// After every game, `k` is multiplied by `factor`, or by `fast_factor` once
/// it went below `threshold`. It never goes below `floor`; rates already at
/// or below the floor (pinned ratings included) are left alone.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RatingDecay {
    /// Per-game multiplier above the threshold.
    pub factor: f64,
    /// Per-game multiplier below the threshold.
    pub fast_factor: f64,
    /// Rate under which `fast_factor` applies.
    pub threshold: f64,
    /// Smallest rate reachable through decay.
    pub floor: f64,
}

impl RatingDecay {
    /// Multiplier that halves `k` every `games` games.
    pub fn factor_for_half_life(games: f64) -> f64 {
        0.5f64.powf(1.0 / games)
    }

    /// A schedule that keeps every rate as configured.
    pub fn none() -> RatingDecay {
        RatingDecay {
            factor: 1.0,
            fast_factor: 1.0,
            threshold: 0.0,
            floor: 0.0,
        }
    }
}

impl Default for RatingDecay {
    fn default() -> Self {
        RatingDecay {
            factor: Self::factor_for_half_life(100.0),
            fast_factor: Self::factor_for_half_life(50.0),
            threshold: 16.0,
            floor: 8.0,
        }
    }
}
