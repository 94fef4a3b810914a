use std::hash::Hash;

use crate::engine::{EngineClient, Lifecycle};
use crate::rating::Rating;
use crate::results::{EngineSummary, Wdl};

/// Outcome of a game from one participant's side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Won the game.
    Win,
    /// Drew the game.
    Draw,
    /// Lost the game.
    Lose,
}

/// A registered engine: its process, its rating and its record.
#[derive(Debug)]
pub struct EngineEntry {
    pub name: String,
    pub command: String,
    pub rating: Rating,
    pub client: EngineClient,
    pub black: Wdl,
    pub white: Wdl,
    pub games_played: u32,
    pub lifecycle: Lifecycle,
    pub anchor: bool,
    /// Reason the engine was taken out of the pool.
    pub disabled: Option<String>,
}

impl PartialEq for EngineEntry {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for EngineEntry {}

impl Hash for EngineEntry {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl EngineEntry {
    pub fn new(name: String, client: EngineClient, rating: Rating, anchor: bool) -> EngineEntry {
        EngineEntry {
            name,
            command: client.command().to_string(),
            lifecycle: client.options().lifecycle(),
            rating,
            client,
            black: Wdl::default(),
            white: Wdl::default(),
            games_played: 0,
            anchor,
            disabled: None,
        }
    }

    /// Counts one finished game played as `color_is_black`.
    pub fn record(&mut self, color_is_black: bool, outcome: Outcome) {
        let counters = if color_is_black {
            &mut self.black
        } else {
            &mut self.white
        };
        match outcome {
            Outcome::Win => counters.win += 1,
            Outcome::Draw => counters.draw += 1,
            Outcome::Lose => counters.lose += 1,
        }
        self.games_played += 1;
    }

    pub fn is_available(&self) -> bool {
        self.disabled.is_none()
    }

    pub fn summary(&self) -> EngineSummary {
        EngineSummary {
            name: self.name.clone(),
            command: self.command.clone(),
            rating: self.rating.value(),
            k: self.rating.k(),
            games: self.games_played,
            black: self.black,
            white: self.white,
            anchor: self.anchor,
            disabled: self.disabled.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineOptions;

    #[test]
    fn counters_are_split_by_colour() {
        let Ok(client) = EngineClient::launch(
            "sh tests/engines/fake_gtp.sh",
            EngineOptions::player(),
        ) else {
            panic!("fake engine did not start");
        };
        let mut entry = EngineEntry::new("fake".to_string(), client, Rating::new(1500.0, 32.0), false);
        entry.record(true, Outcome::Win);
        entry.record(true, Outcome::Draw);
        entry.record(false, Outcome::Lose);

        assert_eq!(entry.games_played, 3);
        assert_eq!(entry.black.to_string(), "1-1-0");
        assert_eq!(entry.white.to_string(), "0-0-1");
        assert_eq!((entry.black + entry.white).total(), 3);

        let summary = entry.summary();
        assert_eq!(summary.name, "fake");
        assert_eq!(summary.games, 3);
        entry.client.shutdown();
    }
}
