//! Results summary of a run.
//!
//! The whole table is written again after every game, so the file on disk always holds the
//! current totals.

use std::fmt;
use std::fs;
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

/// Win/draw/loss counters.
#[derive(PartialEq, Eq, PartialOrd, Ord, Default, Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Wdl {
    /// Number of wins.
    pub win: u32,
    /// Number of draws.
    pub draw: u32,
    /// Number of losses.
    pub lose: u32,
}

impl Wdl {
    /// Games counted.
    pub fn total(&self) -> u32 {
        self.win + self.draw + self.lose
    }
}

impl std::ops::Add for Wdl {
    type Output = Wdl;

    fn add(self, rhs: Wdl) -> Wdl {
        Wdl {
            win: self.win + rhs.win,
            draw: self.draw + rhs.draw,
            lose: self.lose + rhs.lose,
        }
    }
}

impl fmt::Display for Wdl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}-{}", self.win, self.draw, self.lose)
    }
}

/// Standing of one engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineSummary {
    /// Unique name.
    pub name: String,
    /// Launch command.
    pub command: String,
    /// Current rating.
    pub rating: f64,
    /// Current adaptation rate.
    pub k: f64,
    /// Games played.
    pub games: u32,
    /// Record with black.
    pub black: Wdl,
    /// Record with white.
    pub white: Wdl,
    /// Whether the rating is the fixed reference.
    pub anchor: bool,
    /// Why the engine left the pool, if it did.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disabled: Option<String>,
}

/// Results of every engine of a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultsTable {
    /// Games finished so far.
    pub games: u64,
    /// One entry per registered engine.
    pub engines: Vec<EngineSummary>,
}

impl ResultsTable {
    /// Overwrites `path` with the table.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).with_context(|| format!("cannot write results to {}", path.display()))
    }

    /// Reads a table written by [`save`](Self::save).
    pub fn load(path: &Path) -> anyhow::Result<ResultsTable> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("cannot read results from {}", path.display()))?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Engines by decreasing rating.
    pub fn ranked(&self) -> Vec<&EngineSummary> {
        let mut ranked = self.engines.iter().collect::<Vec<_>>();
        ranked.sort_by(|a, b| b.rating.total_cmp(&a.rating));
        ranked
    }

    /// Printable leaderboard, best rating first.
    pub fn leaderboard(&self) -> String {
        let width = self
            .engines
            .iter()
            .map(|e| e.name.len())
            .max()
            .unwrap_or(0)
            .max(4);
        let mut out = format!(
            "{:<4} {:<width$} {:>7} {:>6} {:>11} {:>11}\n",
            "#", "name", "rating", "games", "black", "white"
        );
        for (rank, engine) in self.ranked().into_iter().enumerate() {
            let mut name = engine.name.clone();
            if engine.anchor {
                name.push('*');
            }
            out.push_str(&format!(
                "{:<4} {:<width$} {:>7.0} {:>6} {:>11} {:>11}",
                rank + 1,
                name,
                engine.rating,
                engine.games,
                engine.black.to_string(),
                engine.white.to_string(),
            ));
            if let Some(reason) = &engine.disabled {
                out.push_str(&format!("  ({reason})"));
            }
            out.push('\n');
        }
        out
    }
}
