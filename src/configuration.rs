//! Config for the match runner
//!
//! This module provides the options controlling a tournament run, and the engine descriptor file
//! listing which engines take part.
//!
//! Configuration can be created programmatically using [`Configuration::new()`] or by reading
//! environment variables using [`Configuration::from_env()`].
//!
//! # Environment Variables
//!
//! The following environment variables can be used to override configuration values. All
//! values are optional. Flags are case-insensitive, set them to `"true"` to enable them.
//!
//! - `GTP_VERBOSE` — Print one line per finished game and a final leaderboard (default: `true`)
//! - `GTP_LOG` — Enable logging to a file (default: `false`)
//! - `GTP_FORWARD_STDERR` — Copy engines' stderr to our stderr (default: `false`)
//! - `GTP_BOARD_SIZE` — Board size of every game (default: `9`)
//! - `GTP_KOMI` — Komi of every game (default: `7.0`)
//! - `GTP_RESUME_PROBABILITY` — Chance to start a game from a saved record (default: `0.0`)
//! - `GTP_RECORD_DIR` — Directory of saved records to resume from
//! - `GTP_SAVE_DIR` — Directory where finished games are written
//! - `GTP_RESULTS` — Results file, rewritten after every game
//! - `GTP_MAX_MOVES` — Moves after which the judge scores the game
//! - `GTP_SEED` — Seed of the pairing/colour/record random generator
//!
//! # Engine descriptors
//!
//! Engines are described in a JSON array:
//!
//! ```json
//! [
//!   { "name": "gnugo", "command": "gnugo --mode gtp", "roles": ["judge"] },
//!   { "name": "leela", "command": "leelaz -g -w net.gz", "elo": 1800 },
//!   { "name": "anchor", "command": "gnugo --mode gtp --level 1", "roles": ["fixed"], "elo": 1000 },
//!   { "name": "big", "command": "katago gtp", "roles": ["player", "lazy"], "k": 16 }
//! ]
//! ```
//!
//! An engine without roles is a player. `fixed` pins the rating of a player (the anchor), `lazy`
//! stops its process between games, and `skip` leaves the entry out of the run.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashSet;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::rating::{RatingDecay, DEFAULT_K, DEFAULT_RATING};
use crate::vertex::MAX_BOARD_SIZE;

/// Configuration of a tournament run.
#[derive(Debug, Clone)]
pub struct Configuration {
    pub(crate) verbose: bool,
    pub(crate) log: bool,
    pub(crate) forward_engine_stderr: bool,
    pub(crate) board_size: u8,
    pub(crate) komi: f32,
    pub(crate) resume_probability: f64,
    pub(crate) record_source_dir: Option<PathBuf>,
    pub(crate) save_dir: Option<PathBuf>,
    pub(crate) results_path: Option<PathBuf>,
    pub(crate) max_moves: Option<usize>,
    pub(crate) rating_decay: RatingDecay,
    pub(crate) default_k: f64,
    pub(crate) seed: Option<u64>,
}

impl Configuration {
    /// Create a new configuration with default parameters.
    ///
    /// By default:
    /// - Finished games are printed to stdout.
    /// - Logging to file is disabled.
    /// - Engine stderr is not forwarded.
    /// - Games are played on a 9x9 board with a komi of 7.
    /// - Games always start from an empty board.
    /// - Nothing is written to disk.
    /// - Games only end by resignation, forfeit or two passes.
    pub fn new() -> Self {
        Self {
            verbose: true,
            log: false,
            forward_engine_stderr: false,
            board_size: 9,
            komi: 7.0,
            resume_probability: 0.0,
            record_source_dir: None,
            save_dir: None,
            results_path: None,
            max_moves: None,
            rating_decay: RatingDecay::default(),
            default_k: DEFAULT_K,
            seed: None,
        }
    }

    /// Create configuration from environment variables.
    ///
    /// See the [module documentation](self) for the recognized variables. Unset variables keep
    /// their default value; unparsable ones are reported and ignored.
    pub fn from_env() -> Self {
        fn get_env_flag(var: &str, default: bool) -> bool {
            match std::env::var(var) {
                Ok(val) => val.eq_ignore_ascii_case("true"),
                Err(_) => default,
            }
        }

        fn get_env_value<T: FromStr>(var: &str) -> Option<T> {
            let raw = std::env::var(var).ok()?;
            match raw.trim().parse() {
                Ok(value) => Some(value),
                Err(_) => {
                    warn!("ignoring {var}={raw:?}: cannot parse it");
                    None
                }
            }
        }

        let defaults = Self::new();
        Self {
            verbose: get_env_flag("GTP_VERBOSE", true),
            log: get_env_flag("GTP_LOG", false),
            forward_engine_stderr: get_env_flag("GTP_FORWARD_STDERR", false),
            board_size: get_env_value::<u8>("GTP_BOARD_SIZE")
                .filter(|&size| {
                    let valid = (1..=MAX_BOARD_SIZE).contains(&size);
                    if !valid {
                        warn!("ignoring GTP_BOARD_SIZE={size}: boards go from 1 to {MAX_BOARD_SIZE}");
                    }
                    valid
                })
                .unwrap_or(defaults.board_size),
            komi: get_env_value("GTP_KOMI").unwrap_or(defaults.komi),
            resume_probability: get_env_value("GTP_RESUME_PROBABILITY")
                .unwrap_or(defaults.resume_probability),
            record_source_dir: get_env_value("GTP_RECORD_DIR"),
            save_dir: get_env_value("GTP_SAVE_DIR"),
            results_path: get_env_value("GTP_RESULTS"),
            max_moves: get_env_value("GTP_MAX_MOVES"),
            seed: get_env_value("GTP_SEED"),
            ..defaults
        }
    }

    /// Enable or disable printing of finished games and leaderboard.
    pub fn with_verbose(mut self, value: bool) -> Self {
        self.verbose = value;
        self
    }

    /// Enable or disable logging to file.
    pub fn with_log(mut self, value: bool) -> Self {
        self.log = value;
        self
    }

    /// Enable or disable engine stderr output (debug purposes only).
    pub fn with_forward_engine_stderr(mut self, value: bool) -> Self {
        self.forward_engine_stderr = value;
        self
    }

    /// Board size of every game, from 1 to [`MAX_BOARD_SIZE`].
    pub fn with_board_size(mut self, value: u8) -> Self {
        self.board_size = value;
        self
    }

    /// Komi of every game started from an empty board.
    pub fn with_komi(mut self, value: f32) -> Self {
        self.komi = value;
        self
    }

    /// Probability (clamped to `[0, 1]`) that a game resumes from a saved record.
    pub fn with_resume_probability(mut self, value: f64) -> Self {
        self.resume_probability = value.clamp(0.0, 1.0);
        self
    }

    /// Directory holding `.sgf` records to resume games from.
    pub fn with_record_source_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.record_source_dir = Some(dir.into());
        self
    }

    /// Directory where every finished game is saved.
    pub fn with_save_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.save_dir = Some(dir.into());
        self
    }

    /// File receiving the results table after every game.
    pub fn with_results_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.results_path = Some(path.into());
        self
    }

    /// Number of moves after which the judge scores the game.
    pub fn with_max_moves(mut self, value: Option<usize>) -> Self {
        self.max_moves = value;
        self
    }

    /// Decay schedule of the adaptation rates.
    pub fn with_rating_decay(mut self, value: RatingDecay) -> Self {
        self.rating_decay = value;
        self
    }

    /// Adaptation rate of engines whose descriptor sets none.
    pub fn with_default_k(mut self, value: f64) -> Self {
        self.default_k = value;
        self
    }

    /// Seed of the random generator, for reproducible pairings.
    pub fn with_seed(mut self, value: Option<u64>) -> Self {
        self.seed = value;
        self
    }

    /// Board size of every game.
    pub fn board_size(&self) -> u8 {
        self.board_size
    }

    /// Komi of games started from an empty board.
    pub fn komi(&self) -> f32 {
        self.komi
    }
}

impl Default for Configuration {
    fn default() -> Self {
        Self::new()
    }
}

/// Tag of an engine descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineRole {
    /// Plays games.
    Player,
    /// Checks legality and scores games. Never plays.
    Judge,
    /// Player whose rating never moves.
    Fixed,
    /// Player whose process only runs during its games.
    Lazy,
    /// Left out of the run.
    Skip,
}

fn default_elo() -> f64 {
    DEFAULT_RATING
}

/// One entry of the engine descriptor file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineDescriptor {
    /// Display name, made unique at registration.
    pub name: String,
    /// Launch command, split on whitespace.
    pub command: String,
    /// Roles; none means player.
    #[serde(default)]
    pub roles: Vec<EngineRole>,
    /// Starting rating.
    #[serde(default = "default_elo", alias = "default elo")]
    pub elo: f64,
    /// Starting adaptation rate, the configured default when absent.
    #[serde(default)]
    pub k: Option<f64>,
}

impl EngineDescriptor {
    /// Player descriptor with the default rating.
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            roles: vec![],
            elo: DEFAULT_RATING,
            k: None,
        }
    }

    /// Adds a role.
    pub fn with_role(mut self, role: EngineRole) -> Self {
        self.roles.push(role);
        self
    }

    /// Sets the starting rating.
    pub fn with_elo(mut self, elo: f64) -> Self {
        self.elo = elo;
        self
    }

    /// Sets the starting adaptation rate.
    pub fn with_k(mut self, k: f64) -> Self {
        self.k = Some(k);
        self
    }

    /// True when the descriptor carries `role`.
    pub fn has_role(&self, role: EngineRole) -> bool {
        self.roles.contains(&role)
    }

    /// True for entries taking part in games.
    pub fn is_player(&self) -> bool {
        if self.has_role(EngineRole::Skip) {
            return false;
        }
        self.roles.is_empty()
            || self.has_role(EngineRole::Player)
            || self.has_role(EngineRole::Fixed)
            || self.has_role(EngineRole::Lazy)
    }

    /// True for entries usable as the judge.
    pub fn is_judge(&self) -> bool {
        self.has_role(EngineRole::Judge) && !self.has_role(EngineRole::Skip)
    }
}

/// Reads a JSON array of engine descriptors.
pub fn load_descriptors(path: &Path) -> anyhow::Result<Vec<EngineDescriptor>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read engine list {}", path.display()))?;
    serde_json::from_str(&text)
        .with_context(|| format!("invalid engine list {}", path.display()))
}

/// Returns `name`, or `name-<hash>` until the result is not in `taken`.
///
/// The suffix is 6 hex digits of a hash of the last candidate, so repeated collisions give
/// different names.
pub fn unique_name(name: &str, taken: &HashSet<String>) -> String {
    let mut candidate = name.to_string();
    while taken.contains(&candidate) {
        let mut hasher = DefaultHasher::new();
        candidate.hash(&mut hasher);
        candidate = format!("{name}-{:06x}", hasher.finish() & 0xff_ffff);
    }
    candidate
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptors_from_json() {
        let json = r#"[
            { "name": "judge", "command": "gnugo --mode gtp", "roles": ["judge"] },
            { "name": "a", "command": "engine-a" },
            { "name": "b", "command": "engine-b", "roles": ["fixed"], "elo": 900, "k": 4 },
            { "name": "c", "command": "engine-c", "roles": ["lazy", "player"], "default elo": 1650 },
            { "name": "d", "command": "engine-d", "roles": ["skip"] }
        ]"#;
        let descriptors: Vec<EngineDescriptor> = serde_json::from_str(json).unwrap();

        assert!(descriptors[0].is_judge());
        assert!(!descriptors[0].is_player());
        assert!(descriptors[1].is_player());
        assert_eq!(descriptors[1].elo, DEFAULT_RATING);
        assert_eq!(descriptors[1].k, None);
        assert!(descriptors[2].is_player());
        assert_eq!(descriptors[2].elo, 900.0);
        assert_eq!(descriptors[2].k, Some(4.0));
        assert!(descriptors[3].has_role(EngineRole::Lazy));
        assert_eq!(descriptors[3].elo, 1650.0);
        assert!(!descriptors[4].is_player());
        assert!(!descriptors[4].is_judge());
    }

    #[test]
    fn unknown_role_is_rejected() {
        let json = r#"[{ "name": "a", "command": "a", "roles": ["referee"] }]"#;
        assert!(serde_json::from_str::<Vec<EngineDescriptor>>(json).is_err());
    }

    #[test]
    fn colliding_names_get_suffixes() {
        let mut taken = HashSet::new();
        let first = unique_name("leela", &taken);
        assert_eq!(first, "leela");
        taken.insert(first);

        let second = unique_name("leela", &taken);
        assert_ne!(second, "leela");
        assert!(second.starts_with("leela-"));
        assert_eq!(second.len(), "leela-".len() + 6);
        taken.insert(second.clone());

        let third = unique_name("leela", &taken);
        assert!(!taken.contains(&third));
        assert!(third.starts_with("leela-"));
    }

    #[test]
    fn unaddressable_board_size_is_ignored() {
        std::env::set_var("GTP_BOARD_SIZE", "40");
        assert_eq!(Configuration::from_env().board_size(), 9);
        std::env::set_var("GTP_BOARD_SIZE", "0");
        assert_eq!(Configuration::from_env().board_size(), 9);
        std::env::set_var("GTP_BOARD_SIZE", "25");
        assert_eq!(Configuration::from_env().board_size(), 25);
        std::env::remove_var("GTP_BOARD_SIZE");
    }

    #[test]
    fn builder_clamps_probability() {
        let config = Configuration::new()
            .with_resume_probability(3.0)
            .with_board_size(13);
        assert_eq!(config.resume_probability, 1.0);
        assert_eq!(config.board_size(), 13);
        assert_eq!(config.komi(), 7.0);
    }
}
