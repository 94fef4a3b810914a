//! Command-line tournament runner.
//!
//! # Usage
//!
//! ```bash
//! # 100 games on 9x9 between the engines listed in engines.json
//! gtp-match --engines engines.json --games 100 --results results.json
//!
//! # Resume half of the games from saved records and keep every game
//! gtp-match --engines engines.json --resume 0.5 --records openings/ --save games/
//! ```
//!
//! Every option not given on the command line falls back to its `GTP_*` environment variable
//! (see the `configuration` module), then to its default.

use std::path::PathBuf;

use clap::Parser;

use gtp_tournament::prelude::*;

#[derive(Parser)]
#[command(name = "gtp-match")]
#[command(about = "Rating tournament between GTP engines")]
#[command(version)]
struct Cli {
    /// JSON list of engine descriptors
    #[arg(short, long)]
    engines: PathBuf,

    /// Number of games to play (unbounded when absent)
    #[arg(short, long)]
    games: Option<u64>,

    /// Board size, from 1 to 25
    #[arg(short, long, value_parser = clap::value_parser!(u8).range(1..=25))]
    boardsize: Option<u8>,

    /// Komi of games started from an empty board
    #[arg(short, long)]
    komi: Option<f32>,

    /// Probability of starting a game from a saved record
    #[arg(long)]
    resume: Option<f64>,

    /// Directory of saved records to resume from
    #[arg(long)]
    records: Option<PathBuf>,

    /// Directory where finished games are saved
    #[arg(long)]
    save: Option<PathBuf>,

    /// Results file, rewritten after every game
    #[arg(long)]
    results: Option<PathBuf>,

    /// Moves after which the judge scores the game
    #[arg(long)]
    max_moves: Option<usize>,

    /// Random seed for reproducible pairings
    #[arg(long)]
    seed: Option<u64>,

    /// Log every engine exchange to a timestamped file
    #[arg(long)]
    log: bool,

    /// Copy engines' stderr to this terminal
    #[arg(long)]
    forward_stderr: bool,

    /// Do not print games and leaderboard
    #[arg(short, long)]
    quiet: bool,
}

impl Cli {
    fn configuration(&self) -> Configuration {
        let mut config = Configuration::from_env();
        if let Some(size) = self.boardsize {
            config = config.with_board_size(size);
        }
        if let Some(komi) = self.komi {
            config = config.with_komi(komi);
        }
        if let Some(probability) = self.resume {
            config = config.with_resume_probability(probability);
        }
        if let Some(dir) = &self.records {
            config = config.with_record_source_dir(dir);
        }
        if let Some(dir) = &self.save {
            config = config.with_save_dir(dir);
        }
        if let Some(path) = &self.results {
            config = config.with_results_path(path);
        }
        if self.max_moves.is_some() {
            config = config.with_max_moves(self.max_moves);
        }
        if self.seed.is_some() {
            config = config.with_seed(self.seed);
        }
        if self.log {
            config = config.with_log(true);
        }
        if self.forward_stderr {
            config = config.with_forward_engine_stderr(true);
        }
        if self.quiet {
            config = config.with_verbose(false);
        }
        config
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let descriptors = load_descriptors(&cli.engines)?;

    let mut scheduler = MatchScheduler::from_descriptors(descriptors, cli.configuration())?;
    let outcome = scheduler.run(cli.games);
    scheduler.shutdown();
    outcome?;
    Ok(())
}
