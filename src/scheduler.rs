//! Rating tournament between GTP engines.
//!
//! The [`MatchScheduler`] owns every player engine of the run plus one judge. The judge never
//! plays: it checks every generated move with `is_legal`, mirrors the game with `play` and
//! scores it with `final_score` once both players passed in a row.
//!
//! Each call to [`MatchScheduler::play_next_game`] runs one full game:
//!
//! 1. **select**: the engine with the fewest games plays an opponent drawn at random, closer
//!    ratings being more likely (see [`pairing_weight`]); colours are random.
//! 2. **resume**: with the configured probability, the moves of a saved record of the right
//!    board size are replayed into both players and the judge. A record that cannot be replayed
//!    is dropped and another one is tried; the game starts from an empty board when none fits.
//! 3. **play**: the side to move runs `genmove`. A resignation, a move off the board, a move
//!    the judge rejects or cannot read, or a failing engine ends the game; otherwise the move is
//!    sent to the opponent and the judge.
//! 4. **score**: after two passes in a row (or the configured move limit) the judge's score
//!    decides. A score not starting with `B+` or `W+` is a draw.
//! 5. **record**: ratings and counters are updated, the game and the results table are saved
//!    and lazy engines are put back to sleep.
//!
//! Games run one after another on the calling thread; every engine call blocks until the engine
//! answers.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context};
use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use time::{format_description::parse, OffsetDateTime};
use tracing::{debug, info, instrument, trace, warn};

use crate::configuration::{unique_name, Configuration, EngineDescriptor, EngineRole};
use crate::engine::{EngineClient, EngineOptions, Lifecycle};
use crate::engine_entry::{EngineEntry, Outcome};
use crate::error::GtpError;
use crate::logger::init_logger;
use crate::rating::Rating;
use crate::results::ResultsTable;
use crate::sgf::GameRecord;
use crate::vertex::{Color, Vertex, MAX_BOARD_SIZE};

/// Relative chance of pairing two engines `delta` rating points apart.
pub fn pairing_weight(delta: f64) -> f64 {
    1.0 / (1.0 + 10f64.powf(delta.abs() / 100.0))
}

/// Reads the winner out of a judge's `final_score` answer.
///
/// The first word is kept verbatim as the result tag when it starts with `B+` or `W+`;
/// anything else is a draw.
pub fn parse_final_score(score: &str) -> (Option<Color>, String) {
    let token = score.split_whitespace().next().unwrap_or_default();
    let upper = token.to_ascii_uppercase();
    if upper.starts_with("B+") {
        (Some(Color::Black), token.to_string())
    } else if upper.starts_with("W+") {
        (Some(Color::White), token.to_string())
    } else {
        (None, "Draw".to_string())
    }
}

/// Why a game ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    /// The loser resigned.
    Resignation,
    /// The loser played an illegal move or stopped answering.
    Forfeit,
    /// Both players passed; the judge scored the board.
    Score,
    /// The move limit was reached; the judge scored the board.
    MoveLimit,
}

/// Summary of a finished game.
#[derive(Debug, Clone, PartialEq)]
pub struct GameOutcome {
    /// Name of the black player.
    pub black: String,
    /// Name of the white player.
    pub white: String,
    /// Winner, `None` for a draw.
    pub winner: Option<Color>,
    /// Result tag (`B+Resign`, `W+Forfeit`, `B+12.5`, `Draw`, ...).
    pub result: String,
    /// How the game ended.
    pub reason: EndReason,
    /// Every move of the game, replayed ones included.
    pub moves: Vec<(Color, Vertex)>,
    /// Record the game was resumed from.
    pub resumed_from: Option<PathBuf>,
    /// Where the game was saved.
    pub record_path: Option<PathBuf>,
    /// Error that caused a forfeit.
    pub note: Option<String>,
}

#[derive(Debug)]
struct Finished {
    winner: Option<Color>,
    result: String,
    reason: EndReason,
    note: Option<String>,
}

impl Finished {
    fn resign(winner: Color) -> Self {
        Finished {
            winner: Some(winner),
            result: format!("{}+Resign", winner.sgf_tag()),
            reason: EndReason::Resignation,
            note: None,
        }
    }

    fn forfeit(winner: Color, note: String) -> Self {
        Finished {
            winner: Some(winner),
            result: format!("{}+Forfeit", winner.sgf_tag()),
            reason: EndReason::Forfeit,
            note: Some(note),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Player(Color),
    Judge,
}

#[derive(Debug)]
struct Fault {
    side: Side,
    error: GtpError,
}

struct Played {
    finished: Finished,
    moves: Vec<(Color, Vertex)>,
    komi: f32,
    resumed_from: Option<PathBuf>,
}

/// Runs games between registered engines and keeps their ratings.
#[derive(Debug)]
pub struct MatchScheduler {
    config: Configuration,
    entries: Vec<EngineEntry>,
    judge: EngineClient,
    judge_name: String,
    anchor: Option<(usize, f64)>,
    rng: StdRng,
    games: u64,
}

impl MatchScheduler {
    /// Launches the engines of `descriptors`.
    ///
    /// Engines that fail to start, miss a required command or do not answer `protocol_version`
    /// are left out with a warning. The first working `judge` entry becomes the judge. Fails
    /// when no judge or fewer than two players are left.
    #[instrument(skip_all)]
    pub fn from_descriptors(
        descriptors: Vec<EngineDescriptor>,
        config: Configuration,
    ) -> anyhow::Result<MatchScheduler> {
        if config.log {
            init_logger()?;
        }
        trace!(?config);
        if !(1..=MAX_BOARD_SIZE).contains(&config.board_size) {
            bail!(
                "board size {} is not supported, boards go from 1 to {MAX_BOARD_SIZE}",
                config.board_size
            );
        }

        let mut judge = None;
        for descriptor in descriptors.iter().filter(|d| d.is_judge()) {
            let options = EngineOptions::judge().with_forward_stderr(config.forward_engine_stderr);
            match EngineClient::launch(&descriptor.command, options) {
                Ok(client) => {
                    info!(judge = %descriptor.name, "judge launched");
                    judge = Some((descriptor.name.clone(), client));
                    break;
                }
                Err(e) => warn!(judge = %descriptor.name, "judge excluded: {e}"),
            }
        }
        let Some((judge_name, judge)) = judge else {
            bail!("no usable judge engine: at least one engine with the \"judge\" role is required");
        };

        let mut entries: Vec<EngineEntry> = vec![];
        let mut taken = HashSet::new();
        let mut anchor = None;
        for descriptor in descriptors.iter().filter(|d| d.is_player()) {
            let name = unique_name(&descriptor.name, &taken);
            let lifecycle = if descriptor.has_role(EngineRole::Lazy) {
                Lifecycle::Lazy
            } else {
                Lifecycle::AlwaysOn
            };
            let options = EngineOptions::player()
                .with_lifecycle(lifecycle)
                .with_forward_stderr(config.forward_engine_stderr);

            let mut client = match EngineClient::launch(&descriptor.command, options) {
                Ok(client) => client,
                Err(e) => {
                    warn!(engine = %name, "engine excluded: {e}");
                    continue;
                }
            };
            if let Err(e) = client.protocol_version() {
                warn!(engine = %name, "engine excluded, no answer to protocol_version: {e}");
                client.shutdown();
                continue;
            }

            let k = descriptor.k.unwrap_or(config.default_k);
            let fixed = descriptor.has_role(EngineRole::Fixed);
            let rating = if fixed && anchor.is_some() {
                warn!(engine = %name, "an anchor is already set, pinning this rating instead");
                Rating::pinned(descriptor.elo)
            } else {
                Rating::new(descriptor.elo, k)
            };
            let is_anchor = fixed && anchor.is_none();
            if is_anchor {
                anchor = Some((entries.len(), descriptor.elo));
            }

            info!(engine = %name, command = %descriptor.command, rating = %rating, "engine launched");
            taken.insert(name.clone());
            entries.push(EngineEntry::new(name, client, rating, is_anchor));
        }

        if entries.len() < 2 {
            for entry in &mut entries {
                entry.client.shutdown();
            }
            let mut judge = judge;
            judge.shutdown();
            bail!(
                "only {} player engine(s) could be launched, at least two are required",
                entries.len()
            );
        }

        for entry in &mut entries {
            entry.client.sleep();
        }
        info!(players = ?entries.iter().map(|e| &e.name).collect::<Vec<_>>(), judge = %judge_name);

        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Ok(MatchScheduler {
            config,
            entries,
            judge,
            judge_name,
            anchor,
            rng,
            games: 0,
        })
    }

    /// Name of the judge engine.
    pub fn judge_name(&self) -> &str {
        &self.judge_name
    }

    /// Unique names of the registered players.
    pub fn player_names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.name.as_str()).collect()
    }

    /// Games finished so far.
    pub fn games_played(&self) -> u64 {
        self.games
    }

    /// Current standings.
    pub fn results(&self) -> ResultsTable {
        ResultsTable {
            games: self.games,
            engines: self.entries.iter().map(EngineEntry::summary).collect(),
        }
    }

    fn select_pair(&mut self) -> anyhow::Result<(usize, usize)> {
        let candidates = self
            .entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.is_available())
            .map(|(i, e)| (i, e.rating.value(), e.games_played))
            .collect::<Vec<_>>();
        let Some((first, second)) = pick_opponents(&candidates, &mut self.rng) else {
            bail!("fewer than two player engines are still available");
        };
        if self.rng.gen_bool(0.5) {
            Ok((first, second))
        } else {
            Ok((second, first))
        }
    }

    fn wake(&mut self, index: usize) -> bool {
        let entry = &mut self.entries[index];
        match entry.client.wakeup() {
            Ok(()) => true,
            Err(e) => {
                warn!(engine = %entry.name, "could not start engine, removing it from the pool: {e}");
                entry.disabled = Some(format!("could not start: {e}"));
                false
            }
        }
    }

    /// Plays one game and updates ratings, counters and saved files.
    ///
    /// Engine failures are settled inside the game as forfeits. Judge failures and I/O errors
    /// on the results file are returned.
    #[instrument(skip_all, fields(game = self.games + 1))]
    pub fn play_next_game(&mut self) -> anyhow::Result<GameOutcome> {
        let (black, white) = loop {
            let (black, white) = self.select_pair()?;
            if !self.wake(black) {
                continue;
            }
            if !self.wake(white) {
                self.entries[black].client.sleep();
                continue;
            }
            break (black, white);
        };

        let played = {
            let (black_entry, white_entry) = pair_mut(&mut self.entries, black, white);
            debug!(black = %black_entry.name, white = %white_entry.name, "game starts");
            play_game(
                &mut black_entry.client,
                &mut white_entry.client,
                &mut self.judge,
                &self.config,
                &mut self.rng,
            )
        };
        let played = match played {
            Ok(played) => played,
            Err(e) => {
                for index in [black, white] {
                    self.entries[index].client.sleep();
                }
                return Err(e);
            }
        };
        self.games += 1;

        let record_path = self.save_record(black, white, &played);
        self.update_standings(black, white, played.finished.winner);

        let outcome = GameOutcome {
            black: self.entries[black].name.clone(),
            white: self.entries[white].name.clone(),
            winner: played.finished.winner,
            result: played.finished.result,
            reason: played.finished.reason,
            moves: played.moves,
            resumed_from: played.resumed_from,
            record_path,
            note: played.finished.note,
        };
        info!(
            black = %outcome.black,
            white = %outcome.white,
            result = %outcome.result,
            moves = outcome.moves.len(),
            "game over"
        );

        if let Some(path) = &self.config.results_path {
            self.results().save(path)?;
        }
        if self.config.verbose {
            print_game_result(&outcome, &self.entries[black], &self.entries[white]);
        }

        for index in [black, white] {
            let entry = &mut self.entries[index];
            entry.client.sleep();
            if entry.lifecycle == Lifecycle::AlwaysOn && !entry.client.is_alive() {
                warn!(engine = %entry.name, "engine process is gone, removing it from the pool");
                entry.disabled = Some("engine process exited".to_string());
            }
        }

        Ok(outcome)
    }

    fn save_record(&self, black: usize, white: usize, played: &Played) -> Option<PathBuf> {
        let dir = self.config.save_dir.as_ref()?;
        let black_name = &self.entries[black].name;
        let white_name = &self.entries[white].name;

        let mut record = GameRecord::new(self.config.board_size, played.komi);
        record.black = Some(black_name.clone());
        record.white = Some(white_name.clone());
        record.result = Some(played.finished.result.clone());
        record.moves = played.moves.clone();

        let saved = record_file_name(self.games, black_name, white_name)
            .and_then(|file_name| Ok(record.save(dir, &file_name)?));
        match saved {
            Ok(path) => {
                debug!(path = %path.display(), "game saved");
                Some(path)
            }
            Err(e) => {
                warn!("could not save game {}: {e:#}", self.games);
                None
            }
        }
    }

    fn update_standings(&mut self, black: usize, white: usize, winner: Option<Color>) {
        let decay = self.config.rating_decay;
        let (b, w) = pair_mut(&mut self.entries, black, white);
        match winner {
            Some(Color::Black) => b.rating.beat(&mut w.rating),
            Some(Color::White) => w.rating.beat(&mut b.rating),
            None => b.rating.draw(&mut w.rating),
        }
        b.rating.decay(&decay);
        w.rating.decay(&decay);

        let (black_outcome, white_outcome) = match winner {
            Some(Color::Black) => (Outcome::Win, Outcome::Lose),
            Some(Color::White) => (Outcome::Lose, Outcome::Win),
            None => (Outcome::Draw, Outcome::Draw),
        };
        b.record(true, black_outcome);
        w.record(false, white_outcome);

        if let Some((index, value)) = self.anchor {
            let offset = value - self.entries[index].rating.value();
            if offset != 0.0 {
                trace!(offset, "shifting ratings to the anchor");
                for entry in &mut self.entries {
                    entry.rating.shift(offset);
                }
            }
        }
    }

    /// Plays `games` games, or until an error when `None`, then returns the standings.
    pub fn run(&mut self, games: Option<u64>) -> anyhow::Result<ResultsTable> {
        let mut played = 0;
        while games.map_or(true, |limit| played < limit) {
            self.play_next_game()?;
            played += 1;
        }
        let results = self.results();
        if self.config.verbose {
            println!("\n{}", results.leaderboard());
        }
        Ok(results)
    }

    /// Stops every engine. Safe to call several times.
    pub fn shutdown(&mut self) {
        for entry in &mut self.entries {
            entry.client.shutdown();
        }
        self.judge.shutdown();
        info!("all engines stopped");
    }
}

impl Drop for MatchScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Picks the engine with the fewest games, then an opponent weighted by [`pairing_weight`].
///
/// Candidates are `(index, rating, games played)`.
fn pick_opponents<R: Rng>(candidates: &[(usize, f64, u32)], rng: &mut R) -> Option<(usize, usize)> {
    if candidates.len() < 2 {
        return None;
    }
    let fewest = candidates.iter().map(|c| c.2).min()?;
    let first_choices = candidates.iter().filter(|c| c.2 == fewest).collect::<Vec<_>>();
    let first = **first_choices.choose(rng)?;

    let others = candidates.iter().filter(|c| c.0 != first.0).collect::<Vec<_>>();
    let weights = others
        .iter()
        .map(|c| pairing_weight(c.1 - first.1))
        .collect::<Vec<_>>();
    let second = match WeightedIndex::new(&weights) {
        Ok(distribution) => others[distribution.sample(rng)],
        // every weight underflowed
        Err(_) => *others.choose(rng)?,
    };
    Some((first.0, second.0))
}

fn pair_mut<T>(items: &mut [T], a: usize, b: usize) -> (&mut T, &mut T) {
    debug_assert_ne!(a, b, "an engine cannot play itself");
    if a < b {
        let (left, right) = items.split_at_mut(b);
        (&mut left[a], &mut right[0])
    } else {
        let (left, right) = items.split_at_mut(a);
        (&mut right[0], &mut left[b])
    }
}

fn for_each_client<F>(
    black: &mut EngineClient,
    white: &mut EngineClient,
    judge: &mut EngineClient,
    mut f: F,
) -> Result<(), Fault>
where
    F: FnMut(&mut EngineClient) -> Result<(), GtpError>,
{
    for (side, client) in [
        (Side::Player(Color::Black), black),
        (Side::Player(Color::White), white),
        (Side::Judge, judge),
    ] {
        f(client).map_err(|error| Fault { side, error })?;
    }
    Ok(())
}

fn reset_board(
    black: &mut EngineClient,
    white: &mut EngineClient,
    judge: &mut EngineClient,
    board_size: u8,
    komi: f32,
) -> Result<(), Fault> {
    for_each_client(black, white, judge, |client| {
        client.boardsize(board_size)?;
        client.clear_board()?;
        client.komi(komi)
    })
}

/// Turns a setup failure into a forfeit, or into an error when the judge failed.
fn settle_fault(fault: Fault) -> anyhow::Result<Finished> {
    match fault.side {
        Side::Judge => Err(anyhow!(fault.error).context("judge failed while setting up the board")),
        Side::Player(color) => {
            warn!(%color, "engine failed while setting up the board: {}", fault.error);
            Ok(Finished::forfeit(color.next(), fault.error.to_string()))
        }
    }
}

fn list_records(dir: &Path) -> Vec<PathBuf> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(dir = %dir.display(), "cannot list saved records: {e}");
            return vec![];
        }
    };
    let mut records = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| {
            path.extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("sgf"))
        })
        .collect::<Vec<_>>();
    records.sort();
    records
}

/// Replays a random fitting record into the three engines.
///
/// Returns the record used, or `None` when the game starts from an empty board. Only a failure
/// to reset the board after a bad record is an error.
fn resume_from_record(
    black: &mut EngineClient,
    white: &mut EngineClient,
    judge: &mut EngineClient,
    config: &Configuration,
    rng: &mut StdRng,
) -> Result<Option<(PathBuf, GameRecord)>, Fault> {
    let Some(dir) = &config.record_source_dir else {
        return Ok(None);
    };
    if !(config.resume_probability > 0.0 && rng.gen_bool(config.resume_probability.min(1.0))) {
        return Ok(None);
    }

    let mut candidates = list_records(dir);
    candidates.shuffle(rng);
    for path in candidates {
        let record = match GameRecord::load(&path) {
            Ok(record) => record,
            Err(e) => {
                debug!(record = %path.display(), "record discarded: {e}");
                continue;
            }
        };
        if record.board_size != config.board_size {
            debug!(
                record = %path.display(),
                size = record.board_size,
                "record discarded: board size differs"
            );
            continue;
        }

        let komi = record.komi.unwrap_or(config.komi);
        let replayed = for_each_client(black, white, judge, |client| {
            client.komi(komi)?;
            for (color, vertex) in &record.moves {
                client.play(*color, *vertex)?;
            }
            Ok(())
        });
        match replayed {
            Ok(()) => {
                debug!(record = %path.display(), moves = record.moves.len(), "game resumed");
                return Ok(Some((path, record)));
            }
            Err(fault) => {
                debug!(record = %path.display(), side = ?fault.side, "record discarded, replay failed: {}", fault.error);
                reset_board(black, white, judge, config.board_size, config.komi)?;
            }
        }
    }
    debug!("no saved record fits, starting from an empty board");
    Ok(None)
}

fn play_game(
    black: &mut EngineClient,
    white: &mut EngineClient,
    judge: &mut EngineClient,
    config: &Configuration,
    rng: &mut StdRng,
) -> anyhow::Result<Played> {
    let mut played = Played {
        finished: Finished::resign(Color::Black),
        moves: vec![],
        komi: config.komi,
        resumed_from: None,
    };

    if let Err(fault) = reset_board(black, white, judge, config.board_size, config.komi) {
        played.finished = settle_fault(fault)?;
        return Ok(played);
    }
    match resume_from_record(black, white, judge, config, rng) {
        Ok(Some((path, record))) => {
            played.komi = record.komi.unwrap_or(config.komi);
            played.moves = record.moves;
            played.resumed_from = Some(path);
        }
        Ok(None) => {}
        Err(fault) => {
            played.finished = settle_fault(fault)?;
            return Ok(played);
        }
    }

    let mut to_move = played
        .moves
        .last()
        .map_or(Color::Black, |(color, _)| color.next());
    let mut passes = 0;
    let reason = loop {
        if config.max_moves.is_some_and(|max| played.moves.len() >= max) {
            break EndReason::MoveLimit;
        }
        let (mover, opponent) = match to_move {
            Color::Black => (&mut *black, &mut *white),
            Color::White => (&mut *white, &mut *black),
        };

        let vertex = match mover.genmove(to_move) {
            Ok(vertex) => vertex,
            Err(e) => {
                warn!(color = %to_move, "genmove failed: {e}");
                played.finished = Finished::forfeit(to_move.next(), e.to_string());
                return Ok(played);
            }
        };
        trace!(color = %to_move, %vertex, "move generated");
        if vertex.is_resign() {
            played.finished = Finished::resign(to_move.next());
            return Ok(played);
        }

        let on_board = match vertex {
            Vertex::Point { x, y } => x < config.board_size && y < config.board_size,
            Vertex::Null => false,
            Vertex::Pass | Vertex::Resign => true,
        };
        let legal = on_board
            && match judge.is_legal(to_move, vertex) {
                Ok(legal) => legal,
                // a judge that cannot make sense of the move rejects it
                Err(GtpError::EngineError { message, .. }) => {
                    debug!(color = %to_move, %vertex, "judge rejected the move: {message}");
                    false
                }
                Err(e) => return Err(anyhow!(e).context("judge could not check a move")),
            };
        if !legal {
            debug!(color = %to_move, %vertex, "illegal move");
            played.finished =
                Finished::forfeit(to_move.next(), format!("illegal move {to_move} {vertex}"));
            return Ok(played);
        }
        if let Err(e) = opponent.play(to_move, vertex) {
            warn!(color = %to_move.next(), %vertex, "engine refused a legal move: {e}");
            played.finished = Finished::forfeit(to_move, e.to_string());
            return Ok(played);
        }
        judge
            .play(to_move, vertex)
            .context("judge refused a move it found legal")?;
        played.moves.push((to_move, vertex));

        if vertex.is_pass() {
            passes += 1;
            if passes >= 2 {
                break EndReason::Score;
            }
        } else {
            passes = 0;
        }
        to_move = to_move.next();
    };

    let score = judge.final_score().context("judge could not score the game")?;
    let (winner, result) = parse_final_score(&score);
    played.finished = Finished {
        winner,
        result,
        reason,
        note: None,
    };
    Ok(played)
}

fn record_file_name(game: u64, black: &str, white: &str) -> anyhow::Result<String> {
    fn clean(name: &str) -> String {
        name.chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect()
    }

    let format = parse("[year][month][day]-[hour][minute][second]")?;
    let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
    Ok(format!(
        "{}-{game:05}-{}-vs-{}.sgf",
        now.format(&format)?,
        clean(black),
        clean(white)
    ))
}

fn print_game_result(outcome: &GameOutcome, black: &EngineEntry, white: &EngineEntry) {
    let ratings = format!(
        "{} {} / {} {}",
        black.name, black.rating, white.name, white.rating
    );
    // clear line, green game, result and ratings, red error, start of line
    println!(
        "\x1b[2K\x1b[32m{} (B) vs {} (W): \x1b[39m{} [{ratings}] \x1b[31m{}\x1b[39m\x1b[0G",
        outcome.black,
        outcome.white,
        outcome.result,
        outcome.note.as_deref().unwrap_or_default()
    );
}
