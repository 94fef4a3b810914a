use std::fs;

use gtp_tournament::prelude::*;
use gtp_tournament::scheduler::EndReason;

mod common;
use common::{fake, init_test_logger};

fn judge(vars: &[&str]) -> EngineDescriptor {
    EngineDescriptor::new("judge", fake(vars)).with_role(EngineRole::Judge)
}

fn player(name: &str, vars: &[&str]) -> EngineDescriptor {
    EngineDescriptor::new(name, fake(vars))
}

fn quiet() -> Configuration {
    Configuration::new().with_verbose(false).with_seed(Some(42))
}

fn rating_of(results: &ResultsTable, name: &str) -> f64 {
    results
        .engines
        .iter()
        .find(|e| e.name == name)
        .map(|e| e.rating)
        .unwrap()
}

#[test]
fn resignation_gives_the_game_to_the_opponent() {
    init_test_logger();
    let engines = vec![
        judge(&[]),
        player("a", &["GENMOVE=resign"]),
        player("b", &["GENMOVE=resign"]),
    ];
    let mut scheduler = MatchScheduler::from_descriptors(engines, quiet()).unwrap();
    let outcome = scheduler.play_next_game().unwrap();

    assert_eq!(outcome.result, "W+Resign");
    assert_eq!(outcome.winner, Some(Color::White));
    assert_eq!(outcome.reason, EndReason::Resignation);
    assert!(outcome.moves.is_empty());

    let results = scheduler.results();
    assert!(rating_of(&results, &outcome.white) > 1500.0);
    assert!(rating_of(&results, &outcome.black) < 1500.0);
    scheduler.shutdown();
}

#[test]
fn illegal_move_loses_the_game() {
    let engines = vec![
        judge(&["IS_LEGAL=0"]),
        player("a", &["GENMOVE=E5"]),
        player("b", &["GENMOVE=E5"]),
    ];
    let mut scheduler = MatchScheduler::from_descriptors(engines, quiet()).unwrap();
    let outcome = scheduler.play_next_game().unwrap();

    assert_eq!(outcome.result, "W+Forfeit");
    assert_eq!(outcome.reason, EndReason::Forfeit);
    assert!(outcome.note.unwrap().contains("E5"));

    let results = scheduler.results();
    let white = rating_of(&results, &outcome.white);
    let black = rating_of(&results, &outcome.black);
    assert!(white > 1500.0);
    assert!((white + black - 3000.0).abs() < 1e-6);
}

#[test]
fn move_off_the_board_loses_without_asking_the_judge() {
    let engines = vec![
        judge(&["IS_LEGAL=error"]),
        player("a", &["GENMOVE=T19"]),
        player("b", &["GENMOVE=T19"]),
    ];
    let out = tempfile::tempdir().unwrap();
    let config = quiet().with_save_dir(out.path());
    let mut scheduler = MatchScheduler::from_descriptors(engines, config).unwrap();
    let outcome = scheduler.play_next_game().unwrap();

    assert_eq!(outcome.result, "W+Forfeit");
    assert_eq!(outcome.reason, EndReason::Forfeit);
    assert!(outcome.note.unwrap().contains("T19"));
    assert!(outcome.moves.is_empty());
    let record = GameRecord::load(&outcome.record_path.unwrap()).unwrap();
    assert!(record.moves.is_empty());
}

#[test]
fn move_the_judge_cannot_read_is_illegal() {
    let engines = vec![
        judge(&["IS_LEGAL=error"]),
        player("a", &["GENMOVE=E5"]),
        player("b", &["GENMOVE=E5"]),
    ];
    let mut scheduler = MatchScheduler::from_descriptors(engines, quiet()).unwrap();
    let results = scheduler.run(Some(2)).unwrap();
    assert_eq!(results.games, 2);
    for engine in &results.engines {
        assert_eq!(engine.games, 2);
        assert!(engine.disabled.is_none());
    }
}

#[test]
fn null_move_forfeits() {
    let engines = vec![
        judge(&[]),
        player("a", &["GENMOVE=null"]),
        player("b", &["GENMOVE=null"]),
    ];
    let mut scheduler = MatchScheduler::from_descriptors(engines, quiet()).unwrap();
    let outcome = scheduler.play_next_game().unwrap();
    assert_eq!(outcome.result, "W+Forfeit");
    assert!(outcome.moves.is_empty());
}

#[test]
fn dead_judge_stops_the_run() {
    let engines = vec![
        judge(&["IS_LEGAL=crash"]),
        player("a", &["GENMOVE=E5"]).with_role(EngineRole::Lazy),
        player("b", &["GENMOVE=E5"]).with_role(EngineRole::Lazy),
    ];
    let mut scheduler = MatchScheduler::from_descriptors(engines, quiet()).unwrap();
    let err = scheduler.play_next_game().unwrap_err();
    assert!(err.to_string().contains("judge"));
    assert_eq!(scheduler.games_played(), 0);
}

#[test]
fn double_pass_is_scored_by_the_judge() {
    let engines = vec![
        judge(&["FINAL_SCORE=B+12.5"]),
        player("a", &["GENMOVE=pass"]),
        player("b", &["GENMOVE=pass"]),
    ];
    let mut scheduler = MatchScheduler::from_descriptors(engines, quiet()).unwrap();
    let outcome = scheduler.play_next_game().unwrap();

    assert_eq!(outcome.result, "B+12.5");
    assert_eq!(outcome.reason, EndReason::Score);
    assert_eq!(
        outcome.moves,
        [(Color::Black, Vertex::Pass), (Color::White, Vertex::Pass)]
    );

    let results = scheduler.results();
    let black = results
        .engines
        .iter()
        .find(|e| e.name == outcome.black)
        .unwrap();
    assert_eq!(black.black.win, 1);
    assert_eq!(black.games, 1);
    let white = results
        .engines
        .iter()
        .find(|e| e.name == outcome.white)
        .unwrap();
    assert_eq!(white.white.lose, 1);
}

#[test]
fn unknown_score_is_a_draw() {
    let engines = vec![
        judge(&["FINAL_SCORE=0"]),
        player("a", &["GENMOVE=pass"]),
        player("b", &["GENMOVE=pass"]),
    ];
    let mut scheduler = MatchScheduler::from_descriptors(engines, quiet()).unwrap();
    let outcome = scheduler.play_next_game().unwrap();
    assert_eq!(outcome.result, "Draw");
    assert_eq!(outcome.winner, None);

    let results = scheduler.results();
    for engine in &results.engines {
        assert_eq!((engine.black + engine.white).draw, 1);
        assert!((engine.rating - 1500.0).abs() < 1e-9);
    }
}

#[test]
fn move_limit_ends_the_game() {
    let engines = vec![
        judge(&["FINAL_SCORE=W+3.5"]),
        player("a", &["GENMOVE=D4"]),
        player("b", &["GENMOVE=D4"]),
    ];
    let config = quiet().with_max_moves(Some(6));
    let mut scheduler = MatchScheduler::from_descriptors(engines, config).unwrap();
    let outcome = scheduler.play_next_game().unwrap();

    assert_eq!(outcome.reason, EndReason::MoveLimit);
    assert_eq!(outcome.moves.len(), 6);
    assert_eq!(outcome.result, "W+3.5");
    assert_eq!(outcome.winner, Some(Color::White));
}

#[test]
fn mismatched_record_falls_back_to_an_empty_board() {
    let records = tempfile::tempdir().unwrap();
    fs::write(
        records.path().join("big.sgf"),
        "(;GM[1]SZ[13]KM[6.5];B[dd];W[jj])",
    )
    .unwrap();

    let engines = vec![
        judge(&["FINAL_SCORE=B+1"]),
        player("a", &["GENMOVE=pass"]),
        player("b", &["GENMOVE=pass"]),
    ];
    let config = quiet()
        .with_board_size(19)
        .with_resume_probability(1.0)
        .with_record_source_dir(records.path());
    let mut scheduler = MatchScheduler::from_descriptors(engines, config).unwrap();
    let outcome = scheduler.play_next_game().unwrap();

    assert_eq!(outcome.resumed_from, None);
    assert_eq!(outcome.moves.len(), 2);
    assert_eq!(outcome.result, "B+1");
}

#[test]
fn matching_record_is_replayed_first() {
    let records = tempfile::tempdir().unwrap();
    let path = records.path().join("opening.sgf");
    fs::write(&path, "(;GM[1]SZ[9]KM[5.5];B[ee];W[cc](;B[gg]))").unwrap();
    fs::write(records.path().join("broken.sgf"), "(;SZ[9];B[ee]").unwrap();
    fs::write(records.path().join("setup.sgf"), "(;SZ[9]AB[aa];W[cc])").unwrap();

    let engines = vec![
        judge(&["FINAL_SCORE=W+0.5"]),
        player("a", &["GENMOVE=pass"]),
        player("b", &["GENMOVE=pass"]),
    ];
    let config = quiet()
        .with_resume_probability(1.0)
        .with_record_source_dir(records.path());
    let mut scheduler = MatchScheduler::from_descriptors(engines, config).unwrap();
    let outcome = scheduler.play_next_game().unwrap();

    assert_eq!(outcome.resumed_from.as_deref(), Some(path.as_path()));
    assert_eq!(
        outcome.moves,
        [
            (Color::Black, "E5".parse().unwrap()),
            (Color::White, "C7".parse().unwrap()),
            (Color::Black, Vertex::Pass),
            (Color::White, Vertex::Pass),
        ]
    );
}

#[test]
fn record_refused_during_replay_is_dropped() {
    let records = tempfile::tempdir().unwrap();
    // C3 is refused by both players
    fs::write(records.path().join("refused.sgf"), "(;SZ[9];B[ee];W[cg])").unwrap();

    let engines = || {
        vec![
            judge(&["FINAL_SCORE=B+2"]),
            player("a", &["GENMOVE=pass", "PLAY_REFUSE=C3"]),
            player("b", &["GENMOVE=pass", "PLAY_REFUSE=C3"]),
        ]
    };
    let config = quiet()
        .with_resume_probability(1.0)
        .with_record_source_dir(records.path());

    let mut scheduler = MatchScheduler::from_descriptors(engines(), config.clone()).unwrap();
    let outcome = scheduler.play_next_game().unwrap();
    assert_eq!(outcome.resumed_from, None);
    assert_eq!(
        outcome.moves,
        [(Color::Black, Vertex::Pass), (Color::White, Vertex::Pass)]
    );
    assert_eq!(outcome.result, "B+2");
    scheduler.shutdown();

    let fitting = records.path().join("fitting.sgf");
    fs::write(&fitting, "(;SZ[9];B[dd])").unwrap();
    let mut scheduler = MatchScheduler::from_descriptors(engines(), config).unwrap();
    for _ in 0..3 {
        let outcome = scheduler.play_next_game().unwrap();
        assert_eq!(outcome.resumed_from.as_deref(), Some(fitting.as_path()));
        assert_eq!(
            outcome.moves,
            [
                (Color::Black, "D6".parse().unwrap()),
                (Color::White, Vertex::Pass),
                (Color::Black, Vertex::Pass),
            ]
        );
    }
}

#[test]
fn unaddressable_board_size_is_rejected() {
    for size in [0, 26] {
        let engines = vec![judge(&[]), player("a", &[]), player("b", &[])];
        let config = quiet().with_board_size(size);
        let err = MatchScheduler::from_descriptors(engines, config).unwrap_err();
        assert!(err.to_string().contains("board size"));
    }
}

#[test]
fn refusing_a_legal_move_forfeits() {
    let engines = vec![
        judge(&[]),
        player("stubborn", &["GENMOVE=pass", "PLAY_FAIL=1"]),
        player("fair", &["GENMOVE=pass"]),
    ];
    let mut scheduler = MatchScheduler::from_descriptors(engines, quiet()).unwrap();
    for _ in 0..4 {
        let outcome = scheduler.play_next_game().unwrap();
        if outcome.white == "stubborn" {
            // black's first pass is refused by white
            assert_eq!(outcome.result, "B+Forfeit");
        } else {
            // black passes, white passes, black refuses the second pass
            assert_eq!(outcome.result, "W+Forfeit");
        }
    }
}

#[test]
fn finished_games_are_saved() {
    let out = tempfile::tempdir().unwrap();
    let games = out.path().join("games");
    let results_path = out.path().join("results.json");

    let engines = vec![
        judge(&[]),
        player("a", &["GENMOVE=D4,resign"]),
        player("b", &["GENMOVE=F6,resign"]),
    ];
    let config = quiet()
        .with_save_dir(&games)
        .with_results_path(&results_path)
        .with_komi(6.5);
    let mut scheduler = MatchScheduler::from_descriptors(engines, config).unwrap();
    let results = scheduler.run(Some(3)).unwrap();
    assert_eq!(results.games, 3);
    assert_eq!(scheduler.games_played(), 3);

    let saved = fs::read_dir(&games).unwrap().count();
    assert_eq!(saved, 3);

    let outcome = scheduler.play_next_game().unwrap();
    let record_path = outcome.record_path.unwrap();
    let record = GameRecord::load(&record_path).unwrap();
    assert_eq!(record.board_size, 9);
    assert_eq!(record.komi, Some(6.5));
    assert_eq!(record.black.as_deref(), Some(outcome.black.as_str()));
    assert_eq!(record.result.as_deref(), Some(outcome.result.as_str()));
    assert_eq!(record.moves, outcome.moves);

    let on_disk = ResultsTable::load(&results_path).unwrap();
    assert_eq!(on_disk.games, 4);
    assert_eq!(on_disk, scheduler.results());
    let total: u32 = on_disk.engines.iter().map(|e| e.games).sum();
    assert_eq!(total, 8);
}

#[test]
fn anchor_rating_stays_fixed() {
    let engines = vec![
        judge(&[]),
        player("anchor", &["GENMOVE=resign"])
            .with_role(EngineRole::Fixed)
            .with_elo(1000.0),
        player("other", &["GENMOVE=resign"]),
        player("third", &["GENMOVE=resign"]),
    ];
    let mut scheduler = MatchScheduler::from_descriptors(engines, quiet()).unwrap();
    let results = scheduler.run(Some(6)).unwrap();

    assert!((rating_of(&results, "anchor") - 1000.0).abs() < 1e-6);
    assert!(results.engines.iter().any(|e| e.anchor));
    let moved = results
        .engines
        .iter()
        .filter(|e| !e.anchor)
        .any(|e| (e.rating - 1500.0).abs() > 1e-6);
    assert!(moved);
}

#[test]
fn adaptation_rates_decay() {
    let engines = vec![
        judge(&[]),
        player("a", &["GENMOVE=resign"]).with_k(40.0),
        player("b", &["GENMOVE=resign"]).with_k(40.0),
    ];
    let mut scheduler = MatchScheduler::from_descriptors(engines, quiet()).unwrap();
    let results = scheduler.run(Some(2)).unwrap();
    for engine in &results.engines {
        assert!(engine.k < 40.0);
        assert!(engine.k >= RatingDecay::default().floor);
    }
}

#[test]
fn lazy_engines_play_several_games() {
    let engines = vec![
        judge(&[]),
        player("a", &["GENMOVE=pass"]).with_role(EngineRole::Lazy),
        player("b", &["GENMOVE=pass"]).with_role(EngineRole::Lazy),
    ];
    let mut scheduler = MatchScheduler::from_descriptors(engines, quiet()).unwrap();
    let results = scheduler.run(Some(3)).unwrap();
    assert_eq!(results.games, 3);
    assert!(results.engines.iter().all(|e| e.disabled.is_none()));
}

#[test]
fn crashed_engine_forfeits_and_leaves_the_pool() {
    let engines = vec![
        judge(&[]),
        player("crasher", &["GENMOVE=crash"]),
        player("a", &["GENMOVE=pass"]),
        player("b", &["GENMOVE=pass"]),
    ];
    let mut scheduler = MatchScheduler::from_descriptors(engines, quiet()).unwrap();
    let results = scheduler.run(Some(6)).unwrap();

    let crasher = results
        .engines
        .iter()
        .find(|e| e.name == "crasher")
        .unwrap();
    assert!(crasher.disabled.is_some());
    assert_eq!(crasher.games, 1);
    assert_eq!((crasher.black + crasher.white).lose, 1);
}

#[test]
fn judge_failure_is_fatal() {
    let engines = vec![
        judge(&["PLAY_FAIL=1"]),
        player("a", &["GENMOVE=D4"]),
        player("b", &["GENMOVE=D4"]),
    ];
    let mut scheduler = MatchScheduler::from_descriptors(engines, quiet()).unwrap();
    let err = scheduler.play_next_game().unwrap_err();
    assert!(err.to_string().contains("judge"));
}

#[test]
fn broken_engines_are_excluded_at_startup() {
    let engines = vec![
        judge(&[]),
        EngineDescriptor::new("ghost", "/nonexistent/engine --gtp"),
        player("limited", &["COMMANDS=name,version,genmove"]),
        player("twin", &[]),
        player("twin", &[]),
        player("skipped", &[]).with_role(EngineRole::Skip),
    ];
    let mut scheduler = MatchScheduler::from_descriptors(engines, quiet()).unwrap();
    let names = scheduler.player_names();
    assert_eq!(names.len(), 2);
    assert_eq!(names[0], "twin");
    assert!(names[1].starts_with("twin-"));
    assert_eq!(scheduler.judge_name(), "judge");
    scheduler.shutdown();
    scheduler.shutdown();
}

#[test]
fn startup_needs_a_judge_and_two_players() {
    let no_judge = vec![player("a", &[]), player("b", &[])];
    assert!(MatchScheduler::from_descriptors(no_judge, quiet()).is_err());

    let one_player = vec![judge(&[]), player("a", &[])];
    assert!(MatchScheduler::from_descriptors(one_player, quiet()).is_err());

    let bad_judge = vec![
        judge(&["COMMANDS=name,version"]),
        player("a", &[]),
        player("b", &[]),
    ];
    assert!(MatchScheduler::from_descriptors(bad_judge, quiet()).is_err());
}
