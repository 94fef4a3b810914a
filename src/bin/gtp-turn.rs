//! Plays one move for a match server that replays the whole game on every turn.
//!
//! # Usage
//!
//! ```bash
//! echo '{"requests":[{"x":-2,"y":-2}],"responses":[]}' | gtp-turn --engine "gnugo --mode gtp"
//! ```
//!
//! The request is read from the first line of stdin and the reply is the only line written
//! to stdout. See the `turn` module for the message format.

use std::io::{self, BufRead};

use anyhow::Context;
use clap::Parser;

use gtp_tournament::prelude::*;
use gtp_tournament::turn::{think_move, TurnRequest, DEFAULT_TURN_BOARD_SIZE, DEFAULT_TURN_KOMI};

#[derive(Parser)]
#[command(name = "gtp-turn")]
#[command(about = "Answer one match-server turn with a GTP engine")]
#[command(version)]
struct Cli {
    /// Engine launch command
    #[arg(short, long, default_value = "gnugo --mode gtp")]
    engine: String,

    /// Board size, from 1 to 25
    #[arg(short, long, default_value_t = DEFAULT_TURN_BOARD_SIZE, value_parser = clap::value_parser!(u8).range(1..=25))]
    boardsize: u8,

    /// Komi
    #[arg(short, long, default_value_t = DEFAULT_TURN_KOMI)]
    komi: f32,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    let request: TurnRequest = serde_json::from_str(&line).context("cannot read the request")?;

    let mut engine = EngineClient::launch(&cli.engine, EngineOptions::player())?;
    let reply = think_move(&mut engine, &request, cli.boardsize, cli.komi);
    engine.shutdown();

    println!("{}", serde_json::to_string(&reply?)?);
    Ok(())
}
