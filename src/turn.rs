//! One-shot move service for match servers that keep the game history themselves.
//!
//! The server sends the whole game so far as one JSON object: the moves it relayed to us
//! (`requests`) and the moves we answered (`responses`), oldest first, always one request
//! more than responses.
//!
//! ```json
//! {"requests": [{"x": -2, "y": -2}, {"x": 3, "y": 4}], "responses": [{"x": 5, "y": 5}]}
//! ```
//!
//! Coordinates are 1-based column and row. `-1/-1` is a pass and `-2/-2` stands for "no move"
//! (the first request when we play black). The history is replayed into a fresh engine,
//! black moving first, and the engine's move for the side to play is sent back as
//! `{"response": {"x": .., "y": ..}}`. Passing and resigning are both answered with `-1/-1`.

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::engine::EngineClient;
use crate::error::GtpError;
use crate::vertex::{Color, Vertex};

/// Board side used by the match server.
pub const DEFAULT_TURN_BOARD_SIZE: u8 = 8;
/// Komi used by the match server.
pub const DEFAULT_TURN_KOMI: f32 = 1.5;

/// A move as written by the match server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnMove {
    /// 1-based column, or a negative marker.
    pub x: i32,
    /// 1-based row, or a negative marker.
    pub y: i32,
}

impl TurnMove {
    /// `-1/-1`
    pub const PASS: TurnMove = TurnMove { x: -1, y: -1 };
    /// `-2/-2`, nothing was played.
    pub const NONE: TurnMove = TurnMove { x: -2, y: -2 };

    /// The vertex this move stands for, `None` for [`TurnMove::NONE`].
    pub fn to_vertex(self) -> Result<Option<Vertex>, GtpError> {
        match self {
            TurnMove::NONE => Ok(None),
            TurnMove::PASS => Ok(Some(Vertex::Pass)),
            TurnMove { x, y } => {
                let invalid = || GtpError::InvalidVertex(format!("({x}, {y})"));
                let column = u8::try_from(x - 1).map_err(|_| invalid())?;
                let row = u8::try_from(y - 1).map_err(|_| invalid())?;
                Vertex::point(column, row).map(Some).map_err(|_| invalid())
            }
        }
    }

    /// Server form of an engine move; anything but a point is a pass.
    pub fn from_vertex(vertex: Vertex) -> TurnMove {
        match vertex {
            Vertex::Point { x, y } => TurnMove {
                x: i32::from(x) + 1,
                y: i32::from(y) + 1,
            },
            Vertex::Pass | Vertex::Resign | Vertex::Null => TurnMove::PASS,
        }
    }
}

/// Game history sent by the match server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnRequest {
    /// Moves of the other side, one more than `responses`.
    pub requests: Vec<TurnMove>,
    /// Our own earlier moves.
    pub responses: Vec<TurnMove>,
}

impl TurnRequest {
    /// Moves played so far in order, black first.
    pub fn history(&self) -> anyhow::Result<Vec<Vertex>> {
        if self.requests.len() != self.responses.len() + 1 {
            bail!(
                "expected one request more than responses, got {} and {}",
                self.requests.len(),
                self.responses.len()
            );
        }

        let mut moves = vec![];
        for (i, request) in self.requests.iter().enumerate() {
            moves.extend(request.to_vertex().context("bad request move")?);
            if let Some(response) = self.responses.get(i) {
                let vertex = response
                    .to_vertex()
                    .context("bad response move")?
                    .context("a response cannot be empty")?;
                moves.push(vertex);
            }
        }
        Ok(moves)
    }
}

/// Answer sent back to the match server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnReply {
    /// The move we play.
    pub response: TurnMove,
}

/// Replays `request` into `engine` on an empty board and asks it for the next move.
pub fn think_move(
    engine: &mut EngineClient,
    request: &TurnRequest,
    board_size: u8,
    komi: f32,
) -> anyhow::Result<TurnReply> {
    let history = request.history()?;

    engine.boardsize(board_size)?;
    engine.clear_board()?;
    engine.komi(komi)?;
    let mut color = Color::Black;
    for vertex in history {
        engine
            .play(color, vertex)
            .with_context(|| format!("engine refused history move {color} {vertex}"))?;
        color = color.next();
    }

    let vertex = engine.genmove(color)?;
    debug!(%color, %vertex, "move chosen");
    Ok(TurnReply {
        response: TurnMove::from_vertex(vertex),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(x: i32, y: i32) -> TurnMove {
        TurnMove { x, y }
    }

    #[test]
    fn history_alternates_from_black() {
        let request = TurnRequest {
            requests: vec![TurnMove::NONE, at(3, 4)],
            responses: vec![at(5, 5)],
        };
        assert_eq!(
            request.history().unwrap(),
            ["E5".parse().unwrap(), "C4".parse().unwrap()]
        );

        let as_white = TurnRequest {
            requests: vec![at(1, 1), TurnMove::PASS],
            responses: vec![at(8, 8)],
        };
        assert_eq!(
            as_white.history().unwrap(),
            [
                "A1".parse().unwrap(),
                "H8".parse().unwrap(),
                Vertex::Pass
            ]
        );
    }

    #[test]
    fn unbalanced_history_is_rejected() {
        let request = TurnRequest {
            requests: vec![at(1, 1)],
            responses: vec![at(2, 2)],
        };
        assert!(request.history().is_err());
        assert!(TurnRequest::default().history().is_err());

        let empty_response = TurnRequest {
            requests: vec![TurnMove::NONE, at(1, 1)],
            responses: vec![TurnMove::NONE],
        };
        assert!(empty_response.history().is_err());
        assert!(at(0, 3).to_vertex().is_err());
    }

    #[test]
    fn replies_use_server_coordinates() {
        let reply = TurnReply {
            response: TurnMove::from_vertex("C5".parse().unwrap()),
        };
        assert_eq!(
            serde_json::to_string(&reply).unwrap(),
            r#"{"response":{"x":3,"y":5}}"#
        );
        assert_eq!(TurnMove::from_vertex(Vertex::Resign), TurnMove::PASS);
        assert_eq!(TurnMove::from_vertex(Vertex::Pass), TurnMove::PASS);
    }

    #[test]
    fn request_parses_from_json() {
        let json = r#"{"requests":[{"x":-2,"y":-2}],"responses":[]}"#;
        let request: TurnRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.requests, [TurnMove::NONE]);
        assert!(request.history().unwrap().is_empty());
    }
}
