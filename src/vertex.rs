//! Colors and vertices as spoken on the GTP wire.
//!
//! A [`Vertex`] is either a board coordinate, `pass`, `resign` or the `null`
//! placeholder some engines answer when they have no move. Columns are
//! written with the letters `A`–`Z` skipping `I`, rows are 1-based, so the
//! lower-left corner is `A1`. Parsing is case-insensitive, rendering uses
//! upper case.

use std::fmt;
use std::str::FromStr;

use crate::error::GtpError;

/// Largest board side a vertex can address.
pub const MAX_BOARD_SIZE: u8 = 25;

const COLUMNS: &[u8; 25] = b"ABCDEFGHJKLMNOPQRSTUVWXYZ";

/// Side to move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Color {
    /// First player.
    Black,
    /// Second player.
    White,
}

impl Color {
    /// The other color.
    pub fn next(self) -> Color {
        match self {
            Color::Black => Color::White,
            Color::White => Color::Black,
        }
    }

    /// Upper-case property tag used in game records (`B` or `W`).
    pub fn sgf_tag(self) -> &'static str {
        match self {
            Color::Black => "B",
            Color::White => "W",
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Color::Black => write!(f, "b"),
            Color::White => write!(f, "w"),
        }
    }
}

impl FromStr for Color {
    type Err = GtpError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "b" | "black" => Ok(Color::Black),
            "w" | "white" => Ok(Color::White),
            _ => Err(GtpError::InvalidColor(s.to_string())),
        }
    }
}

/// A move: a point on the board, a pass, or a resignation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Vertex {
    /// Zero-based column `x` and row `y`, `(0, 0)` being `A1`.
    Point {
        /// Column.
        x: u8,
        /// Row.
        y: u8,
    },
    /// The player passes.
    Pass,
    /// The player gives up.
    Resign,
    /// No move at all.
    Null,
}

impl Vertex {
    /// Builds a point, failing when either coordinate is off the largest board.
    pub fn point(x: u8, y: u8) -> Result<Vertex, GtpError> {
        if x >= MAX_BOARD_SIZE || y >= MAX_BOARD_SIZE {
            return Err(GtpError::InvalidVertex(format!("({x}, {y})")));
        }
        Ok(Vertex::Point { x, y })
    }

    /// True for `pass`.
    pub fn is_pass(&self) -> bool {
        matches!(self, Vertex::Pass)
    }

    /// True for `resign`.
    pub fn is_resign(&self) -> bool {
        matches!(self, Vertex::Resign)
    }

    /// True for `null`.
    pub fn is_null(&self) -> bool {
        matches!(self, Vertex::Null)
    }

    /// True for an actual point on the board.
    pub fn is_move(&self) -> bool {
        matches!(self, Vertex::Point { .. })
    }

    /// Decodes a two-letter record coordinate (`aa` is the top-left corner).
    ///
    /// An empty value, or `tt` on boards up to 19x19, is a pass.
    pub fn from_sgf(value: &str, board_size: u8) -> Result<Vertex, GtpError> {
        let bytes = value.as_bytes();
        if bytes.is_empty() || (value == "tt" && board_size <= 19) {
            return Ok(Vertex::Pass);
        }
        if bytes.len() != 2 || !bytes.iter().all(u8::is_ascii_lowercase) {
            return Err(GtpError::InvalidVertex(value.to_string()));
        }
        let x = bytes[0] - b'a';
        let row = bytes[1] - b'a';
        if x >= board_size || row >= board_size {
            return Err(GtpError::InvalidVertex(value.to_string()));
        }
        Vertex::point(x, board_size - 1 - row)
    }

    /// Encodes as a two-letter record coordinate.
    ///
    /// Passes become `tt` on boards up to 19x19 and an empty value above, where `tt` is a point.
    /// Returns `None` for `resign` and `null`, which have no record form.
    pub fn to_sgf(&self, board_size: u8) -> Option<String> {
        match *self {
            Vertex::Pass if board_size <= 19 => Some("tt".to_string()),
            Vertex::Pass => Some(String::new()),
            Vertex::Resign | Vertex::Null => None,
            Vertex::Point { x, y } => {
                let row = board_size.checked_sub(1 + y)?;
                Some(format!("{}{}", (b'a' + x) as char, (b'a' + row) as char))
            }
        }
    }
}

impl fmt::Display for Vertex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Vertex::Pass => write!(f, "pass"),
            Vertex::Resign => write!(f, "resign"),
            Vertex::Null => write!(f, "null"),
            Vertex::Point { x, y } => write!(f, "{}{}", COLUMNS[x as usize] as char, y + 1),
        }
    }
}

impl FromStr for Vertex {
    type Err = GtpError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let text = s.trim().to_ascii_uppercase();
        match text.as_str() {
            "PASS" => return Ok(Vertex::Pass),
            "RESIGN" => return Ok(Vertex::Resign),
            "NULL" => return Ok(Vertex::Null),
            _ => {}
        }

        let invalid = || GtpError::InvalidVertex(s.to_string());
        let mut chars = text.chars();
        let column = chars.next().ok_or_else(invalid)?;
        let x = COLUMNS
            .iter()
            .position(|&c| c as char == column)
            .ok_or_else(invalid)?;
        let row: u8 = chars.as_str().parse().map_err(|_| invalid())?;
        if row == 0 {
            return Err(invalid());
        }
        Vertex::point(x as u8, row - 1).map_err(|_| invalid())
    }
}
