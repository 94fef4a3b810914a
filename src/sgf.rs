//! Saved game records.
//!
//! Only the main line of a record is read: properties of nodes nested deeper
//! than the first game tree level (variations) are skipped. Setup stones
//! (`AB`/`AW`) cannot be replayed move by move, so records using them are
//! rejected as a whole.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::GtpError;
use crate::vertex::{Color, Vertex, MAX_BOARD_SIZE};

/// Board size assumed when a record has no `SZ` property.
pub const DEFAULT_RECORD_SIZE: u8 = 19;

/// Board size, komi, players, result and move list of one game.
#[derive(Debug, Clone, PartialEq)]
pub struct GameRecord {
    /// Side of the board.
    pub board_size: u8,
    /// Komi, `None` when the record does not say.
    pub komi: Option<f32>,
    /// Black player's name.
    pub black: Option<String>,
    /// White player's name.
    pub white: Option<String>,
    /// Result tag such as `B+Resign` or `W+3.5`.
    pub result: Option<String>,
    /// Moves in the order they were played.
    pub moves: Vec<(Color, Vertex)>,
}

impl GameRecord {
    /// Empty record for a board of `board_size`.
    pub fn new(board_size: u8, komi: f32) -> GameRecord {
        GameRecord {
            board_size,
            komi: Some(komi),
            black: None,
            white: None,
            result: None,
            moves: vec![],
        }
    }

    /// Reads and parses a record file.
    pub fn load(path: &Path) -> Result<GameRecord, GtpError> {
        let text = fs::read_to_string(path)
            .map_err(|e| GtpError::InvalidRecord(format!("{}: {e}", path.display())))?;
        Self::parse(&text)
    }

    /// Parses record text.
    pub fn parse(text: &str) -> Result<GameRecord, GtpError> {
        let mut size = None;
        let mut komi = None;
        let mut black = None;
        let mut white = None;
        let mut result = None;
        let mut raw_moves = vec![];

        for (key, value) in main_line_properties(text)? {
            match key.as_str() {
                "SZ" => {
                    let parsed: u8 = value
                        .trim()
                        .parse()
                        .map_err(|_| GtpError::InvalidRecord(format!("bad board size '{value}'")))?;
                    if parsed == 0 || parsed > MAX_BOARD_SIZE {
                        return Err(GtpError::InvalidRecord(format!(
                            "unsupported board size {parsed}"
                        )));
                    }
                    size = Some(parsed);
                }
                "KM" => {
                    komi = Some(
                        value
                            .trim()
                            .parse()
                            .map_err(|_| GtpError::InvalidRecord(format!("bad komi '{value}'")))?,
                    );
                }
                "PB" => black = Some(value),
                "PW" => white = Some(value),
                "RE" => result = Some(value),
                "B" => raw_moves.push((Color::Black, value)),
                "W" => raw_moves.push((Color::White, value)),
                "AB" | "AW" => {
                    return Err(GtpError::InvalidRecord(format!(
                        "setup property {key} is not supported"
                    )));
                }
                _ => {}
            }
        }

        let board_size = size.unwrap_or(DEFAULT_RECORD_SIZE);
        let moves = raw_moves
            .into_iter()
            .map(|(color, value)| {
                Vertex::from_sgf(value.trim(), board_size)
                    .map(|vertex| (color, vertex))
                    .map_err(|_| GtpError::InvalidRecord(format!("bad move '{value}'")))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(GameRecord {
            board_size,
            komi,
            black,
            white,
            result,
            moves,
        })
    }

    /// Serializes the record. Resignations are not moves and are left out.
    pub fn to_sgf(&self) -> String {
        let mut out = format!("(;GM[1]FF[4]CA[UTF-8]SZ[{}]", self.board_size);
        if let Some(komi) = self.komi {
            out.push_str(&format!("KM[{komi}]"));
        }
        if let Some(black) = &self.black {
            out.push_str(&format!("PB[{}]", escape(black)));
        }
        if let Some(white) = &self.white {
            out.push_str(&format!("PW[{}]", escape(white)));
        }
        if let Some(result) = &self.result {
            out.push_str(&format!("RE[{}]", escape(result)));
        }
        for (color, vertex) in &self.moves {
            if let Some(coord) = vertex.to_sgf(self.board_size) {
                out.push_str(&format!(";{}[{coord}]", color.sgf_tag()));
            }
        }
        out.push_str(")\n");
        out
    }

    /// Writes the record as `<dir>/<file_name>`, creating `dir` if needed.
    pub fn save(&self, dir: &Path, file_name: &str) -> std::io::Result<PathBuf> {
        fs::create_dir_all(dir)?;
        let path = dir.join(file_name);
        fs::write(&path, self.to_sgf())?;
        Ok(path)
    }
}

fn escape(value: &str) -> String {
    value.replace('\\', "\\\\").replace(']', "\\]")
}

/// Key/value pairs of the nodes at the first tree level, in order.
///
/// A property with several values (`AB[aa][bb]`) yields one pair per value.
fn main_line_properties(text: &str) -> Result<Vec<(String, String)>, GtpError> {
    let mut properties = vec![];
    let mut level = 0usize;
    let mut key = String::new();
    let mut last_key = String::new();
    let mut chars = text.chars();

    while let Some(c) = chars.next() {
        match c {
            '(' => level += 1,
            ')' => {
                level = level
                    .checked_sub(1)
                    .ok_or_else(|| GtpError::InvalidRecord("unbalanced ')'".to_string()))?;
            }
            '[' => {
                let mut value = String::new();
                let mut closed = false;
                while let Some(v) = chars.next() {
                    match v {
                        '\\' => {
                            if let Some(escaped) = chars.next() {
                                value.push(escaped);
                            }
                        }
                        ']' => {
                            closed = true;
                            break;
                        }
                        _ => value.push(v),
                    }
                }
                if !closed {
                    return Err(GtpError::InvalidRecord("unterminated value".to_string()));
                }
                if level != 1 {
                    key.clear();
                    continue;
                }
                if !key.is_empty() {
                    last_key = std::mem::take(&mut key);
                }
                if last_key.is_empty() {
                    return Err(GtpError::InvalidRecord("value without a key".to_string()));
                }
                properties.push((last_key.clone(), value));
            }
            ';' => {
                key.clear();
                last_key.clear();
            }
            c if c.is_ascii_uppercase() => key.push(c),
            _ => {}
        }
    }

    if level != 0 {
        return Err(GtpError::InvalidRecord("unbalanced '('".to_string()));
    }
    if properties.is_empty() && !text.contains('(') {
        return Err(GtpError::InvalidRecord("not a game record".to_string()));
    }
    Ok(properties)
}
