use chess::{Board, ChessMove};
use std::collections::HashMap;
use std::str::FromStr;

use crate::notation;
use crate::position::GameState;

/// A named opening: its main line in SAN and the continuations a player of it favours.
#[derive(Debug, Clone)]
pub struct OpeningEntry {
    pub name: String,
    pub eco_code: Option<String>,
    pub line: Vec<String>,
    /// Moves in UCI notation that belong to this opening's plans
    pub preferred_moves: Vec<String>,
    /// Score given to a preferred move when the pattern store has nothing better
    pub preferred_score: f32,
}

impl OpeningEntry {
    /// The next move of the main line if `history` is still inside it.
    pub fn continuation(&self, history: &[String]) -> Option<&str> {
        if history.len() >= self.line.len() {
            return None;
        }
        let on_line = history
            .iter()
            .zip(&self.line)
            .all(|(played, expected)| notation::strip_suffix(played) == expected);
        if on_line {
            Some(self.line[history.len()].as_str())
        } else {
            None
        }
    }

    pub fn prefers(&self, chess_move: ChessMove) -> bool {
        let uci = chess_move.to_string();
        self.preferred_moves.iter().any(|m| *m == uci)
    }
}

/// Catalogue of named openings, matched by move history or by position.
#[derive(Clone)]
pub struct OpeningBook {
    entries: Vec<OpeningEntry>,
    /// Map from the FEN reached at the end of each line to the entry index
    by_position: HashMap<String, usize>,
}

impl Default for OpeningBook {
    fn default() -> Self {
        Self::new()
    }
}

impl OpeningBook {
    /// Create an empty catalogue
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            by_position: HashMap::new(),
        }
    }

    /// Catalogue with the common openings
    pub fn with_standard_openings() -> Self {
        let mut book = Self::new();
        book.add_standard_openings();
        book
    }

    /// Add an opening; the line must be playable from the initial position.
    pub fn add_opening(
        &mut self,
        name: &str,
        eco_code: Option<&str>,
        line: &[&str],
        preferred_moves: &[&str],
        preferred_score: f32,
    ) -> Result<(), String> {
        let mut board = Board::default();
        for san in line {
            let chess_move = notation::parse_san(&board, san)
                .ok_or_else(|| format!("{name}: '{san}' is not legal"))?;
            board = board.make_move_new(chess_move);
        }
        for uci in preferred_moves {
            ChessMove::from_str(uci).map_err(|_| format!("{name}: bad move '{uci}'"))?;
        }

        let idx = self.entries.len();
        self.entries.push(OpeningEntry {
            name: name.to_string(),
            eco_code: eco_code.map(str::to_string),
            line: line.iter().map(|s| s.to_string()).collect(),
            preferred_moves: preferred_moves.iter().map(|s| s.to_string()).collect(),
            preferred_score,
        });
        // Longer lines were added later; keep the most specific name per position
        let longer = match self.by_position.get(&board.to_string()) {
            Some(&existing) => self.entries[existing].line.len() <= line.len(),
            None => true,
        };
        if longer {
            self.by_position.insert(board.to_string(), idx);
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&OpeningEntry> {
        self.entries.iter().find(|entry| entry.name == name)
    }

    /// Look up a position reached at the end of some catalogue line
    pub fn lookup(&self, board: &Board) -> Option<&OpeningEntry> {
        self.by_position
            .get(&board.to_string())
            .map(|&idx| &self.entries[idx])
    }

    /// Longest catalogue line that is a prefix of the game so far. Games set up
    /// from a FEN fall back to an exact position match.
    pub fn detect(&self, state: &GameState) -> Option<&OpeningEntry> {
        match state.san_history() {
            Some(history) => self
                .entries
                .iter()
                .filter(|entry| {
                    entry.line.len() <= history.len()
                        && entry
                            .line
                            .iter()
                            .zip(history)
                            .all(|(expected, played)| notation::strip_suffix(played) == expected)
                })
                .max_by_key(|entry| entry.line.len()),
            None => self.lookup(state.board()),
        }
    }

    /// Add standard chess openings
    fn add_standard_openings(&mut self) {
        let openings: [(&str, Option<&str>, &[&str], &[&str], f32); 16] = [
            (
                "Starting Position",
                None,
                &[],
                &["e2e4", "d2d4", "g1f3", "c2c4"],
                0.8,
            ),
            ("King's Pawn Game", Some("B00"), &["e4"], &["e7e5", "c7c5", "e7e6", "c7c6"], 0.8),
            ("Queen's Pawn Game", Some("D00"), &["d4"], &["d7d5", "g8f6"], 0.8),
            ("English Opening", Some("A10"), &["c4"], &["e7e5", "g8f6", "c7c5"], 0.8),
            ("Reti Opening", Some("A04"), &["Nf3"], &["d7d5", "g8f6"], 0.8),
            ("Open Game", Some("C20"), &["e4", "e5"], &["g1f3", "b8c6", "f1c4"], 0.9),
            (
                "Italian Game",
                Some("C50"),
                &["e4", "e5", "Nf3", "Nc6", "Bc4"],
                &["e7e5", "b8c6", "f8c5", "g8f6"],
                0.9,
            ),
            (
                "Ruy Lopez",
                Some("C60"),
                &["e4", "e5", "Nf3", "Nc6", "Bb5"],
                &["e7e5", "b8c6", "a7a6", "g8f6"],
                0.9,
            ),
            (
                "Sicilian Defense",
                Some("B20"),
                &["e4", "c5"],
                &["c7c5", "d7d6", "b8c6", "g8f6"],
                0.9,
            ),
            (
                "Sicilian Najdorf",
                Some("B90"),
                &["e4", "c5", "Nf3", "d6", "d4", "cxd4", "Nxd4", "Nf6", "Nc3", "a6"],
                &["c7c5", "d7d6", "g8f6", "a7a6", "e7e5"],
                0.9,
            ),
            ("French Defense", Some("C00"), &["e4", "e6"], &["e7e6", "d7d5", "b8c6"], 0.9),
            ("Caro-Kann Defense", Some("B10"), &["e4", "c6"], &["c7c6", "d7d5", "c8f5"], 0.9),
            (
                "Queen's Gambit",
                Some("D06"),
                &["d4", "d5", "c4"],
                &["c2c4", "b1c3", "c1g5", "e2e3"],
                0.9,
            ),
            (
                "London System",
                Some("D02"),
                &["d4", "d5", "Bf4"],
                &["c1f4", "d2d4", "g1f3", "e2e3", "c2c3"],
                1.0,
            ),
            (
                "King's Indian Defense",
                Some("E60"),
                &["d4", "Nf6", "c4", "g6"],
                &["g7g6", "f8g7", "e8g8", "d7d6"],
                0.9,
            ),
            (
                "Nimzo-Indian Defense",
                Some("E20"),
                &["d4", "Nf6", "c4", "e6", "Nc3", "Bb4"],
                &["f8b4", "e8g8", "b7b6", "c7c5"],
                0.9,
            ),
        ];

        for (name, eco, line, preferred, score) in openings {
            if let Err(e) = self.add_opening(name, eco, line, preferred, score) {
                log::error!("Opening catalogue entry rejected: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state_after(moves: &[&str]) -> GameState {
        let mut state = GameState::startpos();
        for uci in moves {
            state.apply_uci(uci).unwrap();
        }
        state
    }

    #[test]
    fn test_opening_book_creation() {
        let book = OpeningBook::new();
        assert!(book.is_empty());
    }

    #[test]
    fn test_standard_openings_all_valid() {
        let book = OpeningBook::with_standard_openings();
        assert_eq!(book.len(), 16);
        assert!(book.get("Ruy Lopez").is_some());
    }

    #[test]
    fn test_detect_from_start() {
        let book = OpeningBook::with_standard_openings();
        let detected = book.detect(&GameState::startpos()).unwrap();
        assert_eq!(detected.name, "Starting Position");
    }

    #[test]
    fn test_detect_longest_prefix() {
        let book = OpeningBook::with_standard_openings();
        let state = state_after(&["e2e4", "e7e5", "g1f3", "b8c6", "f1b5", "a7a6"]);
        assert_eq!(book.detect(&state).unwrap().name, "Ruy Lopez");

        let state = state_after(&["e2e4", "e7e5", "g1f3"]);
        assert_eq!(book.detect(&state).unwrap().name, "Open Game");
    }

    #[test]
    fn test_detect_from_fen_position() {
        let book = OpeningBook::with_standard_openings();
        let state = GameState::from_fen(
            "rnbqkbnr/pp1ppppp/8/2p5/4P3/8/PPPP1PPP/RNBQKBNR w KQkq - 0 2",
        )
        .unwrap();
        assert_eq!(book.detect(&state).unwrap().name, "Sicilian Defense");
    }

    #[test]
    fn test_continuation() {
        let book = OpeningBook::with_standard_openings();
        let italian = book.get("Italian Game").unwrap();
        let history = vec!["e4".to_string(), "e5".to_string(), "Nf3".to_string()];
        assert_eq!(italian.continuation(&history), Some("Nc6"));
        let off_line = vec!["d4".to_string()];
        assert_eq!(italian.continuation(&off_line), None);
    }

    #[test]
    fn test_add_invalid_line_rejected() {
        let mut book = OpeningBook::new();
        assert!(book
            .add_opening("Broken", None, &["e4", "e4"], &[], 0.9)
            .is_err());
        assert!(book.is_empty());
    }
}
