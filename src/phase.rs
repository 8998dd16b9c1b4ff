use chess::{Board, Color, Piece};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::position::GameState;

/// Coarse stage of the game used to pick scoring weights.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GamePhase {
    Opening,
    Middlegame,
    Endgame,
}

impl fmt::Display for GamePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GamePhase::Opening => write!(f, "opening"),
            GamePhase::Middlegame => write!(f, "middlegame"),
            GamePhase::Endgame => write!(f, "endgame"),
        }
    }
}

/// The only inputs the classifier looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseFeatures {
    pub non_king_pieces: u32,
    pub queens: u32,
    pub any_castling_rights: bool,
    pub fullmove_number: u32,
}

impl PhaseFeatures {
    pub fn from_board(board: &Board, fullmove_number: u32) -> Self {
        let kings = board.pieces(Piece::King).popcnt();
        Self {
            non_king_pieces: board.combined().popcnt() - kings,
            queens: board.pieces(Piece::Queen).popcnt(),
            any_castling_rights: has_castling_rights(board, Color::White)
                || has_castling_rights(board, Color::Black),
            fullmove_number,
        }
    }

    /// Fixed thresholds: opening needs a near-full board, some castling right and
    /// move number <= 15; endgame is <= 10 pieces or no queens.
    pub fn classify(&self) -> GamePhase {
        if self.non_king_pieces >= 14 && self.any_castling_rights && self.fullmove_number <= 15 {
            GamePhase::Opening
        } else if self.non_king_pieces <= 10 || self.queens == 0 {
            GamePhase::Endgame
        } else {
            GamePhase::Middlegame
        }
    }
}

pub fn has_castling_rights(board: &Board, color: Color) -> bool {
    let rights = board.castle_rights(color);
    rights.has_kingside() || rights.has_queenside()
}

pub fn classify(board: &Board, fullmove_number: u32) -> GamePhase {
    PhaseFeatures::from_board(board, fullmove_number).classify()
}

pub fn classify_state(state: &GameState) -> GamePhase {
    classify(state.board(), state.fullmove_number())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_starting_position_is_opening() {
        assert_eq!(classify(&Board::default(), 1), GamePhase::Opening);
    }

    #[test]
    fn test_move_number_boundary() {
        let features = PhaseFeatures {
            non_king_pieces: 30,
            queens: 2,
            any_castling_rights: true,
            fullmove_number: 15,
        };
        assert_eq!(features.classify(), GamePhase::Opening);

        let later = PhaseFeatures {
            fullmove_number: 16,
            ..features
        };
        assert_eq!(later.classify(), GamePhase::Middlegame);
    }

    #[test]
    fn test_piece_count_boundary() {
        let ten = PhaseFeatures {
            non_king_pieces: 10,
            queens: 2,
            any_castling_rights: false,
            fullmove_number: 40,
        };
        assert_eq!(ten.classify(), GamePhase::Endgame);

        let eleven = PhaseFeatures {
            non_king_pieces: 11,
            ..ten
        };
        assert_eq!(eleven.classify(), GamePhase::Middlegame);
    }

    #[test]
    fn test_queenless_is_endgame() {
        let board =
            Board::from_str("rnb1kbnr/pppp1ppp/8/4p3/4P3/8/PPPP1PPP/RNB1KBNR w KQkq - 0 3")
                .unwrap();
        // Castling rights and a full board, but the move number rules out the opening
        assert_eq!(classify(&board, 20), GamePhase::Endgame);
        // Within the first 15 moves the opening test wins
        assert_eq!(classify(&board, 3), GamePhase::Opening);
    }

    #[test]
    fn test_classification_is_repeatable() {
        let board = Board::default();
        let first = classify(&board, 12);
        for _ in 0..10 {
            assert_eq!(classify(&board, 12), first);
        }
    }
}
