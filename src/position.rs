use chess::{Board, ChessMove, Color, MoveGen};
use std::str::FromStr;

use crate::errors::{ChessEngineError, Result};
use crate::notation;

pub const START_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

/// Largest full-move number accepted from a FEN.
pub const MAX_FULLMOVE: u32 = 1 << 24;

/// A board plus the bookkeeping the `chess` crate does not carry:
/// the full-move number and the moves played since the setup position.
#[derive(Debug, Clone)]
pub struct GameState {
    board: Board,
    fullmove: u32,
    start_ply: u32,
    moves: Vec<ChessMove>,
    san_moves: Vec<String>,
    from_startpos: bool,
}

impl Default for GameState {
    fn default() -> Self {
        Self::startpos()
    }
}

impl GameState {
    pub fn startpos() -> Self {
        Self {
            board: Board::default(),
            fullmove: 1,
            start_ply: 0,
            moves: Vec::new(),
            san_moves: Vec::new(),
            from_startpos: true,
        }
    }

    /// Parse a FEN with 4 to 6 fields; the full-move number defaults to 1.
    pub fn from_fen(fen: &str) -> Result<Self> {
        let fields: Vec<&str> = fen.split_whitespace().collect();
        if fields.len() < 4 {
            return Err(ChessEngineError::InvalidPosition(format!(
                "expected at least 4 FEN fields, got {}",
                fields.len()
            )));
        }
        let board = Board::from_str(&fields.join(" "))
            .map_err(|e| ChessEngineError::InvalidPosition(format!("{fen}: {e}")))?;
        let fullmove = fields
            .get(5)
            .and_then(|field| field.parse::<u32>().ok())
            .unwrap_or(1)
            .max(1);
        if fullmove > MAX_FULLMOVE {
            return Err(ChessEngineError::InvalidPosition(format!(
                "full-move number {fullmove} exceeds {MAX_FULLMOVE}"
            )));
        }
        let black_to_move = u32::from(board.side_to_move() == Color::Black);

        Ok(Self {
            board,
            fullmove,
            start_ply: (fullmove - 1) * 2 + black_to_move,
            moves: Vec::new(),
            san_moves: Vec::new(),
            from_startpos: board.get_hash() == Board::default().get_hash() && fullmove == 1,
        })
    }

    /// Build a state from the arguments of a `position` command
    /// (`startpos | fen <fields..>` optionally followed by `moves ...`).
    ///
    /// Returns the state reached together with the first error met. Move tokens
    /// after an invalid one are not applied.
    pub fn from_position_args(parts: &[&str]) -> (Option<Self>, Option<ChessEngineError>) {
        let moves_idx = parts.iter().position(|&token| token == "moves");
        let setup_end = moves_idx.unwrap_or(parts.len());

        let state = match parts.first() {
            Some(&"startpos") => Self::startpos(),
            Some(&"fen") => match Self::from_fen(&parts[1..setup_end].join(" ")) {
                Ok(state) => state,
                Err(e) => return (None, Some(e)),
            },
            _ => {
                return (
                    None,
                    Some(ChessEngineError::InvalidPosition(
                        "position needs 'startpos' or 'fen'".to_string(),
                    )),
                )
            }
        };

        let mut state = state;
        if let Some(idx) = moves_idx {
            for token in &parts[idx + 1..] {
                if let Err(e) = state.apply_uci(token) {
                    return (Some(state), Some(e));
                }
            }
        }
        (Some(state), None)
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn side_to_move(&self) -> Color {
        self.board.side_to_move()
    }

    pub fn fullmove_number(&self) -> u32 {
        self.fullmove
    }

    /// Zero-based index of the next half-move in the game.
    pub fn ply_index(&self) -> u32 {
        self.start_ply.saturating_add(self.moves.len() as u32)
    }

    pub fn moves(&self) -> &[ChessMove] {
        &self.moves
    }

    /// SAN of every move since the initial position, when the game started there.
    pub fn san_history(&self) -> Option<&[String]> {
        if self.from_startpos {
            Some(&self.san_moves)
        } else {
            None
        }
    }

    pub fn legal_moves(&self) -> Vec<ChessMove> {
        MoveGen::new_legal(&self.board).collect()
    }

    pub fn apply_uci(&mut self, token: &str) -> Result<ChessMove> {
        let illegal = || ChessEngineError::IllegalMove {
            token: token.to_string(),
            fen: self.board.to_string(),
        };
        let chess_move = ChessMove::from_str(token).map_err(|_| illegal())?;
        if !self.board.legal(chess_move) {
            return Err(illegal());
        }
        self.apply_move(chess_move);
        Ok(chess_move)
    }

    /// Play a move already known to be legal.
    pub fn apply_move(&mut self, chess_move: ChessMove) {
        let san = notation::to_san(&self.board, chess_move);
        if self.board.side_to_move() == Color::Black {
            self.fullmove = self.fullmove.saturating_add(1);
        }
        self.board = self.board.make_move_new(chess_move);
        self.moves.push(chess_move);
        self.san_moves.push(san);
    }
}
