//! Heuristic one-ply tactical motif detectors.
//!
//! These are approximations: a fork is "the moved piece attacks two or more
//! enemy pieces", a pin is "exactly one enemy piece between the moved slider and
//! the enemy king on a line it moves along", a discovered attack is "a piece
//! other than the mover newly attacks the enemy king or queen". No exchange
//! evaluation is done; precision is traded for a bounded per-move cost.

use chess::{between, BitBoard, Board, ChessMove, Color, Piece, Square, EMPTY};

use crate::attacks::{attackers_of, attacks_from, piece_value};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Motif {
    Capture { captured: Piece },
    Check,
    Promotion,
    Fork { targets: u32, value: f32 },
    Pin { pinned: Piece },
    DiscoveredAttack { target: Piece },
}

impl Motif {
    /// Base score of the motif, before any style scaling.
    pub fn base_score(&self) -> f32 {
        match *self {
            Motif::Capture { captured } => 0.3 + 0.4 * (piece_value(captured) / 9.0),
            Motif::Check => 0.7,
            Motif::Promotion => 0.9,
            Motif::Fork { value, .. } => 0.8 * (0.5 + 0.05 * value).min(1.0),
            Motif::Pin { pinned } => {
                0.7 * match pinned {
                    Piece::Queen => 0.9,
                    Piece::Rook => 0.8,
                    Piece::Knight | Piece::Bishop => 0.7,
                    _ => 0.5,
                }
            }
            Motif::DiscoveredAttack { target } => {
                0.8 * if target == Piece::King { 0.9 } else { 0.8 }
            }
        }
    }
}

/// Value used when summing fork targets; the king counts as the most valuable target.
fn fork_target_value(piece: Piece) -> f32 {
    if piece == Piece::King {
        10.0
    } else {
        piece_value(piece)
    }
}

/// Piece captured by `chess_move`, including en passant.
pub fn captured_piece(board: &Board, chess_move: ChessMove) -> Option<Piece> {
    let dest = chess_move.get_dest();
    if board.color_on(dest) == Some(!board.side_to_move()) {
        return board.piece_on(dest);
    }
    let is_pawn = board.piece_on(chess_move.get_source()) == Some(Piece::Pawn);
    if is_pawn && chess_move.get_source().get_file() != dest.get_file() {
        return Some(Piece::Pawn);
    }
    None
}

/// The moved piece attacks at least two enemy pieces after the move.
pub fn detect_fork(after: &Board, dest: Square, mover: Color) -> Option<Motif> {
    let targets = attacks_from(after, dest) & *after.color_combined(!mover);
    if targets.popcnt() < 2 {
        return None;
    }
    let value: f32 = targets
        .into_iter()
        .filter_map(|square| after.piece_on(square))
        .map(fork_target_value)
        .sum();
    Some(Motif::Fork {
        targets: targets.popcnt(),
        value,
    })
}

/// Exactly one enemy piece stands between the moved slider and the enemy king.
pub fn detect_pin(after: &Board, dest: Square, mover: Color) -> Option<Motif> {
    let piece = after.piece_on(dest)?;
    let king = after.king_square(!mover);

    let same_line = dest.get_rank() == king.get_rank() || dest.get_file() == king.get_file();
    let same_diagonal = {
        let dr = dest.get_rank().to_index() as i32 - king.get_rank().to_index() as i32;
        let df = dest.get_file().to_index() as i32 - king.get_file().to_index() as i32;
        dr != 0 && dr.abs() == df.abs()
    };
    let moves_along = match piece {
        Piece::Rook => same_line,
        Piece::Bishop => same_diagonal,
        Piece::Queen => same_line || same_diagonal,
        _ => false,
    };
    if !moves_along {
        return None;
    }

    let blockers = between(dest, king) & *after.combined();
    if blockers.popcnt() != 1 {
        return None;
    }
    let blocker = first_square(blockers)?;
    if after.color_on(blocker) != Some(!mover) {
        return None;
    }
    after
        .piece_on(blocker)
        .map(|pinned| Motif::Pin { pinned })
}

/// A piece other than the mover attacks the enemy king or queen after the move
/// and did not before it.
pub fn detect_discovered_attack(
    before: &Board,
    after: &Board,
    chess_move: ChessMove,
    mover: Color,
) -> Option<Motif> {
    let enemy = *after.color_combined(!mover);
    let mover_square = BitBoard::from_square(chess_move.get_dest());

    let king = after.king_square(!mover);
    let queens = *after.pieces(Piece::Queen) & enemy;

    let mut targets: Vec<(Square, Piece)> = vec![(king, Piece::King)];
    targets.extend(queens.into_iter().map(|square| (square, Piece::Queen)));

    for (square, target) in targets {
        let now = attackers_of(after, square, mover) & !mover_square;
        let previously = attackers_of(before, square, mover);
        // Attackers that were already hitting the square do not count
        if now & !previously != EMPTY {
            return Some(Motif::DiscoveredAttack { target });
        }
    }
    None
}

fn first_square(bitboard: BitBoard) -> Option<Square> {
    bitboard.into_iter().next()
}
