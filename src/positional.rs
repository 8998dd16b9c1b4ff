//! Static positional factors measured on the board after a candidate move.

use chess::{get_king_moves, BitBoard, Board, Color, MoveGen, Piece, Square, EMPTY};

use crate::attacks::attack_map;
use crate::phase::GamePhase;

pub const CENTER: [Square; 4] = [Square::D4, Square::E4, Square::D5, Square::E5];

/// The ring around the four central squares (c3-f6 minus the centre).
pub const EXTENDED_CENTER: [Square; 12] = [
    Square::C3,
    Square::D3,
    Square::E3,
    Square::F3,
    Square::C4,
    Square::F4,
    Square::C5,
    Square::F5,
    Square::C6,
    Square::D6,
    Square::E6,
    Square::F6,
];

pub fn is_center(square: Square) -> bool {
    CENTER.contains(&square)
}

pub fn is_extended_center(square: Square) -> bool {
    EXTENDED_CENTER.contains(&square)
}

/// The four positional factors, each in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionalFactors {
    pub pawn_structure: f32,
    pub mobility: f32,
    pub king_safety: f32,
    pub center_control: f32,
}

impl PositionalFactors {
    /// Phase blend: the opening leans on structure and centre, the endgame on
    /// structure and mobility.
    pub fn blend(&self, phase: GamePhase) -> f32 {
        let (pawns, mobility, king, center) = match phase {
            GamePhase::Opening => (0.3, 0.2, 0.2, 0.3),
            GamePhase::Middlegame => (0.25, 0.25, 0.25, 0.25),
            GamePhase::Endgame => (0.4, 0.4, 0.1, 0.1),
        };
        pawns * self.pawn_structure
            + mobility * self.mobility
            + king * self.king_safety
            + center * self.center_control
    }
}

/// 1.0 for a healthy pawn chain, minus penalties for isolated and doubled pawns.
pub fn pawn_structure(board: &Board, color: Color) -> f32 {
    let pawns = *board.pieces(Piece::Pawn) & *board.color_combined(color);
    let total = pawns.popcnt();
    if total == 0 {
        return 0.5;
    }

    let mut per_file = [0u32; 8];
    for square in pawns {
        per_file[square.get_file().to_index()] += 1;
    }

    let mut isolated = 0u32;
    let mut doubled = 0u32;
    for file in 0..8 {
        let count = per_file[file];
        if count == 0 {
            continue;
        }
        if count > 1 {
            doubled += count - 1;
        }
        let left = file > 0 && per_file[file - 1] > 0;
        let right = file < 7 && per_file[file + 1] > 0;
        if !left && !right {
            isolated += count;
        }
    }

    let n = total as f32;
    (1.0 - 0.3 * isolated as f32 / n - 0.2 * doubled as f32 / n).clamp(0.0, 1.0)
}

/// Bucketed move count.
pub fn mobility_bucket(moves: usize) -> f32 {
    match moves {
        m if m >= 40 => 0.9,
        m if m >= 30 => 0.8,
        m if m >= 20 => 0.7,
        m if m >= 10 => 0.6,
        m if m >= 5 => 0.4,
        _ => 0.2,
    }
}

/// Mobility of `color` in `after`, where `after` has the opponent to move.
///
/// Counts legal moves by passing the turn; when the opponent is in check (so a
/// null move is impossible) the attacked-square count stands in for it.
pub fn mobility(after: &Board, color: Color) -> f32 {
    let count = match after.null_move() {
        Some(passed) if passed.side_to_move() == color => MoveGen::new_legal(&passed).len(),
        _ => (attack_map(after, color) & !*after.color_combined(color)).popcnt() as usize,
    };
    mobility_bucket(count)
}

fn castled_square(square: Square, color: Color) -> bool {
    match color {
        Color::White => matches!(square, Square::G1 | Square::C1),
        Color::Black => matches!(square, Square::G8 | Square::C8),
    }
}

/// Castled status plus friendly/enemy presence around the king.
pub fn king_safety(board: &Board, color: Color, phase: GamePhase) -> f32 {
    if phase == GamePhase::Endgame {
        return 0.7;
    }
    let king = board.king_square(color);
    let zone = get_king_moves(king);
    let defenders = (zone & *board.color_combined(color)).popcnt() as f32;
    let attackers = (zone & *board.color_combined(!color)).popcnt() as f32;

    let base = if castled_square(king, color) { 0.8 } else { 0.5 };
    (base + 0.05 * defenders - 0.1 * attackers).clamp(0.0, 1.0)
}

/// Occupancy and attacks on the centre (heavy) and its ring (light), capped at 1.
pub fn center_control(board: &Board, color: Color) -> f32 {
    let own = *board.color_combined(color);
    let attacks = attack_map(board, color);

    let mut score = 0.0f32;
    for &square in &CENTER {
        let bit = BitBoard::from_square(square);
        if own & bit != EMPTY {
            score += 0.15;
        }
        if attacks & bit != EMPTY {
            score += 0.1;
        }
    }
    for &square in &EXTENDED_CENTER {
        let bit = BitBoard::from_square(square);
        if own & bit != EMPTY {
            score += 0.05;
        }
        if attacks & bit != EMPTY {
            score += 0.025;
        }
    }
    score.min(1.0)
}
