//! Attack-map queries on top of the `chess` crate's move tables.

use chess::{
    get_bishop_moves, get_king_moves, get_knight_moves, get_pawn_attacks, get_rook_moves, BitBoard,
    Board, Color, Piece, Square, EMPTY,
};

/// Conventional material values (pawn = 1).
pub fn piece_value(piece: Piece) -> f32 {
    match piece {
        Piece::Pawn => 1.0,
        Piece::Knight => 3.0,
        Piece::Bishop => 3.0,
        Piece::Rook => 5.0,
        Piece::Queen => 9.0,
        Piece::King => 0.0,
    }
}

/// Squares attacked by whatever stands on `square`, given the current occupancy.
pub fn attacks_from(board: &Board, square: Square) -> BitBoard {
    let (piece, color) = match (board.piece_on(square), board.color_on(square)) {
        (Some(piece), Some(color)) => (piece, color),
        _ => return EMPTY,
    };
    let occupied = *board.combined();

    match piece {
        Piece::Pawn => get_pawn_attacks(square, color, !EMPTY),
        Piece::Knight => get_knight_moves(square),
        Piece::Bishop => get_bishop_moves(square, occupied),
        Piece::Rook => get_rook_moves(square, occupied),
        Piece::Queen => get_bishop_moves(square, occupied) | get_rook_moves(square, occupied),
        Piece::King => get_king_moves(square),
    }
}

/// All pieces of `by` that attack `square`.
pub fn attackers_of(board: &Board, square: Square, by: Color) -> BitBoard {
    let occupied = *board.combined();
    let own = *board.color_combined(by);
    let queens = *board.pieces(Piece::Queen);

    let pawns = get_pawn_attacks(square, !by, !EMPTY) & *board.pieces(Piece::Pawn);
    let knights = get_knight_moves(square) & *board.pieces(Piece::Knight);
    let kings = get_king_moves(square) & *board.pieces(Piece::King);
    let diagonal = get_bishop_moves(square, occupied) & (*board.pieces(Piece::Bishop) | queens);
    let straight = get_rook_moves(square, occupied) & (*board.pieces(Piece::Rook) | queens);

    (pawns | knights | kings | diagonal | straight) & own
}

pub fn is_square_attacked_by(board: &Board, square: Square, by: Color) -> bool {
    attackers_of(board, square, by) != EMPTY
}

/// Union of every square attacked by `color`.
pub fn attack_map(board: &Board, color: Color) -> BitBoard {
    let mut map = EMPTY;
    for square in *board.color_combined(color) {
        map |= attacks_from(board, square);
    }
    map
}

/// Enemy pieces (kings included) that `color` currently attacks.
pub fn attacked_enemy_pieces(board: &Board, color: Color) -> BitBoard {
    attack_map(board, color) & *board.color_combined(!color)
}
