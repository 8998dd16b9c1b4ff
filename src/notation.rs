//! Standard algebraic notation for legal moves.
//!
//! The `chess` crate can parse SAN but cannot produce it, and pattern-store keys are
//! written in SAN (with `+`/`#` suffixes), so both directions live here.

use chess::{Board, BoardStatus, ChessMove, File, MoveGen, Piece, EMPTY};

fn piece_letter(piece: Piece) -> &'static str {
    match piece {
        Piece::Pawn => "",
        Piece::Knight => "N",
        Piece::Bishop => "B",
        Piece::Rook => "R",
        Piece::Queen => "Q",
        Piece::King => "K",
    }
}

fn file_char(file: File) -> char {
    (b'a' + file.to_index() as u8) as char
}

fn rank_char(square: chess::Square) -> char {
    (b'1' + square.get_rank().to_index() as u8) as char
}

pub fn is_castling(board: &Board, chess_move: ChessMove) -> bool {
    board.piece_on(chess_move.get_source()) == Some(Piece::King)
        && (chess_move.get_source().get_file().to_index() as i32
            - chess_move.get_dest().get_file().to_index() as i32)
            .abs()
            == 2
}

/// True for ordinary captures and en passant.
pub fn is_capture(board: &Board, chess_move: ChessMove) -> bool {
    let dest = chess_move.get_dest();
    if board.color_on(dest) == Some(!board.side_to_move()) {
        return true;
    }
    board.piece_on(chess_move.get_source()) == Some(Piece::Pawn)
        && chess_move.get_source().get_file() != dest.get_file()
}

/// SAN without the check suffix.
pub fn to_san_core(board: &Board, chess_move: ChessMove) -> String {
    let source = chess_move.get_source();
    let dest = chess_move.get_dest();
    let piece = match board.piece_on(source) {
        Some(piece) => piece,
        None => return chess_move.to_string(),
    };

    if is_castling(board, chess_move) {
        return if dest.get_file().to_index() > source.get_file().to_index() {
            "O-O".to_string()
        } else {
            "O-O-O".to_string()
        };
    }

    let capture = is_capture(board, chess_move);
    let mut san = String::with_capacity(7);

    if piece == Piece::Pawn {
        if capture {
            san.push(file_char(source.get_file()));
            san.push('x');
        }
        san.push_str(&dest.to_string());
        if let Some(promotion) = chess_move.get_promotion() {
            san.push('=');
            san.push_str(piece_letter(promotion));
        }
        return san;
    }

    san.push_str(piece_letter(piece));

    // Disambiguate against other pieces of the same kind reaching the same square
    let rivals: Vec<ChessMove> = MoveGen::new_legal(board)
        .filter(|m| {
            m.get_dest() == dest
                && m.get_source() != source
                && board.piece_on(m.get_source()) == Some(piece)
        })
        .collect();
    if !rivals.is_empty() {
        let shares_file = rivals
            .iter()
            .any(|m| m.get_source().get_file() == source.get_file());
        let shares_rank = rivals
            .iter()
            .any(|m| m.get_source().get_rank() == source.get_rank());
        if !shares_file {
            san.push(file_char(source.get_file()));
        } else if !shares_rank {
            san.push(rank_char(source));
        } else {
            san.push(file_char(source.get_file()));
            san.push(rank_char(source));
        }
    }

    if capture {
        san.push('x');
    }
    san.push_str(&dest.to_string());
    san
}

/// Full SAN including `+` or `#`.
pub fn to_san(board: &Board, chess_move: ChessMove) -> String {
    let mut san = to_san_core(board, chess_move);
    let after = board.make_move_new(chess_move);
    if *after.checkers() != EMPTY {
        if after.status() == BoardStatus::Checkmate {
            san.push('#');
        } else {
            san.push('+');
        }
    }
    san
}

/// Strip check/annotation suffixes so `Nf3+`, `Nf3!?` and `Nf3` compare equal.
pub fn strip_suffix(san: &str) -> &str {
    san.trim_end_matches(|c| matches!(c, '+' | '#' | '!' | '?'))
}

/// Resolve a SAN token to a legal move in `board`.
pub fn parse_san(board: &Board, san: &str) -> Option<ChessMove> {
    let wanted = normalize_castling(strip_suffix(san.trim()));
    let found = MoveGen::new_legal(board).find(|m| to_san_core(board, *m) == wanted);
    if found.is_some() {
        return found;
    }
    // Over-disambiguated or otherwise unusual spellings
    ChessMove::from_san(board, &wanted)
        .ok()
        .filter(|m| board.legal(*m))
}

fn normalize_castling(san: &str) -> String {
    match san {
        "0-0" => "O-O".to_string(),
        "0-0-0" => "O-O-O".to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn mv(text: &str) -> ChessMove {
        ChessMove::from_str(text).unwrap()
    }

    #[test]
    fn test_basic_san() {
        let board = Board::default();
        assert_eq!(to_san(&board, mv("e2e4")), "e4");
        assert_eq!(to_san(&board, mv("g1f3")), "Nf3");
    }

    #[test]
    fn test_capture_and_check() {
        // 1.e4 e5 2.Nf3 d6 3.Bb5+ then Bxe8 style captures
        let board =
            Board::from_str("rnbqkbnr/ppp2ppp/3p4/4p3/4P3/5N2/PPPP1PPP/RNBQKB1R w KQkq - 0 3")
                .unwrap();
        assert_eq!(to_san(&board, mv("f1b5")), "Bb5+");
        assert_eq!(to_san(&board, mv("f3e5")), "Nxe5");
    }

    #[test]
    fn test_castling_san() {
        let board =
            Board::from_str("r1bqk2r/pppp1ppp/2n2n2/2b1p3/2B1P3/5N2/PPPP1PPP/RNBQK2R w KQkq - 4 4")
                .unwrap();
        assert_eq!(to_san(&board, mv("e1g1")), "O-O");
        assert_eq!(parse_san(&board, "O-O"), Some(mv("e1g1")));
        assert_eq!(parse_san(&board, "0-0"), Some(mv("e1g1")));
    }

    #[test]
    fn test_disambiguation() {
        // Knights on b1 and f3 can both reach d2
        let board =
            Board::from_str("rnbqkbnr/pppppppp/8/8/8/5N2/PPP1PPPP/RNBQKB1R w KQkq - 0 1")
                .unwrap();
        assert_eq!(to_san(&board, mv("b1d2")), "Nbd2");
        assert_eq!(to_san(&board, mv("f3d2")), "Nfd2");
    }

    #[test]
    fn test_promotion_and_mate() {
        let board = Board::from_str("7k/4P3/6K1/8/8/8/8/8 w - - 0 1").unwrap();
        assert_eq!(to_san(&board, mv("e7e8q")), "e8=Q#");
        assert_eq!(parse_san(&board, "e8=Q#"), Some(mv("e7e8q")));
    }

    #[test]
    fn test_parse_rejects_illegal() {
        let board = Board::default();
        assert_eq!(parse_san(&board, "e5"), None);
        assert_eq!(parse_san(&board, "Nf3+"), Some(mv("g1f3")));
    }

    #[test]
    fn test_en_passant_is_capture() {
        let board =
            Board::from_str("rnbqkbnr/ppp1p1pp/8/3pPp2/8/8/PPPP1PPP/RNBQKBNR w KQkq f6 0 3")
                .unwrap();
        assert!(is_capture(&board, mv("e5f6")));
        assert_eq!(to_san(&board, mv("e5f6")), "exf6");
    }
}
