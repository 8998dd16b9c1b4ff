//! Weighted sampling among the best-ranked candidates.

use chess::ChessMove;
use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;

use crate::errors::{ChessEngineError, Result};
use crate::move_scorer::Candidate;

/// How many of the best candidates take part in the draw.
pub const DEFAULT_TOP_K: usize = 3;

/// UCI spelling of "no move".
pub const NULL_MOVE: &str = "0000";

/// Outcome of one move-selection call.
#[derive(Debug, Clone, PartialEq)]
pub enum Selection {
    /// Checkmate or stalemate
    NoLegalMove,
    /// Exactly one legal move; nothing was scored
    Forced(ChessMove),
    Chosen(Candidate),
    /// Scoring failed or was stopped before ranking anything
    Fallback(ChessMove),
}

impl Selection {
    pub fn chess_move(&self) -> Option<ChessMove> {
        match self {
            Selection::NoLegalMove => None,
            Selection::Forced(chess_move) | Selection::Fallback(chess_move) => Some(*chess_move),
            Selection::Chosen(candidate) => Some(candidate.chess_move),
        }
    }

    pub fn into_move(self) -> Result<ChessMove> {
        self.chess_move().ok_or(ChessEngineError::NoLegalMove)
    }

    /// The move in UCI notation, `0000` when there is none.
    pub fn to_uci(&self) -> String {
        self.chess_move()
            .map(|chess_move| chess_move.to_string())
            .unwrap_or_else(|| NULL_MOVE.to_string())
    }
}

/// Draw one of the first `top_k` candidates with probability proportional to
/// its score. Scores are shifted up by the minimum when it is negative; an
/// all-zero draw is uniform. `candidates` must be sorted best first.
pub fn select<'c, R: Rng + ?Sized>(
    candidates: &'c [Candidate],
    top_k: usize,
    rng: &mut R,
) -> Option<&'c Candidate> {
    let pool = &candidates[..candidates.len().min(top_k.max(1))];
    if pool.len() <= 1 {
        return pool.first();
    }

    let min = pool
        .iter()
        .map(|candidate| candidate.overall)
        .fold(f32::INFINITY, f32::min);
    let shift = if min < 0.0 { -min } else { 0.0 };
    let weights: Vec<f32> = pool
        .iter()
        .map(|candidate| {
            let weight = candidate.overall + shift;
            if weight.is_finite() {
                weight
            } else {
                0.0
            }
        })
        .collect();

    match WeightedIndex::new(&weights) {
        Ok(distribution) => pool.get(distribution.sample(rng)),
        // All weights zero
        Err(_) => pool.get(rng.gen_range(0..pool.len())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::move_scorer::ComponentScores;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::str::FromStr;

    fn candidate(uci: &str, overall: f32) -> Candidate {
        Candidate {
            chess_move: ChessMove::from_str(uci).unwrap(),
            san: uci.to_string(),
            scores: ComponentScores::default(),
            overall,
            is_capture: false,
            gives_check: false,
            is_promotion: false,
        }
    }

    fn tally(candidates: &[Candidate], draws: usize) -> Vec<usize> {
        let mut rng = StdRng::seed_from_u64(99);
        let mut counts = vec![0; candidates.len()];
        for _ in 0..draws {
            let picked = select(candidates, DEFAULT_TOP_K, &mut rng).unwrap();
            let idx = candidates.iter().position(|c| c == picked).unwrap();
            counts[idx] += 1;
        }
        counts
    }

    #[test]
    fn test_only_top_k_are_drawn() {
        let candidates = vec![
            candidate("e2e4", 0.9),
            candidate("d2d4", 0.8),
            candidate("g1f3", 0.7),
            candidate("a2a3", 0.6),
        ];
        let counts = tally(&candidates, 500);
        assert_eq!(counts[3], 0);
        assert!(counts[0] > 0 && counts[1] > 0 && counts[2] > 0);
    }

    #[test]
    fn test_zero_weight_never_drawn_unless_all_zero() {
        let candidates = vec![
            candidate("e2e4", 0.5),
            candidate("d2d4", 0.0),
            candidate("g1f3", 0.0),
        ];
        assert_eq!(tally(&candidates, 200), vec![200, 0, 0]);

        let all_zero = vec![
            candidate("e2e4", 0.0),
            candidate("d2d4", 0.0),
            candidate("g1f3", 0.0),
        ];
        let counts = tally(&all_zero, 300);
        assert!(counts.iter().all(|&n| n > 0));
    }

    #[test]
    fn test_negative_scores_are_shifted() {
        let candidates = vec![
            candidate("e2e4", 0.2),
            candidate("d2d4", -0.1),
            candidate("g1f3", -0.3),
        ];
        // Shifted weights 0.5, 0.2, 0.0
        let counts = tally(&candidates, 400);
        assert_eq!(counts[2], 0);
        assert!(counts[0] > counts[1]);
    }

    #[test]
    fn test_single_and_empty() {
        let mut rng = StdRng::seed_from_u64(1);
        assert!(select(&[], DEFAULT_TOP_K, &mut rng).is_none());
        let one = vec![candidate("e2e4", -1.0)];
        assert_eq!(select(&one, DEFAULT_TOP_K, &mut rng), one.first());
    }

    #[test]
    fn test_selection_uci() {
        assert_eq!(Selection::NoLegalMove.to_uci(), "0000");
        assert!(matches!(
            Selection::NoLegalMove.into_move(),
            Err(ChessEngineError::NoLegalMove)
        ));
        let forced = Selection::Forced(ChessMove::from_str("e1e2").unwrap());
        assert_eq!(forced.to_uci(), "e1e2");
    }
}
