//! Per-move style scoring.
//!
//! Every legal move gets six component scores in [0, 1] (opening match, piece
//! preference, square preference, tactics, positional factors, decisiveness),
//! combined with a phase-specific weight table and a small multiplicative
//! jitter. Nothing here searches: each move is judged on the position it
//! produces one ply ahead.

use chess::{Board, ChessMove, Color, Piece, Square, EMPTY};
use rand::Rng;

use crate::attacks::{attacked_enemy_pieces, is_square_attacked_by, piece_value};
use crate::extraction::{is_development, is_forward};
use crate::motifs::{self, Motif};
use crate::notation;
use crate::opening_book::OpeningEntry;
use crate::pattern_store::{material_signature, piece_symbol, PatternStore, PieceUsage, StyleProfile};
use crate::phase::GamePhase;
use crate::position::GameState;
use crate::positional::{self, PositionalFactors};
use crate::time_control::SearchBudget;

/// Neutral value for a component with no supporting data.
pub const NEUTRAL_SCORE: f32 = 0.5;

/// Tactical score of a move with no motif.
pub const NO_MOTIF_SCORE: f32 = 0.4;

/// The six component scores of one candidate, each clamped to [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ComponentScores {
    pub opening_match: f32,
    pub piece: f32,
    pub square: f32,
    pub decisiveness: f32,
    pub positional: f32,
    pub tactical: f32,
}

impl ComponentScores {
    pub fn as_array(&self) -> [f32; 6] {
        [
            self.opening_match,
            self.piece,
            self.square,
            self.decisiveness,
            self.positional,
            self.tactical,
        ]
    }

    fn clamped(self) -> Self {
        let unit = |value: f32| {
            if value.is_nan() {
                0.0
            } else {
                value.clamp(0.0, 1.0)
            }
        };
        Self {
            opening_match: unit(self.opening_match),
            piece: unit(self.piece),
            square: unit(self.square),
            decisiveness: unit(self.decisiveness),
            positional: unit(self.positional),
            tactical: unit(self.tactical),
        }
    }
}

/// A legal move annotated with its scores for one selection call.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub chess_move: ChessMove,
    pub san: String,
    pub scores: ComponentScores,
    pub overall: f32,
    pub is_capture: bool,
    pub gives_check: bool,
    pub is_promotion: bool,
}

impl Candidate {
    /// Short tag list for diagnostics, e.g. `capture check`.
    pub fn flags(&self) -> String {
        let tags: Vec<&str> = [
            (self.is_capture, "capture"),
            (self.gives_check, "check"),
            (self.is_promotion, "promotion"),
        ]
        .iter()
        .filter(|(set, _)| *set)
        .map(|(_, tag)| *tag)
        .collect();
        if tags.is_empty() {
            "quiet".to_string()
        } else {
            tags.join(" ")
        }
    }
}

/// Weight of each component in the overall score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhaseWeights {
    pub opening_match: f32,
    pub piece: f32,
    pub square: f32,
    pub decisiveness: f32,
    pub positional: f32,
    pub tactical: f32,
}

impl PhaseWeights {
    pub fn for_phase(phase: GamePhase) -> Self {
        match phase {
            GamePhase::Opening => Self {
                opening_match: 0.30,
                piece: 0.20,
                square: 0.20,
                decisiveness: 0.0,
                positional: 0.20,
                tactical: 0.10,
            },
            GamePhase::Middlegame => Self {
                opening_match: 0.0,
                piece: 0.25,
                square: 0.25,
                decisiveness: 0.15,
                positional: 0.15,
                tactical: 0.20,
            },
            GamePhase::Endgame => Self {
                opening_match: 0.0,
                piece: 0.25,
                square: 0.20,
                decisiveness: 0.0,
                positional: 0.30,
                tactical: 0.25,
            },
        }
    }

    pub fn combine(&self, scores: &ComponentScores) -> f32 {
        self.opening_match * scores.opening_match
            + self.piece * scores.piece
            + self.square * scores.square
            + self.decisiveness * scores.decisiveness
            + self.positional * scores.positional
            + self.tactical * scores.tactical
    }
}

/// Scores legal moves against a read-only pattern store.
pub struct MoveScorer<'a> {
    store: &'a PatternStore,
    jitter: f32,
}

impl<'a> MoveScorer<'a> {
    pub fn new(store: &'a PatternStore, jitter: f32) -> Self {
        Self {
            store,
            jitter: jitter.clamp(0.0, 0.2),
        }
    }

    /// Score `moves` in `state` and return them best first.
    ///
    /// Once the budget has expired the fork, pin and discovered-attack scans and
    /// the mobility count are skipped. A raised stop flag ends scoring and the
    /// moves ranked so far are returned.
    pub fn score<R: Rng + ?Sized>(
        &self,
        state: &GameState,
        moves: &[ChessMove],
        phase: GamePhase,
        opening: Option<&OpeningEntry>,
        budget: &SearchBudget,
        rng: &mut R,
    ) -> Vec<Candidate> {
        let weights = PhaseWeights::for_phase(phase);
        let mut candidates = Vec::with_capacity(moves.len());

        for &chess_move in moves {
            if budget.stopped() {
                log::debug!(
                    "Scoring stopped after {}/{} moves",
                    candidates.len(),
                    moves.len()
                );
                break;
            }
            let thorough = !budget.expired();
            let mut candidate = self.score_move(state, chess_move, phase, opening, thorough);
            candidate.overall = weights.combine(&candidate.scores) * self.jitter_factor(rng);
            candidates.push(candidate);
        }

        // Stable: equal scores keep move-generation order
        candidates.sort_by(|a, b| b.overall.total_cmp(&a.overall));
        candidates
    }

    fn jitter_factor<R: Rng + ?Sized>(&self, rng: &mut R) -> f32 {
        if self.jitter > 0.0 {
            rng.gen_range(1.0 - self.jitter..=1.0 + self.jitter)
        } else {
            1.0
        }
    }

    fn score_move(
        &self,
        state: &GameState,
        chess_move: ChessMove,
        phase: GamePhase,
        opening: Option<&OpeningEntry>,
        thorough: bool,
    ) -> Candidate {
        let board = state.board();
        let mover = board.side_to_move();
        let after = board.make_move_new(chess_move);
        let san = notation::to_san(board, chess_move);
        let piece = board.piece_on(chess_move.get_source()).unwrap_or(Piece::Pawn);

        let scores = ComponentScores {
            opening_match: match (phase, opening) {
                (GamePhase::Opening, Some(entry)) => {
                    self.opening_match(state, chess_move, &san, entry)
                }
                _ => 0.0,
            },
            piece: self.piece_preference(piece, mover, chess_move, phase),
            square: self.square_preference(piece, mover, chess_move.get_dest(), phase),
            decisiveness: decisiveness(board, &after, chess_move, piece, thorough),
            positional: self.positional(board, &after, chess_move, phase, thorough),
            tactical: self.tactical(board, &after, chess_move, thorough),
        };
        Candidate {
            chess_move,
            san,
            scores: scores.clamped(),
            overall: 0.0,
            is_capture: notation::is_capture(board, chess_move),
            gives_check: *after.checkers() != EMPTY,
            is_promotion: chess_move.get_promotion().is_some(),
        }
    }

    fn opening_match(
        &self,
        state: &GameState,
        chess_move: ChessMove,
        san: &str,
        opening: &OpeningEntry,
    ) -> f32 {
        let continues_line = state
            .san_history()
            .and_then(|history| opening.continuation(history))
            .map_or(false, |next| next == notation::strip_suffix(san));

        // Moves that survived compression outrank every fallback below
        if let Some(stat) = self.store.opening_stat(state.ply_index(), san) {
            return 0.9 + 0.1 * (stat.weight * 0.1).min(1.0) as f32;
        }
        if continues_line {
            0.9
        } else if opening.prefers(chess_move) {
            opening.preferred_score
        } else {
            opening_principles(state.board(), chess_move)
        }
    }

    fn piece_preference(
        &self,
        piece: Piece,
        mover: Color,
        chess_move: ChessMove,
        phase: GamePhase,
    ) -> f32 {
        let style = match self.store.style() {
            Some(style) => style,
            None => return NEUTRAL_SCORE,
        };
        let symbol = piece_symbol(piece, mover);
        let usage = match style.piece_usage.get(&symbol) {
            Some(usage) => usage,
            None => return NEUTRAL_SCORE,
        };

        let busiest = same_colour_max(style, mover, |u| u.in_phase(phase));
        let relative = if busiest == 0 {
            NEUTRAL_SCORE
        } else {
            usage.in_phase(phase) as f32 / busiest as f32
        };

        let directed = usage.attack_moves + usage.defense_moves;
        let attack_preference = if directed == 0 {
            NEUTRAL_SCORE
        } else {
            usage.attack_moves as f32 / directed as f32
        };
        let agreement = if is_forward(chess_move, mover) {
            attack_preference
        } else {
            1.0 - attack_preference
        };

        0.3 + 0.4 * relative + 0.3 * agreement
    }

    fn square_preference(&self, piece: Piece, mover: Color, dest: Square, phase: GamePhase) -> f32 {
        let heatmap = self
            .store
            .style()
            .and_then(|style| style.square_heatmap.get(&piece_symbol(piece, mover)));
        if let Some(heatmap) = heatmap {
            let max = heatmap.values().copied().max().unwrap_or(0);
            if max > 0 {
                let count = heatmap.get(&dest.to_string()).copied().unwrap_or(0);
                return 0.3 + 0.7 * count as f32 / max as f32;
            }
        }
        static_square_preference(piece, mover, dest, phase)
    }

    fn tactical(&self, board: &Board, after: &Board, chess_move: ChessMove, thorough: bool) -> f32 {
        let mover = board.side_to_move();
        let dest = chess_move.get_dest();
        let profile = &self.store.tactical;
        let boost = |frequency: f64| (1.0 + (profile.tactical_weight - 1.0) * frequency) as f32;

        let mut found: Vec<Motif> = Vec::with_capacity(4);
        if let Some(captured) = motifs::captured_piece(board, chess_move) {
            found.push(Motif::Capture { captured });
        }
        if *after.checkers() != EMPTY {
            found.push(Motif::Check);
        }
        if chess_move.get_promotion().is_some() {
            found.push(Motif::Promotion);
        }
        if thorough {
            found.extend(motifs::detect_fork(after, dest, mover));
            found.extend(motifs::detect_pin(after, dest, mover));
            found.extend(motifs::detect_discovered_attack(board, after, chess_move, mover));
        }

        found
            .iter()
            .map(|motif| match motif {
                Motif::Capture { .. } => motif.base_score() * boost(profile.capture_frequency),
                Motif::Check => motif.base_score() * boost(profile.check_frequency),
                _ => motif.base_score(),
            })
            .fold(None, |best: Option<f32>, score| {
                Some(best.map_or(score, |b| b.max(score)))
            })
            .unwrap_or(NO_MOTIF_SCORE)
    }

    fn positional(
        &self,
        board: &Board,
        after: &Board,
        chess_move: ChessMove,
        phase: GamePhase,
        thorough: bool,
    ) -> f32 {
        let mover = board.side_to_move();
        let profile = &self.store.positional;

        let mut king_safety = positional::king_safety(after, mover, phase);
        if notation::is_castling(board, chess_move) {
            king_safety = (king_safety + profile.castling_bonus as f32).min(1.0);
        }
        let mut center_control = positional::center_control(after, mover);
        if positional::is_center(chess_move.get_dest()) {
            center_control = (center_control + profile.center_importance as f32).min(1.0);
        }
        let factors = PositionalFactors {
            pawn_structure: positional::pawn_structure(after, mover),
            mobility: if thorough {
                positional::mobility(after, mover)
            } else {
                NEUTRAL_SCORE
            },
            king_safety,
            center_control,
        };

        let mut score = factors.blend(phase);
        match phase {
            GamePhase::Opening if is_development(board, chess_move) => {
                score += profile.development_bonus as f32;
            }
            GamePhase::Endgame => {
                // Stored rates are from the side to move, which is now the opponent
                if let Some(rate) = self.store.endgame_rate(&material_signature(after)) {
                    score = 0.8 * score + 0.2 * (1.0 - rate as f32);
                }
            }
            _ => {}
        }
        score
    }
}

fn same_colour_max<F>(style: &StyleProfile, mover: Color, count: F) -> u64
where
    F: Fn(&PieceUsage) -> u64,
{
    style
        .piece_usage
        .iter()
        .filter(|(symbol, _)| match mover {
            Color::White => symbol.chars().all(|c| c.is_ascii_uppercase()),
            Color::Black => symbol.chars().all(|c| c.is_ascii_lowercase()),
        })
        .map(|(_, usage)| count(usage))
        .max()
        .unwrap_or(0)
}

/// Captures, checks, promotions, favourable trades and multi-piece pressure.
fn decisiveness(
    board: &Board,
    after: &Board,
    chess_move: ChessMove,
    piece: Piece,
    thorough: bool,
) -> f32 {
    let mut score = NEUTRAL_SCORE;
    if let Some(captured) = motifs::captured_piece(board, chess_move) {
        score += 0.2;
        if piece_value(captured) >= piece_value(piece) {
            score += 0.2;
        }
    }
    if *after.checkers() != EMPTY {
        score += 0.3;
    }
    if chess_move.get_promotion().is_some() {
        score += 0.4;
    }
    if thorough && attacked_enemy_pieces(after, board.side_to_move()).popcnt() >= 2 {
        score += 0.1;
    }
    score.min(1.0)
}

/// Central first moves, minor-piece development and castling.
pub fn opening_principles(board: &Board, chess_move: ChessMove) -> f32 {
    let uci = chess_move.to_string();
    let (central, developing) = match board.side_to_move() {
        Color::White => (
            &["e2e4", "d2d4", "c2c4", "g1f3"][..],
            &["b1c3", "g1f3", "c1f4", "c1g5", "f1c4", "f1b5"][..],
        ),
        Color::Black => (
            &["e7e5", "c7c5", "c7c6", "e7e6", "d7d5", "g7g6", "b7b6"][..],
            &["b8c6", "g8f6", "c8f5", "c8g4", "f8c5", "f8e7"][..],
        ),
    };

    if notation::is_castling(board, chess_move) {
        0.85
    } else if central.contains(&uci.as_str()) {
        0.8
    } else if developing.contains(&uci.as_str()) {
        0.7
    } else {
        NEUTRAL_SCORE
    }
}

/// Square preferences used when the store has no heatmap for the piece.
pub fn static_square_preference(piece: Piece, mover: Color, dest: Square, phase: GamePhase) -> f32 {
    let central = positional::is_center(dest);
    let ring = positional::is_extended_center(dest);
    let rank = dest.get_rank().to_index();
    let file = dest.get_file().to_index();

    match piece {
        Piece::Knight => {
            if central {
                0.95
            } else if ring {
                0.8
            } else {
                0.4
            }
        }
        Piece::Bishop => {
            if central {
                0.8
            } else if rank == file || rank + file == 7 {
                0.7
            } else {
                0.5
            }
        }
        Piece::Rook => {
            let seventh = match mover {
                Color::White => 6,
                Color::Black => 1,
            };
            if rank == seventh {
                0.9
            } else {
                0.6
            }
        }
        Piece::King if phase == GamePhase::Endgame => {
            if central {
                0.85
            } else if ring {
                0.7
            } else {
                0.5
            }
        }
        Piece::King => {
            let back_rank = match mover {
                Color::White => 0,
                Color::Black => 7,
            };
            if rank == back_rank && matches!(file, 0 | 1 | 2 | 6 | 7) {
                0.8
            } else {
                0.4
            }
        }
        Piece::Queen | Piece::Pawn => {
            if central {
                0.9
            } else if ring {
                0.75
            } else {
                0.5
            }
        }
    }
}

/// Drop quiet queen and rook moves onto squares the opponent attacks.
///
/// Returns the input unchanged when every move would be dropped.
pub fn filter_hanging_heavy_pieces(board: &Board, moves: &[ChessMove]) -> Vec<ChessMove> {
    let mover = board.side_to_move();
    let safe: Vec<ChessMove> = moves
        .iter()
        .copied()
        .filter(|&chess_move| {
            let heavy = matches!(
                board.piece_on(chess_move.get_source()),
                Some(Piece::Queen) | Some(Piece::Rook)
            );
            if !heavy || notation::is_capture(board, chess_move) {
                return true;
            }
            let after = board.make_move_new(chess_move);
            !is_square_attacked_by(&after, chess_move.get_dest(), !mover)
        })
        .collect();

    if safe.is_empty() {
        moves.to_vec()
    } else {
        safe
    }
}
