//! Offline pattern extraction: PGN corpus in, `PatternStore` out.
//!
//! Each input file is read by one rayon task into its own `PatternAccumulator`;
//! the accumulators are merged on the calling thread in file order, so the
//! result does not depend on scheduling.

use chess::{Board, ChessMove, Color, Piece, Square};
use indicatif::ProgressBar;
use pgn_reader::{BufferedReader, RawHeader, SanPlus, Skip, Visitor};
use rayon::prelude::*;
use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::errors::{ChessEngineError, Result};
use crate::notation;
use crate::pattern_store::{
    material_signature, opening_key, piece_symbol, round3, OpeningStat, OrderedTable,
    PatternStore, PositionalProfile, StoreMetadata, StyleProfile, TacticalProfile,
    ENDGAME_TABLE_CAP, FORMAT_VERSION, OPENING_TABLE_CAP,
};
use crate::phase::{self, has_castling_rights};

/// Terminal result of a corpus game, taken from its `Result` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameOutcome {
    WhiteWin,
    BlackWin,
    Draw,
    Unknown,
}

impl GameOutcome {
    pub fn from_header(value: &str) -> Self {
        match value.trim() {
            "1-0" => GameOutcome::WhiteWin,
            "0-1" => GameOutcome::BlackWin,
            "1/2-1/2" => GameOutcome::Draw,
            _ => GameOutcome::Unknown,
        }
    }

    /// 1.0 / 0.0 / 0.5 from `color`'s point of view.
    pub fn score_for(&self, color: Color) -> Option<f64> {
        match (self, color) {
            (GameOutcome::WhiteWin, Color::White) | (GameOutcome::BlackWin, Color::Black) => {
                Some(1.0)
            }
            (GameOutcome::WhiteWin, Color::Black) | (GameOutcome::BlackWin, Color::White) => {
                Some(0.0)
            }
            (GameOutcome::Draw, _) => Some(0.5),
            (GameOutcome::Unknown, _) => None,
        }
    }
}

/// Thresholds and caps for extraction and compression.
#[derive(Debug, Clone)]
pub struct ExtractionConfig {
    /// Plies (1-based) recorded in the opening table
    pub opening_ply_limit: u32,
    pub min_opening_count: u64,
    pub min_opening_success: f64,
    pub opening_cap: usize,
    pub min_endgame_count: u64,
    pub endgame_cap: usize,
    /// Games must be longer than this many plies to contribute an endgame signature
    pub endgame_min_plies: u32,
    /// ...and end with at most this many pieces on the board, kings included
    pub endgame_max_pieces: u32,
    pub sample_interval: u32,
    pub tactical_weight: f64,
    pub center_scale: f64,
    pub castling_bonus: f64,
    pub development_bonus: f64,
    /// Only use games (and moves) of this player when set
    pub player: Option<String>,
    /// Stop after this many accepted games across all inputs
    pub max_games: Option<usize>,
    pub num_threads: usize,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            opening_ply_limit: 15,
            min_opening_count: 10,
            min_opening_success: 0.45,
            opening_cap: OPENING_TABLE_CAP,
            min_endgame_count: 5,
            endgame_cap: ENDGAME_TABLE_CAP,
            endgame_min_plies: 20,
            endgame_max_pieces: 10,
            sample_interval: 5,
            tactical_weight: 1.5,
            center_scale: 0.1,
            castling_bonus: 0.3,
            development_bonus: 0.2,
            player: None,
            max_games: None,
            num_threads: num_cpus::get().min(16),
        }
    }
}

impl ExtractionConfig {
    pub fn with_player<S: Into<String>>(mut self, player: S) -> Self {
        self.player = Some(player.into());
        self
    }

    pub fn with_max_games(mut self, max_games: usize) -> Self {
        self.max_games = Some(max_games);
        self
    }

    pub fn with_threads(mut self, num_threads: usize) -> Self {
        self.num_threads = num_threads.max(1);
        self
    }
}

/// Counts reported after a pipeline run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractionReport {
    pub games_accepted: u64,
    pub games_unknown_result: u64,
    pub games_filtered: u64,
    pub games_malformed: u64,
    pub files_failed: u64,
    pub moves_observed: u64,
    pub positional_samples: u64,
    pub white_castling_samples: u64,
    pub black_castling_samples: u64,
}

impl ExtractionReport {
    pub fn games_skipped(&self) -> u64 {
        self.games_unknown_result + self.games_filtered + self.games_malformed
    }

    fn merge(&mut self, other: &ExtractionReport) {
        self.games_accepted += other.games_accepted;
        self.games_unknown_result += other.games_unknown_result;
        self.games_filtered += other.games_filtered;
        self.games_malformed += other.games_malformed;
        self.files_failed += other.files_failed;
        self.moves_observed += other.moves_observed;
        self.positional_samples += other.positional_samples;
        self.white_castling_samples += other.white_castling_samples;
        self.black_castling_samples += other.black_castling_samples;
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct OutcomeCount {
    count: u64,
    score: f64,
}

impl OutcomeCount {
    fn add(&mut self, score: f64) {
        self.count += 1;
        self.score += score;
    }

    fn merge(&mut self, other: &OutcomeCount) {
        self.count += other.count;
        self.score += other.score;
    }

    fn rate(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.score / self.count as f64
        }
    }
}

/// Raw counts gathered from the corpus before compression.
#[derive(Debug, Clone, Default)]
pub struct PatternAccumulator {
    opening: OrderedTable<OutcomeCount>,
    endgame: OrderedTable<OutcomeCount>,
    captures: u64,
    checks: u64,
    developments: u64,
    center_abs_sum: f64,
    style: StyleProfile,
    report: ExtractionReport,
}

impl PatternAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn report(&self) -> &ExtractionReport {
        &self.report
    }

    /// Fold `other` in; keys new to `self` are appended in `other`'s order.
    pub fn merge(&mut self, other: PatternAccumulator) {
        for (key, count) in other.opening.iter() {
            let mut merged = self.opening.get(key).copied().unwrap_or_default();
            merged.merge(count);
            self.opening.insert(key.to_string(), merged);
        }
        for (key, count) in other.endgame.iter() {
            let mut merged = self.endgame.get(key).copied().unwrap_or_default();
            merged.merge(count);
            self.endgame.insert(key.to_string(), merged);
        }
        self.captures += other.captures;
        self.checks += other.checks;
        self.developments += other.developments;
        self.center_abs_sum += other.center_abs_sum;
        self.style.merge(&other.style);
        self.report.merge(&other.report);
    }

    fn commit(&mut self, game: PendingGame, outcome: GameOutcome, config: &ExtractionConfig) {
        for (key, mover) in game.openings {
            if let Some(score) = outcome.score_for(mover) {
                let mut count = self.opening.get(&key).copied().unwrap_or_default();
                count.add(score);
                self.opening.insert(key, count);
            }
        }

        let pieces_left = game.final_board.combined().popcnt();
        if game.plies > config.endgame_min_plies && pieces_left <= config.endgame_max_pieces {
            if let Some(score) = outcome.score_for(game.final_board.side_to_move()) {
                let signature = material_signature(&game.final_board);
                let mut count = self.endgame.get(&signature).copied().unwrap_or_default();
                count.add(score);
                self.endgame.insert(signature, count);
            }
        }

        self.captures += game.captures;
        self.checks += game.checks;
        self.developments += game.developments;
        self.center_abs_sum += game.center_abs_sum;
        self.style.merge(&game.style);

        self.report.games_accepted += 1;
        self.report.moves_observed += game.moves_counted;
        self.report.positional_samples += game.samples;
        self.report.white_castling_samples += game.white_castling;
        self.report.black_castling_samples += game.black_castling;
    }

    /// Apply thresholds and caps and produce the immutable store.
    pub fn compress(&self, config: &ExtractionConfig) -> PatternStore {
        let mut opening = OrderedTable::new();
        for (key, count) in self.opening.iter() {
            let success = count.rate();
            if count.count < config.min_opening_count || success < config.min_opening_success {
                continue;
            }
            let frequency = (count.count as f64 / 1000.0).min(1.0);
            let weight = success * (count.count as f64 / 100.0);
            opening.insert(
                key.to_string(),
                OpeningStat {
                    frequency: round3(frequency),
                    success: round3(success),
                    weight: round3(weight),
                },
            );
        }
        opening.sort_desc_and_truncate(config.opening_cap, |stat| stat.weight);

        let mut endgame = OrderedTable::new();
        for (signature, count) in self.endgame.iter() {
            if count.count >= config.min_endgame_count {
                endgame.insert(signature.to_string(), round3(count.rate()));
            }
        }
        endgame.sort_desc_and_truncate(config.endgame_cap, |rate| *rate);

        let moves = self.report.moves_observed;
        let per_move = |counter: u64| {
            if moves == 0 {
                0.0
            } else {
                round3(counter as f64 / moves as f64)
            }
        };
        let tactical = TacticalProfile {
            capture_frequency: per_move(self.captures),
            check_frequency: per_move(self.checks),
            development_frequency: per_move(self.developments),
            tactical_weight: config.tactical_weight,
        };

        let samples = self.report.positional_samples;
        let mean_abs_center = if samples == 0 {
            0.0
        } else {
            self.center_abs_sum / samples as f64
        };
        let positional = PositionalProfile {
            center_importance: round3(mean_abs_center * config.center_scale),
            castling_bonus: config.castling_bonus,
            development_bonus: config.development_bonus,
        };

        PatternStore {
            metadata: StoreMetadata {
                version: FORMAT_VERSION.to_string(),
                games_analyzed: self.report.games_accepted,
                games_skipped: self.report.games_skipped(),
                positions_sampled: samples,
            },
            opening,
            tactical,
            positional,
            endgame,
            style: if self.style.is_empty() {
                None
            } else {
                Some(self.style.clone())
            },
        }
    }
}

/// Scratch counts for the game being read; committed only if the game is usable.
#[derive(Debug, Clone)]
struct PendingGame {
    openings: Vec<(String, Color)>,
    captures: u64,
    checks: u64,
    developments: u64,
    moves_counted: u64,
    center_abs_sum: f64,
    samples: u64,
    white_castling: u64,
    black_castling: u64,
    style: StyleProfile,
    plies: u32,
    final_board: Board,
}

impl PendingGame {
    fn new() -> Self {
        Self {
            openings: Vec::new(),
            captures: 0,
            checks: 0,
            developments: 0,
            moves_counted: 0,
            center_abs_sum: 0.0,
            samples: 0,
            white_castling: 0,
            black_castling: 0,
            style: StyleProfile::default(),
            plies: 0,
            final_board: Board::default(),
        }
    }
}

const CENTER: [Square; 4] = [Square::D4, Square::E4, Square::D5, Square::E5];

/// White minus Black occupancy of d4, e4, d5, e5.
pub fn center_differential(board: &Board) -> i32 {
    CENTER
        .iter()
        .map(|&square| match board.color_on(square) {
            Some(Color::White) => 1,
            Some(Color::Black) => -1,
            None => 0,
        })
        .sum()
}

/// Knight or bishop leaving its starting square.
pub fn is_development(board: &Board, chess_move: ChessMove) -> bool {
    let source = chess_move.get_source();
    match board.piece_on(source) {
        Some(Piece::Knight) => matches!(source, Square::B1 | Square::G1 | Square::B8 | Square::G8),
        Some(Piece::Bishop) => matches!(source, Square::C1 | Square::F1 | Square::C8 | Square::F8),
        _ => false,
    }
}

/// A move that advances toward the opponent's side of the board.
pub fn is_forward(chess_move: ChessMove, mover: Color) -> bool {
    let from = chess_move.get_source().get_rank().to_index();
    let to = chess_move.get_dest().get_rank().to_index();
    match mover {
        Color::White => to > from,
        Color::Black => to < from,
    }
}

/// pgn-reader visitor feeding one file's games into an accumulator.
pub struct PatternVisitor<'a> {
    config: &'a ExtractionConfig,
    accumulator: PatternAccumulator,
    board: Board,
    outcome: GameOutcome,
    white: String,
    black: String,
    game: PendingGame,
    malformed: Option<String>,
    games_seen: usize,
    /// Games still allowed across every visitor sharing it
    quota: Option<&'a AtomicUsize>,
    exhausted: bool,
}

impl<'a> PatternVisitor<'a> {
    pub fn new(config: &'a ExtractionConfig) -> Self {
        Self::with_quota(config, None)
    }

    pub fn with_quota(config: &'a ExtractionConfig, quota: Option<&'a AtomicUsize>) -> Self {
        Self {
            config,
            accumulator: PatternAccumulator::new(),
            board: Board::default(),
            outcome: GameOutcome::Unknown,
            white: String::new(),
            black: String::new(),
            game: PendingGame::new(),
            malformed: None,
            games_seen: 0,
            quota,
            exhausted: false,
        }
    }

    pub fn into_accumulator(self) -> PatternAccumulator {
        self.accumulator
    }

    /// True once the shared game limit has been reached.
    pub fn is_exhausted(&self) -> bool {
        self.exhausted || self.quota.map_or(false, |left| left.load(Ordering::Acquire) == 0)
    }

    fn claim_slot(&mut self) -> bool {
        let claimed = match self.quota {
            Some(left) => left
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
                .is_ok(),
            None => true,
        };
        self.exhausted |= !claimed;
        claimed
    }

    fn tracked_color(&self) -> Option<Option<Color>> {
        match &self.config.player {
            None => Some(None),
            Some(player) if &self.white == player => Some(Some(Color::White)),
            Some(player) if &self.black == player => Some(Some(Color::Black)),
            Some(_) => None,
        }
    }

    fn record_move(&mut self, chess_move: ChessMove, san: String) {
        let board = self.board;
        let mover = board.side_to_move();
        let ply = self.game.plies;
        let interval = self.config.sample_interval.max(1);

        if (ply + 1) % interval == 0 {
            self.game.center_abs_sum += f64::from(center_differential(&board).abs());
            self.game.samples += 1;
            self.game.white_castling += u64::from(has_castling_rights(&board, Color::White));
            self.game.black_castling += u64::from(has_castling_rights(&board, Color::Black));
        }

        let counts_for_style = match self.tracked_color() {
            Some(None) => true,
            Some(Some(color)) => color == mover,
            None => false,
        };

        if counts_for_style {
            if ply < self.config.opening_ply_limit {
                self.game.openings.push((opening_key(ply, &san), mover));
            }
            self.game.moves_counted += 1;
            self.game.captures += u64::from(notation::is_capture(&board, chess_move));
            self.game.checks += u64::from(san.ends_with('+') || san.ends_with('#'));
            self.game.developments += u64::from(is_development(&board, chess_move));

            if let Some(piece) = board.piece_on(chess_move.get_source()) {
                let symbol = piece_symbol(piece, mover);
                let phase = phase::classify(&board, ply / 2 + 1);
                let usage = self.game.style.piece_usage.entry(symbol.clone()).or_default();
                usage.total_moves += 1;
                match phase {
                    phase::GamePhase::Opening => usage.opening += 1,
                    phase::GamePhase::Middlegame => usage.middlegame += 1,
                    phase::GamePhase::Endgame => usage.endgame += 1,
                }
                if is_forward(chess_move, mover) {
                    usage.attack_moves += 1;
                } else {
                    usage.defense_moves += 1;
                }
                *self
                    .game
                    .style
                    .square_heatmap
                    .entry(symbol)
                    .or_default()
                    .entry(chess_move.get_dest().to_string())
                    .or_insert(0) += 1;
            }
        }

        self.board = board.make_move_new(chess_move);
        self.game.plies += 1;
    }
}

impl<'a> Visitor for PatternVisitor<'a> {
    type Result = ();

    fn begin_game(&mut self) {
        self.board = Board::default();
        self.outcome = GameOutcome::Unknown;
        self.white.clear();
        self.black.clear();
        self.game = PendingGame::new();
        self.malformed = None;
        self.games_seen += 1;
    }

    fn header(&mut self, key: &[u8], value: RawHeader<'_>) {
        match key {
            b"Result" => self.outcome = GameOutcome::from_header(&value.decode_utf8_lossy()),
            b"White" => self.white = value.decode_utf8_lossy().into_owned(),
            b"Black" => self.black = value.decode_utf8_lossy().into_owned(),
            b"FEN" => {
                self.malformed = Some("games from a custom setup position are not used".to_string())
            }
            _ => {}
        }
    }

    fn san(&mut self, san_plus: SanPlus) {
        if self.malformed.is_some() {
            return;
        }
        let token = san_plus.san.to_string();
        match notation::parse_san(&self.board, &token) {
            Some(chess_move) => {
                let san = notation::to_san(&self.board, chess_move);
                self.record_move(chess_move, san);
            }
            None => {
                self.malformed = Some(format!(
                    "illegal move '{token}' at ply {}",
                    self.game.plies + 1
                ));
            }
        }
    }

    fn begin_variation(&mut self) -> Skip {
        Skip(true)
    }

    fn end_game(&mut self) -> Self::Result {
        let mut game = std::mem::replace(&mut self.game, PendingGame::new());
        if self.outcome == GameOutcome::Unknown {
            self.accumulator.report.games_unknown_result += 1;
            return;
        }
        if let Some(reason) = self.malformed.take() {
            let error = ChessEngineError::CorpusRecord {
                game: self.games_seen,
                reason,
            };
            log::warn!("Skipping game: {error}");
            self.accumulator.report.games_malformed += 1;
            return;
        }
        if self.tracked_color().is_none() {
            self.accumulator.report.games_filtered += 1;
            return;
        }
        if !self.claim_slot() {
            return;
        }
        game.final_board = self.board;
        self.accumulator.commit(game, self.outcome, self.config);
    }
}

/// Read every game from `reader` into a fresh accumulator, up to `max_games`.
pub fn extract_from_reader<R: Read>(reader: R, config: &ExtractionConfig) -> Result<PatternAccumulator> {
    let quota = config.max_games.map(AtomicUsize::new);
    read_games(reader, config, quota.as_ref())
}

fn read_games<R: Read>(
    reader: R,
    config: &ExtractionConfig,
    quota: Option<&AtomicUsize>,
) -> Result<PatternAccumulator> {
    let mut pgn = BufferedReader::new(reader);
    let mut visitor = PatternVisitor::with_quota(config, quota);
    while !visitor.is_exhausted() && pgn.read_game(&mut visitor)?.is_some() {}
    Ok(visitor.into_accumulator())
}

pub fn extract_file<P: AsRef<Path>>(path: P, config: &ExtractionConfig) -> Result<PatternAccumulator> {
    let quota = config.max_games.map(AtomicUsize::new);
    read_file(path.as_ref(), config, quota.as_ref())
}

fn read_file(path: &Path, config: &ExtractionConfig, quota: Option<&AtomicUsize>) -> Result<PatternAccumulator> {
    let file = File::open(path)?;
    let accumulator = read_games(file, config, quota)?;
    log::info!(
        "{}: {} games accepted, {} skipped",
        path.display(),
        accumulator.report.games_accepted,
        accumulator.report.games_skipped()
    );
    Ok(accumulator)
}

/// Extract from all files in parallel and merge in input order.
///
/// `max_games` is shared by all files: each accepted game takes one slot, so
/// the total never exceeds it, though which file's games fill the slots
/// depends on scheduling when more than one thread runs. A file that cannot be
/// read is logged and counted; it never aborts the run.
pub fn extract_files(
    paths: &[PathBuf],
    config: &ExtractionConfig,
    progress: Option<&ProgressBar>,
) -> Result<PatternAccumulator> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.num_threads.max(1))
        .build()
        .map_err(|e| ChessEngineError::ConfigurationError(format!("thread pool: {e}")))?;

    let quota = config.max_games.map(AtomicUsize::new);
    let per_file: Vec<PatternAccumulator> = pool.install(|| {
        paths
            .par_iter()
            .map(|path| {
                let result = read_file(path, config, quota.as_ref());
                if let Some(pb) = progress {
                    pb.inc(1);
                }
                match result {
                    Ok(accumulator) => accumulator,
                    Err(e) => {
                        log::error!("Failed to read {}: {}", path.display(), e);
                        let mut failed = PatternAccumulator::new();
                        failed.report.files_failed = 1;
                        failed
                    }
                }
            })
            .collect()
    });

    let mut merged = PatternAccumulator::new();
    for accumulator in per_file {
        merged.merge(accumulator);
    }
    Ok(merged)
}

/// Full pipeline: extract, merge, compress.
pub fn build_pattern_store(
    paths: &[PathBuf],
    config: &ExtractionConfig,
    progress: Option<&ProgressBar>,
) -> Result<(PatternStore, ExtractionReport)> {
    let accumulator = extract_files(paths, config, progress)?;
    let store = accumulator.compress(config);
    Ok((store, accumulator.report.clone()))
}

/// Group counts of how often each SAN was seen per ply, for diagnostics.
pub fn opening_counts_by_ply(accumulator: &PatternAccumulator) -> HashMap<u32, u64> {
    let mut by_ply = HashMap::new();
    for (key, count) in accumulator.opening.iter() {
        if let Some((ply, _)) = crate::pattern_store::parse_opening_key(key) {
            *by_ply.entry(ply).or_insert(0) += count.count;
        }
    }
    by_ply
}
