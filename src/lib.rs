//! # Style Engine
//!
//! A chess engine that imitates how people play instead of searching for the
//! best move. Statistics mined offline from PGN game collections (opening
//! frequencies and results, tactical and positional tendencies, endgame
//! outcomes by material) are compressed into a small versioned pattern store.
//! At runtime every legal move is scored one ply ahead against that store and
//! against a handful of static heuristics, and one of the best few is sampled.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use style_engine::{EngineConfig, GameState, SearchBudget, StyleEngine};
//!
//! let mut engine = StyleEngine::new(EngineConfig::default());
//! let mut state = GameState::startpos();
//! state.apply_uci("e2e4").unwrap();
//!
//! let selection = engine.choose_move(&state, &SearchBudget::unbounded());
//! println!("bestmove {}", selection.to_uci());
//! ```
//!
//! ## Layout
//!
//! - [`extraction`] turns PGN files into a [`PatternStore`] (offline, parallel per file)
//! - [`pattern_store`] is the persisted, read-only statistics document
//! - [`phase`], [`move_scorer`], [`selector`] make up the move-selection pipeline
//! - [`uci`] and [`time_control`] speak the host protocol

// Core modules
pub mod config;
pub mod errors;

// Rules-engine adapters
pub mod attacks;
pub mod notation;
pub mod position;

pub mod extraction;
pub mod motifs;
pub mod move_scorer;
pub mod opening_book;
pub mod pattern_store;
pub mod phase;
pub mod positional;
pub mod selector;
pub mod time_control;
pub mod uci;

pub use config::{EngineConfig, TimeConfig};
pub use errors::{ChessEngineError, Result};
pub use extraction::{build_pattern_store, ExtractionConfig, ExtractionReport, PatternAccumulator};
pub use move_scorer::{filter_hanging_heavy_pieces, Candidate, ComponentScores, MoveScorer, PhaseWeights};
pub use opening_book::{OpeningBook, OpeningEntry};
pub use pattern_store::{PatternStore, FORMAT_VERSION};
pub use phase::GamePhase;
pub use position::GameState;
pub use selector::Selection;
pub use time_control::{GoParams, ProtocolState, SearchBudget, ThinkBudget, TimeController};
pub use uci::{run_uci_engine, run_uci_engine_with_config, UCIEngine};

use chess::ChessMove;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::Arc;

/// Move-selection engine: pattern store, opening catalogue and random source.
///
/// The store is loaded lazily (at the first `isready` or the first move) and
/// is never mutated afterwards; it is shared behind an `Arc` so a reload only
/// swaps the pointer.
pub struct StyleEngine {
    config: EngineConfig,
    store: Option<Arc<PatternStore>>,
    opening_book: OpeningBook,
    /// Most specific opening seen in the current game
    detected_opening: Option<String>,
    rng: StdRng,
    #[cfg(test)]
    fail_scoring: bool,
}

impl StyleEngine {
    pub fn new(config: EngineConfig) -> Self {
        let rng = seeded_rng(config.seed);
        Self {
            config,
            store: None,
            opening_book: OpeningBook::with_standard_openings(),
            detected_opening: None,
            rng,
            #[cfg(test)]
            fail_scoring: false,
        }
    }

    /// Engine over an already-built store; nothing is read from disk.
    pub fn with_store(config: EngineConfig, store: PatternStore) -> Self {
        let mut engine = Self::new(config);
        engine.store = Some(Arc::new(store));
        engine
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn is_store_loaded(&self) -> bool {
        self.store.is_some()
    }

    /// Load the configured store on first use. A missing or unreadable file
    /// leaves the engine on neutral defaults.
    pub fn ensure_store_loaded(&mut self) -> Arc<PatternStore> {
        if let Some(store) = &self.store {
            return store.clone();
        }
        let store = Arc::new(PatternStore::load_or_neutral(&self.config.pattern_store_path));
        self.store = Some(store.clone());
        store
    }

    /// Point at a different store file; it is read at the next `ensure_store_loaded`.
    pub fn set_pattern_store_path<P: Into<PathBuf>>(&mut self, path: P) {
        self.config.pattern_store_path = path.into();
        self.store = None;
    }

    pub fn set_jitter(&mut self, jitter: f32) {
        self.config.jitter = jitter.clamp(0.0, 0.2);
    }

    pub fn set_safety_filter(&mut self, enabled: bool) {
        self.config.safety_filter = enabled;
    }

    /// Reseed the random source; `None` draws from OS entropy.
    pub fn set_seed(&mut self, seed: Option<u64>) {
        self.config.seed = seed;
        self.rng = seeded_rng(seed);
    }

    /// Forget per-game state.
    pub fn new_game(&mut self) {
        self.detected_opening = None;
    }

    pub fn detected_opening(&self) -> Option<&str> {
        self.detected_opening.as_deref()
    }

    fn update_detected_opening(&mut self, state: &GameState) {
        let detected = match self.opening_book.detect(state) {
            Some(entry) => entry,
            None => return,
        };
        let more_specific = match self
            .detected_opening
            .as_deref()
            .and_then(|name| self.opening_book.get(name))
        {
            Some(current) => detected.line.len() >= current.line.len(),
            None => true,
        };
        if more_specific && self.detected_opening.as_deref() != Some(detected.name.as_str()) {
            log::debug!("Opening detected: {}", detected.name);
            self.detected_opening = Some(detected.name.clone());
        }
    }

    /// Score every candidate move of `state`, best first.
    pub fn rank_moves(&mut self, state: &GameState, budget: &SearchBudget) -> Vec<Candidate> {
        let store = self.ensure_store_loaded();
        self.update_detected_opening(state);
        #[cfg(test)]
        if self.fail_scoring {
            panic!("scoring failure injected");
        }

        let phase = phase::classify_state(state);
        let legal = state.legal_moves();
        let moves = if self.config.safety_filter {
            filter_hanging_heavy_pieces(state.board(), &legal)
        } else {
            legal
        };

        let opening = self
            .detected_opening
            .as_deref()
            .and_then(|name| self.opening_book.get(name));
        let scorer = MoveScorer::new(&store, self.config.jitter);
        scorer.score(state, &moves, phase, opening, budget, &mut self.rng)
    }

    /// Pick a move for `state`.
    ///
    /// Positions without a legal move return [`Selection::NoLegalMove`] and a
    /// single legal move is returned without scoring. A panic inside scoring is
    /// contained here and answered with a random legal move.
    pub fn choose_move(&mut self, state: &GameState, budget: &SearchBudget) -> Selection {
        let legal = state.legal_moves();
        match legal.len() {
            0 => return Selection::NoLegalMove,
            1 => return Selection::Forced(legal[0]),
            _ => {}
        }

        let ranked = panic::catch_unwind(AssertUnwindSafe(|| self.rank_moves(state, budget)));
        let candidates = match ranked {
            Ok(candidates) => candidates,
            Err(payload) => {
                let error = ChessEngineError::ScoringFailed(panic_message(payload));
                log::error!("{error}; playing a random legal move");
                return Selection::Fallback(self.random_move(&legal));
            }
        };

        match selector::select(&candidates, self.config.top_k, &mut self.rng) {
            Some(candidate) => Selection::Chosen(candidate.clone()),
            None => {
                log::debug!("Nothing ranked before stop, playing the first legal move");
                Selection::Fallback(legal[0])
            }
        }
    }

    fn random_move(&mut self, legal: &[ChessMove]) -> ChessMove {
        // Callers only pass non-empty slices
        *legal.choose(&mut self.rng).unwrap_or(&legal[0])
    }
}

fn seeded_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "scorer panicked".to_string()
    }
}
