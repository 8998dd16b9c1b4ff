/// Pattern pipeline tests
///
/// Builds pattern stores from small synthetic PGN corpora and checks what the
/// move-selection side sees after compression and persistence.

use std::io::Cursor;
use std::path::PathBuf;
use std::str::FromStr;

use chess::ChessMove;
use style_engine::extraction::extract_from_reader;
use style_engine::pattern_store::{material_signature, opening_key, OPENING_TABLE_CAP};
use style_engine::{
    build_pattern_store, EngineConfig, ExtractionConfig, GameState, PatternStore, SearchBudget,
    StyleEngine,
};

fn game(movetext: &str, result: &str) -> String {
    format!(
        "[Event \"Synthetic\"]\n[White \"Alice\"]\n[Black \"Bob\"]\n[Result \"{result}\"]\n\n{movetext} {result}\n\n"
    )
}

fn repeat(movetext: &str, result: &str, times: usize) -> String {
    (0..times).map(|_| game(movetext, result)).collect()
}

/// Black's second move decides the result: Nc6 always wins, d6 draws, Nf6 loses.
fn ply_three_corpus() -> String {
    let mut pgn = String::new();
    pgn.push_str(&repeat("1. e4 e5 2. Nf3 Nc6 3. Bb5 a6", "0-1", 20));
    pgn.push_str(&repeat("1. e4 e5 2. Nf3 d6 3. d4 exd4", "1/2-1/2", 15));
    pgn.push_str(&repeat("1. e4 e5 2. Nf3 Nf6 3. Nxe5 d6", "1-0", 12));
    pgn
}

/// 22 plies of knight shuffling, so the final position still has full material.
fn long_game_movetext() -> String {
    (1..=11)
        .map(|n| {
            if n % 2 == 1 {
                format!("{n}. Nf3 Nf6")
            } else {
                format!("{n}. Ng1 Ng8")
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn compress(pgn: &str, config: &ExtractionConfig) -> PatternStore {
    extract_from_reader(Cursor::new(pgn.as_bytes()), config)
        .unwrap()
        .compress(config)
}

#[test]
fn test_winning_ply_three_move_ranks_first() {
    let store = compress(&ply_three_corpus(), &ExtractionConfig::default());

    let at_ply_three: Vec<&str> = store.openings_at_ply(3).map(|(san, _)| san).collect();
    assert_eq!(at_ply_three.first(), Some(&"Nc6"));
    // Losing line falls under the success threshold
    assert!(!at_ply_three.contains(&"Nf6"));

    let nc6 = store.opening_stat(3, "Nc6").unwrap();
    assert_eq!(nc6.success, 1.0);
    assert_eq!(nc6.weight, 0.2);
    let d6 = store.opening_stat(3, "d6").unwrap();
    assert!(nc6.weight > d6.weight);
}

#[test]
fn test_caps_are_respected() {
    let config = ExtractionConfig {
        opening_cap: 2,
        min_opening_count: 1,
        min_opening_success: 0.0,
        ..ExtractionConfig::default()
    };
    let store = compress(&ply_three_corpus(), &config);
    assert_eq!(store.opening.len(), 2);

    // Oversized documents are cut back on load
    let mut big = PatternStore::neutral();
    for i in 0..(OPENING_TABLE_CAP + 100) {
        big.opening.insert(
            opening_key(1, &format!("m{i}")),
            style_engine::pattern_store::OpeningStat {
                frequency: 0.1,
                success: 0.5,
                weight: i as f64,
            },
        );
    }
    for i in 0..80 {
        big.endgame.insert(format!("sig{i}"), i as f64 / 100.0);
    }
    let reloaded = PatternStore::from_json_str(&big.to_json_string().unwrap()).unwrap();
    assert_eq!(reloaded.opening.len(), OPENING_TABLE_CAP);
    assert_eq!(reloaded.endgame.len(), 50);
    // The heaviest entries survive
    assert!(reloaded
        .opening_stat(1, &format!("m{}", OPENING_TABLE_CAP + 99))
        .is_some());
    assert!(reloaded.opening_stat(1, "m0").is_none());
}

#[test]
fn test_endgame_signature_needs_endgame_material() {
    let pgn = repeat(&long_game_movetext(), "1-0", 5);

    // 22 plies but all 32 pieces still on the board: not an endgame
    let store = compress(&pgn, &ExtractionConfig::default());
    assert_eq!(store.metadata.games_analyzed, 5);
    assert!(store.endgame.is_empty());

    let signature = material_signature(&chess::Board::default());
    assert_eq!(signature, "1v1_5_2v2_4_2v2_3");
    let lenient = ExtractionConfig {
        endgame_max_pieces: 32,
        ..ExtractionConfig::default()
    };
    let store = compress(&pgn, &lenient);
    // White is to move after 22 plies and won every game
    assert_eq!(store.endgame_rate(&signature), Some(1.0));

    // Short games never reach the endgame table
    let short = compress(&ply_three_corpus(), &lenient);
    assert!(short.endgame.is_empty());
}

#[test]
fn test_game_limit_spans_files() {
    let dir = tempfile::tempdir().unwrap();
    let corpus_a = dir.path().join("a.pgn");
    let corpus_b = dir.path().join("b.pgn");
    std::fs::write(&corpus_a, repeat("1. e4 e5 2. Nf3 Nc6", "1-0", 5)).unwrap();
    std::fs::write(&corpus_b, repeat("1. d4 d5 2. c4 e6", "0-1", 5)).unwrap();

    for threads in [1, 2] {
        let config = ExtractionConfig::default()
            .with_max_games(3)
            .with_threads(threads);
        let (store, report) =
            build_pattern_store(&[corpus_a.clone(), corpus_b.clone()], &config, None).unwrap();
        assert_eq!(report.games_accepted, 3, "{threads} threads");
        assert_eq!(store.metadata.games_analyzed, 3);
    }

    let (_, report) = build_pattern_store(
        &[corpus_a, corpus_b],
        &ExtractionConfig::default().with_max_games(100),
        None,
    )
    .unwrap();
    assert_eq!(report.games_accepted, 10);
}

#[test]
fn test_round_trip_through_file() {
    let dir = tempfile::tempdir().unwrap();
    let corpus_a = dir.path().join("a.pgn");
    let corpus_b = dir.path().join("b.pgn");
    std::fs::write(&corpus_a, ply_three_corpus()).unwrap();
    std::fs::write(&corpus_b, repeat(&long_game_movetext(), "0-1", 6)).unwrap();

    let config = ExtractionConfig::default().with_threads(2);
    let (store, report) = build_pattern_store(&[corpus_a, corpus_b], &config, None).unwrap();
    assert_eq!(report.games_accepted, 53);
    assert_eq!(store.metadata.games_analyzed, 53);

    let path = dir.path().join("nested").join("patterns.json");
    store.save(&path).unwrap();
    let loaded = PatternStore::load(&path).unwrap();
    assert_eq!(loaded.opening, store.opening);
    assert_eq!(loaded.endgame, store.endgame);
    assert_eq!(loaded, store);

    // Saving again gives the same document
    assert_eq!(loaded.to_json_string().unwrap(), store.to_json_string().unwrap());
}

#[test]
fn test_bad_records_are_skipped_and_counted() {
    let mut pgn = ply_three_corpus();
    pgn.push_str(&game("1. e4 e5 2. Nf3 Nc6", "*"));
    pgn.push_str(&game("1. e4 e4 2. Nf3 Nc6", "1-0"));
    let config = ExtractionConfig::default();
    let accumulator = extract_from_reader(Cursor::new(pgn.as_bytes()), &config).unwrap();

    let report = accumulator.report();
    assert_eq!(report.games_accepted, 47);
    assert_eq!(report.games_unknown_result, 1);
    assert_eq!(report.games_malformed, 1);
    assert_eq!(report.games_skipped(), 2);

    let store = accumulator.compress(&config);
    assert_eq!(store.metadata.games_skipped, 2);
    assert_eq!(store.opening_stat(3, "Nc6").unwrap().weight, 0.2);
}

#[test]
fn test_missing_file_does_not_abort_run() {
    let dir = tempfile::tempdir().unwrap();
    let corpus = dir.path().join("games.pgn");
    std::fs::write(&corpus, ply_three_corpus()).unwrap();
    let missing: PathBuf = dir.path().join("missing.pgn");

    let (store, report) =
        build_pattern_store(&[missing, corpus], &ExtractionConfig::default(), None).unwrap();
    assert_eq!(report.files_failed, 1);
    assert_eq!(report.games_accepted, 47);
    assert!(store.opening_stat(3, "Nc6").is_some());
}

#[test]
fn test_safety_filter_removes_hanging_queen() {
    // Qd1-d5 drops the queen to the e6 pawn
    let state = GameState::from_fen("4k3/8/4p3/8/8/8/8/3QK3 w - - 0 30").unwrap();
    let hanging = ChessMove::from_str("d1d5").unwrap();

    let mut filtered =
        StyleEngine::with_store(EngineConfig::deterministic(3), PatternStore::neutral());
    let ranked = filtered.rank_moves(&state, &SearchBudget::unbounded());
    assert!(!ranked.is_empty());
    assert!(ranked.iter().all(|c| c.chess_move != hanging));

    let mut config = EngineConfig::deterministic(3);
    config.safety_filter = false;
    let mut unfiltered = StyleEngine::with_store(config, PatternStore::neutral());
    let ranked = unfiltered.rank_moves(&state, &SearchBudget::unbounded());
    assert!(ranked.iter().any(|c| c.chess_move == hanging));
}

#[test]
fn test_store_from_corpus_drives_opening_choice() {
    let store = compress(&ply_three_corpus(), &ExtractionConfig::default());
    let mut engine = StyleEngine::with_store(EngineConfig::deterministic(9), store);

    let mut state = GameState::startpos();
    for uci in ["e2e4", "e7e5", "g1f3"] {
        state.apply_uci(uci).unwrap();
    }
    let ranked = engine.rank_moves(&state, &SearchBudget::unbounded());
    let nc6 = ranked
        .iter()
        .find(|c| c.san == "Nc6")
        .expect("Nc6 is legal");
    let nf6 = ranked.iter().find(|c| c.san == "Nf6").expect("Nf6 is legal");
    assert!(nc6.scores.opening_match > nf6.scores.opening_match);
}
