use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rand::rngs::StdRng;
use rand::SeedableRng;
use style_engine::phase;
use style_engine::{
    EngineConfig, GameState, MoveScorer, OpeningBook, PatternStore, SearchBudget, StyleEngine,
};

fn bundled_store() -> PatternStore {
    PatternStore::load_or_neutral(concat!(env!("CARGO_MANIFEST_DIR"), "/data/patterns.json"))
}

fn benchmark_move_scoring(c: &mut Criterion) {
    let positions = vec![
        GameState::startpos(),
        // Italian game after 4 moves
        GameState::from_fen("r1bqk2r/pppp1ppp/2n2n2/2b1p3/2B1P3/3P1N2/PPP2PPP/RNBQK2R w KQkq - 1 5")
            .expect("Valid FEN"),
        // Open middlegame
        GameState::from_fen("r2q1rk1/pp2bppp/2n1pn2/3p4/3P4/2NBPN2/PP3PPP/R2Q1RK1 w - - 0 11")
            .expect("Valid FEN"),
        // Rook endgame
        GameState::from_fen("8/5pk1/6p1/8/3R4/6P1/r4PK1/8 w - - 0 45").expect("Valid FEN"),
    ];
    let store = bundled_store();
    let book = OpeningBook::with_standard_openings();

    c.bench_function("score_all_legal_moves", |b| {
        let scorer = MoveScorer::new(&store, 0.0);
        let mut rng = StdRng::seed_from_u64(7);
        let budget = SearchBudget::unbounded();
        b.iter(|| {
            for state in &positions {
                let phase = phase::classify_state(state);
                let moves = state.legal_moves();
                let opening = book.detect(state);
                black_box(scorer.score(state, &moves, phase, opening, &budget, &mut rng));
            }
        })
    });

    c.bench_function("choose_move", |b| {
        let mut engine = StyleEngine::with_store(EngineConfig::deterministic(7), store.clone());
        let budget = SearchBudget::unbounded();
        b.iter(|| {
            for state in &positions {
                black_box(engine.choose_move(black_box(state), &budget));
            }
        })
    });

    c.bench_function("pattern_store_parse", |b| {
        let text = store.to_json_string().expect("store serializes");
        b.iter(|| black_box(PatternStore::from_json_str(black_box(&text))))
    });
}

criterion_group!(benches, benchmark_move_scoring);
criterion_main!(benches);
