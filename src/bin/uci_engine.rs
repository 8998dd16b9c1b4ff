use clap::Parser;
use std::path::PathBuf;
use style_engine::{run_uci_engine_with_config, EngineConfig};

/// UCI chess engine binary
///
/// Plays moves that resemble the games its pattern store was built from.
/// Add the binary to any UCI GUI (Arena, Cute Chess, BanksiaGUI, ...) as a new
/// engine. Diagnostics go to stderr; set `RUST_LOG=debug` for detail.
///
/// UCI Options:
/// - Jitter: score noise in percent (0-20, default 5)
/// - SafetyFilter: skip quiet queen/rook moves onto attacked squares (default true)
/// - PatternFile: pattern store to load at the next `isready`
/// - Seed: random seed, 0 for entropy
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// JSON engine configuration; command-line flags override it
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Pattern store produced by extract_patterns
    #[arg(short, long)]
    patterns: Option<PathBuf>,

    /// Seed for jitter and move sampling
    #[arg(long)]
    seed: Option<u64>,

    /// Start in UCI debug mode
    #[arg(long)]
    debug: bool,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => match EngineConfig::from_json_file(path) {
            Ok(config) => config,
            Err(e) if e.is_recoverable() => {
                log::warn!("Config {} unusable ({e}), using defaults", path.display());
                EngineConfig::default()
            }
            Err(e) => {
                eprintln!("Invalid configuration {}: {e}", path.display());
                std::process::exit(1);
            }
        },
        None => EngineConfig::default(),
    };

    if let Some(patterns) = args.patterns {
        config = config.with_pattern_store(patterns);
    }
    if args.seed.is_some() {
        config = config.with_seed(args.seed);
    }
    config.enable_debug |= args.debug;

    log::info!(
        "Starting {} with pattern store {}",
        config.engine_name,
        config.pattern_store_path.display()
    );
    run_uci_engine_with_config(config);
}
