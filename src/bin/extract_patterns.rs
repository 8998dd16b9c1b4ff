//! Pattern Extraction Binary
//!
//! Reads PGN game collections and writes the compressed pattern store the
//! engine loads at startup.

use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::time::Instant;
use style_engine::extraction::{extract_files, opening_counts_by_ply};
use style_engine::ExtractionConfig;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// PGN files to analyse
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Where to write the pattern store
    #[arg(short, long, default_value = "data/patterns.json")]
    output: PathBuf,

    /// Stop after this many accepted games across all input files
    #[arg(short, long)]
    max_games: Option<usize>,

    /// Only learn moves played by this player (matched against White/Black headers)
    #[arg(short, long)]
    player: Option<String>,

    /// Worker threads (default: number of CPUs, at most 16)
    #[arg(short, long)]
    threads: Option<usize>,

    /// Print per-ply opening counts before compression
    #[arg(long)]
    verbose: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut config = ExtractionConfig::default();
    if let Some(player) = &args.player {
        config = config.with_player(player.clone());
    }
    if let Some(max_games) = args.max_games {
        config = config.with_max_games(max_games);
    }
    if let Some(threads) = args.threads {
        config = config.with_threads(threads);
    }

    println!("♟️  Style Engine - Pattern Extraction");
    println!("=====================================");
    println!("Configuration:");
    println!("  • Input files: {}", args.inputs.len());
    println!("  • Output: {}", args.output.display());
    println!("  • Player filter: {}", args.player.as_deref().unwrap_or("(all)"));
    if let Some(max_games) = args.max_games {
        println!("  • Max games: {max_games}");
    }
    println!("  • Threads: {}", config.num_threads);
    println!();

    let pb = ProgressBar::new(args.inputs.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} files ({eta})",
            )?
            .progress_chars("#>-"),
    );

    let start = Instant::now();
    let accumulator = extract_files(&args.inputs, &config, Some(&pb))?;
    pb.finish_with_message("extraction complete");

    if args.verbose {
        let mut by_ply: Vec<(u32, u64)> = opening_counts_by_ply(&accumulator).into_iter().collect();
        by_ply.sort_unstable();
        println!("Opening moves observed per ply:");
        for (ply, count) in by_ply {
            println!("  ply {ply:>2}: {count}");
        }
    }

    let store = accumulator.compress(&config);
    store.save(&args.output)?;
    let report = accumulator.report();

    println!();
    println!("✅ Pattern store written to {}", args.output.display());
    println!("📊 Games accepted: {}", report.games_accepted);
    println!(
        "   Skipped: {} (unknown result {}, filtered {}, malformed {})",
        report.games_skipped(),
        report.games_unknown_result,
        report.games_filtered,
        report.games_malformed
    );
    if report.files_failed > 0 {
        println!("⚠️  Files that could not be read: {}", report.files_failed);
    }
    println!(
        "   Opening entries: {}, endgame signatures: {}",
        store.opening.len(),
        store.endgame.len()
    );
    println!(
        "   Captures {:.3} / checks {:.3} / developments {:.3} per move",
        store.tactical.capture_frequency,
        store.tactical.check_frequency,
        store.tactical.development_frequency
    );
    println!("⏱️  Done in {:.1}s", start.elapsed().as_secs_f64());

    Ok(())
}
