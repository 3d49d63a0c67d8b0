use carobook::book::{BookStore, OpenMode};
use carobook::generator::{
    BeamSchedule, BeamStage, CancelToken, GenerationResult, Generator, GeneratorConfig,
};
use carobook::logger::init_logging;
use carobook::search::AlphaBeta;
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(
    name = "carobook",
    version,
    about = "Offline opening-book generator for 32x32 Caro (five-in-a-row)"
)]
struct Cli {
    /// Book file path
    #[arg(long, default_value = "data/opening_book.cbk")]
    output: PathBuf,

    /// Open the book read-only, print statistics, and exit
    #[arg(long)]
    verify_only: bool,

    /// Verbose logging (same as RUST_LOG=debug)
    #[arg(long)]
    debug: bool,

    /// Expand positions up to and including this ply
    #[arg(long, default_value_t = 8)]
    max_ply: u32,

    /// Search depth budget per position
    #[arg(long, default_value_t = 4)]
    search_depth: u32,

    /// Beam schedule: "flat:K" or taper stages "K:PLY,K:PLY,..."
    /// (keep K moves up to ply PLY; one move beyond the last stage)
    #[arg(long, default_value = "4:14,3:24,2:32")]
    beam: String,

    /// Worker threads; 0 means one per logical CPU
    #[arg(long, default_value_t = 0)]
    workers: usize,
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err)
            if matches!(
                err.kind(),
                clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion
            ) =>
        {
            let _ = err.print();
            return ExitCode::SUCCESS;
        }
        Err(err) => {
            // unknown or malformed flags: usage hint, exit 1
            let _ = err.print();
            return ExitCode::FAILURE;
        }
    };

    init_logging(if cli.debug { "debug" } else { "warn" });

    if cli.verify_only {
        return verify(&cli);
    }
    generate(&cli)
}

fn verify(cli: &Cli) -> ExitCode {
    let store = match BookStore::open(&cli.output, OpenMode::ReadOnly) {
        Ok(store) => store,
        Err(err) => {
            eprintln!("error: cannot open {}: {err}", cli.output.display());
            return ExitCode::FAILURE;
        }
    };
    print_store_report(&store);
    ExitCode::SUCCESS
}

fn generate(cli: &Cli) -> ExitCode {
    let beam = match parse_beam(&cli.beam) {
        Ok(beam) => beam,
        Err(err) => {
            eprintln!("error: invalid --beam value: {err}");
            return ExitCode::FAILURE;
        }
    };

    if let Some(dir) = cli.output.parent() {
        if !dir.as_os_str().is_empty() {
            if let Err(err) = std::fs::create_dir_all(dir) {
                eprintln!("error: cannot create {}: {err}", dir.display());
                return ExitCode::FAILURE;
            }
        }
    }

    let store = match BookStore::open(&cli.output, OpenMode::ReadWrite) {
        Ok(store) => store,
        Err(err) => {
            eprintln!("error: cannot open {}: {err}", cli.output.display());
            return ExitCode::FAILURE;
        }
    };

    let config = GeneratorConfig {
        max_ply: cli.max_ply,
        search_depth: cli.search_depth,
        beam,
        workers: cli.workers,
        ..GeneratorConfig::default()
    };

    let engine = AlphaBeta::default();
    let generator = Generator::new(config, &store, &engine);
    let cancel = CancelToken::new();

    // progress bar polling thread; the generator itself never touches
    // the terminal
    let progress = generator.progress();
    let done = Arc::new(AtomicBool::new(false));
    let bar_done = Arc::clone(&done);
    let bar_thread = std::thread::spawn(move || {
        let bar = ProgressBar::new(100);
        bar.set_style(
            ProgressStyle::with_template("{bar:40} {pos:>3}% ply {msg} ({elapsed})")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        while !bar_done.load(Ordering::Relaxed) {
            let snap = progress.snapshot();
            bar.set_position(snap.percent_complete as u64);
            bar.set_message(format!(
                "{} [{}/{}] {:.0} pos/min",
                snap.current_ply, snap.ply_completed, snap.ply_total, snap.positions_per_minute
            ));
            std::thread::sleep(Duration::from_millis(200));
        }
        bar.finish_and_clear();
    });

    let outcome = generator.run(&cancel);
    done.store(true, Ordering::Relaxed);
    let _ = bar_thread.join();

    match outcome {
        Ok(result) => {
            print_run_report(&result);
            print_store_report(&store);
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("error: generation failed: {err}");
            ExitCode::FAILURE
        }
    }
}

fn parse_beam(spec: &str) -> Result<BeamSchedule, String> {
    let spec = spec.trim();
    if let Some(k) = spec.strip_prefix("flat:") {
        let keep: usize = k.parse().map_err(|_| format!("bad flat width {k:?}"))?;
        if keep == 0 {
            return Err("flat width must be at least 1".into());
        }
        return Ok(BeamSchedule::Flat(keep));
    }

    let mut stages = Vec::new();
    for part in spec.split(',') {
        let (keep, ply) = part
            .split_once(':')
            .ok_or_else(|| format!("expected K:PLY, got {part:?}"))?;
        let keep: usize = keep
            .parse()
            .map_err(|_| format!("bad keep count {keep:?}"))?;
        let max_ply: u32 = ply.parse().map_err(|_| format!("bad ply bound {ply:?}"))?;
        if keep == 0 {
            return Err("keep count must be at least 1".into());
        }
        stages.push(BeamStage { max_ply, keep });
    }
    if stages.is_empty() {
        return Err("empty schedule".into());
    }
    if !stages.windows(2).all(|w| w[0].max_ply < w[1].max_ply) {
        return Err("stage ply bounds must be strictly increasing".into());
    }
    Ok(BeamSchedule::Tapered(stages))
}

fn print_run_report(result: &GenerationResult) {
    if result.cancelled {
        println!("Generation cancelled; partial totals:");
    } else {
        println!("Generation complete:");
    }
    println!("  positions generated : {}", result.positions_generated);
    println!("  positions verified  : {}", result.positions_verified);
    println!("  positions resumed   : {}", result.positions_skipped);
    println!("  moves stored        : {}", result.moves_stored);
    println!("  elapsed             : {:.1?}", result.elapsed);
    let minutes = result.elapsed.as_secs_f64() / 60.0;
    if minutes > 0.0 {
        println!(
            "  throughput          : {:.0} positions/min",
            result.positions_generated as f64 / minutes
        );
    }
}

fn print_store_report(store: &BookStore) {
    let stats = store.statistics();
    println!("Book {}:", store.path().display());
    println!("  entries    : {}", stats.total_entries);
    println!("  moves      : {}", stats.total_moves);
    println!("  max depth  : {}", stats.max_depth);
    if let Some(version) = store.get_metadata("Version") {
        println!("  version    : {version}");
    }
    if let Some(at) = store.get_metadata("GeneratedAt") {
        println!("  generated  : {at}");
    }
    let breakdown: Vec<String> = stats
        .per_ply
        .iter()
        .enumerate()
        .filter(|&(_, &n)| n > 0)
        .map(|(ply, n)| format!("{ply}:{n}"))
        .collect();
    if !breakdown.is_empty() {
        println!("  per ply    : {}", breakdown.join(" "));
    }
}
