//! # Guitar Trainer - terminal front end
//!
//! Drives the headless `trainer-core` from the command line.
//!
//! ## Architecture
//! - **Main Thread**: argument parsing, the tuner poll loop and the session
//!   event loop
//! - **Capture / Session Threads**: owned by `trainer-core`
//! - **Stdin Thread**: turns Enter into a stop request

mod console;
mod ui;

use anyhow::{Context, Result, anyhow, bail};
use clap::{Parser, Subcommand};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use trainer_core::audio::CpalSource;
use trainer_core::capture::TunerCapture;
use trainer_core::pitch::YinEstimator;
use trainer_core::scores::{JsonScoreStore, ScoreStore};
use trainer_core::{
    GuitarNoteTable, ReadingChannel, SessionConfig, SessionEvent, SessionWorker, Settings,
    TrialEngine, TrialOutcome, TrialResult, TunerSmoother,
};

use console::ConsolePlayback;

#[derive(Parser, Debug)]
#[command(name = "guitar-trainer")]
#[command(author, version, about = "Guitar tuner and fretboard note trainer")]
struct Args {
    /// Config file path (default: ~/.config/guitar-trainer/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Input device name, or part of it
    #[arg(short, long, global = true)]
    device: Option<String>,

    /// Reference frequency of A4 in Hz
    #[arg(long, global = true)]
    a4: Option<f32>,

    /// Score history file
    #[arg(long, global = true)]
    scores_file: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Live tuner. Press Enter to stop.
    Tuner,

    /// Name-that-note game on the fretboard. Press Enter to stop early.
    Train {
        /// Number of trials
        #[arg(short = 'n', long)]
        trials: Option<u32>,

        /// Seconds to play each note
        #[arg(short, long)]
        time: Option<u32>,

        /// Seed for a repeatable sequence of targets
        #[arg(long)]
        seed: Option<u64>,
    },

    /// High scores, per game configuration
    Scores {
        /// Only games with this many trials
        #[arg(short = 'n', long)]
        trials: Option<u32>,

        /// Only games with this many seconds per guess
        #[arg(short, long)]
        time: Option<u32>,
    },

    /// Targets missed most often
    Missed {
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let settings = load_settings(&args)?;
    debug!("Settings: {:?}", settings);

    match args.command {
        Command::Tuner => run_tuner(&settings),
        Command::Train { trials, time, seed } => {
            let config = SessionConfig {
                time_per_guess_s: time.unwrap_or(settings.trainer.time_per_guess_s),
                total_trials: trials.unwrap_or(settings.trainer.total_trials),
            };
            run_trainer(&settings, config, seed)
        }
        Command::Scores { trials, time } => show_high_scores(&settings, trials, time),
        Command::Missed { limit } => show_missed(&settings, limit),
    }
}

fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("trainer_core={level},guitar_trainer={level}")));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

/// File settings (explicit path, or the default location if present) with
/// command-line overrides applied on top.
fn load_settings(args: &Args) -> Result<Settings> {
    let mut settings = match &args.config {
        Some(path) => Settings::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => Settings::load_or_default(),
    };
    if let Some(device) = &args.device {
        settings.audio.device = Some(device.clone());
    }
    if let Some(a4) = args.a4 {
        if !(a4.is_finite() && a4 > 0.0) {
            bail!("A4 reference must be a positive frequency, got {a4}");
        }
        settings.tuner.a4_frequency = a4;
    }
    if let Some(path) = &args.scores_file {
        settings.scores.path = Some(path.clone());
    }
    Ok(settings)
}

fn run_tuner(settings: &Settings) -> Result<()> {
    let channel = Arc::new(ReadingChannel::new());
    let mut capture = TunerCapture::start(
        CpalSource::new(),
        YinEstimator::new(&settings.pitch),
        channel.clone(),
        settings,
    )
    .context("Failed to start audio capture")?;
    let mut smoother = TunerSmoother::new(&settings.tuner);
    let stop_rx = console::enter_pressed()?;

    println!(
        "Tuner running (A4 = {} Hz). Press Enter to stop.",
        settings.tuner.a4_frequency
    );
    let mut stdout = io::stdout();
    loop {
        if stop_rx.try_recv().is_ok() {
            break;
        }
        if capture.is_finished() {
            bail!("Audio capture stopped unexpectedly");
        }
        if let Some(readout) = smoother.tick(&channel) {
            write!(stdout, "\r{}", ui::cent_meter::render(readout))?;
            stdout.flush()?;
        }
        thread::sleep(settings.tuner.tick_interval());
    }

    capture.stop();
    println!();
    info!("Tuner stopped");
    Ok(())
}

fn run_trainer(settings: &Settings, config: SessionConfig, seed: Option<u64>) -> Result<()> {
    if config.total_trials == 0 || config.time_per_guess_s == 0 {
        bail!("Trials and seconds per guess must both be at least 1");
    }

    let store = JsonScoreStore::open(settings.scores.resolved_path())
        .context("Failed to open score history")?;
    let engine = TrialEngine::new(
        CpalSource::new(),
        YinEstimator::new(&settings.pitch),
        ConsolePlayback,
        GuitarNoteTable::standard(),
        settings,
    );
    let mut worker = SessionWorker::new(engine, store, config);
    if let Some(seed) = seed {
        worker = worker.with_seed(seed);
    }
    let handle = worker.spawn()?;
    let stop_rx = console::enter_pressed()?;

    println!(
        "{} trials, {} s per guess. Press Enter to stop.",
        config.total_trials, config.time_per_guess_s
    );
    let mut failure = None;
    loop {
        if stop_rx.try_recv().is_ok() && !handle.is_cancelled() {
            println!("Stopping...");
            handle.cancel();
        }

        // Checked before waiting so nothing sent before exit is missed.
        let finished = handle.is_finished();
        let Some(event) = handle.recv_timeout(settings.trainer.poll_interval()) else {
            if finished {
                break;
            }
            continue;
        };
        match event {
            SessionEvent::TrialStart {
                spec,
                trial_index,
                total_trials,
            } => println!("\nTrial {trial_index}/{total_trials}: {spec}"),
            SessionEvent::TrialResult { result, .. } => println!("{}", describe(&result)),
            SessionEvent::GameComplete {
                num_correct,
                trials_attempted,
                best_score_message,
                cancelled,
            } => {
                let suffix = if cancelled { " (stopped early)" } else { "" };
                println!("\nScore: {num_correct}/{trials_attempted}{suffix}");
                println!("{best_score_message}");
                break;
            }
            SessionEvent::GameError { message } => {
                failure = Some(message);
                break;
            }
        }
    }

    let session = handle.join()?;
    debug!(
        "Game {} ended with {} recorded trials",
        session.game_id,
        session.trials.len()
    );
    match failure {
        Some(message) => Err(anyhow!(message).context("Training session failed")),
        None => Ok(()),
    }
}

fn describe(result: &TrialResult) -> String {
    match (result.outcome, result.played_note.as_deref()) {
        (TrialOutcome::Correct, _) => "Correct!".to_string(),
        (TrialOutcome::Incorrect, Some(played)) => {
            format!("Incorrect. You played {played}, wanted {}.", result.spec.note)
        }
        (TrialOutcome::Incorrect, None) => format!("Incorrect. Wanted {}.", result.spec.note),
        (TrialOutcome::NoPlay, _) => "No note heard.".to_string(),
        (TrialOutcome::Cancelled, _) => "Cancelled.".to_string(),
    }
}

fn show_high_scores(settings: &Settings, trials: Option<u32>, time: Option<u32>) -> Result<()> {
    let store = JsonScoreStore::open(settings.scores.resolved_path())
        .context("Failed to open score history")?;
    let buckets: Vec<_> = store
        .trial_time_combos()?
        .into_iter()
        .filter(|b| trials.is_none_or(|n| b.total_trials == n))
        .filter(|b| time.is_none_or(|t| b.time_per_guess_s == t))
        .collect();

    if buckets.is_empty() {
        println!("No games recorded yet.");
        return Ok(());
    }
    for bucket in buckets {
        let records = store.high_scores(bucket.total_trials, bucket.time_per_guess_s)?;
        println!("{}", ui::score_tables::high_score_table(bucket, &records));
    }
    Ok(())
}

fn show_missed(settings: &Settings, limit: usize) -> Result<()> {
    let store = JsonScoreStore::open(settings.scores.resolved_path())
        .context("Failed to open score history")?;
    let missed = store.top_incorrect(Some(limit))?;
    print!("{}", ui::score_tables::missed_table(&missed));
    Ok(())
}
