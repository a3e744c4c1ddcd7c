//! Headless lockstep session tool.
//!
//! Records scripted scenarios into replays and verifies that replays
//! re-simulate to the hashes they were recorded with.
//!
//! # Usage
//!
//! ```bash
//! # Record a scenario into a replay and a hash trace
//! cargo run -p lockstep_headless -- record scenario.ron -o session.replay --trace session.json
//!
//! # Verify a replay
//! cargo run -p lockstep_headless -- verify session.replay --trace session.json
//!
//! # Print a replay summary as JSON
//! cargo run -p lockstep_headless -- inspect session.replay --json
//! ```
//!
//! Reports go to stdout, logs to stderr. `verify` exits with status 1 on a
//! desync.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lockstep_core::replay::Replay;
use lockstep_headless::{inspect_replay, verify_replay, HashTrace, Scenario};

#[derive(Parser)]
#[command(name = "lockstep_headless")]
#[command(about = "Record and verify deterministic lockstep sessions")]
#[command(version)]
struct Cli {
    /// Enable verbose logging to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Play a scenario and write its replay
    Record {
        /// Scenario file (RON)
        scenario: PathBuf,

        /// Replay output file
        #[arg(short, long, default_value = "session.replay")]
        output: PathBuf,

        /// Also write the per-tick hash trace (JSON)
        #[arg(long)]
        trace: Option<PathBuf>,
    },

    /// Re-simulate a replay and compare hashes
    Verify {
        /// Replay file
        file: PathBuf,

        /// Expected hash trace, used to locate the first divergent frame
        #[arg(long)]
        trace: Option<PathBuf>,

        /// Write the re-simulated trace here
        #[arg(long)]
        dump_trace: Option<PathBuf>,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Summarize a replay without simulating it
    Inspect {
        /// Replay file
        file: PathBuf,

        /// Print the summary as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    // Logs go to stderr, stdout carries reports
    let log_level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(true),
        )
        .with(tracing_subscriber::filter::LevelFilter::from_level(
            log_level,
        ))
        .init();

    match cli.command {
        Commands::Record {
            scenario,
            output,
            trace,
        } => cmd_record(scenario, output, trace),
        Commands::Verify {
            file,
            trace,
            dump_trace,
            json,
        } => cmd_verify(file, trace, dump_trace, json),
        Commands::Inspect { file, json } => cmd_inspect(file, json),
    }
}

/// Play a scenario and save the replay.
fn cmd_record(scenario_path: PathBuf, output: PathBuf, trace_path: Option<PathBuf>) {
    info!("Recording scenario: {}", scenario_path.display());

    let scenario = match Scenario::load(&scenario_path) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Failed to load scenario: {}", e);
            std::process::exit(1);
        }
    };
    let data = match scenario.load_data() {
        Ok(d) => d,
        Err(e) => {
            eprintln!("Failed to load data: {}", e);
            std::process::exit(1);
        }
    };
    let recording = match scenario.record(data) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Recording failed: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = recording.replay.save(&output) {
        eprintln!("Failed to write replay: {}", e);
        std::process::exit(1);
    }
    if let Some(path) = trace_path {
        if let Err(e) = recording.trace.save(&path) {
            eprintln!("Failed to write trace: {}", e);
            std::process::exit(1);
        }
    }

    eprintln!("Recorded replay:");
    eprintln!("  Scenario: {}", recording.replay.scenario_id);
    eprintln!("  Frames: {}", recording.replay.final_frame);
    eprintln!("  Commands: {}", recording.replay.command_count());
    eprintln!("  Final hash: {:016x}", recording.replay.final_hash);
    eprintln!("  Written to: {}", output.display());
}

/// Re-simulate a replay and report whether it matched.
fn cmd_verify(file: PathBuf, trace_path: Option<PathBuf>, dump_trace: Option<PathBuf>, json: bool) {
    info!("Verifying replay: {}", file.display());

    let replay = match Replay::load(&file) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Failed to load replay: {}", e);
            std::process::exit(1);
        }
    };
    let expected = match trace_path.map(HashTrace::load).transpose() {
        Ok(t) => t,
        Err(e) => {
            eprintln!("Failed to load trace: {}", e);
            std::process::exit(1);
        }
    };

    let verification = match verify_replay(replay, expected.as_ref()) {
        Ok(v) => v,
        Err(e) => {
            eprintln!("FAIL: Error during verification: {}", e);
            std::process::exit(1);
        }
    };

    if let Some(path) = dump_trace {
        if let Err(e) = verification.trace.save(&path) {
            eprintln!("Failed to write trace: {}", e);
            std::process::exit(1);
        }
    }

    let report = &verification.report;
    if json {
        match serde_json::to_string_pretty(report) {
            Ok(text) => println!("{}", text),
            Err(e) => {
                eprintln!("Failed to encode report: {}", e);
                std::process::exit(1);
            }
        }
    } else if report.passed() {
        println!("PASS: Replay verification successful");
        println!("  Frames: {}..{}", report.start_frame, report.final_frame);
        println!("  Hash:   {:016x}", report.actual_hash);
    } else {
        println!("FAIL: Replay produced different hash!");
        println!("  Expected: {:016x}", report.expected_hash);
        println!("  Actual:   {:016x}", report.actual_hash);
        if let Some(frame) = report.first_divergence {
            println!("  First divergent frame: {}", frame);
        }
    }

    if !report.passed() {
        error!(
            expected = report.expected_hash,
            actual = report.actual_hash,
            first_divergence = ?report.first_divergence,
            "Desync detected"
        );
        std::process::exit(1);
    }
}

/// Print facts about a replay.
fn cmd_inspect(file: PathBuf, json: bool) {
    let replay = match Replay::load(&file) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Failed to load replay: {}", e);
            std::process::exit(1);
        }
    };
    let summary = match inspect_replay(&replay) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Failed to inspect replay: {}", e);
            std::process::exit(1);
        }
    };

    if json {
        match serde_json::to_string_pretty(&summary) {
            Ok(text) => println!("{}", text),
            Err(e) => {
                eprintln!("Failed to encode summary: {}", e);
                std::process::exit(1);
            }
        }
        return;
    }

    println!("Replay: {}", summary.scenario_id);
    println!("  Version: {}", summary.version);
    println!("  Seed: {}", summary.seed);
    println!("  Frame rate: {}", summary.frame_rate);
    println!("  Frames: {}..{}", summary.start_frame, summary.final_frame);
    println!("  Commands: {}", summary.commands);
    println!("  Controllers: {}", summary.controllers.join(", "));
    println!("  Agents at start: {}", summary.agents);
    println!("  Templates: {}", summary.templates);
    println!("  Final hash: {:016x}", summary.final_hash);
}
