//! # Ridesense Warning Engine
//!
//! Shared-memory consumer: seven worker threads re-read the current
//! sensor batch (six rule detectors plus the learned classifier), publish
//! a `WarningVector`/`LstmLabel`, and persist `warnings_{ride_id}.csv`
//! (§4.7). Thread-per-role, no async runtime, same as the sampler (§9).
//!
//! ```bash
//! ridesense_warnings --config /etc/ridesense/pipeline.toml
//! ```

mod classifier;
mod csv_writer;
mod detectors;
mod engine;
mod shared_warnings;

use classifier::{ClassifierBackend, LstmClassifier};
use clap::Parser;
use ridesense_common::config::{ConfigLoader, LogLevel, PipelineConfig};
use ridesense_common::logging::init_tracing;
use ridesense_shm::batch::BatchReader;
use ridesense_shm::flag::FlagReader;
use shared_warnings::SharedWarnings;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Ridesense Warning Engine - shared-memory consumer and event detector
#[derive(Parser, Debug)]
#[command(name = "ridesense_warnings")]
#[command(author = "RTS007")]
#[command(version)]
#[command(about = "Six rule detectors plus the learned classifier over the sampler's shared-memory batch")]
struct Args {
    /// Path to the pipeline configuration file (TOML)
    #[arg(short, long, default_value = "/etc/ridesense/pipeline.toml")]
    config: PathBuf,

    /// Force the simulation IMU/GNSS drivers, overriding config
    #[arg(short = 's', long)]
    simulate: bool,

    /// Enable verbose (debug) logging, overriding config
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format, overriding config
    #[arg(long = "json-logs")]
    json_logs: bool,
}

/// Load the classifier model if configured; a missing path, unreadable
/// file, or bad shapes disables it without aborting the process (§7
/// "Model load failure").
fn load_classifier(model_path: Option<&str>) -> Option<Arc<dyn ClassifierBackend>> {
    let path = model_path?;
    match LstmClassifier::load(std::path::Path::new(path)) {
        Ok(model) => {
            info!(path, units = model.units(), dense_width = model.dense_width(), "classifier model loaded");
            Some(Arc::new(model) as Arc<dyn ClassifierBackend>)
        }
        Err(e) => {
            warn!(error = %e, path, "failed to load classifier model, bump detector disabled");
            None
        }
    }
}

/// Attach to the sampler's sensor batch region, exiting with a clear
/// message rather than panicking if the sampler process hasn't created it
/// yet (§6 "Process surface": sampler, then warning-engine).
fn attach_batch_reader() -> BatchReader {
    match BatchReader::attach() {
        Ok(r) => r,
        Err(e) => {
            error!(error = %e, "failed to attach sensor batch region; is the sampler running?");
            std::process::exit(1);
        }
    }
}

fn attach_flag_reader() -> FlagReader {
    match FlagReader::attach() {
        Ok(r) => r,
        Err(e) => {
            error!(error = %e, "failed to attach ride flag region; is the sampler running?");
            std::process::exit(1);
        }
    }
}

fn main() {
    let args = Args::parse();

    let mut config = match PipelineConfig::load(&args.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("failed to load config {}: {e}", args.config.display());
            std::process::exit(1);
        }
    };
    if args.simulate {
        config.sensors.simulate = true;
    }
    if let Err(e) = config.validate() {
        eprintln!("invalid config: {e}");
        std::process::exit(1);
    }

    let log_level = if args.verbose { LogLevel::Debug } else { config.shared.log_level };
    init_tracing(log_level, config.shared.json_logs || args.json_logs);
    info!("ridesense_warnings v{} starting...", env!("CARGO_PKG_VERSION"));

    let csv_dir = PathBuf::from(&config.sampler.csv_dir);
    if let Err(e) = std::fs::create_dir_all(&csv_dir) {
        error!(error = %e, path = %csv_dir.display(), "failed to create csv directory");
        std::process::exit(1);
    }

    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = stop.clone();
        if let Err(e) = ctrlc::set_handler(move || {
            info!("shutdown signal received");
            stop.store(true, Ordering::SeqCst);
        }) {
            error!(error = %e, "failed to install signal handler");
        }
    }

    let poll = Duration::from_millis(config.warnings.detector_poll_ms);
    let shared = Arc::new(SharedWarnings::new());
    let classifier = load_classifier(config.warnings.model_path.as_deref());

    let (csv_handle, csv_join) = csv_writer::spawn(csv_dir);

    let mut handles = Vec::new();

    macro_rules! spawn_rule_detector {
        ($name:expr, $rule:expr, $setter:expr) => {{
            let stop = stop.clone();
            let shared = shared.clone();
            let reader = attach_batch_reader();
            handles.push(
                std::thread::Builder::new()
                    .name($name.into())
                    .spawn(move || {
                        engine::run_detector_loop(&stop, poll, reader, |batch| {
                            $setter(&shared, $rule(batch));
                        });
                    })
                    .expect("failed to spawn detector thread"),
            );
        }};
    }

    spawn_rule_detector!(
        "detector-overspeed",
        detectors::overspeed,
        |s: &SharedWarnings, v| s.set_overspeed(v)
    );
    spawn_rule_detector!(
        "detector-pothole",
        detectors::pothole,
        |s: &SharedWarnings, v| s.set_pothole(v)
    );
    spawn_rule_detector!(
        "detector-harsh-brake",
        detectors::harsh_brake,
        |s: &SharedWarnings, v| s.set_harsh_brake(v)
    );
    spawn_rule_detector!(
        "detector-sudden-accel",
        detectors::sudden_accel,
        |s: &SharedWarnings, v| s.set_sudden_accel(v)
    );

    // Speedy turn needs the latest LstmLabel to gate itself (§4.7 rule 4).
    {
        let stop = stop.clone();
        let shared = shared.clone();
        let reader = attach_batch_reader();
        handles.push(
            std::thread::Builder::new()
                .name("detector-speedy-turn".into())
                .spawn(move || {
                    engine::run_detector_loop(&stop, poll, reader, |batch| {
                        let gated = shared.label().gates_speedy_turn();
                        shared.set_speedy_turn(detectors::speedy_turn(batch, gated));
                    });
                })
                .expect("failed to spawn detector-speedy-turn thread"),
        );
    }

    // Learned classifier thread: drives idx 1 (bump) and the speedy-turn
    // gate, itself gated on the backend's calculate_model flag (§4.7,
    // SPEC_FULL.md Section C).
    {
        let stop = stop.clone();
        let shared = shared.clone();
        let reader = attach_batch_reader();
        let gate = attach_flag_reader();
        handles.push(
            std::thread::Builder::new()
                .name("classifier".into())
                .spawn(move || {
                    engine::run_classifier_loop(&stop, poll, reader, gate, shared, classifier);
                })
                .expect("failed to spawn classifier thread"),
        );
    }

    // CSV consumer: tracks ride-flag transitions and persists each newly
    // observed batch to warnings_{ride_id}.csv (§4.7 "Writer discipline").
    {
        let stop = stop.clone();
        let shared = shared.clone();
        let csv_handle = csv_handle.clone();
        let flag_reader = attach_flag_reader();
        let batch_reader = attach_batch_reader();
        handles.push(
            std::thread::Builder::new()
                .name("warnings-consumer".into())
                .spawn(move || {
                    let mut state = engine::ConsumerState::new();
                    while !stop.load(Ordering::Relaxed) {
                        engine::consumer_tick(&flag_reader, &batch_reader, &shared, &csv_handle, &mut state);
                        std::thread::sleep(poll);
                    }
                })
                .expect("failed to spawn warnings-consumer thread"),
        );
    }

    for h in handles {
        let _ = h.join();
    }
    drop(csv_handle);
    let _ = csv_join.join();

    info!("ridesense_warnings shutdown complete");
}
