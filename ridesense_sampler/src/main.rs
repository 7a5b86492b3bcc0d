//! # Ridesense Sampler
//!
//! Fixed-rate sensor sampler, ride controller, and raw-data CSV persister.
//! Thread-per-role, no async runtime (§9 "No coroutines/futures required").
//!
//! ```bash
//! ridesense_sampler --config /etc/ridesense/pipeline.toml
//! ```

mod capture;
mod csv_writer;
mod ride_controller;
mod ride_signal;
mod sampler_loop;
mod shared_state;

use capture::NoCaptureSink;
use clap::Parser;
use ride_controller::RideController;
use ride_signal::RideSignal;
use ridesense_cloud::{AuthClient, BackendClient, SpeedLimitFetcher, TelemetryPublisher};
use ridesense_common::config::{ConfigLoader, LogLevel, PipelineConfig};
use ridesense_common::logging::init_tracing;
use ridesense_sensors::drivers::{SimulationGnssDriver, SimulationImuDriver};
use ridesense_sensors::{GnssReader, ImuReader};
use ridesense_shm::batch::BatchWriter;
use ridesense_shm::flag::FlagWriter;
use sampler_loop::SamplerLoop;
use shared_state::SharedState;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{error, info};

/// Ridesense Sampler - fixed-rate IMU/GNSS fusion and ride-control daemon
#[derive(Parser, Debug)]
#[command(name = "ridesense_sampler")]
#[command(author = "RTS007")]
#[command(version)]
#[command(about = "On-vehicle telemetry sampler, ride controller, and raw-data persister")]
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

fn now_wall_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
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
    info!("ridesense_sampler v{} starting...", env!("CARGO_PKG_VERSION"));

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

    let imu_reader = Arc::new(Mutex::new(ImuReader::calibrate(
        Box::new(SimulationImuDriver::constant(0.0)),
        Duration::from_secs_f64(config.sensors.calibration_secs),
    )));
    let gnss_reader = Arc::new(Mutex::new(GnssReader::new(Box::new(
        SimulationGnssDriver::absent(),
    ))));

    let speed_limit_fetcher = Arc::new(SpeedLimitFetcher::new(
        config.cloud.speed_limit_base_url.clone(),
        config.cloud.resolve_speed_limit_api_key(),
        Duration::from_secs(config.cloud.speed_limit_throttle_secs),
        0.0,
    ));

    let shared = Arc::new(SharedState::new(0.0));
    let signal = Arc::new(RideSignal::new());

    let flag = match FlagWriter::create() {
        Ok(f) => f,
        Err(e) => {
            error!(error = %e, "failed to create ride flag shared-memory region");
            std::process::exit(1);
        }
    };

    let batch_writer = match BatchWriter::create() {
        Ok(b) => b,
        Err(e) => {
            error!(error = %e, "failed to create sensor batch shared-memory region");
            std::process::exit(1);
        }
    };

    let (csv_handle, csv_join) = csv_writer::spawn(csv_dir.clone());

    let ride_controller_auth = AuthClient::new(
        config.cloud.firebase_api_key.clone(),
        config.cloud.email.clone(),
        config.cloud.resolve_password(),
    );
    let ride_controller_backend = BackendClient::new(config.cloud.backend_base_url.clone());
    let mut ride_controller = RideController::new(
        ride_controller_backend,
        ride_controller_auth,
        config.cloud.user_id.clone(),
        csv_dir.clone(),
        flag,
        csv_handle.clone(),
        signal.clone(),
    );

    let telemetry = TelemetryPublisher::new(
        BackendClient::new(config.cloud.backend_base_url.clone()),
        AuthClient::new(
            config.cloud.firebase_api_key.clone(),
            config.cloud.email.clone(),
            config.cloud.resolve_password(),
        ),
        config.cloud.user_id.clone(),
    );

    let mut handles = Vec::new();

    // IMU reader thread: polls the driver at its own cadence and publishes
    // bias-corrected readings into the shared state (§5).
    {
        let stop = stop.clone();
        let shared = shared.clone();
        let imu_reader = imu_reader.clone();
        handles.push(
            std::thread::Builder::new()
                .name("imu-reader".into())
                .spawn(move || {
                    while !stop.load(Ordering::Relaxed) {
                        let mut guard = imu_reader.lock().expect("imu lock poisoned");
                        let mpu = guard.get_latest_mpu();
                        let precision = guard.raw_precision();
                        drop(guard);
                        shared.set_mpu(mpu);
                        shared.set_raw_precision(precision);
                        std::thread::sleep(Duration::from_millis(1));
                    }
                })
                .expect("failed to spawn imu-reader thread"),
        );
    }

    // GNSS reader thread: NMEA lines arrive at ~1 Hz (§4.2).
    {
        let stop = stop.clone();
        let shared = shared.clone();
        let gnss_reader = gnss_reader.clone();
        let staleness_ms = (config.sensors.gnss_staleness_secs * 1000.0) as u64;
        let mut ever_locked = false;
        handles.push(
            std::thread::Builder::new()
                .name("gnss-reader".into())
                .spawn(move || {
                    while !stop.load(Ordering::Relaxed) {
                        let now = now_wall_ms();
                        let fix = gnss_reader.lock().expect("gnss lock poisoned").get_latest_gps(now);
                        let stale = now.saturating_sub(fix.last_update_wall_ms) > staleness_ms;
                        if fix.speed_kmh.is_some() {
                            ever_locked = true;
                        }
                        shared.set_gps(fix.lat, fix.lon, fix.speed_kmh, stale, ever_locked);
                        std::thread::sleep(Duration::from_secs(1));
                    }
                })
                .expect("failed to spawn gnss-reader thread"),
        );
    }

    // Speed-limit fetcher thread (§4.9, throttled internally to ≥50 s).
    {
        let stop = stop.clone();
        let shared = shared.clone();
        let fetcher = speed_limit_fetcher.clone();
        handles.push(
            std::thread::Builder::new()
                .name("speed-limit".into())
                .spawn(move || {
                    while !stop.load(Ordering::Relaxed) {
                        let (lat, lon) = shared.lat_lon();
                        let limit = fetcher.fetch(lat, lon);
                        shared.set_speed_limit(limit);
                        std::thread::sleep(Duration::from_millis(200));
                    }
                })
                .expect("failed to spawn speed-limit thread"),
        );
    }

    // Ride controller thread (§4.6, polls every `ride_poll_secs`).
    {
        let stop = stop.clone();
        let poll = Duration::from_secs_f64(config.sampler.ride_poll_secs);
        handles.push(
            std::thread::Builder::new()
                .name("ride-controller".into())
                .spawn(move || {
                    while !stop.load(Ordering::Relaxed) {
                        ride_controller.poll_once();
                        std::thread::sleep(poll);
                    }
                })
                .expect("failed to spawn ride-controller thread"),
        );
    }

    // Sampler tick loop runs on the main thread.
    let mut loop_ = SamplerLoop::new(
        shared,
        signal,
        csv_handle,
        Box::new(NoCaptureSink),
        batch_writer,
        Some(telemetry),
        Duration::from_secs_f64(config.sampler.telemetry_cadence_secs),
        config.sampler.rate_hz,
    );
    loop_.run(&stop);

    for h in handles {
        let _ = h.join();
    }
    drop(loop_);
    let _ = csv_join.join();

    info!("ridesense_sampler shutdown complete");
}
