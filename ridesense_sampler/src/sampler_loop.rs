//! Fixed-Rate Sampler tick loop (C6, §4.4): absolute-deadline scheduling
//! over the fused sensor state.

use crate::capture::CaptureSink;
use crate::csv_writer::{CsvWriterHandle, RawRow};
use crate::ride_signal::RideSignal;
use crate::shared_state::SharedState;
use ridesense_cloud::{MpuTelemetry, TelemetryPublisher};
use ridesense_sensors::SpeedEstimator;
use ridesense_shm::batch::{Batch, BatchRow, BatchWriter, ROWS_PER_BATCH};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tracing::info;

fn now_wall_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Drives one tick of the sampler: assembles a `SensorSample` from the
/// shared reader state, enqueues it to CSV, accumulates it into the
/// shared-memory batch, and periodically publishes telemetry.
pub struct SamplerLoop {
    shared: Arc<SharedState>,
    signal: Arc<RideSignal>,
    speed_estimator: SpeedEstimator,
    csv: CsvWriterHandle,
    capture: Box<dyn CaptureSink>,
    batch_writer: BatchWriter,
    telemetry: Option<TelemetryPublisher>,
    telemetry_cadence: Duration,
    rate_hz: f64,
    batch: Vec<BatchRow>,
    last_telemetry: Instant,
    last_t_ms: i64,
}

impl SamplerLoop {
    pub fn new(
        shared: Arc<SharedState>,
        signal: Arc<RideSignal>,
        csv: CsvWriterHandle,
        capture: Box<dyn CaptureSink>,
        batch_writer: BatchWriter,
        telemetry: Option<TelemetryPublisher>,
        telemetry_cadence: Duration,
        rate_hz: f64,
    ) -> Self {
        Self {
            shared,
            signal,
            speed_estimator: SpeedEstimator::new(),
            csv,
            capture,
            batch_writer,
            telemetry,
            telemetry_cadence,
            rate_hz,
            batch: Vec::with_capacity(ROWS_PER_BATCH),
            last_telemetry: Instant::now(),
            last_t_ms: 0,
        }
    }

    /// Runs until `stop` is set, sleeping to an absolute deadline each
    /// iteration (§4.4: "next := next + 1/rate", no catch-up on late ticks).
    pub fn run(&mut self, stop: &AtomicBool) {
        let period = Duration::from_secs_f64(1.0 / self.rate_hz);
        let mut next = Instant::now() + period;

        while !stop.load(Ordering::Relaxed) {
            let now = Instant::now();
            if now < next {
                std::thread::sleep(next - now);
            }
            next += period;

            self.tick();
        }
    }

    fn tick(&mut self) {
        if self.signal.take_reset_pulse() {
            self.speed_estimator.reset();
            self.batch.clear();
            info!("ride start: speed estimator reset, batch buffer cleared");
        }

        if !self.signal.is_active() {
            return;
        }

        let wall_ms = now_wall_ms();
        let t_ms = wall_ms.max((self.last_t_ms + 1).max(0) as u64) as i64;
        self.last_t_ms = t_ms;

        let (raw_ax, raw_ay, raw_az, gx, gy, gz) = self.shared.mpu();
        let (lat, lon, gps_speed, gps_stale, gps_ever_locked) = self.shared.gps();
        let raw_acc_x_g = raw_ax;

        let (speed_kmh, source) = self.speed_estimator.final_speed_kmh(
            gps_speed,
            gps_stale,
            gps_ever_locked,
            raw_acc_x_g,
            self.shared.raw_precision(),
        );
        let speed_kmh = speed_kmh.clamp(0.0, ridesense_common::model::MAX_SPEED_KMH);
        let speed_limit_kmh = self.shared.speed_limit();

        let sample = ridesense_common::model::SensorSample {
            t_ms,
            acc_x: raw_ax,
            acc_y: raw_ay,
            acc_z: raw_az,
            gyro_x: gx,
            gyro_y: gy,
            gyro_z: gz,
            lat: if lat == 0.0 && lon == 0.0 { None } else { Some(lat) },
            lon: if lat == 0.0 && lon == 0.0 { None } else { Some(lon) },
            speed_kmh,
            speed_limit_kmh,
            source,
        };

        self.csv.try_enqueue(RawRow {
            wall_ms: wall_ms as i64,
            image_path: self.capture.path_for(t_ms),
            sample,
        });

        self.batch.push(BatchRow {
            t_sec: t_ms as f64 / 1000.0,
            acc_x: sample.acc_x,
            acc_y: sample.acc_y,
            acc_z: sample.acc_z,
            gyro_x: sample.gyro_x.to_radians(),
            gyro_y: sample.gyro_y.to_radians(),
            gyro_z: sample.gyro_z.to_radians(),
            lat: sample.lat.unwrap_or(0.0),
            lon: sample.lon.unwrap_or(0.0),
            speed: sample.speed_kmh,
            speed_limit: sample.speed_limit_kmh,
        });

        if self.batch.len() == ROWS_PER_BATCH {
            let mut batch: Batch = [BatchRow::default(); ROWS_PER_BATCH];
            batch.copy_from_slice(&self.batch);
            self.batch_writer.write_batch(&batch);
            self.batch.clear();
        }

        if self.last_telemetry.elapsed() >= self.telemetry_cadence {
            self.last_telemetry = Instant::now();
            if let Some(publisher) = &self.telemetry {
                publisher.publish(
                    speed_kmh,
                    speed_limit_kmh,
                    MpuTelemetry {
                        acc_x: sample.acc_x,
                        acc_y: sample.acc_y,
                        acc_z: sample.acc_z,
                        gyro_x: sample.gyro_x,
                        gyro_y: sample.gyro_y,
                        gyro_z: sample.gyro_z,
                    },
                    wall_ms,
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::NoCaptureSink;
    use ridesense_shm::batch::BatchReader;
    use std::sync::Mutex;

    // The sensor batch region has a fixed OS-level name; serialize tests
    // that create/recreate it so they don't race each other.
    static TEST_LOCK: Mutex<()> = Mutex::new(());

    fn new_loop(
        csv_dir: std::path::PathBuf,
    ) -> (
        SamplerLoop,
        Arc<RideSignal>,
        CsvWriterHandle,
        std::thread::JoinHandle<()>,
    ) {
        let (csv_handle, join) = crate::csv_writer::spawn(csv_dir);
        let signal = Arc::new(RideSignal::new());
        let shared = Arc::new(SharedState::new(50.0));
        let loop_ = SamplerLoop::new(
            shared,
            signal.clone(),
            csv_handle.clone(),
            Box::new(NoCaptureSink),
            BatchWriter::create().expect("create batch region"),
            None,
            Duration::from_secs(7),
            100.0,
        );
        (loop_, signal, csv_handle, join)
    }

    #[test]
    fn idle_ticks_append_nothing_to_csv() {
        let _guard = TEST_LOCK.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let (mut loop_, _signal, csv, join) = new_loop(dir.path().to_path_buf());
        csv.start_ride("1".to_string());
        loop_.tick();
        csv.end_ride();
        drop(csv);
        drop(loop_);
        join.join().unwrap();

        let contents = std::fs::read_to_string(dir.path().join("rawdata_1.csv")).unwrap();
        assert_eq!(contents.lines().count(), 1, "header only, no data rows while idle");
    }

    #[test]
    fn active_tick_appends_one_csv_row() {
        let _guard = TEST_LOCK.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let (mut loop_, signal, csv, join) = new_loop(dir.path().to_path_buf());
        signal.start("2".to_string());
        csv.start_ride("2".to_string());
        loop_.tick();
        csv.end_ride();
        drop(csv);
        drop(loop_);
        join.join().unwrap();

        let contents = std::fs::read_to_string(dir.path().join("rawdata_2.csv")).unwrap();
        assert_eq!(contents.lines().count(), 2, "header plus one data row");
    }

    #[test]
    fn batch_flushes_to_shared_memory_after_104_ticks() {
        let _guard = TEST_LOCK.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let (mut loop_, signal, csv, join) = new_loop(dir.path().to_path_buf());
        signal.start("3".to_string());
        csv.start_ride("3".to_string());
        for _ in 0..ROWS_PER_BATCH {
            loop_.tick();
        }
        csv.end_ride();
        drop(csv);
        drop(loop_);
        join.join().unwrap();

        let reader = BatchReader::attach().expect("attach batch region");
        let batch = reader.read_batch();
        assert_eq!(batch[0].speed_limit, 50.0);
    }
}
