//! Ride-local raw-data CSV persister (C10, §4.4 "Enqueued non-blocking",
//! §5 "CSV writer: blocks on bounded queue with 100 ms timeout; flushes
//! batches of 10 rows").

use chrono::{TimeZone, Utc};
use ridesense_common::model::SensorSample;
use std::fs::File;
use std::path::PathBuf;
use std::sync::mpsc::{Receiver, SyncSender, TrySendError};
use std::time::Duration;
use tracing::{info, warn};

/// Depth of the non-blocking enqueue queue between the sampler tick and
/// this writer thread.
pub const QUEUE_CAPACITY: usize = 1024;

const FLUSH_BATCH: usize = 10;
const RECV_TIMEOUT: Duration = Duration::from_millis(100);

/// Header for `rawdata_{ride_id}.csv` (§6).
const HEADER: &[&str] = &[
    "timestamp",
    "image_path",
    "acc_x",
    "acc_y",
    "acc_z",
    "gyro_x",
    "gyro_y",
    "gyro_z",
    "latitude",
    "longitude",
    "speed",
    "speed_limit",
];

/// One raw-data row, the sample plus a wall-clock stamp and an optional
/// captured-frame path.
#[derive(Debug, Clone)]
pub struct RawRow {
    pub wall_ms: i64,
    pub image_path: Option<String>,
    pub sample: SensorSample,
}

pub enum CsvCommand {
    StartRide { ride_id: String },
    Row(RawRow),
    EndRide,
}

/// Handle the sampler tick loop uses to enqueue rows; enqueue is
/// non-blocking and drops (counting) when the queue is full.
#[derive(Clone)]
pub struct CsvWriterHandle {
    tx: SyncSender<CsvCommand>,
}

impl CsvWriterHandle {
    pub fn start_ride(&self, ride_id: String) {
        let _ = self.tx.send(CsvCommand::StartRide { ride_id });
    }

    pub fn end_ride(&self) {
        let _ = self.tx.send(CsvCommand::EndRide);
    }

    /// Non-blocking row enqueue; drops and logs on a full queue (§4.4, §7
    /// "Queue overflow").
    pub fn try_enqueue(&self, row: RawRow) {
        if let Err(TrySendError::Full(_)) = self.tx.try_send(CsvCommand::Row(row)) {
            warn!("csv queue full, dropping row");
        }
    }
}

fn format_timestamp(wall_ms: i64) -> String {
    Utc.timestamp_millis_opt(wall_ms)
        .single()
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S%.3f").to_string())
        .unwrap_or_default()
}

fn write_row(writer: &mut csv::Writer<File>, row: &RawRow) -> csv::Result<()> {
    let s = &row.sample;
    writer.write_record([
        format_timestamp(row.wall_ms),
        row.image_path.clone().unwrap_or_default(),
        s.acc_x.to_string(),
        s.acc_y.to_string(),
        s.acc_z.to_string(),
        s.gyro_x.to_string(),
        s.gyro_y.to_string(),
        s.gyro_z.to_string(),
        s.lat.map(|v| v.to_string()).unwrap_or_default(),
        s.lon.map(|v| v.to_string()).unwrap_or_default(),
        s.speed_kmh.to_string(),
        s.speed_limit_kmh.to_string(),
    ])
}

/// Spawns the CSV writer thread and returns a handle to enqueue into it.
/// The thread exits once the channel's senders are all dropped.
pub fn spawn(csv_dir: PathBuf) -> (CsvWriterHandle, std::thread::JoinHandle<()>) {
    let (tx, rx) = std::sync::mpsc::sync_channel(QUEUE_CAPACITY);
    let handle = std::thread::Builder::new()
        .name("csv-writer".into())
        .spawn(move || run(csv_dir, rx))
        .expect("failed to spawn csv-writer thread");
    (CsvWriterHandle { tx }, handle)
}

fn run(csv_dir: PathBuf, rx: Receiver<CsvCommand>) {
    let mut writer: Option<csv::Writer<File>> = None;
    let mut buffered: usize = 0;

    loop {
        match rx.recv_timeout(RECV_TIMEOUT) {
            Ok(CsvCommand::StartRide { ride_id }) => {
                let path = csv_dir.join(format!("rawdata_{ride_id}.csv"));
                match File::create(&path) {
                    Ok(file) => {
                        let mut w = csv::WriterBuilder::new()
                            .has_headers(false)
                            .from_writer(file);
                        if w.write_record(HEADER).is_err() {
                            warn!(path = %path.display(), "failed to write rawdata csv header");
                        }
                        info!(path = %path.display(), "rawdata csv opened");
                        writer = Some(w);
                        buffered = 0;
                    }
                    Err(e) => warn!(error = %e, path = %path.display(), "failed to create rawdata csv"),
                }
            }
            Ok(CsvCommand::Row(row)) => {
                if let Some(w) = writer.as_mut() {
                    if write_row(w, &row).is_err() {
                        warn!("failed to append rawdata csv row");
                    }
                    buffered += 1;
                    if buffered >= FLUSH_BATCH {
                        let _ = w.flush();
                        buffered = 0;
                    }
                }
            }
            Ok(CsvCommand::EndRide) => {
                if let Some(mut w) = writer.take() {
                    let _ = w.flush();
                }
                buffered = 0;
            }
            Err(std::sync::mpsc::RecvTimeoutError::Timeout) => {
                if let Some(w) = writer.as_mut() {
                    if buffered > 0 {
                        let _ = w.flush();
                        buffered = 0;
                    }
                }
            }
            Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }

    if let Some(mut w) = writer.take() {
        let _ = w.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ridesense_common::model::SpeedSource;

    fn sample() -> SensorSample {
        SensorSample {
            t_ms: 0,
            acc_x: 0.1,
            acc_y: 0.0,
            acc_z: 1.0,
            gyro_x: 0.0,
            gyro_y: 0.0,
            gyro_z: 0.0,
            lat: Some(17.385),
            lon: Some(78.48),
            speed_kmh: 42.0,
            speed_limit_kmh: 50.0,
            source: SpeedSource::Gps,
        }
    }

    #[test]
    fn writes_header_and_rows_to_disk() {
        let dir = tempfile::tempdir().unwrap();
        let (handle, join) = spawn(dir.path().to_path_buf());
        handle.start_ride("7".to_string());
        handle.try_enqueue(RawRow {
            wall_ms: 1_700_000_000_000,
            image_path: None,
            sample: sample(),
        });
        handle.end_ride();
        drop(handle);
        join.join().unwrap();

        let contents = std::fs::read_to_string(dir.path().join("rawdata_7.csv")).unwrap();
        let mut lines = contents.lines();
        assert_eq!(
            lines.next().unwrap(),
            "timestamp,image_path,acc_x,acc_y,acc_z,gyro_x,gyro_y,gyro_z,latitude,longitude,speed,speed_limit"
        );
        assert!(lines.next().unwrap().contains("42"));
    }

    #[test]
    fn timestamp_format_matches_iso_like_spec() {
        let ts = format_timestamp(1_700_000_000_000);
        assert_eq!(ts.len(), "YYYY-MM-DD HH:MM:SS.mmm".len());
        assert!(ts.contains('-') && ts.contains(':') && ts.contains('.'));
    }
}
