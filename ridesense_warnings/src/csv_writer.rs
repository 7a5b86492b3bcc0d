//! Ride-local `warnings_{ride_id}.csv` persister (§4.7 "Writer discipline").
//!
//! Mirrors the sampler's own CSV writer thread (bounded queue, 100 ms
//! timeout, background thread) but the unit of work is a whole batch: the
//! consumer appends all 104 rows of a processed batch in one command,
//! each row replicating the classifier's current label and the active
//! warning names at the moment the batch was processed.

use ridesense_shm::batch::Batch;
use std::fs::File;
use std::path::PathBuf;
use std::sync::mpsc::{Receiver, SyncSender, TrySendError};
use std::time::Duration;
use tracing::{info, warn};

pub const QUEUE_CAPACITY: usize = 64;
const RECV_TIMEOUT: Duration = Duration::from_millis(100);

/// Header for `warnings_{ride_id}.csv` (§4.7).
const HEADER: &[&str] = &[
    "t",
    "acc_x",
    "acc_y",
    "acc_z",
    "gyro_x",
    "gyro_y",
    "gyro_z",
    "lat",
    "lon",
    "speed",
    "speed_limit",
    "lstm_label",
    "warnings_csv",
];

/// One processed batch: its 104 rows plus the label/warning-list snapshot
/// taken at the moment it was consumed.
pub struct ProcessedBatch {
    pub batch: Batch,
    pub lstm_label: String,
    pub warnings_csv: String,
}

pub enum CsvCommand {
    StartRide { ride_id: String },
    Batch(Box<ProcessedBatch>),
    EndRide,
}

/// Handle the warning engine uses to enqueue a processed batch.
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

    /// Non-blocking enqueue; drops and logs on a full queue.
    pub fn try_enqueue(&self, processed: ProcessedBatch) {
        if let Err(TrySendError::Full(_)) = self.tx.try_send(CsvCommand::Batch(Box::new(processed))) {
            warn!("warnings csv queue full, dropping batch");
        }
    }
}

fn write_batch(writer: &mut csv::Writer<File>, processed: &ProcessedBatch) -> csv::Result<()> {
    for row in processed.batch.iter() {
        writer.write_record([
            row.t_sec.to_string(),
            row.acc_x.to_string(),
            row.acc_y.to_string(),
            row.acc_z.to_string(),
            row.gyro_x.to_string(),
            row.gyro_y.to_string(),
            row.gyro_z.to_string(),
            row.lat.to_string(),
            row.lon.to_string(),
            row.speed.to_string(),
            row.speed_limit.to_string(),
            processed.lstm_label.clone(),
            processed.warnings_csv.clone(),
        ])?;
    }
    Ok(())
}

/// Spawns the warnings CSV writer thread; exits once every handle clone is
/// dropped.
pub fn spawn(csv_dir: PathBuf) -> (CsvWriterHandle, std::thread::JoinHandle<()>) {
    let (tx, rx) = std::sync::mpsc::sync_channel(QUEUE_CAPACITY);
    let handle = std::thread::Builder::new()
        .name("warnings-csv-writer".into())
        .spawn(move || run(csv_dir, rx))
        .expect("failed to spawn warnings-csv-writer thread");
    (CsvWriterHandle { tx }, handle)
}

fn run(csv_dir: PathBuf, rx: Receiver<CsvCommand>) {
    let mut writer: Option<csv::Writer<File>> = None;

    loop {
        match rx.recv_timeout(RECV_TIMEOUT) {
            Ok(CsvCommand::StartRide { ride_id }) => {
                let path = csv_dir.join(format!("warnings_{ride_id}.csv"));
                match File::create(&path) {
                    Ok(file) => {
                        let mut w = csv::WriterBuilder::new()
                            .has_headers(false)
                            .from_writer(file);
                        if w.write_record(HEADER).is_err() {
                            warn!(path = %path.display(), "failed to write warnings csv header");
                        }
                        info!(path = %path.display(), "warnings csv opened");
                        writer = Some(w);
                    }
                    Err(e) => warn!(error = %e, path = %path.display(), "failed to create warnings csv"),
                }
            }
            Ok(CsvCommand::Batch(processed)) => {
                if let Some(w) = writer.as_mut() {
                    if write_batch(w, &processed).is_err() {
                        warn!("failed to append warnings csv batch");
                    }
                    let _ = w.flush();
                }
            }
            Ok(CsvCommand::EndRide) => {
                if let Some(mut w) = writer.take() {
                    let _ = w.flush();
                }
            }
            Err(std::sync::mpsc::RecvTimeoutError::Timeout) => {}
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
    use ridesense_shm::batch::{BatchRow, ROWS_PER_BATCH};

    #[test]
    fn writes_header_and_one_row_per_sample() {
        let dir = tempfile::tempdir().unwrap();
        let (handle, join) = spawn(dir.path().to_path_buf());
        handle.start_ride("7".to_string());

        let mut batch: Batch = [BatchRow::default(); ROWS_PER_BATCH];
        batch[0].speed = 42.0;
        batch[0].speed_limit = 50.0;
        handle.try_enqueue(ProcessedBatch {
            batch,
            lstm_label: "STRAIGHT".to_string(),
            warnings_csv: "overspeed".to_string(),
        });
        handle.end_ride();
        drop(handle);
        join.join().unwrap();

        let contents = std::fs::read_to_string(dir.path().join("warnings_7.csv")).unwrap();
        let mut lines = contents.lines();
        assert_eq!(
            lines.next().unwrap(),
            "t,acc_x,acc_y,acc_z,gyro_x,gyro_y,gyro_z,lat,lon,speed,speed_limit,lstm_label,warnings_csv"
        );
        assert_eq!(lines.count(), ROWS_PER_BATCH, "one row per sample in the batch");
        assert!(contents.contains("STRAIGHT,overspeed"));
    }
}
