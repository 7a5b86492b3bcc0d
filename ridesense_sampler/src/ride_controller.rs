//! Ride Controller (C8, §4.6): the IDLE/ACTIVE state machine driven by the
//! remote `is_active` flag.

use crate::csv_writer::CsvWriterHandle;
use crate::ride_signal::RideSignal;
use ridesense_cloud::{AuthClient, BackendClient};
use ridesense_shm::flag::FlagWriter;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{info, warn};

/// Bound on draining the CSV queue on ride end (§4.6, §5).
const CSV_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);
/// Bound on waiting for the warning engine's own CSV to finish (§4.6).
const CONSUMER_CSV_WAIT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, PartialEq, Eq)]
enum State {
    Idle,
    Active { ride_id: String },
}

/// Drives the flag word, the rawdata CSV lifecycle, and the final
/// ride-finalization upload, in response to the remote ride-status flag.
pub struct RideController {
    backend: BackendClient,
    auth: AuthClient,
    user_id: String,
    csv_dir: PathBuf,
    flag: FlagWriter,
    csv: CsvWriterHandle,
    signal: Arc<RideSignal>,
    state: State,
    csv_drain_timeout: Duration,
    consumer_csv_wait: Duration,
}

impl RideController {
    pub fn new(
        backend: BackendClient,
        auth: AuthClient,
        user_id: String,
        csv_dir: PathBuf,
        flag: FlagWriter,
        csv: CsvWriterHandle,
        signal: Arc<RideSignal>,
    ) -> Self {
        Self {
            backend,
            auth,
            user_id,
            csv_dir,
            flag,
            csv,
            signal,
            state: State::Idle,
            csv_drain_timeout: CSV_DRAIN_TIMEOUT,
            consumer_csv_wait: CONSUMER_CSV_WAIT,
        }
    }

    #[cfg(test)]
    fn with_timeouts(mut self, csv_drain_timeout: Duration, consumer_csv_wait: Duration) -> Self {
        self.csv_drain_timeout = csv_drain_timeout;
        self.consumer_csv_wait = consumer_csv_wait;
        self
    }

    /// One poll cycle (~10 s cadence). Backend failures retain the
    /// previously observed state (§4.6).
    pub fn poll_once(&mut self) {
        let token = match self.auth.current_token() {
            Ok(t) => t,
            Err(e) => {
                warn!(error = %e, "ride controller: no valid token, retaining state");
                return;
            }
        };

        match self.state.clone() {
            State::Idle => {
                // The candidate next ride id is fetched fresh each poll
                // while idle (§4.6: "call backend get_next_ride_id").
                let candidate_id = match self.backend.get_next_ride_id(&self.user_id, &token) {
                    Ok(id) => id.to_string(),
                    Err(e) => {
                        warn!(error = %e, "failed to obtain next ride id, retaining IDLE");
                        return;
                    }
                };
                match self
                    .backend
                    .get_ride_status(&self.user_id, &candidate_id, &token)
                {
                    Ok(status) if status.is_active => {
                        self.transition_to_active(candidate_id, status.calculate_model, &token)
                    }
                    Ok(_) => {}
                    Err(e) => warn!(error = %e, "ride controller poll failed, retaining IDLE"),
                }
            }
            State::Active { ride_id } => {
                match self.backend.get_ride_status(&self.user_id, &ride_id, &token) {
                    Ok(status) if !status.is_active => {
                        self.transition_to_idle(&ride_id, &token)
                    }
                    // calculate_model can flip mid-ride; republish it on
                    // every active poll so the warning engine's classifier
                    // gate (SPEC_FULL.md Section C) tracks the backend.
                    Ok(status) => self.flag.set(
                        1,
                        ride_id.parse().unwrap_or(0),
                        status.calculate_model,
                    ),
                    Err(e) => warn!(error = %e, "ride controller poll failed, retaining ACTIVE"),
                }
            }
        }
    }

    fn transition_to_active(&mut self, ride_id: String, calculate_model: bool, token: &str) {
        let now_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;

        if let Err(e) =
            self.backend
                .patch_ride_status(&self.user_id, &ride_id, true, now_ms, token)
        {
            warn!(error = %e, "init_ride push failed, proceeding locally");
        }

        self.csv.start_ride(ride_id.clone());
        self.flag
            .set(1, ride_id.parse().unwrap_or(0), calculate_model);
        self.signal.start(ride_id.clone());
        info!(ride_id = %ride_id, calculate_model, "ride started");
        self.state = State::Active { ride_id };
    }

    fn transition_to_idle(&mut self, ride_id: &str, token: &str) {
        self.flag.set(0, ride_id.parse().unwrap_or(0), false);
        self.signal.stop();
        self.csv.end_ride();
        std::thread::sleep(self.csv_drain_timeout);
        std::thread::sleep(self.consumer_csv_wait);

        let warnings_path = self.csv_dir.join(format!("warnings_{ride_id}.csv"));
        match read_csv_as_json_rows(&warnings_path) {
            Ok(rows) => {
                if let Err(e) = self
                    .backend
                    .upload_raw_data(&self.user_id, ride_id, &rows, token)
                {
                    warn!(error = %e, "upload_raw_data_to_firebase failed, csv retained on disk");
                }
            }
            Err(e) => warn!(error = %e, path = %warnings_path.display(), "could not read warnings csv for upload"),
        }

        info!(ride_id = %ride_id, "ride finalized");
        self.state = State::Idle;
    }
}

fn read_csv_as_json_rows(path: &std::path::Path) -> Result<Vec<serde_json::Value>, csv::Error> {
    let mut reader = csv::Reader::from_path(path)?;
    let headers = reader.headers()?.clone();
    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let mut obj = serde_json::Map::new();
        for (key, value) in headers.iter().zip(record.iter()) {
            obj.insert(key.to_string(), serde_json::Value::String(value.to_string()));
        }
        rows.push(serde_json::Value::Object(obj));
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn reads_csv_rows_as_json_objects() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("warnings_7.csv");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "t,speed,warnings").unwrap();
        writeln!(f, "0.0,42.0,overspeed").unwrap();
        drop(f);

        let rows = read_csv_as_json_rows(&path).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["speed"], "42.0");
        assert_eq!(rows[0]["warnings"], "overspeed");
    }

    #[test]
    fn missing_warnings_csv_is_an_error_not_a_panic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("warnings_999.csv");
        assert!(read_csv_as_json_rows(&path).is_err());
    }

    #[test]
    fn transition_to_idle_respects_configured_short_timeouts() {
        let dir = tempfile::tempdir().unwrap();
        let csv_dir = dir.path().to_path_buf();
        std::fs::write(csv_dir.join("warnings_42.csv"), "t,speed\n0.0,10.0\n").unwrap();

        let (csv_handle, _join) = crate::csv_writer::spawn(csv_dir.clone());
        let signal = Arc::new(RideSignal::new());
        signal.start("42".to_string());

        let mut controller = RideController::new(
            BackendClient::new("http://127.0.0.1:1".to_string()),
            AuthClient::new("key".to_string(), "a@b.com".to_string(), "pw".to_string()),
            "rider1".to_string(),
            csv_dir,
            FlagWriter::create().expect("create flag"),
            csv_handle,
            signal.clone(),
        )
        .with_timeouts(Duration::from_millis(5), Duration::from_millis(5));

        let start = std::time::Instant::now();
        controller.transition_to_idle("42", "dummy-token");
        assert!(start.elapsed() < Duration::from_millis(500));
        assert!(!signal.is_active());
    }
}
