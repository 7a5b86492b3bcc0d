//! Orchestration for the Warning Engine's seven worker threads (§4.7,
//! §5 "Warning threads (7): each sleeps 50-100 ms between iterations.") and
//! the ride-scoped CSV consumer.

use crate::classifier::{ClassifierBackend, Window, FEATURES_PER_STEP, WINDOW_LEN};
use crate::csv_writer::{CsvWriterHandle, ProcessedBatch};
use crate::shared_warnings::SharedWarnings;
use ridesense_common::model::LstmLabel;
use ridesense_shm::batch::{Batch, BatchReader};
use ridesense_shm::flag::FlagReader;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Confidence floor for the classifier to assert `bump=1` (§4.7).
pub const BUMP_CONFIDENCE_THRESHOLD: f32 = 0.6;

/// Drives one rule detector: re-reads the current batch each iteration and
/// writes only its own slot (§4.7 "Each rule runs at >= 10 Hz").
pub fn run_detector_loop(
    stop: &AtomicBool,
    poll: Duration,
    reader: BatchReader,
    mut step: impl FnMut(&Batch),
) {
    while !stop.load(Ordering::Relaxed) {
        let batch = reader.read_batch();
        step(&batch);
        std::thread::sleep(poll);
    }
}

fn window_from_batch(batch: &Batch) -> Window {
    let mut window: Window = [[0.0f32; FEATURES_PER_STEP]; WINDOW_LEN];
    for (dst, row) in window.iter_mut().zip(batch.iter()) {
        *dst = [
            row.acc_x as f32,
            row.acc_y as f32,
            row.acc_z as f32,
            row.gyro_x as f32,
            row.gyro_y as f32,
            row.gyro_z as f32,
            row.speed as f32,
        ];
    }
    window
}

fn argmax(probs: &[f32; 5]) -> (LstmLabel, f32) {
    let (idx, conf) = probs
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.partial_cmp(b.1).expect("softmax output has no NaNs"))
        .expect("five classes");
    (LstmLabel::ORDER[idx], *conf)
}

/// Drives the classifier thread: runs inference each iteration, stores the
/// argmax label, and sets `bump` iff `label=BUMP AND confidence >= 0.6`
/// (§4.7). A `None` classifier (model failed to load, §7) leaves `bump`
/// permanently 0 and still polls, so the thread behaves uniformly either
/// way.
///
/// `gate`'s `calculate_model` word (SPEC_FULL.md Section C) controls
/// whether the label/bump are published upstream at all: while the
/// backend has `calculate_model=false` for the active ride, the thread
/// still polls but leaves `shared`'s previously published values in place,
/// so downstream readers (the `speedy_turn` gate, the CSV consumer) never
/// observe a label the backend didn't ask for.
pub fn run_classifier_loop(
    stop: &AtomicBool,
    poll: Duration,
    reader: BatchReader,
    gate: FlagReader,
    shared: Arc<SharedWarnings>,
    classifier: Option<Arc<dyn ClassifierBackend>>,
) {
    while !stop.load(Ordering::Relaxed) {
        if let Some(model) = &classifier {
            let (_, _, calculate_model) = gate.get();
            if calculate_model {
                let batch = reader.read_batch();
                let window = window_from_batch(&batch);
                let probs = model.infer(&window);
                let (label, confidence) = argmax(&probs);
                shared.set_label(label);
                shared
                    .set_bump(label == LstmLabel::Bump && confidence >= BUMP_CONFIDENCE_THRESHOLD);
            }
        }
        std::thread::sleep(poll);
    }
}

/// Per-ride bookkeeping for the CSV consumer: which ride is active, and the
/// timestamp of the most recently appended batch (duplicate suppression
/// across polls of the same unchanged shared-memory contents).
pub struct ConsumerState {
    active_ride: Option<String>,
    last_batch_t0: Option<f64>,
}

impl ConsumerState {
    pub fn new() -> Self {
        Self {
            active_ride: None,
            last_batch_t0: None,
        }
    }
}

impl Default for ConsumerState {
    fn default() -> Self {
        Self::new()
    }
}

/// One poll of the CSV consumer: reacts to ride-flag transitions and
/// appends newly observed batches to the ride's warnings CSV (§4.7 "Writer
/// discipline").
pub fn consumer_tick(
    flag: &FlagReader,
    reader: &BatchReader,
    shared: &SharedWarnings,
    csv: &CsvWriterHandle,
    state: &mut ConsumerState,
) {
    let (active_word, ride_id, _calculate_model) = flag.get();
    let active = active_word != 0;

    if active && state.active_ride.is_none() {
        let id = ride_id.to_string();
        csv.start_ride(id.clone());
        state.active_ride = Some(id);
        state.last_batch_t0 = None;
    } else if !active && state.active_ride.is_some() {
        csv.end_ride();
        state.active_ride = None;
        state.last_batch_t0 = None;
        return;
    }

    if state.active_ride.is_none() {
        return;
    }

    let batch = reader.read_batch();
    let t0 = batch[0].t_sec;
    if state.last_batch_t0 == Some(t0) {
        return;
    }
    state.last_batch_t0 = Some(t0);

    let label = shared.label();
    let warnings_csv = shared.snapshot().active_names_csv();
    csv.try_enqueue(ProcessedBatch {
        batch,
        lstm_label: label.as_str().to_string(),
        warnings_csv,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use ridesense_shm::batch::{BatchRow, BatchWriter, ROWS_PER_BATCH};
    use ridesense_shm::flag::FlagWriter;
    use std::sync::Mutex;

    // Both shared-memory regions have fixed OS-level names; serialize
    // tests that create/recreate them so they don't race each other.
    static TEST_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn idle_flag_never_starts_a_ride() {
        let _guard = TEST_LOCK.lock().unwrap();
        let flag = FlagWriter::create().expect("create flag");
        flag.set(0, 0, false);
        let mut batch_writer = BatchWriter::create().expect("create batch");
        batch_writer.write_batch(&[BatchRow::default(); ROWS_PER_BATCH]);

        let dir = tempfile::tempdir().unwrap();
        let (csv, join) = crate::csv_writer::spawn(dir.path().to_path_buf());
        let flag_reader = FlagReader::attach().unwrap();
        let batch_reader = BatchReader::attach().unwrap();
        let shared = SharedWarnings::new();
        let mut state = ConsumerState::new();

        consumer_tick(&flag_reader, &batch_reader, &shared, &csv, &mut state);
        drop(csv);
        join.join().unwrap();

        assert!(!dir.path().join("warnings_0.csv").exists());
    }

    #[test]
    fn active_flag_opens_csv_and_appends_each_new_batch_once() {
        let _guard = TEST_LOCK.lock().unwrap();
        let flag = FlagWriter::create().expect("create flag");
        flag.set(1, 9, false);
        let mut batch_writer = BatchWriter::create().expect("create batch");
        let mut batch = [BatchRow::default(); ROWS_PER_BATCH];
        batch[0].t_sec = 1.0;
        batch_writer.write_batch(&batch);

        let dir = tempfile::tempdir().unwrap();
        let (csv, join) = crate::csv_writer::spawn(dir.path().to_path_buf());
        let flag_reader = FlagReader::attach().unwrap();
        let batch_reader = BatchReader::attach().unwrap();
        let shared = SharedWarnings::new();
        shared.set_overspeed(true);
        let mut state = ConsumerState::new();

        // Same batch polled twice: appended only once.
        consumer_tick(&flag_reader, &batch_reader, &shared, &csv, &mut state);
        consumer_tick(&flag_reader, &batch_reader, &shared, &csv, &mut state);

        // A new batch arrives: appended again.
        batch[0].t_sec = 2.0;
        batch_writer.write_batch(&batch);
        consumer_tick(&flag_reader, &batch_reader, &shared, &csv, &mut state);

        flag.set(0, 9, false);
        consumer_tick(&flag_reader, &batch_reader, &shared, &csv, &mut state);
        drop(csv);
        join.join().unwrap();

        let contents = std::fs::read_to_string(dir.path().join("warnings_9.csv")).unwrap();
        // Header + two batches of 104 rows each.
        assert_eq!(contents.lines().count(), 1 + 2 * ROWS_PER_BATCH);
        assert!(contents.contains("overspeed"));
    }

    #[test]
    fn classifier_label_and_bump_follow_argmax_and_confidence_gate() {
        let probs = [0.1f32, 0.05, 0.05, 0.1, 0.7];
        let (label, conf) = argmax(&probs);
        assert_eq!(label, LstmLabel::Straight);
        assert!((conf - 0.7).abs() < 1e-6);
    }

    /// Always predicts `BUMP` with confidence 1.0, to exercise the
    /// `calculate_model` gate without a real model artifact.
    struct FixedBumpClassifier;

    impl crate::classifier::ClassifierBackend for FixedBumpClassifier {
        fn infer(&self, _window: &crate::classifier::Window) -> [f32; 5] {
            [1.0, 0.0, 0.0, 0.0, 0.0] // LstmLabel::ORDER: BUMP,LEFT,RIGHT,STOP,STRAIGHT
        }
    }

    #[test]
    fn classifier_loop_publishes_nothing_until_calculate_model_gate_is_set() {
        let _guard = TEST_LOCK.lock().unwrap();
        let flag = FlagWriter::create().expect("create flag");
        flag.set(1, 9, false);
        let mut batch_writer = BatchWriter::create().expect("create batch");
        batch_writer.write_batch(&[BatchRow::default(); ROWS_PER_BATCH]);

        let reader = BatchReader::attach().unwrap();
        let gate = FlagReader::attach().unwrap();
        let shared = Arc::new(SharedWarnings::new());
        let stop = AtomicBool::new(false);
        let classifier: Option<Arc<dyn ClassifierBackend>> = Some(Arc::new(FixedBumpClassifier));

        std::thread::scope(|s| {
            s.spawn(|| {
                run_classifier_loop(
                    &stop,
                    Duration::from_millis(2),
                    reader,
                    gate,
                    shared.clone(),
                    classifier,
                );
            });

            std::thread::sleep(Duration::from_millis(20));
            assert_eq!(shared.label(), LstmLabel::Straight);
            assert!(!shared.snapshot().bump);

            flag.set(1, 9, true);
            std::thread::sleep(Duration::from_millis(20));
            stop.store(true, Ordering::Relaxed);
        });

        assert_eq!(shared.label(), LstmLabel::Bump);
        assert!(shared.snapshot().bump);
    }
}
