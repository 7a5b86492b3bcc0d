//! The learned turn/bump classifier (§4.7 "Learned classifier").
//!
//! Isolated behind an inference trait per the design note in §9 ("Model
//! runtime should be isolated behind an inference trait with inputs
//! `[104][7] f32` and output `[5] f32`; any backend ... can satisfy it").
//! [`LstmClassifier`] is the one backend this crate ships: a small
//! `LSTM(units=U) -> Dropout(0.5) -> Dense(D, relu) -> Dense(5, softmax)`
//! evaluated with `ndarray`. Dropout is the identity at inference time.

use ndarray::{Array1, Array2, Axis};
use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

/// Feature order fed into the classifier each batch (§4.7).
pub const FEATURES_PER_STEP: usize = 7;
/// Timesteps per inference window, one shared-memory batch (§4.7).
pub const WINDOW_LEN: usize = 104;
/// Output classes, alphabetical order `[BUMP, LEFT, RIGHT, STOP, STRAIGHT]`.
pub const NUM_CLASSES: usize = 5;

/// A `(104, 7)` feature window, feature order
/// `[acc_x, acc_y, acc_z, gyro_x, gyro_y, gyro_z, speed]`.
pub type Window = [[f32; FEATURES_PER_STEP]; WINDOW_LEN];

/// Backend contract the Warning Engine drives the classifier through.
pub trait ClassifierBackend: Send + Sync {
    /// Run one forward pass, returning the 5-way softmax distribution.
    fn infer(&self, window: &Window) -> [f32; NUM_CLASSES];
}

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("failed to read model artifact {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse model artifact {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("model artifact has inconsistent tensor shapes: {0}")]
    Shape(String),
}

/// On-disk weights artifact. Architecture is fixed
/// (`LSTM(U) -> Dropout(0.5) -> Dense(D, relu) -> Dense(5, softmax)`); `U`
/// and `D` are inferred from the tensor shapes, never stored explicitly
/// (§4.7 "Model loader contract").
#[derive(Debug, Deserialize)]
struct ModelArtifact {
    /// Shape `(7, 4U)`.
    lstm_kernel: Vec<Vec<f32>>,
    /// Shape `(U, 4U)`.
    lstm_recurrent_kernel: Vec<Vec<f32>>,
    /// Shape `(4U,)`.
    lstm_bias: Vec<f32>,
    /// Shape `(U, D)`.
    dense1_kernel: Vec<Vec<f32>>,
    /// Shape `(D,)`.
    dense1_bias: Vec<f32>,
    /// Shape `(D, 5)`.
    dense2_kernel: Vec<Vec<f32>>,
    /// Shape `(5,)`.
    dense2_bias: Vec<f32>,
}

fn to_array2(rows: &[Vec<f32>]) -> Array2<f32> {
    let nrows = rows.len();
    let ncols = rows.first().map_or(0, |r| r.len());
    let flat: Vec<f32> = rows.iter().flatten().copied().collect();
    Array2::from_shape_vec((nrows, ncols), flat).expect("caller validated rectangular shape")
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// LSTM-backed classifier, grounded on the `{LSTM -> Dropout -> Dense ->
/// Dense}` architecture named in §4.7.
#[derive(Debug)]
pub struct LstmClassifier {
    /// Hidden-unit count, inferred as `kernel.shape[1] / 4`.
    units: usize,
    /// Intermediate dense width, inferred from `dense1_kernel`.
    dense_width: usize,
    kernel: Array2<f32>,
    recurrent_kernel: Array2<f32>,
    bias: Array1<f32>,
    dense1_kernel: Array2<f32>,
    dense1_bias: Array1<f32>,
    dense2_kernel: Array2<f32>,
    dense2_bias: Array1<f32>,
}

impl LstmClassifier {
    /// Load and validate a weights artifact, inferring `U` and `D` from
    /// its tensor shapes (§4.7). Returns an error (never panics) on any
    /// shape mismatch so the caller can disable the classifier per §7.
    pub fn load(path: &Path) -> Result<Self, ModelError> {
        let text = std::fs::read_to_string(path).map_err(|source| ModelError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let artifact: ModelArtifact =
            serde_json::from_str(&text).map_err(|source| ModelError::Parse {
                path: path.display().to_string(),
                source,
            })?;
        Self::from_artifact(artifact)
    }

    fn from_artifact(a: ModelArtifact) -> Result<Self, ModelError> {
        if a.lstm_kernel.len() != FEATURES_PER_STEP {
            return Err(ModelError::Shape(format!(
                "lstm_kernel has {} input rows, expected {FEATURES_PER_STEP}",
                a.lstm_kernel.len()
            )));
        }
        let four_u = a
            .lstm_kernel
            .first()
            .map_or(0, |row| row.len());
        if four_u == 0 || !four_u.is_multiple_of(4) {
            return Err(ModelError::Shape(format!(
                "lstm_kernel column count {four_u} is not a positive multiple of 4"
            )));
        }
        let units = four_u / 4;

        if a.lstm_recurrent_kernel.len() != units
            || a.lstm_recurrent_kernel.iter().any(|r| r.len() != four_u)
        {
            return Err(ModelError::Shape(format!(
                "lstm_recurrent_kernel must be ({units}, {four_u})"
            )));
        }
        if a.lstm_bias.len() != four_u {
            return Err(ModelError::Shape(format!(
                "lstm_bias must have {four_u} elements"
            )));
        }
        if a.dense1_kernel.len() != units {
            return Err(ModelError::Shape(format!(
                "dense1_kernel must have {units} input rows"
            )));
        }
        let dense_width = a.dense1_kernel.first().map_or(0, |r| r.len());
        if dense_width == 0 || a.dense1_kernel.iter().any(|r| r.len() != dense_width) {
            return Err(ModelError::Shape(
                "dense1_kernel rows have inconsistent width".into(),
            ));
        }
        if a.dense1_bias.len() != dense_width {
            return Err(ModelError::Shape(format!(
                "dense1_bias must have {dense_width} elements"
            )));
        }
        if a.dense2_kernel.len() != dense_width
            || a.dense2_kernel.iter().any(|r| r.len() != NUM_CLASSES)
        {
            return Err(ModelError::Shape(format!(
                "dense2_kernel must be ({dense_width}, {NUM_CLASSES})"
            )));
        }
        if a.dense2_bias.len() != NUM_CLASSES {
            return Err(ModelError::Shape(format!(
                "dense2_bias must have {NUM_CLASSES} elements"
            )));
        }

        Ok(Self {
            units,
            dense_width,
            kernel: to_array2(&a.lstm_kernel),
            recurrent_kernel: to_array2(&a.lstm_recurrent_kernel),
            bias: Array1::from(a.lstm_bias),
            dense1_kernel: to_array2(&a.dense1_kernel),
            dense1_bias: Array1::from(a.dense1_bias),
            dense2_kernel: to_array2(&a.dense2_kernel),
            dense2_bias: Array1::from(a.dense2_bias),
        })
    }

    pub fn units(&self) -> usize {
        self.units
    }

    pub fn dense_width(&self) -> usize {
        self.dense_width
    }
}

impl ClassifierBackend for LstmClassifier {
    fn infer(&self, window: &Window) -> [f32; NUM_CLASSES] {
        let u = self.units;
        let mut h = Array1::<f32>::zeros(u);
        let mut c = Array1::<f32>::zeros(u);

        for step in window.iter() {
            let x = Array1::from(step.to_vec());
            // Gate pre-activations, Keras order [input, forget, cell, output].
            let z = x.dot(&self.kernel) + h.dot(&self.recurrent_kernel) + &self.bias;

            let i_gate = z.slice(ndarray::s![0..u]).mapv(sigmoid);
            let f_gate = z.slice(ndarray::s![u..2 * u]).mapv(sigmoid);
            let c_tilde = z.slice(ndarray::s![2 * u..3 * u]).mapv(f32::tanh);
            let o_gate = z.slice(ndarray::s![3 * u..4 * u]).mapv(sigmoid);

            c = &f_gate * &c + &i_gate * &c_tilde;
            h = &o_gate * &c.mapv(f32::tanh);
        }

        let dense1 = (h.dot(&self.dense1_kernel) + &self.dense1_bias).mapv(|v| v.max(0.0));
        let logits = dense1.dot(&self.dense2_kernel) + &self.dense2_bias;

        let max = logits.fold(f32::NEG_INFINITY, |acc, &v| acc.max(v));
        let exp = logits.mapv(|v| (v - max).exp());
        let sum = exp.sum();
        let probs = exp.mapv(|v| v / sum);

        let mut out = [0.0f32; NUM_CLASSES];
        out.copy_from_slice(probs.as_slice().expect("contiguous"));
        let _ = Axis(0);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    /// Builds a tiny, deterministic artifact with U=2, D=3 so the forward
    /// pass and shape-inference logic are both exercised cheaply.
    fn tiny_artifact_json() -> String {
        let four_u = 8; // U = 2
        let u = 2;
        let d = 3;
        serde_json::json!({
            "lstm_kernel": vec![vec![0.01f32; four_u]; FEATURES_PER_STEP],
            "lstm_recurrent_kernel": vec![vec![0.01f32; four_u]; u],
            "lstm_bias": vec![0.0f32; four_u],
            "dense1_kernel": vec![vec![0.1f32; d]; u],
            "dense1_bias": vec![0.0f32; d],
            "dense2_kernel": vec![vec![0.1f32; NUM_CLASSES]; d],
            "dense2_bias": vec![0.0f32; NUM_CLASSES],
        })
        .to_string()
    }

    #[test]
    fn infers_units_and_dense_width_from_shapes() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(tiny_artifact_json().as_bytes()).unwrap();
        let model = LstmClassifier::load(f.path()).expect("load tiny artifact");
        assert_eq!(model.units(), 2);
        assert_eq!(model.dense_width(), 3);
    }

    #[test]
    fn infer_produces_a_valid_softmax_distribution() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(tiny_artifact_json().as_bytes()).unwrap();
        let model = LstmClassifier::load(f.path()).expect("load tiny artifact");

        let window: Window = [[0.1f32; FEATURES_PER_STEP]; WINDOW_LEN];
        let probs = model.infer(&window);

        let sum: f32 = probs.iter().sum();
        assert!((sum - 1.0).abs() < 1e-4, "softmax must sum to 1, got {sum}");
        assert!(probs.iter().all(|p| (0.0..=1.0).contains(p)));
    }

    #[test]
    fn rejects_mismatched_recurrent_kernel_shape() {
        let mut bad: serde_json::Value = serde_json::from_str(&tiny_artifact_json()).unwrap();
        bad["lstm_recurrent_kernel"] = serde_json::json!(vec![vec![0.0f32; 8]]); // only 1 row, wants 2
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(bad.to_string().as_bytes()).unwrap();
        assert!(LstmClassifier::load(f.path()).is_err());
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = LstmClassifier::load(Path::new("/nonexistent/model.json")).unwrap_err();
        assert!(matches!(err, ModelError::Io { .. }));
    }
}
