//! Feature vectors: loading, validation and per-feature scaling.
//!
//! Samples are rows (N×F). Two on-disk layouts are accepted:
//!
//! - CSV, one sample per row, optional header row;
//! - the labelled block format, one `label; v1,v2,...` line per sample.
//!
//! ```
//! use genregraph::features::{FeatureMatrix, ScalingMode};
//!
//! let fm = FeatureMatrix::parse_block("a; 1.0, 2.0\nb; 3.0, 6.0\n").unwrap();
//! assert_eq!(fm.shape(), (2, 2));
//!
//! let scaled = fm.scale(ScalingMode::MinMax).unwrap();
//! assert_eq!(scaled.row(1), vec![1.0, 1.0]);
//! ```
use std::fs;
use std::path::Path;

use log::{debug, info, trace, warn};
use ndarray::Array2 as NdArray2;
use serde::{Deserialize, Serialize};
use smartcore::api::{Transformer, UnsupervisedEstimator};
use smartcore::linalg::basic::arrays::{Array, Array2, MutArray};
use smartcore::linalg::basic::matrix::DenseMatrix;
use smartcore::preprocessing::numerical::{StandardScaler, StandardScalerParameters};

use crate::error::{Error, Result};

/// Per-feature rescaling applied before the KNN search.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScalingMode {
    None,
    /// Each feature mapped to [0, 1]
    #[default]
    MinMax,
    /// Zero mean, unit variance
    Standard,
}

#[derive(Clone, Debug)]
pub struct FeatureMatrix {
    pub labels: Vec<String>,
    pub data: DenseMatrix<f64>,
}

impl FeatureMatrix {
    /// Build from sample rows; labels default to the row index.
    pub fn from_rows(rows: Vec<Vec<f64>>) -> Result<Self> {
        let labels = (0..rows.len()).map(|i| i.to_string()).collect();
        Self::with_labels(labels, rows)
    }

    pub fn with_labels(labels: Vec<String>, rows: Vec<Vec<f64>>) -> Result<Self> {
        if rows.is_empty() {
            return Err(Error::invalid("feature matrix has no samples"));
        }
        if labels.len() != rows.len() {
            return Err(Error::invalid(format!(
                "{} labels for {} samples",
                labels.len(),
                rows.len()
            )));
        }
        let nfeatures = rows[0].len();
        if nfeatures == 0 {
            return Err(Error::invalid("samples have no features"));
        }
        for (i, row) in rows.iter().enumerate() {
            if row.len() != nfeatures {
                return Err(Error::Shape {
                    what: format!("sample {}", i),
                    expected: (1, nfeatures),
                    got: (1, row.len()),
                });
            }
            if let Some(j) = row.iter().position(|v| !v.is_finite()) {
                return Err(Error::invalid(format!(
                    "non-finite value at sample {}, feature {}",
                    i, j
                )));
            }
        }

        let data = DenseMatrix::from_2d_vec(&rows)?;
        debug!("Feature matrix: {} samples × {} features", rows.len(), nfeatures);
        Ok(Self { labels, data })
    }

    /// Parse the labelled block format: `label; v1,v2,...` per line.
    /// Blank lines and lines starting with `#` are skipped.
    pub fn parse_block(block: &str) -> Result<Self> {
        let mut labels = Vec::new();
        let mut rows = Vec::new();

        for (lineno, line) in block.lines().enumerate() {
            let l = line.trim();
            if l.is_empty() || l.starts_with('#') {
                continue;
            }
            let (label, rest) = match l.split_once(';') {
                Some((label, rest)) => (label.trim().to_string(), rest.trim()),
                None => (rows.len().to_string(), l),
            };

            let vals = rest
                .split(',')
                .map(|s| s.trim().parse::<f64>())
                .collect::<std::result::Result<Vec<f64>, _>>()
                .map_err(|e| Error::Parse {
                    line: lineno + 1,
                    message: e.to_string(),
                })?;

            labels.push(label);
            rows.push(vals);
        }

        Self::with_labels(labels, rows)
    }

    /// Read numeric CSV. A first row that does not parse as numbers is a header.
    pub fn parse_csv<R: std::io::Read>(reader: R) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(false)
            .trim(csv::Trim::All)
            .comment(Some(b'#'))
            .from_reader(reader);

        let mut rows = Vec::new();
        for (idx, record) in rdr.records().enumerate() {
            let record = record?;
            let parsed: std::result::Result<Vec<f64>, _> =
                record.iter().map(|s| s.parse::<f64>()).collect();
            match parsed {
                Ok(vals) => rows.push(vals),
                Err(_) if idx == 0 => {
                    trace!("Skipping CSV header: {:?}", record);
                }
                Err(e) => {
                    return Err(Error::Parse {
                        line: idx + 1,
                        message: e.to_string(),
                    });
                }
            }
        }

        Self::from_rows(rows)
    }

    /// Load features from disk, picking the parser by extension (`.csv` or block).
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Loading features from {}", path.display());
        let fm = match path.extension().and_then(|e| e.to_str()) {
            Some("csv") => {
                let file = fs::File::open(path).map_err(|e| Error::io(path, e))?;
                Self::parse_csv(file)?
            }
            _ => {
                let text = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
                Self::parse_block(&text)?
            }
        };
        info!(
            "Loaded {} samples with {} features",
            fm.nsamples(),
            fm.nfeatures()
        );
        Ok(fm)
    }

    pub fn shape(&self) -> (usize, usize) {
        self.data.shape()
    }

    pub fn nsamples(&self) -> usize {
        self.data.shape().0
    }

    pub fn nfeatures(&self) -> usize {
        self.data.shape().1
    }

    pub fn row(&self, i: usize) -> Vec<f64> {
        self.data.get_row(i).iterator(0).copied().collect()
    }

    pub fn to_rows(&self) -> Vec<Vec<f64>> {
        (0..self.nsamples()).map(|i| self.row(i)).collect()
    }

    /// Samples as columns (F×N), the layout used by dictionary learning.
    pub fn to_sample_columns(&self) -> NdArray2<f64> {
        let (n, f) = self.shape();
        NdArray2::from_shape_fn((f, n), |(j, i)| *self.data.get((i, j)))
    }

    /// Return a rescaled copy.
    pub fn scale(&self, mode: ScalingMode) -> Result<Self> {
        let data = match mode {
            ScalingMode::None => {
                trace!("Skipping feature scaling");
                self.data.clone()
            }
            ScalingMode::MinMax => {
                debug!("Scaling features to [0, 1]");
                min_max(&self.data)
            }
            ScalingMode::Standard => {
                debug!("Standardising features to zero mean and unit variance");
                let scaler =
                    StandardScaler::fit(&self.data, StandardScalerParameters::default())?;
                let mut scaled = scaler.transform(&self.data)?;
                let (n, f) = scaled.shape();
                let mut degenerate = 0usize;
                for i in 0..n {
                    for j in 0..f {
                        if !scaled.get((i, j)).is_finite() {
                            scaled.set((i, j), 0.0);
                            degenerate += 1;
                        }
                    }
                }
                if degenerate > 0 {
                    warn!("{} entries of constant features set to 0 after scaling", degenerate);
                }
                scaled
            }
        };

        Ok(Self {
            labels: self.labels.clone(),
            data,
        })
    }
}

fn min_max(data: &DenseMatrix<f64>) -> DenseMatrix<f64> {
    let (n, f) = data.shape();
    let mut out = data.clone();

    for j in 0..f {
        let (lo, hi) = (0..n).fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), i| {
            let v = *data.get((i, j));
            (lo.min(v), hi.max(v))
        });
        let range = hi - lo;
        if range <= 1e-15 {
            trace!("Feature {} is constant, mapping to 0", j);
        }
        for i in 0..n {
            let v = if range > 1e-15 {
                (*data.get((i, j)) - lo) / range
            } else {
                0.0
            };
            out.set((i, j), v);
        }
    }

    out
}
