//! Dumping results to disk for the next pipeline stage.
//!
//! Dense matrices are header-less CSV, sparse matrices are `row,col,value`
//! triplets with a header, summaries are pretty-printed JSON.
use std::fs;
use std::path::Path;

use log::{debug, info};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use sprs::CsMat;

use crate::dictionary::{DictionaryModel, IterationRecord};
use crate::error::{Error, Result};
use crate::graph::{GraphLaplacian, GraphParams, LaplacianStats};

pub fn ensure_dir(dir: impl AsRef<Path>) -> Result<()> {
    let dir = dir.as_ref();
    fs::create_dir_all(dir).map_err(|e| Error::io(dir, e))
}

pub fn write_dense_csv(path: impl AsRef<Path>, m: &Array2<f64>) -> Result<()> {
    let path = path.as_ref();
    let mut wtr = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path)
        .map_err(|e| Error::csv(path, e))?;
    for row in m.rows() {
        wtr.write_record(row.iter().map(|v| v.to_string()))
            .map_err(|e| Error::csv(path, e))?;
    }
    wtr.flush().map_err(|e| Error::io(path, e))?;
    debug!("Wrote {}×{} matrix to {}", m.nrows(), m.ncols(), path.display());
    Ok(())
}

pub fn read_dense_csv(path: impl AsRef<Path>) -> Result<Array2<f64>> {
    let path = path.as_ref();
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| Error::csv(path, e))?;

    let mut flat = Vec::new();
    let mut ncols = None;
    let mut nrows = 0usize;
    for (line, record) in rdr.records().enumerate() {
        let record = record.map_err(|e| Error::csv(path, e))?;
        if *ncols.get_or_insert(record.len()) != record.len() {
            return Err(Error::Parse {
                line: line + 1,
                message: format!("expected {} columns, got {}", ncols.unwrap_or(0), record.len()),
            });
        }
        for field in record.iter() {
            let v = field.parse::<f64>().map_err(|e| Error::Parse {
                line: line + 1,
                message: e.to_string(),
            })?;
            flat.push(v);
        }
        nrows += 1;
    }

    let ncols = ncols.unwrap_or(0);
    Array2::from_shape_vec((nrows, ncols), flat)
        .map_err(|e| Error::invalid(format!("{}: {}", path.display(), e)))
}

pub fn write_sparse_triplets(path: impl AsRef<Path>, m: &CsMat<f64>) -> Result<()> {
    let path = path.as_ref();
    let mut wtr = csv::Writer::from_path(path).map_err(|e| Error::csv(path, e))?;
    wtr.write_record(["row", "col", "value"])
        .map_err(|e| Error::csv(path, e))?;
    for (i, row) in m.outer_iterator().enumerate() {
        for (j, &v) in row.iter() {
            wtr.write_record(&[i.to_string(), j.to_string(), v.to_string()])
                .map_err(|e| Error::csv(path, e))?;
        }
    }
    wtr.flush().map_err(|e| Error::io(path, e))?;
    debug!("Wrote {} triplets to {}", m.nnz(), path.display());
    Ok(())
}

pub fn write_json<T: Serialize>(path: impl AsRef<Path>, value: &T) -> Result<()> {
    let path = path.as_ref();
    let text = serde_json::to_string_pretty(value)?;
    fs::write(path, text).map_err(|e| Error::io(path, e))
}

/// What the graph stage leaves for later stages besides the matrices.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GraphSummary {
    pub params: GraphParams,
    pub stats: LaplacianStats,
    pub lmax: Option<f64>,
    pub labels: Vec<String>,
}

/// Writes `adjacency.csv`, `laplacian.csv` (triplets) and `graph.json` into `dir`.
pub fn save_graph(
    dir: impl AsRef<Path>,
    gl: &GraphLaplacian,
    lmax: Option<f64>,
    labels: &[String],
) -> Result<()> {
    let dir = dir.as_ref();
    ensure_dir(dir)?;
    write_sparse_triplets(dir.join("adjacency.csv"), &gl.adjacency)?;
    write_sparse_triplets(dir.join("laplacian.csv"), &gl.matrix)?;
    let summary = GraphSummary {
        params: gl.graph_params.clone(),
        stats: gl.statistics(),
        lmax,
        labels: labels.to_vec(),
    };
    write_json(dir.join("graph.json"), &summary)?;
    info!("Graph saved to {}", dir.display());
    Ok(())
}

pub fn write_history_csv(path: impl AsRef<Path>, history: &[IterationRecord]) -> Result<()> {
    let path = path.as_ref();
    let mut wtr = csv::Writer::from_path(path).map_err(|e| Error::csv(path, e))?;
    wtr.write_record([
        "iteration",
        "total",
        "reconstruction",
        "encoder",
        "sparsity",
        "smoothness",
        "z_iterations",
        "d_iterations",
        "e_iterations",
        "code_sparsity",
    ])
    .map_err(|e| Error::csv(path, e))?;
    for r in history {
        wtr.write_record(&[
            r.iteration.to_string(),
            r.terms.total.to_string(),
            r.terms.reconstruction.to_string(),
            r.terms.encoder.to_string(),
            r.terms.sparsity.to_string(),
            r.terms.smoothness.to_string(),
            r.z_iterations.to_string(),
            r.d_iterations.to_string(),
            r.e_iterations.to_string(),
            r.code_sparsity.to_string(),
        ])
        .map_err(|e| Error::csv(path, e))?;
    }
    wtr.flush().map_err(|e| Error::io(path, e))?;
    Ok(())
}

/// Writes `D.csv`, `E.csv`, `Z.csv`, `objective.csv`, `history.csv` and `params.json`.
/// The layout matches what `reference::ReferenceSolution::load` reads back.
pub fn save_model(dir: impl AsRef<Path>, model: &DictionaryModel) -> Result<()> {
    let dir = dir.as_ref();
    ensure_dir(dir)?;
    write_dense_csv(dir.join("D.csv"), &model.dictionary)?;
    write_dense_csv(dir.join("E.csv"), &model.encoder)?;
    write_dense_csv(dir.join("Z.csv"), &model.codes)?;
    let objective: Vec<f64> = model.history.iter().map(|r| r.terms.total).collect();
    let objective = Array2::from_shape_vec((objective.len(), 1), objective)
        .map_err(|e| Error::invalid(e.to_string()))?;
    write_dense_csv(dir.join("objective.csv"), &objective)?;
    write_history_csv(dir.join("history.csv"), &model.history)?;
    write_json(dir.join("params.json"), &model.params)?;
    info!("Model saved to {}", dir.display());
    Ok(())
}
