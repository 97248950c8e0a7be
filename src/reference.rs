//! Side-by-side check of a learned model against a solution computed elsewhere.
//!
//! The reference is a directory with `D.csv`, `E.csv`, `Z.csv` and, optionally,
//! `objective.csv` (one value per outer iteration, last one is final).
use std::fmt;
use std::path::Path;

use log::{info, warn};
use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::dictionary::{DictionaryModel, SPARSITY_TOL};
use crate::error::{Error, Result};
use crate::io::read_dense_csv;
use crate::linalg;

#[derive(Clone, Debug)]
pub struct ReferenceSolution {
    pub dictionary: Array2<f64>,
    pub encoder: Array2<f64>,
    pub codes: Array2<f64>,
    pub objective: Option<f64>,
}

impl ReferenceSolution {
    pub fn load(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        info!("Loading reference solution from {}", dir.display());
        let dictionary = read_dense_csv(dir.join("D.csv"))?;
        let encoder = read_dense_csv(dir.join("E.csv"))?;
        let codes = read_dense_csv(dir.join("Z.csv"))?;

        let objective_path = dir.join("objective.csv");
        let objective = if objective_path.exists() {
            read_dense_csv(&objective_path)?.iter().last().copied()
        } else {
            None
        };

        Ok(Self {
            dictionary,
            encoder,
            codes,
            objective,
        })
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Comparison {
    /// ||D - D_ref|| / ||D_ref||
    pub dictionary_error: f64,
    pub encoder_error: f64,
    pub codes_error: f64,
    pub objective: f64,
    pub reference_objective: Option<f64>,
    /// (J - J_ref) / |J_ref|
    pub objective_gap: Option<f64>,
    pub code_sparsity: f64,
    pub reference_code_sparsity: f64,
    pub tolerance: f64,
    pub matches: bool,
}

fn check_shape(what: &str, ours: &Array2<f64>, theirs: &Array2<f64>) -> Result<()> {
    if ours.dim() != theirs.dim() {
        return Err(Error::Shape {
            what: what.to_string(),
            expected: ours.dim(),
            got: theirs.dim(),
        });
    }
    Ok(())
}

/// Compare `model` with `reference`. The verdict holds when every relative matrix
/// error, and the objective gap if known, is within `tolerance`.
pub fn compare(
    model: &DictionaryModel,
    reference: &ReferenceSolution,
    tolerance: f64,
) -> Result<Comparison> {
    check_shape("dictionary", &model.dictionary, &reference.dictionary)?;
    check_shape("encoder", &model.encoder, &reference.encoder)?;
    check_shape("codes", &model.codes, &reference.codes)?;

    let dictionary_error = linalg::relative_error(&model.dictionary, &reference.dictionary);
    let encoder_error = linalg::relative_error(&model.encoder, &reference.encoder);
    let codes_error = linalg::relative_error(&model.codes, &reference.codes);

    let objective = model.final_objective();
    let objective_gap = reference
        .objective
        .map(|r| (objective - r) / r.abs().max(f64::MIN_POSITIVE));

    let matches = dictionary_error <= tolerance
        && encoder_error <= tolerance
        && codes_error <= tolerance
        && objective_gap.map(|g| g.abs() <= tolerance).unwrap_or(true);

    let cmp = Comparison {
        dictionary_error,
        encoder_error,
        codes_error,
        objective,
        reference_objective: reference.objective,
        objective_gap,
        code_sparsity: linalg::sparsity(&model.codes, SPARSITY_TOL),
        reference_code_sparsity: linalg::sparsity(&reference.codes, SPARSITY_TOL),
        tolerance,
        matches,
    };

    if cmp.matches {
        info!("Model matches the reference within {:.1e}", tolerance);
    } else {
        warn!("Model differs from the reference:\n{}", cmp);
    }
    Ok(cmp)
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Reference comparison (tolerance {:.1e}):", self.tolerance)?;
        writeln!(f, "  D relative error: {:.4e}", self.dictionary_error)?;
        writeln!(f, "  E relative error: {:.4e}", self.encoder_error)?;
        writeln!(f, "  Z relative error: {:.4e}", self.codes_error)?;
        match (self.reference_objective, self.objective_gap) {
            (Some(r), Some(g)) => writeln!(
                f,
                "  Objective: {:.6e} vs {:.6e} (gap {:+.3e})",
                self.objective, r, g
            )?,
            _ => writeln!(f, "  Objective: {:.6e} (no reference value)", self.objective)?,
        }
        writeln!(
            f,
            "  Code sparsity: {:.1}% vs {:.1}%",
            self.code_sparsity * 100.0,
            self.reference_code_sparsity * 100.0
        )?;
        writeln!(f, "  Matches: {}", self.matches)
    }
}
