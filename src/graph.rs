use std::collections::VecDeque;
use std::fmt;

use log::{debug, info, trace, warn};
use serde::{Deserialize, Serialize};
use sprs::CsMat;

use crate::features::ScalingMode;
use crate::knn::Metric;
use crate::linalg::sparse_lmax;

/// How the directed k-NN relation is turned into an undirected graph.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Symmetrize {
    /// `W = max(W, Wᵀ)`
    #[default]
    Max,
    /// `W = (W + Wᵀ) / 2`
    Average,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LaplacianKind {
    /// `L = D - W`
    Combinatorial,
    /// `L = I - D^-1/2 W D^-1/2`
    #[default]
    Normalized,
    /// `L = I - D^-1 W`
    RandomWalk,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GraphParams {
    pub k: usize,
    pub metric: Metric,
    /// multiplier on the mean k-th neighbour distance when `sigma` is None
    pub kernel_scale: f64,
    pub sigma: Option<f64>,
    pub symmetrize: Symmetrize,
    pub laplacian: LaplacianKind,
    pub scaling: ScalingMode,
}

impl Default for GraphParams {
    fn default() -> Self {
        Self {
            k: 10,
            metric: Metric::Euclidean,
            kernel_scale: 1.0,
            sigma: None,
            symmetrize: Symmetrize::Max,
            laplacian: LaplacianKind::Normalized,
            scaling: ScalingMode::MinMax,
        }
    }
}

// Approximate equality on the float fields
impl PartialEq for GraphParams {
    fn eq(&self, other: &Self) -> bool {
        self.k == other.k
            && self.metric == other.metric
            && approx::relative_eq!(self.kernel_scale, other.kernel_scale)
            && match (self.sigma, other.sigma) {
                (None, None) => true,
                (Some(a), Some(b)) => approx::relative_eq!(a, b),
                _ => false,
            }
            && self.symmetrize == other.symmetrize
            && self.laplacian == other.laplacian
            && self.scaling == other.scaling
    }
}

impl Eq for GraphParams {}

/// Sparse graph Laplacian over samples, with the adjacency it was built from.
#[derive(Debug, Clone)]
pub struct GraphLaplacian {
    /// CSR Laplacian (nnodes × nnodes)
    pub matrix: CsMat<f64>,
    /// CSR symmetric weight matrix W, no diagonal
    pub adjacency: CsMat<f64>,
    pub degrees: Vec<f64>,
    pub nnodes: usize,
    /// kernel bandwidth actually used
    pub sigma: f64,
    pub graph_params: GraphParams,
}

impl GraphLaplacian {
    pub fn shape(&self) -> (usize, usize) {
        self.matrix.shape()
    }

    pub fn kind(&self) -> LaplacianKind {
        self.graph_params.laplacian
    }

    pub fn get(&self, i: usize, j: usize) -> f64 {
        assert!(
            i < self.nnodes && j < self.nnodes,
            "Index out of bounds: ({}, {}) for {}x{} matrix",
            i,
            j,
            self.nnodes,
            self.nnodes
        );
        self.matrix.get(i, j).copied().unwrap_or(0.0)
    }

    pub fn weight(&self, i: usize, j: usize) -> f64 {
        self.adjacency.get(i, j).copied().unwrap_or(0.0)
    }

    /// Number of undirected edges.
    pub fn nedges(&self) -> usize {
        self.adjacency.nnz() / 2
    }

    pub fn nnz(&self) -> usize {
        self.matrix.nnz()
    }

    pub fn sparsity(&self) -> f64 {
        let total = (self.nnodes * self.nnodes) as f64;
        (total - self.nnz() as f64) / total
    }

    /// y = L x
    pub fn multiply_vector(&self, x: &[f64]) -> Vec<f64> {
        assert_eq!(
            x.len(),
            self.nnodes,
            "Vector length {} must match number of nodes {}",
            x.len(),
            self.nnodes
        );
        self.matrix
            .outer_iterator()
            .map(|row| row.iter().map(|(j, &v)| v * x[j]).sum::<f64>())
            .collect()
    }

    /// R(L, x) = xᵀ L x / xᵀ x
    pub fn rayleigh_quotient(&self, x: &[f64]) -> f64 {
        let lx = self.multiply_vector(x);
        let num: f64 = x.iter().zip(lx.iter()).map(|(a, b)| a * b).sum();
        let den: f64 = x.iter().map(|&v| v * v).sum();
        if den > 1e-15 {
            num / den
        } else {
            warn!("Zero vector encountered in Rayleigh quotient computation");
            0.0
        }
    }

    pub fn is_symmetric(&self, tolerance: f64) -> bool {
        trace!("Checking matrix symmetry with tolerance {:.2e}", tolerance);
        let mut violations = 0;
        let mut max_asymmetry: f64 = 0.0;
        for (i, row) in self.matrix.outer_iterator().enumerate() {
            for (j, &v) in row.iter() {
                let back = self.matrix.get(j, i).copied().unwrap_or(0.0);
                let diff = (v - back).abs();
                max_asymmetry = max_asymmetry.max(diff);
                if diff > tolerance {
                    violations += 1;
                }
            }
        }
        debug!(
            "Symmetry check: {} violations, max asymmetry: {:.2e}",
            violations, max_asymmetry
        );
        violations == 0
    }

    /// Largest eigenvalue by power iteration. At most 2 for the normalized Laplacian.
    pub fn estimate_lmax(&self, maxit: usize, tol: f64) -> f64 {
        let lambda = sparse_lmax(&self.matrix, maxit, tol);
        debug!("Estimated lmax = {:.6}", lambda);
        lambda
    }

    /// Check the structural properties expected of `self.kind()`.
    pub fn verify_properties(&self, tolerance: f64) -> LaplacianValidation {
        info!(
            "Verifying {:?} Laplacian properties with tolerance {:.2e}",
            self.kind(),
            tolerance
        );
        let mut validation = LaplacianValidation::new();

        for (i, row) in self.matrix.outer_iterator().enumerate() {
            for (j, &v) in row.iter() {
                if i != j && v > tolerance {
                    validation.positive_off_diagonal.push((i, j, v));
                }
            }
        }

        match self.kind() {
            LaplacianKind::Combinatorial => {
                validation.max_row_sum_error = self.max_row_sum(|_| true, tolerance, &mut validation);
                for i in 0..self.nnodes {
                    let d = self.get(i, i);
                    if d < -tolerance {
                        validation.bad_diagonal.push((i, d));
                    }
                }
            }
            LaplacianKind::Normalized | LaplacianKind::RandomWalk => {
                for i in 0..self.nnodes {
                    let expected = if self.degrees[i] > 0.0 { 1.0 } else { 0.0 };
                    let d = self.get(i, i);
                    if (d - expected).abs() > tolerance {
                        validation.bad_diagonal.push((i, d));
                    }
                }
                if self.kind() == LaplacianKind::RandomWalk {
                    let degrees = &self.degrees;
                    validation.max_row_sum_error =
                        self.max_row_sum(|i| degrees[i] > 0.0, tolerance, &mut validation);
                } else {
                    // D^1/2 1 spans the null space
                    let v: Vec<f64> = self.degrees.iter().map(|d| d.sqrt()).collect();
                    let lv = self.multiply_vector(&v);
                    validation.max_row_sum_error =
                        lv.iter().fold(0.0_f64, |acc, x| acc.max(x.abs()));
                    for (i, x) in lv.iter().enumerate() {
                        if x.abs() > tolerance {
                            validation.row_sum_violations.push((i, *x));
                        }
                    }
                }
            }
        }

        validation.is_symmetric = self.is_symmetric(tolerance);
        let symmetric_ok =
            validation.is_symmetric || self.kind() == LaplacianKind::RandomWalk;

        validation.is_valid = validation.row_sum_violations.is_empty()
            && validation.bad_diagonal.is_empty()
            && validation.positive_off_diagonal.is_empty()
            && symmetric_ok;

        debug!("  Valid: {}", validation.is_valid);
        debug!("  Symmetric: {}", validation.is_symmetric);
        debug!("  Max row sum error: {:.2e}", validation.max_row_sum_error);
        if !validation.is_valid {
            warn!("Laplacian validation failed - matrix may have numerical issues");
        }
        validation
    }

    fn max_row_sum(
        &self,
        include: impl Fn(usize) -> bool,
        tolerance: f64,
        validation: &mut LaplacianValidation,
    ) -> f64 {
        let mut max_err: f64 = 0.0;
        for (i, row) in self.matrix.outer_iterator().enumerate() {
            if !include(i) {
                continue;
            }
            let s: f64 = row.iter().map(|(_, &v)| v).sum();
            max_err = max_err.max(s.abs());
            if s.abs() > tolerance {
                validation.row_sum_violations.push((i, s));
            }
        }
        max_err
    }

    /// Connected components of the adjacency, as a label per node.
    pub fn connected_components(&self) -> (usize, Vec<usize>) {
        let mut labels = vec![usize::MAX; self.nnodes];
        let mut ncomp = 0;
        let mut queue = VecDeque::new();

        for start in 0..self.nnodes {
            if labels[start] != usize::MAX {
                continue;
            }
            labels[start] = ncomp;
            queue.push_back(start);
            while let Some(u) = queue.pop_front() {
                if let Some(row) = self.adjacency.outer_view(u) {
                    for (v, _) in row.iter() {
                        if labels[v] == usize::MAX {
                            labels[v] = ncomp;
                            queue.push_back(v);
                        }
                    }
                }
            }
            ncomp += 1;
        }

        (ncomp, labels)
    }

    pub fn statistics(&self) -> LaplacianStats {
        trace!("Computing Laplacian statistics");
        let min_degree = self.degrees.iter().fold(f64::INFINITY, |acc, &x| acc.min(x));
        let max_degree = self.degrees.iter().fold(f64::NEG_INFINITY, |acc, &x| acc.max(x));
        let mean_degree = self.degrees.iter().sum::<f64>() / self.nnodes as f64;
        let isolated = self.degrees.iter().filter(|&&d| d <= 0.0).count();

        let mut histogram = [0usize; WEIGHT_BINS];
        for (i, row) in self.adjacency.outer_iterator().enumerate() {
            for (j, &w) in row.iter() {
                if i < j {
                    let bin = ((w * WEIGHT_BINS as f64).ceil() as usize).clamp(1, WEIGHT_BINS) - 1;
                    histogram[bin] += 1;
                }
            }
        }

        let (components, _) = self.connected_components();
        let stats = LaplacianStats {
            nnodes: self.nnodes,
            nedges: self.nedges(),
            nnz: self.nnz(),
            sparsity: self.sparsity(),
            min_degree,
            max_degree,
            mean_degree,
            isolated,
            components,
            sigma: self.sigma,
            weight_histogram: histogram.to_vec(),
        };

        debug!(
            "Computed statistics: {} nodes, {} edges, {} components, degree range [{:.6}, {:.6}]",
            stats.nnodes, stats.nedges, stats.components, stats.min_degree, stats.max_degree
        );
        stats
    }

    pub fn params(&self) -> &GraphParams {
        &self.graph_params
    }
}

/// Number of equal-width bins over (0, 1] in the edge weight histogram.
pub const WEIGHT_BINS: usize = 10;

#[derive(Debug, Clone)]
pub struct LaplacianValidation {
    pub is_valid: bool,
    pub is_symmetric: bool,
    pub max_row_sum_error: f64,
    pub row_sum_violations: Vec<(usize, f64)>,
    pub bad_diagonal: Vec<(usize, f64)>,
    pub positive_off_diagonal: Vec<(usize, usize, f64)>,
}

impl LaplacianValidation {
    fn new() -> Self {
        Self {
            is_valid: false,
            is_symmetric: false,
            max_row_sum_error: 0.0,
            row_sum_violations: Vec::new(),
            bad_diagonal: Vec::new(),
            positive_off_diagonal: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LaplacianStats {
    pub nnodes: usize,
    pub nedges: usize,
    pub nnz: usize,
    pub sparsity: f64,
    pub min_degree: f64,
    pub max_degree: f64,
    pub mean_degree: f64,
    pub isolated: usize,
    pub components: usize,
    pub sigma: f64,
    pub weight_histogram: Vec<usize>,
}

impl fmt::Display for GraphLaplacian {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "GraphLaplacian {:?} ({}×{}):", self.kind(), self.nnodes, self.nnodes)?;
        writeln!(f, "Parameters: {:?}", self.graph_params)?;

        if self.nnodes <= 10 {
            for i in 0..self.nnodes {
                write!(f, "Row {}: [", i)?;
                for j in 0..self.nnodes {
                    write!(f, "{:8.4} ", self.get(i, j))?;
                }
                writeln!(f, "]")?;
            }
        } else {
            write!(f, "{}", self.statistics())?;
        }
        Ok(())
    }
}

impl fmt::Display for LaplacianStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Laplacian Statistics:")?;
        writeln!(f, "  Nodes: {}", self.nnodes)?;
        writeln!(f, "  Edges: {}", self.nedges)?;
        writeln!(
            f,
            "  Non-zero entries: {} ({:.2}% dense)",
            self.nnz,
            (1.0 - self.sparsity) * 100.0
        )?;
        writeln!(
            f,
            "  Degree range: [{:.4}, {:.4}], mean: {:.4}",
            self.min_degree, self.max_degree, self.mean_degree
        )?;
        writeln!(f, "  Isolated nodes: {}", self.isolated)?;
        writeln!(f, "  Connected components: {}", self.components)?;
        writeln!(f, "  Kernel sigma: {:.6}", self.sigma)?;
        write!(f, "  Weight histogram:")?;
        for (b, count) in self.weight_histogram.iter().enumerate() {
            write!(
                f,
                " ({:.1},{:.1}]={}",
                b as f64 / WEIGHT_BINS as f64,
                (b + 1) as f64 / WEIGHT_BINS as f64,
                count
            )?;
        }
        writeln!(f)
    }
}
