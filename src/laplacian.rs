//! # Builds a k-NN similarity graph and its Laplacian from feature vectors
//!
//! ## Algorithm Overview
//!
//! 1. **Scaling**: each feature is rescaled according to `params.scaling`
//! 2. **k-NN search**: for each sample, the `k` nearest other samples under `params.metric`
//! 3. **Kernel bandwidth**: `sigma = kernel_scale * mean(distance to k-th neighbour)` unless fixed
//! 4. **Weight assignment**: Gaussian kernel `w = exp(-d² / sigma²)`
//! 5. **Symmetrization**: `W = max(W, Wᵀ)` or `(W + Wᵀ) / 2`
//! 6. **Laplacian construction**: combinatorial `D - W`, normalized `I - D^-1/2 W D^-1/2`
//!    or random walk `I - D^-1 W`
//!
//! ## Complexity
//! The exact k-NN search dominates: `O(N² × F)`, parallel over samples.
//! Everything after it is `O(N × k)` and the result is stored as CSR.
use std::collections::BTreeMap;

use log::{debug, info, trace, warn};
use sprs::{CsMat, TriMat};

use crate::error::{Error, Result};
use crate::features::FeatureMatrix;
use crate::graph::{GraphLaplacian, GraphParams, LaplacianKind, Symmetrize};
use crate::knn::{knn_search, Neighbourhoods};

/// Weights below this are dropped as numerically zero.
pub const WEIGHT_FLOOR: f64 = 1e-15;
pub const SIGMA_FLOOR: f64 = 1e-12;

/// Builds the graph Laplacian of a feature matrix (rows are samples).
///
/// # Examples
///
/// ```
/// use genregraph::features::{FeatureMatrix, ScalingMode};
/// use genregraph::graph::{GraphParams, LaplacianKind};
/// use genregraph::laplacian::build_laplacian_matrix;
///
/// let features = FeatureMatrix::from_rows(vec![
///     vec![0.0, 0.0],
///     vec![0.1, 0.0],
///     vec![1.0, 1.0],
///     vec![1.1, 1.0],
/// ]).unwrap();
///
/// let params = GraphParams {
///     k: 1,
///     scaling: ScalingMode::None,
///     laplacian: LaplacianKind::Normalized,
///     ..GraphParams::default()
/// };
///
/// let gl = build_laplacian_matrix(&features, &params).unwrap();
/// assert_eq!(gl.shape(), (4, 4));
/// assert_eq!(gl.nedges(), 2);
/// ```
pub fn build_laplacian_matrix(
    features: &FeatureMatrix,
    params: &GraphParams,
) -> Result<GraphLaplacian> {
    let (n, f) = features.shape();
    info!("Building Laplacian matrix for {} samples with {} features", n, f);
    debug!(
        "Graph parameters: k={}, metric={:?}, kernel_scale={}, sigma={:?}, symmetrize={:?}, laplacian={:?}, scaling={:?}",
        params.k,
        params.metric,
        params.kernel_scale,
        params.sigma,
        params.symmetrize,
        params.laplacian,
        params.scaling
    );

    if params.kernel_scale <= 0.0 || !params.kernel_scale.is_finite() {
        return Err(Error::invalid(format!(
            "kernel_scale must be positive, got {}",
            params.kernel_scale
        )));
    }
    if let Some(s) = params.sigma {
        if s <= 0.0 || !s.is_finite() {
            return Err(Error::invalid(format!("sigma must be positive, got {}", s)));
        }
    }

    let scaled = features.scale(params.scaling)?;
    let rows = scaled.to_rows();
    let hood = knn_search(&rows, params.k, params.metric)?;

    let sigma = kernel_sigma(&hood, params);
    let adjacency = build_adjacency(&hood, sigma, params.symmetrize);
    let (matrix, degrees) = laplacian_from_adjacency(&adjacency, params.laplacian);

    let isolated = degrees.iter().filter(|&&d| d <= 0.0).count();
    if isolated > 0 {
        warn!("{} isolated nodes in the graph", isolated);
    }

    let gl = GraphLaplacian {
        matrix,
        adjacency,
        degrees,
        nnodes: n,
        sigma,
        graph_params: params.clone(),
    };

    info!(
        "Successfully built sparse {:?} Laplacian ({}x{}) with {} non-zeros",
        params.laplacian,
        n,
        n,
        gl.nnz()
    );
    Ok(gl)
}

/// Kernel bandwidth: the fixed `sigma` if given, otherwise scaled mean k-th neighbour distance.
pub fn kernel_sigma(hood: &Neighbourhoods, params: &GraphParams) -> f64 {
    let sigma = params
        .sigma
        .unwrap_or_else(|| params.kernel_scale * hood.mean_kth_distance());
    if sigma < SIGMA_FLOOR {
        warn!("Kernel sigma {:.3e} floored to {:.1e}", sigma, SIGMA_FLOOR);
        return SIGMA_FLOOR;
    }
    debug!("Using sigma={:.6} for the Gaussian kernel", sigma);
    sigma
}

/// Gaussian-weighted, symmetric adjacency from neighbour lists.
///
/// # Panics
///
/// If the result has a self loop, is not symmetric, or has a weight outside (0, 1].
/// The k-NN search excludes self matches so none of these can happen on valid input.
pub fn build_adjacency(hood: &Neighbourhoods, sigma: f64, symmetrize: Symmetrize) -> CsMat<f64> {
    let n = hood.nnodes();
    let sigma2 = sigma * sigma;

    let mut directed = vec![BTreeMap::<usize, f64>::new(); n];
    let mut dropped = 0usize;
    for (i, (idx, dist)) in hood.indices.iter().zip(hood.distances.iter()).enumerate() {
        for (&j, &d) in idx.iter().zip(dist.iter()) {
            let w = (-(d * d) / sigma2).exp();
            if w > WEIGHT_FLOOR {
                directed[i].insert(j, w);
            } else {
                dropped += 1;
            }
        }
    }
    if dropped > 0 {
        debug!("Dropped {} neighbour links with vanishing weight", dropped);
    }

    trace!("Symmetrizing adjacency matrix ({:?})", symmetrize);
    let mut sym = vec![BTreeMap::<usize, f64>::new(); n];
    for i in 0..n {
        for (&j, &w_ij) in directed[i].iter() {
            let w_ji = directed[j].get(&i).copied().unwrap_or(0.0);
            let w = match symmetrize {
                Symmetrize::Max => w_ij.max(w_ji),
                Symmetrize::Average => 0.5 * (w_ij + w_ji),
            };
            sym[i].insert(j, w);
            sym[j].insert(i, w);
        }
    }

    let mut triplets = TriMat::new((n, n));
    for (i, row) in sym.iter().enumerate() {
        for (&j, &w) in row.iter() {
            assert!(i != j, "self loop on node {}", i);
            assert!(
                w > 0.0 && w <= 1.0,
                "weight {} on edge ({}, {}) outside (0, 1]",
                w,
                i,
                j
            );
            let back = sym[j].get(&i).copied().unwrap_or(0.0);
            assert!((w - back).abs() <= 1e-12, "adjacency not symmetric at ({}, {})", i, j);
            triplets.add_triplet(i, j, w);
        }
    }

    let adjacency: CsMat<f64> = triplets.to_csr();
    debug!(
        "Built symmetric adjacency with {} undirected edges",
        adjacency.nnz() / 2
    );
    adjacency
}

/// Laplacian of a symmetric adjacency; also returns the degree vector.
pub fn laplacian_from_adjacency(
    adjacency: &CsMat<f64>,
    kind: LaplacianKind,
) -> (CsMat<f64>, Vec<f64>) {
    let n = adjacency.rows();
    let degrees: Vec<f64> = adjacency
        .outer_iterator()
        .map(|row| row.iter().map(|(_, &w)| w).sum::<f64>())
        .collect();

    info!("Converting adjacency to sparse {:?} Laplacian", kind);
    let mut triplets = TriMat::new((n, n));
    for (i, row) in adjacency.outer_iterator().enumerate() {
        let di = degrees[i];
        let diagonal = match kind {
            LaplacianKind::Combinatorial => di,
            _ if di > 0.0 => 1.0,
            _ => 0.0,
        };
        if diagonal != 0.0 {
            triplets.add_triplet(i, i, diagonal);
        }

        for (j, &w) in row.iter() {
            let v = match kind {
                LaplacianKind::Combinatorial => -w,
                LaplacianKind::Normalized => -w / (di * degrees[j]).sqrt(),
                LaplacianKind::RandomWalk => -w / di,
            };
            triplets.add_triplet(i, j, v);
        }
    }

    let matrix: CsMat<f64> = triplets.to_csr();
    trace!("Laplacian has {} stored entries", matrix.nnz());
    (matrix, degrees)
}
