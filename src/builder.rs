use crate::error::Result;
use crate::features::{FeatureMatrix, ScalingMode};
use crate::graph::{GraphLaplacian, GraphParams, LaplacianKind, Symmetrize};
use crate::knn::Metric;
use crate::laplacian::build_laplacian_matrix;

use log::{debug, info};

/// Fluent configuration of the similarity graph.
///
/// Defaults follow the usual audio-feature setup: min-max scaling,
/// 10 Euclidean neighbours, sigma from the mean k-th distance, max-symmetrized,
/// normalized Laplacian.
#[derive(Clone, Debug, Default)]
pub struct GraphBuilder {
    params: GraphParams,
    // power-iteration budget for lmax; None skips the estimate
    lmax_iterations: Option<usize>,
}

/// A built graph plus the largest-eigenvalue estimate if requested.
#[derive(Clone, Debug)]
pub struct BuiltGraph {
    pub laplacian: GraphLaplacian,
    pub lmax: Option<f64>,
}

impl GraphBuilder {
    pub fn new() -> Self {
        info!("Initializing new GraphBuilder");
        Self::default()
    }

    pub fn from_params(params: GraphParams) -> Self {
        debug!("GraphBuilder from params: {:?}", params);
        Self {
            params,
            lmax_iterations: None,
        }
    }

    pub fn with_neighbours(mut self, k: usize) -> Self {
        info!("Setting neighbours per sample: {}", k);
        self.params.k = k;
        self
    }

    pub fn with_metric(mut self, metric: Metric) -> Self {
        info!("Setting distance metric: {:?}", metric);
        self.params.metric = metric;
        self
    }

    /// Fixed bandwidth; overrides `kernel_scale`.
    pub fn with_sigma(mut self, sigma: f64) -> Self {
        info!("Setting fixed kernel sigma: {}", sigma);
        self.params.sigma = Some(sigma);
        self
    }

    pub fn with_kernel_scale(mut self, scale: f64) -> Self {
        info!("Setting kernel scale: {}", scale);
        self.params.kernel_scale = scale;
        self.params.sigma = None;
        self
    }

    pub fn with_symmetrize(mut self, symmetrize: Symmetrize) -> Self {
        self.params.symmetrize = symmetrize;
        self
    }

    pub fn with_laplacian(mut self, kind: LaplacianKind) -> Self {
        info!("Setting Laplacian kind: {:?}", kind);
        self.params.laplacian = kind;
        self
    }

    pub fn with_scaling(mut self, scaling: ScalingMode) -> Self {
        info!("Setting feature scaling: {:?}", scaling);
        self.params.scaling = scaling;
        self
    }

    /// Also estimate the largest Laplacian eigenvalue with this many power iterations.
    pub fn with_lmax(mut self, iterations: usize) -> Self {
        self.lmax_iterations = Some(iterations);
        self
    }

    pub fn params(&self) -> &GraphParams {
        &self.params
    }

    pub fn build(&self, features: &FeatureMatrix) -> Result<BuiltGraph> {
        let laplacian = build_laplacian_matrix(features, &self.params)?;
        let lmax = self
            .lmax_iterations
            .map(|maxit| laplacian.estimate_lmax(maxit, 1e-8));
        if let Some(l) = lmax {
            info!("Largest Laplacian eigenvalue ~ {:.6}", l);
        }
        Ok(BuiltGraph { laplacian, lmax })
    }
}
