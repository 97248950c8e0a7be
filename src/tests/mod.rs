mod test_builder;
mod test_data;
mod test_knn;
mod test_laplacian;
mod test_reference;

use crate::features::ScalingMode;
use crate::graph::{GraphParams, LaplacianKind, Symmetrize};
use crate::knn::Metric;

pub fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub const GRAPH_PARAMS: GraphParams = GraphParams {
    k: 4,
    metric: Metric::Euclidean,
    kernel_scale: 1.0,
    sigma: None,
    symmetrize: Symmetrize::Max,
    laplacian: LaplacianKind::Normalized,
    scaling: ScalingMode::MinMax,
};
