use crate::features::{FeatureMatrix, ScalingMode};
use crate::graph::{GraphParams, LaplacianKind, Symmetrize};
use crate::knn::{knn_search, Metric};
use crate::laplacian::*;
use approx::assert_abs_diff_eq;
use sprs::{CsMat, TriMat};

use super::test_data::{genre_features, two_pairs};
use super::{init, GRAPH_PARAMS};

use log::debug;

fn raw_params(k: usize, kind: LaplacianKind) -> GraphParams {
    GraphParams {
        k,
        scaling: ScalingMode::None,
        laplacian: kind,
        ..GraphParams::default()
    }
}

fn line_features(points: &[f64]) -> FeatureMatrix {
    FeatureMatrix::from_rows(points.iter().map(|&p| vec![p]).collect()).unwrap()
}

#[test]
fn test_basic_laplacian_construction() {
    let fm = FeatureMatrix::from_rows(two_pairs()).unwrap();
    let params = raw_params(1, LaplacianKind::Combinatorial);
    let gl = build_laplacian_matrix(&fm, &params).unwrap();

    assert_eq!(gl.nnodes, 4);
    assert_eq!(gl.shape(), (4, 4));
    assert_eq!(gl.graph_params, params);
    assert_eq!(gl.nedges(), 2);
    // every 1-NN distance is 0.1, so sigma = 0.1 and w = exp(-1)
    assert_abs_diff_eq!(gl.sigma, 0.1, epsilon = 1e-12);
    assert_abs_diff_eq!(gl.weight(0, 1), (-1.0f64).exp(), epsilon = 1e-12);
    assert_eq!(gl.weight(0, 2), 0.0);
}

#[test]
fn test_combinatorial_properties() {
    let fm = genre_features(6, 11);
    let params = GraphParams {
        laplacian: LaplacianKind::Combinatorial,
        ..GRAPH_PARAMS
    };
    let gl = build_laplacian_matrix(&fm, &params).unwrap();
    let n = gl.nnodes;

    for i in 0..n {
        let row_sum: f64 = (0..n).map(|j| gl.get(i, j)).sum();
        assert_abs_diff_eq!(row_sum, 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(gl.get(i, i), gl.degrees[i], epsilon = 1e-12);
    }
    for i in 0..n {
        for j in 0..n {
            assert_abs_diff_eq!(gl.get(i, j), gl.get(j, i), epsilon = 1e-12);
            if i != j {
                assert!(gl.get(i, j) <= 0.0);
            }
        }
    }
    assert!(gl.verify_properties(1e-10).is_valid);
}

#[test]
fn test_normalized_properties() {
    init();
    let fm = genre_features(6, 5);
    let gl = build_laplacian_matrix(&fm, &GRAPH_PARAMS).unwrap();

    for i in 0..gl.nnodes {
        assert_abs_diff_eq!(gl.get(i, i), 1.0, epsilon = 1e-12);
    }
    let validation = gl.verify_properties(1e-10);
    debug!("validation: {:?}", validation);
    assert!(validation.is_valid);
    assert!(validation.is_symmetric);

    let lmax = gl.estimate_lmax(500, 1e-10);
    assert!(lmax > 0.0);
    assert!(lmax <= 2.0 + 1e-6, "normalized lmax {} above 2", lmax);
}

#[test]
fn test_normalized_entries_match_formula() {
    let fm = genre_features(4, 9);
    let gl = build_laplacian_matrix(&fm, &GRAPH_PARAMS).unwrap();
    for i in 0..gl.nnodes {
        for j in 0..gl.nnodes {
            if i == j {
                continue;
            }
            let expected = -gl.weight(i, j) / (gl.degrees[i] * gl.degrees[j]).sqrt();
            assert_abs_diff_eq!(gl.get(i, j), expected, epsilon = 1e-12);
        }
    }
}

#[test]
fn test_random_walk_rows_sum_to_zero() {
    let fm = genre_features(5, 2);
    let params = GraphParams {
        laplacian: LaplacianKind::RandomWalk,
        ..GRAPH_PARAMS
    };
    let gl = build_laplacian_matrix(&fm, &params).unwrap();
    for i in 0..gl.nnodes {
        let row_sum: f64 = (0..gl.nnodes).map(|j| gl.get(i, j)).sum();
        assert_abs_diff_eq!(row_sum, 0.0, epsilon = 1e-12);
    }
    assert!(gl.verify_properties(1e-10).is_valid);
}

#[test]
fn test_symmetrize_max_and_average() {
    // 0 <-> 1 is mutual, 2 -> 1 is one-way
    let fm = line_features(&[0.0, 1.0, 3.0]);
    let base = GraphParams {
        sigma: Some(1.0),
        ..raw_params(1, LaplacianKind::Combinatorial)
    };

    let max = build_laplacian_matrix(&fm, &base).unwrap();
    assert_abs_diff_eq!(max.weight(0, 1), (-1.0f64).exp(), epsilon = 1e-12);
    assert_abs_diff_eq!(max.weight(1, 2), (-4.0f64).exp(), epsilon = 1e-12);
    assert_abs_diff_eq!(max.weight(2, 1), (-4.0f64).exp(), epsilon = 1e-12);

    let avg_params = GraphParams {
        symmetrize: Symmetrize::Average,
        ..base
    };
    let avg = build_laplacian_matrix(&fm, &avg_params).unwrap();
    assert_abs_diff_eq!(avg.weight(0, 1), (-1.0f64).exp(), epsilon = 1e-12);
    assert_abs_diff_eq!(avg.weight(1, 2), 0.5 * (-4.0f64).exp(), epsilon = 1e-12);
    assert_abs_diff_eq!(avg.weight(2, 1), 0.5 * (-4.0f64).exp(), epsilon = 1e-12);
}

#[test]
fn test_kernel_sigma_scaling() {
    let rows: Vec<Vec<f64>> = [0.0, 1.0, 3.0, 7.0].iter().map(|&p| vec![p]).collect();
    let hood = knn_search(&rows, 1, Metric::Euclidean).unwrap();

    let params = GraphParams {
        kernel_scale: 2.0,
        ..GraphParams::default()
    };
    assert_abs_diff_eq!(kernel_sigma(&hood, &params), 4.0, epsilon = 1e-12);

    let fixed = GraphParams {
        sigma: Some(0.3),
        ..params
    };
    assert_abs_diff_eq!(kernel_sigma(&hood, &fixed), 0.3, epsilon = 1e-12);
}

#[test]
fn test_kernel_sigma_floor_on_duplicates() {
    let rows = vec![vec![1.0], vec![1.0], vec![1.0]];
    let hood = knn_search(&rows, 1, Metric::Euclidean).unwrap();
    assert_eq!(kernel_sigma(&hood, &GraphParams::default()), SIGMA_FLOOR);
}

#[test]
fn test_weights_in_unit_interval() {
    let fm = genre_features(8, 4);
    let gl = build_laplacian_matrix(&fm, &GRAPH_PARAMS).unwrap();
    for row in gl.adjacency.outer_iterator() {
        for (_, &w) in row.iter() {
            assert!(w > 0.0 && w <= 1.0);
        }
    }
    for i in 0..gl.nnodes {
        assert_eq!(gl.weight(i, i), 0.0, "self loop on {}", i);
    }
}

#[test]
fn test_invalid_kernel_parameters() {
    let fm = FeatureMatrix::from_rows(two_pairs()).unwrap();
    let bad_scale = GraphParams {
        kernel_scale: 0.0,
        ..raw_params(1, LaplacianKind::Normalized)
    };
    assert!(build_laplacian_matrix(&fm, &bad_scale).is_err());

    let bad_sigma = GraphParams {
        sigma: Some(-1.0),
        ..raw_params(1, LaplacianKind::Normalized)
    };
    assert!(build_laplacian_matrix(&fm, &bad_sigma).is_err());

    let too_many = raw_params(4, LaplacianKind::Normalized);
    assert!(build_laplacian_matrix(&fm, &too_many).is_err());
}

fn isolated_adjacency() -> CsMat<f64> {
    let mut t = TriMat::new((3, 3));
    t.add_triplet(0, 1, 0.5);
    t.add_triplet(1, 0, 0.5);
    t.to_csr()
}

#[test]
fn test_normalized_with_isolated_node() {
    let (l, degrees) = laplacian_from_adjacency(&isolated_adjacency(), LaplacianKind::Normalized);
    assert_eq!(degrees, vec![0.5, 0.5, 0.0]);
    assert_abs_diff_eq!(*l.get(0, 0).unwrap(), 1.0, epsilon = 1e-12);
    assert_abs_diff_eq!(*l.get(0, 1).unwrap(), -1.0, epsilon = 1e-12);
    assert!(l.get(2, 2).is_none());
}

#[test]
fn test_combinatorial_from_adjacency() {
    let (l, _) = laplacian_from_adjacency(&isolated_adjacency(), LaplacianKind::Combinatorial);
    assert_abs_diff_eq!(*l.get(0, 0).unwrap(), 0.5, epsilon = 1e-12);
    assert_abs_diff_eq!(*l.get(1, 0).unwrap(), -0.5, epsilon = 1e-12);
    assert_eq!(l.nnz(), 4);
}
