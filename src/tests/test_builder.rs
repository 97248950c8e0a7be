use crate::builder::GraphBuilder;
use crate::features::ScalingMode;
use crate::graph::{GraphParams, LaplacianKind, Symmetrize};
use crate::knn::Metric;

use super::init;
use super::test_data::genre_features;

use log::debug;

#[test]
fn test_builder_defaults() {
    let builder = GraphBuilder::new();
    assert_eq!(builder.params(), &GraphParams::default());
}

#[test]
fn test_builder_setters() {
    let builder = GraphBuilder::new()
        .with_neighbours(5)
        .with_metric(Metric::Cosine)
        .with_sigma(0.4)
        .with_symmetrize(Symmetrize::Average)
        .with_laplacian(LaplacianKind::Combinatorial)
        .with_scaling(ScalingMode::Standard);

    let p = builder.params();
    assert_eq!(p.k, 5);
    assert_eq!(p.metric, Metric::Cosine);
    assert_eq!(p.sigma, Some(0.4));
    assert_eq!(p.symmetrize, Symmetrize::Average);
    assert_eq!(p.laplacian, LaplacianKind::Combinatorial);
    assert_eq!(p.scaling, ScalingMode::Standard);
}

#[test]
fn test_kernel_scale_clears_fixed_sigma() {
    let builder = GraphBuilder::new().with_sigma(0.4).with_kernel_scale(1.5);
    assert_eq!(builder.params().sigma, None);
    assert_eq!(builder.params().kernel_scale, 1.5);
}

#[test]
fn test_build_genre_clusters() {
    init();
    let fm = genre_features(10, 21);
    let built = GraphBuilder::new().with_neighbours(5).build(&fm).unwrap();
    let gl = &built.laplacian;
    debug!("{}", gl);

    assert_eq!(gl.nnodes, 30);
    assert!(built.lmax.is_none());
    assert!(gl.verify_properties(1e-9).is_valid);

    // five neighbours fit inside a genre of ten clips
    let (ncomp, labels) = gl.connected_components();
    assert_eq!(ncomp, 3);
    for g in 0..3 {
        let first = labels[g * 10];
        assert!(labels[g * 10..(g + 1) * 10].iter().all(|&l| l == first));
    }
}

#[test]
fn test_build_with_lmax() {
    let fm = genre_features(6, 3);
    let built = GraphBuilder::new()
        .with_neighbours(3)
        .with_lmax(200)
        .build(&fm)
        .unwrap();
    let lmax = built.lmax.unwrap();
    assert!(lmax > 0.0 && lmax <= 2.0 + 1e-6);
}

#[test]
fn test_from_params_round_trip() {
    let params = GraphParams {
        k: 3,
        laplacian: LaplacianKind::RandomWalk,
        ..GraphParams::default()
    };
    let builder = GraphBuilder::from_params(params.clone());
    assert_eq!(builder.params(), &params);

    let built = builder.build(&genre_features(4, 2)).unwrap();
    assert_eq!(built.laplacian.kind(), LaplacianKind::RandomWalk);
}

#[test]
fn test_build_propagates_errors() {
    let fm = genre_features(2, 1);
    assert!(GraphBuilder::new().with_neighbours(6).build(&fm).is_err());
    assert!(GraphBuilder::new().with_neighbours(2).with_sigma(0.0).build(&fm).is_err());
}
