use crate::knn::{knn_search, Metric};
use approx::assert_abs_diff_eq;

fn line(points: &[f64]) -> Vec<Vec<f64>> {
    points.iter().map(|&p| vec![p]).collect()
}

#[test]
fn test_euclidean_distance() {
    assert_abs_diff_eq!(
        Metric::Euclidean.distance(&[0.0, 0.0], &[3.0, 4.0]),
        5.0,
        epsilon = 1e-12
    );
}

#[test]
fn test_cosine_distance_range() {
    let m = Metric::Cosine;
    assert_abs_diff_eq!(m.distance(&[1.0, 0.0], &[2.0, 0.0]), 0.0, epsilon = 1e-12);
    assert_abs_diff_eq!(m.distance(&[1.0, 0.0], &[0.0, 1.0]), 1.0, epsilon = 1e-12);
    assert_abs_diff_eq!(m.distance(&[1.0, 0.0], &[-1.0, 0.0]), 2.0, epsilon = 1e-12);
    // zero vector has no direction
    assert_eq!(m.distance(&[0.0, 0.0], &[1.0, 1.0]), 1.0);
}

#[test]
fn test_knn_on_a_line() {
    let rows = line(&[0.0, 1.0, 3.0, 7.0]);
    let hood = knn_search(&rows, 2, Metric::Euclidean).unwrap();

    assert_eq!(hood.nnodes(), 4);
    assert_eq!(hood.indices[0], vec![1, 2]);
    assert_eq!(hood.distances[0], vec![1.0, 3.0]);
    assert_eq!(hood.indices[3], vec![2, 1]);
    assert_eq!(hood.distances[3], vec![4.0, 6.0]);
}

#[test]
fn test_knn_excludes_self_and_breaks_ties_by_index() {
    let rows = line(&[0.0, 1.0, -1.0]);
    let hood = knn_search(&rows, 2, Metric::Euclidean).unwrap();
    assert_eq!(hood.indices[0], vec![1, 2]);
    for (i, idx) in hood.indices.iter().enumerate() {
        assert!(!idx.contains(&i), "sample {} is its own neighbour", i);
    }
}

#[test]
fn test_knn_duplicate_points() {
    let rows = line(&[2.0, 2.0, 5.0]);
    let hood = knn_search(&rows, 1, Metric::Euclidean).unwrap();
    assert_eq!(hood.indices[0], vec![1]);
    assert_eq!(hood.distances[0], vec![0.0]);
}

#[test]
fn test_kth_distances() {
    let rows = line(&[0.0, 1.0, 3.0, 7.0]);
    let hood = knn_search(&rows, 1, Metric::Euclidean).unwrap();
    assert_eq!(hood.kth_distances(), vec![1.0, 1.0, 2.0, 4.0]);
    assert_abs_diff_eq!(hood.mean_kth_distance(), 2.0, epsilon = 1e-12);
}

#[test]
fn test_knn_rejects_bad_k() {
    let rows = line(&[0.0, 1.0, 2.0]);
    assert!(knn_search(&rows, 0, Metric::Euclidean).is_err());
    assert!(knn_search(&rows, 3, Metric::Euclidean).is_err());
    assert!(knn_search(&line(&[0.0]), 1, Metric::Euclidean).is_err());
}

#[test]
fn test_knn_cosine_groups_directions() {
    let rows = vec![
        vec![1.0, 0.0],
        vec![10.0, 0.5],
        vec![0.0, 1.0],
        vec![0.2, 5.0],
    ];
    let hood = knn_search(&rows, 1, Metric::Cosine).unwrap();
    assert_eq!(hood.indices[0], vec![1]);
    assert_eq!(hood.indices[2], vec![3]);
}
