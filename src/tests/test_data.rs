use ndarray::Array2;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};

use crate::features::FeatureMatrix;

/// Three well separated "genres" in 6 dimensions, `per_genre` clips each.
pub fn genre_rows(per_genre: usize, seed: u64) -> Vec<Vec<f64>> {
    let centres = [
        [1.0, 0.9, 0.1, 0.0, 0.2, 0.1],
        [0.1, 0.2, 1.0, 0.8, 0.0, 0.1],
        [0.0, 0.1, 0.1, 0.2, 0.9, 1.0],
    ];
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let noise = Normal::new(0.0, 0.03).unwrap();

    let mut rows = Vec::with_capacity(3 * per_genre);
    for centre in centres.iter() {
        for _ in 0..per_genre {
            rows.push(centre.iter().map(|c| c + noise.sample(&mut rng)).collect());
        }
    }
    rows
}

pub fn genre_features(per_genre: usize, seed: u64) -> FeatureMatrix {
    FeatureMatrix::from_rows(genre_rows(per_genre, seed)).unwrap()
}

/// Same data with samples as columns (F×N).
pub fn genre_columns(per_genre: usize, seed: u64) -> Array2<f64> {
    genre_features(per_genre, seed).to_sample_columns()
}

/// Two pairs of close points, far apart from each other.
pub fn two_pairs() -> Vec<Vec<f64>> {
    vec![
        vec![0.0, 0.0],
        vec![0.1, 0.0],
        vec![1.0, 1.0],
        vec![1.1, 1.0],
    ]
}
