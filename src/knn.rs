//! Exact k-nearest-neighbour search over sample rows.
//!
//! Brute force, parallel over query samples: `O(N² × F)`. For each sample the
//! `k` closest *other* samples are kept, ordered by (distance asc, index asc)
//! so the result is deterministic.
use std::cmp::Ordering;

use log::{debug, info, trace};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    #[default]
    Euclidean,
    /// `1 - cos(a, b)`, in [0, 2]
    Cosine,
}

impl Metric {
    pub fn distance(&self, a: &[f64], b: &[f64]) -> f64 {
        match self {
            Metric::Euclidean => a
                .iter()
                .zip(b.iter())
                .map(|(x, y)| (x - y) * (x - y))
                .sum::<f64>()
                .sqrt(),
            Metric::Cosine => {
                let na = norm(a);
                let nb = norm(b);
                let denom = na * nb;
                if denom <= 1e-15 {
                    return 1.0;
                }
                let dot: f64 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
                (1.0 - (dot / denom).clamp(-1.0, 1.0)).clamp(0.0, 2.0)
            }
        }
    }
}

#[inline]
pub fn norm(a: &[f64]) -> f64 {
    a.iter().map(|&x| x * x).sum::<f64>().sqrt()
}

/// Neighbour lists for every sample, `k` entries each.
#[derive(Clone, Debug)]
pub struct Neighbourhoods {
    pub k: usize,
    pub metric: Metric,
    /// `indices[i][r]` is the r-th nearest neighbour of sample i
    pub indices: Vec<Vec<usize>>,
    pub distances: Vec<Vec<f64>>,
}

impl Neighbourhoods {
    pub fn nnodes(&self) -> usize {
        self.indices.len()
    }

    /// Distance of every sample to its k-th (farthest kept) neighbour.
    pub fn kth_distances(&self) -> Vec<f64> {
        self.distances
            .iter()
            .map(|d| d.last().copied().unwrap_or(0.0))
            .collect()
    }

    pub fn mean_kth_distance(&self) -> f64 {
        let kth = self.kth_distances();
        if kth.is_empty() {
            return 0.0;
        }
        kth.iter().sum::<f64>() / kth.len() as f64
    }
}

/// Find the `k` nearest neighbours of every row, excluding the row itself.
pub fn knn_search(rows: &[Vec<f64>], k: usize, metric: Metric) -> Result<Neighbourhoods> {
    let n = rows.len();
    if n < 2 {
        return Err(Error::invalid(format!(
            "need at least 2 samples for a neighbour search, got {}",
            n
        )));
    }
    if k == 0 || k >= n {
        return Err(Error::invalid(format!(
            "k must be in [1, {}), got {}",
            n, k
        )));
    }

    info!("Computing exact {}-NN for {} samples ({:?})", k, n, metric);

    let lists: Vec<(Vec<usize>, Vec<f64>)> = (0..n)
        .into_par_iter()
        .map(|i| {
            let mut candidates: Vec<(usize, f64)> = (0..n)
                .filter(|&j| j != i)
                .map(|j| (j, metric.distance(&rows[i], &rows[j])))
                .collect();

            candidates.sort_unstable_by(|a, b| {
                a.1.partial_cmp(&b.1)
                    .unwrap_or(Ordering::Equal)
                    .then_with(|| a.0.cmp(&b.0))
            });
            candidates.truncate(k);

            if i % 500 == 0 {
                trace!("Sample {}: nearest at {:.6}", i, candidates[0].1);
            }

            candidates.into_iter().unzip()
        })
        .collect();

    let (indices, distances): (Vec<_>, Vec<_>) = lists.into_iter().unzip();
    let hood = Neighbourhoods {
        k,
        metric,
        indices,
        distances,
    };

    debug!(
        "k-NN done: mean distance to k-th neighbour {:.6}",
        hood.mean_kth_distance()
    );
    Ok(hood)
}
