//! Dense and sparse-dense helpers for the optimisation code.
use log::trace;
use ndarray::{Array1, Array2, Axis, Zip};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, StandardNormal};
use sprs::CsMat;

/// Largest eigenvalue of `AᵀA` (squared spectral norm of A) by power iteration.
pub fn gram_lmax(a: &Array2<f64>, maxit: usize, tol: f64) -> f64 {
    let n = a.ncols();
    if n == 0 || a.nrows() == 0 {
        return 0.0;
    }
    let mut rng = ChaCha8Rng::seed_from_u64(42);
    let mut x: Array1<f64> = Array1::from_shape_fn(n, |_| StandardNormal.sample(&mut rng));
    let nx = x.dot(&x).sqrt();
    x /= nx;

    let mut lambda = 0.0;
    for it in 0..maxit {
        let y = a.t().dot(&a.dot(&x));
        let next = x.dot(&y);
        let ny = y.dot(&y).sqrt();
        if ny <= 1e-300 {
            return 0.0;
        }
        x = y / ny;
        if (next - lambda).abs() <= tol * next.abs() {
            trace!("gram_lmax converged after {} iterations", it + 1);
            return next;
        }
        lambda = next;
    }
    lambda
}

/// Largest eigenvalue of a symmetric sparse matrix by power iteration.
pub fn sparse_lmax(l: &CsMat<f64>, maxit: usize, tol: f64) -> f64 {
    let n = l.rows();
    if n == 0 {
        return 0.0;
    }
    let mut rng = ChaCha8Rng::seed_from_u64(42);
    let mut x: Vec<f64> = (0..n).map(|_| StandardNormal.sample(&mut rng)).collect();
    let nx = x.iter().map(|v| v * v).sum::<f64>().sqrt();
    x.iter_mut().for_each(|v| *v /= nx);

    let mut lambda = 0.0;
    for _ in 0..maxit {
        let y: Vec<f64> = l
            .outer_iterator()
            .map(|row| row.iter().map(|(j, &v)| v * x[j]).sum::<f64>())
            .collect();
        let next: f64 = x.iter().zip(y.iter()).map(|(a, b)| a * b).sum();
        let ny = y.iter().map(|v| v * v).sum::<f64>().sqrt();
        if ny <= 1e-300 {
            return 0.0;
        }
        x = y.into_iter().map(|v| v / ny).collect();
        if (next - lambda).abs() <= tol * next.abs() {
            return next;
        }
        lambda = next;
    }
    lambda
}

/// `Z L` for dense `Z` (m×N) and sparse symmetric-shaped `L` (N×N).
pub fn dense_times_sparse(z: &Array2<f64>, l: &CsMat<f64>) -> Array2<f64> {
    assert_eq!(
        z.ncols(),
        l.rows(),
        "inner dimensions differ: {} vs {}",
        z.ncols(),
        l.rows()
    );
    let mut out = Array2::<f64>::zeros((z.nrows(), l.cols()));
    for (i, row) in l.outer_iterator().enumerate() {
        let zi = z.column(i);
        for (j, &v) in row.iter() {
            let mut oj = out.column_mut(j);
            oj.scaled_add(v, &zi);
        }
    }
    out
}

/// `tr(Z L Zᵀ)`
pub fn graph_smoothness(z: &Array2<f64>, l: &CsMat<f64>) -> f64 {
    let zl = dense_times_sparse(z, l);
    (z * &zl).sum()
}

pub fn frobenius_sq(a: &Array2<f64>) -> f64 {
    a.iter().map(|v| v * v).sum()
}

pub fn l1_norm(a: &Array2<f64>) -> f64 {
    a.iter().map(|v| v.abs()).sum()
}

/// Fraction of entries with magnitude at or below `tol`.
pub fn sparsity(a: &Array2<f64>, tol: f64) -> f64 {
    if a.is_empty() {
        return 0.0;
    }
    a.iter().filter(|v| v.abs() <= tol).count() as f64 / a.len() as f64
}

/// Proximal operator of `t ||.||_1`, in place.
pub fn soft_threshold(a: &mut Array2<f64>, t: f64) {
    a.mapv_inplace(|v| v.signum() * (v.abs() - t).max(0.0));
}

/// Scale every column with L2 norm above 1 back onto the unit sphere.
pub fn project_columns_unit_ball(a: &mut Array2<f64>) {
    project_lanes(a, Axis(1));
}

/// Scale every row with L2 norm above 1 back onto the unit sphere.
pub fn project_rows_unit_ball(a: &mut Array2<f64>) {
    project_lanes(a, Axis(0));
}

fn project_lanes(a: &mut Array2<f64>, axis: Axis) {
    for mut lane in a.axis_iter_mut(axis) {
        let n = lane.dot(&lane).sqrt();
        if n > 1.0 {
            lane /= n;
        }
    }
}

/// `||a - b||_F / ||b||_F`, or the absolute error when `b` is zero.
pub fn relative_error(a: &Array2<f64>, b: &Array2<f64>) -> f64 {
    assert_eq!(a.dim(), b.dim(), "shape mismatch in relative_error");
    let mut num = 0.0;
    let mut den = 0.0;
    Zip::from(a).and(b).for_each(|&x, &y| {
        num += (x - y) * (x - y);
        den += y * y;
    });
    if den > 1e-300 {
        (num / den).sqrt()
    } else {
        num.sqrt()
    }
}

/// Standard normal matrix from a fixed seed.
pub fn random_normal(shape: (usize, usize), rng: &mut ChaCha8Rng) -> Array2<f64> {
    Array2::from_shape_fn(shape, |_| StandardNormal.sample(&mut *rng))
}
