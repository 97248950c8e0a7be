//! Forward-backward splitting for `min_x f(x) + g(x)`.
//!
//! `f` is convex and differentiable with an `L`-Lipschitz gradient,
//! `g` is convex with a cheap proximal operator. The solver is the monotone
//! variant of FISTA: the accelerated candidate is only accepted when it does not
//! increase the objective, so the objective sequence is non-increasing.
use log::{debug, trace};
use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::linalg;

pub trait SmoothFunction {
    fn eval(&self, x: &Array2<f64>) -> f64;
    fn grad(&self, x: &Array2<f64>) -> Array2<f64>;
    /// Lipschitz constant of the gradient
    fn lipschitz(&self) -> f64;
}

pub trait ProximalFunction {
    fn eval(&self, x: &Array2<f64>) -> f64;
    /// In-place `prox_{step·g}(x)`
    fn prox(&self, x: &mut Array2<f64>, step: f64);
}

/// `weight · ||x||_1`
#[derive(Clone, Copy, Debug)]
pub struct L1Norm {
    pub weight: f64,
}

impl ProximalFunction for L1Norm {
    fn eval(&self, x: &Array2<f64>) -> f64 {
        self.weight * linalg::l1_norm(x)
    }

    fn prox(&self, x: &mut Array2<f64>, step: f64) {
        linalg::soft_threshold(x, step * self.weight);
    }
}

/// Indicator of `{X : ||x_j||_2 <= 1 for every column j}`.
#[derive(Clone, Copy, Debug)]
pub struct UnitColumns;

impl ProximalFunction for UnitColumns {
    fn eval(&self, _x: &Array2<f64>) -> f64 {
        0.0
    }

    fn prox(&self, x: &mut Array2<f64>, _step: f64) {
        linalg::project_columns_unit_ball(x);
    }
}

/// Indicator of `{X : ||x_i||_2 <= 1 for every row i}`.
#[derive(Clone, Copy, Debug)]
pub struct UnitRows;

impl ProximalFunction for UnitRows {
    fn eval(&self, _x: &Array2<f64>) -> f64 {
        0.0
    }

    fn prox(&self, x: &mut Array2<f64>, _step: f64) {
        linalg::project_rows_unit_ball(x);
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SolverOptions {
    pub maxit: usize,
    /// stop when |F_k - F_{k-1}| <= rtol · |F_k|
    pub rtol: f64,
}

impl Default for SolverOptions {
    fn default() -> Self {
        Self {
            maxit: 100,
            rtol: 1e-5,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopReason {
    RelativeTolerance,
    MaxIterations,
}

#[derive(Clone, Debug)]
pub struct SolverResult {
    pub solution: Array2<f64>,
    /// objective after each iteration; `objective[0]` is at the starting point
    pub objective: Vec<f64>,
    pub iterations: usize,
    pub stop: StopReason,
}

impl SolverResult {
    pub fn final_objective(&self) -> f64 {
        self.objective.last().copied().unwrap_or(f64::NAN)
    }
}

const LIPSCHITZ_FLOOR: f64 = 1e-12;

/// Minimise `f + g` from `x0` with step `1 / f.lipschitz()`.
///
/// `x0` should lie in the domain of `g` (e.g. already projected for an indicator).
pub fn forward_backward<F, G>(x0: Array2<f64>, f: &F, g: &G, opts: &SolverOptions) -> SolverResult
where
    F: SmoothFunction + ?Sized,
    G: ProximalFunction + ?Sized,
{
    let step = 1.0 / f.lipschitz().max(LIPSCHITZ_FLOOR);
    trace!("forward_backward: step={:.3e}, maxit={}", step, opts.maxit);

    let objective_at = |x: &Array2<f64>| f.eval(x) + g.eval(x);

    let mut x = x0;
    let mut fx = objective_at(&x);
    let mut objective = vec![fx];

    let mut y = x.clone();
    let mut t = 1.0_f64;
    let mut stop = StopReason::MaxIterations;
    let mut iterations = 0;

    for it in 0..opts.maxit {
        iterations = it + 1;

        let grad = f.grad(&y);
        let mut z = &y - &(grad * step);
        g.prox(&mut z, step);
        let fz = objective_at(&z);

        let t_next = 0.5 * (1.0 + (1.0 + 4.0 * t * t).sqrt());
        let accepted = fz <= fx;
        let (x_next, f_next) = if accepted { (z.clone(), fz) } else { (x.clone(), fx) };

        // y = x_next + (t / t_next)(z - x_next) + ((t - 1) / t_next)(x_next - x)
        y = &x_next + &((&z - &x_next) * (t / t_next)) + &((&x_next - &x) * ((t - 1.0) / t_next));

        let previous = fx;
        x = x_next;
        fx = f_next;
        t = t_next;
        objective.push(fx);

        // a rejected step leaves F unchanged and says nothing about convergence
        if accepted && (previous - fx).abs() <= opts.rtol * fx.abs().max(f64::MIN_POSITIVE) {
            stop = StopReason::RelativeTolerance;
            break;
        }
    }

    debug!(
        "forward_backward stopped after {} iterations ({:?}), objective {:.6e}",
        iterations, stop, fx
    );

    SolverResult {
        solution: x,
        objective,
        iterations,
        stop,
    }
}
