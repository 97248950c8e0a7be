//! # Graph-regularised auto-encoder dictionary learning
//!
//! Learns a dictionary `D` (F×m), an encoder `E` (m×F) and sparse codes `Z` (m×N)
//! for samples `X` (F×N, one column per sample) by minimising
//!
//! ```text
//! J(Z, D, E) = ||X - DZ||² + ld ||Z - EX||² + ls ||Z||₁ + lg tr(Z L Zᵀ)
//!   s.t. ||d_j||₂ <= 1 for the columns of D, ||e_i||₂ <= 1 for the rows of E
//! ```
//!
//! `J` is not jointly convex, but it is convex in each block. `fit` alternates
//! the three block problems, each solved by forward-backward splitting from the
//! previous iterate:
//!
//! 1. **Z**: smooth part `||X-DZ||² + ld||Z-EX||² + lg tr(ZLZᵀ)`, prox of `ls||.||₁`
//! 2. **D**: smooth part `||X-DZ||²`, projection onto unit-norm columns
//! 3. **E**: smooth part `ld||Z-EX||²`, projection onto unit-norm rows (skipped if `ld = 0`)
//!
//! Every block step starts from a feasible point and never increases its objective,
//! so `J` is non-increasing over outer iterations.
use std::fmt;

use log::{debug, info, trace, warn};
use ndarray::Array2;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use sprs::CsMat;

use crate::error::{Error, Result};
use crate::graph::{GraphLaplacian, LaplacianKind};
use crate::linalg;
use crate::solvers::{
    forward_backward, L1Norm, SmoothFunction, SolverOptions, UnitColumns, UnitRows,
};

/// Entries at or below this magnitude count as zero in sparsity reports.
pub const SPARSITY_TOL: f64 = 1e-10;

// power iteration approaches lmax from below
const LIPSCHITZ_MARGIN: f64 = 1.01;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DictionaryParams {
    /// number of atoms m
    pub atoms: usize,
    /// encoder fidelity weight
    pub ld: f64,
    /// code sparsity weight
    pub ls: f64,
    /// graph smoothness weight; needs a Laplacian over the samples
    pub lg: f64,
    pub outer_maxit: usize,
    pub outer_rtol: f64,
    pub inner_maxit: usize,
    pub inner_rtol: f64,
    pub seed: u64,
}

impl Default for DictionaryParams {
    fn default() -> Self {
        Self {
            atoms: 128,
            ld: 10.0,
            ls: 1.0,
            lg: 0.0,
            outer_maxit: 15,
            outer_rtol: 1e-4,
            inner_maxit: 50,
            inner_rtol: 1e-5,
            seed: 1,
        }
    }
}

impl DictionaryParams {
    pub fn validate(&self) -> Result<()> {
        if self.atoms == 0 {
            return Err(Error::invalid("number of atoms must be positive"));
        }
        for (name, v) in [("ld", self.ld), ("ls", self.ls), ("lg", self.lg)] {
            if !v.is_finite() || v < 0.0 {
                return Err(Error::invalid(format!(
                    "{} must be finite and non-negative, got {}",
                    name, v
                )));
            }
        }
        if self.outer_maxit == 0 || self.inner_maxit == 0 {
            return Err(Error::invalid("iteration budgets must be positive"));
        }
        Ok(())
    }

    fn inner(&self) -> SolverOptions {
        SolverOptions {
            maxit: self.inner_maxit,
            rtol: self.inner_rtol,
        }
    }
}

/// The four terms of `J` and their sum (weights already applied).
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ObjectiveTerms {
    pub reconstruction: f64,
    pub encoder: f64,
    pub sparsity: f64,
    pub smoothness: f64,
    pub total: f64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IterationRecord {
    pub iteration: usize,
    pub terms: ObjectiveTerms,
    pub z_iterations: usize,
    pub d_iterations: usize,
    pub e_iterations: usize,
    /// fraction of zero entries in Z
    pub code_sparsity: f64,
}

#[derive(Clone, Debug)]
pub struct DictionaryModel {
    /// D, F×m
    pub dictionary: Array2<f64>,
    /// E, m×F
    pub encoder: Array2<f64>,
    /// Z, m×N for the training samples
    pub codes: Array2<f64>,
    pub params: DictionaryParams,
    /// `history[0]` is the initial point
    pub history: Vec<IterationRecord>,
}

/// Smooth part of the Z problem.
struct CodeStep<'a> {
    x: &'a Array2<f64>,
    d: &'a Array2<f64>,
    ex: Array2<f64>,
    ld: f64,
    graph: Option<(&'a CsMat<f64>, f64)>,
    lipschitz: f64,
}

impl<'a> CodeStep<'a> {
    fn new(
        x: &'a Array2<f64>,
        d: &'a Array2<f64>,
        e: &Array2<f64>,
        ld: f64,
        graph: Option<(&'a CsMat<f64>, f64)>,
        l_lmax: f64,
    ) -> Self {
        let lg_term = graph.map(|(_, lg)| lg * l_lmax).unwrap_or(0.0);
        let lipschitz = LIPSCHITZ_MARGIN * 2.0 * (linalg::gram_lmax(d, 100, 1e-6) + ld + lg_term);
        Self {
            x,
            d,
            ex: e.dot(x),
            ld,
            graph,
            lipschitz,
        }
    }
}

impl SmoothFunction for CodeStep<'_> {
    fn eval(&self, z: &Array2<f64>) -> f64 {
        let mut v = linalg::frobenius_sq(&(self.x - &self.d.dot(z)));
        v += self.ld * linalg::frobenius_sq(&(z - &self.ex));
        if let Some((l, lg)) = self.graph {
            v += lg * linalg::graph_smoothness(z, l);
        }
        v
    }

    fn grad(&self, z: &Array2<f64>) -> Array2<f64> {
        let residual = self.d.dot(z) - self.x;
        let mut g = self.d.t().dot(&residual) * 2.0;
        g.scaled_add(2.0 * self.ld, &(z - &self.ex));
        if let Some((l, lg)) = self.graph {
            g.scaled_add(2.0 * lg, &linalg::dense_times_sparse(z, l));
        }
        g
    }

    fn lipschitz(&self) -> f64 {
        self.lipschitz
    }
}

/// Smooth part of the D problem: `||X - DZ||²`.
struct DictionaryStep<'a> {
    x: &'a Array2<f64>,
    z: &'a Array2<f64>,
    lipschitz: f64,
}

impl SmoothFunction for DictionaryStep<'_> {
    fn eval(&self, d: &Array2<f64>) -> f64 {
        linalg::frobenius_sq(&(self.x - &d.dot(self.z)))
    }

    fn grad(&self, d: &Array2<f64>) -> Array2<f64> {
        (d.dot(self.z) - self.x).dot(&self.z.t()) * 2.0
    }

    fn lipschitz(&self) -> f64 {
        self.lipschitz
    }
}

/// Smooth part of the E problem: `ld ||Z - EX||²`.
struct EncoderStep<'a> {
    x: &'a Array2<f64>,
    z: &'a Array2<f64>,
    ld: f64,
    lipschitz: f64,
}

impl SmoothFunction for EncoderStep<'_> {
    fn eval(&self, e: &Array2<f64>) -> f64 {
        self.ld * linalg::frobenius_sq(&(self.z - &e.dot(self.x)))
    }

    fn grad(&self, e: &Array2<f64>) -> Array2<f64> {
        (e.dot(self.x) - self.z).dot(&self.x.t()) * (2.0 * self.ld)
    }

    fn lipschitz(&self) -> f64 {
        self.lipschitz
    }
}

/// Configures and runs the alternating minimisation.
///
/// ```
/// use genregraph::dictionary::DictionaryLearner;
/// use ndarray::Array2;
///
/// let x = Array2::from_shape_fn((4, 12), |(i, j)| ((i + 1) * (j % 3)) as f64 * 0.1);
/// let model = DictionaryLearner::new()
///     .with_atoms(3)
///     .with_weights(1.0, 0.1, 0.0)
///     .with_outer(5, 1e-6)
///     .fit(&x, None)
///     .unwrap();
///
/// assert_eq!(model.dictionary.dim(), (4, 3));
/// assert_eq!(model.codes.dim(), (3, 12));
/// ```
#[derive(Clone, Debug, Default)]
pub struct DictionaryLearner {
    params: DictionaryParams,
}

impl DictionaryLearner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_params(params: DictionaryParams) -> Self {
        Self { params }
    }

    pub fn with_atoms(mut self, atoms: usize) -> Self {
        self.params.atoms = atoms;
        self
    }

    /// Set `ld`, `ls` and `lg`.
    pub fn with_weights(mut self, ld: f64, ls: f64, lg: f64) -> Self {
        self.params.ld = ld;
        self.params.ls = ls;
        self.params.lg = lg;
        self
    }

    pub fn with_outer(mut self, maxit: usize, rtol: f64) -> Self {
        self.params.outer_maxit = maxit;
        self.params.outer_rtol = rtol;
        self
    }

    pub fn with_inner(mut self, maxit: usize, rtol: f64) -> Self {
        self.params.inner_maxit = maxit;
        self.params.inner_rtol = rtol;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.params.seed = seed;
        self
    }

    pub fn params(&self) -> &DictionaryParams {
        &self.params
    }

    /// Learn `D`, `E`, `Z` for samples `x` (F×N, samples as columns).
    pub fn fit(&self, x: &Array2<f64>, graph: Option<&GraphLaplacian>) -> Result<DictionaryModel> {
        let p = &self.params;
        p.validate()?;
        let (nfeatures, nsamples) = x.dim();
        if nfeatures == 0 || nsamples == 0 {
            return Err(Error::invalid("empty training matrix"));
        }
        if x.iter().any(|v| !v.is_finite()) {
            return Err(Error::invalid("training matrix contains non-finite values"));
        }

        let graph = resolve_graph(graph, p.lg, nsamples)?;
        info!(
            "Dictionary learning: {} features, {} samples, {} atoms (ld={}, ls={}, lg={})",
            nfeatures, nsamples, p.atoms, p.ld, p.ls, p.lg
        );

        let l_lmax = graph
            .map(|(l, _)| linalg::sparse_lmax(l, 200, 1e-8))
            .unwrap_or(0.0);
        if graph.is_some() {
            debug!("Graph Laplacian lmax = {:.6}", l_lmax);
        }

        let mut rng = ChaCha8Rng::seed_from_u64(p.seed);
        let mut d = linalg::random_normal((nfeatures, p.atoms), &mut rng);
        linalg::project_columns_unit_ball(&mut d);
        let mut e = linalg::random_normal((p.atoms, nfeatures), &mut rng);
        linalg::project_rows_unit_ball(&mut e);
        let mut z = Array2::<f64>::zeros((p.atoms, nsamples));

        let x_lmax = linalg::gram_lmax(x, 100, 1e-6);
        let inner = p.inner();

        let terms = objective_terms(x, &d, &e, &z, p, graph);
        let mut history = vec![IterationRecord {
            iteration: 0,
            terms,
            z_iterations: 0,
            d_iterations: 0,
            e_iterations: 0,
            code_sparsity: linalg::sparsity(&z, SPARSITY_TOL),
        }];
        debug!("Initial objective {:.6e}", terms.total);

        for it in 1..=p.outer_maxit {
            let z_res = {
                let step = CodeStep::new(x, &d, &e, p.ld, graph, l_lmax);
                forward_backward(z, &step, &L1Norm { weight: p.ls }, &inner)
            };
            z = z_res.solution;

            let d_res = {
                let step = DictionaryStep {
                    x,
                    z: &z,
                    lipschitz: LIPSCHITZ_MARGIN * 2.0 * linalg::gram_lmax(&z, 100, 1e-6),
                };
                forward_backward(d, &step, &UnitColumns, &inner)
            };
            d = d_res.solution;

            let e_iterations = if p.ld > 0.0 {
                let step = EncoderStep {
                    x,
                    z: &z,
                    ld: p.ld,
                    lipschitz: LIPSCHITZ_MARGIN * 2.0 * p.ld * x_lmax,
                };
                let e_res = forward_backward(e, &step, &UnitRows, &inner);
                e = e_res.solution;
                e_res.iterations
            } else {
                trace!("ld = 0, encoder left untouched");
                0
            };

            let terms = objective_terms(x, &d, &e, &z, p, graph);
            let record = IterationRecord {
                iteration: it,
                terms,
                z_iterations: z_res.iterations,
                d_iterations: d_res.iterations,
                e_iterations,
                code_sparsity: linalg::sparsity(&z, SPARSITY_TOL),
            };
            info!("{}", record);

            let previous = history[history.len() - 1].terms.total;
            if terms.total > previous * (1.0 + 1e-9) + 1e-12 {
                warn!(
                    "Objective increased at iteration {}: {:.6e} -> {:.6e}",
                    it, previous, terms.total
                );
            }
            history.push(record);

            if (previous - terms.total).abs() <= p.outer_rtol * terms.total.abs().max(f64::MIN_POSITIVE) {
                info!("Converged after {} outer iterations", it);
                break;
            }
        }

        Ok(DictionaryModel {
            dictionary: d,
            encoder: e,
            codes: z,
            params: p.clone(),
            history,
        })
    }
}

fn resolve_graph(
    graph: Option<&GraphLaplacian>,
    lg: f64,
    nsamples: usize,
) -> Result<Option<(&CsMat<f64>, f64)>> {
    match graph {
        Some(gl) if lg > 0.0 => {
            if gl.nnodes != nsamples {
                return Err(Error::Shape {
                    what: "graph Laplacian".to_string(),
                    expected: (nsamples, nsamples),
                    got: gl.shape(),
                });
            }
            if gl.kind() == LaplacianKind::RandomWalk {
                return Err(Error::invalid(
                    "graph smoothness needs a symmetric (combinatorial or normalized) Laplacian",
                ));
            }
            Ok(Some((&gl.matrix, lg)))
        }
        Some(_) => {
            debug!("lg = 0, ignoring the supplied graph");
            Ok(None)
        }
        None if lg > 0.0 => Err(Error::invalid(
            "lg > 0 requires a graph Laplacian over the samples",
        )),
        None => Ok(None),
    }
}

fn objective_terms(
    x: &Array2<f64>,
    d: &Array2<f64>,
    e: &Array2<f64>,
    z: &Array2<f64>,
    p: &DictionaryParams,
    graph: Option<(&CsMat<f64>, f64)>,
) -> ObjectiveTerms {
    let reconstruction = linalg::frobenius_sq(&(x - &d.dot(z)));
    let encoder = p.ld * linalg::frobenius_sq(&(z - &e.dot(x)));
    let sparsity = p.ls * linalg::l1_norm(z);
    let smoothness = graph
        .map(|(l, lg)| lg * linalg::graph_smoothness(z, l))
        .unwrap_or(0.0);
    ObjectiveTerms {
        reconstruction,
        encoder,
        sparsity,
        smoothness,
        total: reconstruction + encoder + sparsity + smoothness,
    }
}

impl DictionaryModel {
    pub fn natoms(&self) -> usize {
        self.dictionary.ncols()
    }

    pub fn final_objective(&self) -> f64 {
        self.history.last().map(|r| r.terms.total).unwrap_or(f64::NAN)
    }

    pub fn outer_iterations(&self) -> usize {
        self.history.len() - 1
    }

    fn check_features(&self, x: &Array2<f64>) -> Result<()> {
        let f = self.dictionary.nrows();
        if x.nrows() != f {
            return Err(Error::Shape {
                what: "samples".to_string(),
                expected: (f, x.ncols()),
                got: x.dim(),
            });
        }
        Ok(())
    }

    /// Feed-forward codes `E X`.
    pub fn encode(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        self.check_features(x)?;
        Ok(self.encoder.dot(x))
    }

    /// `D Z`
    pub fn reconstruct(&self, z: &Array2<f64>) -> Array2<f64> {
        self.dictionary.dot(z)
    }

    /// Solve the Z problem for new samples with `D` and `E` fixed.
    pub fn sparse_codes(
        &self,
        x: &Array2<f64>,
        graph: Option<&GraphLaplacian>,
        opts: &SolverOptions,
    ) -> Result<Array2<f64>> {
        self.check_features(x)?;
        let graph = match graph {
            Some(_) => resolve_graph(graph, self.params.lg, x.ncols())?,
            None => {
                if self.params.lg > 0.0 {
                    debug!("No graph for new samples, solving without the smoothness term");
                }
                None
            }
        };
        let l_lmax = graph
            .map(|(l, _)| linalg::sparse_lmax(l, 200, 1e-8))
            .unwrap_or(0.0);

        let step = CodeStep::new(x, &self.dictionary, &self.encoder, self.params.ld, graph, l_lmax);
        let z0 = Array2::<f64>::zeros((self.natoms(), x.ncols()));
        let res = forward_backward(z0, &step, &L1Norm { weight: self.params.ls }, opts);
        debug!(
            "Sparse coding of {} samples: {} iterations, objective {:.6e}",
            x.ncols(),
            res.iterations,
            res.final_objective()
        );
        Ok(res.solution)
    }

    /// Evaluate every objective term of this model on `x` with codes `self.codes`.
    pub fn objective(&self, x: &Array2<f64>, graph: Option<&GraphLaplacian>) -> Result<ObjectiveTerms> {
        self.check_features(x)?;
        if x.ncols() != self.codes.ncols() {
            return Err(Error::Shape {
                what: "samples".to_string(),
                expected: (self.dictionary.nrows(), self.codes.ncols()),
                got: x.dim(),
            });
        }
        let graph = resolve_graph(graph, self.params.lg, x.ncols())?;
        Ok(objective_terms(
            x,
            &self.dictionary,
            &self.encoder,
            &self.codes,
            &self.params,
            graph,
        ))
    }
}

impl fmt::Display for IterationRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "iter {:3}: J={:.6e} (rec={:.4e}, enc={:.4e}, l1={:.4e}, graph={:.4e}) inner Z/D/E={}/{}/{} sparsity={:.1}%",
            self.iteration,
            self.terms.total,
            self.terms.reconstruction,
            self.terms.encoder,
            self.terms.sparsity,
            self.terms.smoothness,
            self.z_iterations,
            self.d_iterations,
            self.e_iterations,
            self.code_sparsity * 100.0
        )
    }
}
