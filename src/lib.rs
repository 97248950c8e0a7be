//! # genregraph
//!
//! Two analysis stages of an audio genre-recognition pipeline:
//!
//! - **Graph**: a k-nearest-neighbour similarity graph over audio feature vectors,
//!   Gaussian-weighted and symmetrized, and its (normalized) graph Laplacian.
//!   See [`builder::GraphBuilder`] and [`laplacian::build_laplacian_matrix`].
//! - **Dictionary**: graph-regularised auto-encoder dictionary learning, solved by
//!   alternating convex sub-problems with forward-backward splitting.
//!   See [`dictionary::DictionaryLearner`], and [`reference::compare`] to check the
//!   result against a solution computed by another implementation.
//!
//! Both stages are one-shot: load arrays, compute, check invariants, log, save.
pub mod builder;
pub mod config;
pub mod dictionary;
pub mod error;
pub mod features;
pub mod graph;
pub mod io;
pub mod knn;
pub mod laplacian;
pub mod linalg;
pub mod reference;
pub mod solvers;

pub use error::{Error, Result};

#[cfg(test)]
mod tests;
