//! Covariance estimation transforms for Riemannian brain-computer interfaces.
//!
//! `riemest` turns batches of multichannel trials into symmetric positive
//! (semi-)definite matrices, the input representation of Riemannian-geometry
//! classifiers such as minimum distance to mean or tangent-space logistic
//! regression.
//!
//! # Layout
//!
//! - [`estimation`]: the four trial-to-matrix transforms
//! - [`pipeline`]: the [`Fit`] / [`Transform`] capabilities they share
//! - [`covariance`]: named single-trial estimators (`cov`, `scm`, `lwf`, `oas`, `corr`)
//! - [`cospectrum`]: windowed cross-spectral matrices
//! - [`erp`]: class prototypes and xDAWN spatial filters
//! - [`linalg`], [`fft`], [`window`]: numerical building blocks
//!
//! # Data Layout
//!
//! A trial is a `(channels, samples)` array and a batch is
//! `(trials, channels, samples)`, both as [`ndarray`] views. Labels are plain
//! `usize` slices aligned with the trial axis.
//!
//! # Example
//!
//! ```
//! use ndarray::Array3;
//! use riemest::{Covariances, ErpCovariances, Estimator, Fit, Transform};
//!
//! let trials = Array3::from_shape_fn((10, 4, 200), |(n, c, t)| {
//!     let t = t as f64;
//!     (0.05 * t * (c + 1) as f64).sin() + (n % 2) as f64 * (0.02 * t).sin() + 0.001 * (n * c) as f64
//! });
//! let labels: Vec<usize> = (0..10).map(|i| i % 2).collect();
//!
//! let covs = Covariances::new(Estimator::Scm).transform(trials.view()).unwrap();
//! assert_eq!(covs.dim(), (10, 4, 4));
//!
//! let (_, erp) = ErpCovariances::default().fit_transform(trials.view(), Some(&labels)).unwrap();
//! assert_eq!(erp.dim(), (10, 12, 12));
//! ```

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod cospectrum;
pub mod covariance;
pub mod erp;
pub mod estimation;
pub mod fft;
pub mod linalg;
pub mod pipeline;
pub mod window;

pub use cospectrum::{cospectrum, CospConfig, FrequencyBand, SpectralError};
pub use covariance::{covariances, covariances_ep, CovarianceError, Estimator};
pub use erp::{ErpError, FittedXdawn, Xdawn};
pub use estimation::{
    CospCovariances, Covariances, ErpCovariances, EstimationError, FittedErpCovariances,
    FittedXdawnCovariances, XdawnCovariances,
};
pub use linalg::{EigenConfig, LinalgError};
pub use pipeline::{Fit, Transform};
pub use window::WindowType;
