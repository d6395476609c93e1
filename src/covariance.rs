//! Single-trial covariance estimators.
//!
//! A trial is a `(channels, samples)` array: each row is one channel, each
//! column one observation. Every estimator maps a trial to a symmetric
//! `channels × channels` matrix.
//!
//! # Estimators
//!
//! | Name | Rule |
//! |------|------|
//! | `cov` | Centred, unbiased sample covariance (1/(T-1)) |
//! | `scm` | Centred empirical covariance (1/T) |
//! | `lwf` | Ledoit-Wolf shrinkage toward a scaled identity |
//! | `oas` | Oracle Approximating Shrinkage toward a scaled identity |
//! | `corr` | Pearson correlation matrix |
//!
//! Shrinkage estimators trade a little bias for a much better conditioned
//! matrix when the number of samples is small relative to the number of
//! channels, which matters for the large augmented matrices built by
//! [`covariances_ep`].
//!
//! # Example
//!
//! ```
//! use ndarray::array;
//! use riemest::covariance::Estimator;
//!
//! let estimator: Estimator = "lwf".parse().unwrap();
//! let trial = array![[1.0, 2.0, 3.0, 4.0], [2.0, 1.0, 4.0, 3.0]];
//! let cov = estimator.estimate(trial.view()).unwrap();
//! assert_eq!(cov.dim(), (2, 2));
//! assert_eq!(cov[[0, 1]], cov[[1, 0]]);
//! ```
//!
//! # References
//!
//! - Ledoit & Wolf (2004): "A well-conditioned estimator for large-dimensional covariance matrices"
//! - Chen et al. (2010): "Shrinkage Algorithms for MMSE Covariance Estimation"

use alloc::string::{String, ToString};
use core::fmt;
use core::str::FromStr;
use ndarray::{s, Array2, Array3, ArrayView2, ArrayView3, Axis};

/// Errors that can occur during covariance estimation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CovarianceError {
    /// Estimator name not present in the registry
    #[error("unknown covariance estimator `{0}` (expected one of cov, scm, lwf, oas, corr)")]
    UnknownEstimator(String),

    /// Too few samples for the requested estimator
    #[error("estimator needs at least {required} samples, trial has {got}")]
    InsufficientSamples {
        /// Minimum number of samples
        required: usize,
        /// Samples in the trial
        got: usize,
    },

    /// Trial has no channels
    #[error("trial has no channels")]
    NoChannels,

    /// Array dimensions incompatible
    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch {
        /// Expected size along the offending axis
        expected: usize,
        /// Actual size
        got: usize,
    },

    /// Correlation undefined for a constant channel
    #[error("channel {channel} has zero variance")]
    ZeroVariance {
        /// Offending row of the trial
        channel: usize,
    },
}

/// Named single-matrix covariance estimation rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Estimator {
    /// Unbiased sample covariance
    Cov,
    /// Empirical (maximum likelihood) covariance
    #[default]
    Scm,
    /// Ledoit-Wolf shrinkage
    Lwf,
    /// Oracle Approximating Shrinkage
    Oas,
    /// Correlation coefficients
    Corr,
}

impl Estimator {
    /// Every registered estimator.
    pub const ALL: [Self; 5] = [Self::Cov, Self::Scm, Self::Lwf, Self::Oas, Self::Corr];

    /// Registry name of the estimator.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Cov => "cov",
            Self::Scm => "scm",
            Self::Lwf => "lwf",
            Self::Oas => "oas",
            Self::Corr => "corr",
        }
    }

    /// Estimate the covariance of one `(channels, samples)` matrix.
    ///
    /// # Errors
    ///
    /// - `NoChannels` for an empty row axis
    /// - `InsufficientSamples` with fewer than one sample (two for `cov`)
    /// - `ZeroVariance` when `corr` meets a constant channel
    pub fn estimate(self, x: ArrayView2<'_, f64>) -> Result<Array2<f64>, CovarianceError> {
        let (n_channels, n_samples) = x.dim();
        if n_channels == 0 {
            return Err(CovarianceError::NoChannels);
        }
        let required = if self == Self::Cov { 2 } else { 1 };
        if n_samples < required {
            return Err(CovarianceError::InsufficientSamples {
                required,
                got: n_samples,
            });
        }

        let centered = center(x);
        let matrix = match self {
            Self::Cov => scatter(&centered) / (n_samples - 1) as f64,
            Self::Scm => scatter(&centered) / n_samples as f64,
            Self::Lwf => ledoit_wolf(&centered),
            Self::Oas => oracle_approximating(&centered),
            Self::Corr => correlation(scatter(&centered) / n_samples as f64)?,
        };

        Ok(matrix)
    }
}

impl fmt::Display for Estimator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Estimator {
    type Err = CovarianceError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|estimator| estimator.name() == name)
            .ok_or_else(|| CovarianceError::UnknownEstimator(name.to_string()))
    }
}

/// Subtract each channel's mean.
fn center(x: ArrayView2<'_, f64>) -> Array2<f64> {
    let n_samples = x.ncols() as f64;
    let means = x.sum_axis(Axis(1)) / n_samples;
    &x - &means.insert_axis(Axis(1))
}

/// X X^T, symmetrised so the result is bit-for-bit symmetric.
fn scatter(centered: &Array2<f64>) -> Array2<f64> {
    let s = centered.dot(&centered.t());
    (&s + &s.t()) * 0.5
}

/// (1 - s) Σ + s μ I
fn shrink(emp_cov: Array2<f64>, shrinkage: f64, mu: f64) -> Array2<f64> {
    let mut shrunk = emp_cov * (1.0 - shrinkage);
    shrunk.diag_mut().mapv_inplace(|d| d + shrinkage * mu);
    shrunk
}

fn ledoit_wolf(centered: &Array2<f64>) -> Array2<f64> {
    let (n_features, n_samples) = centered.dim();
    let (p, n) = (n_features as f64, n_samples as f64);

    let emp_cov = scatter(centered) / n;
    let x2 = centered.mapv(|v| v * v);
    let emp_cov_trace = x2.sum_axis(Axis(1)) / n;
    let trace_sum = emp_cov_trace.sum();
    let mu = trace_sum / p;

    let beta_ = x2.dot(&x2.t()).sum();
    let delta_ = emp_cov.iter().map(|v| v * v).sum::<f64>();

    let beta = (beta_ / n - delta_) / (p * n);
    let delta = (delta_ - 2.0 * mu * trace_sum + p * mu * mu) / p;
    let beta = beta.min(delta);

    let shrinkage = if beta <= 0.0 || delta <= 0.0 {
        0.0
    } else {
        (beta / delta).min(1.0)
    };
    tracing::trace!(shrinkage, "ledoit-wolf shrinkage");

    shrink(emp_cov, shrinkage, mu)
}

fn oracle_approximating(centered: &Array2<f64>) -> Array2<f64> {
    let (n_features, n_samples) = centered.dim();
    let (p, n) = (n_features as f64, n_samples as f64);

    let emp_cov = scatter(centered) / n;
    let mu = emp_cov.diag().sum() / p;
    let alpha = emp_cov.iter().map(|v| v * v).sum::<f64>() / (p * p);

    let num = alpha + mu * mu;
    let den = (n + 1.0) * (alpha - mu * mu / p);
    let shrinkage = if den == 0.0 { 1.0 } else { (num / den).min(1.0) };
    tracing::trace!(shrinkage, "oas shrinkage");

    shrink(emp_cov, shrinkage, mu)
}

fn correlation(cov: Array2<f64>) -> Result<Array2<f64>, CovarianceError> {
    let stddev = cov.diag().mapv(libm::sqrt);
    if let Some(channel) = stddev.iter().position(|&d| !(d > 0.0)) {
        return Err(CovarianceError::ZeroVariance { channel });
    }

    let mut corr = cov;
    for ((i, j), value) in corr.indexed_iter_mut() {
        *value = (*value / (stddev[i] * stddev[j])).clamp(-1.0, 1.0);
    }
    Ok(corr)
}

/// Check a batch's channel count against the one seen at fit time.
///
/// # Errors
///
/// Returns `DimensionMismatch` if `got` differs from `expected`.
pub fn check_channels(expected: usize, got: usize) -> Result<(), CovarianceError> {
    if got != expected {
        return Err(CovarianceError::DimensionMismatch { expected, got });
    }
    Ok(())
}

/// Estimate one covariance matrix per trial.
///
/// # Arguments
///
/// * `trials` - Batch of shape `(n_trials, n_channels, n_samples)`
/// * `estimator` - Estimation rule applied to every trial
///
/// # Returns
///
/// Array of shape `(n_trials, n_channels, n_channels)` in input order.
pub fn covariances(
    trials: ArrayView3<'_, f64>,
    estimator: Estimator,
) -> Result<Array3<f64>, CovarianceError> {
    let (n_trials, n_channels, _) = trials.dim();
    let mut out = Array3::<f64>::zeros((n_trials, n_channels, n_channels));

    for (i, (trial, mut slot)) in trials.outer_iter().zip(out.outer_iter_mut()).enumerate() {
        slot.assign(&estimator.estimate(trial)?);
        tracing::trace!(trial = i, %estimator, "estimated covariance");
    }

    Ok(out)
}

/// Estimate one augmented covariance matrix per trial.
///
/// Each trial is stacked below `prototypes` to form a super-trial of shape
/// `(R + C, T)`, with prototype rows first, and the covariance of the
/// super-trial is estimated.
///
/// # Arguments
///
/// * `trials` - Batch of shape `(n_trials, n_channels, n_samples)`
/// * `prototypes` - Prototype set of shape `(R, n_samples)`
/// * `estimator` - Estimation rule applied to every super-trial
///
/// # Returns
///
/// Array of shape `(n_trials, R + C, R + C)` in input order.
///
/// # Errors
///
/// Returns `DimensionMismatch` if the prototypes and trials disagree on the
/// number of samples.
pub fn covariances_ep(
    trials: ArrayView3<'_, f64>,
    prototypes: ArrayView2<'_, f64>,
    estimator: Estimator,
) -> Result<Array3<f64>, CovarianceError> {
    let (n_trials, n_channels, n_samples) = trials.dim();
    let (n_rows, proto_samples) = prototypes.dim();
    if proto_samples != n_samples {
        return Err(CovarianceError::DimensionMismatch {
            expected: proto_samples,
            got: n_samples,
        });
    }

    let size = n_rows + n_channels;
    let mut super_trial = Array2::<f64>::zeros((size, n_samples));
    super_trial.slice_mut(s![..n_rows, ..]).assign(&prototypes);

    let mut out = Array3::<f64>::zeros((n_trials, size, size));
    for (i, (trial, mut slot)) in trials.outer_iter().zip(out.outer_iter_mut()).enumerate() {
        super_trial.slice_mut(s![n_rows.., ..]).assign(&trial);
        slot.assign(&estimator.estimate(super_trial.view())?);
        tracing::trace!(trial = i, size, %estimator, "estimated augmented covariance");
    }

    Ok(out)
}
