//! Event-Related Potential (ERP) prototypes and xDAWN spatial filtering.
//!
//! Both halves of this module reduce a labelled batch of trials to a set of
//! class-ordered reference signals that an augmented covariance estimator can
//! stack on top of each new trial.
//!
//! # Class Prototypes
//!
//! The prototype of a class is its time-locked average response: averaging
//! trials that share a label cancels activity that is not phase-locked to the
//! event. An optional rank reduction replaces each `(C, T)` average `P` by
//! `U_kᵀ P`, where `U_k` holds the `k` leading left singular vectors of `P`,
//! keeping the `k` strongest spatial components.
//!
//! # xDAWN Algorithm
//!
//! xDAWN (Rivet et al., 2009) is a supervised spatial filtering method that
//! maximizes the signal-to-signal-plus-noise ratio (SSNR) of event-related
//! potentials. For every class it solves the generalized eigenvalue problem:
//!
//! ```text
//! Σ_evoked × w = λ × Σ_signal × w
//! ```
//!
//! where Σ_evoked is the covariance of the class average and Σ_signal is the
//! covariance of all trials concatenated in time. The eigenvectors with the
//! largest eigenvalues are the class's spatial filters, and the filtered class
//! average is its evoked response.
//!
//! # Example
//!
//! ```
//! use ndarray::Array3;
//! use riemest::erp::Xdawn;
//!
//! let trials = Array3::from_shape_fn((6, 3, 40), |(n, c, t)| {
//!     let t = t as f64;
//!     (0.3 * t + c as f64).sin() + (n % 2) as f64 * (0.05 * t).cos() + 0.01 * (n * 7 + c) as f64
//! });
//! let labels = [0, 1, 0, 1, 0, 1];
//!
//! let xdawn = Xdawn::new(2).unwrap().fit(trials.view(), &labels).unwrap();
//! assert_eq!(xdawn.filters().dim(), (4, 3)); // 2 filters × 2 classes
//! assert_eq!(xdawn.evokeds().dim(), (4, 40));
//! ```
//!
//! # References
//!
//! - Rivet et al. (2009): "xDAWN Algorithm to Enhance Evoked Potentials: Application to Brain-Computer Interface"
//! - Barachant & Congedo (2014): "A Plug&Play P300 BCI Using Information Geometry"

use alloc::collections::BTreeSet;
use alloc::vec::Vec;
use ndarray::{s, Array2, Array3, ArrayView2, ArrayView3, Axis};

use crate::covariance::{check_channels, CovarianceError, Estimator};
use crate::linalg::{generalized_eigen, left_singular_vectors, EigenConfig, LinalgError};

/// Errors that can occur during ERP operations.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ErpError {
    /// Batch contains no trials
    #[error("batch contains no trials")]
    NoTrials,

    /// A requested class has no matching trial
    #[error("class {class} has no trials")]
    EmptyClass {
        /// Label of the empty class
        class: usize,
    },

    /// Reduction rank exceeds the channel count, or zero xDAWN filters
    #[error("rank {0} is out of range for the number of channels")]
    InvalidRank(usize),

    /// Label vector length differs from the number of trials
    #[error("{labels} labels for {trials} trials")]
    LabelMismatch {
        /// Number of trials
        trials: usize,
        /// Number of labels
        labels: usize,
    },

    /// Eigen solver or factorisation failure
    #[error(transparent)]
    Linalg(#[from] LinalgError),

    /// Covariance estimation failure
    #[error(transparent)]
    Covariance(#[from] CovarianceError),
}

/// Distinct label values in ascending order.
pub fn unique_classes(labels: &[usize]) -> Vec<usize> {
    labels.iter().copied().collect::<BTreeSet<_>>().into_iter().collect()
}

/// Active class list: the configured subset in its given order, or every
/// distinct label in ascending order.
pub fn resolve_classes(configured: Option<&[usize]>, labels: &[usize]) -> Vec<usize> {
    match configured {
        Some(classes) => classes.to_vec(),
        None => unique_classes(labels),
    }
}

/// Check that the batch is non-empty and that labels align with trials.
pub fn check_labels(n_trials: usize, labels: &[usize]) -> Result<(), ErpError> {
    if n_trials == 0 {
        return Err(ErpError::NoTrials);
    }
    if labels.len() != n_trials {
        return Err(ErpError::LabelMismatch {
            trials: n_trials,
            labels: labels.len(),
        });
    }
    Ok(())
}

/// Average of all trials carrying `class`, shape `(C, T)`.
///
/// # Errors
///
/// Returns `EmptyClass` if no label equals `class`.
pub fn class_average(
    trials: ArrayView3<'_, f64>,
    labels: &[usize],
    class: usize,
) -> Result<Array2<f64>, ErpError> {
    let indices: Vec<usize> = labels
        .iter()
        .enumerate()
        .filter(|&(_, &label)| label == class)
        .map(|(i, _)| i)
        .collect();

    if indices.len() == 1 {
        tracing::warn!(class, "class average computed from a single trial");
    }

    trials
        .select(Axis(0), &indices)
        .mean_axis(Axis(0))
        .ok_or(ErpError::EmptyClass { class })
}

/// Project a prototype onto its `k` leading left singular vectors.
///
/// Returns `U_kᵀ P` of shape `(k, T)`. A rank of 0 keeps no component and
/// yields an empty `(0, T)` block.
///
/// # Errors
///
/// Returns `InvalidRank` if `k` exceeds the number of rows of `P`.
pub fn reduce_rank(
    prototype: ArrayView2<'_, f64>,
    k: usize,
    config: &EigenConfig,
) -> Result<Array2<f64>, ErpError> {
    if k > prototype.nrows() {
        return Err(ErpError::InvalidRank(k));
    }
    if k == 0 {
        return Ok(Array2::zeros((0, prototype.ncols())));
    }
    let u = left_singular_vectors(prototype, k, config)?;
    Ok(u.t().dot(&prototype))
}

/// Build the class-ordered prototype set of a labelled batch.
///
/// # Arguments
///
/// * `trials` - Batch of shape `(N, C, T)`
/// * `labels` - One label per trial
/// * `classes` - Classes to build prototypes for, in output order
/// * `rank` - Optional rank reduction applied to every prototype
/// * `config` - Eigen solver settings for the rank reduction
///
/// # Returns
///
/// Array of shape `(R·K, T)` with `R = C` or `R = rank` and `K = classes.len()`.
pub fn class_prototypes(
    trials: ArrayView3<'_, f64>,
    labels: &[usize],
    classes: &[usize],
    rank: Option<usize>,
    config: &EigenConfig,
) -> Result<Array2<f64>, ErpError> {
    let (n_trials, n_channels, n_samples) = trials.dim();
    check_labels(n_trials, labels)?;

    let rows = rank.unwrap_or(n_channels);
    if rows > n_channels {
        return Err(ErpError::InvalidRank(rows));
    }

    let mut prototypes = Array2::<f64>::zeros((rows * classes.len(), n_samples));
    for (i, &class) in classes.iter().enumerate() {
        let average = class_average(trials, labels, class)?;
        let block = match rank {
            Some(k) => reduce_rank(average.view(), k, config)?,
            None => average,
        };
        prototypes
            .slice_mut(s![i * rows..(i + 1) * rows, ..])
            .assign(&block);
    }

    Ok(prototypes)
}

/// Unfitted multi-class xDAWN spatial filter.
#[derive(Debug, Clone, PartialEq)]
pub struct Xdawn {
    n_filters: usize,
    classes: Option<Vec<usize>>,
    regularization: f64,
    eigen: EigenConfig,
}

impl Default for Xdawn {
    /// Four filters per class.
    fn default() -> Self {
        Self {
            n_filters: 4,
            classes: None,
            regularization: 1e-6,
            eigen: EigenConfig::default(),
        }
    }
}

impl Xdawn {
    /// Create an xDAWN filter keeping `n_filters` components per class.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRank` if `n_filters` is zero.
    pub fn new(n_filters: usize) -> Result<Self, ErpError> {
        if n_filters == 0 {
            return Err(ErpError::InvalidRank(0));
        }
        Ok(Self {
            n_filters,
            ..Self::default()
        })
    }

    /// Restrict fitting to `classes`, in the given order.
    pub fn with_classes(mut self, classes: Vec<usize>) -> Self {
        self.classes = Some(classes);
        self
    }

    /// Ridge added to the signal covariance, relative to its mean diagonal.
    pub fn with_regularization(mut self, regularization: f64) -> Self {
        self.regularization = regularization;
        self
    }

    /// Jacobi settings for the generalized eigenproblems.
    pub fn with_eigen_config(mut self, eigen: EigenConfig) -> Self {
        self.eigen = eigen;
        self
    }

    /// Filters kept per class.
    pub fn n_filters(&self) -> usize {
        self.n_filters
    }

    /// Learn the filters and evoked responses of a labelled batch.
    ///
    /// # Errors
    ///
    /// - `NoTrials` / `LabelMismatch` for malformed input
    /// - `InvalidRank` if `n_filters` exceeds the number of channels
    /// - `EmptyClass` if a configured class has no trials
    /// - `Linalg` if the signal covariance cannot be factorised
    pub fn fit(&self, trials: ArrayView3<'_, f64>, labels: &[usize]) -> Result<FittedXdawn, ErpError> {
        let (n_trials, n_channels, n_samples) = trials.dim();
        check_labels(n_trials, labels)?;
        if self.n_filters > n_channels {
            return Err(ErpError::InvalidRank(self.n_filters));
        }

        let classes = resolve_classes(self.classes.as_deref(), labels);

        // All trials side by side in time
        let mut signal = Array2::<f64>::zeros((n_channels, n_trials * n_samples));
        for (i, trial) in trials.outer_iter().enumerate() {
            signal
                .slice_mut(s![.., i * n_samples..(i + 1) * n_samples])
                .assign(&trial);
        }
        let signal_cov = Estimator::Cov.estimate(signal.view())?;
        let ridge = self.regularization * signal_cov.diag().mean().unwrap_or(0.0);

        let f = self.n_filters;
        let mut filters = Array2::<f64>::zeros((f * classes.len(), n_channels));
        let mut evokeds = Array2::<f64>::zeros((f * classes.len(), n_samples));

        for (i, &class) in classes.iter().enumerate() {
            let average = class_average(trials, labels, class)?;
            let evoked_cov = Estimator::Cov.estimate(average.view())?;
            let eigen = generalized_eigen(evoked_cov.view(), signal_cov.view(), ridge, &self.eigen)?;

            let class_filters = eigen.eigenvectors.slice(s![.., ..f]).t().to_owned();
            let rows = i * f..(i + 1) * f;
            evokeds
                .slice_mut(s![rows.clone(), ..])
                .assign(&class_filters.dot(&average));
            filters.slice_mut(s![rows, ..]).assign(&class_filters);

            tracing::trace!(class, leading_eigenvalue = eigen.eigenvalues[0], "xdawn class fitted");
        }

        tracing::debug!(
            n_classes = classes.len(),
            n_filters = f,
            n_channels,
            "fitted xdawn spatial filters"
        );

        Ok(FittedXdawn {
            classes,
            filters,
            evokeds,
        })
    }
}

/// Learned xDAWN filters and evoked responses.
#[derive(Debug, Clone, PartialEq)]
pub struct FittedXdawn {
    classes: Vec<usize>,
    filters: Array2<f64>,
    evokeds: Array2<f64>,
}

impl FittedXdawn {
    /// Classes in filter order.
    pub fn classes(&self) -> &[usize] {
        &self.classes
    }

    /// Spatial filters as rows, shape `(F·K, C)`.
    pub fn filters(&self) -> ArrayView2<'_, f64> {
        self.filters.view()
    }

    /// Filtered class averages, shape `(F·K, T)`.
    pub fn evokeds(&self) -> ArrayView2<'_, f64> {
        self.evokeds.view()
    }

    /// Project every trial through the filters.
    ///
    /// Returns a batch of shape `(N, F·K, T)`.
    ///
    /// # Errors
    ///
    /// Returns `CovarianceError::DimensionMismatch` if the trials do not have
    /// the fitted number of channels.
    pub fn transform(&self, trials: ArrayView3<'_, f64>) -> Result<Array3<f64>, ErpError> {
        let (n_trials, n_channels, n_samples) = trials.dim();
        check_channels(self.filters.ncols(), n_channels)?;

        let mut out = Array3::<f64>::zeros((n_trials, self.filters.nrows(), n_samples));
        for (trial, mut slot) in trials.outer_iter().zip(out.outer_iter_mut()) {
            slot.assign(&self.filters.dot(&trial));
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;
    use core::f64::consts::PI;
    use rand::{Rng, SeedableRng};
    use rand_xoshiro::Xoshiro256PlusPlus;

    /// Noisy trials where class 1 carries a P300-like bump on a fixed spatial pattern.
    fn synthetic_batch(n_trials: usize, n_channels: usize, n_samples: usize) -> (Array3<f64>, Vec<usize>) {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(7);
        let labels: Vec<usize> = (0..n_trials).map(|i| i % 2).collect();
        let pattern: Vec<f64> = (0..n_channels).map(|c| 1.0 - 0.2 * c as f64).collect();

        let trials = Array3::from_shape_fn((n_trials, n_channels, n_samples), |(n, c, t)| {
            let noise = rng.gen::<f64>() - 0.5;
            let phase = t as f64 / n_samples as f64;
            let bump = if labels[n] == 1 {
                5.0 * pattern[c] * libm::sin(PI * phase)
            } else {
                0.0
            };
            bump + noise
        });

        (trials, labels)
    }

    #[test]
    fn test_unique_classes_sorted() {
        assert_eq!(unique_classes(&[3, 1, 3, 0, 1]), vec![0, 1, 3]);
        assert!(unique_classes(&[]).is_empty());
    }

    #[test]
    fn test_resolve_classes_keeps_configured_order() {
        assert_eq!(resolve_classes(Some(&[2, 0]), &[0, 1, 2]), vec![2, 0]);
        assert_eq!(resolve_classes(None, &[2, 0, 1]), vec![0, 1, 2]);
    }

    #[test]
    fn test_class_average_basic() {
        let trials = Array3::from_shape_fn((3, 2, 4), |(n, c, _)| (n * 10 + c) as f64);
        let avg = class_average(trials.view(), &[0, 1, 0], 0).unwrap();

        // Mean of trials 0 and 2
        assert_eq!(avg.dim(), (2, 4));
        assert!(avg.row(0).iter().all(|&v| v == 10.0));
        assert!(avg.row(1).iter().all(|&v| v == 11.0));
    }

    #[test]
    fn test_class_average_empty_class() {
        let trials = Array3::<f64>::zeros((2, 2, 4));
        assert_eq!(
            class_average(trials.view(), &[0, 0], 5),
            Err(ErpError::EmptyClass { class: 5 })
        );
    }

    #[test]
    fn test_reduce_rank_shape_and_energy() {
        // Rank-one prototype keeps all its energy in one component
        let prototype = Array2::from_shape_fn((3, 16), |(c, t)| (c as f64 + 1.0) * libm::sin(0.4 * t as f64));
        let reduced = reduce_rank(prototype.view(), 1, &EigenConfig::default()).unwrap();

        assert_eq!(reduced.dim(), (1, 16));
        let energy = |a: &Array2<f64>| a.iter().map(|v| v * v).sum::<f64>();
        assert!((energy(&reduced) - energy(&prototype)).abs() < 1e-9);
    }

    #[test]
    fn test_reduce_rank_zero_is_empty() {
        let prototype = Array2::<f64>::ones((3, 8));
        let reduced = reduce_rank(prototype.view(), 0, &EigenConfig::default()).unwrap();
        assert_eq!(reduced.dim(), (0, 8));
    }

    #[test]
    fn test_class_prototypes_rank_zero() {
        let (trials, labels) = synthetic_batch(6, 3, 20);
        let prototypes =
            class_prototypes(trials.view(), &labels, &[0, 1], Some(0), &EigenConfig::default())
                .unwrap();
        assert_eq!(prototypes.dim(), (0, 20));
    }

    #[test]
    fn test_xdawn_default_filters() {
        assert_eq!(Xdawn::default().n_filters(), 4);
    }

    #[test]
    fn test_reduce_rank_invalid() {
        let prototype = Array2::<f64>::ones((2, 8));
        let config = EigenConfig::default();
        assert_eq!(reduce_rank(prototype.view(), 3, &config), Err(ErpError::InvalidRank(3)));
    }

    #[test]
    fn test_class_prototypes_concatenated_in_class_order() {
        let (trials, labels) = synthetic_batch(8, 3, 20);
        let config = EigenConfig::default();

        let full = class_prototypes(trials.view(), &labels, &[1, 0], None, &config).unwrap();
        assert_eq!(full.dim(), (6, 20));

        let first = class_average(trials.view(), &labels, 1).unwrap();
        assert_eq!(full.slice(s![..3, ..]), first);

        let reduced = class_prototypes(trials.view(), &labels, &[0, 1], Some(2), &config).unwrap();
        assert_eq!(reduced.dim(), (4, 20));
    }

    #[test]
    fn test_label_mismatch() {
        let trials = Array3::<f64>::zeros((3, 2, 4));
        assert_eq!(
            check_labels(3, &[0, 1]),
            Err(ErpError::LabelMismatch { trials: 3, labels: 2 })
        );
        assert_eq!(
            Xdawn::new(1).unwrap().fit(trials.view(), &[0]),
            Err(ErpError::LabelMismatch { trials: 3, labels: 1 })
        );
        assert_eq!(check_labels(0, &[]), Err(ErpError::NoTrials));
    }

    #[test]
    fn test_xdawn_rejects_zero_and_excess_filters() {
        assert_eq!(Xdawn::new(0), Err(ErpError::InvalidRank(0)));

        let (trials, labels) = synthetic_batch(4, 2, 16);
        assert_eq!(
            Xdawn::new(3).unwrap().fit(trials.view(), &labels),
            Err(ErpError::InvalidRank(3))
        );
    }

    #[test]
    fn test_xdawn_shapes_and_unit_filters() {
        let (trials, labels) = synthetic_batch(20, 4, 64);
        let fitted = Xdawn::new(2).unwrap().fit(trials.view(), &labels).unwrap();

        assert_eq!(fitted.classes(), &[0, 1]);
        assert_eq!(fitted.filters().dim(), (4, 4));
        assert_eq!(fitted.evokeds().dim(), (4, 64));

        for row in fitted.filters().rows() {
            let norm = libm::sqrt(row.iter().map(|v| v * v).sum::<f64>());
            assert!((norm - 1.0).abs() < 1e-10);
        }
    }

    #[test]
    fn test_xdawn_evoked_is_filtered_class_average() {
        let (trials, labels) = synthetic_batch(20, 4, 64);
        let fitted = Xdawn::new(2).unwrap().fit(trials.view(), &labels).unwrap();

        let target = class_average(trials.view(), &labels, 1).unwrap();
        let expected = fitted.filters().slice(s![2..4, ..]).dot(&target);
        for (a, b) in fitted.evokeds().slice(s![2..4, ..]).iter().zip(expected.iter()) {
            assert!((a - b).abs() < 1e-12);
        }
    }

    #[test]
    fn test_xdawn_leading_filter_enhances_target_response() {
        let (trials, labels) = synthetic_batch(40, 4, 64);
        let fitted = Xdawn::new(1).unwrap().fit(trials.view(), &labels).unwrap();

        // The target evoked response should dominate the non-target one
        let power = |row: usize| fitted.evokeds().row(row).iter().map(|v| v * v).sum::<f64>();
        assert!(power(1) > 10.0 * power(0));
    }

    #[test]
    fn test_xdawn_transform_projects_trials() {
        let (trials, labels) = synthetic_batch(10, 3, 32);
        let fitted = Xdawn::new(1).unwrap().fit(trials.view(), &labels).unwrap();
        let projected = fitted.transform(trials.view()).unwrap();

        assert_eq!(projected.dim(), (10, 2, 32));
        let expected = fitted.filters().dot(&trials.index_axis(Axis(0), 3));
        assert_eq!(projected.index_axis(Axis(0), 3), expected);

        let wrong = Array3::<f64>::zeros((1, 5, 32));
        assert_eq!(
            fitted.transform(wrong.view()),
            Err(ErpError::Covariance(CovarianceError::DimensionMismatch {
                expected: 3,
                got: 5
            }))
        );
    }

    #[test]
    fn test_xdawn_configured_classes() {
        let (trials, labels) = synthetic_batch(10, 3, 32);
        let fitted = Xdawn::new(1)
            .unwrap()
            .with_classes(vec![1])
            .fit(trials.view(), &labels)
            .unwrap();
        assert_eq!(fitted.classes(), &[1]);
        assert_eq!(fitted.filters().dim(), (1, 3));

        let missing = Xdawn::new(1).unwrap().with_classes(vec![4]);
        assert_eq!(
            missing.fit(trials.view(), &labels),
            Err(ErpError::EmptyClass { class: 4 })
        );
    }
}
