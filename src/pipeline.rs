//! Fit/transform capabilities shared by every estimation transform.
//!
//! Downstream Riemannian stages (tangent-space mapping, minimum distance to
//! mean) consume batches of matrices, so every estimator in this crate exposes
//! the same two-step surface: learn whatever the transform needs from a
//! training batch, then map any number of batches to matrices.
//!
//! # Fitted Variants
//!
//! [`Fit::fit`] borrows the configuration immutably and returns a separate
//! fitted value that owns the learned state:
//!
//! ```text
//! ErpCovariances ──fit──▶ FittedErpCovariances ──transform──▶ (N, M, M)
//!   (config only)          (config + prototypes)
//! ```
//!
//! This makes two mistakes unrepresentable:
//!
//! - calling `transform` before `fit` (the unfitted type has no `transform`)
//! - re-fitting while a `transform` reads the learned state (the fitted value
//!   is never mutated)
//!
//! Stateless transforms such as [`Covariances`](crate::estimation::Covariances)
//! are their own fitted form: `fit` returns a clone and labels are ignored.
//!
//! # Labels
//!
//! Labels are passed as `Option<&[usize]>`. Supervised transforms (prototype
//! and xDAWN covariances) return
//! [`EstimationError::MissingLabels`] when given `None`; unsupervised ones
//! accept either.
//!
//! # Examples
//!
//! ```
//! use ndarray::Array3;
//! use riemest::estimation::ErpCovariances;
//! use riemest::pipeline::{Fit, Transform};
//!
//! let trials = Array3::from_shape_fn((4, 2, 32), |(n, c, t)| ((n + c + 1) as f64 * 0.2 * t as f64).cos());
//! let labels = [0, 1, 0, 1];
//!
//! let fitted = ErpCovariances::default().fit(trials.view(), Some(&labels)).unwrap();
//! let covs = fitted.transform(trials.view()).unwrap();
//! assert_eq!(covs.dim(), (4, 6, 6)); // 2 channels × (2 classes + 1)
//! ```

use ndarray::ArrayView3;

use crate::estimation::EstimationError;

/// Map a batch of trials to its matrix representation.
///
/// Implemented by every fitted transform. `transform` never mutates the
/// learned state, so calling it repeatedly on the same batch returns equal
/// results.
pub trait Transform {
    /// Batch representation, usually `Array3<f64>` of shape `(N, M, M)`.
    type Output;

    /// Transform a batch of shape `(n_trials, n_channels, n_samples)`.
    ///
    /// Output order equals input order. The first failing trial aborts the
    /// whole batch.
    fn transform(&self, trials: ArrayView3<'_, f64>) -> Result<Self::Output, EstimationError>;
}

/// Learn a fitted transform from a training batch.
pub trait Fit {
    /// Fitted form holding the learned state.
    type Fitted: Transform;

    /// Learn from `trials`, optionally using one label per trial.
    fn fit(
        &self,
        trials: ArrayView3<'_, f64>,
        labels: Option<&[usize]>,
    ) -> Result<Self::Fitted, EstimationError>;

    /// Fit on `trials`, then transform the same batch.
    ///
    /// Returns the fitted transform alongside the output so the learned state
    /// can be reused on new batches.
    fn fit_transform(
        &self,
        trials: ArrayView3<'_, f64>,
        labels: Option<&[usize]>,
    ) -> Result<(Self::Fitted, <Self::Fitted as Transform>::Output), EstimationError> {
        let fitted = self.fit(trials, labels)?;
        let output = fitted.transform(trials)?;
        Ok((fitted, output))
    }
}
