//! Trial-to-matrix estimation transforms.
//!
//! Each transform maps a batch of trials `(N, C, T)` to a batch of symmetric
//! positive semi-definite matrices ready for Riemannian classification.
//!
//! | Transform | Fitted state | Output per trial |
//! |-----------|--------------|------------------|
//! | [`Covariances`] | none | `C × C` |
//! | [`ErpCovariances`] | class prototypes `(R·K, T)` | `(R·K + C) × (R·K + C)` |
//! | [`XdawnCovariances`] | xDAWN filters and evoked responses | `2·F·K` or `F·K + C` square |
//! | [`CospCovariances`] | none | `F` real `C × C` cospectra |
//!
//! # Augmented Covariances
//!
//! For event-related responses, the covariance of a single trial loses the
//! temporal shape of the response. Stacking class prototypes on top of the
//! trial before estimating the covariance puts the cross-covariance between
//! the trial and every prototype in the off-diagonal blocks:
//!
//! ```text
//!          ┌                  ┐
//!          │  Σ_PP     Σ_PX   │   Σ_PP: prototypes (constant across trials)
//!   Σ  =   │                  │   Σ_PX: trial / prototype cross-covariance
//!          │  Σ_XP     Σ_XX   │   Σ_XX: plain trial covariance
//!          └                  ┘
//! ```
//!
//! # Example
//!
//! ```
//! use ndarray::Array3;
//! use riemest::estimation::{Covariances, XdawnCovariances};
//! use riemest::pipeline::{Fit, Transform};
//!
//! let trials = Array3::from_shape_fn((6, 3, 64), |(n, c, t)| {
//!     let t = t as f64;
//!     (0.2 * t * (c + 1) as f64).sin() + (n % 2) as f64 * (0.05 * t).sin() + 0.01 * n as f64
//! });
//! let labels = [0, 1, 0, 1, 0, 1];
//!
//! let covs = Covariances::default().transform(trials.view()).unwrap();
//! assert_eq!(covs.dim(), (6, 3, 3));
//!
//! let xdawn = XdawnCovariances::new(1).unwrap();
//! let (_, augmented) = xdawn.fit_transform(trials.view(), Some(&labels)).unwrap();
//! assert_eq!(augmented.dim(), (6, 4, 4)); // 2 · 1 filter · 2 classes
//! ```
//!
//! # References
//!
//! - Barachant & Congedo (2014): "A Plug&Play P300 BCI Using Information Geometry"
//! - Congedo et al. (2017): "Riemannian geometry for EEG-based brain-computer interfaces; a primer and a review"

use alloc::vec::Vec;
use ndarray::{Array3, Array4, ArrayView2, ArrayView3, Axis};

use crate::cospectrum::{cospectrum, CospConfig, SpectralError};
use crate::covariance::{check_channels, covariances, covariances_ep, CovarianceError, Estimator};
use crate::erp::{class_prototypes, resolve_classes, ErpError, FittedXdawn, Xdawn};
use crate::fft::next_power_of_two;
use crate::linalg::EigenConfig;
use crate::pipeline::{Fit, Transform};

/// Errors raised by the estimation transforms.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EstimationError {
    /// Supervised transform fitted without labels
    #[error("this transform needs one label per trial")]
    MissingLabels,

    /// Covariance estimation failure
    #[error(transparent)]
    Covariance(#[from] CovarianceError),

    /// Cross-spectral estimation failure
    #[error(transparent)]
    Spectral(#[from] SpectralError),

    /// Prototype or spatial filter failure
    #[error(transparent)]
    Erp(#[from] ErpError),
}

/// Plain per-trial covariance matrices.
///
/// Stateless: `fit` ignores its input and returns a copy of the transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Covariances {
    estimator: Estimator,
}

impl Covariances {
    /// Create a transform using `estimator`.
    pub const fn new(estimator: Estimator) -> Self {
        Self { estimator }
    }

    /// Create a transform from an estimator name (`cov`, `scm`, `lwf`, `oas`, `corr`).
    ///
    /// # Errors
    ///
    /// Returns `UnknownEstimator` for any other name.
    pub fn from_name(name: &str) -> Result<Self, CovarianceError> {
        Ok(Self::new(name.parse()?))
    }

    /// Configured estimator.
    pub const fn estimator(&self) -> Estimator {
        self.estimator
    }
}

impl Fit for Covariances {
    type Fitted = Self;

    fn fit(&self, _trials: ArrayView3<'_, f64>, _labels: Option<&[usize]>) -> Result<Self, EstimationError> {
        Ok(*self)
    }
}

impl Transform for Covariances {
    type Output = Array3<f64>;

    fn transform(&self, trials: ArrayView3<'_, f64>) -> Result<Array3<f64>, EstimationError> {
        Ok(covariances(trials, self.estimator)?)
    }
}

/// Prototype-augmented covariances for event-related responses.
///
/// Fitting averages the trials of every class into a prototype, optionally
/// reduced to its `k` leading spatial components. Transforming stacks the
/// prototype set on top of each trial and estimates the covariance of the
/// resulting super-trial.
///
/// # Example
///
/// ```
/// use ndarray::Array3;
/// use riemest::covariance::Estimator;
/// use riemest::estimation::ErpCovariances;
/// use riemest::pipeline::Fit;
///
/// let trials = Array3::from_shape_fn((8, 4, 50), |(n, c, t)| ((n + 2 * c) as f64 + 0.3 * t as f64).sin());
/// let labels = [0, 1, 0, 1, 0, 1, 0, 1];
///
/// let erp = ErpCovariances::new(Estimator::Lwf).with_svd(2);
/// let (fitted, covs) = erp.fit_transform(trials.view(), Some(&labels)).unwrap();
///
/// assert_eq!(fitted.prototypes().dim(), (4, 50)); // 2 components × 2 classes
/// assert_eq!(covs.dim(), (8, 8, 8));
/// ```
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ErpCovariances {
    estimator: Estimator,
    classes: Option<Vec<usize>>,
    svd: Option<usize>,
    eigen: EigenConfig,
}

impl ErpCovariances {
    /// Create a transform estimating super-trial covariances with `estimator`.
    pub fn new(estimator: Estimator) -> Self {
        Self {
            estimator,
            ..Self::default()
        }
    }

    /// Build prototypes for `classes` only, in the given order.
    pub fn with_classes(mut self, classes: Vec<usize>) -> Self {
        self.classes = Some(classes);
        self
    }

    /// Reduce every prototype to its `rank` leading spatial components.
    ///
    /// A rank of 0 drops the prototypes entirely, leaving plain `C × C`
    /// covariances. A rank above the channel count fails at fit time.
    pub fn with_svd(mut self, rank: usize) -> Self {
        self.svd = Some(rank);
        self
    }

    /// Jacobi settings for the rank reduction.
    pub fn with_eigen_config(mut self, eigen: EigenConfig) -> Self {
        self.eigen = eigen;
        self
    }

    /// Configured estimator.
    pub fn estimator(&self) -> Estimator {
        self.estimator
    }

    /// Configured reduction rank.
    pub fn svd(&self) -> Option<usize> {
        self.svd
    }
}

impl Fit for ErpCovariances {
    type Fitted = FittedErpCovariances;

    fn fit(
        &self,
        trials: ArrayView3<'_, f64>,
        labels: Option<&[usize]>,
    ) -> Result<FittedErpCovariances, EstimationError> {
        let labels = labels.ok_or(EstimationError::MissingLabels)?;
        let classes = resolve_classes(self.classes.as_deref(), labels);
        let prototypes = class_prototypes(trials, labels, &classes, self.svd, &self.eigen)?;
        let n_channels = trials.len_of(Axis(1));

        tracing::debug!(
            n_classes = classes.len(),
            prototype_rows = prototypes.nrows(),
            output_size = prototypes.nrows() + n_channels,
            "fitted erp prototypes"
        );

        Ok(FittedErpCovariances {
            estimator: self.estimator,
            classes,
            prototypes,
            n_channels,
        })
    }
}

/// [`ErpCovariances`] with its learned prototype set.
#[derive(Debug, Clone, PartialEq)]
pub struct FittedErpCovariances {
    estimator: Estimator,
    classes: Vec<usize>,
    prototypes: ndarray::Array2<f64>,
    n_channels: usize,
}

impl FittedErpCovariances {
    /// Class-ordered prototype set, shape `(R·K, T)`.
    pub fn prototypes(&self) -> ArrayView2<'_, f64> {
        self.prototypes.view()
    }

    /// Classes in prototype order.
    pub fn classes(&self) -> &[usize] {
        &self.classes
    }

    /// Side of every output matrix.
    pub fn output_size(&self) -> usize {
        self.prototypes.nrows() + self.n_channels
    }
}

impl Transform for FittedErpCovariances {
    type Output = Array3<f64>;

    fn transform(&self, trials: ArrayView3<'_, f64>) -> Result<Array3<f64>, EstimationError> {
        check_channels(self.n_channels, trials.len_of(Axis(1)))?;
        Ok(covariances_ep(trials, self.prototypes.view(), self.estimator)?)
    }
}

/// xDAWN-filtered prototype-augmented covariances.
///
/// Fitting learns `n_filters` xDAWN spatial filters per class. Transforming
/// projects each trial through the filters (unless disabled) and stacks the
/// evoked responses on top, as [`ErpCovariances`] does with raw prototypes.
#[derive(Debug, Clone, PartialEq)]
pub struct XdawnCovariances {
    xdawn: Xdawn,
    estimator: Estimator,
    apply_filters: bool,
}

impl Default for XdawnCovariances {
    fn default() -> Self {
        Self {
            xdawn: Xdawn::default(),
            estimator: Estimator::default(),
            apply_filters: true,
        }
    }
}

impl XdawnCovariances {
    /// Create a transform keeping `n_filters` filters per class.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRank` if `n_filters` is zero.
    pub fn new(n_filters: usize) -> Result<Self, ErpError> {
        Ok(Self {
            xdawn: Xdawn::new(n_filters)?,
            estimator: Estimator::default(),
            apply_filters: true,
        })
    }

    /// Learn filters for `classes` only, in the given order.
    pub fn with_classes(mut self, classes: Vec<usize>) -> Self {
        self.xdawn = self.xdawn.with_classes(classes);
        self
    }

    /// Estimator for the augmented covariances.
    pub fn with_estimator(mut self, estimator: Estimator) -> Self {
        self.estimator = estimator;
        self
    }

    /// Whether trials are projected through the filters before stacking.
    pub fn apply_filters(mut self, apply: bool) -> Self {
        self.apply_filters = apply;
        self
    }

    /// Underlying spatial filter configuration.
    pub fn xdawn(&self) -> &Xdawn {
        &self.xdawn
    }
}

impl Fit for XdawnCovariances {
    type Fitted = FittedXdawnCovariances;

    fn fit(
        &self,
        trials: ArrayView3<'_, f64>,
        labels: Option<&[usize]>,
    ) -> Result<FittedXdawnCovariances, EstimationError> {
        let labels = labels.ok_or(EstimationError::MissingLabels)?;
        let xdawn = self.xdawn.fit(trials, labels)?;

        Ok(FittedXdawnCovariances {
            xdawn,
            estimator: self.estimator,
            apply_filters: self.apply_filters,
        })
    }
}

/// [`XdawnCovariances`] with its learned filters.
#[derive(Debug, Clone, PartialEq)]
pub struct FittedXdawnCovariances {
    xdawn: FittedXdawn,
    estimator: Estimator,
    apply_filters: bool,
}

impl FittedXdawnCovariances {
    /// Learned filters and evoked responses.
    pub fn xdawn(&self) -> &FittedXdawn {
        &self.xdawn
    }

    /// Side of every output matrix.
    pub fn output_size(&self) -> usize {
        let evoked = self.xdawn.evokeds().nrows();
        if self.apply_filters {
            2 * evoked
        } else {
            evoked + self.xdawn.filters().ncols()
        }
    }
}

impl Transform for FittedXdawnCovariances {
    type Output = Array3<f64>;

    fn transform(&self, trials: ArrayView3<'_, f64>) -> Result<Array3<f64>, EstimationError> {
        check_channels(self.xdawn.filters().ncols(), trials.len_of(Axis(1)))?;
        let evokeds = self.xdawn.evokeds();

        let covs = if self.apply_filters {
            let projected = self.xdawn.transform(trials)?;
            covariances_ep(projected.view(), evokeds, self.estimator)?
        } else {
            covariances_ep(trials, evokeds, self.estimator)?
        };
        Ok(covs)
    }
}

/// Real cospectral matrices over a range of frequency bins.
///
/// Stateless. The window length is rounded up to a power of two when the
/// transform is built; every other parameter is checked when a batch is
/// transformed.
///
/// # Example
///
/// ```
/// use ndarray::Array3;
/// use riemest::cospectrum::CospConfig;
/// use riemest::estimation::CospCovariances;
/// use riemest::pipeline::Transform;
///
/// let config = CospConfig::default().with_window(100).with_sample_rate(128.0).with_band(8.0, 30.0);
/// let cosp = CospCovariances::new(config);
/// assert_eq!(cosp.window(), 128);
///
/// let trials = Array3::from_shape_fn((2, 3, 256), |(_, c, t)| (0.7 * t as f64 + c as f64).sin());
/// let spectra = cosp.transform(trials.view()).unwrap();
/// assert_eq!(spectra.dim(), (2, 23, 3, 3)); // 8..=30 Hz at 1 Hz resolution
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CospCovariances {
    config: CospConfig,
}

impl Default for CospCovariances {
    fn default() -> Self {
        Self::new(CospConfig::default())
    }
}

impl CospCovariances {
    /// Create a transform, rounding the window up to the next power of two.
    pub fn new(config: CospConfig) -> Self {
        let window = next_power_of_two(config.window);
        Self {
            config: config.with_window(window),
        }
    }

    /// Effective window length.
    pub fn window(&self) -> usize {
        self.config.window
    }

    /// Effective spectral parameters.
    pub fn config(&self) -> &CospConfig {
        &self.config
    }

    /// Frequencies in Hz of the output bins.
    pub fn frequencies(&self) -> Result<Vec<f64>, SpectralError> {
        self.config.frequencies()
    }

    /// Transform trials that may differ in length.
    ///
    /// Every trial must have the same number of channels and at least
    /// `window` samples.
    ///
    /// # Returns
    ///
    /// Array of shape `(N, n_bins, C, C)`.
    pub fn transform_trials(&self, trials: &[ArrayView2<'_, f64>]) -> Result<Array4<f64>, EstimationError> {
        let n_bins = self.config.selected_bins()?.len();
        let n_channels = trials.first().map_or(0, |t| t.nrows());

        let mut out = Array4::<f64>::zeros((trials.len(), n_bins, n_channels, n_channels));
        for (i, (trial, mut slot)) in trials.iter().zip(out.outer_iter_mut()).enumerate() {
            if trial.nrows() != n_channels {
                return Err(SpectralError::ChannelMismatch {
                    expected: n_channels,
                    got: trial.nrows(),
                }
                .into());
            }
            let spectra = cospectrum(trial.view(), &self.config)?;
            slot.assign(&spectra.mapv(|z| z.re));
            tracing::trace!(trial = i, n_samples = trial.ncols(), "estimated cospectra");
        }

        Ok(out)
    }
}

impl Fit for CospCovariances {
    type Fitted = Self;

    fn fit(&self, _trials: ArrayView3<'_, f64>, _labels: Option<&[usize]>) -> Result<Self, EstimationError> {
        Ok(*self)
    }
}

impl Transform for CospCovariances {
    type Output = Array4<f64>;

    fn transform(&self, trials: ArrayView3<'_, f64>) -> Result<Array4<f64>, EstimationError> {
        let views: Vec<ArrayView2<'_, f64>> = trials.outer_iter().collect();
        self.transform_trials(&views)
    }
}
