//! Windowed cross-spectral estimation.
//!
//! Turns one multichannel trial into a stack of per-frequency `C×C` complex
//! cross-spectral matrices, one per retained FFT bin. Taking the real part of
//! each bin gives the cospectrum used by
//! [`CospCovariances`](crate::estimation::CospCovariances).
//!
//! # Algorithm
//!
//! 1. Split the trial into segments of `window` samples, hopping by
//!    `max(1, floor((1 - overlap) * window))` samples
//! 2. Taper every segment of every channel with the window function
//! 3. FFT each tapered segment and keep bins `0..window / 2`
//! 4. Optionally keep only the bins whose frequency `k * fs / window` lies in
//!    the requested band
//! 5. For each bin, average the outer products across segments:
//!    `S[a, b] = Σ_w conj(X_w[a]) X_w[b] / (n_windows · Σ taper²)`
//!
//! # Phase Correction
//!
//! Each segment's FFT is phase-referenced to the start of that segment. With
//! phase correction enabled, bin `k` of a segment starting at sample `t1` is
//! multiplied by `exp(-2πi·k·t1 / window)`, which references every segment
//! to the start of the trial instead. The factor is the same for every
//! channel of a segment, so it cancels in `conj(X_a)·X_b`: the cross-spectral
//! matrices, and hence the cospectra, are unchanged up to rounding.
//!
//! # Example
//!
//! ```
//! use ndarray::Array2;
//! use riemest::cospectrum::{cospectrum, CospConfig};
//!
//! let trial = Array2::from_shape_fn((4, 256), |(c, t)| ((c + 1) as f64 * 0.1 * t as f64).sin());
//! let spectra = cospectrum(trial.view(), &CospConfig::default()).unwrap();
//!
//! // 128-sample window -> 64 bins of 4×4 matrices
//! assert_eq!(spectra.dim(), (64, 4, 4));
//! ```

use alloc::vec;
use alloc::vec::Vec;
use core::f64::consts::PI;
use ndarray::{s, Array3, ArrayView2};
use num_complex::Complex64;

use crate::fft::Fft;
use crate::window::{window_coefficients, window_power, WindowType};

/// Errors that can occur during cross-spectral estimation.
#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
pub enum SpectralError {
    /// Window length is not a power of two of at least 2
    #[error("window length {0} must be a power of two of at least 2")]
    InvalidWindow(usize),

    /// Overlap outside [0, 1)
    #[error("overlap {0} must lie in [0, 1)")]
    InvalidOverlap(f64),

    /// Trial shorter than one window
    #[error("trial has {samples} samples, fewer than the {window}-sample window")]
    SignalTooShort {
        /// Window length
        window: usize,
        /// Samples in the trial
        samples: usize,
    },

    /// Frequency band requested without a sample rate
    #[error("a frequency band requires a sample rate")]
    MissingSampleRate,

    /// Sample rate not strictly positive
    #[error("sample rate {0} must be positive")]
    InvalidSampleRate(f64),

    /// Band bounds not finite or reversed
    #[error("invalid frequency band [{min}, {max}]")]
    InvalidBand {
        /// Lower bound in Hz
        min: f64,
        /// Upper bound in Hz
        max: f64,
    },

    /// No FFT bin falls inside the band
    #[error("no frequency bin falls inside [{min}, {max}]")]
    EmptyBand {
        /// Lower bound in Hz
        min: f64,
        /// Upper bound in Hz
        max: f64,
    },

    /// Trials of one batch disagree on the channel count
    #[error("trial has {got} channels, expected {expected}")]
    ChannelMismatch {
        /// Channels of the first trial
        expected: usize,
        /// Channels of the offending trial
        got: usize,
    },
}

/// Inclusive frequency range in Hz.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrequencyBand {
    /// Lowest retained frequency
    pub min: f64,
    /// Highest retained frequency
    pub max: f64,
}

impl FrequencyBand {
    /// Create a band from its bounds.
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// Whether `frequency` lies within the band (bounds included).
    pub fn contains(&self, frequency: f64) -> bool {
        frequency >= self.min && frequency <= self.max
    }
}

/// Parameters of the windowed cross-spectral estimate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CospConfig {
    /// Segment and FFT length in samples (power of two)
    pub window: usize,

    /// Fraction of each segment shared with the next, in [0, 1)
    pub overlap: f64,

    /// Optional frequency range to retain; requires `sample_rate`
    pub band: Option<FrequencyBand>,

    /// Sampling frequency in Hz
    pub sample_rate: Option<f64>,

    /// Reference segment phases to the start of the trial
    pub phase_correction: bool,

    /// Taper applied to every segment
    pub window_type: WindowType,
}

impl Default for CospConfig {
    fn default() -> Self {
        Self {
            window: 128,
            overlap: 0.75,
            band: None,
            sample_rate: None,
            phase_correction: false,
            window_type: WindowType::Hann,
        }
    }
}

impl CospConfig {
    /// Set the window length.
    pub const fn with_window(mut self, window: usize) -> Self {
        self.window = window;
        self
    }

    /// Set the overlap fraction.
    pub const fn with_overlap(mut self, overlap: f64) -> Self {
        self.overlap = overlap;
        self
    }

    /// Restrict the estimate to `[min, max]` Hz.
    pub const fn with_band(mut self, min: f64, max: f64) -> Self {
        self.band = Some(FrequencyBand::new(min, max));
        self
    }

    /// Set the sampling frequency.
    pub const fn with_sample_rate(mut self, sample_rate: f64) -> Self {
        self.sample_rate = Some(sample_rate);
        self
    }

    /// Enable or disable phase correction.
    pub const fn with_phase_correction(mut self, enabled: bool) -> Self {
        self.phase_correction = enabled;
        self
    }

    /// Set the taper.
    pub const fn with_window_type(mut self, window_type: WindowType) -> Self {
        self.window_type = window_type;
        self
    }

    /// Hop between consecutive segments in samples.
    pub fn step(&self) -> usize {
        let step = ((1.0 - self.overlap) * self.window as f64) as usize;
        step.max(1)
    }

    /// Number of complete segments in a trial of `n_samples` samples.
    ///
    /// Returns 0 if the trial is shorter than the window.
    pub fn num_windows(&self, n_samples: usize) -> usize {
        if n_samples < self.window {
            return 0;
        }
        (n_samples - self.window) / self.step() + 1
    }

    /// Number of FFT bins before band selection.
    pub const fn num_frequencies(&self) -> usize {
        self.window / 2
    }

    /// Check the window and overlap.
    pub fn validate(&self) -> Result<(), SpectralError> {
        if self.window < 2 || !self.window.is_power_of_two() {
            return Err(SpectralError::InvalidWindow(self.window));
        }
        if !(0.0..1.0).contains(&self.overlap) {
            return Err(SpectralError::InvalidOverlap(self.overlap));
        }
        Ok(())
    }

    /// Indices of the FFT bins retained by the band selection.
    ///
    /// Without a band every bin in `0..window / 2` is kept.
    pub fn selected_bins(&self) -> Result<Vec<usize>, SpectralError> {
        self.validate()?;
        let n_freqs = self.num_frequencies();

        let Some(band) = self.band else {
            return Ok((0..n_freqs).collect());
        };

        let sample_rate = self.sample_rate.ok_or(SpectralError::MissingSampleRate)?;
        if !(sample_rate > 0.0) || !sample_rate.is_finite() {
            return Err(SpectralError::InvalidSampleRate(sample_rate));
        }
        if !band.min.is_finite() || !band.max.is_finite() || band.min > band.max {
            return Err(SpectralError::InvalidBand {
                min: band.min,
                max: band.max,
            });
        }

        let bins: Vec<usize> = (0..n_freqs)
            .filter(|&k| band.contains(bin_frequency(k, self.window, sample_rate)))
            .collect();

        if bins.is_empty() {
            return Err(SpectralError::EmptyBand {
                min: band.min,
                max: band.max,
            });
        }

        Ok(bins)
    }

    /// Frequencies in Hz of the retained bins.
    ///
    /// # Errors
    ///
    /// Returns `MissingSampleRate` when no sample rate is configured, plus any
    /// error of [`selected_bins`](Self::selected_bins).
    pub fn frequencies(&self) -> Result<Vec<f64>, SpectralError> {
        let sample_rate = self.sample_rate.ok_or(SpectralError::MissingSampleRate)?;
        let bins = self.selected_bins()?;
        Ok(bins
            .into_iter()
            .map(|k| bin_frequency(k, self.window, sample_rate))
            .collect())
    }
}

/// Centre frequency of FFT bin `k`.
#[inline]
pub fn bin_frequency(k: usize, window: usize, sample_rate: f64) -> f64 {
    k as f64 * sample_rate / window as f64
}

/// Estimate the cross-spectral matrices of one trial.
///
/// # Arguments
///
/// * `trial` - Array of shape `(n_channels, n_samples)`
/// * `config` - Window, overlap, band and phase-correction settings
///
/// # Returns
///
/// Complex array of shape `(n_bins, n_channels, n_channels)`, frequency axis
/// first. Every bin is Hermitian.
///
/// # Errors
///
/// Returns the first failing check of [`CospConfig::selected_bins`], or
/// `SignalTooShort` if the trial is shorter than one window.
pub fn cospectrum(
    trial: ArrayView2<'_, f64>,
    config: &CospConfig,
) -> Result<Array3<Complex64>, SpectralError> {
    let bins = config.selected_bins()?;
    let (n_channels, n_samples) = trial.dim();
    let window = config.window;

    let n_windows = config.num_windows(n_samples);
    if n_windows == 0 {
        return Err(SpectralError::SignalTooShort {
            window,
            samples: n_samples,
        });
    }

    let fft = Fft::new(window).ok_or(SpectralError::InvalidWindow(window))?;
    let taper = window_coefficients(config.window_type, window);
    let step = config.step();

    // spectra[[w, ch, j]]: bin bins[j] of segment w
    let mut spectra = Array3::<Complex64>::zeros((n_windows, n_channels, bins.len()));
    let mut buffer = vec![Complex64::new(0.0, 0.0); window];
    let mut shift = vec![Complex64::new(1.0, 0.0); bins.len()];

    for w in 0..n_windows {
        let start = w * step;
        if config.phase_correction {
            for (factor, &k) in shift.iter_mut().zip(bins.iter()) {
                *factor = segment_phase(k, start, window);
            }
        }

        for ch in 0..n_channels {
            let segment = trial.slice(s![ch, start..start + window]);
            for ((slot, &x), &coef) in buffer.iter_mut().zip(segment.iter()).zip(taper.iter()) {
                *slot = Complex64::new(x * coef, 0.0);
            }

            fft.forward(&mut buffer);

            for (j, &k) in bins.iter().enumerate() {
                spectra[[w, ch, j]] = buffer[k] * shift[j];
            }
        }
    }

    let scale = 1.0 / (n_windows as f64 * window_power(&taper));
    let mut out = Array3::<Complex64>::zeros((bins.len(), n_channels, n_channels));

    for (j, mut matrix) in out.outer_iter_mut().enumerate() {
        let x = spectra.slice(s![.., .., j]);
        for a in 0..n_channels {
            for b in a..n_channels {
                let mut acc = Complex64::new(0.0, 0.0);
                for w in 0..n_windows {
                    acc += x[[w, a]].conj() * x[[w, b]];
                }
                acc = acc * scale;
                matrix[[a, b]] = acc;
                matrix[[b, a]] = acc.conj();
            }
        }
    }

    tracing::trace!(
        n_windows,
        n_bins = bins.len(),
        n_channels,
        "estimated cross-spectral matrices"
    );

    Ok(out)
}

/// Phase shift `exp(-2πi·k·start / window)` moving bin `k` of a segment
/// starting at `start` to the trial's time origin.
pub fn segment_phase(k: usize, start: usize, window: usize) -> Complex64 {
    // k·start can be large; reduce modulo the window before scaling
    let turns = ((k * start) % window) as f64 / window as f64;
    let angle = -2.0 * PI * turns;
    Complex64::new(libm::cos(angle), libm::sin(angle))
}
