//! Fast Fourier Transform for spectral analysis.
//!
//! Provides an in-place radix-2 FFT for power-of-two sizes chosen at runtime,
//! enabling the windowed cross-spectral estimation in [`crate::cospectrum`].
//! Twiddle factors are computed once per transform size and reused across
//! segments and channels.

use alloc::vec::Vec;
use core::f64::consts::PI;
use num_complex::Complex64;

/// Smallest power of two greater than or equal to `n` (1 for `n == 0`).
///
/// # Example
///
/// ```
/// use riemest::fft::next_power_of_two;
///
/// assert_eq!(next_power_of_two(100), 128);
/// assert_eq!(next_power_of_two(128), 128);
/// assert_eq!(next_power_of_two(0), 1);
/// ```
pub const fn next_power_of_two(n: usize) -> usize {
    let mut size = 1;
    while size < n {
        size *= 2;
    }
    size
}

/// Fast Fourier Transform processor.
///
/// Implements in-place radix-2 Cooley-Tukey FFT for a fixed power-of-two size.
///
/// # Example
///
/// ```
/// use num_complex::Complex64;
/// use riemest::fft::Fft;
///
/// let fft = Fft::new(8).unwrap();
/// let mut data = [Complex64::new(1.0, 0.0); 8];
/// fft.forward(&mut data);
///
/// // A constant signal puts all energy in the DC bin
/// assert!((data[0].re - 8.0).abs() < 1e-12);
/// assert!(data[1].norm_sqr() < 1e-20);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Fft {
    size: usize,
    twiddles: Vec<Complex64>,
}

impl Fft {
    /// Create a new FFT processor.
    ///
    /// Returns `None` if `size` is zero or not a power of 2.
    pub fn new(size: usize) -> Option<Self> {
        if size == 0 || !size.is_power_of_two() {
            return None;
        }

        let twiddles = (0..size / 2)
            .map(|k| {
                let angle = -2.0 * PI * k as f64 / size as f64;
                Complex64::new(libm::cos(angle), libm::sin(angle))
            })
            .collect();

        Some(Self { size, twiddles })
    }

    /// Transform size.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Compute forward FFT in-place.
    ///
    /// After transformation, `data[k]` contains the complex amplitude
    /// at frequency `k * sample_rate / size`.
    ///
    /// # Panics
    ///
    /// Panics if `data.len()` differs from the transform size.
    pub fn forward(&self, data: &mut [Complex64]) {
        assert_eq!(
            data.len(),
            self.size,
            "FFT input length must equal the transform size"
        );

        bit_reverse(data);

        // Cooley-Tukey decimation-in-time
        let n = self.size;
        let mut size = 2;
        while size <= n {
            let half_size = size / 2;
            let stride = n / size;

            for start in (0..n).step_by(size) {
                for k in 0..half_size {
                    let omega = self.twiddles[k * stride];

                    let even = data[start + k];
                    let odd = data[start + k + half_size] * omega;

                    data[start + k] = even + odd;
                    data[start + k + half_size] = even - odd;
                }
            }

            size *= 2;
        }
    }
}

/// Perform bit-reversal permutation.
fn bit_reverse(data: &mut [Complex64]) {
    let bits = data.len().trailing_zeros() as usize;

    for i in 0..data.len() {
        let j = reverse_bits(i, bits);
        if j > i {
            data.swap(i, j);
        }
    }
}

fn reverse_bits(mut x: usize, bits: usize) -> usize {
    let mut result = 0;
    for _ in 0..bits {
        result = (result << 1) | (x & 1);
        x >>= 1;
    }
    result
}
