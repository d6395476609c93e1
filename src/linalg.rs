//! Linear algebra primitives for covariance estimation.
//!
//! Provides the decompositions needed by prototype rank reduction and xDAWN
//! spatial filtering. Matrices are dynamically sized [`ndarray`] arrays, since
//! the side of an augmented covariance matrix depends on the number of classes
//! seen at fit time.
//!
//! # Decompositions
//!
//! - [`eigen_symmetric`]: cyclic Jacobi eigendecomposition of a symmetric matrix
//! - [`cholesky`]: lower-triangular factor of a positive definite matrix
//! - [`generalized_eigen`]: `A w = λ B w` via Cholesky whitening
//! - [`left_singular_vectors`]: leading left singular subspace of a rectangular matrix
//!
//! # Numerical Stability
//!
//! Jacobi iteration is slower than QR-based solvers but unconditionally stable
//! for symmetric input and accurate for the small matrices (tens of channels)
//! found in EEG work. Use regularization when the `B` matrix of a generalized
//! problem may be rank deficient.

use alloc::vec::Vec;
use core::cmp::Ordering;
use ndarray::{s, Array1, Array2, ArrayView1, ArrayView2, Axis};

/// Errors that can occur during matrix operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum LinalgError {
    /// Matrix is not positive definite (Cholesky failed)
    #[error("matrix is not positive definite")]
    NotPositiveDefinite,

    /// Eigenvalue decomposition did not converge
    #[error("eigenvalue decomposition did not converge")]
    ConvergenceFailed,

    /// Matrix contains NaN or infinite entries
    #[error("matrix contains non-finite values")]
    NumericalInstability,

    /// Matrix dimensions incompatible
    #[error("matrix dimensions are incompatible")]
    DimensionMismatch,
}

/// Convergence settings for Jacobi eigendecomposition.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EigenConfig {
    /// Maximum number of full Jacobi sweeps
    pub max_sweeps: usize,

    /// Relative tolerance on the off-diagonal Frobenius norm
    pub tol: f64,
}

impl Default for EigenConfig {
    fn default() -> Self {
        Self {
            max_sweeps: 64, // Jacobi converges quadratically, 10-15 sweeps is typical
            tol: 1e-12,
        }
    }
}

/// Result of eigenvalue decomposition.
#[derive(Debug, Clone, PartialEq)]
pub struct EigenDecomposition {
    /// Eigenvalues in descending order
    pub eigenvalues: Array1<f64>,

    /// Eigenvectors as columns (`eigenvectors[[row, k]]` is the row-th element of the k-th eigenvector)
    pub eigenvectors: Array2<f64>,
}

impl EigenDecomposition {
    /// Get the k-th eigenvector.
    pub fn eigenvector(&self, k: usize) -> ArrayView1<'_, f64> {
        self.eigenvectors.column(k)
    }

    /// Number of eigenpairs.
    pub fn len(&self) -> usize {
        self.eigenvalues.len()
    }

    /// Returns `true` for the decomposition of an empty matrix.
    pub fn is_empty(&self) -> bool {
        self.eigenvalues.is_empty()
    }
}

/// Side of a square matrix, or `DimensionMismatch` if it is not square.
fn square_dim(a: &ArrayView2<'_, f64>) -> Result<usize, LinalgError> {
    let (rows, cols) = a.dim();
    if rows != cols {
        return Err(LinalgError::DimensionMismatch);
    }
    Ok(rows)
}

/// Eigenvalue decomposition of a symmetric matrix using cyclic Jacobi sweeps.
///
/// Computes eigenvalues and eigenvectors such that A = V Λ V^T. Only the
/// symmetric part of `a` is meaningful; callers are expected to pass a
/// symmetric matrix.
///
/// # Returns
///
/// Eigenvalues in descending order with corresponding unit-norm eigenvectors.
///
/// # Errors
///
/// - `DimensionMismatch` if `a` is not square
/// - `NumericalInstability` if `a` contains non-finite entries
/// - `ConvergenceFailed` if the off-diagonal mass does not fall below
///   `config.tol` relative to ‖A‖_F within `config.max_sweeps` sweeps
///
/// # Example
///
/// ```
/// use ndarray::array;
/// use riemest::linalg::{eigen_symmetric, EigenConfig};
///
/// let a = array![[2.0, 1.0], [1.0, 2.0]];
/// let eig = eigen_symmetric(a.view(), &EigenConfig::default()).unwrap();
/// assert!((eig.eigenvalues[0] - 3.0).abs() < 1e-10);
/// assert!((eig.eigenvalues[1] - 1.0).abs() < 1e-10);
/// ```
pub fn eigen_symmetric(
    a: ArrayView2<'_, f64>,
    config: &EigenConfig,
) -> Result<EigenDecomposition, LinalgError> {
    let n = square_dim(&a)?;
    if a.iter().any(|v| !v.is_finite()) {
        return Err(LinalgError::NumericalInstability);
    }

    let mut a = a.to_owned();
    let mut v = Array2::<f64>::eye(n);
    let threshold = config.tol * frobenius_norm(a.view());

    for _sweep in 0..config.max_sweeps {
        if off_diagonal_norm(a.view()) <= threshold {
            return Ok(sort_eigen(&a, &v));
        }

        for p in 0..n {
            for q in (p + 1)..n {
                let a_pq = a[[p, q]];
                if a_pq == 0.0 {
                    continue;
                }
                let (cos_theta, sin_theta) = compute_jacobi_rotation(a[[p, p]], a[[q, q]], a_pq);
                apply_jacobi_rotation(&mut a, p, q, cos_theta, sin_theta);
                apply_rotation_to_vectors(&mut v, p, q, cos_theta, sin_theta);
            }
        }
    }

    if off_diagonal_norm(a.view()) <= threshold {
        return Ok(sort_eigen(&a, &v));
    }

    Err(LinalgError::ConvergenceFailed)
}

fn frobenius_norm(a: ArrayView2<'_, f64>) -> f64 {
    libm::sqrt(a.iter().map(|v| v * v).sum::<f64>())
}

fn off_diagonal_norm(a: ArrayView2<'_, f64>) -> f64 {
    let mut sum = 0.0;
    for ((i, j), &v) in a.indexed_iter() {
        if i != j {
            sum += v * v;
        }
    }
    libm::sqrt(sum)
}

/// Compute the Jacobi rotation (cos, sin) that annihilates A[p,q].
fn compute_jacobi_rotation(a_pp: f64, a_qq: f64, a_pq: f64) -> (f64, f64) {
    let theta = (a_qq - a_pp) / (2.0 * a_pq);

    // Smaller root of t² + 2θt - 1 = 0
    let t = if libm::fabs(theta) > 1e150 {
        0.5 / theta
    } else {
        let sign = if theta >= 0.0 { 1.0 } else { -1.0 };
        sign / (libm::fabs(theta) + libm::sqrt(theta * theta + 1.0))
    };

    let cos_theta = 1.0 / libm::sqrt(t * t + 1.0);
    let sin_theta = t * cos_theta;

    (cos_theta, sin_theta)
}

/// Apply A' = J^T A J for the rotation J acting on rows/columns p and q.
fn apply_jacobi_rotation(a: &mut Array2<f64>, p: usize, q: usize, cos_theta: f64, sin_theta: f64) {
    let n = a.nrows();

    for k in 0..n {
        let a_kp = a[[k, p]];
        let a_kq = a[[k, q]];
        a[[k, p]] = cos_theta * a_kp - sin_theta * a_kq;
        a[[k, q]] = sin_theta * a_kp + cos_theta * a_kq;
    }

    for k in 0..n {
        let a_pk = a[[p, k]];
        let a_qk = a[[q, k]];
        a[[p, k]] = cos_theta * a_pk - sin_theta * a_qk;
        a[[q, k]] = sin_theta * a_pk + cos_theta * a_qk;
    }

    a[[p, q]] = 0.0;
    a[[q, p]] = 0.0;
}

/// Accumulate the rotation into the eigenvector matrix: V' = V J.
fn apply_rotation_to_vectors(
    v: &mut Array2<f64>,
    p: usize,
    q: usize,
    cos_theta: f64,
    sin_theta: f64,
) {
    for k in 0..v.nrows() {
        let v_kp = v[[k, p]];
        let v_kq = v[[k, q]];
        v[[k, p]] = cos_theta * v_kp - sin_theta * v_kq;
        v[[k, q]] = sin_theta * v_kp + cos_theta * v_kq;
    }
}

/// Sort eigenvalues in descending order and reorder corresponding eigenvectors.
fn sort_eigen(a: &Array2<f64>, v: &Array2<f64>) -> EigenDecomposition {
    let diagonal = a.diag();
    let mut order: Vec<usize> = (0..diagonal.len()).collect();
    order.sort_by(|&i, &j| {
        diagonal[j]
            .partial_cmp(&diagonal[i])
            .unwrap_or(Ordering::Equal)
    });

    EigenDecomposition {
        eigenvalues: order.iter().map(|&i| diagonal[i]).collect(),
        eigenvectors: v.select(Axis(1), &order),
    }
}

/// Cholesky decomposition: A = LL^T where L is lower triangular.
///
/// Uses the Cholesky-Banachiewicz algorithm. Matrix must be symmetric
/// and positive definite.
///
/// # Errors
///
/// Returns `NotPositiveDefinite` if a pivot is non-positive, and
/// `DimensionMismatch` if `a` is not square.
pub fn cholesky(a: ArrayView2<'_, f64>) -> Result<Array2<f64>, LinalgError> {
    let n = square_dim(&a)?;
    let mut l = Array2::<f64>::zeros((n, n));

    for j in 0..n {
        for i in j..n {
            let mut sum = a[[i, j]];
            for k in 0..j {
                sum -= l[[i, k]] * l[[j, k]];
            }

            if i == j {
                if !(sum > 0.0) || !sum.is_finite() {
                    return Err(LinalgError::NotPositiveDefinite);
                }
                l[[i, j]] = libm::sqrt(sum);
            } else {
                l[[i, j]] = sum / l[[j, j]];
            }
        }
    }

    Ok(l)
}

/// Invert a lower triangular matrix column by column with forward substitution.
fn lower_triangular_inverse(l: &Array2<f64>) -> Array2<f64> {
    let n = l.nrows();
    let mut inv = Array2::<f64>::zeros((n, n));

    for col in 0..n {
        for i in col..n {
            let mut sum = if i == col { 1.0 } else { 0.0 };
            for k in col..i {
                sum -= l[[i, k]] * inv[[k, col]];
            }
            inv[[i, col]] = sum / l[[i, i]];
        }
    }

    inv
}

/// Solve generalized eigenvalue problem: A w = λ B w.
///
/// Uses Cholesky whitening to convert to a standard symmetric eigenproblem.
///
/// # Arguments
///
/// * `a` - Symmetric positive semi-definite matrix
/// * `b` - Symmetric positive definite matrix
/// * `regularization` - Added to the diagonal of B before factorisation
/// * `config` - Jacobi convergence settings
///
/// # Algorithm
///
/// 1. B_reg = B + λI, Cholesky B_reg = LL^T
/// 2. P = L^{-1} A L^{-T}
/// 3. Standard EVD: P v = μ v
/// 4. Back-transform w = L^{-T} v and normalise each w to unit length
///
/// # Errors
///
/// Returns error if shapes disagree, Cholesky fails, or the eigen solver
/// does not converge.
pub fn generalized_eigen(
    a: ArrayView2<'_, f64>,
    b: ArrayView2<'_, f64>,
    regularization: f64,
    config: &EigenConfig,
) -> Result<EigenDecomposition, LinalgError> {
    let n = square_dim(&a)?;
    if square_dim(&b)? != n {
        return Err(LinalgError::DimensionMismatch);
    }

    let mut b_reg = b.to_owned();
    b_reg.diag_mut().mapv_inplace(|d| d + regularization);

    let l = cholesky(b_reg.view())?;
    let l_inv = lower_triangular_inverse(&l);

    let p = l_inv.dot(&a).dot(&l_inv.t());
    let p = (&p + &p.t()) * 0.5;

    let mut eigen = eigen_symmetric(p.view(), config)?;
    let mut w = l_inv.t().dot(&eigen.eigenvectors);

    for mut column in w.columns_mut() {
        let norm = libm::sqrt(column.iter().map(|v| v * v).sum::<f64>());
        if norm > 1e-15 {
            column.mapv_inplace(|v| v / norm);
        }
    }

    eigen.eigenvectors = w;
    Ok(eigen)
}

/// Leading `k` left singular vectors of a rectangular matrix.
///
/// The left singular vectors of M are the eigenvectors of M M^T, so this
/// returns the top-`k` eigenvectors of the row Gram matrix as a
/// `(rows, k)` matrix with orthonormal columns, ordered by decreasing
/// singular value.
///
/// # Errors
///
/// Returns `DimensionMismatch` if `k` exceeds the number of rows.
pub fn left_singular_vectors(
    m: ArrayView2<'_, f64>,
    k: usize,
    config: &EigenConfig,
) -> Result<Array2<f64>, LinalgError> {
    if k > m.nrows() {
        return Err(LinalgError::DimensionMismatch);
    }

    let gram = m.dot(&m.t());
    let gram = (&gram + &gram.t()) * 0.5;
    let eigen = eigen_symmetric(gram.view(), config)?;

    Ok(eigen.eigenvectors.slice(s![.., ..k]).to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn assert_close(a: &Array2<f64>, b: &Array2<f64>, tol: f64) {
        assert_eq!(a.dim(), b.dim());
        for (x, y) in a.iter().zip(b.iter()) {
            assert!((x - y).abs() < tol, "{} vs {}", x, y);
        }
    }

    #[test]
    fn test_eigen_diagonal_sorted_descending() {
        let a = array![[1.0, 0.0, 0.0], [0.0, 3.0, 0.0], [0.0, 0.0, 2.0]];
        let eig = eigen_symmetric(a.view(), &EigenConfig::default()).unwrap();

        assert_eq!(eig.eigenvalues.to_vec(), alloc::vec![3.0, 2.0, 1.0]);
        assert!((eig.eigenvector(0)[1].abs() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_eigen_reconstruction() {
        let a = array![
            [4.0, 1.0, 0.5, 0.2],
            [1.0, 3.0, 0.3, 0.1],
            [0.5, 0.3, 2.0, 0.4],
            [0.2, 0.1, 0.4, 1.5]
        ];
        let eig = eigen_symmetric(a.view(), &EigenConfig::default()).unwrap();

        let lambda = Array2::from_diag(&eig.eigenvalues);
        let rebuilt = eig.eigenvectors.dot(&lambda).dot(&eig.eigenvectors.t());
        assert_close(&rebuilt, &a, 1e-9);

        // Orthonormal eigenvectors
        let gram = eig.eigenvectors.t().dot(&eig.eigenvectors);
        assert_close(&gram, &Array2::eye(4), 1e-9);

        for w in eig.eigenvalues.windows(2) {
            assert!(w[0] >= w[1]);
        }
    }

    #[test]
    fn test_eigen_zero_and_empty_matrix() {
        let zero = Array2::<f64>::zeros((3, 3));
        let eig = eigen_symmetric(zero.view(), &EigenConfig::default()).unwrap();
        assert!(eig.eigenvalues.iter().all(|&v| v == 0.0));

        let empty = Array2::<f64>::zeros((0, 0));
        let eig = eigen_symmetric(empty.view(), &EigenConfig::default()).unwrap();
        assert!(eig.is_empty());
    }

    #[test]
    fn test_eigen_rejects_non_square_and_nan() {
        let a = Array2::<f64>::zeros((2, 3));
        assert_eq!(
            eigen_symmetric(a.view(), &EigenConfig::default()),
            Err(LinalgError::DimensionMismatch)
        );

        let b = array![[1.0, f64::NAN], [f64::NAN, 1.0]];
        assert_eq!(
            eigen_symmetric(b.view(), &EigenConfig::default()),
            Err(LinalgError::NumericalInstability)
        );
    }

    #[test]
    fn test_cholesky() {
        let a = array![[4.0, 2.0], [2.0, 3.0]];
        let l = cholesky(a.view()).unwrap();

        assert!((l[[0, 0]] - 2.0).abs() < 1e-12);
        assert!((l[[1, 0]] - 1.0).abs() < 1e-12);
        assert!((l[[1, 1]] - 2.0f64.sqrt()).abs() < 1e-12);
        assert_eq!(l[[0, 1]], 0.0);
        assert_close(&l.dot(&l.t()), &a, 1e-12);
    }

    #[test]
    fn test_cholesky_not_positive_definite() {
        let a = array![[1.0, 2.0], [2.0, 1.0]];
        assert_eq!(cholesky(a.view()), Err(LinalgError::NotPositiveDefinite));
    }

    #[test]
    fn test_lower_triangular_inverse() {
        let l = array![[2.0, 0.0, 0.0], [1.0, 3.0, 0.0], [0.5, -1.0, 4.0]];
        let inv = lower_triangular_inverse(&l);
        assert_close(&l.dot(&inv), &Array2::eye(3), 1e-12);
    }

    #[test]
    fn test_generalized_eigen_satisfies_equation() {
        let a = array![[3.0, 1.0, 0.0], [1.0, 2.0, 0.5], [0.0, 0.5, 1.0]];
        let b = array![[2.0, 0.3, 0.1], [0.3, 1.5, 0.2], [0.1, 0.2, 1.0]];
        let eig = generalized_eigen(a.view(), b.view(), 0.0, &EigenConfig::default()).unwrap();

        for k in 0..3 {
            let w = eig.eigenvector(k);
            let lhs = a.dot(&w);
            let rhs = b.dot(&w) * eig.eigenvalues[k];
            for (x, y) in lhs.iter().zip(rhs.iter()) {
                assert!((x - y).abs() < 1e-9);
            }
            let norm: f64 = w.iter().map(|v| v * v).sum::<f64>().sqrt();
            assert!((norm - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_generalized_eigen_shape_mismatch() {
        let a = Array2::<f64>::eye(2);
        let b = Array2::<f64>::eye(3);
        assert_eq!(
            generalized_eigen(a.view(), b.view(), 0.0, &EigenConfig::default()),
            Err(LinalgError::DimensionMismatch)
        );
    }

    #[test]
    fn test_left_singular_vectors_rank_one() {
        // Rank-one matrix u v^T: the leading left singular vector is ±u/|u|
        let m = array![[1.0, 2.0, 3.0, 4.0], [2.0, 4.0, 6.0, 8.0], [0.0, 0.0, 0.0, 0.0]];
        let u = left_singular_vectors(m.view(), 1, &EigenConfig::default()).unwrap();

        assert_eq!(u.dim(), (3, 1));
        let expected = [1.0 / 5.0f64.sqrt(), 2.0 / 5.0f64.sqrt(), 0.0];
        let sign = u[[0, 0]].signum();
        for (got, want) in u.column(0).iter().zip(expected.iter()) {
            assert!((got * sign - want).abs() < 1e-10);
        }
    }

    #[test]
    fn test_left_singular_vectors_rank_too_large() {
        let m = Array2::<f64>::ones((2, 5));
        assert_eq!(
            left_singular_vectors(m.view(), 3, &EigenConfig::default()),
            Err(LinalgError::DimensionMismatch)
        );
    }
}
