use nalgebra::{Cholesky, DMatrix, DVector, Dyn, SymmetricEigen};

/// Relative eigenvalue floor below which a matrix is treated as not
/// positive definite.
const PD_EIGEN_TOL: f64 = 1e-12;

/// Cholesky factorization that also rejects numerically singular input.
///
/// A pivot L_jj with L_jj² below `PD_EIGEN_TOL * max(A_jj)` (or any
/// non-finite entry in L) is treated as failure.
pub fn cholesky_checked(a: &DMatrix<f64>) -> Option<Cholesky<f64, Dyn>> {
    let scale = a.diagonal().iter().fold(0.0_f64, |acc, &v| acc.max(v.abs()));
    let chol = a.clone().cholesky()?;
    let l = chol.l_dirty();
    let n = l.nrows();
    for j in 0..n {
        let d = l[(j, j)];
        if !d.is_finite() || d * d <= PD_EIGEN_TOL * scale {
            return None;
        }
        for i in j..n {
            if !l[(i, j)].is_finite() {
                return None;
            }
        }
    }
    Some(chol)
}

/// Solve A * X = B for SPD A via Cholesky. Returns None if A is not SPD.
pub fn solve_spd(a: &DMatrix<f64>, b: &DMatrix<f64>) -> Option<DMatrix<f64>> {
    let chol = cholesky_checked(a)?;
    Some(chol.solve(b))
}

/// Compute the inverse of an SPD matrix via Cholesky.
pub fn inverse_spd(a: &DMatrix<f64>) -> Option<DMatrix<f64>> {
    let chol = cholesky_checked(a)?;
    Some(symmetrize(&chol.inverse()))
}

/// Symmetric square root S of an SPD matrix A, so that S * S = A.
///
/// Computed from the eigendecomposition A = V diag(λ) V'. Returns None when
/// the smallest eigenvalue is not strictly positive relative to the largest.
/// The check is scale-free: c·A passes exactly when A does.
pub fn sqrt_spd(a: &DMatrix<f64>) -> Option<DMatrix<f64>> {
    if a.nrows() != a.ncols() || a.nrows() == 0 {
        return None;
    }
    if a.iter().any(|v| !v.is_finite()) {
        return None;
    }
    let eig = SymmetricEigen::new(symmetrize(a));
    let max_ev = eig.eigenvalues.max();
    let min_ev = eig.eigenvalues.min();
    if !(max_ev > 0.0) || min_ev <= PD_EIGEN_TOL * max_ev {
        return None;
    }
    let roots = DVector::from_iterator(
        eig.eigenvalues.len(),
        eig.eigenvalues.iter().map(|&ev| ev.sqrt()),
    );
    let v = &eig.eigenvectors;
    let root = v * DMatrix::from_diagonal(&roots) * v.transpose();
    Some(symmetrize(&root))
}

/// D^{-1/2} A D^{-1/2} with D = diag(A), so the result has a unit diagonal.
///
/// Returns None if any diagonal entry is not strictly positive.
pub fn unit_diagonal(a: &DMatrix<f64>) -> Option<DMatrix<f64>> {
    let d = a.diagonal();
    if d.iter().any(|&v| !(v > 0.0 && v.is_finite())) {
        return None;
    }
    let inv_sqrt: Vec<f64> = d.iter().map(|&v| 1.0 / v.sqrt()).collect();
    let mut out = DMatrix::from_fn(a.nrows(), a.ncols(), |i, j| a[(i, j)] * inv_sqrt[i] * inv_sqrt[j]);
    for j in 0..out.nrows() {
        out[(j, j)] = 1.0;
    }
    Some(symmetrize(&out))
}

/// Return (A + A') / 2. The result is exactly symmetric since floating-point
/// addition is commutative.
pub fn symmetrize(a: &DMatrix<f64>) -> DMatrix<f64> {
    let at = a.transpose();
    (a + at) * 0.5
}

/// Column means of a matrix.
pub fn column_means(m: &DMatrix<f64>) -> Vec<f64> {
    let n = m.nrows().max(1) as f64;
    (0..m.ncols()).map(|j| m.column(j).sum() / n).collect()
}

/// Subtract the given per-column means from every row.
pub fn center_columns(m: &DMatrix<f64>, means: &[f64]) -> DMatrix<f64> {
    debug_assert_eq!(m.ncols(), means.len());
    let mut out = m.clone();
    for (j, &mu) in means.iter().enumerate() {
        out.column_mut(j).add_scalar_mut(-mu);
    }
    out
}

/// Maximum-likelihood covariance of the columns of `m` (divisor n).
pub fn empirical_covariance(m: &DMatrix<f64>) -> DMatrix<f64> {
    let n = m.nrows().max(1) as f64;
    let centered = center_columns(m, &column_means(m));
    symmetrize(&(centered.transpose() * &centered / n))
}
