//! Graphical lasso: sparse precision matrix from an empirical covariance.
//!
//! Solves
//!
//! ```text
//! max_Θ  log det Θ - tr(SΘ) - ρ Σ_{i≠j} |Θ_ij|
//! ```
//!
//! by block coordinate descent over the columns of the working covariance W
//! (Friedman, Hastie & Tibshirani 2008). Each column update is a lasso
//! problem solved by cyclic coordinate descent. The diagonal is not
//! penalized, so W_jj = S_jj throughout and ρ ≥ max_{i≠j} |S_ij| yields a
//! diagonal Θ.

use nalgebra::DMatrix;

use crate::error::{NetError, Result};
use crate::matrix::dense::symmetrize;

/// A penalized precision-matrix estimator.
///
/// Given an empirical covariance `s` (Q × Q) and a penalty `rho >= 0`,
/// return a symmetric precision-matrix estimate. Implementations must be
/// deterministic; the path fitter calls them from several threads.
pub trait PrecisionSolver: Sync {
    fn solve(&self, s: &DMatrix<f64>, rho: f64) -> Result<DMatrix<f64>>;
}

/// Block coordinate descent graphical lasso.
#[derive(Debug, Clone, Copy)]
pub struct GraphicalLasso {
    /// Maximum outer sweeps over all columns (default: 500).
    max_iter: usize,
    /// Convergence tolerance, relative to the mean absolute off-diagonal of S.
    tol: f64,
    /// Maximum coordinate descent sweeps per column lasso (default: 1000).
    inner_max_iter: usize,
}

impl Default for GraphicalLasso {
    fn default() -> Self {
        Self {
            max_iter: 500,
            tol: 1e-6,
            inner_max_iter: 1000,
        }
    }
}

impl GraphicalLasso {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum number of outer sweeps.
    pub fn max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    /// Set the relative convergence tolerance.
    pub fn tolerance(mut self, tol: f64) -> Self {
        self.tol = tol;
        self
    }

    /// Set the maximum coordinate descent sweeps per column.
    pub fn inner_max_iter(mut self, inner_max_iter: usize) -> Self {
        self.inner_max_iter = inner_max_iter;
        self
    }
}

impl PrecisionSolver for GraphicalLasso {
    fn solve(&self, s: &DMatrix<f64>, rho: f64) -> Result<DMatrix<f64>> {
        let q = s.nrows();
        if q == 0 || s.ncols() != q {
            return Err(NetError::InvalidArgument(format!(
                "covariance must be square and non-empty, got {}x{}",
                s.nrows(),
                s.ncols()
            )));
        }
        if !(rho.is_finite() && rho >= 0.0) {
            return Err(NetError::InvalidArgument(format!(
                "penalty must be finite and non-negative, got {}",
                rho
            )));
        }
        for j in 0..q {
            let d = s[(j, j)];
            if !(d.is_finite() && d > 0.0) {
                return Err(NetError::singular(format!(
                    "covariance diagonal entry {} is {}",
                    j, d
                )));
            }
        }

        if q == 1 {
            return Ok(DMatrix::from_element(1, 1, 1.0 / s[(0, 0)]));
        }

        let mut offdiag_sum = 0.0;
        for j in 0..q {
            for i in 0..q {
                if i != j {
                    offdiag_sum += s[(i, j)].abs();
                }
            }
        }
        let n_off = (q * (q - 1)) as f64;
        let threshold = self.tol * offdiag_sum / n_off;

        let mut w = s.clone();
        // Column j holds the lasso coefficients for node j (warm starts).
        let mut beta = DMatrix::<f64>::zeros(q - 1, q);
        let others: Vec<Vec<usize>> = (0..q)
            .map(|j| (0..q).filter(|&k| k != j).collect())
            .collect();

        let mut converged = false;
        let mut sweeps = 0;
        while sweeps < self.max_iter {
            sweeps += 1;
            let w_old = w.clone();

            for j in 0..q {
                let idx = &others[j];
                let w11 = w.select_rows(idx).select_columns(idx);
                let s12: Vec<f64> = idx.iter().map(|&k| s[(k, j)]).collect();
                let mut b: Vec<f64> = beta.column(j).iter().copied().collect();

                lasso_coordinate_descent(&w11, &s12, rho, &mut b, self.inner_max_iter, self.tol);

                for (a, &k) in idx.iter().enumerate() {
                    let v: f64 = (0..q - 1).map(|c| w11[(a, c)] * b[c]).sum();
                    w[(k, j)] = v;
                    w[(j, k)] = v;
                }
                beta.column_mut(j).copy_from_slice(&b);
            }

            let mut change = 0.0;
            for j in 0..q {
                for i in 0..q {
                    if i != j {
                        change += (w[(i, j)] - w_old[(i, j)]).abs();
                    }
                }
            }
            if change / n_off <= threshold {
                converged = true;
                break;
            }
        }

        if !converged {
            return Err(NetError::NumericDivergence {
                iterations: sweeps,
                location: Default::default(),
            });
        }

        // Θ_jj = 1 / (W_jj - w12'β),  Θ_{-j,j} = -β Θ_jj
        let mut theta = DMatrix::<f64>::zeros(q, q);
        for j in 0..q {
            let idx = &others[j];
            let w12b: f64 = idx
                .iter()
                .enumerate()
                .map(|(a, &k)| w[(k, j)] * beta[(a, j)])
                .sum();
            let denom = w[(j, j)] - w12b;
            if !(denom.is_finite() && denom > 0.0) {
                return Err(NetError::singular(format!(
                    "graphical lasso pivot for trait {} is {:.3e}",
                    j, denom
                )));
            }
            let tjj = 1.0 / denom;
            theta[(j, j)] = tjj;
            for (a, &k) in idx.iter().enumerate() {
                theta[(k, j)] = -beta[(a, j)] * tjj;
            }
        }

        Ok(symmetrize(&theta))
    }
}

/// Cyclic coordinate descent for
/// `min_β ½ β'Vβ - s'β + ρ‖β‖₁`, updating `beta` in place.
fn lasso_coordinate_descent(
    v: &DMatrix<f64>,
    s: &[f64],
    rho: f64,
    beta: &mut [f64],
    max_iter: usize,
    tol: f64,
) {
    let p = s.len();
    for _ in 0..max_iter {
        let mut max_delta = 0.0_f64;
        for c in 0..p {
            let mut r = s[c];
            for m in 0..p {
                if m != c {
                    r -= v[(c, m)] * beta[m];
                }
            }
            let updated = soft_threshold(r, rho) / v[(c, c)];
            max_delta = max_delta.max((updated - beta[c]).abs());
            beta[c] = updated;
        }
        if max_delta <= tol {
            break;
        }
    }
}

fn soft_threshold(x: f64, t: f64) -> f64 {
    if x > t {
        x - t
    } else if x < -t {
        x + t
    } else {
        0.0
    }
}
