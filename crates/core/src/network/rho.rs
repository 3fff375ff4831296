use nalgebra::DMatrix;

use crate::error::{NetError, Result};

/// Smallest penalty at which the graphical lasso solution for `s` is
/// diagonal: the largest absolute off-diagonal covariance.
///
/// When every off-diagonal entry is zero (including the single-trait case)
/// the largest diagonal entry is used instead so that a usable path still
/// exists.
pub fn rho_max(s: &DMatrix<f64>) -> Result<f64> {
    let q = s.nrows();
    let mut max_off = 0.0_f64;
    let mut max_diag = 0.0_f64;
    for j in 0..q {
        max_diag = max_diag.max(s[(j, j)].abs());
        for i in 0..j {
            max_off = max_off.max(s[(i, j)].abs());
        }
    }
    if max_off > 0.0 && max_off.is_finite() {
        return Ok(max_off);
    }
    if max_diag > 0.0 && max_diag.is_finite() {
        log::warn!(
            "No off-diagonal covariance to penalize; using largest variance {:.4e} as rho max",
            max_diag
        );
        return Ok(max_diag);
    }
    Err(NetError::InvalidArgument(
        "covariance matrix is zero; cannot derive a penalty path".into(),
    ))
}

/// Decreasing penalty path from `rho_max(s)` down to `rho_max * rho_min_ratio`.
///
/// Values are evenly spaced on the linear scale, or on the log scale when
/// `log_spacing` is set. The first and last values are exact.
pub fn rho_sequence(
    s: &DMatrix<f64>,
    nrho: usize,
    rho_min_ratio: f64,
    log_spacing: bool,
) -> Result<Vec<f64>> {
    if nrho < 2 {
        return Err(NetError::InvalidArgument(format!(
            "nrho must be at least 2, got {}",
            nrho
        )));
    }
    if !(rho_min_ratio.is_finite() && rho_min_ratio > 0.0 && rho_min_ratio < 1.0) {
        return Err(NetError::InvalidArgument(format!(
            "rho_min_ratio must lie in (0, 1), got {}",
            rho_min_ratio
        )));
    }

    let hi = rho_max(s)?;
    let lo = hi * rho_min_ratio;
    let steps = (nrho - 1) as f64;

    let mut rho: Vec<f64> = if log_spacing {
        let (log_hi, log_lo) = (hi.ln(), lo.ln());
        (0..nrho)
            .map(|i| (log_hi + (log_lo - log_hi) * i as f64 / steps).exp())
            .collect()
    } else {
        (0..nrho)
            .map(|i| hi + (lo - hi) * i as f64 / steps)
            .collect()
    };
    rho[0] = hi;
    rho[nrho - 1] = lo;
    Ok(rho)
}

/// Check a caller-supplied penalty path: at least two finite, non-negative,
/// strictly decreasing values.
pub fn validate_rho(rho: &[f64]) -> Result<()> {
    if rho.len() < 2 {
        return Err(NetError::InvalidArgument(format!(
            "a user-supplied rho sequence needs at least 2 values, got {}",
            rho.len()
        )));
    }
    if let Some(bad) = rho.iter().find(|r| !(r.is_finite() && **r >= 0.0)) {
        return Err(NetError::InvalidArgument(format!(
            "rho values must be finite and non-negative, found {}",
            bad
        )));
    }
    if let Some(i) = rho.windows(2).position(|w| w[1] >= w[0]) {
        return Err(NetError::InvalidArgument(format!(
            "rho sequence must be strictly decreasing (rho[{}] = {} is followed by {})",
            i,
            rho[i],
            rho[i + 1]
        )));
    }
    Ok(())
}
