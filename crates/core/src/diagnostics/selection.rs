use serde::{Deserialize, Serialize};

use crate::error::{NetError, Result};

/// Penalties chosen from a cross-validated error curve.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Selection {
    /// Index of the smallest mean error (first one on ties).
    pub index_min: usize,
    /// Index chosen by the one-standard-error rule.
    pub index_1se: usize,
    pub rho_min: f64,
    pub rho_1se: f64,
}

/// Pick `rho_min` and `rho_1se` from a mean/standard-error curve.
///
/// The path is ordered from the largest (most regularized) penalty to the
/// smallest. `rho_1se` is found by walking from the minimum toward index 0
/// while the mean error stays within `mean[min] + se[min]`; the walk stops
/// at the first violation, so every penalty between the two selections
/// satisfies the bound.
pub fn select_rho(rho: &[f64], mean_error: &[f64], std_error: &[f64]) -> Result<Selection> {
    if rho.is_empty() || rho.len() != mean_error.len() || rho.len() != std_error.len() {
        return Err(NetError::InvalidArgument(format!(
            "rho, mean error and standard error must have the same non-zero length ({}, {}, {})",
            rho.len(),
            mean_error.len(),
            std_error.len()
        )));
    }

    let index_min = mean_error
        .iter()
        .enumerate()
        .filter(|(_, v)| v.is_finite())
        .fold(None, |best: Option<(usize, f64)>, (i, &v)| match best {
            Some((_, b)) if b <= v => best,
            _ => Some((i, v)),
        })
        .map(|(i, _)| i)
        .ok_or_else(|| NetError::InvalidArgument("mean error curve has no finite values".into()))?;

    let se_min = if std_error[index_min].is_finite() {
        std_error[index_min]
    } else {
        0.0
    };
    let bound = mean_error[index_min] + se_min;

    let mut index_1se = index_min;
    while index_1se > 0 && mean_error[index_1se - 1] <= bound {
        index_1se -= 1;
    }

    Ok(Selection {
        index_min,
        index_1se,
        rho_min: rho[index_min],
        rho_1se: rho[index_1se],
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_min_and_1se() {
        let rho = [1.0, 0.8, 0.6, 0.4, 0.2];
        let mean = [2.0, 1.5, 1.2, 1.0, 1.1];
        let se = [0.1, 0.1, 0.1, 0.25, 0.1];
        let sel = select_rho(&rho, &mean, &se).unwrap();
        assert_eq!(sel.index_min, 3);
        assert_eq!(sel.rho_min, 0.4);
        // bound = 1.25: index 2 (1.2) qualifies, index 1 (1.5) does not
        assert_eq!(sel.index_1se, 2);
        assert_eq!(sel.rho_1se, 0.6);
    }

    #[test]
    fn test_scan_stops_at_first_violation() {
        // Index 0 is within the bound but index 1 is not, so the walk stops.
        let rho = [1.0, 0.5, 0.25, 0.1];
        let mean = [1.05, 3.0, 1.0, 1.2];
        let se = [0.1, 0.1, 0.1, 0.1];
        let sel = select_rho(&rho, &mean, &se).unwrap();
        assert_eq!(sel.index_min, 2);
        assert_eq!(sel.index_1se, 2);
    }

    #[test]
    fn test_ties_take_first_minimum() {
        let rho = [3.0, 2.0, 1.0];
        let mean = [1.0, 0.5, 0.5];
        let se = [0.0, 0.0, 0.0];
        let sel = select_rho(&rho, &mean, &se).unwrap();
        assert_eq!(sel.index_min, 1);
        assert_eq!(sel.index_1se, 1);
    }

    #[test]
    fn test_minimum_at_start() {
        let rho = [3.0, 2.0, 1.0];
        let mean = [0.2, 0.5, 0.9];
        let se = [0.05, 0.0, 0.0];
        let sel = select_rho(&rho, &mean, &se).unwrap();
        assert_eq!(sel.index_min, 0);
        assert_eq!(sel.index_1se, 0);
    }

    #[test]
    fn test_skips_nan() {
        let rho = [3.0, 2.0, 1.0];
        let mean = [f64::NAN, 0.5, 0.4];
        let se = [0.1, 0.2, 0.2];
        let sel = select_rho(&rho, &mean, &se).unwrap();
        assert_eq!(sel.index_min, 2);
        assert_eq!(sel.index_1se, 1);
    }

    #[test]
    fn test_rejects_mismatched_lengths() {
        assert!(select_rho(&[1.0, 0.5], &[1.0], &[0.1, 0.1]).is_err());
        assert!(select_rho(&[], &[], &[]).is_err());
        assert!(select_rho(&[1.0], &[f64::NAN], &[0.0]).is_err());
    }
}
