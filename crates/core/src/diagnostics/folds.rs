use rand::seq::SliceRandom;
use rand::Rng;

use crate::error::{NetError, Result};

/// Assign `n` observations to `k` folds uniformly at random.
///
/// The cycle 0, 1, .., k-1 is repeated to length `n` and shuffled, so fold
/// sizes differ by at most one and every observation gets exactly one fold
/// id. Ids are 0-based: they lie in `0..k`, not `1..=k`, and index straight
/// into the output of [`fold_members`].
pub fn partition_folds<R: Rng + ?Sized>(n: usize, k: usize, rng: &mut R) -> Result<Vec<usize>> {
    if k < 3 {
        return Err(NetError::InvalidArgument(format!(
            "nfolds must be at least 3, got {}",
            k
        )));
    }
    if n < k {
        return Err(NetError::InvalidArgument(format!(
            "Number of observations ({}) must be >= number of folds ({})",
            n, k
        )));
    }
    let mut assignment: Vec<usize> = (0..n).map(|i| i % k).collect();
    assignment.shuffle(rng);
    Ok(assignment)
}

/// Observation indices of each fold, in increasing order.
pub fn fold_members(assignment: &[usize], k: usize) -> Vec<Vec<usize>> {
    let mut folds: Vec<Vec<usize>> = vec![Vec::new(); k];
    for (i, &f) in assignment.iter().enumerate() {
        folds[f].push(i);
    }
    folds
}
