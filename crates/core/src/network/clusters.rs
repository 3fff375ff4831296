use nalgebra::DMatrix;

use crate::matrix::sparse::{offdiagonal_edges, sparse_from_symmetric};

/// Partial correlations -Θ_ij / sqrt(Θ_ii Θ_jj), with a unit diagonal.
pub fn partial_correlations(theta: &DMatrix<f64>) -> DMatrix<f64> {
    let q = theta.nrows();
    DMatrix::from_fn(q, q, |i, j| {
        if i == j {
            1.0
        } else {
            -theta[(i, j)] / (theta[(i, i)] * theta[(j, j)]).sqrt()
        }
    })
}

/// Group traits into connected components of the precision graph.
///
/// Two traits are linked when |Θ_ij| > tol. Labels are 0-based and numbered
/// in order of each cluster's first trait.
pub fn trait_clusters(theta: &DMatrix<f64>, tol: f64) -> Vec<usize> {
    let q = theta.nrows();
    let graph = sparse_from_symmetric(theta, tol);

    let mut parent: Vec<usize> = (0..q).collect();
    for (i, j) in offdiagonal_edges(&graph) {
        let (ri, rj) = (find(&mut parent, i), find(&mut parent, j));
        if ri != rj {
            // Keep the smaller index as root so labelling is stable.
            let (lo, hi) = if ri < rj { (ri, rj) } else { (rj, ri) };
            parent[hi] = lo;
        }
    }

    let mut labels = vec![usize::MAX; q];
    let mut root_label = vec![usize::MAX; q];
    let mut next = 0;
    for t in 0..q {
        let r = find(&mut parent, t);
        if root_label[r] == usize::MAX {
            root_label[r] = next;
            next += 1;
        }
        labels[t] = root_label[r];
    }
    labels
}

fn find(parent: &mut [usize], mut x: usize) -> usize {
    while parent[x] != x {
        parent[x] = parent[parent[x]];
        x = parent[x];
    }
    x
}

/// Number of distinct cluster labels.
pub fn n_clusters(labels: &[usize]) -> usize {
    labels.iter().max().map_or(0, |&m| m + 1)
}
