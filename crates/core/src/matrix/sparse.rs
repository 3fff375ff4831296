use nalgebra::DMatrix;
use sprs::{CsMat, TriMat};

/// Sparse CSC copy of a symmetric matrix keeping entries with |v| > tol.
///
/// The diagonal is always kept. Only the upper triangle is read, so the
/// result is symmetric even if `a` is not quite.
pub fn sparse_from_symmetric(a: &DMatrix<f64>, tol: f64) -> CsMat<f64> {
    let n = a.nrows();
    let mut triplets = TriMat::new((n, n));
    for j in 0..n {
        triplets.add_triplet(j, j, a[(j, j)]);
        for i in (0..j).filter(|&i| a[(i, j)].abs() > tol) {
            triplets.add_triplet(i, j, a[(i, j)]);
            triplets.add_triplet(j, i, a[(i, j)]);
        }
    }
    triplets.to_csc()
}

/// Strictly upper-triangular non-zero positions (i < j) of a sparse matrix.
pub fn offdiagonal_edges(a: &CsMat<f64>) -> Vec<(usize, usize)> {
    let mut edges: Vec<(usize, usize)> = a
        .iter()
        .filter(|(_, (row, col))| row < col)
        .map(|(_, (row, col))| (row, col))
        .collect();
    edges.sort_unstable();
    edges
}
