/// Sparse matrix type (CSC format), used for exported precision graphs.
pub type SparseMat = sprs::CsMat<f64>;
