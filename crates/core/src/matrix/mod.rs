pub mod dense;
pub mod sparse;

pub use dense::{inverse_spd, sqrt_spd, symmetrize, unit_diagonal};
pub use sparse::sparse_from_symmetric;
