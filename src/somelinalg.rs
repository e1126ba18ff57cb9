/// direct solvers of the sparse Newton systems: faer sparse LU and nalgebra dense LU
pub mod sparse_direct;
