//! # global-matrix
//!
//! global-matrix is a distributed dense global matrix for parallel numerical
//! codes: a logically single `nrows x ncols` matrix whose storage is
//! partitioned across participants arranged in a 2D process grid, accessed
//! through one-sided read ([`GlobalMatrix::get_block`]) and accumulate
//! ([`GlobalMatrix::acc_block`]) operations instead of hand-written
//! point-to-point messaging.
//!
//! ## Model
//! - Each participant exclusively owns one block of the matrix, described by
//!   two strictly increasing displacement arrays ([`grid::ProcessGrid`]).
//! - An arbitrary rectangular request is decomposed into per-owner
//!   sub-rectangles ([`transfer`]); pieces owned by the caller take a direct
//!   local path.
//! - Consistency is epoch-based: values written or accumulated anywhere are
//!   guaranteed visible everywhere only after the next collective
//!   [`GlobalMatrix::sync`] returns on all participants.
//! - [`GlobalMatrix::symmetrize`] transforms the matrix into
//!   `(A + A^H) / 2` in place with a fence-bracketed protocol in which no
//!   participant ever writes another's block.
//!
//! ## Transport
//! The engine is generic over the [`comm::OneSided`] seam. The bundled
//! backend ([`comm::shmem::ShmemComm`]) runs one participant per OS thread
//! and emulates one-sided access with shared lock-guarded windows plus the
//! same epoch-fence discipline; [`comm::shmem::ShmemWorld::run`] spawns a
//! whole job for drivers and tests.
//!
//! ## Failure model
//! Malformed configuration and requests fail fast with
//! [`error::GlobalMatrixError`] before touching shared state. Collective
//! call mismatches are not detectable by the transport and manifest as a
//! stall; transport failures are fatal and never retried (fail-stop, no
//! partial-failure recovery).
//!
//! ```
//! use global_matrix::prelude::*;
//!
//! // 6x6 matrix on a 2x2 grid, row blocks {0,2,6}, column blocks {0,4,6}.
//! let sums = ShmemWorld::run(4, |comm| {
//!     let rank = comm.rank() as f64;
//!     let m: GlobalMatrix<f64, _> =
//!         GlobalMatrix::create(comm, 6, 6, 2, 2, &[0, 2, 6], &[0, 4, 6]).unwrap();
//!     m.fill(rank);
//!     m.sync().unwrap();
//!     let mut block = [0.0; 36];
//!     m.get_block(BlockSpan::new(0, 6, 0, 6), &mut block, 6).unwrap();
//!     m.sync().unwrap();
//!     m.destroy().unwrap();
//!     block.iter().sum::<f64>()
//! })
//! .unwrap();
//! // 8 cells of 0, 4 of 1, 16 of 2, 8 of 3 on every rank.
//! assert!(sums.iter().all(|&s| s == 60.0));
//! ```

pub mod comm;
pub mod element;
pub mod error;
pub mod grid;
pub mod matrix;
pub mod transfer;

/// A convenient prelude for the most-used types.
pub mod prelude {
    pub use crate::comm::OneSided;
    pub use crate::comm::shmem::{ShmemComm, ShmemWorld};
    pub use crate::element::{Element, ElementType};
    pub use crate::error::GlobalMatrixError;
    pub use crate::grid::{CellOwner, ProcessGrid};
    pub use crate::matrix::GlobalMatrix;
    pub use crate::transfer::BlockSpan;
}
