//! GlobalMatrixError: unified error type for global-matrix public APIs.
//!
//! All fallible operations in this crate return this error type; library
//! code never panics on malformed input. Collective call-count mismatches
//! (a participant that omits a `sync`, `symmetrize`, `create`, or `destroy`)
//! are the one failure mode with no error value: the transport cannot detect
//! an absent peer cheaply, so the mismatch manifests as an indefinite stall
//! of the remaining participants. This is the accepted fail-stop model.

use thiserror::Error;

/// Matrix axis, used to report which displacement array is malformed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Axis {
    /// Row partition (`row_displs`).
    Row,
    /// Column partition (`col_displs`).
    Col,
}

/// Unified error type for global-matrix operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GlobalMatrixError {
    /// The process grid does not match the number of participants.
    #[error("process grid is {grid_rows}x{grid_cols} but the communicator has {nranks} participants")]
    GridSizeMismatch {
        grid_rows: usize,
        grid_cols: usize,
        nranks: usize,
    },
    /// A displacement array is not a complete, strictly increasing tiling.
    #[error(
        "{axis:?} displacements must have {expected_len} strictly increasing entries starting at 0 and ending at {extent}"
    )]
    InvalidDisplacements {
        axis: Axis,
        expected_len: usize,
        extent: usize,
    },
    /// A rank outside `[0, nranks)` was supplied.
    #[error("rank {rank} is out of range for {nranks} participants")]
    InvalidRank { rank: usize, nranks: usize },
    /// A coordinate or block request lies outside the matrix.
    #[error("request [{r0},{r1})x[{c0},{c1}) is outside the {nrows}x{ncols} matrix")]
    OutOfRange {
        r0: usize,
        r1: usize,
        c0: usize,
        c1: usize,
        nrows: usize,
        ncols: usize,
    },
    /// An empty (zero-area) block request.
    #[error("request [{r0},{r1})x[{c0},{c1}) is empty")]
    EmptySpan {
        r0: usize,
        r1: usize,
        c0: usize,
        c1: usize,
    },
    /// The caller's leading dimension is smaller than the requested width.
    #[error("leading dimension {ld} is smaller than the requested block width {width}")]
    StrideTooSmall { ld: usize, width: usize },
    /// The caller's buffer cannot hold the requested block at the given stride.
    #[error("caller buffer holds {found} elements but the request needs {needed}")]
    BufferTooSmall { needed: usize, found: usize },
    /// Symmetrization requires a square matrix.
    #[error("matrix must be square to symmetrize, got {nrows}x{ncols}")]
    NotSquare { nrows: usize, ncols: usize },
    /// Fatal transport failure. Never retried: a partitioned computation
    /// cannot make forward progress with a missing participant.
    #[error("transport failure: {0}")]
    Transport(String),
}
