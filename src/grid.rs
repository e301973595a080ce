//! ProcessGrid: maps flat participant ranks to 2D grid coordinates and
//! resolves which participant owns any matrix cell.
//!
//! The grid is immutable after construction. Partitioning is described by
//! two displacement arrays, one per axis; each array is a strictly
//! increasing sequence starting at 0 and ending at the matrix extent, so
//! the blocks tile the matrix completely with no overlap and no gap.

use crate::error::{Axis, GlobalMatrixError};
use crate::transfer::BlockSpan;

/// Resolution of a global cell to its owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellOwner {
    /// Flat rank of the owning participant.
    pub rank: usize,
    /// Row of the cell inside the owner's block.
    pub local_row: usize,
    /// Column of the cell inside the owner's block.
    pub local_col: usize,
}

/// 2D process grid with block-partition bookkeeping.
///
/// Ranks are placed row-major: rank `r` sits at grid coordinate
/// `(r / grid_cols, r % grid_cols)`.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ProcessGrid {
    grid_rows: usize,
    grid_cols: usize,
    nrows: usize,
    ncols: usize,
    row_displs: Vec<usize>,
    col_displs: Vec<usize>,
}

impl ProcessGrid {
    /// Build and validate a grid for `nranks` participants.
    ///
    /// # Errors
    /// - `GridSizeMismatch` if `grid_rows * grid_cols != nranks`.
    /// - `InvalidDisplacements` if either displacement array does not have
    ///   exactly `dim + 1` strictly increasing entries from 0 to the extent.
    pub fn new(
        grid_rows: usize,
        grid_cols: usize,
        nranks: usize,
        nrows: usize,
        ncols: usize,
        row_displs: &[usize],
        col_displs: &[usize],
    ) -> Result<Self, GlobalMatrixError> {
        if grid_rows == 0 || grid_cols == 0 || grid_rows * grid_cols != nranks {
            return Err(GlobalMatrixError::GridSizeMismatch {
                grid_rows,
                grid_cols,
                nranks,
            });
        }
        validate_displs(Axis::Row, row_displs, grid_rows, nrows)?;
        validate_displs(Axis::Col, col_displs, grid_cols, ncols)?;
        Ok(Self {
            grid_rows,
            grid_cols,
            nrows,
            ncols,
            row_displs: row_displs.to_vec(),
            col_displs: col_displs.to_vec(),
        })
    }

    #[inline]
    pub fn grid_rows(&self) -> usize {
        self.grid_rows
    }

    #[inline]
    pub fn grid_cols(&self) -> usize {
        self.grid_cols
    }

    #[inline]
    pub fn nrows(&self) -> usize {
        self.nrows
    }

    #[inline]
    pub fn ncols(&self) -> usize {
        self.ncols
    }

    /// Number of participants (grid cells).
    #[inline]
    pub fn nranks(&self) -> usize {
        self.grid_rows * self.grid_cols
    }

    /// Row-block boundaries (length `grid_rows + 1`).
    #[inline]
    pub fn row_displs(&self) -> &[usize] {
        &self.row_displs
    }

    /// Column-block boundaries (length `grid_cols + 1`).
    #[inline]
    pub fn col_displs(&self) -> &[usize] {
        &self.col_displs
    }

    /// Grid coordinate of a flat rank (row-major placement).
    #[inline]
    pub fn coords(&self, rank: usize) -> (usize, usize) {
        (rank / self.grid_cols, rank % self.grid_cols)
    }

    /// Flat rank at a grid coordinate.
    #[inline]
    pub fn rank_at(&self, grid_row: usize, grid_col: usize) -> usize {
        grid_row * self.grid_cols + grid_col
    }

    /// Resolve the owner of global cell `(row, col)` and translate the
    /// coordinate into the owner's local frame.
    ///
    /// # Errors
    /// `OutOfRange` if the cell lies outside the matrix.
    pub fn owner_of(&self, row: usize, col: usize) -> Result<CellOwner, GlobalMatrixError> {
        if row >= self.nrows || col >= self.ncols {
            return Err(GlobalMatrixError::OutOfRange {
                r0: row,
                r1: row + 1,
                c0: col,
                c1: col + 1,
                nrows: self.nrows,
                ncols: self.ncols,
            });
        }
        let grid_row = block_index(&self.row_displs, row);
        let grid_col = block_index(&self.col_displs, col);
        Ok(CellOwner {
            rank: self.rank_at(grid_row, grid_col),
            local_row: row - self.row_displs[grid_row],
            local_col: col - self.col_displs[grid_col],
        })
    }

    /// Global-coordinate bounds of a rank's block.
    ///
    /// # Errors
    /// `InvalidRank` if `rank >= nranks`.
    pub fn local_extent(&self, rank: usize) -> Result<BlockSpan, GlobalMatrixError> {
        if rank >= self.nranks() {
            return Err(GlobalMatrixError::InvalidRank {
                rank,
                nranks: self.nranks(),
            });
        }
        let (gr, gc) = self.coords(rank);
        Ok(BlockSpan::new(
            self.row_displs[gr],
            self.row_displs[gr + 1],
            self.col_displs[gc],
            self.col_displs[gc + 1],
        ))
    }

    /// Index of the first row-block intersecting row `r` (internal helper
    /// shared with the transfer engine's decomposition).
    #[inline]
    pub(crate) fn row_block(&self, r: usize) -> usize {
        block_index(&self.row_displs, r)
    }

    #[inline]
    pub(crate) fn col_block(&self, c: usize) -> usize {
        block_index(&self.col_displs, c)
    }
}

/// Locate the block whose half-open displacement range contains `x`.
/// `displs` is strictly increasing with `displs[0] == 0`, so the partition
/// point is always in `[1, len)` and the result in `[0, len - 1)`.
#[inline]
fn block_index(displs: &[usize], x: usize) -> usize {
    displs.partition_point(|&d| d <= x) - 1
}

fn validate_displs(
    axis: Axis,
    displs: &[usize],
    blocks: usize,
    extent: usize,
) -> Result<(), GlobalMatrixError> {
    let err = || GlobalMatrixError::InvalidDisplacements {
        axis,
        expected_len: blocks + 1,
        extent,
    };
    if displs.len() != blocks + 1 || displs[0] != 0 || displs[blocks] != extent {
        return Err(err());
    }
    if displs.windows(2).any(|w| w[0] >= w[1]) {
        return Err(err());
    }
    Ok(())
}
