//! Block-transfer planning: request rectangles and their decomposition into
//! per-owner pieces.
//!
//! A request may span several owners. The engine scans the row-blocks and
//! column-blocks whose displacement ranges intersect the request; the
//! cartesian product of the two scans yields the owners touched. For each
//! owner we record the intersection translated into three frames at once:
//! the owner's local block, the caller's buffer, and (implicitly) global
//! coordinates. The data-movement half lives in [`crate::matrix`].

use itertools::iproduct;

use crate::error::GlobalMatrixError;
use crate::grid::ProcessGrid;

/// Half-open request rectangle `[r0, r1) x [c0, c1)` in global coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct BlockSpan {
    pub r0: usize,
    pub r1: usize,
    pub c0: usize,
    pub c1: usize,
}

impl BlockSpan {
    #[inline]
    pub fn new(r0: usize, r1: usize, c0: usize, c1: usize) -> Self {
        Self { r0, r1, c0, c1 }
    }

    /// Number of rows in the rectangle.
    #[inline]
    pub fn rows(&self) -> usize {
        self.r1 - self.r0
    }

    /// Number of columns in the rectangle.
    #[inline]
    pub fn cols(&self) -> usize {
        self.c1 - self.c0
    }

    /// Cell count.
    #[inline]
    pub fn area(&self) -> usize {
        self.rows() * self.cols()
    }

    /// The mirrored rectangle `[c0, c1) x [r0, r1)`.
    #[inline]
    pub fn transposed(&self) -> Self {
        Self::new(self.c0, self.c1, self.r0, self.r1)
    }

    /// Check that the rectangle is non-empty and lies inside an
    /// `nrows x ncols` matrix.
    ///
    /// # Errors
    /// `EmptySpan` for a degenerate rectangle, `OutOfRange` if any part
    /// falls outside the matrix.
    pub fn check_within(&self, nrows: usize, ncols: usize) -> Result<(), GlobalMatrixError> {
        let Self { r0, r1, c0, c1 } = *self;
        if r0 >= r1 || c0 >= c1 {
            return Err(GlobalMatrixError::EmptySpan { r0, r1, c0, c1 });
        }
        if r1 > nrows || c1 > ncols {
            return Err(GlobalMatrixError::OutOfRange {
                r0,
                r1,
                c0,
                c1,
                nrows,
                ncols,
            });
        }
        Ok(())
    }
}

/// One owner's share of a request: the intersection sub-rectangle with
/// offsets into the owner's local block and into the caller's buffer.
///
/// Buffer offsets are relative to the request origin `(span.r0, span.c0)`;
/// the caller applies its own leading dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct OwnerPiece {
    /// Owning participant.
    pub rank: usize,
    /// Piece height in rows.
    pub rows: usize,
    /// Piece width in columns.
    pub cols: usize,
    /// First row of the piece inside the owner's block.
    pub owner_row: usize,
    /// First column of the piece inside the owner's block.
    pub owner_col: usize,
    /// The owner block's width (its leading dimension).
    pub owner_cols: usize,
    /// Row offset of the piece relative to the request origin.
    pub buf_row: usize,
    /// Column offset of the piece relative to the request origin.
    pub buf_col: usize,
}

/// Decompose a validated request into per-owner pieces, ordered by grid
/// row then grid column. Every cell of the request appears in exactly one
/// piece (the partition is a complete tiling).
pub(crate) fn decompose(grid: &ProcessGrid, span: BlockSpan) -> Vec<OwnerPiece> {
    let rd = grid.row_displs();
    let cd = grid.col_displs();
    // Blocks containing the first and last cell of each axis range.
    let rb0 = grid.row_block(span.r0);
    let rb1 = grid.row_block(span.r1 - 1);
    let cb0 = grid.col_block(span.c0);
    let cb1 = grid.col_block(span.c1 - 1);

    let mut pieces = Vec::with_capacity((rb1 - rb0 + 1) * (cb1 - cb0 + 1));
    for (bi, bj) in iproduct!(rb0..=rb1, cb0..=cb1) {
        let pr0 = span.r0.max(rd[bi]);
        let pr1 = span.r1.min(rd[bi + 1]);
        let pc0 = span.c0.max(cd[bj]);
        let pc1 = span.c1.min(cd[bj + 1]);
        pieces.push(OwnerPiece {
            rank: grid.rank_at(bi, bj),
            rows: pr1 - pr0,
            cols: pc1 - pc0,
            owner_row: pr0 - rd[bi],
            owner_col: pc0 - cd[bj],
            owner_cols: cd[bj + 1] - cd[bj],
            buf_row: pr0 - span.r0,
            buf_col: pc0 - span.c0,
        });
    }
    log::trace!(
        "decomposed [{},{})x[{},{}) into {} owner piece(s)",
        span.r0,
        span.r1,
        span.c0,
        span.c1,
        pieces.len()
    );
    pieces
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid_2x2() -> ProcessGrid {
        ProcessGrid::new(2, 2, 4, 6, 6, &[0, 2, 6], &[0, 4, 6]).unwrap()
    }

    #[test]
    fn span_accessors() {
        let s = BlockSpan::new(1, 3, 2, 6);
        assert_eq!(s.rows(), 2);
        assert_eq!(s.cols(), 4);
        assert_eq!(s.area(), 8);
        assert_eq!(s.transposed(), BlockSpan::new(2, 6, 1, 3));
    }

    #[test]
    fn check_within_rejects_empty_and_oob() {
        assert!(matches!(
            BlockSpan::new(2, 2, 0, 1).check_within(6, 6),
            Err(GlobalMatrixError::EmptySpan { .. })
        ));
        assert!(matches!(
            BlockSpan::new(3, 1, 0, 1).check_within(6, 6),
            Err(GlobalMatrixError::EmptySpan { .. })
        ));
        assert!(matches!(
            BlockSpan::new(0, 7, 0, 1).check_within(6, 6),
            Err(GlobalMatrixError::OutOfRange { .. })
        ));
        assert!(BlockSpan::new(0, 6, 0, 6).check_within(6, 6).is_ok());
    }

    #[test]
    fn single_owner_request_is_one_piece() {
        let g = grid_2x2();
        let pieces = decompose(&g, BlockSpan::new(0, 2, 0, 4));
        assert_eq!(pieces.len(), 1);
        let p = pieces[0];
        assert_eq!(p.rank, 0);
        assert_eq!((p.rows, p.cols), (2, 4));
        assert_eq!((p.owner_row, p.owner_col), (0, 0));
        assert_eq!((p.buf_row, p.buf_col), (0, 0));
        assert_eq!(p.owner_cols, 4);
    }

    #[test]
    fn full_matrix_touches_every_owner() {
        let g = grid_2x2();
        let pieces = decompose(&g, BlockSpan::new(0, 6, 0, 6));
        assert_eq!(pieces.len(), 4);
        let ranks: Vec<_> = pieces.iter().map(|p| p.rank).collect();
        assert_eq!(ranks, vec![0, 1, 2, 3]);
        let total: usize = pieces.iter().map(|p| p.rows * p.cols).sum();
        assert_eq!(total, 36);
    }

    #[test]
    fn straddling_request_translates_all_frames() {
        let g = grid_2x2();
        // Rows 1..4 cross the row boundary at 2; cols 3..5 cross the column
        // boundary at 4.
        let span = BlockSpan::new(1, 4, 3, 5);
        let pieces = decompose(&g, span);
        assert_eq!(pieces.len(), 4);

        // rank 0 piece: global [1,2)x[3,4)
        assert_eq!(
            pieces[0],
            OwnerPiece {
                rank: 0,
                rows: 1,
                cols: 1,
                owner_row: 1,
                owner_col: 3,
                owner_cols: 4,
                buf_row: 0,
                buf_col: 0,
            }
        );
        // rank 3 piece: global [2,4)x[4,5)
        assert_eq!(
            pieces[3],
            OwnerPiece {
                rank: 3,
                rows: 2,
                cols: 1,
                owner_row: 0,
                owner_col: 0,
                owner_cols: 2,
                buf_row: 1,
                buf_col: 1,
            }
        );

        let total: usize = pieces.iter().map(|p| p.rows * p.cols).sum();
        assert_eq!(total, span.area());
    }

    fn assert_exact_cover(grid: &ProcessGrid, span: BlockSpan) {
        let pieces = decompose(grid, span);
        let mut seen = vec![false; span.area()];
        for p in &pieces {
            let ext = grid.local_extent(p.rank).unwrap();
            assert!(p.owner_row + p.rows <= ext.rows());
            assert!(p.owner_col + p.cols <= ext.cols());
            assert_eq!(p.owner_cols, ext.cols());
            for i in 0..p.rows {
                for j in 0..p.cols {
                    let idx = (p.buf_row + i) * span.cols() + (p.buf_col + j);
                    assert!(!seen[idx], "cell covered twice");
                    seen[idx] = true;
                }
            }
        }
        assert!(seen.iter().all(|&s| s), "cell not covered");
    }

    #[test]
    fn pieces_are_disjoint_and_cover() {
        let g = ProcessGrid::new(3, 2, 6, 9, 8, &[0, 3, 4, 9], &[0, 5, 8]).unwrap();
        assert_exact_cover(&g, BlockSpan::new(2, 8, 1, 7));
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        fn displs(blocks: usize) -> impl Strategy<Value = Vec<usize>> {
            prop::collection::vec(1usize..=5, blocks).prop_map(|sizes| {
                let mut d = vec![0usize];
                for s in sizes {
                    d.push(d.last().unwrap() + s);
                }
                d
            })
        }

        fn grid_and_span() -> impl Strategy<Value = (ProcessGrid, BlockSpan)> {
            (1usize..=3, 1usize..=3)
                .prop_flat_map(|(gr, gc)| (Just(gr), Just(gc), displs(gr), displs(gc)))
                .prop_flat_map(|(gr, gc, rd, cd)| {
                    let nrows = *rd.last().unwrap();
                    let ncols = *cd.last().unwrap();
                    let grid =
                        ProcessGrid::new(gr, gc, gr * gc, nrows, ncols, &rd, &cd).unwrap();
                    (Just(grid), 0..nrows, 0..ncols)
                })
                .prop_flat_map(|(grid, r0, c0)| {
                    let nrows = grid.nrows();
                    let ncols = grid.ncols();
                    (Just(grid), Just(r0), r0 + 1..=nrows, Just(c0), c0 + 1..=ncols)
                })
                .prop_map(|(grid, r0, r1, c0, c1)| (grid, BlockSpan::new(r0, r1, c0, c1)))
        }

        proptest! {
            #[test]
            fn random_spans_are_covered_exactly_once((grid, span) in grid_and_span()) {
                span.check_within(grid.nrows(), grid.ncols()).unwrap();
                assert_exact_cover(&grid, span);
            }
        }
    }
}
