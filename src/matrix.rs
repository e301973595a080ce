//! GlobalMatrix: a logically single dense matrix partitioned across a 2D
//! process grid, accessed through one-sided block transfers.
//!
//! Every participant owns exactly one block (its window); all
//! cross-participant access goes through [`get_block`](GlobalMatrix::get_block)
//! and [`acc_block`](GlobalMatrix::acc_block), never shared-memory aliasing.
//! Consistency is epoch-based: a one-sided operation is guaranteed visible
//! to the whole job only after the next [`sync`](GlobalMatrix::sync) returns
//! everywhere.
//!
//! Collective operations (`create`, `sync`, `symmetrize`, `destroy`) must be
//! called by every participant, the same number of times, in the same
//! relative order; a participant that omits one stalls the rest of the job
//! (fail-stop model, see [`crate::error`]).

use std::marker::PhantomData;

use crate::comm::{OneSided, WindowRef};
use crate::element::Element;
use crate::error::GlobalMatrixError;
use crate::grid::ProcessGrid;
use crate::transfer::{BlockSpan, OwnerPiece, decompose};

/// Distributed dense matrix of `T` over a one-sided transport `C`.
#[derive(Debug)]
pub struct GlobalMatrix<T: Element, C: OneSided> {
    comm: C,
    grid: ProcessGrid,
    win: WindowRef,
    /// This participant's block in global coordinates.
    extent: BlockSpan,
    released: bool,
    _elem: PhantomData<T>,
}

impl<T: Element, C: OneSided> GlobalMatrix<T, C> {
    /// Collective: build the grid, allocate this participant's block, and
    /// register it for one-sided access.
    ///
    /// Configuration is validated locally before any communication, so a
    /// malformed grid fails fast without touching peers (which will then
    /// stall in their own `create`; the fail-stop model does not mask this).
    ///
    /// # Errors
    /// `GridSizeMismatch`, `InvalidDisplacements` on bad configuration;
    /// `Transport` if window registration fails or disagrees across ranks.
    pub fn create(
        comm: C,
        nrows: usize,
        ncols: usize,
        grid_rows: usize,
        grid_cols: usize,
        row_displs: &[usize],
        col_displs: &[usize],
    ) -> Result<Self, GlobalMatrixError> {
        let grid = ProcessGrid::new(
            grid_rows,
            grid_cols,
            comm.size(),
            nrows,
            ncols,
            row_displs,
            col_displs,
        )?;
        let extent = grid.local_extent(comm.rank())?;
        let win = comm.create_window(T::TYPE, extent.area())?;
        log::debug!(
            "rank {}: created {}x{} matrix, local block [{},{})x[{},{})",
            comm.rank(),
            nrows,
            ncols,
            extent.r0,
            extent.r1,
            extent.c0,
            extent.c1,
        );
        Ok(Self {
            comm,
            grid,
            win,
            extent,
            released: false,
            _elem: PhantomData,
        })
    }

    /// Global row count.
    #[inline]
    pub fn nrows(&self) -> usize {
        self.grid.nrows()
    }

    /// Global column count.
    #[inline]
    pub fn ncols(&self) -> usize {
        self.grid.ncols()
    }

    /// This participant's rank.
    #[inline]
    pub fn rank(&self) -> usize {
        self.comm.rank()
    }

    /// The process grid and partition bookkeeping.
    #[inline]
    pub fn grid(&self) -> &ProcessGrid {
        &self.grid
    }

    /// This participant's block in global coordinates.
    #[inline]
    pub fn local_extent(&self) -> BlockSpan {
        self.extent
    }

    /// Write `value` into every cell of this participant's block. Purely
    /// local, never blocks on peers; visible to others after the next sync.
    pub fn fill(&self, value: T) {
        let mut guard = self.win.local().write();
        let cells: &mut [T] = bytemuck::cast_slice_mut(&mut guard[..]);
        cells.fill(value);
    }

    /// Collective epoch fence. After it returns on all participants, every
    /// one-sided operation issued before the matching call anywhere is
    /// visible to everyone. Returns the epoch counter, identical across
    /// participants with matching collective call sequences.
    pub fn sync(&self) -> Result<u64, GlobalMatrixError> {
        self.comm.fence()
    }

    /// One-sided read of `span` into `buf` with leading dimension `ld`.
    ///
    /// `buf` is row-major; row `i` of the block lands at `buf[i * ld ..]`.
    /// Pieces owned by the caller are copied directly without a transport
    /// round trip. Non-collective to issue; the values read are consistent
    /// with the last closed epoch.
    ///
    /// # Errors
    /// `EmptySpan`/`OutOfRange` for a bad rectangle, `StrideTooSmall` if
    /// `ld < span.cols()`, `BufferTooSmall` if `buf` cannot hold the block.
    pub fn get_block(
        &self,
        span: BlockSpan,
        buf: &mut [T],
        ld: usize,
    ) -> Result<(), GlobalMatrixError> {
        self.check_request(span, ld, buf.len())?;
        let width = T::TYPE.width();
        let bytes: &mut [u8] = bytemuck::cast_slice_mut(buf);
        for piece in decompose(&self.grid, span) {
            if piece.rank == self.comm.rank() {
                // Local fast path: one read lock for the whole piece.
                let guard = self.win.local().read();
                for i in 0..piece.rows {
                    let (src, dst) = piece_row_offsets(&piece, i, ld, width);
                    let len = piece.cols * width;
                    bytes[dst..dst + len].copy_from_slice(&guard[src..src + len]);
                }
            } else {
                for i in 0..piece.rows {
                    let (src, dst) = piece_row_offsets(&piece, i, ld, width);
                    let len = piece.cols * width;
                    self.comm
                        .get(&self.win, piece.rank, src, &mut bytes[dst..dst + len])?;
                }
            }
        }
        Ok(())
    }

    /// One-sided element-wise atomic add of `buf` (leading dimension `ld`)
    /// into `span`.
    ///
    /// Concurrent accumulates to the same cell from different participants
    /// commute, so the post-sync value is independent of arrival order.
    /// Local pieces are applied under the window's write lock, which also
    /// excludes concurrently arriving remote accumulates. Requires a
    /// following [`sync`](Self::sync) for global visibility.
    ///
    /// # Errors
    /// Same request validation as [`get_block`](Self::get_block).
    pub fn acc_block(
        &self,
        span: BlockSpan,
        buf: &[T],
        ld: usize,
    ) -> Result<(), GlobalMatrixError> {
        self.check_request(span, ld, buf.len())?;
        let width = T::TYPE.width();
        let bytes: &[u8] = bytemuck::cast_slice(buf);
        for piece in decompose(&self.grid, span) {
            if piece.rank == self.comm.rank() {
                let mut guard = self.win.local().write();
                for i in 0..piece.rows {
                    let (dst, src) = piece_row_offsets(&piece, i, ld, width);
                    let len = piece.cols * width;
                    crate::element::accumulate_bytes(
                        T::TYPE,
                        &mut guard[dst..dst + len],
                        &bytes[src..src + len],
                    )?;
                }
            } else {
                for i in 0..piece.rows {
                    let (dst, src) = piece_row_offsets(&piece, i, ld, width);
                    let len = piece.cols * width;
                    self.comm
                        .accumulate(&self.win, piece.rank, dst, &bytes[src..src + len])?;
                }
            }
        }
        Ok(())
    }

    /// Collective: transform the matrix in place so that
    /// `new[i][j] = (old[i][j] + conj(old[j][i])) / 2`, which makes the
    /// result (conjugate-)symmetric with a real diagonal.
    ///
    /// Three internal fences keep the protocol race-free: the first
    /// publishes all prior writes before anyone reads peer data; the second
    /// completes every fetch before any participant overwrites its block;
    /// the third publishes the symmetrized state. Each participant fetches
    /// the mirror rectangle of its own block into private scratch and then
    /// writes results only into its own window with plain stores, so there
    /// is no cross-participant write.
    ///
    /// # Errors
    /// `NotSquare` if `nrows != ncols` (checked before any fence).
    pub fn symmetrize(&self) -> Result<(), GlobalMatrixError> {
        let (nrows, ncols) = (self.grid.nrows(), self.grid.ncols());
        if nrows != ncols {
            return Err(GlobalMatrixError::NotSquare { nrows, ncols });
        }
        self.sync()?;

        let mirror = self.extent.transposed();
        let mut scratch = vec![T::zero(); mirror.area()];
        self.get_block(mirror, &mut scratch, mirror.cols())?;

        self.sync()?;

        let rows = self.extent.rows();
        let cols = self.extent.cols();
        {
            let mut guard = self.win.local().write();
            let cells: &mut [T] = bytemuck::cast_slice_mut(&mut guard[..]);
            combine_with_mirror(cells, &scratch, rows, cols);
        }

        self.sync()?;
        Ok(())
    }

    /// Collective: release the window and storage. The matrix must not be
    /// used afterwards on any participant; there is no partial teardown.
    pub fn destroy(mut self) -> Result<(), GlobalMatrixError> {
        self.released = true;
        self.comm.free_window(&self.win)
    }

    fn check_request(
        &self,
        span: BlockSpan,
        ld: usize,
        buf_len: usize,
    ) -> Result<(), GlobalMatrixError> {
        span.check_within(self.grid.nrows(), self.grid.ncols())?;
        if ld < span.cols() {
            return Err(GlobalMatrixError::StrideTooSmall {
                ld,
                width: span.cols(),
            });
        }
        let needed = (span.rows() - 1) * ld + span.cols();
        if buf_len < needed {
            return Err(GlobalMatrixError::BufferTooSmall {
                needed,
                found: buf_len,
            });
        }
        Ok(())
    }
}

impl<T: Element, C: OneSided> Drop for GlobalMatrix<T, C> {
    fn drop(&mut self) {
        if !self.released {
            log::warn!(
                "rank {}: GlobalMatrix dropped without collective destroy; window stays registered",
                self.comm.rank()
            );
        }
    }
}

/// Byte offsets of row `i` of a piece: `(offset in the owner's window,
/// offset in the caller's buffer)`.
#[inline]
fn piece_row_offsets(piece: &OwnerPiece, i: usize, ld: usize, width: usize) -> (usize, usize) {
    let owner = ((piece.owner_row + i) * piece.owner_cols + piece.owner_col) * width;
    let caller = ((piece.buf_row + i) * ld + piece.buf_col) * width;
    (owner, caller)
}

/// `cells[i][j] = (cells[i][j] + conj(scratch[j][i])) / 2` over a
/// `rows x cols` block; `scratch` is the mirror rectangle, `cols x rows`
/// row-major. With the `rayon` feature the rows are combined in parallel
/// (performance only, the result is identical).
fn combine_with_mirror<T: Element>(cells: &mut [T], scratch: &[T], rows: usize, cols: usize) {
    debug_assert_eq!(cells.len(), rows * cols);
    debug_assert_eq!(scratch.len(), rows * cols);
    #[cfg(feature = "rayon")]
    {
        use rayon::prelude::*;
        cells
            .par_chunks_mut(cols)
            .enumerate()
            .for_each(|(i, row)| {
                for (j, cell) in row.iter_mut().enumerate() {
                    *cell = cell.hermitian_mean(scratch[j * rows + i]);
                }
            });
    }
    #[cfg(not(feature = "rayon"))]
    for (i, row) in cells.chunks_mut(cols).enumerate() {
        for (j, cell) in row.iter_mut().enumerate() {
            *cell = cell.hermitian_mean(scratch[j * rows + i]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::shmem::ShmemWorld;
    use num_complex::Complex64;

    fn single_rank_matrix(
        nrows: usize,
        ncols: usize,
    ) -> GlobalMatrix<f64, crate::comm::shmem::ShmemComm> {
        let comm = ShmemWorld::communicators(1).unwrap().remove(0);
        GlobalMatrix::create(comm, nrows, ncols, 1, 1, &[0, nrows], &[0, ncols]).unwrap()
    }

    #[test]
    fn fill_then_get_round_trips() {
        let m = single_rank_matrix(3, 4);
        m.fill(2.5);
        m.sync().unwrap();
        let mut buf = vec![0.0; 12];
        m.get_block(BlockSpan::new(0, 3, 0, 4), &mut buf, 4).unwrap();
        assert!(buf.iter().all(|&v| v == 2.5));
        m.destroy().unwrap();
    }

    #[test]
    fn get_honors_leading_dimension() {
        let m = single_rank_matrix(2, 2);
        m.fill(1.0);
        m.sync().unwrap();
        // ld = 5 with a sentinel buffer: only the block cells may change.
        let mut buf = vec![-9.0; 7];
        m.get_block(BlockSpan::new(0, 2, 0, 2), &mut buf, 5).unwrap();
        assert_eq!(buf, vec![1.0, 1.0, -9.0, -9.0, -9.0, 1.0, 1.0]);
        m.destroy().unwrap();
    }

    #[test]
    fn acc_adds_to_prior_value() {
        let m = single_rank_matrix(2, 3);
        m.fill(1.0);
        m.sync().unwrap();
        let contribution = vec![0.5; 6];
        m.acc_block(BlockSpan::new(0, 2, 0, 3), &contribution, 3).unwrap();
        m.sync().unwrap();
        let mut buf = vec![0.0; 6];
        m.get_block(BlockSpan::new(0, 2, 0, 3), &mut buf, 3).unwrap();
        assert!(buf.iter().all(|&v| v == 1.5));
        m.destroy().unwrap();
    }

    #[test]
    fn request_validation_fails_fast() {
        let m = single_rank_matrix(4, 4);
        let mut buf = vec![0.0; 16];
        assert!(matches!(
            m.get_block(BlockSpan::new(0, 5, 0, 4), &mut buf, 4),
            Err(GlobalMatrixError::OutOfRange { .. })
        ));
        assert!(matches!(
            m.get_block(BlockSpan::new(0, 4, 0, 4), &mut buf, 3),
            Err(GlobalMatrixError::StrideTooSmall { ld: 3, width: 4 })
        ));
        assert!(matches!(
            m.get_block(BlockSpan::new(0, 4, 0, 4), &mut buf[..10], 4),
            Err(GlobalMatrixError::BufferTooSmall { needed: 16, found: 10 })
        ));
        assert!(matches!(
            m.get_block(BlockSpan::new(2, 2, 0, 4), &mut buf, 4),
            Err(GlobalMatrixError::EmptySpan { .. })
        ));
        m.destroy().unwrap();
    }

    #[test]
    fn symmetrize_requires_square() {
        let m = single_rank_matrix(2, 3);
        assert_eq!(
            m.symmetrize().unwrap_err(),
            GlobalMatrixError::NotSquare { nrows: 2, ncols: 3 }
        );
        m.destroy().unwrap();
    }

    #[test]
    fn symmetrize_single_rank_complex() {
        let comm = ShmemWorld::communicators(1).unwrap().remove(0);
        let m: GlobalMatrix<Complex64, _> =
            GlobalMatrix::create(comm, 2, 2, 1, 1, &[0, 2], &[0, 2]).unwrap();
        // [ 1+2i  3-1i ]
        // [ 5+4i  2-6i ]
        let init = [
            Complex64::new(1.0, 2.0),
            Complex64::new(3.0, -1.0),
            Complex64::new(5.0, 4.0),
            Complex64::new(2.0, -6.0),
        ];
        m.acc_block(BlockSpan::new(0, 2, 0, 2), &init, 2).unwrap();
        m.sync().unwrap();
        m.symmetrize().unwrap();
        let mut out = [Complex64::new(0.0, 0.0); 4];
        m.get_block(BlockSpan::new(0, 2, 0, 2), &mut out, 2).unwrap();
        // Diagonal becomes real, off-diagonal pair becomes conjugate.
        assert_eq!(out[0], Complex64::new(1.0, 0.0));
        assert_eq!(out[3], Complex64::new(2.0, 0.0));
        assert_eq!(out[1], Complex64::new(4.0, -2.5));
        assert_eq!(out[2], crate::element::Element::conj(out[1]));
        m.destroy().unwrap();
    }

    #[test]
    fn combine_with_mirror_rectangular_block() {
        // 2x3 block with a 3x2 mirror.
        let mut cells: Vec<f64> = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let scratch: Vec<f64> = vec![10.0, 40.0, 20.0, 50.0, 30.0, 60.0];
        combine_with_mirror(&mut cells, &scratch, 2, 3);
        assert_eq!(cells, vec![5.5, 11.0, 16.5, 22.0, 27.5, 33.0]);
    }
}
