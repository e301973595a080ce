//! One-sided communication seam.
//!
//! The matrix engine talks to its transport through [`OneSided`]: window
//! registration, raw-byte one-sided read and accumulate against a target
//! rank, and a collective epoch fence. Payloads are contiguous byte slices;
//! typed interpretation happens at the window via its [`ElementType`] tag.
//!
//! The in-process backend ([`shmem::ShmemComm`]) runs one participant per
//! OS thread and emulates one-sided access through shared, lock-guarded
//! window buffers with the same epoch-fence discipline a native RMA
//! transport would use.

use std::sync::Arc;

use parking_lot::{
    MappedRwLockReadGuard, MappedRwLockWriteGuard, RwLock, RwLockReadGuard, RwLockWriteGuard,
};

use crate::element::ElementType;
use crate::error::GlobalMatrixError;

pub mod shmem;

/// Identifier of a registered window, identical on every participant.
///
/// Window creation is collective and every participant performs its
/// creations in the same order, so per-participant sequence numbers agree
/// across the job. This is checked at registration time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WindowId(pub(crate) u64);

/// One participant's registered block buffer.
///
/// The buffer is raw bytes tagged with an element type; it is guarded by a
/// reader-writer lock so that remote accumulates are applied atomically
/// with respect to concurrent reads and to each other. Buffers start
/// zeroed. Storage is backed by `u64` words so the byte view is always
/// 8-byte aligned — enough for every [`ElementType`] — and the typed casts
/// in the engine can never hit an alignment mismatch; a `Vec<u8>` would
/// only be 1-byte aligned by contract.
#[derive(Debug)]
pub struct Window {
    elem: ElementType,
    len_bytes: usize,
    data: RwLock<Vec<u64>>,
}

impl Window {
    pub(crate) fn new(elem: ElementType, len_elements: usize) -> Self {
        let len_bytes = len_elements * elem.width();
        Self {
            elem,
            len_bytes,
            data: RwLock::new(vec![0u64; len_bytes.div_ceil(8)]),
        }
    }

    /// Element descriptor this window was registered with.
    #[inline]
    pub fn elem(&self) -> ElementType {
        self.elem
    }

    /// Registered size in bytes.
    #[inline]
    pub fn len_bytes(&self) -> usize {
        self.len_bytes
    }

    /// Shared read access to the registered bytes (local fast path and
    /// remote gets). The view is trimmed to `len_bytes`, excluding any
    /// word-padding tail.
    #[inline]
    pub(crate) fn read(&self) -> MappedRwLockReadGuard<'_, [u8]> {
        RwLockReadGuard::map(self.data.read(), |words| {
            &bytemuck::cast_slice::<u64, u8>(words)[..self.len_bytes]
        })
    }

    /// Exclusive access (fill, accumulate, symmetrize write-back).
    #[inline]
    pub(crate) fn write(&self) -> MappedRwLockWriteGuard<'_, [u8]> {
        RwLockWriteGuard::map(self.data.write(), |words| {
            &mut bytemuck::cast_slice_mut::<u64, u8>(words)[..self.len_bytes]
        })
    }
}

/// A created window: the collective identifier plus the caller's own block.
///
/// The local buffer is only reachable by the owning participant through the
/// transfer engine; peers access it via [`OneSided::get`] and
/// [`OneSided::accumulate`].
#[derive(Debug, Clone)]
pub struct WindowRef {
    pub(crate) id: WindowId,
    pub(crate) local: Arc<Window>,
}

impl WindowRef {
    #[inline]
    pub fn id(&self) -> WindowId {
        self.id
    }

    #[inline]
    pub(crate) fn local(&self) -> &Window {
        &self.local
    }
}

/// One-sided transport: window registration, raw get/accumulate, and the
/// collective epoch fence.
///
/// Completion contract: `get` and `accumulate` settle the *issuing*
/// participant's view before returning; visibility to other participants is
/// guaranteed only after the next [`fence`](OneSided::fence) returns
/// everywhere. A participant that skips a collective call stalls the rest of
/// the job indefinitely; the transport cannot detect this.
pub trait OneSided: Send + Sync + 'static {
    /// This participant's flat rank in `[0, size)`.
    fn rank(&self) -> usize;

    /// Number of participants.
    fn size(&self) -> usize;

    /// Collective: register a window of `len_elements` elements of `elem`,
    /// returning a handle whose id matches on every participant.
    fn create_window(
        &self,
        elem: ElementType,
        len_elements: usize,
    ) -> Result<WindowRef, GlobalMatrixError>;

    /// Collective: release a window. No one-sided operation may target the
    /// window after this returns anywhere.
    fn free_window(&self, win: &WindowRef) -> Result<(), GlobalMatrixError>;

    /// One-sided read of `dst.len()` bytes at `byte_offset` in `target`'s
    /// window into `dst`.
    fn get(
        &self,
        win: &WindowRef,
        target: usize,
        byte_offset: usize,
        dst: &mut [u8],
    ) -> Result<(), GlobalMatrixError>;

    /// One-sided element-wise atomic add of `src` into `target`'s window at
    /// `byte_offset`, interpreting bytes per the window's element tag.
    fn accumulate(
        &self,
        win: &WindowRef,
        target: usize,
        byte_offset: usize,
        src: &[u8],
    ) -> Result<(), GlobalMatrixError>;

    /// Collective epoch fence. On return, every one-sided operation issued
    /// by any participant before its matching call is visible everywhere.
    /// Returns the epoch counter, which is identical on all participants
    /// that have made the same sequence of collective calls.
    fn fence(&self) -> Result<u64, GlobalMatrixError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_bytes_are_aligned_for_every_element_type() {
        // Typed casts over the byte view require the allocation to carry
        // the element's alignment, not the 1-byte alignment a plain byte
        // vector is entitled to.
        for elem in [
            ElementType::I32,
            ElementType::I64,
            ElementType::F32,
            ElementType::F64,
            ElementType::C32,
            ElementType::C64,
        ] {
            let w = Window::new(elem, 3);
            let guard = w.read();
            assert_eq!(guard.as_ptr().align_offset(8), 0, "{elem:?} window");
        }
    }

    #[test]
    fn window_view_is_trimmed_to_registered_length() {
        // 3 x i32 = 12 bytes, padded to 2 words internally.
        let w = Window::new(ElementType::I32, 3);
        assert_eq!(w.len_bytes(), 12);
        assert_eq!(w.read().len(), 12);
        assert_eq!(w.write().len(), 12);
    }

    #[test]
    fn window_write_round_trips_through_typed_view() {
        let w = Window::new(ElementType::F64, 5);
        {
            let mut guard = w.write();
            let cells: &mut [f64] = bytemuck::cast_slice_mut(&mut guard[..]);
            assert_eq!(cells.len(), 5);
            cells.fill(2.5);
        }
        let guard = w.read();
        let cells: &[f64] = bytemuck::cast_slice(&guard[..]);
        assert!(cells.iter().all(|&v| v == 2.5));
    }
}
