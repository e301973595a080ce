//! In-process shared-memory backend: one participant per OS thread.
//!
//! Windows live in a process-wide registry shared by all participants of a
//! world; a one-sided get is a direct read of the target's buffer under its
//! read lock, and an accumulate is an element-wise add under its write
//! lock. The epoch fence is a reusable barrier that also advances a shared
//! epoch counter, making collective call-count matching an explicit,
//! checkable invariant.

use std::sync::Arc;
use std::sync::Barrier;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;

use crate::comm::{OneSided, Window, WindowId, WindowRef};
use crate::element::ElementType;
use crate::error::GlobalMatrixError;

/// State shared by every participant of one job.
#[derive(Debug)]
pub struct ShmemWorld {
    nranks: usize,
    barrier: Barrier,
    epoch: AtomicU64,
    /// Registered windows, keyed by (window id, owner rank).
    windows: DashMap<(u64, usize), Arc<Window>>,
}

impl ShmemWorld {
    /// Set up a world of `nranks` participants and hand out one
    /// communicator per rank.
    ///
    /// # Errors
    /// `Transport` if `nranks` is zero.
    pub fn communicators(nranks: usize) -> Result<Vec<ShmemComm>, GlobalMatrixError> {
        if nranks == 0 {
            return Err(GlobalMatrixError::Transport(
                "world needs at least one participant".into(),
            ));
        }
        let world = Arc::new(ShmemWorld {
            nranks,
            barrier: Barrier::new(nranks),
            epoch: AtomicU64::new(0),
            windows: DashMap::new(),
        });
        Ok((0..nranks)
            .map(|rank| ShmemComm {
                world: Arc::clone(&world),
                rank,
                window_seq: Arc::new(AtomicU64::new(0)),
            })
            .collect())
    }

    /// Run `f` once per rank, each on its own thread, and collect the
    /// results in rank order. Panics if any participant panics; intended
    /// for drivers and tests.
    pub fn run<R, F>(nranks: usize, f: F) -> Result<Vec<R>, GlobalMatrixError>
    where
        R: Send,
        F: Fn(ShmemComm) -> R + Send + Sync,
    {
        let comms = Self::communicators(nranks)?;
        let f = &f;
        let results = std::thread::scope(|scope| {
            let handles: Vec<_> = comms
                .into_iter()
                .map(|comm| scope.spawn(move || f(comm)))
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().expect("participant panicked"))
                .collect()
        });
        Ok(results)
    }
}

/// One participant's handle onto a [`ShmemWorld`].
///
/// Window creation draws ids from a per-rank sequence counter; because
/// creation is collective and every participant performs its creations in
/// the same order, the counters agree across the job.
#[derive(Debug, Clone)]
pub struct ShmemComm {
    world: Arc<ShmemWorld>,
    rank: usize,
    window_seq: Arc<AtomicU64>,
}

impl ShmemComm {
    fn window(&self, id: WindowId, target: usize) -> Result<Arc<Window>, GlobalMatrixError> {
        if target >= self.world.nranks {
            return Err(GlobalMatrixError::InvalidRank {
                rank: target,
                nranks: self.world.nranks,
            });
        }
        self.world
            .windows
            .get(&(id.0, target))
            .map(|w| Arc::clone(w.value()))
            .ok_or_else(|| {
                GlobalMatrixError::Transport(format!(
                    "window {:?} is not registered on rank {target}",
                    id
                ))
            })
    }

    fn check_range(
        win: &Window,
        byte_offset: usize,
        len: usize,
    ) -> Result<(), GlobalMatrixError> {
        let end = byte_offset.checked_add(len);
        match end {
            Some(end) if end <= win.len_bytes() => Ok(()),
            _ => Err(GlobalMatrixError::Transport(format!(
                "access [{byte_offset}, {byte_offset}+{len}) exceeds window of {} bytes",
                win.len_bytes()
            ))),
        }
    }
}

impl OneSided for ShmemComm {
    #[inline]
    fn rank(&self) -> usize {
        self.rank
    }

    #[inline]
    fn size(&self) -> usize {
        self.world.nranks
    }

    fn create_window(
        &self,
        elem: ElementType,
        len_elements: usize,
    ) -> Result<WindowRef, GlobalMatrixError> {
        // Collective ordering makes the drawn id agree across ranks; the
        // post-fence scan below turns a violated ordering into an error
        // instead of silent cross-talk.
        let id = WindowId(self.window_seq.fetch_add(1, Ordering::SeqCst));
        let local = Arc::new(Window::new(elem, len_elements));
        self.world
            .windows
            .insert((id.0, self.rank), Arc::clone(&local));
        self.fence()?;
        for rank in 0..self.world.nranks {
            let peer = self.window(id, rank)?;
            if peer.elem() != elem {
                return Err(GlobalMatrixError::Transport(format!(
                    "window {id:?} registered as {:?} on rank {rank} but {elem:?} here",
                    peer.elem()
                )));
            }
        }
        log::debug!(
            "rank {}: window {id:?} registered ({len_elements} x {elem:?})",
            self.rank
        );
        Ok(WindowRef { id, local })
    }

    fn free_window(&self, win: &WindowRef) -> Result<(), GlobalMatrixError> {
        // First fence: no participant may still be issuing against the
        // window. Second fence: deregistration is complete everywhere.
        self.fence()?;
        self.world.windows.remove(&(win.id.0, self.rank));
        self.fence()?;
        log::debug!("rank {}: window {:?} released", self.rank, win.id);
        Ok(())
    }

    fn get(
        &self,
        win: &WindowRef,
        target: usize,
        byte_offset: usize,
        dst: &mut [u8],
    ) -> Result<(), GlobalMatrixError> {
        if dst.is_empty() {
            return Ok(());
        }
        let window = self.window(win.id, target)?;
        Self::check_range(&window, byte_offset, dst.len())?;
        let guard = window.read();
        dst.copy_from_slice(&guard[byte_offset..byte_offset + dst.len()]);
        Ok(())
    }

    fn accumulate(
        &self,
        win: &WindowRef,
        target: usize,
        byte_offset: usize,
        src: &[u8],
    ) -> Result<(), GlobalMatrixError> {
        if src.is_empty() {
            return Ok(());
        }
        let window = self.window(win.id, target)?;
        Self::check_range(&window, byte_offset, src.len())?;
        let elem = window.elem();
        let mut guard = window.write();
        crate::element::accumulate_bytes(
            elem,
            &mut guard[byte_offset..byte_offset + src.len()],
            src,
        )
    }

    fn fence(&self) -> Result<u64, GlobalMatrixError> {
        // Two-phase wait: the leader advances the epoch between the waits,
        // so every participant leaves with the same counter value.
        let outcome = self.world.barrier.wait();
        if outcome.is_leader() {
            self.world.epoch.fetch_add(1, Ordering::SeqCst);
        }
        self.world.barrier.wait();
        Ok(self.world.epoch.load(Ordering::SeqCst))
    }
}
