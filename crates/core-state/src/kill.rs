//! Four-slot kill ring.
//!
//! Kill commands open a slot with [`KillRing::start_kill`] and append into it;
//! yanking reads relative to the yank index, and `yank_pop` walks backwards
//! through the ring. Head and yank indices are atomics so the mode line can
//! report ring state without borrowing the ring mutably.

use std::sync::atomic::{AtomicUsize, Ordering};

pub const KILL_RING_SLOTS: usize = 4;

#[derive(Debug, Default)]
pub struct KillRing {
    slots: [Vec<u8>; KILL_RING_SLOTS],
    head: AtomicUsize,
    yank: AtomicUsize,
}

impl KillRing {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rotate to a fresh slot and clear it. Called at the start of a kill
    /// command; subsequent [`KillRing::append`] calls extend the same slot so
    /// a multi-chunk kill yanks back as one piece.
    pub fn start_kill(&mut self) {
        let head = (self.head.load(Ordering::Acquire) + 1) % KILL_RING_SLOTS;
        self.head.store(head, Ordering::Release);
        self.yank.store(head, Ordering::Release);
        self.slots[head].clear();
    }

    pub fn append(&mut self, bytes: &[u8]) {
        let head = self.head.load(Ordering::Acquire);
        self.slots[head].extend_from_slice(bytes);
    }

    /// Current yank text; empty when nothing has been killed.
    pub fn yank(&self) -> &[u8] {
        &self.slots[self.yank.load(Ordering::Acquire)]
    }

    /// Step the yank index back one slot and return its content.
    pub fn yank_pop(&self) -> &[u8] {
        let yank =
            (self.yank.load(Ordering::Acquire) + KILL_RING_SLOTS - 1) % KILL_RING_SLOTS;
        self.yank.store(yank, Ordering::Release);
        &self.slots[yank]
    }
}
