//! The global frame table (§4.6).
//!
//! "The frame table is created at boot by draining the user page pool,
//! counting frames, then freeing them back" (`keos::mm::Page` pool, see
//! `keos/src/mm.rs`). Here it's a thin ownership ledger layered over
//! [`keos::mm::FramePool`]: which `(process, vpn)` currently occupies each
//! frame, plus the clock hand the evictor sweeps.

use keos::mm::FramePool;
use keos::sync::SpinLock;

use crate::addr::Vpn;
use crate::ProcessId;

/// The `(process, page)` pair currently resident in a frame.
#[derive(Clone, Copy)]
pub struct FrameOwner {
    pub process: ProcessId,
    pub vpn: Vpn,
}

struct Table {
    owners: Vec<Option<FrameOwner>>,
    clock_hand: usize,
}

/// Tracks which process owns each physical frame, and the clock hand used to
/// pick an eviction victim when the pool is exhausted.
pub struct FrameTable {
    pool: FramePool,
    table: SpinLock<Table>,
}

impl FrameTable {
    /// Creates a frame table backed by `frame_count` physical frames.
    pub fn new(frame_count: usize) -> Self {
        Self {
            pool: FramePool::new(frame_count),
            table: SpinLock::new(Table {
                owners: vec![None; frame_count],
                clock_hand: 0,
            }),
        }
    }

    /// Total frames backing this table.
    pub fn frame_count(&self) -> usize {
        self.pool.frame_count()
    }

    /// Allocates a free frame and records its owner, or `None` if the pool is
    /// exhausted (the caller must evict first).
    pub fn alloc(&self, owner: FrameOwner) -> Option<usize> {
        let frame = self.pool.alloc()?;
        self.table.lock().owners[frame] = Some(owner);
        Some(frame)
    }

    /// Frees `frame`, clearing its owner and zeroing its contents.
    pub fn dealloc(&self, frame: usize) {
        self.table.lock().owners[frame] = None;
        self.pool.dealloc(frame);
    }

    /// Current owner of `frame`, if allocated.
    pub fn owner(&self, frame: usize) -> Option<FrameOwner> {
        self.table.lock().owners[frame]
    }

    pub fn write(&self, frame: usize, data: &[u8; keos::mm::PAGE_SIZE]) {
        self.pool.write_frame(frame, data);
    }

    pub fn read(&self, frame: usize) -> [u8; keos::mm::PAGE_SIZE] {
        self.pool.read_frame(frame)
    }

    pub fn zero(&self, frame: usize) {
        self.pool.zero_frame(frame);
    }

    /// Advances the clock hand by one and returns the frame it now points
    /// at, cycling through every frame in the table (§4.6 "second-chance" /
    /// "clock hand" eviction).
    pub fn advance_clock(&self) -> usize {
        let mut table = self.table.lock();
        let frame = table.clock_hand;
        table.clock_hand = (table.clock_hand + 1) % table.owners.len().max(1);
        frame
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_records_owner_and_dealloc_clears_it() {
        let table = FrameTable::new(2);
        let pid = ProcessId(1);
        let frame = table.alloc(FrameOwner { process: pid, vpn: Vpn(0) }).unwrap();
        assert_eq!(table.owner(frame).unwrap().process, pid);
        table.dealloc(frame);
        assert!(table.owner(frame).is_none());
    }

    #[test]
    fn clock_hand_cycles_through_every_frame() {
        let table = FrameTable::new(3);
        let seen: Vec<usize> = (0..6).map(|_| table.advance_clock()).collect();
        assert_eq!(seen, vec![0, 1, 2, 0, 1, 2]);
    }
}
