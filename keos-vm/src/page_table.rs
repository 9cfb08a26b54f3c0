//! Per-process page table.
//!
//! A flat `Vpn -> frame` map plus the accessed/dirty bits the clock-hand
//! evictor reads, standing in for a real multi-level page table since there
//! is no MMU underneath to walk. Only one mapping per address; a second
//! `map` on an already-mapped page is an error.

use std::collections::HashMap;

use keos::error::KernelError;

use crate::addr::Vpn;
use crate::permission::Permission;

/// One resident mapping: the frame it's backed by, its permissions, and the
/// accessed/dirty bits a hardware PTE would carry.
#[derive(Clone, Copy)]
pub struct PageTableEntry {
    pub frame: usize,
    pub perm: Permission,
    accessed: bool,
    dirty: bool,
}

/// A simulated per-process page table.
#[derive(Default)]
pub struct PageTable {
    entries: HashMap<Vpn, PageTableEntry>,
}

impl PageTable {
    /// An empty page table with nothing mapped.
    pub fn new() -> Self {
        Self::default()
    }

    /// Maps `vpn` to `frame` with `perm`. Fails if already mapped.
    pub fn map(&mut self, vpn: Vpn, frame: usize, perm: Permission) -> Result<(), KernelError> {
        if self.entries.contains_key(&vpn) {
            return Err(KernelError::InvalidArgument);
        }
        self.entries.insert(
            vpn,
            PageTableEntry {
                frame,
                perm,
                accessed: false,
                dirty: false,
            },
        );
        Ok(())
    }

    /// Removes `vpn`'s mapping, returning the frame it held.
    pub fn unmap(&mut self, vpn: Vpn) -> Option<usize> {
        self.entries.remove(&vpn).map(|e| e.frame)
    }

    /// Looks up `vpn`'s current mapping.
    pub fn walk(&self, vpn: Vpn) -> Option<&PageTableEntry> {
        self.entries.get(&vpn)
    }

    /// Records a read or write access to `vpn` (accessed bit always, dirty
    /// bit only on write), same as a hardware table walk would.
    pub fn touch(&mut self, vpn: Vpn, is_write: bool) {
        if let Some(entry) = self.entries.get_mut(&vpn) {
            entry.accessed = true;
            entry.dirty |= is_write;
        }
    }

    /// Reads and clears the accessed bit (the clock hand's probe-and-clear).
    pub fn take_accessed(&mut self, vpn: Vpn) -> bool {
        self.entries
            .get_mut(&vpn)
            .map(|e| std::mem::replace(&mut e.accessed, false))
            .unwrap_or(false)
    }

    /// Whether `vpn` has been written since it was last loaded.
    pub fn is_dirty(&self, vpn: Vpn) -> bool {
        self.entries.get(&vpn).map(|e| e.dirty).unwrap_or(false)
    }

    /// Clears every mapping (used when a process exits).
    pub fn clear(&mut self) -> Vec<(Vpn, usize)> {
        self.entries.drain().map(|(vpn, e)| (vpn, e.frame)).collect()
    }
}
