//! The swap area: 8-sector slots.
//!
//! A page is `PAGE_SIZE` (4096) bytes, a sector is `SECTOR_SIZE` (512)
//! bytes, so one swap slot spans 8 contiguous sectors. The swap partition is
//! just another [`Disk`], addressed by [`DiskRole::Swap`] instead of a
//! hard-coded device index.

use keos::{
    block::{Disk, Sector, SECTOR_SIZE},
    error::KernelError,
    mm::PAGE_SIZE,
    sync::SpinLock,
};

/// Sectors one swap slot occupies.
const SECTORS_PER_SLOT: usize = PAGE_SIZE / SECTOR_SIZE;

/// A slotted swap partition: each slot holds exactly one page.
pub struct SwapArea {
    disk: std::sync::Arc<dyn Disk>,
    used: SpinLock<Vec<bool>>,
}

impl SwapArea {
    /// Binds a swap area to `disk`, treating it as a sequence of
    /// `SECTORS_PER_SLOT`-sector slots.
    pub fn new(disk: std::sync::Arc<dyn Disk>) -> Self {
        let slot_count = disk.size() / SECTORS_PER_SLOT;
        Self {
            disk,
            used: SpinLock::new(vec![false; slot_count]),
        }
    }

    /// Total slots available.
    pub fn slot_count(&self) -> usize {
        self.used.lock().len()
    }

    /// Reserves a free slot.
    pub fn alloc_slot(&self) -> Option<usize> {
        let mut used = self.used.lock();
        let idx = used.iter().position(|u| !u)?;
        used[idx] = true;
        Some(idx)
    }

    /// Releases a slot back to the free pool.
    pub fn free_slot(&self, slot: usize) {
        self.used.lock()[slot] = false;
    }

    /// Writes one page's worth of data into `slot`.
    pub fn write_slot(&self, slot: usize, data: &[u8; PAGE_SIZE]) -> Result<(), KernelError> {
        for i in 0..SECTORS_PER_SLOT {
            let sector: [u8; SECTOR_SIZE] = data[i * SECTOR_SIZE..(i + 1) * SECTOR_SIZE]
                .try_into()
                .unwrap();
            self.disk.write(Sector(slot * SECTORS_PER_SLOT + i), &sector)?;
        }
        Ok(())
    }

    /// Reads one page's worth of data out of `slot`.
    pub fn read_slot(&self, slot: usize) -> Result<[u8; PAGE_SIZE], KernelError> {
        let mut data = [0u8; PAGE_SIZE];
        for i in 0..SECTORS_PER_SLOT {
            let mut sector = [0u8; SECTOR_SIZE];
            self.disk.read(Sector(slot * SECTORS_PER_SLOT + i), &mut sector)?;
            data[i * SECTOR_SIZE..(i + 1) * SECTOR_SIZE].copy_from_slice(&sector);
        }
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keos::block::{DiskRole, MemDisk};
    use std::sync::Arc;

    #[test]
    fn alloc_write_read_free_round_trip() {
        let disk: Arc<dyn Disk> = Arc::new(MemDisk::new(DiskRole::Swap, SECTORS_PER_SLOT * 4));
        let swap = SwapArea::new(disk);
        let slot = swap.alloc_slot().unwrap();
        let mut page = [0u8; PAGE_SIZE];
        page[0] = 0xaa;
        page[PAGE_SIZE - 1] = 0x55;
        swap.write_slot(slot, &page).unwrap();
        let back = swap.read_slot(slot).unwrap();
        assert_eq!(back, page);
        swap.free_slot(slot);
        assert_eq!(swap.alloc_slot(), Some(slot));
    }

    #[test]
    fn exhausted_swap_returns_none() {
        let disk: Arc<dyn Disk> = Arc::new(MemDisk::new(DiskRole::Swap, SECTORS_PER_SLOT));
        let swap = SwapArea::new(disk);
        assert!(swap.alloc_slot().is_some());
        assert!(swap.alloc_slot().is_none());
    }
}
