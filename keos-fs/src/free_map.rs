//! Free-sector map.
//!
//! A bit-per-sector persistent bitmap. `allocate` reserves a contiguous run
//! (typically of length 1); `release` clears one. `FreeMap` is owned by the
//! [`crate::FileSystem`] for exactly the mount-to-unmount window and persists
//! itself on [`FreeMap::persist`]. Its bits live in a reserved extent right
//! after the root-directory inode rather than walking the general inode
//! indirection tree to address its own backing store — the map must exist
//! before any inode can be created, so it cannot be grown by the very
//! mechanism it arbitrates. The bitmap's own sectors are laid down directly
//! at format time rather than through the regular inode-write path.

use keos::{
    block::{Disk, Sector, SECTOR_SIZE},
    error::KernelError,
};

use crate::layout::ROOT_DIR_SECTOR;

/// First sector available for the free map's own bitmap data.
const FREE_MAP_DATA_START: usize = ROOT_DIR_SECTOR + 1;

/// The free-sector bitmap.
pub struct FreeMap {
    bits: Vec<bool>,
    data_sectors: usize,
}

impl FreeMap {
    fn bitmap_sector_count(total_sectors: usize) -> usize {
        total_sectors.div_ceil(SECTOR_SIZE * 8)
    }

    /// Creates a fresh, empty filesystem's free map: reserves the boot
    /// sector, the free map's own inode sector, the root directory's inode
    /// sector, and the bitmap's own data sectors.
    pub fn format(disk: &dyn Disk) -> Self {
        let total = disk.size();
        let data_sectors = Self::bitmap_sector_count(total);
        let mut bits = vec![false; total];
        bits.iter_mut().take(FREE_MAP_DATA_START + data_sectors).for_each(|b| *b = true);
        let map = Self { bits, data_sectors };
        map.persist(disk).expect("formatting a fresh disk must fit its own metadata");
        map
    }

    /// Loads a previously formatted free map back from disk.
    pub fn load(disk: &dyn Disk) -> Result<Self, KernelError> {
        let total = disk.size();
        let data_sectors = Self::bitmap_sector_count(total);
        let mut bits = vec![false; total];
        let mut buf = [0u8; SECTOR_SIZE];
        for i in 0..data_sectors {
            disk.read(Sector(FREE_MAP_DATA_START + i), &mut buf)?;
            for (byte_idx, byte) in buf.iter().enumerate() {
                for bit in 0..8 {
                    let sector = i * SECTOR_SIZE * 8 + byte_idx * 8 + bit;
                    if sector < total {
                        bits[sector] = byte & (1 << bit) != 0;
                    }
                }
            }
        }
        Ok(Self { bits, data_sectors })
    }

    /// Writes the bitmap back to its reserved extent.
    pub fn persist(&self, disk: &dyn Disk) -> Result<(), KernelError> {
        for i in 0..self.data_sectors {
            let mut buf = [0u8; SECTOR_SIZE];
            for (byte_idx, byte) in buf.iter_mut().enumerate() {
                let mut v = 0u8;
                for bit in 0..8 {
                    let sector = i * SECTOR_SIZE * 8 + byte_idx * 8 + bit;
                    if self.bits.get(sector).copied().unwrap_or(false) {
                        v |= 1 << bit;
                    }
                }
                *byte = v;
            }
            disk.write(Sector(FREE_MAP_DATA_START + i), &buf)?;
        }
        Ok(())
    }

    /// Number of free sectors remaining.
    pub fn count(&self) -> usize {
        self.bits.iter().filter(|b| !**b).count()
    }

    /// Reserves `count` contiguous sectors, returning the first one.
    ///
    /// Atomic: on failure, no bits are modified.
    pub fn allocate(&mut self, count: usize) -> Option<Sector> {
        if count == 0 {
            return Some(Sector(0));
        }
        let mut run_start = None;
        let mut run_len = 0;
        for (i, used) in self.bits.iter().enumerate() {
            if *used {
                run_start = None;
                run_len = 0;
                continue;
            }
            if run_start.is_none() {
                run_start = Some(i);
            }
            run_len += 1;
            if run_len == count {
                let start = run_start.unwrap();
                for bit in self.bits.iter_mut().skip(start).take(count) {
                    *bit = true;
                }
                return Some(Sector(start));
            }
        }
        None
    }

    /// Releases `count` sectors starting at `sector`.
    pub fn release(&mut self, sector: Sector, count: usize) {
        for bit in self
            .bits
            .iter_mut()
            .skip(sector.into_usize())
            .take(count)
        {
            debug_assert!(*bit, "releasing an already-free sector");
            *bit = false;
        }
    }

    /// Whether allocating `count` more sectors would succeed right now.
    pub fn can_allocate(&self, count: usize) -> bool {
        self.count() >= count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keos::block::{DiskRole, MemDisk};

    #[test]
    fn format_reserves_boot_and_metadata_sectors() {
        let disk = MemDisk::new(DiskRole::Filesystem, 64);
        let map = FreeMap::format(&disk);
        assert!(map.count() < 64);
    }

    #[test]
    fn allocate_and_release_round_trip() {
        let disk = MemDisk::new(DiskRole::Filesystem, 64);
        let mut map = FreeMap::format(&disk);
        let before = map.count();
        let sector = map.allocate(3).unwrap();
        assert_eq!(map.count(), before - 3);
        map.release(sector, 3);
        assert_eq!(map.count(), before);
    }

    #[test]
    fn allocate_fails_when_exhausted() {
        let disk = MemDisk::new(DiskRole::Filesystem, 20);
        let mut map = FreeMap::format(&disk);
        let free = map.count();
        assert!(map.allocate(free).is_some());
        assert!(map.allocate(1).is_none());
    }

    #[test]
    fn persists_across_load() {
        let disk = MemDisk::new(DiskRole::Filesystem, 64);
        let mut map = FreeMap::format(&disk);
        let sector = map.allocate(2).unwrap();
        map.persist(&disk).unwrap();
        let reloaded = FreeMap::load(&disk).unwrap();
        assert_eq!(reloaded.count(), map.count());
        let _ = sector;
    }
}
