//! Block device facade.
//!
//! Fixed-size sector read/write, plus a role lookup so the filesystem and
//! swap subsystems can each find their own partition without knowing about
//! each other's existence. A small trait rather than a single hard-coded
//! BIOS device index, so tests can swap in an in-memory disk.

use crate::error::KernelError;

/// Bytes in one sector; the fixed unit of disk I/O (§3 Sector).
pub const SECTOR_SIZE: usize = 512;

/// A sector number (offset from the start of a partition, in sectors).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Sector(pub usize);

impl Sector {
    /// Byte offset this sector represents within its partition.
    #[inline]
    pub fn into_offset(self) -> usize {
        self.0 * SECTOR_SIZE
    }

    /// The raw sector index.
    #[inline]
    pub fn into_usize(self) -> usize {
        self.0
    }
}

impl std::ops::Add<usize> for Sector {
    type Output = Self;
    fn add(self, rhs: usize) -> Self {
        Self(self.0 + rhs)
    }
}

/// Which logical partition a [`Disk`] backs.
///
/// The block device exposes role lookup so the filesystem can find its own
/// partition and the VM subsystem can find the swap partition, without
/// either depending on a hard-coded device index (§1 "Raw block device
/// driver ... role lookup for the filesystem and swap partitions").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiskRole {
    /// The filesystem partition.
    Filesystem,
    /// The swap partition.
    Swap,
}

/// A fixed-size-sector block device.
pub trait Disk: Send + Sync {
    /// Reads one sector into `buf`.
    fn read(&self, sector: Sector, buf: &mut [u8; SECTOR_SIZE]) -> Result<(), KernelError>;

    /// Writes one sector from `buf`.
    fn write(&self, sector: Sector, buf: &[u8; SECTOR_SIZE]) -> Result<(), KernelError>;

    /// Total number of sectors on this device.
    fn size(&self) -> usize;

    /// The role this device was registered under.
    fn role(&self) -> DiskRole;
}

/// An in-memory disk, for tests and for the reference `format`/`mount` flow.
pub struct MemDisk {
    role: DiskRole,
    sectors: crate::sync::RwLock<Vec<[u8; SECTOR_SIZE]>>,
}

impl MemDisk {
    /// Creates a zero-filled disk of `sector_count` sectors.
    pub fn new(role: DiskRole, sector_count: usize) -> Self {
        Self {
            role,
            sectors: crate::sync::RwLock::new(vec![[0u8; SECTOR_SIZE]; sector_count]),
        }
    }
}

impl Disk for MemDisk {
    fn read(&self, sector: Sector, buf: &mut [u8; SECTOR_SIZE]) -> Result<(), KernelError> {
        let sectors = self.sectors.read();
        let src = sectors.get(sector.into_usize()).ok_or(KernelError::IOError)?;
        buf.copy_from_slice(src);
        Ok(())
    }

    fn write(&self, sector: Sector, buf: &[u8; SECTOR_SIZE]) -> Result<(), KernelError> {
        let mut sectors = self.sectors.write();
        let dst = sectors
            .get_mut(sector.into_usize())
            .ok_or(KernelError::IOError)?;
        dst.copy_from_slice(buf);
        Ok(())
    }

    fn size(&self) -> usize {
        self.sectors.read().len()
    }

    fn role(&self) -> DiskRole {
        self.role
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mem_disk_round_trips_a_sector() {
        let disk = MemDisk::new(DiskRole::Filesystem, 16);
        let mut buf = [0u8; SECTOR_SIZE];
        buf[0] = 0xab;
        disk.write(Sector(3), &buf).unwrap();
        let mut out = [0u8; SECTOR_SIZE];
        disk.read(Sector(3), &mut out).unwrap();
        assert_eq!(out[0], 0xab);
    }

    #[test]
    fn mem_disk_rejects_out_of_range_sector() {
        let disk = MemDisk::new(DiskRole::Swap, 4);
        let buf = [0u8; SECTOR_SIZE];
        assert_eq!(disk.write(Sector(4), &buf), Err(KernelError::IOError));
    }
}
