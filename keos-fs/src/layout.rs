//! On-disk layout constants and structures.
//!
//! A Pintos-derived layout: 512-byte sectors, a single fixed-location
//! free-sector bitmap, and a 12-pointer direct/single-indirect/
//! double-indirect inode with no journal or block groups.

use keos::block::SECTOR_SIZE;

/// Sector holding the root directory's inode.
pub const ROOT_DIR_SECTOR: usize = 2;

/// Number of direct block pointers in an inode.
pub const DIRECT_BLOCKS: usize = 10;
/// Index of the single-indirect pointer within `blocks`.
pub const INDIRECT_BLOCK_IDX: usize = 10;
/// Index of the double-indirect pointer within `blocks`.
pub const DOUBLE_INDIRECT_BLOCK_IDX: usize = 11;
/// Total pointer slots in an inode.
pub const INODE_BLOCK_PTRS: usize = 12;
/// Sector-number pointers that fit in one indirect sector.
pub const PTRS_PER_SECTOR: usize = SECTOR_SIZE / core::mem::size_of::<u32>();

/// Maximum data sectors addressable by one inode: 10 direct + 128
/// single-indirect + 128×128 double-indirect.
pub const MAX_DATA_SECTORS: usize = DIRECT_BLOCKS + PTRS_PER_SECTOR + PTRS_PER_SECTOR * PTRS_PER_SECTOR;

/// Fixed identifier stamped into every on-disk inode for validity checks.
pub const INODE_MAGIC: u32 = 0x494e_4f44;

/// Longest directory-entry name, not counting the terminator.
pub const NAME_MAX: usize = 14;

/// On-disk inode: exactly one sector (§3 Inode on-disk).
#[repr(C)]
#[derive(Clone, Copy)]
pub struct DiskInode {
    /// Direct (0..10), single-indirect (10) and double-indirect (11) block
    /// pointers. `0` means "unallocated".
    pub blocks: [u32; INODE_BLOCK_PTRS],
    /// Current file size in bytes.
    pub length: u32,
    /// Must equal [`INODE_MAGIC`].
    pub magic: u32,
    /// Sector of the parent directory's inode, or `0` for the root.
    pub parent: u32,
    /// Non-zero if this inode is a directory.
    pub is_directory: u32,
    /// Reserved, always zero.
    pub _reserved: [u8; 512 - INODE_BLOCK_PTRS * 4 - 4 * 4],
}

const _: () = assert!(core::mem::size_of::<DiskInode>() == SECTOR_SIZE);

impl DiskInode {
    /// A freshly zeroed, invalid-magic inode (used before `create` stamps it).
    pub fn zeroed() -> Self {
        Self {
            blocks: [0; INODE_BLOCK_PTRS],
            length: 0,
            magic: 0,
            parent: 0,
            is_directory: 0,
            _reserved: [0; 512 - INODE_BLOCK_PTRS * 4 - 4 * 4],
        }
    }

    /// Serializes to exactly one sector.
    pub fn to_sector_bytes(self) -> [u8; SECTOR_SIZE] {
        let mut buf = [0u8; SECTOR_SIZE];
        let mut off = 0;
        for b in &self.blocks {
            buf[off..off + 4].copy_from_slice(&b.to_le_bytes());
            off += 4;
        }
        buf[off..off + 4].copy_from_slice(&self.length.to_le_bytes());
        off += 4;
        buf[off..off + 4].copy_from_slice(&self.magic.to_le_bytes());
        off += 4;
        buf[off..off + 4].copy_from_slice(&self.parent.to_le_bytes());
        off += 4;
        buf[off..off + 4].copy_from_slice(&self.is_directory.to_le_bytes());
        buf
    }

    /// Deserializes from exactly one sector.
    pub fn from_sector_bytes(buf: &[u8; SECTOR_SIZE]) -> Self {
        let mut blocks = [0u32; INODE_BLOCK_PTRS];
        let mut off = 0;
        for b in &mut blocks {
            *b = u32::from_le_bytes(buf[off..off + 4].try_into().unwrap());
            off += 4;
        }
        let length = u32::from_le_bytes(buf[off..off + 4].try_into().unwrap());
        off += 4;
        let magic = u32::from_le_bytes(buf[off..off + 4].try_into().unwrap());
        off += 4;
        let parent = u32::from_le_bytes(buf[off..off + 4].try_into().unwrap());
        off += 4;
        let is_directory = u32::from_le_bytes(buf[off..off + 4].try_into().unwrap());
        Self {
            blocks,
            length,
            magic,
            parent,
            is_directory,
            _reserved: [0; 512 - INODE_BLOCK_PTRS * 4 - 4 * 4],
        }
    }
}

/// Reads/writes a sector of raw `u32` pointers (an indirect block).
pub fn indirect_block_to_bytes(ptrs: &[u32; PTRS_PER_SECTOR]) -> [u8; SECTOR_SIZE] {
    let mut buf = [0u8; SECTOR_SIZE];
    for (i, p) in ptrs.iter().enumerate() {
        buf[i * 4..i * 4 + 4].copy_from_slice(&p.to_le_bytes());
    }
    buf
}

/// Parses a sector of raw `u32` pointers (an indirect block).
pub fn indirect_block_from_bytes(buf: &[u8; SECTOR_SIZE]) -> [u32; PTRS_PER_SECTOR] {
    let mut ptrs = [0u32; PTRS_PER_SECTOR];
    for (i, p) in ptrs.iter_mut().enumerate() {
        *p = u32::from_le_bytes(buf[i * 4..i * 4 + 4].try_into().unwrap());
    }
    ptrs
}

/// On-disk directory entry (§3 Directory entry).
#[derive(Clone)]
pub struct DirEntry {
    /// Target inode's sector, or `0` if unused.
    pub inode_sector: u32,
    /// Entry name, at most [`NAME_MAX`] bytes.
    pub name: String,
    /// Whether this slot is occupied.
    pub in_use: bool,
}

/// Bytes one on-disk directory entry occupies: 4 (sector) + 15 (name) + 1
/// (in_use).
pub const DIR_ENTRY_SIZE: usize = 4 + (NAME_MAX + 1) + 1;

impl DirEntry {
    /// A free (unused) slot.
    pub fn free() -> Self {
        Self {
            inode_sector: 0,
            name: String::new(),
            in_use: false,
        }
    }

    /// Serializes this entry to its fixed-width on-disk form.
    pub fn to_bytes(&self) -> [u8; DIR_ENTRY_SIZE] {
        let mut buf = [0u8; DIR_ENTRY_SIZE];
        buf[0..4].copy_from_slice(&self.inode_sector.to_le_bytes());
        let name_bytes = self.name.as_bytes();
        buf[4..4 + name_bytes.len()].copy_from_slice(name_bytes);
        buf[DIR_ENTRY_SIZE - 1] = self.in_use as u8;
        buf
    }

    /// Parses an entry from its fixed-width on-disk form.
    pub fn from_bytes(buf: &[u8; DIR_ENTRY_SIZE]) -> Self {
        let inode_sector = u32::from_le_bytes(buf[0..4].try_into().unwrap());
        let name_region = &buf[4..4 + NAME_MAX + 1];
        let nul = name_region.iter().position(|&b| b == 0).unwrap_or(name_region.len());
        let name = String::from_utf8_lossy(&name_region[..nul]).into_owned();
        let in_use = buf[DIR_ENTRY_SIZE - 1] != 0;
        Self {
            inode_sector,
            name,
            in_use,
        }
    }
}
