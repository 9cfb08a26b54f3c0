//! In-memory, reference-counted inode store.
//!
//! A single, lock-guarded in-memory view per inode number, shared by every
//! opener: there is at most one in-memory [`Inode`] per sector;
//! `InodeStore::open` enforces that by keying a table on the sector number.

use std::collections::HashMap;
use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc,
};

use keos::{
    block::{Disk, Sector, SECTOR_SIZE},
    error::KernelError,
    sync::{RwLock, SpinLock},
};

use crate::free_map::FreeMap;
use crate::layout::{
    indirect_block_from_bytes, indirect_block_to_bytes, DiskInode, DIRECT_BLOCKS,
    DOUBLE_INDIRECT_BLOCK_IDX, INDIRECT_BLOCK_IDX, INODE_MAGIC, MAX_DATA_SECTORS, PTRS_PER_SECTOR,
};

/// An in-memory, reference-counted inode.
///
/// Shared by every opener of the same sector (§3 invariant: at most one
/// in-memory inode per disk sector). `content_lock` is held only while a
/// writer is extending the file (§4.1 `write_at`); readers proceed
/// unsynchronized and are protected instead by observing `length` only after
/// an extension publishes it.
pub struct Inode {
    pub(crate) sector: Sector,
    open_count: AtomicUsize,
    removed: AtomicBool,
    deny_write_count: AtomicUsize,
    disk: RwLock<DiskInode>,
    content_lock: SpinLock<()>,
    /// Present when this inode is a directory; serializes directory-content
    /// mutation and cursor reads (§5).
    pub(crate) dir_lock: Option<SpinLock<()>>,
}

impl Inode {
    /// Current file length in bytes.
    pub fn length(&self) -> usize {
        self.disk.read().length as usize
    }

    /// Sector this inode lives at.
    pub fn sector(&self) -> Sector {
        self.sector
    }

    /// Parent directory's inode sector (0 for the root).
    pub fn parent(&self) -> u32 {
        self.disk.read().parent
    }

    /// Number of live handles referencing this inode.
    pub fn open_count(&self) -> usize {
        self.open_count.load(Ordering::SeqCst)
    }

    /// Whether this inode has a pending removal.
    pub fn is_removed(&self) -> bool {
        self.removed.load(Ordering::SeqCst)
    }

    /// Increments the deny-write counter, bounded by `open_count`.
    pub fn deny_write(&self) {
        let n = self.deny_write_count.fetch_add(1, Ordering::SeqCst) + 1;
        debug_assert!(n <= self.open_count());
    }

    /// Decrements the deny-write counter.
    pub fn allow_write(&self) {
        self.deny_write_count.fetch_sub(1, Ordering::SeqCst);
    }

    fn write_denied(&self) -> bool {
        self.deny_write_count.load(Ordering::SeqCst) != 0
    }
}

/// The global open-inode set plus the machinery to create, read, write, and
/// destroy inodes against a disk.
pub struct InodeStore {
    disk: Arc<dyn Disk>,
    free_map: Arc<SpinLock<FreeMap>>,
    open: SpinLock<HashMap<usize, Arc<Inode>>>,
}

fn sectors_needed(length: usize) -> usize {
    length.div_ceil(SECTOR_SIZE)
}

/// Indirection sectors a file of `sector_count` data sectors requires, on
/// top of the data sectors themselves (§4.1 create's pre-check).
fn indirection_overhead(sector_count: usize) -> usize {
    let mut overhead = 0;
    if sector_count > DIRECT_BLOCKS {
        overhead += 1; // single-indirect block
    }
    if sector_count > DIRECT_BLOCKS + PTRS_PER_SECTOR {
        let double_indirect_sectors = sector_count - (DIRECT_BLOCKS + PTRS_PER_SECTOR);
        overhead += 1; // double-indirect block itself
        overhead += double_indirect_sectors.div_ceil(PTRS_PER_SECTOR);
    }
    overhead
}

impl InodeStore {
    /// Creates a store bound to `disk`, sharing `free_map` with the rest of
    /// the filesystem.
    pub fn new(disk: Arc<dyn Disk>, free_map: Arc<SpinLock<FreeMap>>) -> Self {
        Self {
            disk,
            free_map,
            open: SpinLock::new(HashMap::new()),
        }
    }

    /// Allocates `ceil(length/512)` data sectors, zeros them, and writes a
    /// fresh inode header at `sector`.
    ///
    /// Pre-checks the free map for the data sectors *and* the indirection
    /// overhead they require; on any shortfall, nothing is allocated and
    /// `Err(NoSpace)` is returned (atomic failure per §4.1).
    pub fn create(
        &self,
        sector: Sector,
        length: usize,
        parent: u32,
        is_directory: bool,
    ) -> Result<(), KernelError> {
        let data_sectors = sectors_needed(length);
        let needed = data_sectors + indirection_overhead(data_sectors);
        let mut free_map = self.free_map.lock();
        if !free_map.can_allocate(needed) {
            return Err(KernelError::NoSpace);
        }
        let mut disk_inode = DiskInode::zeroed();
        extend(&mut disk_inode, data_sectors, 0, self.disk.as_ref(), &mut free_map)?;
        disk_inode.length = length as u32;
        disk_inode.magic = INODE_MAGIC;
        disk_inode.parent = parent;
        disk_inode.is_directory = is_directory as u32;
        self.disk
            .write(sector, &disk_inode.to_sector_bytes())?;
        Ok(())
    }

    /// Opens (or returns the already-open, shared handle for) the inode at
    /// `sector`.
    pub fn open(&self, sector: Sector) -> Result<Arc<Inode>, KernelError> {
        let mut open = self.open.lock();
        if let Some(inode) = open.get(&sector.into_usize()) {
            inode.open_count.fetch_add(1, Ordering::SeqCst);
            return Ok(Arc::clone(inode));
        }
        let mut buf = [0u8; SECTOR_SIZE];
        self.disk.read(sector, &mut buf)?;
        let disk_inode = DiskInode::from_sector_bytes(&buf);
        if disk_inode.magic != INODE_MAGIC {
            keos::warning!("inode magic mismatch at sector {}", sector.into_usize());
            return Err(KernelError::FilesystemCorrupted("inode magic mismatch"));
        }
        let is_dir = disk_inode.is_directory != 0;
        let inode = Arc::new(Inode {
            sector,
            open_count: AtomicUsize::new(1),
            removed: AtomicBool::new(false),
            deny_write_count: AtomicUsize::new(0),
            disk: RwLock::new(disk_inode),
            content_lock: SpinLock::new(()),
            dir_lock: if is_dir { Some(SpinLock::new(())) } else { None },
        });
        open.insert(sector.into_usize(), Arc::clone(&inode));
        Ok(inode)
    }

    /// Increments the handle's open count and returns a clone of it.
    pub fn reopen(&self, inode: &Arc<Inode>) -> Arc<Inode> {
        inode.open_count.fetch_add(1, Ordering::SeqCst);
        Arc::clone(inode)
    }

    /// Marks `inode` for removal. Data is not freed until the last close.
    pub fn remove(&self, inode: &Inode) {
        inode.removed.store(true, Ordering::SeqCst);
    }

    /// Decrements the open count. At zero, drops the inode from the open set
    /// and, if it was removed, frees its sectors.
    pub fn close(&self, inode: Arc<Inode>) -> Result<(), KernelError> {
        let remaining = inode.open_count.fetch_sub(1, Ordering::SeqCst) - 1;
        if remaining > 0 {
            return Ok(());
        }
        let mut open = self.open.lock();
        open.remove(&inode.sector.into_usize());
        drop(open);
        if inode.is_removed() {
            let disk_inode = *inode.disk.read();
            let mut free_map = self.free_map.lock();
            release_data(&disk_inode, self.disk.as_ref(), &mut free_map)?;
            free_map.release(inode.sector, 1);
        }
        Ok(())
    }

    /// Resolves the disk sector holding byte `offset` of `inode`, clipped to
    /// its current length.
    fn byte_to_sector(&self, inode: &Inode, offset: usize) -> Result<Option<Sector>, KernelError> {
        let disk_inode = *inode.disk.read();
        byte_to_sector_in(&disk_inode, offset, disk_inode.length as usize, self.disk.as_ref())
    }

    /// Reads up to `size` bytes at `offset`, clipped to EOF.
    pub fn read_at(&self, inode: &Inode, buf: &mut [u8], offset: usize) -> Result<usize, KernelError> {
        let length = inode.length();
        if offset >= length {
            return Ok(0);
        }
        let max_read = buf.len().min(length - offset);
        let mut read = 0;
        while read < max_read {
            let pos = offset + read;
            let sector_offset = pos % SECTOR_SIZE;
            let chunk = (SECTOR_SIZE - sector_offset).min(max_read - read);
            match self.byte_to_sector(inode, pos)? {
                Some(sector) => {
                    if sector_offset == 0 && chunk == SECTOR_SIZE {
                        let dst: &mut [u8; SECTOR_SIZE] =
                            (&mut buf[read..read + SECTOR_SIZE]).try_into().unwrap();
                        self.disk.read(sector, dst)?;
                    } else {
                        let mut bounce = [0u8; SECTOR_SIZE];
                        self.disk.read(sector, &mut bounce)?;
                        buf[read..read + chunk]
                            .copy_from_slice(&bounce[sector_offset..sector_offset + chunk]);
                    }
                }
                None => {
                    for b in &mut buf[read..read + chunk] {
                        *b = 0;
                    }
                }
            }
            read += chunk;
        }
        Ok(read)
    }

    /// Writes `buf` at `offset`, growing the file first if needed.
    ///
    /// New length is only published after every new sector is allocated and
    /// written, so a concurrent reader can never observe a partially
    /// extended indirection tree (§4.1, §5 ordering guarantees).
    pub fn write_at(&self, inode: &Inode, buf: &[u8], offset: usize) -> Result<usize, KernelError> {
        if inode.write_denied() {
            return Ok(0);
        }
        if buf.is_empty() {
            return Ok(0);
        }
        let new_end = offset + buf.len();
        if new_end > MAX_DATA_SECTORS * SECTOR_SIZE {
            return Err(KernelError::NoSpace);
        }

        let _content_guard = inode.content_lock.lock();

        let old_length = inode.length();
        if new_end > old_length {
            let old_sectors = sectors_needed(old_length);
            let new_sectors = sectors_needed(new_end);
            if new_sectors > old_sectors {
                let mut free_map = self.free_map.lock();
                if !free_map.can_allocate(
                    (new_sectors - old_sectors)
                        + indirection_overhead(new_sectors)
                        - indirection_overhead(old_sectors),
                ) {
                    return Err(KernelError::NoSpace);
                }
                let mut disk_inode = *inode.disk.read();
                extend(&mut disk_inode, new_sectors, old_sectors, self.disk.as_ref(), &mut free_map)?;
                // Publish the new indirection pointers but not yet the
                // length: concurrent readers still see `old_length` and
                // therefore never address into not-yet-populated entries.
                *inode.disk.write() = disk_inode;
            }
        }

        let mut written = 0;
        while written < buf.len() {
            let pos = offset + written;
            let sector_offset = pos % SECTOR_SIZE;
            let chunk = (SECTOR_SIZE - sector_offset).min(buf.len() - written);
            let sector = self
                .byte_to_sector_allow_new(inode, pos, new_end)?
                .expect("sector must be allocated after extend");
            if sector_offset == 0 && chunk == SECTOR_SIZE {
                let src: &[u8; SECTOR_SIZE] = (&buf[written..written + SECTOR_SIZE]).try_into().unwrap();
                self.disk.write(sector, src)?;
            } else {
                let mut bounce = [0u8; SECTOR_SIZE];
                if pos - sector_offset < old_length {
                    self.disk.read(sector, &mut bounce)?;
                }
                bounce[sector_offset..sector_offset + chunk]
                    .copy_from_slice(&buf[written..written + chunk]);
                self.disk.write(sector, &bounce)?;
            }
            written += chunk;
        }

        if new_end > old_length {
            let mut disk_inode = *inode.disk.read();
            disk_inode.length = new_end as u32;
            *inode.disk.write() = disk_inode;
            self.disk.write(inode.sector, &disk_inode.to_sector_bytes())?;
        }

        Ok(written)
    }

    /// Like `byte_to_sector`, but clips against `published_length` instead of
    /// the not-yet-published on-disk length (used only by `write_at` right
    /// after `extend`, before the new length is visible to readers).
    fn byte_to_sector_allow_new(
        &self,
        inode: &Inode,
        offset: usize,
        published_length: usize,
    ) -> Result<Option<Sector>, KernelError> {
        let disk_inode = *inode.disk.read();
        byte_to_sector_in(&disk_inode, offset, published_length, self.disk.as_ref())
    }
}

fn byte_to_sector_in(
    disk_inode: &DiskInode,
    offset: usize,
    length: usize,
    disk: &dyn Disk,
) -> Result<Option<Sector>, KernelError> {
    if offset >= length {
        return Ok(None);
    }
    let si = offset / SECTOR_SIZE;
    if si < DIRECT_BLOCKS {
        let b = disk_inode.blocks[si];
        return Ok((b != 0).then_some(Sector(b as usize)));
    }
    if si < DIRECT_BLOCKS + PTRS_PER_SECTOR {
        let ind = disk_inode.blocks[INDIRECT_BLOCK_IDX];
        if ind == 0 {
            return Ok(None);
        }
        let mut buf = [0u8; SECTOR_SIZE];
        disk.read(Sector(ind as usize), &mut buf)?;
        let ptrs = indirect_block_from_bytes(&buf);
        let b = ptrs[si - DIRECT_BLOCKS];
        return Ok((b != 0).then_some(Sector(b as usize)));
    }
    let di = disk_inode.blocks[DOUBLE_INDIRECT_BLOCK_IDX];
    if di == 0 {
        return Ok(None);
    }
    let mut buf = [0u8; SECTOR_SIZE];
    disk.read(Sector(di as usize), &mut buf)?;
    let di_ptrs = indirect_block_from_bytes(&buf);
    let rest = si - (DIRECT_BLOCKS + PTRS_PER_SECTOR);
    let fl_idx = rest / PTRS_PER_SECTOR;
    let sl_idx = rest % PTRS_PER_SECTOR;
    let fl = di_ptrs[fl_idx];
    if fl == 0 {
        return Ok(None);
    }
    let mut buf2 = [0u8; SECTOR_SIZE];
    disk.read(Sector(fl as usize), &mut buf2)?;
    let fl_ptrs = indirect_block_from_bytes(&buf2);
    let b = fl_ptrs[sl_idx];
    Ok((b != 0).then_some(Sector(b as usize)))
}

/// Allocates and zero-fills data sectors `starting_sector..target_sectors`,
/// growing the single- and double-indirect blocks as needed (§4.1 `extend`).
/// `starting_sector == 0` signals a fresh create.
fn extend(
    disk_inode: &mut DiskInode,
    target_sectors: usize,
    starting_sector: usize,
    disk: &dyn Disk,
    free_map: &mut FreeMap,
) -> Result<(), KernelError> {
    if starting_sector >= target_sectors {
        return Ok(());
    }
    if target_sectors > MAX_DATA_SECTORS {
        return Err(KernelError::NoSpace);
    }
    let zero = [0u8; SECTOR_SIZE];

    let mut indirect: Option<[u32; PTRS_PER_SECTOR]> = None;
    let mut indirect_dirty = false;
    let mut diblock: Option<[u32; PTRS_PER_SECTOR]> = None;
    let mut diblock_dirty = false;
    let mut first_level: Option<(usize, [u32; PTRS_PER_SECTOR])> = None;
    let mut first_level_dirty = false;

    for si in starting_sector..target_sectors {
        let sector = free_map.allocate(1).ok_or(KernelError::NoSpace)?;
        disk.write(sector, &zero)?;

        if si < DIRECT_BLOCKS {
            disk_inode.blocks[si] = sector.into_usize() as u32;
            continue;
        }

        if si < DIRECT_BLOCKS + PTRS_PER_SECTOR {
            if indirect.is_none() {
                if disk_inode.blocks[INDIRECT_BLOCK_IDX] == 0 {
                    let ind_sector = free_map.allocate(1).ok_or(KernelError::NoSpace)?;
                    disk.write(ind_sector, &zero)?;
                    disk_inode.blocks[INDIRECT_BLOCK_IDX] = ind_sector.into_usize() as u32;
                    indirect = Some([0u32; PTRS_PER_SECTOR]);
                } else {
                    let mut buf = [0u8; SECTOR_SIZE];
                    disk.read(Sector(disk_inode.blocks[INDIRECT_BLOCK_IDX] as usize), &mut buf)?;
                    indirect = Some(indirect_block_from_bytes(&buf));
                }
            }
            let idx = si - DIRECT_BLOCKS;
            indirect.as_mut().unwrap()[idx] = sector.into_usize() as u32;
            indirect_dirty = true;
            continue;
        }

        if diblock.is_none() {
            if disk_inode.blocks[DOUBLE_INDIRECT_BLOCK_IDX] == 0 {
                let di_sector = free_map.allocate(1).ok_or(KernelError::NoSpace)?;
                disk.write(di_sector, &zero)?;
                disk_inode.blocks[DOUBLE_INDIRECT_BLOCK_IDX] = di_sector.into_usize() as u32;
                diblock = Some([0u32; PTRS_PER_SECTOR]);
            } else {
                let mut buf = [0u8; SECTOR_SIZE];
                disk.read(Sector(disk_inode.blocks[DOUBLE_INDIRECT_BLOCK_IDX] as usize), &mut buf)?;
                diblock = Some(indirect_block_from_bytes(&buf));
            }
        }

        let rest = si - (DIRECT_BLOCKS + PTRS_PER_SECTOR);
        let fl_idx = rest / PTRS_PER_SECTOR;
        let sl_idx = rest % PTRS_PER_SECTOR;

        if first_level.as_ref().map(|(i, _)| *i) != Some(fl_idx) {
            if let Some((prev_idx, data)) = first_level.take() {
                if first_level_dirty {
                    let prev_sector = diblock.as_ref().unwrap()[prev_idx];
                    disk.write(Sector(prev_sector as usize), &indirect_block_to_bytes(&data))?;
                }
            }
            let db = diblock.as_mut().unwrap();
            if db[fl_idx] == 0 {
                let fl_sector = free_map.allocate(1).ok_or(KernelError::NoSpace)?;
                disk.write(fl_sector, &zero)?;
                db[fl_idx] = fl_sector.into_usize() as u32;
                diblock_dirty = true;
                first_level = Some((fl_idx, [0u32; PTRS_PER_SECTOR]));
            } else {
                let mut buf = [0u8; SECTOR_SIZE];
                disk.read(Sector(db[fl_idx] as usize), &mut buf)?;
                first_level = Some((fl_idx, indirect_block_from_bytes(&buf)));
            }
        }
        first_level.as_mut().unwrap().1[sl_idx] = sector.into_usize() as u32;
        first_level_dirty = true;
    }

    if let Some((idx, data)) = first_level.take() {
        if first_level_dirty {
            let sector = diblock.as_ref().unwrap()[idx];
            disk.write(Sector(sector as usize), &indirect_block_to_bytes(&data))?;
        }
    }
    if let Some(data) = diblock {
        if diblock_dirty {
            disk.write(
                Sector(disk_inode.blocks[DOUBLE_INDIRECT_BLOCK_IDX] as usize),
                &indirect_block_to_bytes(&data),
            )?;
        }
    }
    if let Some(data) = indirect {
        if indirect_dirty {
            disk.write(
                Sector(disk_inode.blocks[INDIRECT_BLOCK_IDX] as usize),
                &indirect_block_to_bytes(&data),
            )?;
        }
    }
    Ok(())
}

/// Frees every data and indirection sector reachable from `disk_inode`
/// (direct, then the single-indirect's targets and itself, then each
/// double-indirect first-level sector's targets, itself, and the second-level
/// sector), per §4.1's close-time release order.
fn release_data(disk_inode: &DiskInode, disk: &dyn Disk, free_map: &mut FreeMap) -> Result<(), KernelError> {
    for &b in &disk_inode.blocks[..DIRECT_BLOCKS] {
        if b != 0 {
            free_map.release(Sector(b as usize), 1);
        }
    }
    let ind = disk_inode.blocks[INDIRECT_BLOCK_IDX];
    if ind != 0 {
        let mut buf = [0u8; SECTOR_SIZE];
        disk.read(Sector(ind as usize), &mut buf)?;
        let ptrs = indirect_block_from_bytes(&buf);
        let mut freed = 0;
        for &p in &ptrs {
            if p != 0 {
                free_map.release(Sector(p as usize), 1);
                freed += 1;
            }
        }
        let _ = freed; // actual count freed, not an assumed 128 (§9 Open Question)
        free_map.release(Sector(ind as usize), 1);
    }
    let di = disk_inode.blocks[DOUBLE_INDIRECT_BLOCK_IDX];
    if di != 0 {
        let mut buf = [0u8; SECTOR_SIZE];
        disk.read(Sector(di as usize), &mut buf)?;
        let di_ptrs = indirect_block_from_bytes(&buf);
        for &fl in &di_ptrs {
            if fl == 0 {
                continue;
            }
            let mut buf2 = [0u8; SECTOR_SIZE];
            disk.read(Sector(fl as usize), &mut buf2)?;
            let fl_ptrs = indirect_block_from_bytes(&buf2);
            for &p in &fl_ptrs {
                if p != 0 {
                    free_map.release(Sector(p as usize), 1);
                }
            }
            free_map.release(Sector(fl as usize), 1);
        }
        free_map.release(Sector(di as usize), 1);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use keos::block::{DiskRole, MemDisk};

    fn store(sectors: usize) -> (InodeStore, Arc<SpinLock<FreeMap>>) {
        let disk: Arc<dyn Disk> = Arc::new(MemDisk::new(DiskRole::Filesystem, sectors));
        let free_map = Arc::new(SpinLock::new(FreeMap::format(disk.as_ref())));
        (InodeStore::new(disk, Arc::clone(&free_map)), free_map)
    }

    #[test]
    fn create_then_open_reports_requested_length() {
        let (store, _fm) = store(64);
        store.create(Sector(10), 0, 0, false).unwrap();
        let inode = store.open(Sector(10)).unwrap();
        assert_eq!(inode.length(), 0);
        assert_eq!(inode.open_count(), 1);
    }

    #[test]
    fn write_then_read_round_trips() {
        let (store, _fm) = store(64);
        store.create(Sector(10), 0, 0, false).unwrap();
        let inode = store.open(Sector(10)).unwrap();
        let w = store.write_at(&inode, b"hello", 0).unwrap();
        assert_eq!(w, 5);
        assert_eq!(inode.length(), 5);
        let mut buf = [0u8; 5];
        let r = store.read_at(&inode, &mut buf, 0).unwrap();
        assert_eq!(r, 5);
        assert_eq!(&buf, b"hello");
    }

    #[test]
    fn grows_across_indirection_boundaries() {
        // 10 direct + 128 indirect + 128*128 double-indirect sectors available.
        let total_sectors = MAX_DATA_SECTORS + 64;
        let (store, _fm) = store(total_sectors);
        store.create(Sector(10), 0, 0, false).unwrap();
        let inode = store.open(Sector(10)).unwrap();

        let len = 5120 + 65536 + 1; // 70,657 bytes: crosses both boundaries
        let pattern: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
        let w = store.write_at(&inode, &pattern, 0).unwrap();
        assert_eq!(w, len);
        assert_eq!(inode.length(), len);

        for &offset in &[0usize, 5119, 5120, 70656] {
            let mut buf = [0u8; 1];
            store.read_at(&inode, &mut buf, offset).unwrap();
            assert_eq!(buf[0], pattern[offset]);
        }
    }

    #[test]
    fn remove_frees_sectors_only_after_last_close() {
        let (store, free_map) = store(64);
        let sector = free_map.lock().allocate(1).unwrap();
        store.create(sector, 1024, 0, false).unwrap();
        let before = free_map.lock().count();
        let inode = store.open(sector).unwrap();
        let inode2 = store.reopen(&inode);
        store.remove(&inode);
        store.close(inode).unwrap();
        // still open via inode2: nothing freed yet
        assert_eq!(free_map.lock().count(), before);
        store.close(inode2).unwrap();
        assert!(free_map.lock().count() > before);
    }

    #[test]
    fn deny_write_blocks_writes_and_returns_zero() {
        let (store, _fm) = store(64);
        store.create(Sector(10), 0, 0, false).unwrap();
        let inode = store.open(Sector(10)).unwrap();
        inode.deny_write();
        let w = store.write_at(&inode, b"nope", 0).unwrap();
        assert_eq!(w, 0);
        inode.allow_write();
        let w = store.write_at(&inode, b"ok", 0).unwrap();
        assert_eq!(w, 2);
    }

    #[test]
    fn out_of_space_create_fails_atomically() {
        let (store, free_map) = store(8); // too small for a 20-sector file
        let before = free_map.lock().count();
        let result = store.create(Sector(3), 20 * SECTOR_SIZE, 0, false);
        assert_eq!(result, Err(KernelError::NoSpace));
        assert_eq!(free_map.lock().count(), before);
    }
}
