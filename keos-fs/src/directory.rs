//! Directories: a fixed-width entry array backed by a regular inode (§4.2).
//!
//! Every directory — including the root — physically stores `.` and `..`
//! entries alongside its real children, so `lookup`, `add`, and `remove` are
//! the only code that ever needs to understand directory structure; path
//! resolution (`path.rs`) just calls `lookup` for every component, `.` and
//! `..` included.

use std::sync::Arc;

use keos::{block::Sector, error::KernelError, sync::SpinLock};

use crate::inode::{Inode, InodeStore};
use crate::layout::{DirEntry, DIR_ENTRY_SIZE};

/// A handle to an open directory.
pub struct Directory {
    inodes: Arc<InodeStore>,
    inode: Arc<Inode>,
    /// Cursor used by `readdir` (§4.5 "readdir cursor").
    pos: SpinLock<usize>,
}

impl Directory {
    /// Wraps an already-open directory inode; fails (without closing it,
    /// leaving that to the caller) if it isn't actually a directory.
    pub(crate) fn from_inode(inodes: Arc<InodeStore>, inode: Arc<Inode>) -> Result<Self, KernelError> {
        Self::wrap(inodes, inode)
    }

    fn wrap(inodes: Arc<InodeStore>, inode: Arc<Inode>) -> Result<Self, KernelError> {
        if inode.dir_lock.is_none() {
            return Err(KernelError::NotDirectory);
        }
        Ok(Self {
            inodes,
            inode,
            pos: SpinLock::new(0),
        })
    }

    /// Formats a brand-new root directory at `sector`, self-parented, with
    /// its own `.`/`..` entries pointing at itself (§3 "root directory fixed
    /// initial entry count").
    pub fn create_root(inodes: &Arc<InodeStore>, sector: Sector) -> Result<(), KernelError> {
        let parent = sector.into_usize() as u32;
        inodes.create(sector, 0, parent, true)?;
        let inode = inodes.open(sector)?;
        let dir = Self::wrap(Arc::clone(inodes), inode)?;
        dir.add(".", sector)?;
        dir.add("..", sector)?;
        dir.close()
    }

    /// Creates a new, empty subdirectory at `sector`, parented at
    /// `parent_sector`, stocked with `.` and `..`.
    pub fn create(inodes: &Arc<InodeStore>, sector: Sector, parent_sector: u32) -> Result<(), KernelError> {
        inodes.create(sector, 0, parent_sector, true)?;
        let inode = inodes.open(sector)?;
        let dir = Self::wrap(Arc::clone(inodes), inode)?;
        dir.add(".", sector)?;
        dir.add("..", Sector(parent_sector as usize))?;
        dir.close()
    }

    /// Opens the filesystem's root directory.
    pub fn open_root(inodes: &Arc<InodeStore>) -> Result<Self, KernelError> {
        Self::from_sector(inodes, Sector(crate::layout::ROOT_DIR_SECTOR))
    }

    /// Opens the directory at `sector`.
    pub fn from_sector(inodes: &Arc<InodeStore>, sector: Sector) -> Result<Self, KernelError> {
        let inode = inodes.open(sector)?;
        Self::wrap(Arc::clone(inodes), inode)
    }

    /// A second, independent handle onto the same directory.
    pub fn reopen(&self) -> Self {
        Self {
            inodes: Arc::clone(&self.inodes),
            inode: self.inodes.reopen(&self.inode),
            pos: SpinLock::new(0),
        }
    }

    /// Closes this handle.
    pub fn close(self) -> Result<(), KernelError> {
        self.inodes.close(self.inode)
    }

    /// The sector of this directory's own inode.
    pub fn inode_sector(&self) -> u32 {
        self.inode.sector().into_usize() as u32
    }

    fn entry_count(&self) -> usize {
        self.inode.length() / DIR_ENTRY_SIZE
    }

    fn read_entry(&self, idx: usize) -> Result<DirEntry, KernelError> {
        let mut buf = [0u8; DIR_ENTRY_SIZE];
        self.inodes.read_at(&self.inode, &mut buf, idx * DIR_ENTRY_SIZE)?;
        Ok(DirEntry::from_bytes(&buf))
    }

    fn write_entry(&self, idx: usize, entry: &DirEntry) -> Result<(), KernelError> {
        self.inodes
            .write_at(&self.inode, &entry.to_bytes(), idx * DIR_ENTRY_SIZE)?;
        Ok(())
    }

    /// Finds `name` among this directory's entries, `.`/`..` included.
    pub fn lookup(&self, name: &str) -> Result<Sector, KernelError> {
        for idx in 0..self.entry_count() {
            let entry = self.read_entry(idx)?;
            if entry.in_use && entry.name == name {
                return Ok(Sector(entry.inode_sector as usize));
            }
        }
        Err(KernelError::NoSuchEntry)
    }

    /// Adds a `name -> sector` entry, reusing a freed slot if one exists.
    pub fn add(&self, name: &str, sector: Sector) -> Result<(), KernelError> {
        let _guard = self
            .inode
            .dir_lock
            .as_ref()
            .expect("add called on a non-directory inode")
            .lock();
        let count = self.entry_count();
        let mut free_idx = None;
        for idx in 0..count {
            let entry = self.read_entry(idx)?;
            if entry.in_use && entry.name == name {
                return Err(KernelError::FileExist);
            }
            if !entry.in_use && free_idx.is_none() {
                free_idx = Some(idx);
            }
        }
        let entry = DirEntry {
            inode_sector: sector.into_usize() as u32,
            name: name.to_string(),
            in_use: true,
        };
        self.write_entry(free_idx.unwrap_or(count), &entry)
    }

    /// The real (non-`.`/`..`) name of the entry pointing at `sector`, if any.
    fn name_of(&self, sector: Sector) -> Result<String, KernelError> {
        for idx in 0..self.entry_count() {
            let entry = self.read_entry(idx)?;
            if entry.in_use
                && entry.inode_sector as usize == sector.into_usize()
                && entry.name != "."
                && entry.name != ".."
            {
                return Ok(entry.name);
            }
        }
        Err(KernelError::NoSuchEntry)
    }

    /// Removes `name` from this directory. `name == "."` removes this
    /// directory itself from *its* parent (self-removal, e.g. `rmdir(cwd)`);
    /// `".."` is never a valid removal target.
    pub fn remove(&self, inodes: &InodeStore, name: &str) -> Result<(), KernelError> {
        if name == ".." {
            return Err(KernelError::InvalidArgument);
        }
        if name == "." {
            let parent_sector = Sector(self.inode.parent() as usize);
            if parent_sector == self.inode.sector() {
                return Err(KernelError::InvalidArgument); // root has no parent to remove from
            }
            let parent = Directory::from_sector(&self.inodes, parent_sector)?;
            let result = parent
                .name_of(self.inode.sector())
                .and_then(|my_name| parent.remove(inodes, &my_name));
            parent.close()?;
            return result;
        }

        let _guard = self
            .inode
            .dir_lock
            .as_ref()
            .expect("remove called on a non-directory inode")
            .lock();
        let count = self.entry_count();
        let mut found = None;
        for idx in 0..count {
            let entry = self.read_entry(idx)?;
            if entry.in_use && entry.name == name {
                found = Some((idx, entry));
                break;
            }
        }
        let (idx, entry) = found.ok_or(KernelError::NoSuchEntry)?;
        let sector = Sector(entry.inode_sector as usize);
        let target = inodes.open(sector)?;
        if target.dir_lock.is_some() {
            if !is_empty_of_children(inodes, &target)? {
                inodes.close(target)?;
                return Err(KernelError::DirectoryNotEmpty);
            }
            // The open we just took above is itself counted; anything more
            // than that means another handle (e.g. some process's cwd) is
            // still live.
            if target.open_count() > 1 {
                inodes.close(target)?;
                return Err(KernelError::Busy);
            }
        }
        self.write_entry(idx, &DirEntry::free())?;
        inodes.remove(&target);
        inodes.close(target)
    }

    /// Returns the next child name (skipping `.`/`..`), or `None` at EOF.
    pub fn readdir(&self) -> Result<Option<String>, KernelError> {
        let mut pos = self.pos.lock();
        let count = self.entry_count();
        while *pos < count {
            let idx = *pos;
            *pos += 1;
            let entry = self.read_entry(idx)?;
            if entry.in_use && entry.name != "." && entry.name != ".." {
                return Ok(Some(entry.name));
            }
        }
        Ok(None)
    }

    /// Resets the `readdir` cursor.
    pub fn seek(&self, pos: usize) {
        *self.pos.lock() = pos;
    }

    /// Current `readdir` cursor.
    pub fn tell(&self) -> usize {
        *self.pos.lock()
    }
}

/// Whether `inode` (assumed a directory) holds nothing but `.`/`..`.
fn is_empty_of_children(inodes: &InodeStore, inode: &Arc<Inode>) -> Result<bool, KernelError> {
    let count = inode.length() / DIR_ENTRY_SIZE;
    let mut buf = [0u8; DIR_ENTRY_SIZE];
    for idx in 0..count {
        inodes.read_at(inode, &mut buf, idx * DIR_ENTRY_SIZE)?;
        let entry = DirEntry::from_bytes(&buf);
        if entry.in_use && entry.name != "." && entry.name != ".." {
            return Ok(false);
        }
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use keos::block::{Disk, DiskRole, MemDisk};
    use crate::free_map::FreeMap;
    use std::sync::Arc;

    fn fixture(sectors: usize) -> (Arc<InodeStore>, Arc<SpinLock<FreeMap>>) {
        let disk: Arc<dyn Disk> = Arc::new(MemDisk::new(DiskRole::Filesystem, sectors));
        let free_map = Arc::new(SpinLock::new(FreeMap::format(disk.as_ref())));
        (
            Arc::new(InodeStore::new(disk, Arc::clone(&free_map))),
            free_map,
        )
    }

    #[test]
    fn root_starts_with_dot_and_dotdot_only() {
        let (inodes, _fm) = fixture(32);
        Directory::create_root(&inodes, Sector(2)).unwrap();
        let root = Directory::open_root(&inodes).unwrap();
        assert_eq!(root.lookup(".").unwrap(), Sector(2));
        assert_eq!(root.lookup("..").unwrap(), Sector(2));
        assert!(root.readdir().unwrap().is_none());
        root.close().unwrap();
    }

    #[test]
    fn add_then_lookup_then_remove() {
        let (inodes, fm) = fixture(32);
        Directory::create_root(&inodes, Sector(2)).unwrap();
        let root = Directory::open_root(&inodes).unwrap();
        let child_sector = fm.lock().allocate(1).unwrap();
        inodes.create(child_sector, 0, 2, false).unwrap();
        root.add("child", child_sector).unwrap();
        assert_eq!(root.lookup("child").unwrap(), child_sector);
        assert_eq!(root.readdir().unwrap(), Some("child".to_string()));
        assert_eq!(root.readdir().unwrap(), None);

        root.remove(&inodes, "child").unwrap();
        assert_eq!(root.lookup("child"), Err(KernelError::NoSuchEntry));
        root.close().unwrap();
    }

    #[test]
    fn removing_non_empty_directory_fails() {
        let (inodes, fm) = fixture(32);
        Directory::create_root(&inodes, Sector(2)).unwrap();
        let root = Directory::open_root(&inodes).unwrap();
        let sub_sector = fm.lock().allocate(1).unwrap();
        Directory::create(&inodes, sub_sector, 2).unwrap();
        root.add("sub", sub_sector).unwrap();
        let grandchild_sector = fm.lock().allocate(1).unwrap();
        inodes.create(grandchild_sector, 0, sub_sector.into_usize() as u32, false).unwrap();
        let sub = Directory::from_sector(&inodes, sub_sector).unwrap();
        sub.add("leaf", grandchild_sector).unwrap();
        sub.close().unwrap();

        assert_eq!(root.remove(&inodes, "sub"), Err(KernelError::DirectoryNotEmpty));
        root.close().unwrap();
    }

    #[test]
    fn self_removal_via_dot_fails_while_still_open() {
        let (inodes, fm) = fixture(32);
        Directory::create_root(&inodes, Sector(2)).unwrap();
        let root = Directory::open_root(&inodes).unwrap();
        let sub_sector = fm.lock().allocate(1).unwrap();
        Directory::create(&inodes, sub_sector, 2).unwrap();
        root.add("sub", sub_sector).unwrap();

        // `sub` is itself the target of "."; since its own handle is still
        // live, removal must report Busy rather than succeed.
        let sub = Directory::from_sector(&inodes, sub_sector).unwrap();
        assert_eq!(sub.remove(&inodes, "."), Err(KernelError::Busy));
        assert_eq!(root.lookup("sub"), Ok(sub_sector));
        sub.close().unwrap();
        root.close().unwrap();
    }

    #[test]
    fn removing_directory_open_elsewhere_fails_busy() {
        let (inodes, fm) = fixture(32);
        Directory::create_root(&inodes, Sector(2)).unwrap();
        let root = Directory::open_root(&inodes).unwrap();
        let sub_sector = fm.lock().allocate(1).unwrap();
        Directory::create(&inodes, sub_sector, 2).unwrap();
        root.add("sub", sub_sector).unwrap();

        // Someone else (e.g. a process with "sub" as its cwd) holds it open.
        let sub = Directory::from_sector(&inodes, sub_sector).unwrap();
        assert_eq!(root.remove(&inodes, "sub"), Err(KernelError::Busy));
        assert_eq!(root.lookup("sub"), Ok(sub_sector));
        sub.close().unwrap();

        // Once the other handle closes, removal succeeds.
        root.remove(&inodes, "sub").unwrap();
        assert_eq!(root.lookup("sub"), Err(KernelError::NoSuchEntry));
        root.close().unwrap();
    }
}
