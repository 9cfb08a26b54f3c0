//! # keos-fs: the indexed, crash-naive filesystem core
//!
//! A from-scratch rebuild of the Pintos-derived filesystem project down to
//! its essentials: a fixed free-sector bitmap, direct/single-indirect/
//! double-indirect inodes, and directories stored as plain inodes holding an
//! array of fixed-width entries. No journal, no block groups.

mod directory;
mod file;
mod free_map;
mod inode;
mod layout;
mod path;

pub use directory::Directory;
pub use file::{File, FileHandle, FileHandleTable, OpenFile};
pub use inode::Inode;
pub use layout::NAME_MAX;

use std::sync::Arc;

use keos::{
    block::{Disk, Sector},
    error::KernelError,
    sync::SpinLock,
};

use free_map::FreeMap;
use inode::InodeStore;
use layout::ROOT_DIR_SECTOR;

/// The mounted filesystem: owns the free-sector map and the inode store, and
/// exposes the syscall-surface-adjacent operations a process would invoke
/// (§4 "File-system API" / §6 external interfaces).
pub struct FileSystem {
    disk: Arc<dyn Disk>,
    free_map: Arc<SpinLock<FreeMap>>,
    inodes: Arc<InodeStore>,
}

impl FileSystem {
    /// Lays down a fresh, empty filesystem on `disk`: formats the free map,
    /// then creates the (initially empty) root directory.
    pub fn format(disk: Arc<dyn Disk>) -> Result<Self, KernelError> {
        let free_map = FreeMap::format(disk.as_ref());
        let free_map = Arc::new(SpinLock::new(free_map));
        let inodes = Arc::new(InodeStore::new(Arc::clone(&disk), Arc::clone(&free_map)));
        Directory::create_root(&inodes, Sector(ROOT_DIR_SECTOR))?;
        free_map.lock().persist(disk.as_ref())?;
        keos::info!("formatted filesystem, {} sectors free", free_map.lock().count());
        Ok(Self {
            disk,
            free_map,
            inodes,
        })
    }

    /// Mounts a previously formatted filesystem from `disk`.
    pub fn mount(disk: Arc<dyn Disk>) -> Result<Self, KernelError> {
        let free_map = match FreeMap::load(disk.as_ref()) {
            Ok(free_map) => free_map,
            Err(e) => {
                keos::warning!("mount failed: {e}");
                return Err(e);
            }
        };
        let free_map = Arc::new(SpinLock::new(free_map));
        let inodes = Arc::new(InodeStore::new(Arc::clone(&disk), Arc::clone(&free_map)));
        keos::info!("mounted filesystem, {} sectors free", free_map.lock().count());
        Ok(Self {
            disk,
            free_map,
            inodes,
        })
    }

    /// Persists the free map, releasing this handle's hold on the disk
    /// (§4's init/done pairing — the counterpart to `format`/`mount`).
    pub fn unmount(self) -> Result<(), KernelError> {
        keos::info!("unmounting filesystem");
        self.free_map.lock().persist(self.disk.as_ref())
    }

    /// Opens the root directory.
    pub fn root(&self) -> Result<Directory, KernelError> {
        Directory::open_root(&self.inodes)
    }

    /// Resolves `path` relative to `cwd`, returning the parent directory and
    /// the owned final path component (§4.3 path resolution).
    fn resolve(&self, cwd: &Directory, path: &str) -> Result<(Directory, String), KernelError> {
        path::resolve(&self.inodes, cwd, path)
    }

    /// Creates a regular file of `initial_size` bytes at `path`.
    pub fn create(&self, cwd: &Directory, path: &str, initial_size: usize) -> Result<(), KernelError> {
        let (parent, name) = self.resolve(cwd, path)?;
        let result = self.create_in(&parent, &name, initial_size);
        parent.close()?;
        result
    }

    fn create_in(&self, parent: &Directory, name: &str, initial_size: usize) -> Result<(), KernelError> {
        if name.is_empty() || name == "." || name == ".." {
            return Err(KernelError::InvalidArgument);
        }
        if name.len() > NAME_MAX {
            return Err(KernelError::NameTooLong);
        }
        let mut free_map = self.free_map.lock();
        let sector = free_map.allocate(1).ok_or(KernelError::NoSpace)?;
        drop(free_map);
        match self.inodes.create(sector, initial_size, parent.inode_sector(), false) {
            Ok(()) => {}
            Err(e) => {
                self.free_map.lock().release(sector, 1);
                return Err(e);
            }
        }
        if let Err(e) = parent.add(name, sector) {
            // Roll the inode back out: nothing else can have opened it yet.
            let inode = self.inodes.open(sector)?;
            self.inodes.remove(&inode);
            self.inodes.close(inode)?;
            return Err(e);
        }
        Ok(())
    }

    /// Creates a directory at `path`, stocked with `.` and `..`.
    pub fn mkdir(&self, cwd: &Directory, path: &str) -> Result<(), KernelError> {
        let (parent, name) = self.resolve(cwd, path)?;
        let result = self.mkdir_in(&parent, &name);
        parent.close()?;
        result
    }

    fn mkdir_in(&self, parent: &Directory, name: &str) -> Result<(), KernelError> {
        if name.is_empty() || name == "." || name == ".." {
            return Err(KernelError::InvalidArgument);
        }
        if name.len() > NAME_MAX {
            return Err(KernelError::NameTooLong);
        }
        let mut free_map = self.free_map.lock();
        let sector = free_map.allocate(1).ok_or(KernelError::NoSpace)?;
        drop(free_map);
        if let Err(e) = Directory::create(&self.inodes, sector, parent.inode_sector()) {
            self.free_map.lock().release(sector, 1);
            return Err(e);
        }
        if let Err(e) = parent.add(name, sector) {
            let inode = self.inodes.open(sector)?;
            self.inodes.remove(&inode);
            self.inodes.close(inode)?;
            return Err(e);
        }
        Ok(())
    }

    /// Opens the file or directory at `path`.
    pub fn open(&self, cwd: &Directory, path: &str) -> Result<OpenFile, KernelError> {
        let (parent, name) = self.resolve(cwd, path)?;
        if name.is_empty() {
            // `parent` itself is what was asked for: ownership passes to the
            // caller instead of being closed here.
            return Ok(OpenFile::Directory(parent));
        }
        let result = self.open_in(&parent, &name);
        parent.close()?;
        result
    }

    fn open_in(&self, parent: &Directory, name: &str) -> Result<OpenFile, KernelError> {
        let sector = parent.lookup(name)?;
        let inode = self.inodes.open(sector)?;
        if inode.dir_lock.is_some() {
            Ok(OpenFile::Directory(Directory::from_inode(Arc::clone(&self.inodes), inode)?))
        } else {
            Ok(OpenFile::File(file::File::new(Arc::clone(&self.inodes), inode)))
        }
    }

    /// Unlinks `path`: the directory entry is removed immediately, but the
    /// inode's sectors are only released once every open handle closes
    /// (§4.1/§4.2 removal semantics).
    pub fn remove(&self, cwd: &Directory, path: &str) -> Result<(), KernelError> {
        let (parent, name) = self.resolve(cwd, path)?;
        let result = if name.is_empty() || name == "." || name == ".." {
            Err(KernelError::InvalidArgument)
        } else {
            parent.remove(&self.inodes, &name)
        };
        parent.close()?;
        result
    }
}
