//! Open-file layer: a single open handle, and the per-process handle table
//! above it.
//!
//! Handles 0 and 1 are reserved (stdin/stdout, owned by whatever console
//! layer sits above this crate), new handles are carved out starting at 2,
//! and a closed handle's slot is reused by the *next* allocation (the table
//! "retreats" its free-search pointer instead of growing monotonically)
//! rather than being appended past the live high-water mark.

use std::sync::Arc;

use keos::error::KernelError;

use crate::directory::Directory;
use crate::inode::{Inode, InodeStore};

/// A single open regular file.
pub struct File {
    inodes: Arc<InodeStore>,
    inode: Arc<Inode>,
    pos: keos::sync::SpinLock<usize>,
}

impl File {
    pub(crate) fn new(inodes: Arc<InodeStore>, inode: Arc<Inode>) -> Self {
        Self {
            inodes,
            inode,
            pos: keos::sync::SpinLock::new(0),
        }
    }

    /// Reads at the current cursor, advancing it by the amount read.
    pub fn read(&self, buf: &mut [u8]) -> Result<usize, KernelError> {
        let mut pos = self.pos.lock();
        let n = self.inodes.read_at(&self.inode, buf, *pos)?;
        *pos += n;
        Ok(n)
    }

    /// Writes at the current cursor, advancing it (and growing the file) as
    /// needed.
    pub fn write(&self, buf: &[u8]) -> Result<usize, KernelError> {
        let mut pos = self.pos.lock();
        let n = self.inodes.write_at(&self.inode, buf, *pos)?;
        *pos += n;
        Ok(n)
    }

    /// Moves the read/write cursor to an absolute byte offset.
    pub fn seek(&self, pos: usize) {
        *self.pos.lock() = pos;
    }

    /// Current read/write cursor.
    pub fn tell(&self) -> usize {
        *self.pos.lock()
    }

    /// Current file length in bytes.
    pub fn length(&self) -> usize {
        self.inode.length()
    }

    /// Forbids writes to this file while a deny-write handle is live (used
    /// while an executable is running).
    pub fn deny_write(&self) {
        self.inode.deny_write();
    }

    /// Lifts a prior [`File::deny_write`].
    pub fn allow_write(&self) {
        self.inode.allow_write();
    }

    /// Closes this handle.
    pub fn close(self) -> Result<(), KernelError> {
        self.inodes.close(self.inode)
    }
}

/// Either a regular file or a directory, as returned by
/// [`crate::FileSystem::open`].
pub enum OpenFile {
    File(File),
    Directory(Directory),
}

impl OpenFile {
    fn as_file(&self) -> Result<&File, KernelError> {
        match self {
            OpenFile::File(f) => Ok(f),
            OpenFile::Directory(_) => Err(KernelError::IsDirectory),
        }
    }

    fn as_directory(&self) -> Result<&Directory, KernelError> {
        match self {
            OpenFile::Directory(d) => Ok(d),
            OpenFile::File(_) => Err(KernelError::NotDirectory),
        }
    }

    fn close(self) -> Result<(), KernelError> {
        match self {
            OpenFile::File(f) => f.close(),
            OpenFile::Directory(d) => d.close(),
        }
    }
}

/// An index into a [`FileHandleTable`]. Values 0 and 1 never refer to a
/// table entry; they are reserved for the console.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileHandle(usize);

const FIRST_HANDLE: usize = 2;

/// Size of a process's fixed-size handle array. Once every slot is in use,
/// `insert` fails rather than growing the table.
pub const MAX_HANDLES: usize = 128;

/// A process's open-file descriptor table.
pub struct FileHandleTable {
    entries: Vec<Option<OpenFile>>,
    /// Lowest index known to be free; search starts here.
    next_hint: usize,
}

impl Default for FileHandleTable {
    fn default() -> Self {
        Self::new()
    }
}

impl FileHandleTable {
    /// An empty table with slots 0 and 1 reserved.
    pub fn new() -> Self {
        Self {
            entries: vec![None, None],
            next_hint: FIRST_HANDLE,
        }
    }

    /// Installs `file`, returning the handle it was assigned, or
    /// `InvalidArgument` once the array end (`MAX_HANDLES`) is reached.
    pub fn insert(&mut self, file: OpenFile) -> Result<FileHandle, KernelError> {
        let idx = if self.next_hint < self.entries.len() {
            self.next_hint
        } else if self.entries.len() < MAX_HANDLES {
            self.entries.push(None);
            self.entries.len() - 1
        } else {
            return Err(KernelError::InvalidArgument);
        };
        self.entries[idx] = Some(file);
        self.next_hint = (idx + 1..self.entries.len())
            .find(|&i| self.entries[i].is_none())
            .unwrap_or(self.entries.len());
        Ok(FileHandle(idx))
    }

    fn slot(&self, handle: FileHandle) -> Result<&OpenFile, KernelError> {
        if handle.0 < FIRST_HANDLE {
            return Err(KernelError::InvalidArgument);
        }
        self.entries
            .get(handle.0)
            .and_then(|e| e.as_ref())
            .ok_or(KernelError::InvalidArgument)
    }

    /// Closes `handle`, freeing its slot for reuse by the *next* `insert`
    /// (retreating `next_hint` if this frees an earlier slot).
    pub fn close(&mut self, handle: FileHandle) -> Result<(), KernelError> {
        if handle.0 < FIRST_HANDLE {
            return Err(KernelError::InvalidArgument);
        }
        let slot = self
            .entries
            .get_mut(handle.0)
            .ok_or(KernelError::InvalidArgument)?;
        let file = slot.take().ok_or(KernelError::InvalidArgument)?;
        if handle.0 < self.next_hint {
            self.next_hint = handle.0;
        }
        file.close()
    }

    /// Reads from a file handle; `IsDirectory` if it names a directory.
    pub fn read(&self, handle: FileHandle, buf: &mut [u8]) -> Result<usize, KernelError> {
        self.slot(handle)?.as_file()?.read(buf)
    }

    /// Writes to a file handle; `IsDirectory` if it names a directory.
    pub fn write(&self, handle: FileHandle, buf: &[u8]) -> Result<usize, KernelError> {
        self.slot(handle)?.as_file()?.write(buf)
    }

    /// Repositions a file handle's cursor.
    pub fn seek(&self, handle: FileHandle, pos: usize) -> Result<(), KernelError> {
        self.slot(handle)?.as_file()?.seek(pos);
        Ok(())
    }

    /// The file handle's cursor.
    pub fn tell(&self, handle: FileHandle) -> Result<usize, KernelError> {
        Ok(self.slot(handle)?.as_file()?.tell())
    }

    /// The file handle's length in bytes.
    pub fn filesize(&self, handle: FileHandle) -> Result<usize, KernelError> {
        Ok(self.slot(handle)?.as_file()?.length())
    }

    /// The next child name for a directory handle; `NotDirectory` otherwise.
    pub fn readdir(&self, handle: FileHandle) -> Result<Option<String>, KernelError> {
        self.slot(handle)?.as_directory()?.readdir()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keos::block::{Disk, DiskRole, MemDisk, Sector};
    use keos::sync::SpinLock;

    use crate::free_map::FreeMap;
    use crate::layout::ROOT_DIR_SECTOR;

    fn fixture() -> (Arc<InodeStore>, Directory) {
        let disk: Arc<dyn Disk> = Arc::new(MemDisk::new(DiskRole::Filesystem, 32));
        let free_map = Arc::new(SpinLock::new(FreeMap::format(disk.as_ref())));
        let inodes = Arc::new(InodeStore::new(disk, Arc::clone(&free_map)));
        Directory::create_root(&inodes, Sector(ROOT_DIR_SECTOR)).unwrap();
        let root = Directory::open_root(&inodes).unwrap();
        (inodes, root)
    }

    #[test]
    fn handles_start_at_two_and_retreat_on_close() {
        let (inodes, root) = fixture();
        let sector = Sector(10);
        inodes.create(sector, 0, ROOT_DIR_SECTOR as u32, false).unwrap();
        let mut table = FileHandleTable::new();
        let f1 = table
            .insert(OpenFile::File(File::new(Arc::clone(&inodes), inodes.open(sector).unwrap())))
            .unwrap();
        assert_eq!(f1, FileHandle(2));
        let f2 = table
            .insert(OpenFile::File(File::new(Arc::clone(&inodes), inodes.open(sector).unwrap())))
            .unwrap();
        assert_eq!(f2, FileHandle(3));
        table.close(f1).unwrap();
        let f3 = table
            .insert(OpenFile::File(File::new(Arc::clone(&inodes), inodes.open(sector).unwrap())))
            .unwrap();
        assert_eq!(f3, FileHandle(2));
        root.close().unwrap();
    }

    #[test]
    fn directory_handle_rejects_read_write() {
        let (_inodes, root) = fixture();
        let mut table = FileHandleTable::new();
        let handle = table.insert(OpenFile::Directory(root)).unwrap();
        let mut buf = [0u8; 4];
        assert_eq!(table.read(handle, &mut buf), Err(KernelError::IsDirectory));
        assert_eq!(table.write(handle, &buf), Err(KernelError::IsDirectory));
        table.close(handle).unwrap();
    }

    #[test]
    fn insert_fails_once_the_array_end_is_reached() {
        let (inodes, root) = fixture();
        let sector = Sector(10);
        inodes.create(sector, 0, ROOT_DIR_SECTOR as u32, false).unwrap();
        let mut table = FileHandleTable::new();
        for _ in FIRST_HANDLE..MAX_HANDLES {
            table
                .insert(OpenFile::File(File::new(Arc::clone(&inodes), inodes.open(sector).unwrap())))
                .unwrap();
        }
        assert_eq!(
            table.insert(OpenFile::File(File::new(Arc::clone(&inodes), inodes.open(sector).unwrap()))),
            Err(KernelError::InvalidArgument)
        );
        root.close().unwrap();
    }
}
