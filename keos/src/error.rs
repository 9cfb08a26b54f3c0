//! Error kinds surfaced by the storage and virtual-memory core.
//!
//! A flat enum of POSIX-ish error kinds, trimmed to the subset the
//! filesystem and VM subsystems actually raise. Local recovery only happens
//! for "allocation failed, return false" style conditions; everything else
//! is an invalid-access condition the caller is expected to turn into
//! process termination.

/// Errors that can occur while operating the filesystem or VM core.
#[derive(Debug, Eq, PartialEq, Clone, Copy)]
pub enum KernelError {
    /// No such file or directory. (ENOENT)
    NoSuchEntry,
    /// IO error talking to the block device. (EIO)
    IOError,
    /// Out of memory / frame pool exhausted. (ENOMEM)
    NoMemory,
    /// Permission denied, e.g. write to a deny-write inode. (EACCES)
    InvalidAccess,
    /// Address outside of the user address space. (EFAULT)
    BadAddress,
    /// Directory non-empty or inode still open elsewhere. (EBUSY)
    Busy,
    /// Name already present in the directory. (EEXIST)
    FileExist,
    /// Entry is not a directory. (ENOTDIR)
    NotDirectory,
    /// Entry is a directory where a file was expected. (EISDIR)
    IsDirectory,
    /// Argument was invalid (empty/reserved name, bad handle, ...). (EINVAL)
    InvalidArgument,
    /// No space left on the free-sector map or swap area. (ENOSPC)
    NoSpace,
    /// Name exceeds `NAME_MAX`. (ENAMETOOLONG)
    NameTooLong,
    /// Directory is not empty. (ENOTEMPTY)
    DirectoryNotEmpty,
    /// On-disk metadata failed a validity check (bad magic, ...).
    FilesystemCorrupted(&'static str),
}

impl core::fmt::Display for KernelError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            KernelError::NoSuchEntry => write!(f, "no such file or directory"),
            KernelError::IOError => write!(f, "I/O error"),
            KernelError::NoMemory => write!(f, "out of memory"),
            KernelError::InvalidAccess => write!(f, "permission denied"),
            KernelError::BadAddress => write!(f, "bad address"),
            KernelError::Busy => write!(f, "resource busy"),
            KernelError::FileExist => write!(f, "file exists"),
            KernelError::NotDirectory => write!(f, "not a directory"),
            KernelError::IsDirectory => write!(f, "is a directory"),
            KernelError::InvalidArgument => write!(f, "invalid argument"),
            KernelError::NoSpace => write!(f, "no space left on device"),
            KernelError::NameTooLong => write!(f, "name too long"),
            KernelError::DirectoryNotEmpty => write!(f, "directory not empty"),
            KernelError::FilesystemCorrupted(why) => write!(f, "filesystem corrupted: {why}"),
        }
    }
}

impl std::error::Error for KernelError {}
