//! Path resolution (§4.3).
//!
//! Tokenizes on `/`, walks the intermediate components through
//! [`Directory::lookup`] (which already understands `.` and `..` as real
//! stored entries), and returns the resolved parent directory plus the
//! owned final component — the shape every creating/removing/opening
//! operation in `lib.rs` needs.

use std::sync::Arc;

use keos::error::KernelError;

use crate::directory::Directory;
use crate::inode::InodeStore;

/// Resolves `path` against `cwd`: absolute paths (leading `/`) start at the
/// root, relative paths start at `cwd`. Returns the open parent directory
/// and the final path component (empty if `path` names a directory itself,
/// e.g. `"/"`, `"."`, or `"a/b/"`).
pub fn resolve(
    inodes: &Arc<InodeStore>,
    cwd: &Directory,
    path: &str,
) -> Result<(Directory, String), KernelError> {
    if path.is_empty() {
        return Err(KernelError::InvalidArgument);
    }
    let absolute = path.starts_with('/');
    let mut components: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    let mut dir = if absolute {
        Directory::open_root(inodes)?
    } else {
        cwd.reopen()
    };

    if components.is_empty() {
        return Ok((dir, String::new()));
    }
    let last = components.pop().unwrap().to_string();

    for comp in components {
        let next_sector = dir.lookup(comp)?;
        let next = Directory::from_sector(inodes, next_sector)?;
        dir.close()?;
        dir = next;
    }
    Ok((dir, last))
}

#[cfg(test)]
mod tests {
    use super::*;
    use keos::{
        block::{Disk, DiskRole, MemDisk, Sector},
        sync::SpinLock,
    };

    use crate::free_map::FreeMap;
    use crate::layout::ROOT_DIR_SECTOR;

    fn fixture() -> (Arc<InodeStore>, Directory) {
        let disk: Arc<dyn Disk> = Arc::new(MemDisk::new(DiskRole::Filesystem, 64));
        let free_map = Arc::new(SpinLock::new(FreeMap::format(disk.as_ref())));
        let inodes = Arc::new(InodeStore::new(disk, Arc::clone(&free_map)));
        Directory::create_root(&inodes, Sector(ROOT_DIR_SECTOR)).unwrap();
        let root = Directory::open_root(&inodes).unwrap();
        let sub = free_map.lock().allocate(1).unwrap();
        Directory::create(&inodes, sub, ROOT_DIR_SECTOR as u32).unwrap();
        root.add("d", sub).unwrap();
        let leaf = free_map.lock().allocate(1).unwrap();
        inodes.create(leaf, 0, sub.into_usize() as u32, false).unwrap();
        let d = Directory::from_sector(&inodes, sub).unwrap();
        d.add("f", leaf).unwrap();
        d.close().unwrap();
        (inodes, root)
    }

    #[test]
    fn absolute_and_relative_paths_agree() {
        let (inodes, root) = fixture();
        let (parent_abs, name_abs) = resolve(&inodes, &root, "/d/f").unwrap();
        let (parent_rel, name_rel) = resolve(&inodes, &root, "./.././d/f").unwrap();
        assert_eq!(name_abs, "f");
        assert_eq!(name_rel, "f");
        assert_eq!(parent_abs.lookup("f").unwrap(), parent_rel.lookup("f").unwrap());
        parent_abs.close().unwrap();
        parent_rel.close().unwrap();
    }

    #[test]
    fn dot_dot_past_root_stays_at_root() {
        let (inodes, root) = fixture();
        let (parent, name) = resolve(&inodes, &root, "/../../d").unwrap();
        assert_eq!(name, "d");
        assert_eq!(parent.lookup(".").unwrap(), root.lookup(".").unwrap());
        parent.close().unwrap();
        root.close().unwrap();
    }
}
