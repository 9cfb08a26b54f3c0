//! Supplemental page table.
//!
//! Tracks, per user virtual page not currently installed by the page
//! table, where its contents come from and (once resident) which frame
//! holds them. [`PageSource`] is kept free of any dependency on a concrete
//! filesystem crate so the resolver never has to know how a file-backed
//! page's bytes are actually stored.
//!
//! `frame` and `backing` are tracked separately rather than folded into
//! one `RAM | FILESYS | SWAP` tag, because eviction of a clean
//! file-backed page must forget the frame but remember the file it came
//! from (so a later fault can reload it without ever touching swap).

use std::collections::HashMap;
use std::sync::Arc;

use keos::error::KernelError;
use keos::mm::PAGE_SIZE;

use crate::addr::Vpn;
use crate::permission::Permission;

/// Supplies the initial content of a file-backed page on first access.
///
/// Implementors read up to one page starting at `offset` and zero-fill
/// anything past the file's length.
pub trait PageSource: Send + Sync {
    /// Fills `buf` with up to `PAGE_SIZE` bytes starting at `offset`,
    /// zero-padding any bytes beyond the source's length.
    fn load(&self, offset: usize, buf: &mut [u8; PAGE_SIZE]) -> Result<(), KernelError>;
}

/// Where a page's content comes from when it isn't resident in RAM.
pub enum Backing {
    /// Read `read_bytes` bytes from `source` at `offset`, zero-filling
    /// the remainder of the page.
    Filesys {
        source: Arc<dyn PageSource>,
        offset: usize,
        read_bytes: usize,
    },
    /// Out in the swap area's `slot`.
    Swap { slot: usize },
    /// Never yet touched; load as a zero-filled page (stack growth, BSS).
    Zero,
}

/// One page's worth of supplemental bookkeeping.
pub struct SupplementalEntry {
    /// `Some(frame)` while the page is installed in the hardware page
    /// table; `None` while it's evicted or not yet faulted in.
    pub frame: Option<usize>,
    /// Where to (re)load this page's content from when it's not resident.
    pub backing: Backing,
    pub perm: Permission,
    pub writable: bool,
}

impl SupplementalEntry {
    /// Whether this entry currently occupies a frame.
    pub fn is_resident(&self) -> bool {
        self.frame.is_some()
    }
}

/// Per-process record of every user virtual page the hardware page table
/// doesn't currently own, plus the metadata needed to resolve a fault on
/// it or to revert it to its original source on eviction.
#[derive(Default)]
pub struct SupplementalPageTable {
    entries: HashMap<Vpn, SupplementalEntry>,
}

impl SupplementalPageTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records how to populate `vpn` when it's first faulted in.
    pub fn register(&mut self, vpn: Vpn, entry: SupplementalEntry) -> Result<(), KernelError> {
        if self.entries.contains_key(&vpn) {
            return Err(KernelError::InvalidArgument);
        }
        self.entries.insert(vpn, entry);
        Ok(())
    }

    /// Looks up `vpn`'s supplemental entry.
    pub fn get(&self, vpn: Vpn) -> Option<&SupplementalEntry> {
        self.entries.get(&vpn)
    }

    /// Mutable lookup, for the fault resolver to update `frame`/`backing`
    /// in place.
    pub fn get_mut(&mut self, vpn: Vpn) -> Option<&mut SupplementalEntry> {
        self.entries.get_mut(&vpn)
    }

    /// Finds the (at most one) page currently resident in `frame`.
    pub fn find_by_frame(&self, frame: usize) -> Option<Vpn> {
        self.entries
            .iter()
            .find(|(_, e)| e.frame == Some(frame))
            .map(|(vpn, _)| *vpn)
    }

    /// Drops `vpn`'s bookkeeping entirely (process exit, or the mapping
    /// is torn down for good).
    pub fn remove(&mut self, vpn: Vpn) -> Option<SupplementalEntry> {
        self.entries.remove(&vpn)
    }

    /// Whether `vpn` has any supplemental record at all.
    pub fn contains(&self, vpn: Vpn) -> bool {
        self.entries.contains_key(&vpn)
    }

    /// Drains every entry (process exit): frees frames and swap slots —
    /// if resident, the frame; if backed by swap, the swap slot.
    pub fn drain(&mut self) -> Vec<(Vpn, SupplementalEntry)> {
        self.entries.drain().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ConstSource(u8);
    impl PageSource for ConstSource {
        fn load(&self, _offset: usize, buf: &mut [u8; PAGE_SIZE]) -> Result<(), KernelError> {
            buf.fill(self.0);
            Ok(())
        }
    }

    #[test]
    fn register_then_get_then_remove() {
        let mut spt = SupplementalPageTable::new();
        spt.register(
            Vpn(1),
            SupplementalEntry {
                frame: None,
                backing: Backing::Zero,
                perm: Permission::read_write(),
                writable: true,
            },
        )
        .unwrap();
        assert!(spt.contains(Vpn(1)));
        spt.get_mut(Vpn(1)).unwrap().frame = Some(3);
        assert!(spt.get(Vpn(1)).unwrap().is_resident());
        assert_eq!(spt.find_by_frame(3), Some(Vpn(1)));
        assert!(spt.remove(Vpn(1)).is_some());
        assert!(!spt.contains(Vpn(1)));
    }

    #[test]
    fn double_register_is_rejected() {
        let mut spt = SupplementalPageTable::new();
        let entry = || SupplementalEntry {
            frame: None,
            backing: Backing::Zero,
            perm: Permission::READ_ONLY,
            writable: false,
        };
        spt.register(Vpn(1), entry()).unwrap();
        assert_eq!(spt.register(Vpn(1), entry()), Err(KernelError::InvalidArgument));
    }

    #[test]
    fn eviction_forgets_frame_but_remembers_filesys_origin() {
        let mut spt = SupplementalPageTable::new();
        spt.register(
            Vpn(2),
            SupplementalEntry {
                frame: Some(5),
                backing: Backing::Filesys {
                    source: Arc::new(ConstSource(1)),
                    offset: 0,
                    read_bytes: 4096,
                },
                perm: Permission::READ_ONLY,
                writable: false,
            },
        )
        .unwrap();
        spt.get_mut(Vpn(2)).unwrap().frame = None;
        let entry = spt.get(Vpn(2)).unwrap();
        assert!(!entry.is_resident());
        assert!(matches!(entry.backing, Backing::Filesys { .. }));
    }

    #[test]
    fn page_source_fills_whole_page() {
        let source = ConstSource(9);
        let mut buf = [0u8; PAGE_SIZE];
        source.load(0, &mut buf).unwrap();
        assert!(buf.iter().all(|&b| b == 9));
    }
}
