//! Page-fault resolver.
//!
//! Ties the frame table, per-process page tables, supplemental page
//! tables, and swap area together into the decision tree a hardware
//! page-fault trampoline would drive: classify the fault, grow the stack
//! or reject, evict a victim if the frame pool is exhausted, load the
//! faulting page's content, and install the mapping. There's no MMU
//! underneath to raise a real `PFErrorCode`/`cr2` trap, so the caller
//! supplies an explicit [`FaultCause`] instead.

use std::collections::HashMap;
use std::sync::Arc;

use keos::error::KernelError;
use keos::mm::PAGE_SIZE;
use keos::sync::SpinLock;

use crate::addr::{Va, Vpn, PHYS_BASE};
use crate::frame::{FrameOwner, FrameTable};
use crate::page_table::PageTable;
use crate::permission::Permission;
use crate::supplemental::{Backing, SupplementalEntry, SupplementalPageTable};
use crate::swap::SwapArea;
use crate::ProcessId;

/// How far below the saved stack pointer a fault may still land and be
/// treated as stack growth (the `PUSHA` instruction's worst-case slack).
const STACK_GROWTH_SLACK: usize = 32;

/// How far below `PHYS_BASE` the stack is allowed to grow.
const STACK_GROWTH_LIMIT: usize = 8 * 1024 * 1024;

/// Circumstances of a fault, as a hardware trap frame would report them.
#[derive(Debug, Clone, Copy)]
pub struct FaultCause {
    /// The faulting address already had a (read-only) page-table entry;
    /// this is a protection violation, not a missing mapping.
    pub present: bool,
    /// The faulting access was a write.
    pub write: bool,
    /// The fault occurred in user mode.
    pub user: bool,
}

/// Where a lazily-loaded file-backed page's bytes come from (§4.7).
pub struct FileBacking {
    pub source: Arc<dyn crate::supplemental::PageSource>,
    pub offset: usize,
    pub read_bytes: usize,
}

/// What the resolver did to satisfy a fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultOutcome {
    /// A new page was loaded and mapped at `frame`.
    Resolved { frame: usize },
}

struct Process {
    page_table: PageTable,
    supplemental: SupplementalPageTable,
}

/// Owns the frame table, swap area, and every process's page tables, and
/// resolves page faults against them.
pub struct VirtualMemory {
    frames: FrameTable,
    swap: SwapArea,
    processes: SpinLock<HashMap<ProcessId, Process>>,
}

impl VirtualMemory {
    pub fn new(frame_count: usize, swap: SwapArea) -> Self {
        Self {
            frames: FrameTable::new(frame_count),
            swap,
            processes: SpinLock::new(HashMap::new()),
        }
    }

    /// Begins tracking a new process's address space.
    pub fn register_process(&self, pid: ProcessId) {
        self.processes.lock().insert(
            pid,
            Process {
                page_table: PageTable::new(),
                supplemental: SupplementalPageTable::new(),
            },
        );
    }

    /// Tears down a process's address space: every resident page's frame
    /// is freed and every swapped-out page's slot is released (§4.8
    /// "exclusively owned by its process and destroyed at process
    /// exit").
    pub fn unregister_process(&self, pid: ProcessId) {
        if let Some(mut process) = self.processes.lock().remove(&pid) {
            for (_, entry) in process.supplemental.drain() {
                if let Some(frame) = entry.frame {
                    self.frames.dealloc(frame);
                } else if let Backing::Swap { slot } = entry.backing {
                    self.swap.free_slot(slot);
                }
            }
            process.page_table.clear();
        }
    }

    /// Registers a file-backed page for lazy loading (§4.7 "load from
    /// executable"): nothing is read or mapped until the first fault.
    pub fn map_file_backed(
        &self,
        pid: ProcessId,
        vpn: Vpn,
        file: FileBacking,
        perm: Permission,
        writable: bool,
    ) -> Result<(), KernelError> {
        let mut processes = self.processes.lock();
        let process = processes.get_mut(&pid).ok_or(KernelError::InvalidArgument)?;
        process.supplemental.register(
            vpn,
            SupplementalEntry {
                frame: None,
                backing: Backing::Filesys {
                    source: file.source,
                    offset: file.offset,
                    read_bytes: file.read_bytes,
                },
                perm,
                writable,
            },
        )
    }

    /// Resolves a page fault at `fault_addr`, given the circumstances the
    /// trap frame reported and the faulting thread's saved stack
    /// pointer.
    pub fn handle_fault(
        &self,
        pid: ProcessId,
        fault_addr: Va,
        esp: usize,
        cause: FaultCause,
    ) -> Result<FaultOutcome, KernelError> {
        if !cause.user || cause.present || fault_addr.0 >= PHYS_BASE {
            return Err(KernelError::BadAddress);
        }
        let vpn = fault_addr.vpn();

        let mut processes = self.processes.lock();
        let process = processes.get_mut(&pid).ok_or(KernelError::InvalidArgument)?;

        if !process.supplemental.contains(vpn) {
            if !Self::is_stack_growth(fault_addr, esp) {
                return Err(KernelError::BadAddress);
            }
            process.supplemental.register(
                vpn,
                SupplementalEntry {
                    frame: None,
                    backing: Backing::Zero,
                    perm: Permission::read_write(),
                    writable: true,
                },
            )?;
        }

        if process.supplemental.get(vpn).unwrap().is_resident() {
            // Already mapped: a concurrent fault resolved it first.
            let frame = process.supplemental.get(vpn).unwrap().frame.unwrap();
            return Ok(FaultOutcome::Resolved { frame });
        }

        let owner = FrameOwner { process: pid, vpn };
        let frame = match self.frames.alloc(owner) {
            Some(frame) => frame,
            None => {
                self.evict(&mut processes)?;
                self.frames.alloc(owner).ok_or(KernelError::NoMemory)?
            }
        };
        let process = processes.get_mut(&pid).ok_or(KernelError::InvalidArgument)?;

        let entry = process.supplemental.get_mut(vpn).unwrap();
        let mut dirty_on_install = false;
        let load_result: Result<(), KernelError> = match &entry.backing {
            Backing::Zero => {
                self.frames.zero(frame);
                dirty_on_install = true;
                Ok(())
            }
            Backing::Filesys {
                source,
                offset,
                read_bytes,
            } => (|| {
                let mut buf = [0u8; PAGE_SIZE];
                source.load(*offset, &mut buf)?;
                for b in buf.iter_mut().skip(*read_bytes) {
                    *b = 0;
                }
                self.frames.write(frame, &buf);
                Ok(())
            })(),
            Backing::Swap { slot } => (|| {
                let data = self.swap.read_slot(*slot)?;
                self.swap.free_slot(*slot);
                self.frames.write(frame, &data);
                dirty_on_install = true;
                Ok(())
            })(),
        };
        // On any failure from here, the frame we just allocated must not
        // leak and no mapping may be left installed: free it back to the
        // pool before handing the error up for the caller to terminate the
        // faulting process.
        if let Err(e) = load_result {
            self.frames.dealloc(frame);
            return Err(e);
        }
        let perm = entry.perm;
        entry.frame = Some(frame);

        if let Err(e) = process.page_table.map(vpn, frame, perm) {
            process.supplemental.get_mut(vpn).unwrap().frame = None;
            process.page_table.unmap(vpn);
            self.frames.dealloc(frame);
            return Err(e);
        }
        if dirty_on_install {
            process.page_table.touch(vpn, true);
        }
        Ok(FaultOutcome::Resolved { frame })
    }

    /// Whether `fault_addr` lies within the stack's growth window below
    /// `esp`, and within the 8 MiB cap under `PHYS_BASE`.
    fn is_stack_growth(fault_addr: Va, esp: usize) -> bool {
        if fault_addr.0 + STACK_GROWTH_SLACK < esp {
            return false;
        }
        PHYS_BASE - fault_addr.0 <= STACK_GROWTH_LIMIT
    }

    /// Runs the clock-hand second-chance sweep until exactly one frame
    /// has been freed back to the pool for the caller to reclaim.
    fn evict(&self, processes: &mut HashMap<ProcessId, Process>) -> Result<(), KernelError> {
        let frame_count = self.frames.frame_count();
        for _ in 0..2 * frame_count.max(1) {
            let frame = self.frames.advance_clock();
            let owner = match self.frames.owner(frame) {
                Some(owner) => owner,
                None => continue,
            };
            let process = match processes.get_mut(&owner.process) {
                Some(process) => process,
                None => continue,
            };
            if process.page_table.take_accessed(owner.vpn) {
                continue;
            }
            let dirty = process.page_table.is_dirty(owner.vpn);
            process.page_table.unmap(owner.vpn);
            let entry = process.supplemental.get_mut(owner.vpn).unwrap();
            if dirty {
                let slot = self.swap.alloc_slot().expect("swap area exhausted during eviction");
                self.swap.write_slot(slot, &self.frames.read(frame))?;
                entry.backing = Backing::Swap { slot };
                keos::debug!("evicted dirty frame {frame} to swap slot {slot}");
            } else {
                keos::debug!("evicted clean frame {frame}, reloadable from its source");
            }
            entry.frame = None;
            self.frames.dealloc(frame);
            return Ok(());
        }
        Err(KernelError::NoMemory)
    }

    /// Simulated memory access: records the accessed/dirty bits a real
    /// MMU would set on a hit, for tests driving the clock hand without
    /// a hardware page table underneath. Returns the resident frame.
    pub fn touch(&self, pid: ProcessId, vpn: Vpn, write: bool) -> Result<usize, KernelError> {
        let mut processes = self.processes.lock();
        let process = processes.get_mut(&pid).ok_or(KernelError::InvalidArgument)?;
        let frame = process
            .page_table
            .walk(vpn)
            .ok_or(KernelError::InvalidArgument)?
            .frame;
        process.page_table.touch(vpn, write);
        Ok(frame)
    }

    /// The frame currently backing `vpn`, if mapped.
    pub fn resident_frame(&self, pid: ProcessId, vpn: Vpn) -> Option<usize> {
        let processes = self.processes.lock();
        processes.get(&pid)?.page_table.walk(vpn).map(|e| e.frame)
    }

    /// Reads the page currently backing `vpn` via the frame table
    /// (bypassing any hardware mapping, the way a kernel `memcpy` into
    /// user space would after the fault resolver installs the frame).
    pub fn read_page(&self, pid: ProcessId, vpn: Vpn) -> Option<[u8; PAGE_SIZE]> {
        let frame = self.resident_frame(pid, vpn)?;
        Some(self.frames.read(frame))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::supplemental::PageSource;
    use keos::block::{DiskRole, MemDisk};

    struct ConstSource(u8, usize);
    impl PageSource for ConstSource {
        fn load(&self, _offset: usize, buf: &mut [u8; PAGE_SIZE]) -> Result<(), KernelError> {
            for b in buf.iter_mut().take(self.1) {
                *b = self.0;
            }
            Ok(())
        }
    }

    fn vm(frame_count: usize) -> VirtualMemory {
        let disk: Arc<dyn keos::block::Disk> =
            Arc::new(MemDisk::new(DiskRole::Swap, 8 * 16));
        VirtualMemory::new(frame_count, SwapArea::new(disk))
    }

    fn user_cause(write: bool) -> FaultCause {
        FaultCause {
            present: false,
            write,
            user: true,
        }
    }

    #[test]
    fn stack_growth_within_window_succeeds_and_installs_writable_mapping() {
        let vm = vm(4);
        let pid = ProcessId(1);
        vm.register_process(pid);
        let esp = PHYS_BASE - 4096;
        for offset in [4usize, 32, PAGE_SIZE] {
            let addr = Va(esp - offset);
            let outcome = vm
                .handle_fault(pid, addr, esp, user_cause(true))
                .unwrap();
            assert!(matches!(outcome, FaultOutcome::Resolved { .. }));
        }
    }

    #[test]
    fn stack_growth_past_eight_mib_cap_is_rejected() {
        let vm = vm(4);
        let pid = ProcessId(1);
        vm.register_process(pid);
        let esp = PHYS_BASE - 4096;
        let addr = Va(PHYS_BASE - STACK_GROWTH_LIMIT - 1);
        assert_eq!(
            vm.handle_fault(pid, addr, esp, user_cause(true)),
            Err(KernelError::BadAddress)
        );
    }

    #[test]
    fn protection_violation_is_rejected_not_grown() {
        let vm = vm(4);
        let pid = ProcessId(1);
        vm.register_process(pid);
        let addr = Va(0x1000);
        let mut cause = user_cause(true);
        cause.present = true;
        assert_eq!(
            vm.handle_fault(pid, addr, 0x2000, cause),
            Err(KernelError::BadAddress)
        );
    }

    #[test]
    fn file_backed_fault_loads_and_zero_pads_short_read() {
        let vm = vm(4);
        let pid = ProcessId(1);
        vm.register_process(pid);
        let vpn = Vpn(3);
        vm.map_file_backed(
            pid,
            vpn,
            FileBacking {
                source: Arc::new(ConstSource(7, 10)),
                offset: 0,
                read_bytes: 10,
            },
            Permission::READ_ONLY,
            false,
        )
        .unwrap();
        let outcome = vm
            .handle_fault(pid, vpn.base(), 0, user_cause(false))
            .unwrap();
        let FaultOutcome::Resolved { frame } = outcome;
        let page = vm.read_page(pid, vpn).unwrap();
        assert_eq!(&page[..10], &[7u8; 10][..]);
        assert!(page[10..].iter().all(|&b| b == 0));
        assert_eq!(vm.resident_frame(pid, vpn), Some(frame));
    }

    #[test]
    fn eviction_writes_dirty_victim_to_swap_and_reload_restores_it() {
        let vm = vm(1);
        let pid = ProcessId(1);
        vm.register_process(pid);

        let stack_esp = PHYS_BASE - 4096;
        let stack_vpn = Va(stack_esp - 4).vpn();
        vm.handle_fault(pid, Va(stack_esp - 4), stack_esp, user_cause(true))
            .unwrap();
        vm.touch(pid, stack_vpn, true).unwrap();

        let other_vpn = Vpn(9);
        vm.map_file_backed(
            pid,
            other_vpn,
            FileBacking {
                source: Arc::new(ConstSource(4, PAGE_SIZE)),
                offset: 0,
                read_bytes: PAGE_SIZE,
            },
            Permission::read_write(),
            true,
        )
        .unwrap();
        // Only one frame exists; this fault must evict the stack page.
        vm.handle_fault(pid, other_vpn.base(), stack_esp, user_cause(false))
            .unwrap();

        assert!(vm.resident_frame(pid, stack_vpn).is_none());

        // Re-touch the stack page: it should come back from swap with its
        // written content intact, and the other page gets evicted instead.
        vm.handle_fault(pid, Va(stack_esp - 4), stack_esp, user_cause(true))
            .unwrap();
        assert!(vm.resident_frame(pid, stack_vpn).is_some());
        assert!(vm.resident_frame(pid, other_vpn).is_none());
    }
}
