//! Page permission flags, over a three-bit set instead of a hardware PTE's
//! full flag word.

use bitflags::bitflags;

bitflags! {
    /// Access rights granted to a mapped page.
    pub struct Permission: u8 {
        /// The page may be read.
        const READ = 0b001;
        /// The page may be written.
        const WRITE = 0b010;
        /// The page may be executed.
        const EXEC = 0b100;
    }
}

impl Permission {
    /// Read-only (e.g. a loaded executable's text segment).
    pub const READ_ONLY: Permission = Permission::READ;

    /// Read-write (e.g. the stack, bss, or an anonymous mapping).
    pub fn read_write() -> Permission {
        Permission::READ | Permission::WRITE
    }
}
