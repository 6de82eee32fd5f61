//! # Kernel core
//!
//! The virtual memory manager of a 32-bit x86 kernel: physical frame
//! pools, page directory and table maintenance, regions windowing
//! reference-counted VM objects, and the page-fault paths (demand-zero,
//! demand paging from an inode, copy-on-write).
//!
//! The trap/descriptor-table plumbing, the scheduler, and the filesystem
//! proper live elsewhere; this crate consumes them through the narrow
//! interfaces in [`process`] and [`fs`].

#![cfg_attr(not(test), no_std)]
#![allow(unsafe_code)]

extern crate alloc;

pub mod fs;
pub mod logger;
pub mod mm;
pub mod privilege;
pub mod process;
