//! # Two-level i386 paging structures
//!
//! - [`pd`]: the Page Directory (L2) — 1024 [`PdEntry`]s, each pointing
//!   to a page table.
//! - [`pt`]: the Page Table (L1) — 1024 [`PtEntry`]s, each mapping one
//!   4 KiB page.
//!
//! Both tables are 4 KiB-aligned and exactly one page in size, so a
//! table always occupies a single physical frame. Entries are mutated in
//! place through the typed wrappers; the caller owns TLB maintenance
//! after changing an active mapping.

mod pd;
mod pt;

pub use pd::{PageDirectoryTable, PdEntry, PdIndex};
pub use pt::{PageTable, PtEntry, PtIndex};
