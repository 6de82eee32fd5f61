//! # Physical frame ownership
//!
//! Every real 4 KiB frame the memory manager can hand out is minted once
//! at bootstrap as a [`PhysicalPage`] token and lives in one of two
//! [`PagePool`]s (supervisor or user) until allocated. Allocation yields
//! a [`PhysicalPageRef`] — a cloneable owning handle. When the last
//! handle drops, the frame returns to the pool it came from.
//!
//! The invariant maintained here: a frame is either in **exactly one
//! pool** with a reference count of one, or held by **one or more
//! owners** and in no pool — never both.

#![cfg_attr(not(test), no_std)]
#![allow(unsafe_code)]

extern crate alloc;

mod physical_page;
mod pool;

pub use physical_page::{PhysicalPage, PhysicalPageRef, RingClass};
pub use pool::PagePool;
