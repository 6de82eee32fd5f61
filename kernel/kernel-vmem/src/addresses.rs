//! # Linear and Physical Memory Addresses

use crate::PAGE_SIZE;
use core::ops::{Add, AddAssign, Deref, Sub};

/// A raw 32-bit memory address.
///
/// See [`PhysicalAddress`] and [`LinearAddress`] for usages.
#[repr(transparent)]
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct MemoryAddress(pub u32);

/// A **physical** memory address (machine bus address).
///
/// Newtype over `u32` to prevent mixing with linear addresses. When used
/// inside a page-table entry the low 12 bits must be zero.
#[repr(transparent)]
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct PhysicalAddress(pub MemoryAddress);

/// A **linear** memory address: post-segmentation, pre-paging.
///
/// With flat segments this is the same value as the virtual address seen
/// by code.
#[repr(transparent)]
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct LinearAddress(pub MemoryAddress);

impl MemoryAddress {
    #[must_use]
    pub const fn new(addr: u32) -> Self {
        Self(addr)
    }

    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }
}

impl LinearAddress {
    #[must_use]
    pub const fn new(addr: MemoryAddress) -> Self {
        Self(addr)
    }

    #[must_use]
    pub const fn from_u32(addr: u32) -> Self {
        Self(MemoryAddress::new(addr))
    }

    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0.as_u32()
    }

    /// The address `bytes` past this one.
    #[must_use]
    pub const fn offset(self, bytes: u32) -> Self {
        Self::from_u32(self.as_u32() + bytes)
    }

    /// This address rounded down to its page base.
    #[must_use]
    pub const fn page_base(self) -> Self {
        Self::from_u32(crate::align_down(self.as_u32(), PAGE_SIZE))
    }

    #[must_use]
    pub const fn is_page_aligned(self) -> bool {
        self.as_u32() % PAGE_SIZE == 0
    }
}

impl PhysicalAddress {
    #[must_use]
    pub const fn new(addr: MemoryAddress) -> Self {
        Self(addr)
    }

    #[must_use]
    pub const fn from_u32(addr: u32) -> Self {
        Self(MemoryAddress::new(addr))
    }

    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0.as_u32()
    }

    /// The address `bytes` past this one.
    #[must_use]
    pub const fn offset(self, bytes: u32) -> Self {
        Self::from_u32(self.as_u32() + bytes)
    }

    #[must_use]
    pub const fn is_page_aligned(self) -> bool {
        self.as_u32() % PAGE_SIZE == 0
    }
}

impl core::fmt::Display for MemoryAddress {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

impl core::fmt::Debug for MemoryAddress {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

impl core::fmt::Display for LinearAddress {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "L{:#010x}", self.as_u32())
    }
}

impl core::fmt::Debug for LinearAddress {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(self, f)
    }
}

impl core::fmt::Display for PhysicalAddress {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "P{:#010x}", self.as_u32())
    }
}

impl core::fmt::Debug for PhysicalAddress {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(self, f)
    }
}

impl Deref for MemoryAddress {
    type Target = u32;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Deref for LinearAddress {
    type Target = MemoryAddress;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Deref for PhysicalAddress {
    type Target = MemoryAddress;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Add<u32> for LinearAddress {
    type Output = Self;

    fn add(self, rhs: u32) -> Self::Output {
        Self::from_u32(self.as_u32().checked_add(rhs).expect("LinearAddress add"))
    }
}

impl Add<u32> for PhysicalAddress {
    type Output = Self;

    fn add(self, rhs: u32) -> Self::Output {
        Self::from_u32(self.as_u32().checked_add(rhs).expect("PhysicalAddress add"))
    }
}

impl AddAssign<u32> for LinearAddress {
    fn add_assign(&mut self, rhs: u32) {
        *self = *self + rhs;
    }
}

impl AddAssign<u32> for PhysicalAddress {
    fn add_assign(&mut self, rhs: u32) {
        *self = *self + rhs;
    }
}

impl Sub<Self> for LinearAddress {
    type Output = u32;

    fn sub(self, rhs: Self) -> Self::Output {
        self.as_u32().checked_sub(rhs.as_u32()).expect("LinearAddress sub")
    }
}

impl PartialEq<u32> for LinearAddress {
    fn eq(&self, other: &u32) -> bool {
        self.as_u32() == *other
    }
}

impl PartialEq<u32> for PhysicalAddress {
    fn eq(&self, other: &u32) -> bool {
        self.as_u32() == *other
    }
}

impl From<u32> for LinearAddress {
    fn from(addr: u32) -> Self {
        Self::from_u32(addr)
    }
}

impl From<u32> for PhysicalAddress {
    fn from(addr: u32) -> Self {
        Self::from_u32(addr)
    }
}
