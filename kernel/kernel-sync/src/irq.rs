//! Interrupt masking.
//!
//! On the uniprocessor i386 target, disabling interrupts *is* the mutual
//! exclusion primitive: every memory-manager operation that touches
//! shared state runs under an [`IrqGuard`]. Guards nest freely because
//! each one snapshots the interrupt flag and restores exactly that state
//! on drop.
//!
//! When the crate is compiled for any other architecture (host-side unit
//! and scenario tests), the interrupt flag is emulated with a per-thread
//! cell so the guard protocol keeps its save/restore semantics without
//! executing privileged instructions.

use crate::{Mutex, MutexGuard, RawLock, RawUnlock};

#[cfg(target_arch = "x86")]
mod arch {
    /// Disables hardware interrupts (`cli`).
    ///
    /// # Safety & Privilege
    ///
    /// Must only run at CPL 0.
    #[inline]
    pub fn cli_stop_interrupts() {
        unsafe { core::arch::asm!("cli", options(nomem, nostack, preserves_flags)) }
    }

    /// Enables hardware interrupts (`sti`).
    ///
    /// # Safety & Privilege
    ///
    /// Must only run at CPL 0.
    #[inline]
    pub fn sti_enable_interrupts() {
        unsafe { core::arch::asm!("sti", options(nomem, nostack, preserves_flags)) }
    }

    /// Returns whether EFLAGS.IF (bit 9) is set, via `pushfd`/`pop`.
    #[inline]
    #[must_use]
    pub fn interrupts_enabled() -> bool {
        let eflags: u32;
        unsafe {
            core::arch::asm!("pushfd; pop {}", out(reg) eflags, options(nostack, preserves_flags));
        }
        (eflags & (1 << 9)) != 0
    }
}

#[cfg(not(target_arch = "x86"))]
mod arch {
    extern crate std;
    use std::cell::Cell;

    std::thread_local! {
        /// Emulated interrupt flag for hosted builds. Per-thread, because
        /// every test thread stands in for its own single-CPU machine.
        /// Starts enabled, like a CPU that has finished early bring-up.
        static EMULATED_IF: Cell<bool> = const { Cell::new(true) };
    }

    #[inline]
    pub fn cli_stop_interrupts() {
        EMULATED_IF.with(|flag| flag.set(false));
    }

    #[inline]
    pub fn sti_enable_interrupts() {
        EMULATED_IF.with(|flag| flag.set(true));
    }

    #[inline]
    #[must_use]
    pub fn interrupts_enabled() -> bool {
        EMULATED_IF.with(Cell::get)
    }
}

pub use arch::{cli_stop_interrupts, interrupts_enabled, sti_enable_interrupts};

/// RAII guard that disables interrupts on creation and restores the
/// previous state on drop.
///
/// `IrqGuard::new()` snapshots the IF bit; if interrupts were enabled it
/// executes `cli`. On drop it executes `sti` **only** if they were
/// previously enabled, which makes nesting idempotent:
///
/// ```
/// use kernel_sync::irq::{IrqGuard, interrupts_enabled};
///
/// let outer = IrqGuard::new();
/// {
///     let _inner = IrqGuard::new(); // already disabled; remembers that
/// } // inner drop: interrupts stay disabled
/// assert!(!interrupts_enabled());
/// drop(outer); // restored to the original state
/// ```
pub struct IrqGuard {
    /// Whether interrupts were enabled when the guard was created.
    were_enabled: bool,
}

impl Default for IrqGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl IrqGuard {
    /// Disables interrupts if they are currently enabled and remembers
    /// the prior state.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        let enabled = interrupts_enabled();
        if enabled {
            cli_stop_interrupts();
        }
        Self {
            were_enabled: enabled,
        }
    }
}

impl Drop for IrqGuard {
    /// Restores interrupts only if they were enabled at construction.
    fn drop(&mut self) {
        if self.were_enabled {
            sti_enable_interrupts();
        }
    }
}

/// A mutex guard that also keeps interrupts disabled while held.
///
/// Created by [`Mutex::lock_irq`]: the interrupt state is saved and
/// interrupts disabled *before* the lock is taken, and both are released
/// in reverse order on drop. This keeps interrupt handlers from
/// re-entering a critical section that uses the same lock.
pub struct IrqMutex<'a, T, R: RawLock + RawUnlock> {
    _irq: IrqGuard,
    g: MutexGuard<'a, T, R>,
}

impl<T, R: RawLock + RawUnlock> Mutex<T, R> {
    /// Acquires the mutex with interrupts disabled for the guard's
    /// lifetime.
    #[inline]
    pub fn lock_irq(&self) -> IrqMutex<'_, T, R> {
        let ig = IrqGuard::new();
        let g = self.lock();
        IrqMutex { _irq: ig, g }
    }
}

impl<T, R: RawLock + RawUnlock> core::ops::Deref for IrqMutex<'_, T, R> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.g
    }
}

impl<T, R: RawLock + RawUnlock> core::ops::DerefMut for IrqMutex<'_, T, R> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.g
    }
}
