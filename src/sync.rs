//! # Synchronization Primitives
//!
//! Interrupt-masking critical sections. Masking all interrupts is the only
//! lock in EdfOS: every read-modify-write of the thread table, the run/next
//! indices, the aperiodic queue or a semaphore happens inside one.
//!
//! [`CriticalSection`] is a scope type: it masks on creation and restores
//! the previous mask state when dropped, so early returns and `?` can't
//! leave interrupts disabled.
//! The one deliberate exception is [`CriticalSection::hold`], used by the
//! semaphore's non-preemptive protocol to keep the section open until the
//! matching `signal()`.
//!
//! Sections nest like `cortex_m::interrupt::free`: one opened while
//! interrupts are already masked leaves them masked when it closes. That
//! includes the section held by a semaphore holder.

use core::mem;

use cortex_m::interrupt;

use crate::port::Port;

/// An open interrupt-masked section over `port`.
pub struct CriticalSection<'p, P: Port> {
    port: &'p P,
    token: interrupt::CriticalSection,
    was_masked: bool,
}

impl<'p, P: Port> CriticalSection<'p, P> {
    /// Mask interrupts and open the section.
    #[inline]
    pub fn enter(port: &'p P) -> Self {
        let was_masked = port.interrupts_masked();
        port.mask_interrupts();
        Self {
            port,
            // Safety: interrupts are masked for as long as this value lives.
            token: unsafe { interrupt::CriticalSection::new() },
            was_masked,
        }
    }

    /// Token for `cortex_m::interrupt::Mutex::borrow`.
    #[inline]
    pub fn token(&self) -> &interrupt::CriticalSection {
        &self.token
    }

    /// Leave interrupts masked past the end of this scope.
    #[inline]
    pub fn hold(self) {
        mem::forget(self);
    }
}

impl<P: Port> Drop for CriticalSection<'_, P> {
    #[inline]
    fn drop(&mut self) {
        if !self.was_masked {
            self.port.unmask_interrupts();
        }
    }
}

/// Execute a closure within a critical section (interrupts masked).
///
/// # Usage
/// ```ignore
/// sync::critical_section(&port, |cs| {
///     // Access shared state safely
/// });
/// ```
#[inline]
pub fn critical_section<P, F, R>(port: &P, f: F) -> R
where
    P: Port,
    F: FnOnce(&interrupt::CriticalSection) -> R,
{
    let cs = CriticalSection::enter(port);
    f(cs.token())
}
