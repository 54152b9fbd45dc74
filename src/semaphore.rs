//! # Semaphore
//!
//! Counting semaphore with a bounded maximum, protected by global interrupt
//! masking rather than a per-object lock.
//!
//! ## Non-preemptive protocol
//!
//! `wait` returns with interrupts still masked: the caller is inside a
//! critical section until its matching `signal`, which unmasks. While the
//! resource is held no tick and no PendSV can run, so the holder can't be
//! preempted by another user of the resource. The price is that the section
//! is global and non-reentrant:
//!
//! - never call `wait` twice without an intervening `signal`
//! - never `delay`/`yield` while holding it
//!
//! Other kernel calls are fine while holding: their sections restore the
//! masked state on exit instead of unmasking.
//!
//! When the count is zero, `wait` spins cooperatively: unmask, yield one
//! tick, mask, re-check. The worst-case wait is therefore bounded by the
//! schedule, not by an opaque blocking call.

use core::cell::Cell;

use cortex_m::interrupt::{self, Mutex};

use crate::errors::{KernelError, KernelResult};
use crate::port::Port;
use crate::sync::CriticalSection;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Counts {
    maximum: u32,
    current: u32,
}

pub struct Semaphore {
    counts: Mutex<Cell<Option<Counts>>>,
}

impl Semaphore {
    /// A semaphore that must be `init`-ed before use. Suitable for statics.
    pub const fn uninit() -> Self {
        Self {
            counts: Mutex::new(Cell::new(None)),
        }
    }

    /// Set the bounds and the starting value. `start` may not exceed `maximum`.
    pub fn init_with<P: Port>(&self, port: &P, maximum: u32, start: u32) -> KernelResult<()> {
        if start > maximum {
            return Err(KernelError::InvalidSemaphore { maximum, start });
        }
        let cs = CriticalSection::enter(port);
        self.counts
            .borrow(cs.token())
            .set(Some(Counts { maximum, current: start }));
        Ok(())
    }

    fn counts(&self, cs: &interrupt::CriticalSection) -> KernelResult<Counts> {
        self.counts
            .borrow(cs)
            .get()
            .ok_or(KernelError::SemaphoreUninitialized)
    }

    /// Decrement if available. Caller already holds the critical section.
    pub fn try_take(&self, cs: &interrupt::CriticalSection) -> KernelResult<bool> {
        let mut counts = self.counts(cs)?;
        if counts.current == 0 {
            return Ok(false);
        }
        counts.current -= 1;
        self.counts.borrow(cs).set(Some(counts));
        Ok(true)
    }

    /// Increment unless already at the maximum. Caller holds the critical section.
    pub fn give(&self, cs: &interrupt::CriticalSection) -> KernelResult<()> {
        let mut counts = self.counts(cs)?;
        if counts.current < counts.maximum {
            counts.current += 1;
            self.counts.borrow(cs).set(Some(counts));
        }
        Ok(())
    }

    /// Acquire, yielding through `yield_now` while the count is zero.
    /// Returns with interrupts masked (non-preemptive protocol).
    pub fn wait_with<P, Y>(&self, port: &P, mut yield_now: Y) -> KernelResult<()>
    where
        P: Port,
        Y: FnMut(),
    {
        let mut cs = CriticalSection::enter(port);
        while !self.try_take(cs.token())? {
            drop(cs);
            yield_now();
            cs = CriticalSection::enter(port);
        }
        cs.hold();
        Ok(())
    }

    /// Release and close the critical section opened by `wait_with`.
    pub fn signal_with<P: Port>(&self, port: &P) -> KernelResult<()> {
        let result = {
            let cs = CriticalSection::enter(port);
            self.give(cs.token())
        };
        port.unmask_interrupts();
        result
    }

    /// Acquire only if available right now. Does not keep interrupts masked.
    pub fn try_wait_with<P: Port>(&self, port: &P) -> KernelResult<bool> {
        let cs = CriticalSection::enter(port);
        self.try_take(cs.token())
    }

    pub fn value_with<P: Port>(&self, port: &P) -> KernelResult<u32> {
        let cs = CriticalSection::enter(port);
        Ok(self.counts(cs.token())?.current)
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::sim::SimPort;

    #[test]
    fn test_init_rejects_start_above_maximum() {
        let port = SimPort::new();
        let sem = Semaphore::uninit();
        assert_eq!(
            sem.init_with(&port, 1, 2),
            Err(KernelError::InvalidSemaphore { maximum: 1, start: 2 })
        );
        assert_eq!(sem.value_with(&port), Err(KernelError::SemaphoreUninitialized));
    }

    #[test]
    fn test_uninitialized_use_is_an_error_and_unmasks() {
        let port = SimPort::new();
        let sem = Semaphore::uninit();
        assert_eq!(sem.wait_with(&port, || {}), Err(KernelError::SemaphoreUninitialized));
        assert!(!port.is_masked());
        assert_eq!(sem.signal_with(&port), Err(KernelError::SemaphoreUninitialized));
    }

    #[test]
    fn test_wait_keeps_interrupts_masked_until_signal() {
        let port = SimPort::new();
        let sem = Semaphore::uninit();
        sem.init_with(&port, 1, 1).unwrap();

        sem.wait_with(&port, || panic!("must not yield when available")).unwrap();
        assert!(port.is_masked());
        assert_eq!(sem.value_with(&port).unwrap(), 0);
        assert!(port.is_masked());

        sem.signal_with(&port).unwrap();
        assert!(!port.is_masked());
        assert_eq!(sem.value_with(&port).unwrap(), 1);
    }

    #[test]
    fn test_kernel_reads_while_holding_keep_interrupts_masked() {
        let port = SimPort::new();
        let sem = Semaphore::uninit();
        sem.init_with(&port, 1, 1).unwrap();

        sem.wait_with(&port, || unreachable!()).unwrap();
        assert_eq!(crate::sync::critical_section(&port, |_cs| 42), 42);
        assert!(sem.try_wait_with(&port).is_ok());
        assert!(port.is_masked());

        sem.signal_with(&port).unwrap();
        assert!(!port.is_masked());
    }

    #[test]
    fn test_signal_saturates_at_maximum() {
        let port = SimPort::new();
        let sem = Semaphore::uninit();
        sem.init_with(&port, 2, 2).unwrap();
        sem.signal_with(&port).unwrap();
        assert_eq!(sem.value_with(&port).unwrap(), 2);
    }

    #[test]
    fn test_wait_yields_with_interrupts_unmasked_until_available() {
        let port = SimPort::new();
        let sem = Semaphore::uninit();
        sem.init_with(&port, 3, 0).unwrap();

        let yields = Cell::new(0);
        sem.wait_with(&port, || {
            assert!(!port.is_masked(), "yield must run with interrupts enabled");
            yields.set(yields.get() + 1);
            if yields.get() == 3 {
                sem.signal_with(&port).unwrap();
            }
        })
        .unwrap();

        assert_eq!(yields.get(), 3);
        assert!(port.is_masked());
        let cs = CriticalSection::enter(&port);
        assert!(!sem.try_take(cs.token()).unwrap(), "the one signal was consumed");
    }

    #[test]
    fn test_two_threads_alternating_never_both_inside() {
        let port = SimPort::new();
        let sem = Semaphore::uninit();
        sem.init_with(&port, 1, 1).unwrap();
        let inside = Cell::new(0u32);

        for round in 0..20 {
            // Thread A acquires.
            sem.wait_with(&port, || unreachable!()).unwrap();
            inside.set(inside.get() + 1);
            assert_eq!(inside.get(), 1);

            // Thread B contends; each of its yields lets A run, and A
            // releases on the second one.
            let mut b_yields = 0;
            let a_release = || {
                inside.set(inside.get() - 1);
                sem.signal_with(&port).unwrap();
            };
            let mut a_release = Some(a_release);
            sem.wait_with(&port, || {
                b_yields += 1;
                assert_eq!(inside.get(), 1, "round {}: B spinning while A holds", round);
                if b_yields == 2 {
                    (a_release.take().unwrap())();
                }
            })
            .unwrap();
            inside.set(inside.get() + 1);
            assert_eq!(inside.get(), 1, "round {}: both inside", round);

            inside.set(inside.get() - 1);
            sem.signal_with(&port).unwrap();
        }
        assert_eq!(sem.value_with(&port).unwrap(), 1);
    }
}
