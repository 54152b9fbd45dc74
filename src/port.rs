//! # Hardware Port
//!
//! The kernel reaches the hardware only through [`Port`]. Everything the
//! scheduler reasons about (deadlines, slots, the aperiodic queue) is plain
//! data; the port supplies the four primitives the kernel consumes:
//!
//! - a latched, lowest-priority reschedule request (PendSV on Cortex-M)
//! - global interrupt mask / unmask, and a query of the current mask state
//! - the address of the routine a thread body returns into
//! - the fatal handler for structural errors
//!
//! plus two optional observability hooks (trace records, debug pins).
//!
//! The Cortex-M3 implementation lives in `arch::cortex_m3`. Host tests use
//! [`sim::SimPort`].

use crate::errors::KernelError;
use crate::trace::TraceEvent;

pub trait Port {
    /// Pend a context switch. Taken once interrupts are unmasked and no
    /// other exception is active.
    fn request_context_switch(&self);

    fn mask_interrupts(&self);

    fn unmask_interrupts(&self);

    /// `true` while interrupts are globally masked.
    fn interrupts_masked(&self) -> bool;

    /// Value placed in the link register of every fresh thread frame.
    fn exit_routine(&self) -> u32;

    /// Report an unrecoverable kernel error. Never returns.
    fn fatal(&self, error: KernelError) -> !;

    fn trace(&self, _event: TraceEvent) {}

    fn write_debug_pin(&self, _pin: u8, _high: bool) {}
}
