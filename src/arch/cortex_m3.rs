//! # Cortex-M3 Port Layer
//!
//! Hardware-specific code for the ARM Cortex-M3 (Thumb-2, STM32F103).
//! Implements [`Port`] for the kernel, the PendSV context-switch trampoline,
//! SysTick configuration and the tick handler.
//!
//! ## Context Switch Mechanism
//!
//! Threads run in Thread mode on the PSP; the kernel and exception handlers
//! use the MSP. On exception entry the hardware stacks r0–r3, r12, lr, pc
//! and xPSR onto the PSP. PendSV saves and restores the remaining r4–r11,
//! which completes the context.
//!
//! `start()` writes 0 into the PSP before the first switch, so the
//! trampoline can tell "no thread was running" from a real context and skip
//! the save.
//!
//! ## Interrupt Priorities
//!
//! - SysTick: 0x00 (highest), the time base is never late
//! - PendSV: 0xFF (lowest), a switch only happens once every other
//!   handler has finished

use core::arch::naked_asm;

use cortex_m::interrupt;
use cortex_m::peripheral::scb::SystemHandler;
use cortex_m::peripheral::syst::SystClkSource;
use cortex_m::peripheral::{SCB, SYST};
use cortex_m::register::primask;
use cortex_m_rt::exception;

use crate::config::{PENDSV_PRIORITY, SYSTEM_CLOCK_HZ, SYSTICK_PRIORITY, TICK_HZ};
use crate::errors::KernelError;
use crate::port::Port;
use crate::trace::TraceEvent;

/// SysTick reload value for one kernel tick.
pub const SYSTICK_RELOAD: u32 = SYSTEM_CLOCK_HZ / TICK_HZ - 1;

// ---------------------------------------------------------------------------
// Port implementation
// ---------------------------------------------------------------------------

/// The kernel's view of the Cortex-M3 core, plus the application hooks
/// handed over in `KernelConfig`.
#[derive(Clone, Copy)]
pub struct CortexM3 {
    fatal_handler: fn(KernelError) -> !,
    trace_sink: Option<fn([u8; 2])>,
    debug_pin: Option<fn(u8, bool)>,
}

impl CortexM3 {
    pub const fn new(
        fatal_handler: fn(KernelError) -> !,
        trace_sink: Option<fn([u8; 2])>,
        debug_pin: Option<fn(u8, bool)>,
    ) -> Self {
        Self {
            fatal_handler,
            trace_sink,
            debug_pin,
        }
    }
}

impl Port for CortexM3 {
    /// Sets PENDSVSET in the ICSR.
    #[inline]
    fn request_context_switch(&self) {
        SCB::set_pendsv();
        cortex_m::asm::dsb();
    }

    #[inline]
    fn mask_interrupts(&self) {
        interrupt::disable();
    }

    #[inline]
    fn unmask_interrupts(&self) {
        // Safety: the kernel only unmasks when closing a section it opened.
        unsafe { interrupt::enable() };
    }

    #[inline]
    fn interrupts_masked(&self) -> bool {
        primask::read().is_inactive()
    }

    fn exit_routine(&self) -> u32 {
        crate::kernel::thread_return as usize as u32
    }

    fn fatal(&self, error: KernelError) -> ! {
        interrupt::disable();
        (self.fatal_handler)(error)
    }

    fn trace(&self, event: TraceEvent) {
        if let Some(sink) = self.trace_sink {
            sink(event.encode());
        }
    }

    fn write_debug_pin(&self, pin: u8, high: bool) {
        if let Some(write) = self.debug_pin {
            write(pin, high);
        }
    }
}

// ---------------------------------------------------------------------------
// Time base & priorities
// ---------------------------------------------------------------------------

/// Configure SysTick to fire at `TICK_HZ` from the core clock.
pub fn configure_systick(syst: &mut SYST) {
    syst.set_reload(SYSTICK_RELOAD);
    syst.clear_current();
    syst.set_clock_source(SystClkSource::Core);
    syst.enable_counter();
    syst.enable_interrupt();
}

/// PendSV at the lowest priority, SysTick at the highest.
pub fn set_interrupt_priorities(scb: &mut SCB) {
    // Safety: called before the scheduler starts; no priority-based critical
    // section can be in progress.
    unsafe {
        scb.set_priority(SystemHandler::PendSV, PENDSV_PRIORITY);
        scb.set_priority(SystemHandler::SysTick, SYSTICK_PRIORITY);
    }
}

/// Mark "no thread running" for the first trampoline pass.
pub fn clear_process_stack() {
    // Safety: nothing runs on the PSP before the first switch.
    unsafe { cortex_m::register::psp::write(0) };
}

// ---------------------------------------------------------------------------
// PendSV handler (context switch)
// ---------------------------------------------------------------------------

/// PendSV exception handler, the context-switch trampoline.
///
/// ## Sequence
/// 1. Mask interrupts
/// 2. If a thread was running (PSP non-null), push r4–r11 onto its stack
/// 3. `pendsv_switch(sp)` records that pointer and returns the next
///    thread's saved stack pointer
/// 4. Pop r4–r11 from the new stack and load it into the PSP
/// 5. Unmask and return to Thread mode on the PSP (EXC_RETURN 0xFFFFFFFD)
///
/// # Safety
/// Called by the NVIC only. Must not touch r4–r11 before they are saved.
#[unsafe(no_mangle)]
#[unsafe(naked)]
pub unsafe extern "C" fn PendSV() {
    naked_asm!(
        "cpsid i",
        "mrs r0, psp",
        "cbz r0, 1f",
        "stmdb r0!, {{r4-r11}}",
        "1:",
        "bl {switch}",
        "ldmia r0!, {{r4-r11}}",
        "msr psp, r0",
        "cpsie i",
        "ldr lr, =0xFFFFFFFD",
        "bx lr",
        switch = sym pendsv_switch,
    );
}

/// Bookkeeping half of the trampoline. Runs with interrupts masked.
extern "C" fn pendsv_switch(saved_sp: *mut u32) -> *mut u32 {
    crate::kernel::switch_from_trampoline(saved_sp)
}

// ---------------------------------------------------------------------------
// SysTick handler
// ---------------------------------------------------------------------------

#[exception]
fn SysTick() {
    crate::kernel::on_tick();
}
