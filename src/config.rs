//! # EdfOS Configuration
//!
//! Compile-time constants governing the scheduler and system behavior.
//! All limits are fixed at compile time; there is no dynamic allocation.

use static_assertions::const_assert;

use crate::thread::Ticks;

/// Maximum number of thread slots, including the idle thread and the
/// aperiodic server. Bounds the static thread table and the scheduler scan.
pub const MAX_THREADS: usize = 32;

/// SysTick frequency in Hz. One tick is the kernel's unit of time.
pub const TICK_HZ: u32 = 1000;

/// System clock frequency in Hz (STM32F103 at 72 MHz from the PLL).
pub const SYSTEM_CLOCK_HZ: u32 = 72_000_000;

/// Words in the synthetic exception-return frame: 8 hardware-stacked
/// registers (r0–r3, r12, lr, pc, xPSR) plus 8 software-saved (r4–r11).
pub const FRAME_WORDS: usize = 16;

/// Smallest stack a thread may be given: the initial frame plus a working
/// margin of the same size.
pub const MIN_STACK_WORDS: usize = 2 * FRAME_WORDS;

/// Stack size of the built-in idle thread.
pub const IDLE_STACK_WORDS: usize = 128;

/// Stack size of the built-in aperiodic server thread. Aperiodic jobs run on
/// this stack, so it has to fit the deepest job.
pub const SERVER_STACK_WORDS: usize = 256;

/// Storage slots of the aperiodic request ring. One slot is always kept free,
/// so at most `APERIODIC_QUEUE_SLOTS - 1` requests are pending at once.
pub const APERIODIC_QUEUE_SLOTS: usize = 16;

/// Pattern written over every unused stack word at thread creation.
pub const STACK_POISON: u32 = 0xDEAD_BEEF;

/// PendSV runs below everything else so a switch never delays an ISR.
pub const PENDSV_PRIORITY: u8 = 0xFF;

/// SysTick preempts every other kernel path.
pub const SYSTICK_PRIORITY: u8 = 0x00;

const_assert!(MAX_THREADS >= 2 && MAX_THREADS <= u8::MAX as usize);
const_assert!(MIN_STACK_WORDS > FRAME_WORDS);
const_assert!(IDLE_STACK_WORDS >= MIN_STACK_WORDS);
const_assert!(SERVER_STACK_WORDS >= MIN_STACK_WORDS);
const_assert!(APERIODIC_QUEUE_SLOTS >= 2);
const_assert!(1000 % TICK_HZ == 0 || TICK_HZ % 1000 == 0);

/// Convert milliseconds to kernel ticks.
#[inline]
pub const fn millis(ms: u32) -> Ticks {
    ms as Ticks * TICK_HZ as Ticks / 1000
}

/// Convert seconds to kernel ticks.
#[inline]
pub const fn seconds(s: u32) -> Ticks {
    s as Ticks * TICK_HZ as Ticks
}

/// Convert kernel ticks to milliseconds.
#[inline]
pub const fn ticks_to_millis(ticks: Ticks) -> u64 {
    ticks * 1000 / TICK_HZ as u64
}
