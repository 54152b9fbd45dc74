//! # Stack Frame Builder
//!
//! A thread that has never run is started the same way a preempted thread
//! is resumed: PendSV pops r4–r11 from its stack and the exception return
//! pops the hardware frame. So at creation we synthesize both halves.
//!
//! ## Initial Frame (top = high address, stack grows down)
//!
//! ```text
//! [8-byte aligned top]
//!   xPSR  (Thumb bit set)
//!   PC    (thread entry point)
//!   LR    (exit routine)
//!   R12   (12)
//!   R3    (3)
//!   R2    (2)
//!   R1    (1)
//!   R0    (0)
//!   R11   (11)
//!   ...
//!   R4    (4)          <- stack_pointer after init
//! [poison ... poison]  <- rest of the region
//! ```
//!
//! The general-purpose registers hold their own register number so a
//! debugger can tell at a glance whether the first switch into a thread
//! restored the right words.

use crate::config::{FRAME_WORDS, MIN_STACK_WORDS, STACK_POISON};
use crate::errors::{KernelError, KernelResult};

/// Word offsets inside the initial frame, relative to the saved stack pointer.
pub mod frame {
    pub const R4: usize = 0;
    pub const R11: usize = 7;
    pub const R0: usize = 8;
    pub const R3: usize = 11;
    pub const R12: usize = 12;
    pub const LR: usize = 13;
    pub const PC: usize = 14;
    pub const XPSR: usize = 15;

    /// xPSR with only the Thumb state bit set.
    pub const XPSR_THUMB: u32 = 1 << 24;
}

/// Write the initial frame for `entry` into `stack` and poison the rest.
///
/// Returns the word index of the frame, i.e. the value the thread's stack
/// pointer must hold before its first switch-in.
pub fn build_initial_frame(stack: &mut [u32], entry: u32, exit_routine: u32) -> KernelResult<usize> {
    if stack.len() < MIN_STACK_WORDS {
        return Err(KernelError::StackTooSmall {
            words: stack.len(),
            required: MIN_STACK_WORDS,
        });
    }

    // AAPCS wants an 8-byte aligned stack at exception return.
    let base = stack.as_ptr() as usize;
    let aligned_top = (base + stack.len() * 4) & !0x07;
    let top = (aligned_top - base) / 4;
    let sp = top - FRAME_WORDS;

    stack.fill(STACK_POISON);

    let words = &mut stack[sp..top];
    for (i, reg) in (frame::R4..=frame::R11).enumerate() {
        words[reg] = 4 + i as u32;
    }
    for (i, reg) in (frame::R0..=frame::R3).enumerate() {
        words[reg] = i as u32;
    }
    words[frame::R12] = 12;
    words[frame::LR] = exit_routine;
    // Exception return takes the PC without the interworking bit.
    words[frame::PC] = entry & !1;
    words[frame::XPSR] = frame::XPSR_THUMB;

    Ok(sp)
}

/// Number of words at the low end of a stack that were never written since
/// it was poisoned.
pub fn unused_words<I>(words: I) -> usize
where
    I: IntoIterator<Item = u32>,
{
    words.into_iter().take_while(|&w| w == STACK_POISON).count()
}
