//! # Thread Descriptor & Table
//!
//! Defines the thread model for EdfOS. A thread is a statically-allocated
//! entity with its own stack and EDF timing attributes:
//!
//! - **Periodic** threads (`period > 0`) are re-activated every period:
//!   when the body returns, `activation_time` advances by `period` and the
//!   body is entered again once the new activation is reached.
//! - **Run-once** threads (`period == 0`) leave the table when the body
//!   returns.
//!
//! The idle thread and the aperiodic server live in the same table with
//! their own [`Role`], so every "pointer" in the kernel is a [`ThreadId`]
//! index into one arena.

use core::ptr::{self, NonNull};

use crate::config::MAX_THREADS;
use crate::errors::{KernelError, KernelResult};
use crate::stack;

/// Kernel time, in ticks since `start()`. 64 bits wide so the counter
/// never wraps within the life of a device.
pub type Ticks = u64;

/// Activation time of a thread that is not requesting the CPU.
pub const NEVER: Ticks = Ticks::MAX;

/// Thread body. Returning from it ends the current job.
pub type ThreadEntry = extern "C" fn();

/// Stable index of a thread in the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ThreadId(u8);

impl ThreadId {
    pub const fn new(index: usize) -> Self {
        Self(index as u8)
    }

    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// What the scheduler does with a thread besides comparing deadlines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Registered by the application; periodic or run-once.
    Application,
    /// Runs queued aperiodic requests; deadline derived from the queue head.
    Server,
    /// Runs when nothing else is eligible. Never exits.
    Idle,
}

// ---------------------------------------------------------------------------
// Thread configuration (immutable after creation)
// ---------------------------------------------------------------------------

/// Static parameters of a thread, set at registration.
#[derive(Debug, Clone, Copy)]
pub struct ThreadConfig {
    pub entry: ThreadEntry,
    /// Deadline in ticks from the start of each period.
    pub relative_deadline: Ticks,
    /// `0` makes the thread run-once.
    pub period: Ticks,
    /// Worst-case execution budget. Informational for application threads.
    pub computation_time: Ticks,
    /// Output driven high while the thread runs.
    pub debug_pin: Option<u8>,
}

impl ThreadConfig {
    /// Periodic thread whose deadline equals its period.
    pub const fn periodic(entry: ThreadEntry, period: Ticks) -> Self {
        Self {
            entry,
            relative_deadline: period,
            period,
            computation_time: 0,
            debug_pin: None,
        }
    }

    /// Thread that runs its body once and is then removed.
    pub const fn once(entry: ThreadEntry, relative_deadline: Ticks) -> Self {
        Self {
            entry,
            relative_deadline,
            period: 0,
            computation_time: 0,
            debug_pin: None,
        }
    }

    pub const fn with_deadline(mut self, relative_deadline: Ticks) -> Self {
        self.relative_deadline = relative_deadline;
        self
    }

    pub const fn with_computation_time(mut self, computation_time: Ticks) -> Self {
        self.computation_time = computation_time;
        self
    }

    pub const fn with_debug_pin(mut self, pin: u8) -> Self {
        self.debug_pin = Some(pin);
        self
    }
}

/// Execution accounting snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThreadStats {
    pub jobs_completed: u32,
    pub deadline_misses: u32,
    pub unused_stack_words: usize,
}

// ---------------------------------------------------------------------------
// Thread descriptor
// ---------------------------------------------------------------------------

pub struct Thread {
    id: ThreadId,
    role: Role,
    entry: ThreadEntry,
    debug_pin: Option<u8>,

    /// Stack region, owned exclusively by this descriptor.
    stack: NonNull<[u32]>,

    /// Saved process stack pointer. Written at creation and by the
    /// trampoline bookkeeping only.
    pub(crate) stack_pointer: *mut u32,

    pub computation_time: Ticks,
    pub relative_deadline: Ticks,
    pub period: Ticks,

    /// Start of the current period.
    pub activation_time: Ticks,
    /// End of the current voluntary delay.
    pub delayed_until: Ticks,

    pub jobs_completed: u32,
    pub deadline_misses: u32,
}

// Safety: the raw pointers point into the thread's own stack region, which
// the descriptor owns for `'static`. Descriptors are only touched with
// interrupts masked.
unsafe impl Send for Thread {}
unsafe impl Sync for Thread {}

impl Thread {
    /// Build a descriptor and its initial stack frame.
    pub fn new(
        id: ThreadId,
        role: Role,
        stack: &'static mut [u32],
        config: ThreadConfig,
        exit_routine: u32,
        now: Ticks,
    ) -> KernelResult<Self> {
        let sp = stack::build_initial_frame(stack, config.entry as usize as u32, exit_routine)?;
        let stack_pointer = stack[sp..].as_mut_ptr();

        Ok(Self {
            id,
            role,
            entry: config.entry,
            debug_pin: config.debug_pin,
            stack: NonNull::from(stack),
            stack_pointer,
            computation_time: config.computation_time,
            relative_deadline: config.relative_deadline,
            period: config.period,
            activation_time: now,
            delayed_until: now,
            jobs_completed: 0,
            deadline_misses: 0,
        })
    }

    #[inline]
    pub fn id(&self) -> ThreadId {
        self.id
    }

    #[inline]
    pub fn role(&self) -> Role {
        self.role
    }

    #[inline]
    pub fn entry(&self) -> ThreadEntry {
        self.entry
    }

    #[inline]
    pub fn debug_pin(&self) -> Option<u8> {
        self.debug_pin
    }

    #[inline]
    pub fn stack_pointer(&self) -> *mut u32 {
        self.stack_pointer
    }

    #[inline]
    pub fn is_periodic(&self) -> bool {
        self.period > 0
    }

    /// `activation_time + relative_deadline`, saturating so that a late
    /// activation never wraps around to look urgent.
    #[inline]
    pub fn absolute_deadline(&self) -> Ticks {
        self.activation_time.saturating_add(self.relative_deadline)
    }

    #[inline]
    pub fn is_eligible(&self, now: Ticks) -> bool {
        now >= self.activation_time && now >= self.delayed_until
    }

    /// For the server: whether it currently requests CPU time.
    #[inline]
    pub fn is_armed(&self) -> bool {
        self.activation_time != NEVER
    }

    pub(crate) fn disarm(&mut self) {
        self.activation_time = NEVER;
        self.delayed_until = NEVER;
    }

    pub fn stack_words(&self) -> usize {
        self.stack.len()
    }

    /// Read one word of the stack region, lowest address first.
    pub fn stack_word(&self, index: usize) -> Option<u32> {
        if index >= self.stack.len() {
            return None;
        }
        // Safety: in bounds of the region this descriptor owns. Volatile
        // because the processor writes it behind the compiler's back.
        Some(unsafe { ptr::read_volatile(self.stack.as_ptr().cast::<u32>().add(index)) })
    }

    /// High-water mark: words at the bottom of the stack never touched.
    pub fn unused_stack_words(&self) -> usize {
        stack::unused_words((0..self.stack.len()).filter_map(|i| self.stack_word(i)))
    }

    pub fn stats(&self) -> ThreadStats {
        ThreadStats {
            jobs_completed: self.jobs_completed,
            deadline_misses: self.deadline_misses,
            unused_stack_words: self.unused_stack_words(),
        }
    }
}

// ---------------------------------------------------------------------------
// Thread table
// ---------------------------------------------------------------------------

/// Fixed-capacity arena of thread descriptors indexed by [`ThreadId`].
pub struct ThreadTable {
    slots: [Option<Thread>; MAX_THREADS],
}

impl ThreadTable {
    const EMPTY: Option<Thread> = None;

    pub const fn new() -> Self {
        Self {
            slots: [Self::EMPTY; MAX_THREADS],
        }
    }

    /// Store the thread built by `build` in the first free slot.
    pub fn insert<F>(&mut self, build: F) -> KernelResult<ThreadId>
    where
        F: FnOnce(ThreadId) -> KernelResult<Thread>,
    {
        let index = self
            .slots
            .iter()
            .position(Option::is_none)
            .ok_or(KernelError::ThreadTableFull)?;
        let id = ThreadId::new(index);
        self.slots[index] = Some(build(id)?);
        Ok(id)
    }

    pub fn remove(&mut self, id: ThreadId) -> Option<Thread> {
        self.slots.get_mut(id.index())?.take()
    }

    #[inline]
    pub fn get(&self, id: ThreadId) -> Option<&Thread> {
        self.slots.get(id.index())?.as_ref()
    }

    #[inline]
    pub fn get_mut(&mut self, id: ThreadId) -> Option<&mut Thread> {
        self.slots.get_mut(id.index())?.as_mut()
    }

    /// Occupied slots in index order.
    pub fn iter(&self) -> impl Iterator<Item = &Thread> {
        self.slots.iter().filter_map(Option::as_ref)
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ThreadTable {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------
