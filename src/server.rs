//! # Aperiodic Admission Server
//!
//! Sporadic work (typically triggered from an interrupt, e.g. a button
//! edge) is turned into something EDF can reason about with a
//! total-bandwidth server:
//!
//! ```text
//! d_k = max(now, d_{k-1}) + C_k * inverse_bandwidth
//! ```
//!
//! `d_{k-1}` is the deadline handed to the previous accepted request,
//! whether or not it has been served yet, so a burst of requests is spread
//! out at the reserved bandwidth instead of stealing time from periodic
//! threads. Requests wait in a bounded FIFO; a full queue rejects the
//! request and the caller drops it.
//!
//! The server itself is an ordinary thread slot (`Role::Server`); the
//! scheduler arms it from the queue head, see `Scheduler::schedule`.

use crate::config::APERIODIC_QUEUE_SLOTS;
use crate::errors::{KernelError, KernelResult};
use crate::thread::{ThreadEntry, Ticks};

/// One unit of sporadic work.
#[derive(Debug, Clone, Copy)]
pub struct AperiodicRequest {
    pub entry: ThreadEntry,
    pub computation_time: Ticks,
    pub absolute_deadline: Ticks,
}

// ---------------------------------------------------------------------------
// Request ring
// ---------------------------------------------------------------------------

/// Bounded FIFO ring with `SLOTS` storage slots.
///
/// Full and empty are told apart by the head/tail indices alone: the ring is
/// full when advancing `tail` would reach `head`, so one slot is never
/// filled and the ring holds at most `SLOTS - 1` requests.
pub struct AperiodicQueue<const SLOTS: usize> {
    slots: [Option<AperiodicRequest>; SLOTS],
    head: usize,
    tail: usize,
}

impl<const SLOTS: usize> AperiodicQueue<SLOTS> {
    const EMPTY: Option<AperiodicRequest> = None;

    pub const fn new() -> Self {
        Self {
            slots: [Self::EMPTY; SLOTS],
            head: 0,
            tail: 0,
        }
    }

    /// Maximum number of pending requests.
    pub const fn capacity(&self) -> usize {
        SLOTS - 1
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.head == self.tail
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        (self.tail + 1) % SLOTS == self.head
    }

    pub fn len(&self) -> usize {
        (self.tail + SLOTS - self.head) % SLOTS
    }

    /// Append a request. Hands it back if the ring is full.
    pub fn push(&mut self, request: AperiodicRequest) -> Result<(), AperiodicRequest> {
        if self.is_full() {
            return Err(request);
        }
        self.slots[self.tail] = Some(request);
        self.tail = (self.tail + 1) % SLOTS;
        Ok(())
    }

    pub fn pop(&mut self) -> Option<AperiodicRequest> {
        if self.is_empty() {
            return None;
        }
        let request = self.slots[self.head].take();
        self.head = (self.head + 1) % SLOTS;
        request
    }

    pub fn peek(&self) -> Option<&AperiodicRequest> {
        if self.is_empty() {
            return None;
        }
        self.slots[self.head].as_ref()
    }
}

impl<const SLOTS: usize> Default for AperiodicQueue<SLOTS> {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Bandwidth
// ---------------------------------------------------------------------------

/// Reciprocal of the processor share reserved for aperiodic work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bandwidth {
    inverse: u32,
}

impl Bandwidth {
    /// `inverse` ticks of deadline per tick of computation. Must be at least 1.
    pub const fn from_inverse(inverse: u32) -> KernelResult<Self> {
        if inverse == 0 {
            return Err(KernelError::InvalidBandwidth);
        }
        Ok(Self { inverse })
    }

    /// Server gets what the periodic threads leave: `1 / (1 - U)` with
    /// `U = percent / 100`, rounded up so the server never over-claims.
    pub const fn from_periodic_utilization(percent: u32) -> KernelResult<Self> {
        if percent >= 100 {
            return Err(KernelError::InvalidBandwidth);
        }
        let free = 100 - percent;
        Ok(Self {
            inverse: (100 + free - 1) / free,
        })
    }

    #[inline]
    pub const fn inverse(self) -> u32 {
        self.inverse
    }
}

// ---------------------------------------------------------------------------
// Admission
// ---------------------------------------------------------------------------

/// Request queue plus the deadline chain of the total-bandwidth rule.
pub struct AdmissionServer<const SLOTS: usize = APERIODIC_QUEUE_SLOTS> {
    queue: AperiodicQueue<SLOTS>,
    bandwidth: Bandwidth,
    last_deadline: Ticks,
}

impl<const SLOTS: usize> AdmissionServer<SLOTS> {
    pub const fn new(bandwidth: Bandwidth) -> Self {
        Self {
            queue: AperiodicQueue::new(),
            bandwidth,
            last_deadline: 0,
        }
    }

    pub fn bandwidth(&self) -> Bandwidth {
        self.bandwidth
    }

    /// Deadline given to the most recently accepted request.
    pub fn last_deadline(&self) -> Ticks {
        self.last_deadline
    }

    pub fn queue(&self) -> &AperiodicQueue<SLOTS> {
        &self.queue
    }

    /// Admit a request arriving at `now`. Returns the assigned request, or
    /// `None` without touching any state if the queue is full.
    pub fn admit(&mut self, entry: ThreadEntry, computation_time: Ticks, now: Ticks) -> Option<AperiodicRequest> {
        if self.queue.is_full() {
            return None;
        }
        let absolute_deadline = now
            .max(self.last_deadline)
            .saturating_add(computation_time.saturating_mul(Ticks::from(self.bandwidth.inverse)));
        let request = AperiodicRequest {
            entry,
            computation_time,
            absolute_deadline,
        };
        self.queue.push(request).ok()?;
        self.last_deadline = absolute_deadline;
        Some(request)
    }

    pub fn head(&self) -> Option<&AperiodicRequest> {
        self.queue.peek()
    }

    pub fn take(&mut self) -> Option<AperiodicRequest> {
        self.queue.pop()
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------
