//! # Scheduler
//!
//! Earliest-deadline-first scheduling over the thread table, plus the
//! lifecycle transitions that feed it (tick, delay, exit) and the
//! bookkeeping half of the context switch.
//!
//! ## Scheduling Algorithm
//!
//! `schedule()` runs with interrupts masked, on every tick and at every
//! voluntary suspension point:
//! 1. **Arm the server**: if aperiodic work is queued and the server is
//!    idle, make it eligible now with the queue head's absolute deadline
//! 2. **Scan**: among occupied slots with `now >= activation_time` and
//!    `now >= delayed_until`, pick the smallest
//!    `activation_time + relative_deadline`; on ties the lowest slot wins
//! 3. **Fallback**: nothing eligible selects the idle thread
//! 4. **Request**: if the pick differs from the running thread, record it
//!    as `next` and pend a context switch; otherwise do nothing
//!
//! The scan is O(`MAX_THREADS`) over a fixed array with no allocation, so
//! its worst case is known up front.
//!
//! ## Tie-break
//!
//! Equal absolute deadlines resolve to the lowest slot index. It is a
//! fixed, reproducible rule and not a fairness guarantee.

use core::ptr;

use log::{debug, trace, warn};

use crate::errors::{KernelError, KernelResult};
use crate::port::Port;
use crate::server::{AdmissionServer, AperiodicRequest, Bandwidth};
use crate::thread::{Role, Thread, ThreadConfig, ThreadEntry, ThreadId, ThreadTable, Ticks, NEVER};
use crate::trace::TraceEvent;

// ---------------------------------------------------------------------------
// Scheduler struct
// ---------------------------------------------------------------------------

/// The central kernel state: thread table, run/next indices, time base and
/// the aperiodic admission server. One instance is built by `kernel_init`.
pub struct Scheduler<P: Port> {
    port: P,

    threads: ThreadTable,

    /// Thread whose context is on the CPU.
    current: Option<ThreadId>,

    /// Thread the trampoline switches to next.
    next: Option<ThreadId>,

    idle: Option<ThreadId>,

    server_thread: Option<ThreadId>,

    admission: AdmissionServer,

    /// Monotonic tick counter.
    now: Ticks,
}

impl<P: Port> Scheduler<P> {
    pub const fn new(port: P, bandwidth: Bandwidth) -> Self {
        Self {
            port,
            threads: ThreadTable::new(),
            current: None,
            next: None,
            idle: None,
            server_thread: None,
            admission: AdmissionServer::new(bandwidth),
            now: 0,
        }
    }

    #[inline]
    pub fn port(&self) -> &P {
        &self.port
    }

    #[inline]
    pub fn now(&self) -> Ticks {
        self.now
    }

    #[inline]
    pub fn current(&self) -> Option<ThreadId> {
        self.current
    }

    #[inline]
    pub fn next(&self) -> Option<ThreadId> {
        self.next
    }

    pub fn idle_thread(&self) -> Option<ThreadId> {
        self.idle
    }

    pub fn server_thread(&self) -> Option<ThreadId> {
        self.server_thread
    }

    pub fn thread(&self, id: ThreadId) -> Option<&Thread> {
        self.threads.get(id)
    }

    #[cfg(test)]
    pub(crate) fn thread_mut(&mut self, id: ThreadId) -> Option<&mut Thread> {
        self.threads.get_mut(id)
    }

    pub fn threads(&self) -> &ThreadTable {
        &self.threads
    }

    pub fn admission(&self) -> &AdmissionServer {
        &self.admission
    }

    // -----------------------------------------------------------------------
    // Registration
    // -----------------------------------------------------------------------

    /// Register an application thread in the first free slot.
    ///
    /// # Returns
    /// - `Ok(id)`: the slot the thread occupies
    /// - `Err(ThreadTableFull)`: no free slot
    /// - `Err(StackTooSmall)`: the stack can't hold the initial frame
    pub fn add_thread(&mut self, stack: &'static mut [u32], config: ThreadConfig) -> KernelResult<ThreadId> {
        let id = self.register(Role::Application, stack, config)?;
        debug!(
            "thread {} added: deadline={} period={}",
            id.index(),
            config.relative_deadline,
            config.period
        );
        Ok(id)
    }

    /// Register the thread that runs when nothing else is eligible.
    /// Its body must never return.
    pub fn install_idle(&mut self, stack: &'static mut [u32], entry: ThreadEntry) -> KernelResult<ThreadId> {
        if self.idle.is_some() {
            return Err(KernelError::AlreadyInitialized);
        }
        let id = self.register(Role::Idle, stack, ThreadConfig::once(entry, NEVER))?;
        self.idle = Some(id);
        Ok(id)
    }

    /// Register the aperiodic server thread. Its body serves one request per
    /// dispatch, see [`Scheduler::take_aperiodic`].
    pub fn install_server(&mut self, stack: &'static mut [u32], entry: ThreadEntry) -> KernelResult<ThreadId> {
        if self.server_thread.is_some() {
            return Err(KernelError::AlreadyInitialized);
        }
        let id = self.register(Role::Server, stack, ThreadConfig::once(entry, 0))?;
        if let Some(server) = self.threads.get_mut(id) {
            server.disarm();
        }
        self.server_thread = Some(id);
        Ok(id)
    }

    fn register(&mut self, role: Role, stack: &'static mut [u32], config: ThreadConfig) -> KernelResult<ThreadId> {
        let exit_routine = self.port.exit_routine();
        let now = self.now;
        self.threads
            .insert(|id| Thread::new(id, role, stack, config, exit_routine, now))
    }

    // -----------------------------------------------------------------------
    // EDF decision
    // -----------------------------------------------------------------------

    /// Pick the next thread and pend a switch if it is not the running one.
    ///
    /// Must be called with interrupts masked.
    pub fn schedule(&mut self) -> ThreadId {
        self.arm_server();

        let selected = match self.select().or(self.idle) {
            Some(id) => id,
            None => self.port.fatal(KernelError::NoIdleThread),
        };

        self.next = Some(selected);
        if self.current != Some(selected) {
            trace!("schedule: now={} switch {:?} -> {}", self.now, self.current, selected.index());
            self.port.request_context_switch();
        }
        selected
    }

    /// Eligible non-idle thread with the earliest absolute deadline, lowest
    /// slot first on ties.
    pub fn select(&self) -> Option<ThreadId> {
        let now = self.now;
        let mut best: Option<(ThreadId, Ticks)> = None;

        for thread in self.threads.iter() {
            match thread.role() {
                Role::Idle => continue,
                Role::Server if !thread.is_armed() => continue,
                _ => {}
            }
            if !thread.is_eligible(now) {
                continue;
            }
            let deadline = thread.absolute_deadline();
            if best.map_or(true, |(_, earliest)| deadline < earliest) {
                best = Some((thread.id(), deadline));
            }
        }

        best.map(|(id, _)| id)
    }

    /// Turn the queue head into a deadline the EDF scan understands.
    ///
    /// The server's absolute deadline always equals the head's. An overdue
    /// head is armed with an activation in the past and a zero relative
    /// deadline, so it keeps its real urgency instead of looking due `now`.
    fn arm_server(&mut self) {
        let Some(server_id) = self.server_thread else {
            return;
        };
        let Some(head) = self.admission.head().copied() else {
            return;
        };
        let now = self.now;
        if let Some(server) = self.threads.get_mut(server_id) {
            if !server.is_armed() {
                let activation = now.min(head.absolute_deadline);
                server.relative_deadline = head.absolute_deadline - activation;
                server.computation_time = head.computation_time;
                server.activation_time = activation;
                server.delayed_until = activation;
                trace!("server armed: now={} deadline={}", now, head.absolute_deadline);
            }
        }
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Advance the time base by one tick and re-evaluate.
    ///
    /// The counter never decreases; it saturates at `Ticks::MAX`.
    pub fn tick(&mut self) {
        self.now = self.now.saturating_add(1);
        self.schedule();
    }

    /// Keep the running thread off the CPU for at least `ticks` ticks.
    pub fn delay_current(&mut self, ticks: Ticks) {
        let now = self.now;
        if let Some(thread) = self.current.and_then(|id| self.threads.get_mut(id)) {
            thread.delayed_until = now.saturating_add(ticks).max(thread.activation_time);
        }
        self.schedule();
    }

    /// Finish the running thread's current job and reschedule.
    ///
    /// Periodic threads move to their next period (saturating at
    /// `Ticks::MAX`), run-once threads leave the table and the server goes
    /// back to idle. Returns the entry point to call when this thread is
    /// dispatched again, or `None` if it no longer exists.
    pub fn exit_current(&mut self) -> Option<ThreadEntry> {
        let now = self.now;
        let id = match self.current {
            Some(id) => id,
            None => self.port.fatal(KernelError::NoCurrentThread),
        };
        let thread = match self.threads.get_mut(id) {
            Some(thread) => thread,
            None => self.port.fatal(KernelError::NoCurrentThread),
        };

        if thread.role() == Role::Idle {
            self.port.fatal(KernelError::IdleExited);
        }

        thread.jobs_completed = thread.jobs_completed.wrapping_add(1);
        let deadline = thread.absolute_deadline();
        if now > deadline {
            thread.deadline_misses = thread.deadline_misses.wrapping_add(1);
            warn!("thread {} missed its deadline: now={} deadline={}", id.index(), now, deadline);
        }

        let entry = match thread.role() {
            Role::Server => {
                thread.disarm();
                Some(thread.entry())
            }
            _ if thread.is_periodic() => {
                thread.activation_time = thread.activation_time.saturating_add(thread.period);
                thread.delayed_until = thread.delayed_until.max(thread.activation_time);
                Some(thread.entry())
            }
            _ => {
                self.threads.remove(id);
                debug!("thread {} finished and was removed", id.index());
                None
            }
        };

        self.schedule();
        entry
    }

    // -----------------------------------------------------------------------
    // Aperiodic work
    // -----------------------------------------------------------------------

    /// Queue sporadic work. `false` means the queue is full and the request
    /// was dropped; nothing else changed.
    pub fn enqueue_aperiodic(&mut self, entry: ThreadEntry, computation_time: Ticks) -> bool {
        match self.admission.admit(entry, computation_time, self.now) {
            Some(request) => {
                trace!(
                    "aperiodic request admitted: now={} deadline={}",
                    self.now,
                    request.absolute_deadline
                );
                true
            }
            None => {
                warn!("aperiodic queue full, request dropped at {}", self.now);
                false
            }
        }
    }

    /// Dequeue the request the server was armed for.
    pub fn take_aperiodic(&mut self) -> Option<AperiodicRequest> {
        self.admission.take()
    }

    // -----------------------------------------------------------------------
    // Context switch bookkeeping
    // -----------------------------------------------------------------------

    /// Record the outgoing thread's stack pointer and make `next` current.
    ///
    /// `saved_sp` is the running thread's stack pointer after its callee-saved
    /// registers were pushed, or null if no thread was running. Returns the
    /// stack pointer to restore.
    pub fn switch_context(&mut self, saved_sp: *mut u32) -> *mut u32 {
        if let Some(outgoing) = self.current {
            // A run-once thread that just exited has no slot left to save into.
            if let Some(thread) = self.threads.get_mut(outgoing) {
                if !saved_sp.is_null() {
                    thread.stack_pointer = saved_sp;
                }
                if let Some(pin) = thread.debug_pin() {
                    self.port.write_debug_pin(pin, false);
                }
            }
            self.port.trace(TraceEvent::Leave(outgoing));
        }

        let incoming = match self.next {
            Some(id) => id,
            None => self.port.fatal(KernelError::NoNextThread),
        };
        let (sp, pin) = match self.threads.get(incoming) {
            Some(thread) => (thread.stack_pointer(), thread.debug_pin()),
            None => self.port.fatal(KernelError::NoNextThread),
        };

        self.current = Some(incoming);
        if let Some(pin) = pin {
            self.port.write_debug_pin(pin, true);
        }
        self.port.trace(TraceEvent::Enter(incoming));
        sp
    }

    /// Stack pointer of the running thread, null before the first dispatch.
    pub fn current_stack_pointer(&self) -> *mut u32 {
        self.current
            .and_then(|id| self.threads.get(id))
            .map_or(ptr::null_mut(), Thread::stack_pointer)
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::sim::SimPort;
    use crate::thread::tests::{leak_stack, nop_body};
    use proptest::prelude::*;
    use std::vec::Vec;

    extern "C" fn idle_body() {}
    extern "C" fn server_body() {}
    extern "C" fn job_a() {}
    extern "C" fn job_b() {}

    const IDLE: ThreadId = ThreadId::new(0);
    const SERVER: ThreadId = ThreadId::new(1);

    fn kernel(inverse_bandwidth: u32) -> Scheduler<SimPort> {
        let mut s = Scheduler::new(SimPort::new(), Bandwidth::from_inverse(inverse_bandwidth).unwrap());
        assert_eq!(s.install_idle(leak_stack(64), idle_body).unwrap(), IDLE);
        assert_eq!(s.install_server(leak_stack(64), server_body).unwrap(), SERVER);
        s
    }

    fn add(s: &mut Scheduler<SimPort>, config: ThreadConfig) -> ThreadId {
        s.add_thread(leak_stack(64), config).unwrap()
    }

    /// Perform a latched switch the way PendSV would.
    fn dispatch(s: &mut Scheduler<SimPort>) {
        if s.port().take_pending_switch() {
            let saved = s.current_stack_pointer();
            s.switch_context(saved);
        }
    }

    /// Run every job ready at the current tick, each taking no time.
    /// Returns the order in which threads ran.
    fn run_ready_jobs(s: &mut Scheduler<SimPort>, served: &mut Vec<AperiodicRequest>) -> Vec<ThreadId> {
        let mut ran = Vec::new();
        for _ in 0..1000 {
            dispatch(s);
            let id = s.current().unwrap();
            match s.thread(id).unwrap().role() {
                Role::Idle => return ran,
                Role::Server => served.extend(s.take_aperiodic()),
                Role::Application => {}
            }
            ran.push(id);
            s.exit_current();
        }
        panic!("jobs never settled");
    }

    #[test]
    fn test_three_periodic_threads_over_24_ticks() {
        let mut s = kernel(1);
        let a = add(&mut s, ThreadConfig::periodic(nop_body, 6));
        let b = add(&mut s, ThreadConfig::periodic(nop_body, 8));
        let c = add(&mut s, ThreadConfig::periodic(nop_body, 12));

        s.schedule();
        let mut served = Vec::new();
        for _ in 0..24 {
            run_ready_jobs(&mut s, &mut served);
            s.tick();
        }

        let jobs = |id| s.thread(id).unwrap().jobs_completed;
        assert_eq!((jobs(a), jobs(b), jobs(c)), (4, 3, 2));
        for id in [a, b, c] {
            assert_eq!(s.thread(id).unwrap().deadline_misses, 0);
        }
    }

    #[test]
    fn test_earliest_deadline_runs_first() {
        let mut s = kernel(1);
        let late = add(&mut s, ThreadConfig::periodic(nop_body, 30));
        let early = add(&mut s, ThreadConfig::periodic(nop_body, 10));

        assert_eq!(s.schedule(), early);
        let order = run_ready_jobs(&mut s, &mut Vec::new());
        assert_eq!(order, [early, late]);
    }

    #[test]
    fn test_equal_deadlines_resolve_to_lowest_slot() {
        let mut s = kernel(1);
        let first = add(&mut s, ThreadConfig::periodic(nop_body, 10));
        let second = add(&mut s, ThreadConfig::periodic(nop_body, 10));
        assert!(first < second);

        assert_eq!(s.schedule(), first);
        assert_eq!(run_ready_jobs(&mut s, &mut Vec::new()), [first, second]);
    }

    #[test]
    fn test_idle_selected_when_nothing_eligible() {
        let mut s = kernel(1);
        let t = add(&mut s, ThreadConfig::periodic(nop_body, 5));
        s.thread_mut(t).unwrap().activation_time = 3;
        s.thread_mut(t).unwrap().delayed_until = 3;

        assert_eq!(s.schedule(), IDLE);
        s.tick();
        s.tick();
        assert_eq!(s.next(), Some(IDLE));
        s.tick();
        assert_eq!(s.next(), Some(t));
    }

    #[test]
    fn test_no_switch_requested_when_decision_unchanged() {
        let mut s = kernel(1);
        add(&mut s, ThreadConfig::periodic(nop_body, 100));
        s.schedule();
        dispatch(&mut s);
        let requests = s.port().switch_requests();

        for _ in 0..10 {
            s.tick();
        }
        assert_eq!(s.port().switch_requests(), requests);
    }

    #[test]
    fn test_missing_idle_thread_is_fatal() {
        let mut s = Scheduler::new(SimPort::new(), Bandwidth::from_inverse(1).unwrap());
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| s.schedule()));
        assert!(result.is_err());
    }

    #[test]
    fn test_periodic_exit_advances_activation_by_period() {
        let mut s = kernel(1);
        let t = add(&mut s, ThreadConfig::periodic(nop_body, 7));
        s.schedule();
        dispatch(&mut s);

        assert_eq!(s.exit_current().map(|e| e as usize), Some(nop_body as usize));
        assert_eq!(s.thread(t).unwrap().activation_time, 7);
        assert_eq!(s.next(), Some(IDLE));
    }

    #[test]
    fn test_periodic_exit_saturates_instead_of_wrapping() {
        let mut s = kernel(1);
        let t = add(&mut s, ThreadConfig::periodic(nop_body, 100).with_deadline(Ticks::MAX));
        s.schedule();
        dispatch(&mut s);
        s.thread_mut(t).unwrap().activation_time = Ticks::MAX - 10;

        s.exit_current();
        let thread = s.thread(t).unwrap();
        assert_eq!(thread.activation_time, Ticks::MAX);
        assert!(thread.delayed_until >= thread.activation_time);
    }

    #[test]
    fn test_run_once_thread_removed_on_exit() {
        let mut s = kernel(1);
        let t = add(&mut s, ThreadConfig::once(nop_body, 10));
        s.schedule();
        dispatch(&mut s);

        assert!(s.exit_current().is_none());
        assert!(s.thread(t).is_none());

        // The trampoline still has the removed slot as "current".
        dispatch(&mut s);
        assert_eq!(s.current(), Some(IDLE));
        assert_eq!(add(&mut s, ThreadConfig::once(nop_body, 1)), t, "slot is free again");
    }

    #[test]
    fn test_idle_exit_is_fatal() {
        let mut s = kernel(1);
        s.schedule();
        dispatch(&mut s);
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| s.exit_current()));
        assert!(result.is_err());
    }

    #[test]
    fn test_delay_blocks_until_elapsed() {
        let mut s = kernel(1);
        let t = add(&mut s, ThreadConfig::periodic(nop_body, 100));
        s.schedule();
        dispatch(&mut s);

        s.delay_current(3);
        assert_eq!(s.next(), Some(IDLE));
        dispatch(&mut s);
        s.tick();
        s.tick();
        assert_eq!(s.next(), Some(IDLE));
        s.tick();
        assert_eq!(s.next(), Some(t));
    }

    #[test]
    fn test_yield_lets_a_later_deadline_run() {
        let mut s = kernel(1);
        let urgent = add(&mut s, ThreadConfig::periodic(nop_body, 10));
        let relaxed = add(&mut s, ThreadConfig::periodic(nop_body, 50));
        s.schedule();
        dispatch(&mut s);
        assert_eq!(s.current(), Some(urgent));

        s.delay_current(1);
        assert_eq!(s.next(), Some(relaxed));
        dispatch(&mut s);
        s.tick();
        assert_eq!(s.next(), Some(urgent));
    }

    #[test]
    fn test_server_armed_from_queue_head() {
        let mut s = kernel(5);
        let periodic = add(&mut s, ThreadConfig::periodic(nop_body, 20));

        assert!(s.enqueue_aperiodic(job_a, 2));
        assert!(s.enqueue_aperiodic(job_b, 2));
        assert_eq!(s.admission().last_deadline(), 20);

        // Server deadline 10 beats the periodic thread's 20.
        assert_eq!(s.schedule(), SERVER);
        let server = s.thread(SERVER).unwrap();
        assert_eq!((server.activation_time, server.relative_deadline), (0, 10));

        let mut served = Vec::new();
        let order = run_ready_jobs(&mut s, &mut served);

        // Second request (deadline 20) ties with the periodic thread; the
        // server's lower slot wins.
        assert_eq!(order, [SERVER, SERVER, periodic]);
        let served: Vec<usize> = served.iter().map(|r| r.entry as usize).collect();
        assert_eq!(served, [job_a as usize, job_b as usize]);
        assert!(!s.thread(SERVER).unwrap().is_armed());
    }

    #[test]
    fn test_server_not_eligible_while_queue_empty() {
        let mut s = kernel(5);
        assert_eq!(s.schedule(), IDLE);
        assert!(!s.thread(SERVER).unwrap().is_armed());
    }

    #[test]
    fn test_full_queue_rejected_without_side_effects() {
        let mut s = kernel(5);
        let capacity = s.admission().queue().capacity();
        for _ in 0..capacity {
            assert!(s.enqueue_aperiodic(job_a, 1));
        }
        let last = s.admission().last_deadline();
        assert!(!s.enqueue_aperiodic(job_b, 1));
        assert_eq!(s.admission().last_deadline(), last);
        assert_eq!(s.admission().queue().len(), capacity);
    }

    #[test]
    fn test_switch_context_saves_restores_and_traces() {
        let mut s = kernel(1);
        let a = add(&mut s, ThreadConfig::periodic(nop_body, 5).with_debug_pin(13));
        let b = add(&mut s, ThreadConfig::periodic(nop_body, 9));

        s.schedule();
        let a_sp = s.thread(a).unwrap().stack_pointer();
        assert_eq!(s.switch_context(ptr::null_mut()), a_sp);
        assert_eq!(s.current(), Some(a));

        // Pretend PendSV pushed r4-r11 eight words below the frame.
        let pushed = a_sp.wrapping_sub(8);
        s.exit_current();
        assert_eq!(s.next(), Some(b));
        let b_sp = s.switch_context(pushed);

        assert_eq!(b_sp, s.thread(b).unwrap().stack_pointer());
        assert_eq!(s.thread(a).unwrap().stack_pointer(), pushed);
        assert_eq!(
            s.port().events(),
            [TraceEvent::Enter(a), TraceEvent::Leave(a), TraceEvent::Enter(b)]
        );
        assert_eq!(s.port().pins(), [(13, true), (13, false)]);
    }

    #[test]
    fn test_switch_without_next_is_fatal() {
        let mut s = kernel(1);
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            s.switch_context(ptr::null_mut());
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_deadline_miss_counted() {
        let mut s = kernel(1);
        let t = add(&mut s, ThreadConfig::periodic(nop_body, 10).with_deadline(2));
        s.schedule();
        dispatch(&mut s);
        for _ in 0..3 {
            s.tick();
        }
        s.exit_current();
        let stats = s.thread(t).unwrap().stats();
        assert_eq!((stats.jobs_completed, stats.deadline_misses), (1, 1));
    }

    #[test]
    fn test_overdue_queue_head_keeps_its_deadline() {
        let mut s = kernel(5);
        let periodic = add(&mut s, ThreadConfig::periodic(nop_body, 100).with_deadline(25));
        assert!(s.enqueue_aperiodic(job_a, 2));
        assert!(s.enqueue_aperiodic(job_b, 2));

        assert_eq!(s.schedule(), SERVER);
        dispatch(&mut s);
        assert!(s.take_aperiodic().is_some());

        // First job overruns well past the second request's deadline (20).
        for _ in 0..30 {
            s.tick();
        }
        s.exit_current();

        let server = s.thread(SERVER).unwrap();
        assert_eq!(server.absolute_deadline(), 20);
        assert!(server.is_eligible(s.now()));
        assert!(server.delayed_until >= server.activation_time);
        assert_eq!(s.thread(periodic).unwrap().absolute_deadline(), 25);
        assert_eq!(s.next(), Some(SERVER));
    }

    #[test]
    fn test_tick_counter_crosses_32_bit_boundary() {
        let mut s = kernel(1);
        let t = add(&mut s, ThreadConfig::periodic(nop_body, 10));
        s.schedule();
        dispatch(&mut s);
        s.exit_current();
        dispatch(&mut s);

        let boundary = Ticks::from(u32::MAX) + 1;
        s.now = boundary - 2;
        s.thread_mut(t).unwrap().activation_time = boundary;
        s.thread_mut(t).unwrap().delayed_until = boundary;

        s.tick();
        assert_eq!(s.next(), Some(IDLE));
        s.tick();
        assert_eq!(s.now(), boundary);
        assert_eq!(s.next(), Some(t));
    }

    #[test]
    fn test_tick_counter_never_goes_backwards() {
        let mut s = kernel(1);
        s.now = Ticks::MAX - 1;
        s.tick();
        s.tick();
        assert_eq!(s.now(), Ticks::MAX);
    }

    // -----------------------------------------------------------------------
    // Properties
    // -----------------------------------------------------------------------

    #[derive(Debug, Clone)]
    struct Timing {
        activation: Ticks,
        delay: Ticks,
        deadline: Ticks,
    }

    fn timing() -> impl Strategy<Value = Timing> {
        (0u64..40, 0u64..10, 0u64..40).prop_map(|(activation, extra_delay, deadline)| Timing {
            activation,
            delay: activation + extra_delay,
            deadline,
        })
    }

    proptest! {
        #[test]
        fn prop_selects_earliest_eligible_lowest_slot(
            timings in proptest::collection::vec(timing(), 1..12),
            now in 0u64..50,
        ) {
            let mut s = kernel(1);
            let mut ids = Vec::new();
            for t in &timings {
                let id = add(&mut s, ThreadConfig::periodic(nop_body, 100));
                let thread = s.thread_mut(id).unwrap();
                thread.activation_time = t.activation;
                thread.delayed_until = t.delay;
                thread.relative_deadline = t.deadline;
                ids.push(id);
            }
            s.now = now;

            let expected = ids
                .iter()
                .zip(&timings)
                .filter(|(_, t)| now >= t.activation && now >= t.delay)
                .min_by_key(|(id, t)| (t.activation + t.deadline, **id))
                .map(|(id, _)| *id)
                .unwrap_or(IDLE);

            let selected = s.schedule();
            prop_assert_eq!(selected, expected);
            if selected != IDLE {
                prop_assert!(s.thread(selected).unwrap().is_eligible(now));
            }
        }
    }
}
