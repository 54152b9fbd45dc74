//! # Kernel
//!
//! The process-wide kernel instance and the application-facing API.
//!
//! There is exactly one [`Scheduler`], built by [`kernel_init`] and stored
//! in a static. Every access goes through [`with_kernel`], which masks
//! interrupts for the duration of the closure and then restores whatever
//! mask state the caller had. The only other path is the
//! PendSV trampoline, which masks on its own.
//!
//! Errors in this layer are programmer errors (full table, short stack,
//! misuse before init) and go straight to the configured fatal handler.
//!
//! ## Startup Sequence
//!
//! ```text
//! reset_handler (cortex-m-rt)
//!   └─► main()
//!         ├─► kernel::kernel_init() ← Scheduler, idle + server threads
//!         ├─► kernel::add_thread()  ← Register threads (×N)
//!         └─► kernel::start()       ← Launch scheduler (no return)
//!               ├─► Set interrupt priorities, enable fault handlers
//!               ├─► PSP = 0, configure SysTick
//!               └─► schedule(); PendSV dispatches the first thread
//! ```

use core::cell::UnsafeCell;

use cortex_m::peripheral::scb::Exception;
use cortex_m_rt::{exception, ExceptionFrame};
use log::{error, info};

use crate::arch::cortex_m3::{self, CortexM3};
use crate::config::{self, IDLE_STACK_WORDS, SERVER_STACK_WORDS};
use crate::errors::{FaultKind, KernelError, KernelResult};
use crate::port::Port;
use crate::scheduler::Scheduler;
use crate::semaphore::Semaphore;
use crate::server::Bandwidth;
use crate::sync::CriticalSection;
use crate::thread::{ThreadConfig, ThreadId, ThreadStats, Ticks};

// ---------------------------------------------------------------------------
// Global kernel instance
// ---------------------------------------------------------------------------

struct KernelCell(UnsafeCell<Option<Scheduler<CortexM3>>>);

// Safety: the cell is only dereferenced with interrupts masked on a
// single-core part.
unsafe impl Sync for KernelCell {}

impl KernelCell {
    /// # Safety
    /// Interrupts must stay masked for as long as the reference lives.
    #[allow(clippy::mut_from_ref)]
    unsafe fn get(&self) -> &mut Option<Scheduler<CortexM3>> {
        &mut *self.0.get()
    }
}

static KERNEL: KernelCell = KernelCell(UnsafeCell::new(None));

/// Port used for masking before the kernel exists and for errors that
/// happen before a fatal handler is configured.
static BOOT_PORT: CortexM3 = CortexM3::new(default_fatal_handler, None, None);

/// Run `f` on the kernel with interrupts masked. A caller that already had
/// them masked (a semaphore holder) gets them back masked.
pub fn with_kernel<R>(f: impl FnOnce(&mut Scheduler<CortexM3>) -> R) -> R {
    let _cs = CriticalSection::enter(&BOOT_PORT);
    // Safety: masked until `_cs` drops, after `f` has returned.
    match unsafe { KERNEL.get() } {
        Some(kernel) => f(kernel),
        None => BOOT_PORT.fatal(KernelError::NotInitialized),
    }
}

/// Hand `error` to the configured fatal handler.
pub fn fatal(error: KernelError) -> ! {
    BOOT_PORT.mask_interrupts();
    // Safety: masked, and never unmasked again.
    match unsafe { KERNEL.get() } {
        Some(kernel) => kernel.port().fatal(error),
        None => BOOT_PORT.fatal(error),
    }
}

/// Logs the error and parks the core.
pub fn default_fatal_handler(error: KernelError) -> ! {
    error!("fatal kernel error: {}", error);
    loop {
        cortex_m::asm::wfi();
    }
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Runtime configuration consumed by [`kernel_init`].
#[derive(Clone, Copy)]
pub struct KernelConfig {
    /// Processor share reserved for aperiodic work.
    pub bandwidth: Bandwidth,
    pub fatal_handler: fn(KernelError) -> !,
    /// Receives one 2-byte record per enter/leave event.
    pub trace_sink: Option<fn([u8; 2])>,
    /// Drives a thread's debug pin.
    pub debug_pin: Option<fn(u8, bool)>,
}

impl KernelConfig {
    pub const fn new(bandwidth: Bandwidth) -> Self {
        Self {
            bandwidth,
            fatal_handler: default_fatal_handler,
            trace_sink: None,
            debug_pin: None,
        }
    }

    pub const fn with_fatal_handler(mut self, handler: fn(KernelError) -> !) -> Self {
        self.fatal_handler = handler;
        self
    }

    pub const fn with_trace_sink(mut self, sink: fn([u8; 2])) -> Self {
        self.trace_sink = Some(sink);
        self
    }

    pub const fn with_debug_pins(mut self, write: fn(u8, bool)) -> Self {
        self.debug_pin = Some(write);
        self
    }
}

// ---------------------------------------------------------------------------
// Kernel API
// ---------------------------------------------------------------------------

/// Build the kernel and install the idle and aperiodic server threads.
///
/// Must be called once, from `main`, before any other kernel function.
pub fn kernel_init(config: KernelConfig) {
    let port = CortexM3::new(config.fatal_handler, config.trace_sink, config.debug_pin);
    if let Err(error) = install(port, config.bandwidth) {
        port.fatal(error);
    }
    info!(
        "kernel initialized: {} Hz tick, server bandwidth 1/{}",
        config::TICK_HZ,
        config.bandwidth.inverse()
    );
}

fn install(port: CortexM3, bandwidth: Bandwidth) -> KernelResult<()> {
    let _cs = CriticalSection::enter(&port);
    // Safety: masked until the end of this function.
    let slot = unsafe { KERNEL.get() };
    if slot.is_some() {
        return Err(KernelError::AlreadyInitialized);
    }

    let idle_stack = cortex_m::singleton!(: [u32; IDLE_STACK_WORDS] = [0; IDLE_STACK_WORDS])
        .ok_or(KernelError::AlreadyInitialized)?;
    let server_stack = cortex_m::singleton!(: [u32; SERVER_STACK_WORDS] = [0; SERVER_STACK_WORDS])
        .ok_or(KernelError::AlreadyInitialized)?;

    let mut scheduler = Scheduler::new(port, bandwidth);
    scheduler.install_idle(idle_stack, idle_main)?;
    scheduler.install_server(server_stack, server_main)?;
    *slot = Some(scheduler);
    Ok(())
}

/// Register a thread. A full table or an undersized stack is fatal.
///
/// # Example
/// ```ignore
/// let stack = cortex_m::singleton!(: [u32; 256] = [0; 256]).unwrap();
/// kernel::add_thread(stack, ThreadConfig::periodic(blink, config::millis(500)));
/// ```
pub fn add_thread(stack: &'static mut [u32], config: ThreadConfig) -> ThreadId {
    with_kernel(|kernel| match kernel.add_thread(stack, config) {
        Ok(id) => id,
        Err(error) => kernel.port().fatal(error),
    })
}

/// Start scheduling. **Does not return.**
///
/// The first dispatch happens on the PendSV pended by the initial
/// scheduling pass; `main`'s stack is abandoned after it.
pub fn start(mut core: cortex_m::Peripherals) -> ! {
    cortex_m3::set_interrupt_priorities(&mut core.SCB);
    core.SCB.enable(Exception::MemoryManagement);
    core.SCB.enable(Exception::BusFault);
    core.SCB.enable(Exception::UsageFault);

    cortex_m3::clear_process_stack();
    cortex_m3::configure_systick(&mut core.SYST);

    with_kernel(|kernel| {
        info!("starting scheduler with {} threads", kernel.threads().len());
        kernel.schedule();
    });

    loop {
        cortex_m::asm::wfi();
    }
}

/// Suspend the calling thread for at least `ticks` ticks.
pub fn delay(ticks: Ticks) {
    with_kernel(|kernel| kernel.delay_current(ticks));
}

/// Give up the CPU until the next tick.
pub fn yield_now() {
    delay(1);
}

/// Busy-wait for `ticks` ticks without giving up the CPU. Simulates load.
pub fn burn(ticks: Ticks) {
    let start = now();
    while now().saturating_sub(start) < ticks {
        cortex_m::asm::nop();
    }
}

/// Ticks since `start()`.
pub fn now() -> Ticks {
    with_kernel(|kernel| kernel.now())
}

pub fn current_millis() -> u64 {
    config::ticks_to_millis(now())
}

/// Queue sporadic work for the aperiodic server. Callable from interrupt
/// handlers. Returns `false` if the queue is full and the work was dropped.
pub fn enqueue_aperiodic(entry: extern "C" fn(), computation_time: Ticks) -> bool {
    with_kernel(|kernel| {
        let accepted = kernel.enqueue_aperiodic(entry, computation_time);
        kernel.schedule();
        accepted
    })
}

pub fn thread_stats(id: ThreadId) -> Option<ThreadStats> {
    with_kernel(|kernel| kernel.thread(id).map(|thread| thread.stats()))
}

// ---------------------------------------------------------------------------
// Kernel threads & exception entry points
// ---------------------------------------------------------------------------

/// Return address of every thread body. Ends the job and, when the thread
/// is dispatched again, re-enters its body.
pub(crate) extern "C" fn thread_return() -> ! {
    loop {
        match with_kernel(|kernel| kernel.exit_current()) {
            Some(entry) => entry(),
            // Run-once thread removed; the switch pended by exit_current is
            // taken on unmask and this slot is never dispatched again.
            None => loop {
                cortex_m::asm::wfi();
            },
        }
    }
}

extern "C" fn idle_main() {
    loop {
        cortex_m::asm::wfi();
    }
}

/// Serves one aperiodic request per dispatch.
extern "C" fn server_main() {
    if let Some(request) = with_kernel(|kernel| kernel.take_aperiodic()) {
        (request.entry)();
    }
}

pub(crate) fn on_tick() {
    with_kernel(|kernel| kernel.tick());
}

/// Called from PendSV with interrupts already masked. The trampoline
/// unmasks once the incoming context is restored.
pub(crate) fn switch_from_trampoline(saved_sp: *mut u32) -> *mut u32 {
    // Safety: PendSV masked interrupts before calling in.
    match unsafe { KERNEL.get() } {
        Some(kernel) => kernel.switch_context(saved_sp),
        None => BOOT_PORT.fatal(KernelError::NotInitialized),
    }
}

#[exception]
unsafe fn HardFault(frame: &ExceptionFrame) -> ! {
    error!("{:?}", frame);
    fatal(KernelError::Fault(FaultKind::HardFault))
}

#[exception]
unsafe fn DefaultHandler(irqn: i16) {
    let kind = match irqn {
        -14 => FaultKind::Nmi,
        -12 => FaultKind::MemManage,
        -11 => FaultKind::BusFault,
        -10 => FaultKind::UsageFault,
        other => FaultKind::Unhandled(other),
    };
    fatal(KernelError::Fault(kind));
}

// ---------------------------------------------------------------------------
// Semaphore API
// ---------------------------------------------------------------------------

impl Semaphore {
    /// Set bounds and starting value. `start > maximum` is fatal.
    pub fn init(&self, maximum: u32, start: u32) {
        if let Err(error) = self.init_with(&BOOT_PORT, maximum, start) {
            fatal(error);
        }
    }

    /// Acquire, yielding while unavailable. Returns with interrupts masked
    /// until the matching [`Semaphore::signal`].
    pub fn wait(&self) {
        if let Err(error) = self.wait_with(&BOOT_PORT, yield_now) {
            fatal(error);
        }
    }

    /// Release and unmask.
    pub fn signal(&self) {
        if let Err(error) = self.signal_with(&BOOT_PORT) {
            fatal(error);
        }
    }

    /// Acquire only if available now. Leaves interrupts enabled.
    pub fn try_wait(&self) -> bool {
        match self.try_wait_with(&BOOT_PORT) {
            Ok(taken) => taken,
            Err(error) => fatal(error),
        }
    }
}
