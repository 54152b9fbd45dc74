//! # EdfOS Example Firmware
//!
//! Demonstrates the EDF scheduler and the aperiodic server on an STM32F103:
//!
//! | Thread | Kind | Period | Behavior |
//! |--------|------|--------|----------|
//! | `fast_sampler` | Periodic | 6 ms | Burns 1 ms, bumps the shared counter |
//! | `mid_sampler` | Periodic | 8 ms | Burns 1 ms, bumps the shared counter |
//! | `slow_sampler` | Periodic | 12 ms | Burns 2 ms, bumps the shared counter |
//! | `button_poll` | Periodic | 250 ms | Queues an aperiodic `button_job` |
//! | `reporter` | Periodic | 1 s | Logs counter and job statistics |
//!
//! Utilization of the three samplers is 1/6 + 1/8 + 2/12 ≈ 46%, so the
//! aperiodic server is given what is left: `from_periodic_utilization(50)`.
//!
//! The shared counter is updated with a plain load/store pair. Only the
//! binary semaphore keeps the samplers from losing increments.
//!
//! Log output goes to the debugger through semihosting.

#![cfg_attr(all(target_arch = "arm", target_os = "none"), no_std, no_main)]

#[cfg(all(target_arch = "arm", target_os = "none"))]
mod firmware {
    use core::cell::Cell;
    use core::sync::atomic::{AtomicU32, Ordering};

    use cortex_m::interrupt::{self, Mutex};

    use cortex_m_rt::entry;
    use cortex_m_semihosting::hprintln;
    use log::{info, warn, Level, LevelFilter, Metadata, Record};
    use panic_halt as _;

    use edfos::config::{millis, seconds};
    use edfos::kernel::{self, KernelConfig};
    use edfos::{Bandwidth, Semaphore, ThreadConfig, ThreadId};

    // -----------------------------------------------------------------------
    // Logger
    // -----------------------------------------------------------------------

    struct SemihostingLogger;

    impl log::Log for SemihostingLogger {
        fn enabled(&self, metadata: &Metadata) -> bool {
            metadata.level() <= Level::Info
        }

        fn log(&self, record: &Record) {
            if self.enabled(record.metadata()) {
                hprintln!("[{:>5}] {}", record.level(), record.args());
            }
        }

        fn flush(&self) {}
    }

    static LOGGER: SemihostingLogger = SemihostingLogger;

    // -----------------------------------------------------------------------
    // Shared state
    // -----------------------------------------------------------------------

    static COUNTER_LOCK: Semaphore = Semaphore::uninit();
    static COUNTER: AtomicU32 = AtomicU32::new(0);
    static BUTTON_JOBS: AtomicU32 = AtomicU32::new(0);

    fn bump_counter() {
        COUNTER_LOCK.wait();
        let value = COUNTER.load(Ordering::Relaxed);
        COUNTER.store(value.wrapping_add(1), Ordering::Relaxed);
        COUNTER_LOCK.signal();
    }

    // -----------------------------------------------------------------------
    // Threads
    // -----------------------------------------------------------------------

    extern "C" fn fast_sampler() {
        kernel::burn(millis(1));
        bump_counter();
    }

    extern "C" fn mid_sampler() {
        kernel::burn(millis(1));
        bump_counter();
    }

    extern "C" fn slow_sampler() {
        kernel::burn(millis(2));
        bump_counter();
    }

    /// Stand-in for a GPIO edge interrupt.
    extern "C" fn button_poll() {
        if !kernel::enqueue_aperiodic(button_job, millis(2)) {
            warn!("button press dropped");
        }
    }

    /// Runs on the aperiodic server.
    extern "C" fn button_job() {
        kernel::burn(millis(2));
        BUTTON_JOBS.fetch_add(1, Ordering::Relaxed);
    }

    static SAMPLERS: Mutex<Cell<[Option<ThreadId>; 3]>> = Mutex::new(Cell::new([None; 3]));

    extern "C" fn reporter() {
        info!(
            "t={}ms counter={} button_jobs={}",
            kernel::current_millis(),
            COUNTER.load(Ordering::Relaxed),
            BUTTON_JOBS.load(Ordering::Relaxed)
        );
        let samplers = interrupt::free(|cs| SAMPLERS.borrow(cs).get());
        for id in samplers.into_iter().flatten() {
            if let Some(stats) = kernel::thread_stats(id) {
                info!(
                    "  thread {}: jobs={} misses={} free stack={} words",
                    id.index(),
                    stats.jobs_completed,
                    stats.deadline_misses,
                    stats.unused_stack_words
                );
            }
        }
    }

    // -----------------------------------------------------------------------
    // Main entry point
    // -----------------------------------------------------------------------

    #[entry]
    fn main() -> ! {
        let cp = cortex_m::Peripherals::take().unwrap();

        log::set_logger(&LOGGER).unwrap();
        log::set_max_level(LevelFilter::Info);

        let bandwidth = Bandwidth::from_periodic_utilization(50).unwrap();
        kernel::kernel_init(KernelConfig::new(bandwidth));
        COUNTER_LOCK.init(1, 1);

        let fast = kernel::add_thread(
            cortex_m::singleton!(: [u32; 256] = [0; 256]).unwrap(),
            ThreadConfig::periodic(fast_sampler, millis(6)).with_computation_time(millis(1)),
        );
        let mid = kernel::add_thread(
            cortex_m::singleton!(: [u32; 256] = [0; 256]).unwrap(),
            ThreadConfig::periodic(mid_sampler, millis(8)).with_computation_time(millis(1)),
        );
        let slow = kernel::add_thread(
            cortex_m::singleton!(: [u32; 256] = [0; 256]).unwrap(),
            ThreadConfig::periodic(slow_sampler, millis(12)).with_computation_time(millis(2)),
        );
        kernel::add_thread(
            cortex_m::singleton!(: [u32; 128] = [0; 128]).unwrap(),
            ThreadConfig::periodic(button_poll, millis(250)),
        );
        kernel::add_thread(
            cortex_m::singleton!(: [u32; 512] = [0; 512]).unwrap(),
            ThreadConfig::periodic(reporter, seconds(1)),
        );

        interrupt::free(|cs| SAMPLERS.borrow(cs).set([Some(fast), Some(mid), Some(slow)]));

        kernel::start(cp)
    }
}

#[cfg(not(all(target_arch = "arm", target_os = "none")))]
fn main() {}
