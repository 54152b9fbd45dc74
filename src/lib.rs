//! # EdfOS: Earliest-Deadline-First Operating System
//!
//! A small real-time kernel for single-core ARM Cortex-M3 microcontrollers
//! (STM32F103 class).
//!
//! ## Overview
//!
//! EdfOS multiplexes a fixed set of statically-allocated threads onto one
//! CPU. At every tick and every voluntary suspension point it runs the
//! thread with the earliest absolute deadline:
//!
//! - **Periodic threads** are re-activated every period and must finish
//!   each job before `activation + relative_deadline`
//! - **Run-once threads** run their body a single time and leave the table
//! - **Aperiodic work** (e.g. from an interrupt) is queued to a
//!   total-bandwidth server, which gives each request a deadline that keeps
//!   its processor share bounded
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────┐
//! │                  Application Threads                    │
//! ├────────────────────────────────────────────────────────┤
//! │                 Kernel API (kernel.rs)                  │
//! │   kernel_init() · add_thread() · start() · delay()     │
//! ├──────────────┬────────────────────┬───────────────────┤
//! │  Scheduler   │  Admission Server  │  Sync Primitives  │
//! │  scheduler.rs│  server.rs         │  sync.rs          │
//! │  ─ schedule()│  ─ admit()         │  semaphore.rs     │
//! │  ─ tick()    │  ─ Bandwidth       │  ─ CriticalSection│
//! │  ─ exit()    │                    │  ─ Semaphore      │
//! ├──────────────┴────────────────────┴───────────────────┤
//! │        Thread Model (thread.rs, stack.rs)               │
//! │   Thread · ThreadTable · ThreadConfig · initial frame   │
//! ├────────────────────────────────────────────────────────┤
//! │    Port trait (port.rs)  ·  Arch (arch/cortex_m3.rs)    │
//! │    PendSV · SysTick · masking · trace · debug pins      │
//! ├────────────────────────────────────────────────────────┤
//! │          ARM Cortex-M3 Hardware (Thumb-2)               │
//! └────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Scheduling Model
//!
//! A thread is eligible when `now >= activation_time` and
//! `now >= delayed_until`. Among eligible threads the one with the smallest
//! `activation_time + relative_deadline` runs; ties go to the lowest slot.
//! With nothing eligible the idle thread runs.
//!
//! Returning from a thread body ends the job: a periodic thread moves its
//! activation one period ahead and waits for it, a run-once thread is
//! removed.
//!
//! ## Memory Model
//!
//! - **No heap**: All state is statically allocated
//! - **No `alloc`**: Pure `core` only
//! - **Fixed-size table**: `[Option<Thread>; MAX_THREADS]`
//! - **Caller-owned stacks**: each thread is given a `&'static mut [u32]`
//! - **Critical sections**: global interrupt masking guards all kernel state
//!
//! ## Testing
//!
//! Everything above the [`port::Port`] seam is plain data and is unit-tested
//! on the host. `arch` and `kernel` only build for the bare-metal target.

#![cfg_attr(not(test), no_std)]

pub mod config;
pub mod errors;
pub mod port;
pub mod scheduler;
pub mod semaphore;
pub mod server;
pub mod stack;
pub mod sync;
pub mod thread;
pub mod trace;

#[cfg(all(target_arch = "arm", target_os = "none"))]
pub mod arch;
#[cfg(all(target_arch = "arm", target_os = "none"))]
pub mod kernel;

pub use errors::{KernelError, KernelResult};
pub use semaphore::Semaphore;
pub use server::Bandwidth;
pub use thread::{ThreadConfig, ThreadId, Ticks};
