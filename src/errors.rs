//! # Kernel Errors
//!
//! Every structural misuse of the kernel is a [`KernelError`]. Internal
//! operations return [`KernelResult`] and propagate with `?`; the public
//! kernel API hands any error to the application's fatal handler, since a
//! misconfigured real-time system has no meaningful way to retry.
//!
//! Runtime exhaustion of the aperiodic queue is deliberately *not* an error
//! here: it is reported to the caller as `false`.

use core::fmt;

pub type KernelResult<T> = Result<T, KernelError>;

/// Processor fault classes routed to the fatal handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    HardFault,
    MemManage,
    BusFault,
    UsageFault,
    Nmi,
    /// Any unexpected interrupt with no registered handler. Holds the IRQ number.
    Unhandled(i16),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelError {
    /// Every slot of the thread table is occupied.
    ThreadTableFull,
    /// A thread stack cannot hold the initial frame plus the working margin.
    StackTooSmall { words: usize, required: usize },
    /// The scheduler found no eligible thread and no idle thread is installed.
    NoIdleThread,
    /// The trampoline was entered without a selected next thread.
    NoNextThread,
    /// A thread-context operation ran before the first dispatch.
    NoCurrentThread,
    /// The idle thread returned from its body.
    IdleExited,
    /// A kernel operation ran before `kernel_init`.
    NotInitialized,
    /// `kernel_init` ran twice.
    AlreadyInitialized,
    /// The aperiodic server bandwidth is out of range.
    InvalidBandwidth,
    /// A semaphore was initialized with `start > max`.
    InvalidSemaphore { maximum: u32, start: u32 },
    /// `wait`/`signal` on a semaphore that was never initialized.
    SemaphoreUninitialized,
    /// A processor fault.
    Fault(FaultKind),
}

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KernelError::ThreadTableFull => write!(f, "thread table is full"),
            KernelError::StackTooSmall { words, required } => {
                write!(f, "stack of {} words is too small ({} required)", words, required)
            }
            KernelError::NoIdleThread => write!(f, "no idle thread installed"),
            KernelError::NoNextThread => write!(f, "context switch without a next thread"),
            KernelError::NoCurrentThread => write!(f, "no thread is running"),
            KernelError::IdleExited => write!(f, "idle thread returned"),
            KernelError::NotInitialized => write!(f, "kernel not initialized"),
            KernelError::AlreadyInitialized => write!(f, "kernel already initialized"),
            KernelError::InvalidBandwidth => write!(f, "invalid server bandwidth"),
            KernelError::InvalidSemaphore { maximum, start } => {
                write!(f, "semaphore start value {} exceeds maximum {}", start, maximum)
            }
            KernelError::SemaphoreUninitialized => write!(f, "semaphore used before init"),
            KernelError::Fault(kind) => write!(f, "processor fault: {:?}", kind),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::string::ToString;

    #[test]
    fn test_display_carries_details() {
        let msg = KernelError::StackTooSmall { words: 8, required: 32 }.to_string();
        assert!(msg.contains('8') && msg.contains("32"), "{}", msg);

        let msg = KernelError::Fault(FaultKind::BusFault).to_string();
        assert!(msg.contains("BusFault"), "{}", msg);
    }
}
