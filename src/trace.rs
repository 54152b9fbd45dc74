//! # Scheduling Trace
//!
//! Every context switch produces a `Leave` event for the outgoing thread
//! and an `Enter` event for the incoming one. The port decides where they
//! go; on the board they are written to a UART as 2-byte records that the
//! host-side tracer turns into a Gantt chart.
//!
//! ```text
//! byte 0: event   (0 = enter, 1 = leave)
//! byte 1: slot    (thread table index)
//! ```

use crate::thread::ThreadId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceEvent {
    Enter(ThreadId),
    Leave(ThreadId),
}

impl TraceEvent {
    pub const ENTER: u8 = 0;
    pub const LEAVE: u8 = 1;

    /// Serial record for this event.
    pub fn encode(self) -> [u8; 2] {
        match self {
            TraceEvent::Enter(id) => [Self::ENTER, id.index() as u8],
            TraceEvent::Leave(id) => [Self::LEAVE, id.index() as u8],
        }
    }

    pub fn thread(self) -> ThreadId {
        match self {
            TraceEvent::Enter(id) | TraceEvent::Leave(id) => id,
        }
    }
}
