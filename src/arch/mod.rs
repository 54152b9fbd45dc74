//! # Architecture Abstraction Layer
//!
//! Hardware side of the [`Port`](crate::port::Port) boundary. Currently
//! implements the Cortex-M3 port; other cores get a sibling module.

pub mod cortex_m3;
