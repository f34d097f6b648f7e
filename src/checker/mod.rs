//! Proxy verification engine
//!
//! This module provides the checking pipeline:
//! - Single-round CONNECT-tunnel probe (plain and TLS-over-tunnel)
//! - Multi-round liveness evaluation against a success threshold
//! - Bounded-concurrency batch scheduling with streamed progress

pub mod evaluator;
pub mod probe;
pub mod scheduler;

pub use evaluator::Evaluator;
pub use probe::{Prober, TargetUrl};
pub use scheduler::Scheduler;
