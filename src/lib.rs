//! Pulsecheck - Proxy Liveness Checker
//!
//! A streaming liveness checker for HTTP CONNECT proxies.
//!
//! ## Features
//!
//! - CONNECT-tunnel probing with TLS-over-tunnel for HTTPS targets
//! - Multi-round evaluation with a configurable success threshold
//! - Bounded-concurrency batch scheduling (sequential windows)
//! - Live progress streamed over SSE
//! - Public-IP discovery via an IP-echo endpoint

pub mod api;
pub mod checker;
pub mod config;
pub mod error;
pub mod models;

pub use config::Config;
pub use error::{PulseError, Result};
