//! Sluice - In-Process Rate Limiting
//!
//! This crate implements a family of interchangeable admission-control
//! strategies: fixed window, sliding window, tiered sliding log, leaky
//! bucket, and token bucket. Each limiter guards one resource, keeps its
//! state in memory for the lifetime of the process, and answers a single
//! synchronous question: may one unit of work proceed right now?

pub mod clock;
pub mod config;
pub mod error;
pub mod limiter;
