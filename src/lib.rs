//! Turnstile - Atomic Multi-Limiter Admission Control
//!
//! This crate decides, in one indivisible step, whether a request may proceed
//! against a batch of named rate limiters. Each limiter is a time-domain token
//! bucket whose whole state is a single timestamp, and a batch is admitted only
//! when every limiter in it has capacity for the request's cost.

pub mod clock;
pub mod config;
pub mod error;
pub mod ratelimit;
pub mod server;
pub mod store;
