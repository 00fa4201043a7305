//! Gatekeeper - Token Bucket Admission Control
//!
//! This crate implements the admission-control core of an API gateway. Each
//! route, client or backend gets its own self-refilling token bucket, held in
//! a sharded keyed store, and callers receive a plain allow/deny decision.
//! Counters are built on a small portable atomics layer that falls back to
//! mutexes on targets without native 64-bit atomics.

pub mod atomic;
pub mod config;
pub mod error;
pub mod proxy;
pub mod ratelimit;
