//! Connection management for the broker session
//!
//! This module handles:
//! - Dialing the broker with fixed-interval, unbounded retry
//! - One-time subscription setup per session
//! - Feeding deliveries to the single command worker
//! - Reconnecting after session loss and stopping on request

mod manager;

pub use manager::{ConnectionEvent, ConnectionManager};
