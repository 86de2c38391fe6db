//! Pulsekeeper - heartbeat scheduler and admission throttle for P2P nodes
//!
//! This crate provides the internal clock of a peer-to-peer node: a
//! [`Heart`](heart::Heart) that ticks every beat, rolls cycles and epochs over
//! and rotates the node's personality, and a [`Guard`](guard::Guard) that
//! throttles inbound connections using the same beat as its unit of time.

pub mod config;
pub mod error;
pub mod guard;
pub mod heart;
