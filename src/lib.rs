#![cfg_attr(not(test), deny(clippy::panic))]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::struct_excessive_bools,
    clippy::too_many_arguments,
    clippy::too_many_lines,
    clippy::similar_names
)]

//! # Land Sync Gateway
//!
//! A real-time multi-room WebSocket state-synchronization gateway: clients
//! join a "land" (a room instance), an external `LandKeeper` owns that
//! land's game logic, and this crate handles membership, wire codecs, and
//! the periodic diff-and-fan-out sync cycle that keeps every connected
//! player's view current.
//!
//! Zero external game-logic dependencies -- the keeper is supplied by the
//! application; this crate only moves state and events across the wire.

/// Wire codec registry: message envelopes and state-update frames
pub mod codec;

/// Server configuration and environment variables
pub mod config;

/// The land-sync core: membership, sync engine, and the per-room/process-wide orchestrators
pub mod land;

/// Structured logging configuration
pub mod logging;

/// Metrics collection and reporting
pub mod metrics;

/// TLS and client-certificate-fingerprint utilities
pub mod security;

/// WebSocket connection handling
pub mod websocket;
