//! # Aetharia Server Library
//!
//! The authoritative simulation node for the Aetharia world. This library
//! owns terrain synthesis, the mutable world state, player physics,
//! zone-scoped message routing and the anti-abuse perimeter; the binary in
//! `main.rs` only wires configuration, logging and the listener around it.
//!
//! ## Architecture
//!
//! A single [`state::ServerState`] value owns every shared table (world
//! store, player registry, zone index, connection table) and is passed
//! explicitly into each task. There are no module-level singletons, so
//! tests build as many independent servers as they need.
//!
//! Three long-lived task families run against that state:
//!
//! - **Per-session reader/writer pairs** ([`session`]): each accepted
//!   WebSocket gets a reader task that rate-limits, parses and routes
//!   inbound frames, and a writer task draining the session's outbound
//!   channel.
//! - **The physics loop** ([`physics`]): one 50 ms timer task, the sole
//!   writer of vertical motion, emitting corrections and zone-scoped
//!   movement.
//! - **The heartbeat** ([`session::run_heartbeat`]): pings every session
//!   each period and hard-closes those whose previous ping went
//!   unanswered.
//!
//! ## Authority model
//!
//! Clients propose horizontal movement and jump intent; the server owns
//! vertical position absolutely. Every mutation of the world goes through
//! the validated router paths, and every outbound event is scoped to the
//! zone of its origin.

pub mod broadcast;
pub mod physics;
pub mod registry;
pub mod router;
pub mod session;
pub mod state;
pub mod terrain;
pub mod util;
pub mod world;
pub mod zones;
