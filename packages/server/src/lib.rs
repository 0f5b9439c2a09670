//! Group chat room broker.
//!
//! Clients connect over WebSocket, name a room in their first message, and
//! from then on every text they send is fanned out to all members of that
//! room. Rooms are created on the first join and torn down when the last
//! member leaves.

// layers
pub mod domain;
pub mod hub;
pub mod infrastructure;
pub mod session;
pub mod ui;

pub mod config;
