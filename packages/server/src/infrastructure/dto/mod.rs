//! Data Transfer Objects (DTOs) for the chat protocol.
//!
//! - `websocket`: JSON payloads exchanged over the WebSocket
//! - `conversion`: DTO ⇔ domain model conversions

pub mod conversion;
pub mod websocket;
