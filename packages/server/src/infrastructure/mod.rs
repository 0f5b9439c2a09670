//! Infrastructure layer: wire-format DTOs and their conversion to domain types.

pub mod dto;
