//! Utilities shared between Hiroba binaries.

pub mod logger;
