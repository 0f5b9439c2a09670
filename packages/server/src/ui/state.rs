//! Server state shared by the handlers.

use crate::{config::SessionConfig, hub::BrokerHandle};

/// Shared application state
pub struct AppState {
    /// Address of the process-wide broker loop
    pub broker: BrokerHandle,
    /// Settings applied to every new session
    pub config: SessionConfig,
}
