//! The real-time signaling front door: translates the tagged-union event
//! protocol into `vane-voice` orchestrator calls and `vane-store` calls,
//! and fans out presence/membership/voice events back to every connected
//! client that should see them.

pub mod gateway;
pub mod membership;
pub mod presence;
pub mod protocol;
pub mod session;

pub use gateway::{build_router, GatewayState};
pub use protocol::ServerEvent;
