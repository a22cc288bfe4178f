//! SFU signaling orchestrator: wraps a mediasoup worker pool behind the
//! `join` / `create-transport` / `connect-transport` / `produce` /
//! `consume` / `leave` operations that back voice channels.

pub mod error;
pub mod orchestrator;
pub mod participant;
pub mod room;
pub mod types;

pub use error::{OrchestratorError, OrchestratorResult};
pub use orchestrator::Orchestrator;
pub use types::{ConsumeResult, ExistingProducer, JoinResult, OrchestratorEvent, TransportDirection, TransportParams};
