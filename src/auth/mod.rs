//! Authorization state and the device-flow orchestrator

mod flow;
mod store;

pub use flow::DeviceFlow;
pub use store::{AuthStatus, CredentialStore};
