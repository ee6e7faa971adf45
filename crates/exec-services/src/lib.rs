//! The service-plugin model: a fixed, ordered table of service handlers, a
//! flat wire-dispatch table built from it, and the sync barrier that drives
//! configuration changes through them (spec §4.G/§4.H/§4.I).

mod handler;
mod registry;
mod sync;

pub use handler::{ServiceError, ServiceHandler};
pub use registry::{ServiceRegistry, ack};
pub use sync::SyncOrchestrator;
