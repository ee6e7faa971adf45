//! Illustrative services wired into the registry at bootstrap. Neither of
//! these reimplements a real AIS service body (Non-goal) — they exist only
//! to drive the service-handler contract end to end.

mod checkpoint;
mod membership;

pub use checkpoint::CheckpointService;
pub use membership::MembershipService;

use exec_services::ServiceHandler;

/// The fixed, ordered service table built at bootstrap (§4.G). Order
/// matters: it determines both the sync barrier's traversal order and the
/// wire dispatch table's layout (§4.H).
pub fn registered_services() -> Vec<Box<dyn ServiceHandler>> {
    vec![Box::new(MembershipService::new()), Box::new(CheckpointService::new())]
}
