//! A minimal key/value checkpoint-like service, standing in for the real
//! `CKPT` service (Non-goal: no real checkpoint body). Exists to exercise
//! the wire-dispatch table (§4.H) alongside the local IPC path: writes
//! arrive locally and are mirrored out over the group transport, then
//! applied when they're delivered back.

use exec_ipc::{Connection, DispatchOutcome};
use exec_services::{ServiceHandler, ack};
use exec_transport::RequestHeader;

pub const OP_WRITE: u32 = 0;
pub const WIRE_APPLY_WRITE: u32 = 0;

pub struct CheckpointService {
    store: Vec<Vec<u8>>,
    pending: Vec<(u32, Vec<u8>)>,
}

impl CheckpointService {
    pub fn new() -> Self {
        Self { store: Vec::new(), pending: Vec::new() }
    }

    pub fn entries(&self) -> &[Vec<u8>] {
        &self.store
    }
}

impl Default for CheckpointService {
    fn default() -> Self {
        Self::new()
    }
}

impl ServiceHandler for CheckpointService {
    fn name(&self) -> &'static str {
        "checkpoint"
    }

    fn lib_init(&mut self, conn: &mut Connection, header: RequestHeader, _body: &[u8]) -> DispatchOutcome {
        ack(conn, header)
    }

    fn lib_dispatch(&mut self, conn: &mut Connection, header: RequestHeader, body: &[u8]) -> DispatchOutcome {
        match header.id {
            OP_WRITE => {
                self.pending.push((WIRE_APPLY_WRITE, body.to_vec()));
                ack(conn, header)
            }
            _ => {
                let _ = body;
                DispatchOutcome::Disconnect
            }
        }
    }

    fn wire_handler_count(&self) -> u32 {
        1
    }

    fn wire_deliver(&mut self, local_id: u32, payload: &[u8]) {
        if local_id == WIRE_APPLY_WRITE {
            self.store.push(payload.to_vec());
        }
    }

    fn take_outbound(&mut self) -> Vec<(u32, Vec<u8>)> {
        std::mem::take(&mut self.pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_delivery_applies_the_write() {
        let mut service = CheckpointService::new();
        service.wire_deliver(WIRE_APPLY_WRITE, b"value-1");
        assert_eq!(service.entries(), &[b"value-1".to_vec()]);
    }

    #[test]
    fn a_local_write_is_queued_for_multicast_rather_than_applied_directly() {
        let mut service = CheckpointService::new();
        service.pending.push((WIRE_APPLY_WRITE, b"value-2".to_vec()));
        assert!(service.entries().is_empty());
        assert_eq!(service.take_outbound(), vec![(WIRE_APPLY_WRITE, b"value-2".to_vec())]);
        assert!(service.take_outbound().is_empty());
    }
}
