//! The service-handler contract (spec §4.G, Design Notes' polymorphic
//! service suggestion). Every AIS-style service (membership, checkpoint,
//! event, ...) the executive hosts implements this trait once and is slotted
//! into the registry in a fixed order at bootstrap.

use exec_ipc::{Connection, DispatchOutcome};
use exec_transport::{ConfigurationChange, RESPONSE_HEADER_SIZE, RequestHeader};

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("service '{name}' failed to initialize: {reason}")]
    InitFailed { name: &'static str, reason: String },
}

/// One pluggable service. `lib_init`/`lib_dispatch` serve local IPC clients;
/// `wire_deliver` serves totem-multicast messages this service registered
/// handlers for; `confchg` and the `sync_*` quartet track ring membership
/// (§4.I).
pub trait ServiceHandler {
    fn name(&self) -> &'static str;

    fn exec_init(&mut self) -> Result<(), ServiceError> {
        Ok(())
    }

    fn exec_exit(&mut self) {}

    /// A connection's first request selected this service; bind it or
    /// refuse the connection.
    fn lib_init(&mut self, conn: &mut Connection, header: RequestHeader, body: &[u8]) -> DispatchOutcome;

    /// Subsequent requests from a connection already bound to this service.
    fn lib_dispatch(&mut self, conn: &mut Connection, header: RequestHeader, body: &[u8]) -> DispatchOutcome;

    /// Whether `opcode` should be gated by the flow-control check while a
    /// sync is in progress (§4.E step 6). Most read-only queries answer
    /// `false`; most operations that mutate shared state answer `true`.
    fn flow_controlled(&self, opcode: u32) -> bool {
        let _ = opcode;
        true
    }

    /// The `(response_size, response_id)` pair a gated flow-controlled
    /// opcode's synthesized `TRY_AGAIN` response is framed with (§3 service
    /// descriptor's `response_size`/`response_id`, §4.E step 6, §8 I6,
    /// scenario 4). These are configured per opcode, independently of the
    /// gated request's own header — the reference daemon reads them out of
    /// `ais_service_handlers[...]->libais_handlers[header->id]`, never out
    /// of the request it's gating. The default echoes an empty body back
    /// under the request's own opcode, which is only correct for services
    /// that never override it.
    fn response_descriptor(&self, opcode: u32) -> (u32, u32) {
        (RESPONSE_HEADER_SIZE as u32, opcode)
    }

    /// How many totem wire message ids this service owns. The registry
    /// reserves a contiguous block of this size in the flat dispatch table
    /// (§4.H).
    fn wire_handler_count(&self) -> u32 {
        0
    }

    /// Deliver wire message `local_id` (already endianness-normalized) to
    /// this service. `local_id` is relative to this service's own block,
    /// not the global dispatch table index.
    fn wire_deliver(&mut self, local_id: u32, payload: &[u8]) {
        let _ = (local_id, payload);
    }

    fn confchg(&mut self, change: &ConfigurationChange) {
        let _ = change;
    }

    fn sync_init(&mut self, change: &ConfigurationChange) {
        let _ = change;
    }

    /// Advance this service's share of the sync barrier. Returning `false`
    /// means "not done yet, call again" (e.g. waiting on further wire
    /// rounds); the orchestrator will not advance to the next service
    /// until this returns `true`.
    fn sync_process(&mut self) -> bool {
        true
    }

    fn sync_activate(&mut self) {}

    fn sync_abort(&mut self) {}

    /// Drain wire messages this service wants multicast to the ring,
    /// addressed by the local id within this service's own wire block
    /// (the registry translates to the global dispatch id). Called once per
    /// reactor tick; most services never populate anything here.
    fn take_outbound(&mut self) -> Vec<(u32, Vec<u8>)> {
        Vec::new()
    }

    /// Free-form diagnostic dump (used by the `dump()` operation in
    /// original tooling; here mostly useful for tests/logging).
    fn dump(&self) -> String {
        String::new()
    }
}
