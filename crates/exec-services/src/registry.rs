//! The fixed ordered service table and the flat wire-dispatch table built
//! from it (spec §4.G/§4.H), plus the local-IPC routing (`RequestRouter`)
//! that ties the flow-control gate to the sync barrier (§4.E step 6, §4.I).

use exec_ipc::{Connection, DispatchOutcome, RequestRouter};
use exec_transport::{ConfigurationChange, ERR_OK, ERR_TRY_AGAIN, RESPONSE_HEADER_SIZE, RequestHeader, ResponseHeader};
use tracing::warn;

use crate::{handler::ServiceHandler, sync::SyncOrchestrator};

enum WireSlot {
    /// Reserved slot 0: the sync barrier's own protocol messages (§4.H).
    Sync,
    Service { service_index: usize, local_id: u32 },
}

/// Owns every registered service plus the flat dispatch table derived from
/// them. Built once at bootstrap (§4.J) and never resized afterward.
pub struct ServiceRegistry {
    services: Vec<Box<dyn ServiceHandler>>,
    wire_table: Vec<WireSlot>,
    /// Global dispatch id of each service's first wire handler, indexed by
    /// service_index. Used to translate a service's own local ids to the
    /// flat table's addressing when it submits outbound wire traffic.
    wire_bases: Vec<u32>,
    sync: SyncOrchestrator,
    /// The transport's `send_ok(size)` admission test (§4.E step 6), wired
    /// in by bootstrap once a real `GroupTransport` exists. Defaults to
    /// always-admit so tests and callers that never wire one still see the
    /// sync-barrier half of the flow-control gate behave correctly.
    admission: Box<dyn Fn(usize) -> bool>,
}

impl ServiceRegistry {
    /// Build the registry from an ordered list of services, concatenating a
    /// reserved sync slot with each service's wire handler block in
    /// registration order (§4.H: "dense, built once, never resized").
    pub fn build(services: Vec<Box<dyn ServiceHandler>>) -> Self {
        let mut wire_table = vec![WireSlot::Sync];
        let mut wire_bases = Vec::with_capacity(services.len());
        for (service_index, service) in services.iter().enumerate() {
            wire_bases.push(wire_table.len() as u32);
            for local_id in 0..service.wire_handler_count() {
                wire_table.push(WireSlot::Service { service_index, local_id });
            }
        }
        Self { services, wire_table, wire_bases, sync: SyncOrchestrator::new(), admission: Box::new(|_size| true) }
    }

    /// Wire in the transport's real admission test (§4.E step 6,
    /// §6 "send_ok(size)"). Until this is called, the gate behaves as if
    /// the transport always has room.
    pub fn set_admission_test(&mut self, f: impl Fn(usize) -> bool + 'static) {
        self.admission = Box::new(f);
    }

    pub fn exec_init_all(&mut self) -> Result<(), crate::handler::ServiceError> {
        for service in &mut self.services {
            service.exec_init()?;
        }
        Ok(())
    }

    pub fn exec_exit_all(&mut self) {
        for service in &mut self.services {
            service.exec_exit();
        }
    }

    /// `USR2`'s diagnostic dump (§4.J, §6: "each service's `exec_dump_fn` is
    /// invoked"). Returns one `(name, dump)` pair per registered service.
    pub fn dump_all(&self) -> Vec<(&'static str, String)> {
        self.services.iter().map(|s| (s.name(), s.dump())).collect()
    }

    pub fn service_count(&self) -> usize {
        self.services.len()
    }

    /// Drive a membership change through every service's `confchg` hook and
    /// then, for a `Regular` configuration, the sync barrier (§4.I).
    pub fn on_configuration_change(&mut self, change: &ConfigurationChange) {
        self.sync.on_configuration_change(&mut self.services, change);
    }

    /// Step the sync barrier forward outside of a configuration change
    /// (e.g. after processing sync-relevant wire traffic). A no-op when no
    /// sync is in progress.
    pub fn drive_sync(&mut self) {
        self.sync.drive(&mut self.services);
    }

    pub fn sync_in_process(&self) -> bool {
        self.sync.in_process()
    }

    /// Drain every service's pending outbound wire traffic, translating each
    /// message's service-local id to its global dispatch-table address so
    /// the caller can hand the pair straight to a `GroupTransport`.
    pub fn take_outbound(&mut self) -> Vec<(u32, Vec<u8>)> {
        let mut drained = Vec::new();
        for (service_index, service) in self.services.iter_mut().enumerate() {
            let base = self.wire_bases[service_index];
            for (local_id, payload) in service.take_outbound() {
                drained.push((base + local_id, payload));
            }
        }
        drained
    }

    /// Deliver a totem wire message addressed by its global dispatch-table
    /// id. Applies the tightened bounds check (`id >= table.len()` is the
    /// only way to be out of range; `.get` already enforces that) before
    /// indexing into either the sync protocol or a service.
    pub fn deliver_wire(&mut self, global_id: u32, payload: &[u8]) {
        let Some(slot) = self.wire_table.get(global_id as usize) else {
            warn!(global_id, "wire dispatch id out of range, dropping message");
            return;
        };
        match *slot {
            WireSlot::Sync => {
                self.sync.on_wire(payload);
                self.sync.drive(&mut self.services);
            }
            WireSlot::Service { service_index, local_id } => {
                self.services[service_index].wire_deliver(local_id, payload)
            }
        }
    }
}

impl RequestRouter for ServiceRegistry {
    fn init(&mut self, conn: &mut Connection, header: RequestHeader, body: &[u8]) -> DispatchOutcome {
        let Some(service) = self.services.get_mut(header.id as usize) else {
            warn!(requested = header.id, "init requested an unknown service, disconnecting");
            return DispatchOutcome::Disconnect;
        };

        let outcome = service.lib_init(conn, header, body);
        if outcome == DispatchOutcome::Ok {
            conn.service = Some(header.id as usize);
        }
        outcome
    }

    fn dispatch(&mut self, conn: &mut Connection, header: RequestHeader, body: &[u8]) -> DispatchOutcome {
        let idx = conn.service.expect("dispatch is only reachable once a connection is bound to a service");

        // §4.E step 6: a flow-controlled opcode only runs if the transport
        // has room AND no sync is in progress; either condition failing
        // gates it out with a synthesized TRY_AGAIN.
        let admitted = (self.admission)(1000 + header.size as usize) && !self.sync.in_process();
        if self.services[idx].flow_controlled(header.id) && !admitted {
            if conn.outq_is_full() {
                return DispatchOutcome::Disconnect;
            }
            // §3 service descriptor / §8 I6 / scenario 4: the synthesized
            // response is framed with the handler's own configured
            // `response_size`/`response_id`, not the gated request's.
            let (response_size, response_id) = self.services[idx].response_descriptor(header.id);
            let framed = ResponseHeader::framed(response_size, response_id, ERR_TRY_AGAIN, &[]);
            conn.enqueue(framed);
            return DispatchOutcome::Ok;
        }

        self.services[idx].lib_dispatch(conn, header, body)
    }
}

/// Convenience for services that just want to acknowledge a request with an
/// empty, `ERR_OK` response.
pub fn ack(conn: &mut Connection, header: RequestHeader) -> DispatchOutcome {
    if conn.outq_is_full() {
        return DispatchOutcome::Disconnect;
    }
    conn.enqueue(ResponseHeader::framed(RESPONSE_HEADER_SIZE as u32, header.id, ERR_OK, &[]));
    DispatchOutcome::Ok
}
