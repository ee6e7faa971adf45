//! The configuration-change / sync barrier (spec §4.I).
//!
//! A `Regular` configuration change drives every service through
//! `sync_init` → `sync_process` (possibly several times) → `sync_activate`,
//! in registration order, before the barrier reopens. A `Transitional`
//! configuration interrupts an in-progress barrier with `sync_abort`
//! instead — the reference daemon's ring is about to change again before
//! the old one finished settling.

use exec_transport::{ConfigurationChange, ConfigurationType};

use crate::handler::ServiceHandler;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    Idle,
    Processing,
}

pub struct SyncOrchestrator {
    phase: Phase,
    current_service: usize,
}

impl SyncOrchestrator {
    pub fn new() -> Self {
        Self { phase: Phase::Idle, current_service: 0 }
    }

    /// Whether a sync is in progress — gates flow control for every
    /// service's flow-controlled requests (§4.E step 6).
    pub fn in_process(&self) -> bool {
        self.phase == Phase::Processing
    }

    /// React to a new configuration from the group-messaging layer.
    pub fn on_configuration_change(&mut self, services: &mut [Box<dyn ServiceHandler>], change: &ConfigurationChange) {
        for service in services.iter_mut() {
            service.confchg(change);
        }

        match change.configuration_type {
            ConfigurationType::Transitional => {
                if self.in_process() {
                    for service in services.iter_mut() {
                        service.sync_abort();
                    }
                }
                self.phase = Phase::Idle;
            }
            ConfigurationType::Regular => {
                for service in services.iter_mut() {
                    service.sync_init(change);
                }
                self.current_service = 0;
                self.phase = Phase::Processing;
                self.drive(services);
            }
        }
    }

    /// Step the barrier forward. Called after every configuration change
    /// and again whenever a service's own wire traffic might have unblocked
    /// it (`on_wire`). A no-op when idle.
    pub fn drive(&mut self, services: &mut [Box<dyn ServiceHandler>]) {
        if self.phase != Phase::Processing {
            return;
        }

        while self.current_service < services.len() {
            if services[self.current_service].sync_process() {
                self.current_service += 1;
            } else {
                return;
            }
        }

        for service in services.iter_mut() {
            service.sync_activate();
        }
        self.phase = Phase::Idle;
    }

    /// The sync protocol's own reserved wire slot (global dispatch id 0).
    /// Real ring barrier handshakes would land here; single-node operation
    /// never produces any, so there is nothing to do but accept the byte.
    pub fn on_wire(&mut self, payload: &[u8]) {
        let _ = payload;
    }
}

impl Default for SyncOrchestrator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::net::{IpAddr, Ipv4Addr};

    use exec_ipc::{Connection, DispatchOutcome};
    use exec_transport::{RequestHeader, RingId};

    use super::*;

    struct CountingService {
        process_calls_remaining: u32,
        activated: bool,
        aborted: bool,
    }

    impl ServiceHandler for CountingService {
        fn name(&self) -> &'static str {
            "counting"
        }

        fn lib_init(&mut self, _conn: &mut Connection, _h: RequestHeader, _b: &[u8]) -> DispatchOutcome {
            DispatchOutcome::Ok
        }

        fn lib_dispatch(&mut self, _conn: &mut Connection, _h: RequestHeader, _b: &[u8]) -> DispatchOutcome {
            DispatchOutcome::Ok
        }

        fn sync_process(&mut self) -> bool {
            if self.process_calls_remaining == 0 {
                true
            } else {
                self.process_calls_remaining -= 1;
                false
            }
        }

        fn sync_activate(&mut self) {
            self.activated = true;
        }

        fn sync_abort(&mut self) {
            self.aborted = true;
        }
    }

    fn change(configuration_type: ConfigurationType) -> ConfigurationChange {
        ConfigurationChange {
            configuration_type,
            member_list: vec![IpAddr::V4(Ipv4Addr::LOCALHOST)],
            left_list: vec![],
            joined_list: vec![],
            ring_id: RingId { rep: IpAddr::V4(Ipv4Addr::LOCALHOST), seq: 1 },
        }
    }

    #[test]
    fn regular_change_drives_to_completion_across_multiple_steps() {
        let mut services: Vec<Box<dyn ServiceHandler>> =
            vec![Box::new(CountingService { process_calls_remaining: 2, activated: false, aborted: false })];
        let mut orchestrator = SyncOrchestrator::new();

        orchestrator.on_configuration_change(&mut services, &change(ConfigurationType::Regular));
        assert!(orchestrator.in_process());

        orchestrator.drive(&mut services);
        assert!(orchestrator.in_process());

        orchestrator.drive(&mut services);
        assert!(!orchestrator.in_process());
    }

    #[test]
    fn transitional_change_aborts_in_progress_sync() {
        let mut services: Vec<Box<dyn ServiceHandler>> =
            vec![Box::new(CountingService { process_calls_remaining: 5, activated: false, aborted: false })];
        let mut orchestrator = SyncOrchestrator::new();

        orchestrator.on_configuration_change(&mut services, &change(ConfigurationType::Regular));
        assert!(orchestrator.in_process());

        orchestrator.on_configuration_change(&mut services, &change(ConfigurationType::Transitional));
        assert!(!orchestrator.in_process());
    }
}
