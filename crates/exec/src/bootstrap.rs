//! The executive's startup and run sequence (spec §4.J), grounded on the
//! reference daemon's `main()`: resolve identity, stand up the reactor and
//! signal handlers, read config and key material, raise scheduling class
//! and lock memory, read the secret key, initialize the group-messaging
//! transport, drop privileges, build the service registry and its wire
//! dispatch table, bind the local IPC listener, then run until a shutdown
//! signal lands.

use std::{
    cell::RefCell,
    net::{IpAddr, Ipv4Addr},
    path::Path,
    rc::Rc,
    time::Duration,
};

use exec_reactor::Reactor;
use exec_services::ServiceRegistry;
use exec_transport::{ConfigurationChange, ConfigurationType, GroupTransport, LoopbackTransport, RequestHeader, RingId};
use tracing::{info, warn};

use crate::{config::ExecConfig, signals::Signals};

#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    #[error("failed to resolve the expected gid: {0}")]
    Gid(#[from] crate::identity::IdentityError),
    #[error("failed to create the reactor: {0}")]
    Reactor(#[source] std::io::Error),
    #[error("failed to install signal handlers: {0}")]
    Signals(#[source] std::io::Error),
    #[error(transparent)]
    Config(#[from] crate::config::ConfigError),
    #[error("failed to initialize logging: {0}")]
    Logging(String),
    #[error(transparent)]
    Key(#[from] crate::key::KeyError),
    #[error("failed to bind the local IPC listener: {0}")]
    Ipc(#[source] std::io::Error),
    #[error("service initialization failed: {0}")]
    Service(#[from] exec_services::ServiceError),
    #[error("failed to drop privileges: {0}")]
    PrivDrop(#[source] std::io::Error),
}

impl BootstrapError {
    /// The distinct negative exit sentinel for this failure class (§6).
    /// Lifted from the reference daemon's `enum e_ais_done` where a direct
    /// analogue exists (`original_source/exec/main.c`); variants with no
    /// equivalent startup step there continue the same negative sequence.
    /// `main` passes this straight to `std::process::exit`.
    pub fn exit_sentinel(&self) -> i32 {
        match self {
            BootstrapError::Gid(_) => -3,      // AIS_DONE_GID_DETERMINE
            BootstrapError::Reactor(_) => -5,  // AIS_DONE_FORK (nearest bootstrap-plumbing analogue)
            BootstrapError::Signals(_) => -12, // no original analogue
            BootstrapError::Config(_) => -9,   // AIS_DONE_MAINCONFIGREAD
            BootstrapError::Logging(_) => -10, // AIS_DONE_LOGSETUP
            BootstrapError::Key(_) => -8,      // AIS_DONE_READKEY
            BootstrapError::Ipc(_) => -7,      // AIS_DONE_LIBAIS_BIND
            BootstrapError::Service(_) => -13, // no original analogue (exec_init_fn failure)
            BootstrapError::PrivDrop(_) => -14, // no original analogue
        }
    }
}

pub fn run(config_path: &Path, foreground: bool) -> Result<(), BootstrapError> {
    let starting_uid = unsafe { libc::getuid() };

    let mut reactor = Reactor::create().map_err(BootstrapError::Reactor)?;
    let signals = Signals::install().map_err(BootstrapError::Signals)?;

    let config = ExecConfig::load(config_path)?;
    let expected_gid = crate::identity::resolve_expected_gid(&config.expected_group)?;

    crate::logging::init(&config, foreground).map_err(BootstrapError::Logging)?;
    info!(uid = starting_uid, socket = %config.socket_name, group = %config.expected_group, "executive starting");

    if config.realtime_priority > 0 {
        exec_utils::scheduling::raise_to_realtime_round_robin(config.realtime_priority);
    }
    exec_utils::scheduling::lock_memory_resident();

    let _key = crate::key::read_key(&config.key_path)?;

    // Initialize the group-messaging transport (§4.J step "totempg init").
    // Deliveries land in `mailbox`, decoded in place; the run loop drains it
    // each tick and routes into the service registry (§4.H).
    let mailbox: Rc<RefCell<Vec<(u32, Vec<u8>)>>> = Rc::new(RefCell::new(Vec::new()));
    let mailbox_for_deliver = mailbox.clone();
    let transport = Rc::new(RefCell::new(LoopbackTransport::new(config.transport_send_ok_budget, move |raw: &[u8]| {
        match exec_transport::decode_wire_message(&[raw], false) {
            Ok((header, body)) => mailbox_for_deliver.borrow_mut().push((header.id, body)),
            Err(e) => warn!(error = %e, "dropping malformed wire delivery"),
        }
    })));
    let transport_for_admission: Rc<RefCell<dyn GroupTransport>> = transport.clone();

    if let Some(user) = &config.run_as_user {
        crate::privdrop::drop_privileges(user).map_err(BootstrapError::PrivDrop)?;
        info!(user, "dropped privileges");
    }

    let mut registry = ServiceRegistry::build(crate::services::registered_services());
    registry.set_admission_test(move |size| transport_for_admission.borrow().send_ok(size));
    registry.exec_init_all()?;
    // AMF config is carried through but has no body to initialize
    // (Non-goal: no real AMF service).
    let _ = &config.amf;

    let registry = Rc::new(RefCell::new(registry));
    exec_ipc::bind_and_register(&mut reactor, &config.socket_name, registry.clone(), expected_gid)
        .map_err(BootstrapError::Ipc)?;

    // Single-node operation has no real ring to join; synthesize the
    // initial "we are the whole membership" configuration change the real
    // TOTEMPG would otherwise deliver once the transport comes up, so the
    // sync barrier (§4.I) still runs once at startup.
    registry.borrow_mut().on_configuration_change(&ConfigurationChange {
        configuration_type: ConfigurationType::Regular,
        member_list: vec![IpAddr::V4(Ipv4Addr::LOCALHOST)],
        left_list: vec![],
        joined_list: vec![IpAddr::V4(Ipv4Addr::LOCALHOST)],
        ring_id: RingId { rep: IpAddr::V4(Ipv4Addr::LOCALHOST), seq: 1 },
    });

    info!("executive running");
    while !signals.shutdown_requested() {
        reactor.poll_once(Some(Duration::from_millis(100))).map_err(BootstrapError::Reactor)?;

        if signals.take_dump_request() {
            for (name, dump) in registry.borrow().dump_all() {
                info!(service = name, dump = %dump, "USR2 diagnostic dump");
            }
        }

        // Drain wire deliveries the transport collected this tick (§4.H),
        // then anything services want multicast in response, then step the
        // sync barrier in case a delivery unblocked it (§4.I).
        let deliveries = std::mem::take(&mut *mailbox.borrow_mut());
        for (global_id, payload) in deliveries {
            registry.borrow_mut().deliver_wire(global_id, &payload);
        }

        let outbound = registry.borrow_mut().take_outbound();
        for (global_id, payload) in outbound {
            let mut frame = vec![0_u8; exec_transport::REQUEST_HEADER_SIZE];
            RequestHeader { size: (exec_transport::REQUEST_HEADER_SIZE + payload.len()) as u32, id: global_id }
                .write_le(&mut frame);
            frame.extend_from_slice(&payload);
            if let Err(e) = transport.borrow_mut().multicast(&frame) {
                warn!(error = %e, "multicast failed");
            }
        }

        registry.borrow_mut().drive_sync();
    }

    info!(connections = reactor.len(), services = registry.borrow().service_count(), "shutdown signal received");
    registry.borrow_mut().exec_exit_all();
    Ok(())
}
