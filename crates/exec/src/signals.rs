//! Async-signal-safe shutdown/dump latches (spec §4.J, §6: "`USR2` ⇒ each
//! service's `exec_dump_fn` is invoked"; "`INT` ⇒ emit statistics and exit
//! cleanly"). `signal_hook`'s flag registration does the only thing that's
//! safe inside a signal handler — flip an atomic — and the reactor's run
//! loop polls it once per wait iteration (§9 Design Notes: "safer design is
//! to set an atomic flag and service the dump from the reactor tick").

use std::sync::{Arc, atomic::AtomicBool};

use signal_hook::{consts::{SIGINT, SIGTERM, SIGUSR2}, flag};

pub struct Signals {
    pub shutdown: Arc<AtomicBool>,
    pub dump: Arc<AtomicBool>,
}

impl Signals {
    /// Register `SIGINT`/`SIGTERM` as shutdown requests and `SIGUSR2` as a
    /// diagnostic-dump request, mirroring the reference daemon's own
    /// handler split between teardown and dump signals.
    pub fn install() -> std::io::Result<Self> {
        let shutdown = Arc::new(AtomicBool::new(false));
        let dump = Arc::new(AtomicBool::new(false));

        flag::register(SIGINT, shutdown.clone())?;
        flag::register(SIGTERM, shutdown.clone())?;
        flag::register(SIGUSR2, dump.clone())?;

        Ok(Self { shutdown, dump })
    }

    pub fn shutdown_requested(&self) -> bool {
        self.shutdown.load(std::sync::atomic::Ordering::Relaxed)
    }

    /// Consume a pending dump request, if any. The handler re-arms itself
    /// automatically (`signal_hook::flag` leaves the disposition installed),
    /// matching the spec's "re-arming the handler".
    pub fn take_dump_request(&self) -> bool {
        self.dump.swap(false, std::sync::atomic::Ordering::Relaxed)
    }
}
