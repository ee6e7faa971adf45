use tracing::warn;

/// Raise the calling thread into the `SCHED_RR` realtime band at the given
/// priority (clamped to the values the kernel will actually accept).
///
/// Requires `CAP_SYS_NICE`. If the call fails (unprivileged process), the
/// executive keeps running under the default scheduling class; this mirrors
/// the reference daemon, which only warns on failure rather than treating it
/// as fatal.
#[cfg(target_os = "linux")]
pub fn raise_to_realtime_round_robin(priority: i32) {
    let param = libc::sched_param { sched_priority: priority };
    let code = unsafe { libc::sched_setscheduler(0, libc::SCHED_RR, &param) };
    if code != 0 {
        warn!(priority, "could not set SCHED_RR realtime scheduling");
    }
}

#[cfg(not(target_os = "linux"))]
pub fn raise_to_realtime_round_robin(priority: i32) {
    warn!(priority, "realtime scheduling only supported on linux");
}

/// Lock all current and future process memory resident, preventing page
/// faults from interrupting latency-sensitive request handling.
#[cfg(target_os = "linux")]
pub fn lock_memory_resident() {
    unsafe {
        let rlimit = libc::rlimit { rlim_cur: libc::RLIM_INFINITY, rlim_max: libc::RLIM_INFINITY };
        libc::setrlimit(libc::RLIMIT_MEMLOCK, &rlimit);

        if libc::mlockall(libc::MCL_CURRENT | libc::MCL_FUTURE) != 0 {
            warn!("could not lock memory resident, page faults may interrupt healthchecking");
        }
    }
}

#[cfg(not(target_os = "linux"))]
pub fn lock_memory_resident() {
    warn!("memory locking only supported on linux");
}
