//! Local-client IPC: framed request/response over an abstract-namespace
//! unix socket, with credential-based auth and per-connection backpressure
//! (spec §4.A-F).

mod acceptor;
mod connection;
mod creds;
mod queue;
mod server;

pub use acceptor::{LISTEN_BACKLOG, bind_ipc_listener};
pub use connection::{ConnError, ConnState, Connection, OUTQ_CAPACITY};
pub use queue::{BoundedQueue, QueueError};
pub use server::{DispatchOutcome, RequestRouter, bind_and_register};
