//! The per-client connection object (spec §4.B) and its receive/send state
//! machines (§4.E/§4.F), grounded on the reference daemon's
//! `poll_handler_libais_deliver` / `libais_send_response` pair.

use std::{io, io::Write, os::fd::RawFd, os::unix::net::UnixStream};

use exec_reactor::Token;
use exec_transport::{MESSAGE_SIZE_MAX, REQUEST_HEADER_SIZE, RequestHeader};
use tracing::warn;

use crate::{
    creds::{recv_with_creds, set_passcred},
    queue::BoundedQueue,
};

/// Outbound queue depth before a connection is dropped for not draining
/// (§4.F, §8 I5).
pub const OUTQ_CAPACITY: usize = 64;

/// Initial receive buffer size; grown on demand up to `MESSAGE_SIZE_MAX`
/// when a header announces a larger frame (§4.E).
const INITIAL_INBUF: usize = 4096;

/// Hard cap on inbound buffer growth: the fixed-capacity `SIZEINB` receive
/// buffer of §3 and §8 invariant I1 (`0 ≤ inb_inuse ≤ SIZEINB`). A frame can
/// never legally exceed `MESSAGE_SIZE_MAX` either (§4.H), so the same bound
/// serves both purposes. Enforced inside `fill()` itself rather than only in
/// `next_frame()`, so a peer that never completes a parseable frame (e.g.
/// one stuck unauthenticated and still streaming bytes) can't grow `inb`
/// without limit across ticks.
const SIZEINB: usize = MESSAGE_SIZE_MAX;

#[derive(Debug, thiserror::Error)]
pub enum ConnError {
    #[error("frame of {0} bytes exceeds the maximum message size")]
    TooLarge(u32),
    #[error("frame header declares a size smaller than the header itself")]
    Malformed,
    #[error("peer credentials were not supplied on first read")]
    Unauthenticated,
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Lifecycle state (§4.B). `DisconnectingDelayed` lets a final response sit
/// in the outbound queue before the fd is actually torn down.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnState {
    Active,
    DisconnectingDelayed,
    Disconnecting,
}

struct OutqItem {
    bytes: Vec<u8>,
}

/// One local IPC client. Owns the stream, the partially-assembled inbound
/// frame buffer, and the bounded outbound queue.
pub struct Connection {
    stream: UnixStream,
    pub token: Option<Token>,
    pub state: ConnState,
    /// `None` until the client's init request binds it to a service index
    /// (§4.B `service`, §4.G registry).
    pub service: Option<usize>,
    pub authenticated: bool,
    pub peer_uid: Option<u32>,
    pub peer_gid: Option<u32>,
    /// The gid an unprivileged peer must present to pass §4.E step 4's
    /// credential policy. `None` means "uid 0 only" (no group carve-out
    /// configured).
    expected_gid: Option<u32>,

    inb: Vec<u8>,
    inb_start: usize,
    inb_inuse: usize,

    outq: BoundedQueue<OutqItem>,
    byte_start: usize,
}

impl Connection {
    pub fn new(stream: UnixStream, expected_gid: Option<u32>) -> io::Result<Self> {
        stream.set_nonblocking(true)?;
        set_passcred(std::os::fd::AsRawFd::as_raw_fd(&stream), true)?;
        Ok(Self {
            stream,
            token: None,
            state: ConnState::Active,
            service: None,
            authenticated: false,
            peer_uid: None,
            peer_gid: None,
            expected_gid,
            inb: vec![0_u8; INITIAL_INBUF],
            inb_start: 0,
            inb_inuse: 0,
            outq: BoundedQueue::new(OUTQ_CAPACITY).expect("static outq capacity"),
            byte_start: 0,
        })
    }

    pub fn fd(&self) -> RawFd {
        std::os::fd::AsRawFd::as_raw_fd(&self.stream)
    }

    pub fn is_active(&self) -> bool {
        self.state == ConnState::Active
    }

    fn compact(&mut self) {
        if self.inb_inuse == 0 {
            self.inb_start = 0;
            return;
        }
        if self.inb_start == 0 {
            return;
        }
        self.inb.copy_within(self.inb_start..self.inb_start + self.inb_inuse, 0);
        self.inb_start = 0;
    }

    fn ensure_capacity(&mut self, needed: usize) {
        self.compact();
        let capped = needed.min(SIZEINB);
        if self.inb.len() < capped {
            self.inb.resize(capped, 0);
        }
    }

    /// Drain one `recvmsg` worth of data into the inbound buffer. Returns
    /// `Ok(0)` on a clean peer shutdown, `Err(WouldBlock)` when nothing is
    /// currently available. The peer's credentials are requested on every
    /// call until `authenticated` is latched true (§8 scenario 5).
    pub fn fill(&mut self) -> Result<usize, ConnError> {
        self.ensure_capacity(self.inb_start + self.inb_inuse + 4096);
        let tail = self.inb_start + self.inb_inuse;
        if tail >= self.inb.len() {
            // `inb` is already at its `SIZEINB` cap with no parseable frame
            // boundary in it; growing further would violate I1. A peer that
            // does this (e.g. streaming bytes while never completing a
            // frame, credentialed or not) is in protocol violation.
            return Err(ConnError::TooLarge(tail as u32));
        }
        let want_creds = !self.authenticated;
        let (n, cred) = recv_with_creds(self.fd(), &mut self.inb[tail..], want_creds)?;

        if n == 0 {
            return Ok(0);
        }

        if want_creds {
            let cred = cred.ok_or(ConnError::Unauthenticated)?;
            self.peer_uid = Some(cred.uid);
            self.peer_gid = Some(cred.gid);

            // §4.E step 4: accept root, or a peer whose gid matches the
            // configured expected gid. A rejected peer is logged as a
            // security event but the connection is left open — the policy
            // is re-evaluated on every subsequent receive, not just once
            // (§9 Design Notes: preserved for compatibility with the
            // reference daemon rather than closing on first failure).
            if cred.uid == 0 || self.expected_gid.is_some_and(|gid| gid == cred.gid) {
                self.authenticated = true;
                set_passcred(self.fd(), false)?;
            } else {
                warn!(security = true, uid = cred.uid, gid = cred.gid, "rejected unauthenticated peer credentials");
            }
        }

        self.inb_inuse += n;
        Ok(n)
    }

    /// Pop the next fully-buffered frame, if any. `Ok(None)` means "wait for
    /// more bytes", not an error.
    pub fn next_frame(&mut self) -> Result<Option<(RequestHeader, Vec<u8>)>, ConnError> {
        if self.inb_inuse < REQUEST_HEADER_SIZE {
            return Ok(None);
        }

        let header = RequestHeader::read_le(&self.inb[self.inb_start..self.inb_start + REQUEST_HEADER_SIZE]);
        let size = header.size as usize;
        if size < REQUEST_HEADER_SIZE {
            return Err(ConnError::Malformed);
        }
        if size > MESSAGE_SIZE_MAX {
            return Err(ConnError::TooLarge(header.size));
        }
        if self.inb_inuse < size {
            // Not enough buffered yet; make sure there's room for the rest
            // of this frame before the next `fill`.
            self.ensure_capacity(self.inb_start + size);
            return Ok(None);
        }

        let body = self.inb[self.inb_start + REQUEST_HEADER_SIZE..self.inb_start + size].to_vec();
        self.inb_start += size;
        self.inb_inuse -= size;
        if self.inb_inuse == 0 {
            self.inb_start = 0;
        }
        Ok(Some((header, body)))
    }

    pub fn outq_is_full(&self) -> bool {
        self.outq.is_full()
    }

    pub fn outq_is_empty(&self) -> bool {
        self.outq.is_empty()
    }

    /// Enqueue a fully-framed response. Callers must have already checked
    /// `outq_is_full` (§4.F: a full queue means disconnect, not block).
    pub fn enqueue(&mut self, framed: Vec<u8>) {
        self.outq.add(OutqItem { bytes: framed });
    }

    /// Best-effort drain of the outbound queue. Returns `true` once the
    /// queue is empty (the caller should then disarm `WRITE` interest).
    /// Partial writes are tracked via `byte_start` and resumed on the next
    /// call (§4.F).
    pub fn drain(&mut self) -> Result<bool, io::Error> {
        loop {
            let Some(item) = self.outq.get() else { return Ok(true) };
            match self.stream.write(&item.bytes[self.byte_start..]) {
                Ok(0) => return Err(io::Error::from(io::ErrorKind::WriteZero)),
                Ok(n) => {
                    self.byte_start += n;
                    if self.byte_start == item.bytes.len() {
                        self.byte_start = 0;
                        self.outq.remove();
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(false),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }
}
