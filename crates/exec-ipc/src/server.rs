//! Wiring the acceptor and per-connection deliver loop into the reactor
//! (spec §4.D/§4.E/§4.F). This is the busiest subsystem in the executive:
//! every byte a local client sends or receives passes through here.

use std::{cell::RefCell, io, os::fd::RawFd, os::unix::net::UnixListener, rc::Rc};

use exec_reactor::{Control, EventMask, Handler, Reactor, Spawner, Token};
use exec_transport::RequestHeader;
use tracing::{debug, warn};

use crate::connection::{ConnError, ConnState, Connection};

/// What a [`RequestRouter`] tells the deliver loop to do after handling one
/// frame. Responses, if any, have already been placed on the connection's
/// outbound queue by the router before it returns.
#[derive(Debug, PartialEq, Eq)]
pub enum DispatchOutcome {
    Ok,
    Disconnect,
}

/// The service-dispatch boundary (§4.G/§4.H) as seen from the IPC layer.
/// Implemented by the service registry; the IPC layer only knows how to
/// call into it, never what's behind it.
pub trait RequestRouter {
    /// First request seen on a connection. Implementations bind
    /// `conn.service` on success.
    fn init(&mut self, conn: &mut Connection, header: RequestHeader, body: &[u8]) -> DispatchOutcome;

    /// Every subsequent request once `conn.service` is bound.
    fn dispatch(&mut self, conn: &mut Connection, header: RequestHeader, body: &[u8]) -> DispatchOutcome;
}

struct ConnHandler {
    conn: Connection,
    router: Rc<RefCell<dyn RequestRouter>>,
    write_armed: bool,
}

impl ConnHandler {
    /// Drain every frame currently buffered, routing each one. Returns
    /// `Control::Remove` on EOF, a transport error, or a protocol
    /// violation; the caller is expected to tear the connection down.
    fn handle_readable(&mut self) -> Control {
        loop {
            match self.conn.fill() {
                Ok(0) => return Control::Remove,
                Ok(_) => {}
                Err(ConnError::Io(e)) if e.kind() == io::ErrorKind::WouldBlock => return Control::Continue,
                Err(ConnError::Io(e)) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    debug!(error = %e, "dropping connection on read failure");
                    return Control::Remove;
                }
            }

            // §4.E step 4 / §7 error kind 6: `authenticated` only gates
            // whether credentials keep being requested on the next `fill`
            // (§4.E step 2) — it never gates dispatch itself. The reference
            // daemon's `poll_handler_libais_deliver` parses and routes every
            // buffered frame unconditionally, init included.
            loop {
                match self.conn.next_frame() {
                    Ok(None) => break,
                    Ok(Some((header, body))) => {
                        let outcome = {
                            let mut router = self.router.borrow_mut();
                            if self.conn.service.is_none() {
                                router.init(&mut self.conn, header, &body)
                            } else {
                                router.dispatch(&mut self.conn, header, &body)
                            }
                        };
                        if outcome == DispatchOutcome::Disconnect {
                            self.conn.state = ConnState::DisconnectingDelayed;
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "protocol violation, dropping connection");
                        return Control::Remove;
                    }
                }
            }

            if !self.conn.is_active() {
                return Control::Continue;
            }
        }
    }
}

impl Handler for ConnHandler {
    fn on_event(&mut self, _fd: RawFd, token: Token, mask: EventMask, spawner: &mut Spawner<'_>) -> Control {
        self.conn.token = Some(token);

        if mask.contains(EventMask::INVAL) {
            return Control::Remove;
        }

        if mask.contains(EventMask::READ) {
            if let Control::Remove = self.handle_readable() {
                return Control::Remove;
            }
        }

        // The queue invariant: `write_armed == !conn.outq_is_empty()`
        // (mirrors the reference transport's own armed-writable bookkeeping).
        match self.conn.drain() {
            Ok(true) => {
                if !self.conn.is_active() {
                    return Control::Remove;
                }
                if self.write_armed {
                    let _ = spawner.reregister_self(self.conn.fd(), token, EventMask::READ);
                    self.write_armed = false;
                }
            }
            Ok(false) => {
                if !self.write_armed {
                    let _ = spawner.reregister_self(self.conn.fd(), token, EventMask::READ | EventMask::WRITE);
                    self.write_armed = true;
                }
            }
            Err(e) => {
                debug!(error = %e, "dropping connection on write failure");
                return Control::Remove;
            }
        }

        Control::Continue
    }
}

/// The listening socket's handler: accepts until `WouldBlock`, registering
/// each new client with its own [`ConnHandler`].
struct ListenerHandler {
    listener: UnixListener,
    router: Rc<RefCell<dyn RequestRouter>>,
    expected_gid: Option<u32>,
}

impl Handler for ListenerHandler {
    fn on_event(&mut self, _fd: RawFd, _token: Token, _mask: EventMask, spawner: &mut Spawner<'_>) -> Control {
        loop {
            match self.listener.accept() {
                Ok((stream, _addr)) => match Connection::new(stream, self.expected_gid) {
                    Ok(conn) => {
                        let handler =
                            Box::new(ConnHandler { conn, router: self.router.clone(), write_armed: false });
                        if let Err(e) = spawner.add(handler.conn.fd(), EventMask::READ, handler) {
                            warn!(error = %e, "failed to register accepted connection");
                        }
                    }
                    Err(e) => warn!(error = %e, "failed to prepare accepted connection"),
                },
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    warn!(error = %e, "accept failed");
                    break;
                }
            }
        }
        Control::Continue
    }
}

/// Bind the local-client listener and register it with `reactor`. `name` is
/// the abstract-namespace (or, off Linux, path-backed) socket name.
/// `expected_gid` is forwarded to every accepted connection's credential
/// policy (§4.E step 4); `None` restricts acceptance to uid 0 peers only.
pub fn bind_and_register(
    reactor: &mut Reactor,
    name: &str,
    router: Rc<RefCell<dyn RequestRouter>>,
    expected_gid: Option<u32>,
) -> io::Result<Token> {
    let listener = crate::acceptor::bind_ipc_listener(name)?;
    let fd = std::os::fd::AsRawFd::as_raw_fd(&listener);
    reactor.add(fd, EventMask::READ, Box::new(ListenerHandler { listener, router, expected_gid }))
}

#[cfg(test)]
mod tests {
    use std::{io::Write, time::Duration};

    use exec_transport::{ERR_OK, RESPONSE_HEADER_SIZE, RequestHeader as ReqHdr, ResponseHeader};

    use super::*;

    struct EchoRouter;

    impl RequestRouter for EchoRouter {
        fn init(&mut self, conn: &mut Connection, header: ReqHdr, _body: &[u8]) -> DispatchOutcome {
            conn.service = Some(0);
            let framed = ResponseHeader::framed(RESPONSE_HEADER_SIZE as u32, header.id, ERR_OK, &[]);
            if conn.outq_is_full() {
                return DispatchOutcome::Disconnect;
            }
            conn.enqueue(framed);
            DispatchOutcome::Ok
        }

        fn dispatch(&mut self, conn: &mut Connection, header: ReqHdr, body: &[u8]) -> DispatchOutcome {
            let framed = ResponseHeader::framed((RESPONSE_HEADER_SIZE + body.len()) as u32, header.id, ERR_OK, body);
            if conn.outq_is_full() {
                return DispatchOutcome::Disconnect;
            }
            conn.enqueue(framed);
            DispatchOutcome::Ok
        }
    }

    #[test]
    fn end_to_end_echo_over_the_reactor() {
        let mut reactor = Reactor::create().unwrap();
        let router: Rc<RefCell<dyn RequestRouter>> = Rc::new(RefCell::new(EchoRouter));
        let name = format!("exec-ipc-echo-test-{}", std::process::id());

        bind_and_register(&mut reactor, &name, router, Some(unsafe { libc::getegid() })).unwrap();

        #[cfg(target_os = "linux")]
        let mut client = {
            let addr = std::os::linux::net::SocketAddrExt::from_abstract_name(name.as_bytes()).unwrap();
            std::os::unix::net::UnixStream::connect_addr(&addr).unwrap()
        };
        #[cfg(not(target_os = "linux"))]
        let mut client = std::os::unix::net::UnixStream::connect(std::env::temp_dir().join(format!("{name}.sock")))
            .unwrap();

        let mut init_req = vec![0_u8; exec_transport::REQUEST_HEADER_SIZE];
        ReqHdr { size: exec_transport::REQUEST_HEADER_SIZE as u32, id: 0 }.write_le(&mut init_req);
        client.write_all(&init_req).unwrap();

        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        let mut got = vec![0_u8; RESPONSE_HEADER_SIZE];
        client.set_nonblocking(true).unwrap();
        loop {
            reactor.poll_once(Some(Duration::from_millis(50))).unwrap();
            match std::io::Read::read_exact(&mut client, &mut got) {
                Ok(()) => break,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    assert!(std::time::Instant::now() < deadline, "timed out waiting for init response");
                }
                Err(e) => panic!("unexpected read error: {e}"),
            }
        }

        let header = ResponseHeader { size: u32::from_le_bytes(got[0..4].try_into().unwrap()), id: 0, error: 0 };
        assert_eq!(header.size, RESPONSE_HEADER_SIZE as u32);
    }
}
