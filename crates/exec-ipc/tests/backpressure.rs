//! A client that never reads its responses must eventually be disconnected
//! once its outbound queue fills (spec §4.F, §8 I5), rather than being
//! allowed to block the reactor. Styled after the reference transport's own
//! multi-client backpressure test.

use std::{cell::RefCell, io::Write, rc::Rc, time::Duration};

use exec_ipc::{Connection, DispatchOutcome, RequestRouter, bind_and_register};
use exec_reactor::Reactor;
use exec_transport::{ERR_OK, REQUEST_HEADER_SIZE, RESPONSE_HEADER_SIZE, RequestHeader, ResponseHeader};

struct FloodingRouter;

impl RequestRouter for FloodingRouter {
    fn init(&mut self, conn: &mut Connection, header: RequestHeader, _body: &[u8]) -> DispatchOutcome {
        conn.service = Some(0);
        respond(conn, header)
    }

    fn dispatch(&mut self, conn: &mut Connection, header: RequestHeader, _body: &[u8]) -> DispatchOutcome {
        respond(conn, header)
    }
}

fn respond(conn: &mut Connection, header: RequestHeader) -> DispatchOutcome {
    if conn.outq_is_full() {
        return DispatchOutcome::Disconnect;
    }
    // A chunky response so the client's receive buffer and the server's
    // outq both fill quickly while the client never reads.
    let body = vec![0xAB_u8; 4096];
    let framed =
        ResponseHeader::framed((RESPONSE_HEADER_SIZE + body.len()) as u32, header.id, ERR_OK, &body);
    conn.enqueue(framed);
    DispatchOutcome::Ok
}

fn request_frame(id: u32) -> Vec<u8> {
    let mut frame = vec![0_u8; REQUEST_HEADER_SIZE];
    RequestHeader { size: REQUEST_HEADER_SIZE as u32, id }.write_le(&mut frame);
    frame
}

#[test]
fn a_non_draining_client_is_eventually_disconnected() {
    let mut reactor = Reactor::create().unwrap();
    let router: Rc<RefCell<dyn RequestRouter>> = Rc::new(RefCell::new(FloodingRouter));
    let name = format!("exec-ipc-backpressure-test-{}", std::process::id());
    bind_and_register(&mut reactor, &name, router, Some(unsafe { libc::getegid() })).unwrap();

    #[cfg(target_os = "linux")]
    let mut client = {
        let addr = std::os::linux::net::SocketAddrExt::from_abstract_name(name.as_bytes()).unwrap();
        std::os::unix::net::UnixStream::connect_addr(&addr).unwrap()
    };
    #[cfg(not(target_os = "linux"))]
    let mut client =
        std::os::unix::net::UnixStream::connect(std::env::temp_dir().join(format!("{name}.sock"))).unwrap();
    client.set_nonblocking(true).unwrap();

    // Keep requesting without ever reading a response back.
    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    let mut id = 0_u32;
    loop {
        assert!(reactor.len() >= 1, "listener should still be registered");
        reactor.poll_once(Some(Duration::from_millis(20))).unwrap();

        match client.write_all(&request_frame(id)) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {}
            // Once the server drops the connection, further writes fail —
            // that's the backpressure contract doing its job.
            Err(_) => break,
        }
        id += 1;

        if reactor.len() == 1 {
            // Listener only; the flooded connection handler was removed.
            break;
        }
        assert!(std::time::Instant::now() < deadline, "connection was never dropped under backpressure");
    }
}
