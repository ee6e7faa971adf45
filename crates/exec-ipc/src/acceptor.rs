//! Binding the local-client listening socket (spec §4.D).
//!
//! The reference daemon binds an abstract-namespace unix socket so no stale
//! path is ever left behind after a crash, and listens with a small, fixed
//! backlog. `std::os::unix::net::UnixListener` has no way to request a
//! specific backlog, so the socket is built with raw `libc` calls and
//! handed back as a `UnixListener` for everyday `accept()` use.

use std::{io, mem, os::fd::FromRawFd, os::unix::net::UnixListener};

pub const LISTEN_BACKLOG: i32 = 5;

#[cfg(target_os = "linux")]
pub fn bind_ipc_listener(name: &str) -> io::Result<UnixListener> {
    if name.len() >= 107 {
        return Err(io::Error::new(io::ErrorKind::InvalidInput, "abstract socket name too long"));
    }

    unsafe {
        let fd = libc::socket(libc::AF_UNIX, libc::SOCK_STREAM | libc::SOCK_NONBLOCK, 0);
        if fd < 0 {
            return Err(io::Error::last_os_error());
        }

        let mut addr: libc::sockaddr_un = mem::zeroed();
        addr.sun_family = libc::AF_UNIX as libc::sa_family_t;
        // Leading NUL marks the name as abstract-namespace (Linux-only).
        let name_bytes = name.as_bytes();
        let path_bytes: &mut [u8] = std::slice::from_raw_parts_mut(addr.sun_path.as_mut_ptr().cast(), addr.sun_path.len());
        path_bytes[1..1 + name_bytes.len()].copy_from_slice(name_bytes);
        let addr_len = (mem::size_of::<libc::sa_family_t>() + 1 + name_bytes.len()) as libc::socklen_t;

        if libc::bind(fd, (&addr as *const libc::sockaddr_un).cast(), addr_len) < 0 {
            let err = io::Error::last_os_error();
            libc::close(fd);
            return Err(err);
        }
        if libc::listen(fd, LISTEN_BACKLOG) < 0 {
            let err = io::Error::last_os_error();
            libc::close(fd);
            return Err(err);
        }

        Ok(UnixListener::from_raw_fd(fd))
    }
}

#[cfg(not(target_os = "linux"))]
pub fn bind_ipc_listener(name: &str) -> io::Result<UnixListener> {
    let path = std::env::temp_dir().join(format!("{name}.sock"));
    let _ = std::fs::remove_file(&path);
    let listener = UnixListener::bind(&path)?;
    listener.set_nonblocking(true)?;
    Ok(listener)
}

#[cfg(all(test, target_os = "linux"))]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn abstract_socket_accepts_a_connection() {
        let name = format!("exec-ipc-test-{}", std::process::id());
        let listener = bind_ipc_listener(&name).unwrap();

        let addr = std::os::linux::net::SocketAddrExt::from_abstract_name(name.as_bytes()).unwrap();
        let mut client = std::os::unix::net::UnixStream::connect_addr(&addr).unwrap();
        client.write_all(b"x").unwrap();

        // Accept is nonblocking; give the kernel a moment.
        std::thread::sleep(std::time::Duration::from_millis(20));
        listener.accept().unwrap();
    }
}
