//! Peer-credential retrieval over the ancillary-data mechanism (spec §4.D,
//! §8 scenario 5). The kernel attaches `SCM_CREDENTIALS` to the first
//! datagram-equivalent read of a `SOCK_STREAM` unix socket once
//! `SO_PASSCRED` is set; the daemon uses that to authenticate the peer and
//! then stops asking (no per-message credential passing thereafter).

use std::{io, os::fd::RawFd};

/// Size of the ancillary-data buffer passed to `recvmsg`. One `cmsghdr` plus
/// one `ucred` comfortably fits in well under this.
const CMSG_BUF_LEN: usize = 128;

/// Enable or disable `SCM_CREDENTIALS` delivery on `fd`.
pub fn set_passcred(fd: RawFd, enabled: bool) -> io::Result<()> {
    let on: libc::c_int = enabled as libc::c_int;
    let rc = unsafe {
        libc::setsockopt(
            fd,
            libc::SOL_SOCKET,
            libc::SO_PASSCRED,
            (&on as *const libc::c_int).cast(),
            std::mem::size_of::<libc::c_int>() as libc::socklen_t,
        )
    };
    if rc < 0 { Err(io::Error::last_os_error()) } else { Ok(()) }
}

/// Non-blocking `recvmsg`, optionally requesting the peer's credentials.
///
/// Returns `(bytes_read, credentials)`. `credentials` is `None` whenever
/// `want_creds` is false, the kernel sent no `SCM_CREDENTIALS` ancillary
/// record, or this isn't Linux. A `bytes_read` of `0` means the peer has
/// performed an orderly shutdown.
pub fn recv_with_creds(fd: RawFd, buf: &mut [u8], want_creds: bool) -> io::Result<(usize, Option<libc::ucred>)> {
    let mut iov = libc::iovec { iov_base: buf.as_mut_ptr().cast(), iov_len: buf.len() };
    let mut cmsg_buf = [0_u8; CMSG_BUF_LEN];

    let mut msg: libc::msghdr = unsafe { std::mem::zeroed() };
    msg.msg_iov = &mut iov;
    msg.msg_iovlen = 1;
    if want_creds {
        msg.msg_control = cmsg_buf.as_mut_ptr().cast();
        msg.msg_controllen = CMSG_BUF_LEN as _;
    }

    let n = unsafe { libc::recvmsg(fd, &mut msg, libc::MSG_DONTWAIT) };
    if n < 0 {
        return Err(io::Error::last_os_error());
    }

    let mut cred = None;
    if want_creds && msg.msg_controllen > 0 {
        unsafe {
            let mut cmsg_ptr = libc::CMSG_FIRSTHDR(&msg);
            while !cmsg_ptr.is_null() {
                let cmsg = &*cmsg_ptr;
                if cmsg.cmsg_level == libc::SOL_SOCKET && cmsg.cmsg_type == libc::SCM_CREDENTIALS {
                    let data_ptr = libc::CMSG_DATA(cmsg_ptr).cast::<libc::ucred>();
                    cred = Some(data_ptr.read_unaligned());
                    break;
                }
                cmsg_ptr = libc::CMSG_NXTHDR(&msg, cmsg_ptr);
            }
        }
    }

    Ok((n as usize, cred))
}

#[cfg(test)]
mod tests {
    use std::os::{fd::AsRawFd, unix::net::UnixStream};

    use super::*;

    #[test]
    fn recv_without_creds_reads_plain_bytes() {
        let (a, b) = UnixStream::pair().unwrap();
        a.set_nonblocking(true).unwrap();
        b.set_nonblocking(true).unwrap();

        std::io::Write::write_all(&mut { &a }, b"hi").unwrap();

        let mut buf = [0_u8; 16];
        let (n, cred) = recv_with_creds(b.as_raw_fd(), &mut buf, false).unwrap();
        assert_eq!(&buf[..n], b"hi");
        assert!(cred.is_none());
    }

    #[test]
    #[cfg(target_os = "linux")]
    fn recv_with_creds_sees_own_pid() {
        let (a, b) = UnixStream::pair().unwrap();
        a.set_nonblocking(true).unwrap();
        b.set_nonblocking(true).unwrap();
        set_passcred(b.as_raw_fd(), true).unwrap();

        std::io::Write::write_all(&mut { &a }, b"hi").unwrap();

        let mut buf = [0_u8; 16];
        let (n, cred) = recv_with_creds(b.as_raw_fd(), &mut buf, true).unwrap();
        assert_eq!(&buf[..n], b"hi");
        let cred = cred.expect("kernel should attach SCM_CREDENTIALS for socketpair peers");
        assert_eq!(cred.pid, std::process::id() as libc::pid_t);
    }
}
