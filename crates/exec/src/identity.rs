//! Resolving the expected group name into a numeric gid (spec §4.J step 1:
//! "resolve expected uid/gid"). This feeds the IPC credential policy's
//! "accept root, or a peer in the expected group" check (§4.E step 4).

use std::{ffi::CString, io, ptr};

#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("group name '{0}' contains a NUL byte")]
    InvalidName(String),
    #[error("no such group '{0}'")]
    UnknownGroup(String),
    #[error("getgrnam_r failed: {0}")]
    Lookup(#[source] io::Error),
}

/// Resolve `group` to a gid. An empty name means "no group configured": the
/// IPC credential policy then only accepts uid-0 peers.
pub fn resolve_expected_gid(group: &str) -> Result<Option<u32>, IdentityError> {
    if group.is_empty() {
        return Ok(None);
    }

    let cname = CString::new(group).map_err(|_| IdentityError::InvalidName(group.to_owned()))?;
    let mut grp: libc::group = unsafe { std::mem::zeroed() };
    let mut buf = vec![0_i8; 16 * 1024];
    let mut result: *mut libc::group = ptr::null_mut();

    let rc = unsafe { libc::getgrnam_r(cname.as_ptr(), &mut grp, buf.as_mut_ptr(), buf.len(), &mut result) };
    if rc != 0 {
        return Err(IdentityError::Lookup(io::Error::from_raw_os_error(rc)));
    }
    if result.is_null() {
        return Err(IdentityError::UnknownGroup(group.to_owned()));
    }

    Ok(Some(grp.gr_gid))
}
