//! Resolves a server-announced shared-memory *name* into a locally valid file descriptor.
//!
//! The wire protocol hands back a POSIX shared-memory object name rather than a raw descriptor
//! (Unix-domain sockets would need `SCM_RIGHTS` ancillary data to pass an actual fd across
//! processes); the client independently opens the same named object, mirroring the
//! producer/consumer naming convention the workspace's shared-memory streaming code uses.

use std::ffi::CString;

pub(crate) fn open_named_shm(name: &str) -> Result<i32, String> {
    let c_name = CString::new(name).map_err(|e| e.to_string())?;

    let fd = unsafe { libc::shm_open(c_name.as_ptr(), libc::O_RDWR, 0) };
    if fd == -1 {
        let err = std::io::Error::last_os_error();
        return Err(format!("shm_open failed for '{name}': {err}"));
    }
    Ok(fd)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CString as StdCString;

    #[test]
    fn opening_a_nonexistent_name_fails() {
        let err = open_named_shm("/rialto-definitely-does-not-exist-xyz").unwrap_err();
        assert!(err.contains("shm_open failed"));
    }

    #[test]
    fn opens_an_existing_named_region() {
        let name = format!("/rialto-test-{}", std::process::id());
        let c_name = StdCString::new(name.clone()).unwrap();
        let fd = unsafe {
            libc::shm_open(c_name.as_ptr(), libc::O_CREAT | libc::O_RDWR, 0o600)
        };
        assert!(fd >= 0);
        unsafe {
            libc::ftruncate(fd, 64);
        }

        let opened = open_named_shm(&name).unwrap();
        assert!(opened >= 0);

        unsafe {
            libc::close(fd);
            libc::close(opened);
            libc::shm_unlink(c_name.as_ptr());
        }
    }
}
