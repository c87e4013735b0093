//! Thin safe wrapper over `drmModeAtomic*` request building.

use std::os::raw::c_int;
use std::os::unix::io::RawFd;
use std::ptr;

use kmsdrm_sys as sys;

use crate::error::{kernel_error, Error};

/// An owned `drmModeAtomicReq`. Freed on drop.
pub struct AtomicRequest {
    ptr: *mut sys::drmModeAtomicReq,
}

unsafe impl Send for AtomicRequest {}

impl AtomicRequest {
    /// Allocates a fresh, empty request.
    pub fn new() -> Result<Self, Error> {
        let ptr = unsafe { sys::drmModeAtomicAlloc() };
        if ptr.is_null() {
            return Err(Error::OutOfMemory {
                what: "drmModeAtomicReq",
            });
        }
        Ok(AtomicRequest { ptr })
    }

    /// Deep-copies this request; used to build the per-flip commit from
    /// the cached template.
    pub fn duplicate(&self) -> Result<Self, Error> {
        let ptr = unsafe { sys::drmModeAtomicDuplicate(self.ptr) };
        if ptr.is_null() {
            return Err(Error::OutOfMemory {
                what: "drmModeAtomicReq",
            });
        }
        Ok(AtomicRequest { ptr })
    }

    /// Queues `object.property = value` in the request.
    pub fn add(&mut self, object_id: u32, property_id: u32, value: u64) -> Result<(), Error> {
        let rc = unsafe { sys::drmModeAtomicAddProperty(self.ptr, object_id, property_id, value) };
        if rc < 0 {
            return Err(kernel_error("drmModeAtomicAddProperty"));
        }
        Ok(())
    }

    /// Commits the request. `flags` typically includes
    /// `DRM_MODE_ATOMIC_ALLOW_MODESET` and, for non-blocking flips,
    /// `DRM_MODE_ATOMIC_NONBLOCK`.
    pub fn commit(&mut self, fd: RawFd, flags: u32) -> Result<(), Error> {
        let rc =
            unsafe { sys::drmModeAtomicCommit(fd as c_int, self.ptr, flags, ptr::null_mut()) };
        if rc < 0 {
            return Err(kernel_error("drmModeAtomicCommit"));
        }
        Ok(())
    }
}

impl Drop for AtomicRequest {
    fn drop(&mut self) {
        unsafe { sys::drmModeAtomicFree(self.ptr) };
    }
}

/// A property blob (mode blob or gamma blob): owns the kernel id and
/// destroys it on drop.
pub struct PropertyBlob {
    fd: RawFd,
    pub id: u32,
}

impl PropertyBlob {
    pub fn create(fd: RawFd, data: &[u8]) -> Result<Self, Error> {
        let mut id = 0u32;
        let rc = unsafe {
            sys::drmModeCreatePropertyBlob(
                fd as c_int,
                data.as_ptr() as *const _,
                data.len(),
                &mut id,
            )
        };
        if rc < 0 {
            return Err(kernel_error("drmModeCreatePropertyBlob"));
        }
        Ok(PropertyBlob { fd, id })
    }
}

impl Drop for PropertyBlob {
    fn drop(&mut self) {
        unsafe {
            sys::drmModeDestroyPropertyBlob(self.fd as c_int, self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn atomic_request_flags_compose() {
        let flags = sys::DRM_MODE_ATOMIC_ALLOW_MODESET | sys::DRM_MODE_ATOMIC_NONBLOCK;
        assert_eq!(flags, 0x0600);
    }
}
