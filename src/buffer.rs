//! Dumb-buffer lifecycle.

use std::os::raw::{c_int, c_void};
use std::os::unix::io::RawFd;
use std::ptr;

use kmsdrm_sys as sys;
use kmsdrm_sys::ioctl as drm_ioctl;

use crate::color::{fb_args, ColorDef};
use crate::error::{kernel_error, Error};

/// A CPU mapping of a dumb buffer. Exclusively owned by its
/// [`BufferSlot`]; moved between threads only while the present-engine
/// mutex that protects the buffer array is held, which is why `Send`
/// is safe to assert despite the raw pointer.
pub struct Mapping {
    ptr: *mut u8,
    len: usize,
}

unsafe impl Send for Mapping {}

impl Mapping {
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        unsafe { std::slice::from_raw_parts_mut(self.ptr, self.len) }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_ptr(&self) -> *const u8 {
        self.ptr
    }
}

/// Exactly three of these are reserved by [`crate::present`]; a slot's
/// `pitch == 0` marks it unused, the sentinel policy
/// translated into an `Option`-free check that the present engine can
/// test without unwrapping.
pub struct BufferSlot {
    fd: RawFd,
    pub handle: u32,
    pub size: u64,
    pub pitch: u32,
    pub fb_id: u32,
    pub mapping: Mapping,
}

impl BufferSlot {
    /// Creates, registers, and maps a dumb buffer for `def`.
    pub fn create(fd: RawFd, w: u32, h: u32, def: &ColorDef) -> Result<Self, Error> {
        let mut create = drm_ioctl::drm_mode_create_dumb {
            height: h * def.h_factor,
            width: w,
            bpp: def.bpp,
            ..Default::default()
        };

        if unsafe {
            drm_ioctl::ioctl(
                fd,
                drm_ioctl::DRM_IOCTL_MODE_CREATE_DUMB,
                &mut create as *mut _ as *mut c_void,
            )
        } < 0
        {
            return Err(kernel_error("DRM_IOCTL_MODE_CREATE_DUMB"));
        }

        let cleanup_dumb = |handle: u32| {
            let mut destroy = drm_ioctl::drm_mode_destroy_dumb { handle };
            unsafe {
                drm_ioctl::ioctl(
                    fd,
                    drm_ioctl::DRM_IOCTL_MODE_DESTROY_DUMB,
                    &mut destroy as *mut _ as *mut c_void,
                );
            }
        };

        let args = fb_args(def, create.handle, create.pitch, h);
        let mut fb_id = 0u32;
        let rc = unsafe {
            sys::drmModeAddFB2(
                fd,
                w,
                h,
                def.fourcc,
                args.handles.as_ptr(),
                args.pitches.as_ptr(),
                args.offsets.as_ptr(),
                &mut fb_id,
                0,
            )
        };
        if rc < 0 {
            cleanup_dumb(create.handle);
            return Err(kernel_error("drmModeAddFB2"));
        }

        let mut map_dumb = drm_ioctl::drm_mode_map_dumb {
            handle: create.handle,
            ..Default::default()
        };
        if unsafe {
            drm_ioctl::ioctl(
                fd,
                drm_ioctl::DRM_IOCTL_MODE_MAP_DUMB,
                &mut map_dumb as *mut _ as *mut c_void,
            )
        } < 0
        {
            unsafe { sys::drmModeRmFB(fd, fb_id) };
            cleanup_dumb(create.handle);
            return Err(kernel_error("DRM_IOCTL_MODE_MAP_DUMB"));
        }

        let size = create.size as usize;
        let ptr = unsafe {
            libc::mmap(
                ptr::null_mut(),
                size,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                fd as c_int,
                map_dumb.offset as libc::off_t,
            )
        };
        if ptr == libc::MAP_FAILED {
            unsafe { sys::drmModeRmFB(fd, fb_id) };
            cleanup_dumb(create.handle);
            return Err(kernel_error("mmap"));
        }

        Ok(BufferSlot {
            fd,
            handle: create.handle,
            size: create.size,
            pitch: create.pitch,
            fb_id,
            mapping: Mapping {
                ptr: ptr as *mut u8,
                len: size,
            },
        })
    }
}

impl Drop for BufferSlot {
    fn drop(&mut self) {
        unsafe {
            libc::munmap(self.mapping.ptr as *mut c_void, self.mapping.len);
            sys::drmModeRmFB(self.fd, self.fb_id);
        }
        let mut destroy = drm_ioctl::drm_mode_destroy_dumb {
            handle: self.handle,
        };
        unsafe {
            drm_ioctl::ioctl(
                self.fd,
                drm_ioctl::DRM_IOCTL_MODE_DESTROY_DUMB,
                &mut destroy as *mut _ as *mut c_void,
            );
        }
    }
}

/// Creates the first `n_buf` of the three reserved slots.
/// On any failure, everything created so far is torn down (each
/// `BufferSlot`'s `Drop` runs) and the error propagates.
pub fn create_buffers(
    fd: RawFd,
    n_buf: usize,
    w: u32,
    h: u32,
    def: &ColorDef,
) -> Result<Vec<BufferSlot>, Error> {
    debug_assert!((1..=3).contains(&n_buf));
    let mut slots = Vec::with_capacity(n_buf);
    for idx in 0..n_buf {
        match BufferSlot::create(fd, w, h, def) {
            Ok(slot) => slots.push(slot),
            Err(err) => {
                log::warn!("buffer engine: failed to create slot {}: {}", idx, err);
                return Err(err);
            }
        }
    }
    Ok(slots)
}
