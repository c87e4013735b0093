//! Raw DRM uapi ioctl request codes and argument structs.
//!
//! `CREATE_DUMB`/`MAP_DUMB`/`DESTROY_DUMB` are not wrapped by libdrm's
//! public C API: callers issue them directly against the card fd with
//! `ioctl(2)`. The struct layouts and request numbers below are copied
//! from `drm.h`/`drm_mode.h` and are stable uapi, so no codegen step
//! is needed to keep them in sync.

use libc::{c_ulong, c_void};

const DRM_IOCTL_BASE: c_ulong = 0x64; // 'd'
const DRM_IOC_READ: c_ulong = 2;
const DRM_IOC_WRITE: c_ulong = 1;

const fn ioc(dir: c_ulong, nr: c_ulong, size: usize) -> c_ulong {
    (dir << 30) | (DRM_IOCTL_BASE << 8) | nr | ((size as c_ulong) << 16)
}

const fn iowr(nr: c_ulong, size: usize) -> c_ulong {
    ioc(DRM_IOC_READ | DRM_IOC_WRITE, nr, size)
}

/// `struct drm_mode_create_dumb`.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default)]
pub struct drm_mode_create_dumb {
    pub height: u32,
    pub width: u32,
    pub bpp: u32,
    pub flags: u32,
    // Filled in by the kernel.
    pub handle: u32,
    pub pitch: u32,
    pub size: u64,
}

/// `struct drm_mode_map_dumb`.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default)]
pub struct drm_mode_map_dumb {
    pub handle: u32,
    pub pad: u32,
    // Filled in by the kernel: byte offset into the device fd for mmap.
    pub offset: u64,
}

/// `struct drm_mode_destroy_dumb`.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default)]
pub struct drm_mode_destroy_dumb {
    pub handle: u32,
}

pub const DRM_IOCTL_MODE_CREATE_DUMB: c_ulong =
    iowr(0xB2, std::mem::size_of::<drm_mode_create_dumb>());
pub const DRM_IOCTL_MODE_MAP_DUMB: c_ulong =
    iowr(0xB3, std::mem::size_of::<drm_mode_map_dumb>());
pub const DRM_IOCTL_MODE_DESTROY_DUMB: c_ulong =
    iowr(0xB4, std::mem::size_of::<drm_mode_destroy_dumb>());

/// Thin wrapper over `libc::ioctl` for the three dumb-buffer requests above.
///
/// # Safety
/// `fd` must be a valid, open DRM device descriptor and `arg` must point
/// at a correctly sized instance of the struct the given `request` expects.
pub unsafe fn ioctl(fd: std::os::raw::c_int, request: c_ulong, arg: *mut c_void) -> i32 {
    libc::ioctl(fd, request as libc::c_ulong, arg)
}
