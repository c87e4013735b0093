//! DRM device node lifecycle.
//!
//! Opens `SDL_VIDEO_KMSDRM_NODE` if set, otherwise probes
//! `/dev/dri/card0..127` in order for the first node exposing
//! `DRM_CAP_DUMB_BUFFER`, then raises the universal-planes and atomic
//! client caps the rest of the backend assumes are set.

use std::fs::{File, OpenOptions};
use std::os::raw::c_int;
use std::os::unix::io::{AsRawFd, RawFd};

use kmsdrm_sys as sys;

use crate::error::{kernel_error, Error};

const MAX_CARD_NODES: u32 = 128;

/// An open, capability-checked DRM device node.
pub struct Device {
    file: File,
}

impl Device {
    pub fn fd(&self) -> RawFd {
        self.file.as_raw_fd()
    }

    /// Opens the node named by `explicit_node`, or probes `/dev/dri/cardN`
    /// for the first one that supports dumb buffers.
    pub fn open(explicit_node: Option<&str>) -> Result<Self, Error> {
        let device = match explicit_node {
            Some(path) => {
                let file = open_rw(path)?;
                if !has_dumb_buffer_cap(file.as_raw_fd()) {
                    return Err(Error::Unsupported);
                }
                Device { file }
            }
            None => Self::probe()?,
        };

        device.set_required_caps()?;
        Ok(device)
    }

    fn probe() -> Result<Self, Error> {
        for index in 0..MAX_CARD_NODES {
            let path = format!("/dev/dri/card{}", index);
            let file = match open_rw(&path) {
                Ok(file) => file,
                Err(_) => continue,
            };
            if has_dumb_buffer_cap(file.as_raw_fd()) {
                log::debug!("device: using {}", path);
                return Ok(Device { file });
            }
        }
        Err(Error::Unsupported)
    }

    fn set_required_caps(&self) -> Result<(), Error> {
        let fd = self.fd() as c_int;
        if unsafe { sys::drmSetClientCap(fd, sys::DRM_CLIENT_CAP_UNIVERSAL_PLANES, 1) } < 0 {
            return Err(kernel_error("drmSetClientCap(UNIVERSAL_PLANES)"));
        }
        if unsafe { sys::drmSetClientCap(fd, sys::DRM_CLIENT_CAP_ATOMIC, 1) } < 0 {
            return Err(kernel_error("drmSetClientCap(ATOMIC)"));
        }
        Ok(())
    }
}

fn open_rw(path: &str) -> Result<File, Error> {
    OpenOptions::new()
        .read(true)
        .write(true)
        .open(path)
        .map_err(Error::Io)
}

fn has_dumb_buffer_cap(fd: RawFd) -> bool {
    let mut value: u64 = 0;
    let rc = unsafe { sys::drmGetCap(fd as c_int, sys::DRM_CAP_DUMB_BUFFER, &mut value) };
    rc == 0 && value != 0
}
