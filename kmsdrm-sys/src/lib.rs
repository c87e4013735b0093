#![allow(dead_code)]
#![allow(non_camel_case_types)]
#![allow(non_snake_case)]
#![allow(non_upper_case_globals)]

//! Hand-declared FFI surface for the subset of the DRM uapi and libdrm
//! C API that `kmsdrm` consumes: resource/property enumeration,
//! atomic commits, property blobs, `ADDFB2`/`RmFB`, and client caps.
//!
//! Unlike a bindgen-generated crate this is not meant to cover all of
//! `xf86drmMode.h` — only the calls §4 of the backend design needs.

pub mod ioctl;

use std::os::raw::{c_char, c_int, c_void};

pub const DRM_MODE_CONNECTED: u32 = 1;
pub const DRM_MODE_DISCONNECTED: u32 = 2;
pub const DRM_MODE_UNKNOWNCONNECTION: u32 = 3;

pub const DRM_PLANE_TYPE_OVERLAY: u64 = 0;
pub const DRM_PLANE_TYPE_PRIMARY: u64 = 1;
pub const DRM_PLANE_TYPE_CURSOR: u64 = 2;

pub const DRM_MODE_OBJECT_CRTC: u32 = 0xcccc_cccc;
pub const DRM_MODE_OBJECT_CONNECTOR: u32 = 0xc0c0_c0c0;
pub const DRM_MODE_OBJECT_ENCODER: u32 = 0xe0e0_e0e0;
pub const DRM_MODE_OBJECT_PLANE: u32 = 0xeeee_eeee;

pub const DRM_MODE_ATOMIC_ALLOW_MODESET: u32 = 0x0400;
pub const DRM_MODE_ATOMIC_NONBLOCK: u32 = 0x0200;

pub const DRM_MODE_PAGE_FLIP_EVENT: u32 = 0x01;

pub const DRM_CLIENT_CAP_UNIVERSAL_PLANES: u64 = 2;
pub const DRM_CLIENT_CAP_ATOMIC: u64 = 3;

pub const DRM_CAP_DUMB_BUFFER: u64 = 0x1;

pub const DRM_DISPLAY_MODE_LEN: usize = 32;
pub const DRM_PROP_NAME_LEN: usize = 32;

/// `struct drm_mode_modeinfo`.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct drmModeModeInfo {
    pub clock: u32,
    pub hdisplay: u16,
    pub hsync_start: u16,
    pub hsync_end: u16,
    pub htotal: u16,
    pub hskew: u16,
    pub vdisplay: u16,
    pub vsync_start: u16,
    pub vsync_end: u16,
    pub vtotal: u16,
    pub vscan: u16,
    pub vrefresh: u32,
    pub flags: u32,
    pub r#type: u32,
    pub name: [c_char; DRM_DISPLAY_MODE_LEN],
}

/// `drmModeRes`.
#[repr(C)]
pub struct drmModeRes {
    pub count_fbs: c_int,
    pub fbs: *mut u32,
    pub count_crtcs: c_int,
    pub crtcs: *mut u32,
    pub count_connectors: c_int,
    pub connectors: *mut u32,
    pub count_encoders: c_int,
    pub encoders: *mut u32,
    pub min_width: u32,
    pub max_width: u32,
    pub min_height: u32,
    pub max_height: u32,
}

/// `drmModePlaneRes`.
#[repr(C)]
pub struct drmModePlaneRes {
    pub count_planes: u32,
    pub planes: *mut u32,
}

/// `drmModePlane`.
#[repr(C)]
pub struct drmModePlane {
    pub count_formats: u32,
    pub formats: *mut u32,
    pub plane_id: u32,
    pub crtc_id: u32,
    pub fb_id: u32,
    pub crtc_x: u32,
    pub crtc_y: u32,
    pub x: u32,
    pub y: u32,
    pub possible_crtcs: u32,
    pub gamma_size: u32,
}

/// `drmModeCrtc`.
#[repr(C)]
pub struct drmModeCrtc {
    pub crtc_id: u32,
    pub buffer_id: u32,
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub mode_valid: c_int,
    pub mode: drmModeModeInfo,
    pub gamma_size: c_int,
}

/// `drmModeEncoder`.
#[repr(C)]
pub struct drmModeEncoder {
    pub encoder_id: u32,
    pub encoder_type: u32,
    pub crtc_id: u32,
    pub possible_crtcs: u32,
    pub possible_clones: u32,
}

/// `drmModeConnector`.
#[repr(C)]
pub struct drmModeConnector {
    pub connector_id: u32,
    pub encoder_id: u32,
    pub connector_type: u32,
    pub connector_type_id: u32,
    pub connection: u32,
    pub mmWidth: u32,
    pub mmHeight: u32,
    pub subpixel: u32,

    pub count_modes: c_int,
    pub modes: *mut drmModeModeInfo,

    pub count_props: c_int,
    pub props: *mut u32,
    pub prop_values: *mut u64,

    pub count_encoders: c_int,
    pub encoders: *mut u32,
}

/// `struct drm_mode_property_enum`.
#[repr(C)]
pub struct drm_mode_property_enum {
    pub value: u64,
    pub name: [c_char; DRM_PROP_NAME_LEN],
}

/// `drmModePropertyRes`.
#[repr(C)]
pub struct drmModePropertyRes {
    pub prop_id: u32,
    pub flags: u32,
    pub name: [c_char; DRM_PROP_NAME_LEN],
    pub count_values: c_int,
    pub values: *mut u64,
    pub count_enums: c_int,
    pub enums: *mut drm_mode_property_enum,
    pub count_blobs: c_int,
    pub blob_ids: *mut u32,
}

/// `drmModeObjectProperties`.
#[repr(C)]
pub struct drmModeObjectProperties {
    pub count_props: u32,
    pub props: *mut u32,
    pub prop_values: *mut u64,
}

/// Opaque handle; libdrm owns the layout of `_drmModeAtomicReq`.
#[repr(C)]
pub struct drmModeAtomicReq {
    _private: [u8; 0],
}

extern "C" {
    pub fn drmModeGetResources(fd: c_int) -> *mut drmModeRes;
    pub fn drmModeFreeResources(ptr: *mut drmModeRes);

    pub fn drmModeGetPlaneResources(fd: c_int) -> *mut drmModePlaneRes;
    pub fn drmModeFreePlaneResources(ptr: *mut drmModePlaneRes);

    pub fn drmModeGetPlane(fd: c_int, plane_id: u32) -> *mut drmModePlane;
    pub fn drmModeFreePlane(ptr: *mut drmModePlane);

    pub fn drmModeGetCrtc(fd: c_int, crtc_id: u32) -> *mut drmModeCrtc;
    pub fn drmModeFreeCrtc(ptr: *mut drmModeCrtc);

    pub fn drmModeGetEncoder(fd: c_int, encoder_id: u32) -> *mut drmModeEncoder;
    pub fn drmModeFreeEncoder(ptr: *mut drmModeEncoder);

    pub fn drmModeGetConnector(fd: c_int, connector_id: u32) -> *mut drmModeConnector;
    pub fn drmModeFreeConnector(ptr: *mut drmModeConnector);

    pub fn drmModeGetProperty(fd: c_int, property_id: u32) -> *mut drmModePropertyRes;
    pub fn drmModeFreeProperty(ptr: *mut drmModePropertyRes);

    pub fn drmModeObjectGetProperties(
        fd: c_int,
        object_id: u32,
        object_type: u32,
    ) -> *mut drmModeObjectProperties;
    pub fn drmModeFreeObjectProperties(ptr: *mut drmModeObjectProperties);

    pub fn drmModeAtomicAlloc() -> *mut drmModeAtomicReq;
    pub fn drmModeAtomicFree(req: *mut drmModeAtomicReq);
    pub fn drmModeAtomicDuplicate(req: *const drmModeAtomicReq) -> *mut drmModeAtomicReq;
    pub fn drmModeAtomicAddProperty(
        req: *mut drmModeAtomicReq,
        object_id: u32,
        property_id: u32,
        value: u64,
    ) -> c_int;
    pub fn drmModeAtomicCommit(
        fd: c_int,
        req: *mut drmModeAtomicReq,
        flags: u32,
        user_data: *mut c_void,
    ) -> c_int;

    pub fn drmModeCreatePropertyBlob(
        fd: c_int,
        data: *const c_void,
        length: usize,
        id: *mut u32,
    ) -> c_int;
    pub fn drmModeDestroyPropertyBlob(fd: c_int, id: u32) -> c_int;

    pub fn drmModeAddFB2(
        fd: c_int,
        width: u32,
        height: u32,
        pixel_format: u32,
        handles: *const u32,
        pitches: *const u32,
        offsets: *const u32,
        buf_id: *mut u32,
        flags: u32,
    ) -> c_int;
    pub fn drmModeRmFB(fd: c_int, buf_id: u32) -> c_int;

    pub fn drmSetClientCap(fd: c_int, capability: u64, value: u64) -> c_int;
    pub fn drmGetCap(fd: c_int, capability: u64, value: *mut u64) -> c_int;
}

#[cfg(test)]
mod tests {
    use super::ioctl;

    #[test]
    fn dumb_buffer_ioctl_numbers_are_stable() {
        // These values are fixed by the kernel uapi and must never change.
        assert_eq!(ioctl::DRM_IOCTL_MODE_CREATE_DUMB, 0xc020_64b2);
        assert_eq!(ioctl::DRM_IOCTL_MODE_MAP_DUMB, 0xc010_64b3);
        assert_eq!(ioctl::DRM_IOCTL_MODE_DESTROY_DUMB, 0xc004_64b4);
    }
}
