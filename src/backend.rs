//! `Backend`: the context type wiring components A–G to the host
//! callback surface. `kmsdrm::device`'s fd, the pipe
//! registry, and the property cache all live here rather than behind a
//! hidden "this" pointer.

use std::os::unix::io::RawFd;
use std::sync::{Arc, Mutex};

use kmsdrm_sys as sys;

use crate::atomic::AtomicRequest;
use crate::buffer::{self, BufferSlot};
use crate::color::{self, ColorDef};
use crate::config::Config;
use crate::device::Device;
use crate::error::Error;
use crate::gamma::GammaTable;
use crate::input::{EventSink, InputBridge};
use crate::modeset::{self, PipeBinding, PropIds, ScalingMode};
use crate::pipe::PipeRegistry;
use crate::present::{Buffering, PresentEngine};
use crate::props::PropertyCache;

/// What `VideoInit` reports back to the host.
pub struct VideoInfo {
    pub bits_per_pixel: u32,
    pub current_w: u32,
    pub current_h: u32,
}

/// What a successful `SetVideoMode` hands back: the pointer the app
/// should draw into, its pitch, and the negotiated pixel format.
pub struct SurfaceInfo {
    pub pixels: *mut u8,
    pub pitch: u32,
    pub format: ColorDef,
}

struct ActiveMode {
    present: PresentEngine,
    // Kept alive only so the MODE_ID blob survives for as long as the
    // mode that references it; dropped on the next set_video_mode/video_quit.
    #[allow(dead_code)]
    mode_blob: crate::atomic::PropertyBlob,
    color: ColorDef,
}

pub struct Backend {
    config: Config,
    device: Option<Device>,
    registry: PipeRegistry,
    props: PropertyCache,
    scaling_mode: Arc<Mutex<ScalingMode>>,
    gamma_blob: Arc<Mutex<Option<crate::atomic::PropertyBlob>>>,
    gamma_table: GammaTable,
    active: Option<ActiveMode>,
    input: Option<InputBridge>,
    last_error: Option<String>,
}

impl Backend {
    pub fn new(config: Config) -> Self {
        Backend {
            config,
            device: None,
            registry: PipeRegistry::default(),
            props: PropertyCache::new(),
            scaling_mode: Arc::new(Mutex::new(ScalingMode::default())),
            gamma_blob: Arc::new(Mutex::new(None)),
            gamma_table: GammaTable::default(),
            active: None,
            input: None,
            last_error: None,
        }
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    fn fail(&mut self, err: Error) -> Error {
        self.last_error = Some(err.to_string());
        err
    }

    fn fd(&self) -> Result<RawFd, Error> {
        self.device.as_ref().map(|d| d.fd()).ok_or(Error::Unsupported)
    }

    /// `VideoInit`: opens the DRM node, discovers pipes, and enumerates
    /// input devices.
    pub fn video_init(&mut self) -> Result<VideoInfo, Error> {
        let device = Device::open(self.config.node.as_deref())
            .map_err(|err| self.fail(err))?;
        let fd = device.fd() as std::os::raw::c_int;

        let registry = PipeRegistry::discover(fd, &mut self.props).map_err(|err| self.fail(err))?;

        let first_mode = registry
            .pipes()
            .first()
            .and_then(|p| p.modes.first())
            .copied();

        self.device = Some(device);
        self.registry = registry;

        match InputBridge::discover(self.config.scaling_key) {
            Ok(bridge) => self.input = Some(bridge),
            Err(err) => log::warn!("video_init: input bridge unavailable: {}", err),
        }

        let (current_w, current_h) = first_mode
            .map(|m| (m.hdisplay as u32, m.vdisplay as u32))
            .unwrap_or((0, 0));

        Ok(VideoInfo {
            bits_per_pixel: 16,
            current_w,
            current_h,
        })
    }

    pub fn list_modes(&self) -> Vec<(u32, u32)> {
        self.registry.video_modes()
    }

    /// `VideoModeOK`: the bpp to use, or 0 if unsupported.
    pub fn video_mode_ok(&self, depth: u32, flags: u32) -> u32 {
        if self.registry.pipes().is_empty() {
            return 0;
        }
        match color::select(depth, flags) {
            Ok(def) => def.bpp,
            Err(_) => 0,
        }
    }

    /// `SetVideoMode`: opens a surface by selecting a color format,
    /// allocating buffers, and committing a mode atomically on the
    /// first pipe that accepts it.
    pub fn set_video_mode(
        &mut self,
        w: u32,
        h: u32,
        depth: u32,
        flags: u32,
    ) -> Result<SurfaceInfo, Error> {
        // Idempotent re-entry: dropping the old state stops the flip
        // worker, destroys buffers, and frees the mode blob/template.
        self.active = None;
        *self.gamma_blob.lock().unwrap() = None;

        let fd = self.fd().map_err(|err| self.fail(err))?;

        let refresh_hz = Config::from_env().refresh_hz;
        let color = color::select(depth, flags).map_err(|err| self.fail(err))?;
        let buffering = Buffering::from_flags(flags);

        let slots =
            buffer::create_buffers(fd, buffering.n_buf(), w, h, &color).map_err(|err| self.fail(err))?;

        // 8bpp surfaces need a published GAMMA_LUT blob before the first
        // commit, so it can be attached alongside MODE_ID/FB_ID right away
        // instead of waiting for the first SetColors call.
        if color.bpp == 8 {
            let blob = crate::atomic::PropertyBlob::create(fd, &self.gamma_table.to_bytes())
                .map_err(|err| self.fail(err))?;
            *self.gamma_blob.lock().unwrap() = Some(blob);
        }
        let gamma_blob_id = self.gamma_blob.lock().unwrap().as_ref().map(|blob| blob.id);

        match self.try_every_pipe(fd, w, h, refresh_hz, &slots, gamma_blob_id) {
            Some((mode_blob, template, binding)) => {
                let has_damage_clips = self.props.has_property(binding.plane_id, "FB_DAMAGE_CLIPS");
                let present = PresentEngine::new(
                    fd,
                    buffering,
                    binding,
                    slots,
                    template,
                    has_damage_clips,
                    self.scaling_mode.clone(),
                    self.gamma_blob.clone(),
                );
                let (pixels, pitch) = present.draw_target();
                self.active = Some(ActiveMode {
                    present,
                    mode_blob,
                    color,
                });
                Ok(SurfaceInfo {
                    pixels,
                    pitch,
                    format: color,
                })
            }
            None => {
                *self.gamma_blob.lock().unwrap() = None;
                Err(self.fail(Error::Unsupported))
            }
        }
    }

    /// Tries every registered pipe in discovery order, returning the
    /// first one whose atomic commit succeeds.
    fn try_every_pipe(
        &mut self,
        fd: RawFd,
        w: u32,
        h: u32,
        refresh_hz: u32,
        slots: &[BufferSlot],
        gamma_blob_id: Option<u32>,
    ) -> Option<(crate::atomic::PropertyBlob, AtomicRequest, PipeBinding)> {
        let pipes = self.registry.pipes().to_vec();
        for (pipe_index, pipe) in pipes.iter().enumerate() {
            let mode_index = match pipe.find_closest_refresh(refresh_hz) {
                Some(idx) => idx,
                None => continue,
            };
            let mode = pipe.modes[mode_index];

            if self.props.acquire(fd, pipe.connector, sys::DRM_MODE_OBJECT_CONNECTOR).is_err() {
                continue;
            }
            if self.props.acquire(fd, pipe.crtc, sys::DRM_MODE_OBJECT_CRTC).is_err() {
                continue;
            }

            let blob = match crate::atomic::PropertyBlob::create(fd, &modeset::mode_blob_bytes(&mode)) {
                Ok(b) => b,
                Err(err) => {
                    log::warn!("set_video_mode: pipe {}: mode blob failed: {}", pipe_index, err);
                    continue;
                }
            };

            let mut req = match AtomicRequest::new() {
                Ok(r) => r,
                Err(_) => continue,
            };

            for other in self.registry.pipes() {
                if other.crtc == pipe.crtc && other.plane != pipe.plane {
                    if let (Ok(fb_prop), Ok(crtc_prop)) = (
                        self.props.lookup_id(other.plane, "FB_ID"),
                        self.props.lookup_id(other.plane, "CRTC_ID"),
                    ) {
                        let _ = req.add(other.plane, fb_prop, 0);
                        let _ = req.add(other.plane, crtc_prop, 0);
                    }
                }
            }

            let connector_crtc_id = match self.props.lookup_id(pipe.connector, "CRTC_ID") {
                Ok(id) => id,
                Err(_) => continue,
            };
            let crtc_mode_id = match self.props.lookup_id(pipe.crtc, "MODE_ID") {
                Ok(id) => id,
                Err(_) => continue,
            };
            let crtc_active = match self.props.lookup_id(pipe.crtc, "ACTIVE") {
                Ok(id) => id,
                Err(_) => continue,
            };

            if req.add(pipe.connector, connector_crtc_id, pipe.crtc as u64).is_err()
                || req.add(pipe.crtc, crtc_mode_id, blob.id as u64).is_err()
                || req.add(pipe.crtc, crtc_active, 1).is_err()
            {
                continue;
            }

            let template = match req.duplicate() {
                Ok(t) => t,
                Err(_) => continue,
            };

            let props = match resolve_prop_ids(&self.props, pipe.plane, pipe.crtc) {
                Ok(p) => p,
                Err(_) => continue,
            };

            let binding = PipeBinding {
                plane_id: pipe.plane,
                crtc_id: pipe.crtc,
                props,
                src_w: w,
                src_h: h,
                mode_w: mode.hdisplay as u32,
                mode_h: mode.vdisplay as u32,
                factor_w: pipe.factor_w,
                factor_h: pipe.factor_h,
            };

            let fb_id = slots[0].fb_id;
            let scaling = *self.scaling_mode.lock().unwrap();
            let commit_req =
                modeset::build_flip_request(&template, &binding, scaling, gamma_blob_id, fb_id);
            let mut commit_req = match commit_req {
                Ok(r) => r,
                Err(_) => continue,
            };

            match commit_req.commit(fd, sys::DRM_MODE_ATOMIC_ALLOW_MODESET) {
                Ok(()) => return Some((blob, template, binding)),
                Err(err) => {
                    log::warn!("set_video_mode: pipe {} commit failed: {}", pipe_index, err);
                    continue;
                }
            }
        }
        None
    }

    /// The pointer/pitch the app should currently draw into. Re-read
    /// this after every `flip_hw_surface()` call, mirroring how SDL's
    /// `SDL_Flip` updates `surface->pixels` in place.
    pub fn draw_target(&self) -> Option<(*mut u8, u32)> {
        self.active.as_ref().map(|active| active.present.draw_target())
    }

    /// `FlipHWSurface`.
    pub fn flip_hw_surface(&mut self) -> Result<(), Error> {
        match &self.active {
            Some(active) => active.present.flip().map_err(|err| self.fail(err)),
            None => Err(self.fail(Error::Unarmed)),
        }
    }

    /// `SetColors`.
    pub fn set_colors(&mut self, first: usize, colors: &[(u8, u8, u8)]) -> Result<(), Error> {
        self.gamma_table.set_colors(first, colors);
        match &self.active {
            Some(active) if active.color.bpp == 8 => {
                let bytes = self.gamma_table.to_bytes();
                active.present.set_colors(&bytes, true).map_err(|err| self.fail(err))
            }
            _ => Ok(()),
        }
    }

    /// `UpdateRects`.
    pub fn update_rects(&mut self, rects: &[(u16, u16, u16, u16)]) -> Result<(), Error> {
        match &self.active {
            Some(active) => active.present.update_rects(rects).map_err(|err| self.fail(err)),
            None => Ok(()),
        }
    }

    /// `PumpEvents`.
    pub fn pump_events(&mut self, sink: &mut dyn EventSink) {
        if let Some(input) = &mut self.input {
            input.pump(sink);
            *self.scaling_mode.lock().unwrap() = input.scaling_mode();
        }
    }

    /// `VideoQuit`: stop the worker, clear buffers, destroy blobs,
    /// release the property cache and pipe registry.
    pub fn video_quit(&mut self) {
        self.active = None;
        *self.gamma_blob.lock().unwrap() = None;
        self.input = None;
        self.props.clear();
        self.registry = PipeRegistry::default();
        self.device = None;
    }
}

fn resolve_prop_ids(props: &PropertyCache, plane: u32, crtc: u32) -> Result<PropIds, Error> {
    Ok(PropIds {
        plane_fb_id: props.lookup_id(plane, "FB_ID")?,
        plane_crtc_id: props.lookup_id(plane, "CRTC_ID")?,
        plane_src_x: props.lookup_id(plane, "SRC_X")?,
        plane_src_y: props.lookup_id(plane, "SRC_Y")?,
        plane_src_w: props.lookup_id(plane, "SRC_W")?,
        plane_src_h: props.lookup_id(plane, "SRC_H")?,
        plane_crtc_x: props.lookup_id(plane, "CRTC_X")?,
        plane_crtc_y: props.lookup_id(plane, "CRTC_Y")?,
        plane_crtc_w: props.lookup_id(plane, "CRTC_W")?,
        plane_crtc_h: props.lookup_id(plane, "CRTC_H")?,
        plane_damage_clips: props.lookup_id(plane, "FB_DAMAGE_CLIPS").ok(),
        crtc_gamma_lut: props.lookup_id(crtc, "GAMMA_LUT").ok(),
    })
}
