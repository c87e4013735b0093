//! Scaling mode and the CRTC-rectangle math.

use kmsdrm_sys as sys;

use crate::atomic::AtomicRequest;
use crate::error::Error;
use crate::pipe::Mode;

/// How the source rectangle is scaled/letterboxed into the CRTC.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScalingMode {
    Fullscreen,
    AspectRatio,
    IntegerScaled,
}

const CYCLE: [ScalingMode; 3] = [
    ScalingMode::Fullscreen,
    ScalingMode::AspectRatio,
    ScalingMode::IntegerScaled,
];

impl ScalingMode {
    /// Advances to the next mode, wrapping at the terminator back to
    /// the first.
    pub fn next(self) -> Self {
        let idx = CYCLE.iter().position(|&m| m == self).unwrap_or(0);
        CYCLE[(idx + 1) % CYCLE.len()]
    }
}

impl Default for ScalingMode {
    fn default() -> Self {
        ScalingMode::Fullscreen
    }
}

/// The CRTC placement of a `(w, h)` source surface.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CrtcRect {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

/// Computes `CRTC_{X,Y,W,H}` for placing a source rectangle onto the CRTC.
pub fn compute_scaling(
    mode: ScalingMode,
    w: u32,
    h: u32,
    mw: u32,
    mh: u32,
    factor_w: u32,
    factor_h: u32,
) -> CrtcRect {
    let (crtc_w, crtc_h) = match mode {
        ScalingMode::Fullscreen => (mw, mh),
        ScalingMode::AspectRatio => {
            let lhs = w as u64 * mh as u64 * factor_w as u64;
            let rhs = h as u64 * mw as u64 * factor_h as u64;
            if lhs > rhs {
                let crtc_w = mw;
                let crtc_h = (factor_h as u64 * crtc_w as u64 * h as u64)
                    / (w as u64 * factor_w as u64);
                (crtc_w, crtc_h as u32)
            } else {
                let crtc_h = mh;
                let crtc_w = (factor_w as u64 * crtc_h as u64 * w as u64)
                    / (h as u64 * factor_h as u64);
                (crtc_w as u32, crtc_h)
            }
        }
        ScalingMode::IntegerScaled => {
            let src_w_corrected = w * factor_w;
            let src_h_corrected = h * factor_h;
            if w < mw / factor_w.max(1) && h < mh / factor_h.max(1) {
                let scale_w = mw / src_w_corrected.max(1);
                let scale_h = mh / src_h_corrected.max(1);
                (w * scale_w, h * scale_h)
            } else {
                (mw, mh)
            }
        }
    };

    CrtcRect {
        x: (mw.saturating_sub(crtc_w)) / 2,
        y: (mh.saturating_sub(crtc_h)) / 2,
        w: crtc_w,
        h: crtc_h,
    }
}

/// Serializes `mode` into the exact byte layout `drmModeCreatePropertyBlob`
/// expects for a `MODE_ID` blob (a `struct drm_mode_modeinfo`), copying
/// every timing field the kernel reported rather than reconstructing a
/// partial one — a blob with zero-width sync pulses fails atomic commit.
pub fn mode_blob_bytes(mode: &Mode) -> Vec<u8> {
    let raw = sys::drmModeModeInfo {
        clock: mode.clock,
        hdisplay: mode.hdisplay,
        hsync_start: mode.hsync_start,
        hsync_end: mode.hsync_end,
        htotal: mode.htotal,
        hskew: mode.hskew,
        vdisplay: mode.vdisplay,
        vsync_start: mode.vsync_start,
        vsync_end: mode.vsync_end,
        vtotal: mode.vtotal,
        vscan: mode.vscan,
        vrefresh: mode.vrefresh,
        flags: mode.flags,
        r#type: mode.mode_type,
        name: mode.name,
    };
    let size = std::mem::size_of::<sys::drmModeModeInfo>();
    let ptr = &raw as *const sys::drmModeModeInfo as *const u8;
    unsafe { std::slice::from_raw_parts(ptr, size) }.to_vec()
}

/// Plane/CRTC property ids resolved once in `set_video_mode` and reused
/// by every later flip.
#[derive(Clone, Copy, Debug)]
pub struct PropIds {
    pub plane_fb_id: u32,
    pub plane_crtc_id: u32,
    pub plane_src_x: u32,
    pub plane_src_y: u32,
    pub plane_src_w: u32,
    pub plane_src_h: u32,
    pub plane_crtc_x: u32,
    pub plane_crtc_y: u32,
    pub plane_crtc_w: u32,
    pub plane_crtc_h: u32,
    pub plane_damage_clips: Option<u32>,
    pub crtc_gamma_lut: Option<u32>,
}

/// Everything a flip commit needs to know about the chosen pipe and
/// surface, bundled so the present engine's worker thread doesn't need
/// to walk the pipe registry on every flip.
#[derive(Clone, Debug)]
pub struct PipeBinding {
    pub plane_id: u32,
    pub crtc_id: u32,
    pub props: PropIds,
    pub src_w: u32,
    pub src_h: u32,
    pub mode_w: u32,
    pub mode_h: u32,
    pub factor_w: u32,
    pub factor_h: u32,
}

/// Duplicates `template`, attaches the plane's `FB_ID`/`SRC_*` and the
/// scaling-derived `CRTC_*` rectangle, and (when available) the active
/// gamma blob.
pub fn build_flip_request(
    template: &AtomicRequest,
    binding: &PipeBinding,
    scaling: ScalingMode,
    gamma_blob: Option<u32>,
    fb_id: u32,
) -> Result<AtomicRequest, Error> {
    let mut req = template.duplicate()?;
    let rect = compute_scaling(
        scaling,
        binding.src_w,
        binding.src_h,
        binding.mode_w,
        binding.mode_h,
        binding.factor_w,
        binding.factor_h,
    );

    req.add(binding.plane_id, binding.props.plane_fb_id, fb_id as u64)?;
    req.add(
        binding.plane_id,
        binding.props.plane_crtc_id,
        binding.crtc_id as u64,
    )?;
    req.add(binding.plane_id, binding.props.plane_src_x, 0)?;
    req.add(binding.plane_id, binding.props.plane_src_y, 0)?;
    req.add(
        binding.plane_id,
        binding.props.plane_src_w,
        (binding.src_w as u64) << 16,
    )?;
    req.add(
        binding.plane_id,
        binding.props.plane_src_h,
        (binding.src_h as u64) << 16,
    )?;
    req.add(binding.plane_id, binding.props.plane_crtc_x, rect.x as u64)?;
    req.add(binding.plane_id, binding.props.plane_crtc_y, rect.y as u64)?;
    req.add(binding.plane_id, binding.props.plane_crtc_w, rect.w as u64)?;
    req.add(binding.plane_id, binding.props.plane_crtc_h, rect.h as u64)?;

    if let (Some(prop), Some(blob_id)) = (binding.props.crtc_gamma_lut, gamma_blob) {
        req.add(binding.crtc_id, prop, blob_id as u64)?;
    }

    Ok(req)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scaling_mode_cycles_and_wraps() {
        let start = ScalingMode::Fullscreen;
        let a = start.next();
        let b = a.next();
        let c = b.next();
        assert_eq!(a, ScalingMode::AspectRatio);
        assert_eq!(b, ScalingMode::IntegerScaled);
        assert_eq!(c, start);
    }

    #[test]
    fn fullscreen_fills_the_crtc() {
        let rect = compute_scaling(ScalingMode::Fullscreen, 320, 240, 640, 480, 1, 1);
        assert_eq!(rect, CrtcRect { x: 0, y: 0, w: 640, h: 480 });
    }

    #[test]
    fn aspect_ratio_letterboxes_matching_resolution() {
        // integer-scaled source larger than the CRTC clamps to the CRTC.
        let rect = compute_scaling(ScalingMode::AspectRatio, 320, 240, 640, 480, 1, 1);
        assert_eq!(rect, CrtcRect { x: 0, y: 0, w: 640, h: 480 });
    }

    #[test]
    fn aspect_ratio_pillarboxes_wider_crtc() {
        // integer-scaled source smaller than the CRTC centers with no scale factor.
        let rect = compute_scaling(ScalingMode::AspectRatio, 320, 240, 800, 480, 1, 1);
        assert_eq!(
            rect,
            CrtcRect {
                x: 80,
                y: 0,
                w: 640,
                h: 480
            }
        );
    }

    #[test]
    fn integer_scaled_uses_floor_multiples() {
        let rect = compute_scaling(ScalingMode::IntegerScaled, 320, 240, 1000, 700, 1, 1);
        // floor(1000/320)=3, floor(700/240)=2
        assert_eq!(rect.w, 960);
        assert_eq!(rect.h, 480);
    }

    #[test]
    fn integer_scaled_falls_through_to_fullscreen_when_source_too_big() {
        let rect = compute_scaling(ScalingMode::IntegerScaled, 640, 480, 640, 480, 1, 1);
        assert_eq!(rect, CrtcRect { x: 0, y: 0, w: 640, h: 480 });
    }

    #[test]
    fn centering_divides_remainder_evenly() {
        let rect = compute_scaling(ScalingMode::Fullscreen, 1, 1, 641, 481, 1, 1);
        assert_eq!(rect.x, 320);
        assert_eq!(rect.y, 240);
    }
}
