//! Pipe discovery: valid (plane, CRTC, encoder, connector)
//! quadruples and the video-mode list synthesized from them.

use std::os::raw::c_int;

use kmsdrm_sys as sys;

use crate::error::{kernel_error, Error};
use crate::props::PropertyCache;

/// A display mode: the full kernel-reported timing, so a `MODE_ID` blob
/// built from it has real sync pulses instead of a fabricated subset.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Mode {
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
    pub mode_type: u32,
    pub name: [std::os::raw::c_char; sys::DRM_DISPLAY_MODE_LEN],
}

impl Mode {
    /// Vertical refresh rate in Hz, from the raw mode timings.
    pub fn refresh_hz(&self) -> f64 {
        let htotal = self.htotal as f64;
        let vtotal = self.vtotal as f64;
        if htotal == 0.0 || vtotal == 0.0 {
            return 0.0;
        }
        self.clock as f64 * 1000.0 / (htotal * vtotal)
    }
}

/// A valid primary-plane scan-out pathway.
#[derive(Clone, Debug)]
pub struct Pipe {
    pub plane: u32,
    pub crtc: u32,
    pub encoder: u32,
    pub connector: u32,
    pub modes: Vec<Mode>,
    pub factor_w: u32,
    pub factor_h: u32,
}

impl Pipe {
    /// Index of the mode whose refresh rate is closest to `target_hz`.
    /// Ties resolve to the earliest index.
    pub fn find_closest_refresh(&self, target_hz: u32) -> Option<usize> {
        self.modes
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| {
                let da = (a.refresh_hz() - target_hz as f64).abs();
                let db = (b.refresh_hz() - target_hz as f64).abs();
                da.partial_cmp(&db).unwrap_or(std::cmp::Ordering::Equal)
            })
            .map(|(idx, _)| idx)
    }
}

/// `round(num/den)` using the same rounding the EDID pitch derivation needs.
fn round_ratio(num: i64, den: i64) -> i64 {
    if den == 0 {
        return 1;
    }
    (num + den / 2) / den
}

/// Derives `(factor_w, factor_h)` from a mode's timing and a panel's
/// physical size.
pub fn aspect_factors(hdisplay: u32, vdisplay: u32, mm_width: u32, mm_height: u32) -> (u32, u32) {
    if mm_width == 0 || mm_height == 0 {
        return (1, 1);
    }
    let ppmm_w = ((hdisplay as i64) << 16) / mm_width as i64;
    let ppmm_h = ((vdisplay as i64) << 16) / mm_height as i64;

    let factor_w = {
        let f = round_ratio(ppmm_w, ppmm_h);
        if f > 1 {
            f as u32
        } else {
            1
        }
    };
    let factor_h = {
        let f = round_ratio(ppmm_h, ppmm_w);
        if f > 1 {
            f as u32
        } else {
            1
        }
    };
    (factor_w, factor_h)
}

/// True when the quadruple satisfies every placement condition.
#[allow(clippy::too_many_arguments)]
pub fn is_valid_quadruple(
    plane_possible_crtcs: u32,
    encoder_possible_crtcs: u32,
    crtc_index: u32,
    connector_encoder_id: u32,
    encoder_id: u32,
    connected: bool,
    count_modes: i32,
) -> bool {
    let bit = 1u32 << crtc_index;
    plane_possible_crtcs & bit != 0
        && encoder_possible_crtcs & bit != 0
        && connector_encoder_id == encoder_id
        && connected
        && count_modes > 0
}

/// A deduplicated, descending-by-pixel-count `(w, h)` list.
pub fn synthesize_mode_list(pipes: &[Pipe]) -> Vec<(u32, u32)> {
    let mut modes: Vec<(u32, u32)> = Vec::new();
    let mut push = |w: u32, h: u32| {
        if !modes.contains(&(w, h)) {
            modes.push((w, h));
        }
    };

    for pipe in pipes {
        for mode in &pipe.modes {
            push(mode.hdisplay as u32, mode.vdisplay as u32);
            if pipe.factor_w != 1 || pipe.factor_h != 1 {
                push(
                    mode.hdisplay as u32 / pipe.factor_w,
                    mode.vdisplay as u32 / pipe.factor_h,
                );
            }
        }
    }

    modes.sort_by(|a, b| (b.0 * b.1).cmp(&(a.0 * a.1)));
    modes
}

/// Owns every pipe discovered at init time, in discovery order.
#[derive(Default)]
pub struct PipeRegistry {
    pipes: Vec<Pipe>,
}

impl PipeRegistry {
    pub fn pipes(&self) -> &[Pipe] {
        &self.pipes
    }

    pub fn video_modes(&self) -> Vec<(u32, u32)> {
        synthesize_mode_list(&self.pipes)
    }

    /// Enumerates DRM resources on `fd` and builds the registry,
    /// Overlay planes are skipped; registration
    /// order is append-at-tail.
    pub fn discover(fd: c_int, props: &mut PropertyCache) -> Result<Self, Error> {
        let res = unsafe { sys::drmModeGetResources(fd) };
        if res.is_null() {
            return Err(kernel_error("drmModeGetResources"));
        }
        let plane_res = unsafe { sys::drmModeGetPlaneResources(fd) };
        if plane_res.is_null() {
            unsafe { sys::drmModeFreeResources(res) };
            return Err(kernel_error("drmModeGetPlaneResources"));
        }

        let crtcs = unsafe { std::slice::from_raw_parts((*res).crtcs, (*res).count_crtcs as usize) }
            .to_vec();
        let encoders =
            unsafe { std::slice::from_raw_parts((*res).encoders, (*res).count_encoders as usize) }
                .to_vec();
        let connectors = unsafe {
            std::slice::from_raw_parts((*res).connectors, (*res).count_connectors as usize)
        }
        .to_vec();
        let planes = unsafe {
            std::slice::from_raw_parts((*plane_res).planes, (*plane_res).count_planes as usize)
        }
        .to_vec();

        unsafe {
            sys::drmModeFreeResources(res);
            sys::drmModeFreePlaneResources(plane_res);
        }

        let mut pipes = Vec::new();

        for &plane_id in &planes {
            let plane = unsafe { sys::drmModeGetPlane(fd, plane_id) };
            if plane.is_null() {
                continue;
            }
            let possible_crtcs = unsafe { (*plane).possible_crtcs };
            unsafe { sys::drmModeFreePlane(plane) };

            props.acquire(fd, plane_id, sys::DRM_MODE_OBJECT_PLANE)?;
            let is_overlay = props
                .get_value(plane_id, "type")
                .map(|v| v == sys::DRM_PLANE_TYPE_OVERLAY)
                .unwrap_or(false);
            if is_overlay {
                log::debug!("pipe discovery: skipping overlay plane {}", plane_id);
                continue;
            }

            for (crtc_index, &crtc_id) in crtcs.iter().enumerate() {
                let crtc = unsafe { sys::drmModeGetCrtc(fd, crtc_id) };
                if crtc.is_null() {
                    continue;
                }
                unsafe { sys::drmModeFreeCrtc(crtc) };

                for &encoder_id in &encoders {
                    let encoder = unsafe { sys::drmModeGetEncoder(fd, encoder_id) };
                    if encoder.is_null() {
                        continue;
                    }
                    let encoder_possible_crtcs = unsafe { (*encoder).possible_crtcs };
                    unsafe { sys::drmModeFreeEncoder(encoder) };

                    for &connector_id in &connectors {
                        let connector = unsafe { sys::drmModeGetConnector(fd, connector_id) };
                        if connector.is_null() {
                            continue;
                        }

                        let connector_encoder_id = unsafe { (*connector).encoder_id };
                        let connected =
                            unsafe { (*connector).connection } == sys::DRM_MODE_CONNECTED;
                        let count_modes = unsafe { (*connector).count_modes };

                        let valid = is_valid_quadruple(
                            possible_crtcs,
                            encoder_possible_crtcs,
                            crtc_index as u32,
                            connector_encoder_id,
                            encoder_id,
                            connected,
                            count_modes,
                        );

                        if valid {
                            let mm_width = unsafe { (*connector).mmWidth };
                            let mm_height = unsafe { (*connector).mmHeight };
                            let raw_modes = unsafe {
                                std::slice::from_raw_parts(
                                    (*connector).modes,
                                    count_modes as usize,
                                )
                            };
                            let modes: Vec<Mode> = raw_modes
                                .iter()
                                .map(|m| Mode {
                                    clock: m.clock,
                                    hdisplay: m.hdisplay,
                                    hsync_start: m.hsync_start,
                                    hsync_end: m.hsync_end,
                                    htotal: m.htotal,
                                    hskew: m.hskew,
                                    vdisplay: m.vdisplay,
                                    vsync_start: m.vsync_start,
                                    vsync_end: m.vsync_end,
                                    vtotal: m.vtotal,
                                    vscan: m.vscan,
                                    vrefresh: m.vrefresh,
                                    flags: m.flags,
                                    mode_type: m.r#type,
                                    name: m.name,
                                })
                                .collect();

                            let (factor_w, factor_h) = aspect_factors(
                                modes[0].hdisplay as u32,
                                modes[0].vdisplay as u32,
                                mm_width,
                                mm_height,
                            );

                            log::debug!(
                                "pipe discovery: plane {} crtc {} encoder {} connector {} ({} modes)",
                                plane_id,
                                crtc_id,
                                encoder_id,
                                connector_id,
                                modes.len()
                            );

                            pipes.push(Pipe {
                                plane: plane_id,
                                crtc: crtc_id,
                                encoder: encoder_id,
                                connector: connector_id,
                                modes,
                                factor_w,
                                factor_h,
                            });
                        }

                        unsafe { sys::drmModeFreeConnector(connector) };
                    }
                }
            }
        }

        if pipes.is_empty() {
            return Err(Error::Unsupported);
        }

        Ok(PipeRegistry { pipes })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_mode(clock: u32, hdisplay: u16, vdisplay: u16, htotal: u16, vtotal: u16) -> Mode {
        Mode {
            clock,
            hdisplay,
            hsync_start: hdisplay,
            hsync_end: hdisplay,
            htotal,
            hskew: 0,
            vdisplay,
            vsync_start: vdisplay,
            vsync_end: vdisplay,
            vtotal,
            vscan: 0,
            vrefresh: 0,
            flags: 0,
            mode_type: 0,
            name: [0; sys::DRM_DISPLAY_MODE_LEN],
        }
    }

    fn pipe(modes: &[(u32, u16, u16, u16, u16)], factor_w: u32, factor_h: u32) -> Pipe {
        Pipe {
            plane: 1,
            crtc: 2,
            encoder: 3,
            connector: 4,
            factor_w,
            factor_h,
            modes: modes
                .iter()
                .map(|&(clock, hd, vd, ht, vt)| test_mode(clock, hd, vd, ht, vt))
                .collect(),
        }
    }

    #[test]
    fn quadruple_requires_all_four_conditions() {
        assert!(is_valid_quadruple(0b0001, 0b0001, 0, 5, 5, true, 3));
        // plane doesn't cover this crtc
        assert!(!is_valid_quadruple(0b0010, 0b0001, 0, 5, 5, true, 3));
        // encoder doesn't cover this crtc
        assert!(!is_valid_quadruple(0b0001, 0b0010, 0, 5, 5, true, 3));
        // encoder mismatch
        assert!(!is_valid_quadruple(0b0001, 0b0001, 0, 5, 6, true, 3));
        // disconnected
        assert!(!is_valid_quadruple(0b0001, 0b0001, 0, 5, 5, false, 3));
        // no modes
        assert!(!is_valid_quadruple(0b0001, 0b0001, 0, 5, 5, true, 0));
    }

    #[test]
    fn aspect_factor_is_one_for_square_pixels() {
        // 1920x1080 on a 16:9 panel of roughly matching pitch.
        let (fw, fh) = aspect_factors(1920, 1080, 520, 293);
        assert_eq!((fw, fh), (1, 1));
    }

    #[test]
    fn aspect_factor_detects_pixel_doubling() {
        // Horizontal pixel pitch works out to twice the vertical one.
        let (fw, fh) = aspect_factors(320, 240, 100, 150);
        assert_eq!((fw, fh), (2, 1));
    }

    #[test]
    fn find_closest_refresh_breaks_ties_at_earliest_index() {
        // clock*1000/(htotal*vtotal): both modes compute to 60 Hz.
        let p = pipe(
            &[
                (148_500, 1920, 1080, 2200, 1125),
                (74_250, 1920, 1080, 1100, 1125),
            ],
            1,
            1,
        );
        assert_eq!(p.find_closest_refresh(60), Some(0));
    }

    #[test]
    fn find_closest_refresh_picks_minimum_delta() {
        let p = pipe(
            &[
                (148_500, 1920, 1080, 2200, 1125), // 60 Hz
                (148_500, 1920, 1080, 2750, 1125), // 48 Hz
            ],
            1,
            1,
        );
        assert_eq!(p.find_closest_refresh(50), Some(1));
    }

    #[test]
    fn synthesize_mode_list_dedupes_and_sorts_descending() {
        let pipes = vec![
            pipe(&[(1, 640, 480, 1, 1), (1, 1920, 1080, 1, 1)], 1, 1),
            pipe(&[(1, 1920, 1080, 1, 1)], 1, 1),
        ];
        let modes = synthesize_mode_list(&pipes);
        assert_eq!(modes, vec![(1920, 1080), (640, 480)]);
    }

    #[test]
    fn synthesize_mode_list_adds_corrected_resolution() {
        let pipes = vec![pipe(&[(1, 640, 480, 1, 1)], 2, 1)];
        let modes = synthesize_mode_list(&pipes);
        assert!(modes.contains(&(640, 480)));
        assert!(modes.contains(&(320, 480)));
    }
}
