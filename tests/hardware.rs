//! Integration tests that exercise a real DRM device and real evdev
//! nodes. Ignored by default since CI and most developer machines have
//! neither; run explicitly with `cargo test -- --ignored` on a box
//! with a KMS-capable GPU and permission to open `/dev/dri/card*`.

use std::thread;
use std::time::Duration;

use kmsdrm::input::EventSink;
use kmsdrm::{video_flags, Backend, Config, ScalingMode};

struct NullSink;

impl EventSink for NullSink {
    fn key(&mut self, _key: kmsdrm::Keysym, _pressed: bool) {}
    fn mouse_button(&mut self, _button: kmsdrm::input::MouseButton, _pressed: bool) {}
    fn mouse_motion(&mut self, _dx: i32, _dy: i32) {}
    fn scaling_changed(&mut self, _mode: ScalingMode) {}
}

#[test]
#[ignore]
fn single_pipe_single_buffer_default_mode() {
    let mut backend = Backend::new(Config::from_env());
    backend.video_init().expect("video_init");

    let surface = backend
        .set_video_mode(640, 480, 16, 0)
        .expect("set_video_mode");
    assert_eq!(surface.format.bpp, 16);
    assert_eq!(surface.format.r.mask(), 0xF800);
    assert_eq!(surface.format.g.mask(), 0x07E0);
    assert_eq!(surface.format.b.mask(), 0x001F);
    assert!(!surface.pixels.is_null());

    backend.flip_hw_surface().expect("flip_hw_surface");
    backend.video_quit();
}

#[test]
#[ignore]
fn triple_buffer_flip_cycles_without_error() {
    let mut backend = Backend::new(Config::from_env());
    backend.video_init().expect("video_init");

    backend
        .set_video_mode(320, 240, 32, video_flags::TRIPLEBUF)
        .expect("set_video_mode");

    for _ in 0..3 {
        backend.flip_hw_surface().expect("flip_hw_surface");
    }
    backend.video_quit();
}

#[test]
#[ignore]
fn palettized_surface_accepts_gamma_updates() {
    let mut backend = Backend::new(Config::from_env());
    backend.video_init().expect("video_init");

    backend
        .set_video_mode(320, 200, 8, 0)
        .expect("set_video_mode");

    let palette: Vec<(u8, u8, u8)> = (0..256).map(|i| (i as u8, i as u8, i as u8)).collect();
    backend.set_colors(0, &palette).expect("set_colors");
    backend.flip_hw_surface().expect("flip_hw_surface");
    backend.video_quit();
}

#[test]
#[ignore]
fn video_quit_allows_reinit_on_same_device() {
    let mut backend = Backend::new(Config::from_env());
    backend.video_init().expect("video_init");
    backend
        .set_video_mode(640, 480, 16, 0)
        .expect("set_video_mode");
    backend.video_quit();

    backend.video_init().expect("re-init after video_quit");
    backend
        .set_video_mode(640, 480, 16, 0)
        .expect("set_video_mode after re-init");
    backend.video_quit();
}

#[test]
#[ignore]
fn pump_events_drains_real_input_devices_without_blocking() {
    let mut backend = Backend::new(Config::from_env());
    backend.video_init().expect("video_init");
    backend
        .set_video_mode(640, 480, 16, 0)
        .expect("set_video_mode");

    let mut sink = NullSink;
    for _ in 0..5 {
        backend.pump_events(&mut sink);
        thread::sleep(Duration::from_millis(16));
    }
    backend.video_quit();
}
