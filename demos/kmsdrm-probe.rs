extern crate kmsdrm;
extern crate structopt;

use std::thread;
use std::time::Duration;

use structopt::StructOpt;

use kmsdrm::backend::Backend;
use kmsdrm::input::{EventSink, Keysym, MouseButton};
use kmsdrm::{video_flags, Config, ScalingMode};

#[derive(Debug, StructOpt)]
struct CliArgs {
    /// List the synthesized mode list and exit.
    #[structopt(short = "l", long = "list-modes")]
    list_modes: bool,
    /// Width of the surface to request.
    #[structopt(short = "w", long = "width", default_value = "640")]
    width: u32,
    /// Height of the surface to request.
    #[structopt(short = "H", long = "height", default_value = "480")]
    height: u32,
    /// Color depth in bits.
    #[structopt(short = "d", long = "depth", default_value = "32")]
    depth: u32,
    /// Number of frames to flip before exiting.
    #[structopt(short = "n", long = "frames", default_value = "60")]
    frames: u32,
    /// Use double buffering instead of triple.
    #[structopt(long = "double")]
    double: bool,
}

struct LoggingSink;

impl EventSink for LoggingSink {
    fn key(&mut self, key: Keysym, pressed: bool) {
        println!("key {:?} {}", key, if pressed { "down" } else { "up" });
    }

    fn mouse_button(&mut self, button: MouseButton, pressed: bool) {
        println!("button {:?} {}", button, if pressed { "down" } else { "up" });
    }

    fn mouse_motion(&mut self, dx: i32, dy: i32) {
        if dx != 0 || dy != 0 {
            println!("motion {} {}", dx, dy);
        }
    }

    fn scaling_changed(&mut self, mode: ScalingMode) {
        println!("scaling mode changed to {:?}", mode);
    }
}

fn fill(pixels: *mut u8, pitch: u32, h: u32, value: u8) {
    let len = (pitch * h) as usize;
    let slice = unsafe { std::slice::from_raw_parts_mut(pixels, len) };
    slice.fill(value);
}

fn main() {
    env_logger::init();
    let args = CliArgs::from_args();

    let mut backend = Backend::new(Config::from_env());
    let info = backend.video_init().expect("video_init failed");
    println!(
        "video_init: {}x{} at {} bpp",
        info.current_w, info.current_h, info.bits_per_pixel
    );

    for (w, h) in backend.list_modes() {
        println!("mode: {}x{}", w, h);
    }
    if args.list_modes {
        return;
    }

    let flags = if args.double {
        video_flags::DOUBLEBUF
    } else {
        video_flags::TRIPLEBUF
    };

    let surface = backend
        .set_video_mode(args.width, args.height, args.depth, flags)
        .expect("set_video_mode failed");
    println!(
        "set_video_mode: {}x{} {} (pitch {})",
        args.width, args.height, surface.format.name, surface.pitch
    );

    let mut sink = LoggingSink;
    for frame in 0..args.frames {
        backend.pump_events(&mut sink);

        if let Some((pixels, pitch)) = backend.draw_target() {
            let value = if frame % 2 == 0 { 0x00 } else { 0xff };
            fill(pixels, pitch, args.height, value);
        }

        backend.flip_hw_surface().expect("flip failed");
        thread::sleep(Duration::from_millis(16));
    }

    backend.video_quit();
}
