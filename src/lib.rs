//! A direct-rendering KMS/DRM video backend: atomic modeset, dumb-buffer
//! presentation (single/double/triple buffering), 8bpp gamma LUTs, and
//! an evdev/udev input bridge, modeled on SDL 1.2's `kmsdrm` driver
//! interface.

pub mod atomic;
pub mod backend;
pub mod buffer;
pub mod color;
pub mod config;
pub mod device;
pub mod error;
pub mod gamma;
pub mod input;
pub mod modeset;
pub mod pipe;
pub mod present;
pub mod props;

pub use backend::{Backend, SurfaceInfo, VideoInfo};
pub use config::Config;
pub use error::{Error, Result};
pub use input::{EventSink, Keysym, MouseButton};
pub use modeset::ScalingMode;
pub use present::video_flags;
