//! Environment-variable configuration surface.

use std::env;

const DEFAULT_REFRESH_HZ: u32 = 60;

/// Process-wide knobs the backend reads at `SetVideoMode`/init time.
///
/// `SDL_VIDEODRIVER` is deliberately not read here: selecting this
/// backend over others is the host's job, performed before a
/// [`crate::backend::Backend`] is ever constructed.
#[derive(Clone, Debug)]
pub struct Config {
    /// Explicit DRM device node (`SDL_VIDEO_KMSDRM_NODE`), if set.
    pub node: Option<String>,
    /// Desired refresh rate in Hz (`SDL_VIDEO_REFRESHRATE`), default 60.
    pub refresh_hz: u32,
    /// evdev keycode that cycles the scaling mode (`SDL_VIDEO_KMSDRM_SCALING_KEY`).
    pub scaling_key: Option<u16>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            node: None,
            refresh_hz: DEFAULT_REFRESH_HZ,
            scaling_key: None,
        }
    }
}

impl Config {
    /// Reads the configuration from the process environment.
    pub fn from_env() -> Self {
        let node = env::var("SDL_VIDEO_KMSDRM_NODE").ok();

        let refresh_hz = match env::var("SDL_VIDEO_REFRESHRATE") {
            Ok(value) => match value.parse() {
                Ok(hz) => hz,
                Err(_) => {
                    log::warn!(
                        "SDL_VIDEO_REFRESHRATE={:?} is not a valid integer, using {}",
                        value,
                        DEFAULT_REFRESH_HZ
                    );
                    DEFAULT_REFRESH_HZ
                }
            },
            Err(_) => DEFAULT_REFRESH_HZ,
        };

        let scaling_key = match env::var("SDL_VIDEO_KMSDRM_SCALING_KEY") {
            Ok(value) => match value.parse() {
                Ok(key) => Some(key),
                Err(_) => {
                    log::warn!(
                        "SDL_VIDEO_KMSDRM_SCALING_KEY={:?} is not a valid evdev keycode",
                        value
                    );
                    None
                }
            },
            Err(_) => None,
        };

        Config {
            node,
            refresh_hz,
            scaling_key,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sdl_compatible() {
        let cfg = Config::default();
        assert_eq!(cfg.refresh_hz, 60);
        assert!(cfg.node.is_none());
        assert!(cfg.scaling_key.is_none());
    }
}
