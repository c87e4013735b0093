//! evdev/udev input bridge.
//!
//! This module owns its own evdev scancode to [`Keysym`] table, since
//! there is no host keysym enum to defer to, and hands translated
//! keysyms and mouse button events through [`EventSink`].

use std::fs::{File, OpenOptions};
use std::io::{self, Read};
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::OpenOptionsExt;

use crate::error::Error;
use crate::modeset::ScalingMode;

const EV_KEY: u16 = 0x01;
const EV_REL: u16 = 0x02;

const REL_X: u16 = 0x00;
const REL_Y: u16 = 0x01;
const REL_WHEEL: u16 = 0x08;

const BTN_LEFT: u16 = 0x110;
const BTN_TASK: u16 = 0x117;

/// `struct input_event` (see `linux/input.h`); `time` is never read.
#[repr(C)]
#[derive(Clone, Copy)]
struct InputEvent {
    time: libc::timeval,
    kind: u16,
    code: u16,
    value: i32,
}

/// evdev `value` field meanings for `EV_KEY`.
const KEY_RELEASE: i32 = 0;
const KEY_REPEAT: i32 = 2;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
    Other(u16),
    WheelUp,
    WheelDown,
}

/// A host-independent keysym, since this crate has no host keysym enum
/// to defer to. Mirrors the evdev keycode -> keysym table the original
/// driver keeps in `SDL_kmsdrmevents.c`; a code outside the table
/// translates to `Unknown` rather than panicking.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum Keysym {
    Unknown,
    Escape,
    Num1, Num2, Num3, Num4, Num5, Num6, Num7, Num8, Num9, Num0,
    Minus, Equals, Backspace, Tab,
    Q, W, E, R, T, Y, U, I, O, P,
    LeftBracket, RightBracket, Return, LCtrl,
    A, S, D, F, G, H, J, K, L,
    Semicolon, Quote, LShift, Backslash,
    Z, X, C, V, B, N, M,
    Comma, Period, Slash, RShift,
    KpMultiply, LAlt, Space, CapsLock,
    F1, F2, F3, F4, F5, F6, F7, F8, F9, F10,
    NumLock, ScrollLock,
    Kp7, Kp8, Kp9, KpMinus, Kp4, Kp5, Kp6, KpPlus, Kp1, Kp2, Kp3, Kp0, KpPeriod,
    F11, F12, KpEnter, RCtrl, KpDivide, SysReq, RAlt,
    Home, Up, PageUp, Left, Right, End, Down, PageDown, Insert, Delete,
    Power, KpEquals, Pause,
    LMeta, RMeta, Compose,
    Undo, Help, Menu,
    F13, F14, F15,
    Print,
}

/// Evdev keycode -> [`Keysym`] table for a standard PC keyboard layout.
fn translate_keycode(code: u16) -> Keysym {
    match code {
        1 => Keysym::Escape,
        2 => Keysym::Num1,
        3 => Keysym::Num2,
        4 => Keysym::Num3,
        5 => Keysym::Num4,
        6 => Keysym::Num5,
        7 => Keysym::Num6,
        8 => Keysym::Num7,
        9 => Keysym::Num8,
        10 => Keysym::Num9,
        11 => Keysym::Num0,
        12 => Keysym::Minus,
        13 => Keysym::Equals,
        14 => Keysym::Backspace,
        15 => Keysym::Tab,
        16 => Keysym::Q,
        17 => Keysym::W,
        18 => Keysym::E,
        19 => Keysym::R,
        20 => Keysym::T,
        21 => Keysym::Y,
        22 => Keysym::U,
        23 => Keysym::I,
        24 => Keysym::O,
        25 => Keysym::P,
        26 => Keysym::LeftBracket,
        27 => Keysym::RightBracket,
        28 => Keysym::Return,
        29 => Keysym::LCtrl,
        30 => Keysym::A,
        31 => Keysym::S,
        32 => Keysym::D,
        33 => Keysym::F,
        34 => Keysym::G,
        35 => Keysym::H,
        36 => Keysym::J,
        37 => Keysym::K,
        38 => Keysym::L,
        39 => Keysym::Semicolon,
        40 => Keysym::Quote,
        42 => Keysym::LShift,
        43 => Keysym::Backslash,
        44 => Keysym::Z,
        45 => Keysym::X,
        46 => Keysym::C,
        47 => Keysym::V,
        48 => Keysym::B,
        49 => Keysym::N,
        50 => Keysym::M,
        51 => Keysym::Comma,
        52 => Keysym::Period,
        53 => Keysym::Slash,
        54 => Keysym::RShift,
        55 => Keysym::KpMultiply,
        56 => Keysym::LAlt,
        57 => Keysym::Space,
        58 => Keysym::CapsLock,
        59 => Keysym::F1,
        60 => Keysym::F2,
        61 => Keysym::F3,
        62 => Keysym::F4,
        63 => Keysym::F5,
        64 => Keysym::F6,
        65 => Keysym::F7,
        66 => Keysym::F8,
        67 => Keysym::F9,
        68 => Keysym::F10,
        69 => Keysym::NumLock,
        70 => Keysym::ScrollLock,
        71 => Keysym::Kp7,
        72 => Keysym::Kp8,
        73 => Keysym::Kp9,
        74 => Keysym::KpMinus,
        75 => Keysym::Kp4,
        76 => Keysym::Kp5,
        77 => Keysym::Kp6,
        78 => Keysym::KpPlus,
        79 => Keysym::Kp1,
        80 => Keysym::Kp2,
        81 => Keysym::Kp3,
        82 => Keysym::Kp0,
        83 => Keysym::KpPeriod,
        87 => Keysym::F11,
        88 => Keysym::F12,
        96 => Keysym::KpEnter,
        97 => Keysym::RCtrl,
        98 => Keysym::KpDivide,
        99 => Keysym::SysReq,
        100 => Keysym::RAlt,
        102 => Keysym::Home,
        103 => Keysym::Up,
        104 => Keysym::PageUp,
        105 => Keysym::Left,
        106 => Keysym::Right,
        107 => Keysym::End,
        108 => Keysym::Down,
        109 => Keysym::PageDown,
        110 => Keysym::Insert,
        111 => Keysym::Delete,
        116 => Keysym::Power,
        117 => Keysym::KpEquals,
        119 => Keysym::Pause,
        125 => Keysym::LMeta,
        126 => Keysym::RMeta,
        127 => Keysym::Compose,
        131 => Keysym::Undo,
        138 => Keysym::Help,
        139 => Keysym::Menu,
        183 => Keysym::F13,
        184 => Keysym::F14,
        185 => Keysym::F15,
        210 => Keysym::Print,
        _ => Keysym::Unknown,
    }
}

/// Receives translated events from [`InputBridge::pump`]. The host
/// implements this to feed its own event queue.
pub trait EventSink {
    fn key(&mut self, key: Keysym, pressed: bool);
    fn mouse_button(&mut self, button: MouseButton, pressed: bool);
    fn mouse_motion(&mut self, dx: i32, dy: i32);
    fn scaling_changed(&mut self, mode: ScalingMode);
}

struct InputDevice {
    file: File,
    path: String,
}

/// Enumerated keyboard/mouse evdev nodes, opened non-blocking.
pub struct InputBridge {
    devices: Vec<InputDevice>,
    scaling_key: Option<u16>,
    scaling_mode: ScalingMode,
}

impl InputBridge {
    /// Enumerates `ID_INPUT_KEY=1` then `ID_INPUT_MOUSE=1` devices via
    /// udev, opening each devnode `O_RDONLY|O_NONBLOCK|O_CLOEXEC`.
    pub fn discover(scaling_key: Option<u16>) -> Result<Self, Error> {
        let mut devices = Vec::new();
        for property in ["ID_INPUT_KEY", "ID_INPUT_MOUSE"] {
            match enumerate_devnodes(property) {
                Ok(paths) => {
                    for path in paths {
                        match open_nonblocking(&path) {
                            Ok(file) => {
                                log::debug!("input: opened {} ({})", path, property);
                                devices.push(InputDevice { file, path });
                            }
                            Err(err) => {
                                log::warn!("input: failed to open {}: {}", path, err)
                            }
                        }
                    }
                }
                Err(err) => log::warn!("input: udev enumeration for {} failed: {}", property, err),
            }
        }

        Ok(InputBridge {
            devices,
            scaling_key,
            scaling_mode: ScalingMode::default(),
        })
    }

    pub fn scaling_mode(&self) -> ScalingMode {
        self.scaling_mode
    }

    /// Drains every device's non-blocking read queue, dispatching to
    /// `sink`. Never blocks; an `EAGAIN` ends that device's batch.
    pub fn pump(&mut self, sink: &mut dyn EventSink) {
        let scaling_key = self.scaling_key;
        let mut scaling_mode = self.scaling_mode;

        for dev in &mut self.devices {
            loop {
                match read_event(&mut dev.file) {
                    Ok(Some(event)) => {
                        dispatch_event(event, scaling_key, &mut scaling_mode, sink)
                    }
                    Ok(None) => break,
                    Err(err) => {
                        log::warn!("input: read from {} failed: {}", dev.path, err);
                        break;
                    }
                }
            }
        }

        self.scaling_mode = scaling_mode;
    }
}

fn dispatch_event(
    event: InputEvent,
    scaling_key: Option<u16>,
    scaling_mode: &mut ScalingMode,
    sink: &mut dyn EventSink,
) {
    match event.kind {
        EV_KEY => {
            // Autorepeat must not re-trigger the scaling cycle or emit
            // a duplicate button/key edge.
            if event.value == KEY_REPEAT {
                return;
            }
            let pressed = event.value != KEY_RELEASE;

            if let Some(key) = scaling_key {
                if event.code == key {
                    if pressed {
                        *scaling_mode = scaling_mode.next();
                        sink.scaling_changed(*scaling_mode);
                    }
                    return;
                }
            }

            if (BTN_LEFT..=BTN_TASK).contains(&event.code) {
                let button = match event.code {
                    BTN_LEFT => MouseButton::Left,
                    0x111 => MouseButton::Right,
                    0x112 => MouseButton::Middle,
                    other => MouseButton::Other(other),
                };
                sink.mouse_button(button, pressed);
            } else {
                sink.key(translate_keycode(event.code), pressed);
            }
        }
        EV_REL => match event.code {
            REL_X => sink.mouse_motion(event.value, 0),
            REL_Y => sink.mouse_motion(0, event.value),
            REL_WHEEL => {
                let button = if event.value < 0 {
                    MouseButton::WheelDown
                } else {
                    MouseButton::WheelUp
                };
                sink.mouse_button(button, true);
                sink.mouse_button(button, false);
            }
            _ => {}
        },
        // EV_SYN, EV_MSC, and anything else are part of the evdev
        // protocol but carry nothing this backend dispatches.
        _ => {}
    }
}

fn open_nonblocking(path: &str) -> io::Result<File> {
    OpenOptions::new()
        .read(true)
        .custom_flags(libc::O_NONBLOCK | libc::O_CLOEXEC)
        .open(path)
}

fn read_event(file: &mut File) -> io::Result<Option<InputEvent>> {
    let mut event = InputEvent {
        time: libc::timeval {
            tv_sec: 0,
            tv_usec: 0,
        },
        kind: 0,
        code: 0,
        value: 0,
    };
    let buf = unsafe {
        std::slice::from_raw_parts_mut(
            &mut event as *mut InputEvent as *mut u8,
            std::mem::size_of::<InputEvent>(),
        )
    };
    match file.read(buf) {
        Ok(n) if n == buf.len() => Ok(Some(event)),
        Ok(_) => Ok(None),
        Err(err) if err.kind() == io::ErrorKind::WouldBlock => Ok(None),
        Err(err) => Err(err),
    }
}

fn enumerate_devnodes(property: &str) -> Result<Vec<String>, Error> {
    let mut enumerator = udev::Enumerator::new().map_err(Error::Io)?;
    enumerator.match_subsystem("input").map_err(Error::Io)?;
    enumerator
        .match_property(property, "1")
        .map_err(Error::Io)?;

    let mut paths = Vec::new();
    for device in enumerator.scan_devices().map_err(Error::Io)? {
        if let Some(devnode) = device.devnode() {
            paths.push(String::from_utf8_lossy(devnode.as_os_str().as_bytes()).into_owned());
        }
    }
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[derive(Default)]
    struct RecordingSink {
        keys: RefCell<Vec<(Keysym, bool)>>,
        buttons: RefCell<Vec<(MouseButton, bool)>>,
        motion: RefCell<Vec<(i32, i32)>>,
        scaling: RefCell<Vec<ScalingMode>>,
    }

    impl EventSink for RecordingSink {
        fn key(&mut self, key: Keysym, pressed: bool) {
            self.keys.borrow_mut().push((key, pressed));
        }
        fn mouse_button(&mut self, button: MouseButton, pressed: bool) {
            self.buttons.borrow_mut().push((button, pressed));
        }
        fn mouse_motion(&mut self, dx: i32, dy: i32) {
            self.motion.borrow_mut().push((dx, dy));
        }
        fn scaling_changed(&mut self, mode: ScalingMode) {
            self.scaling.borrow_mut().push(mode);
        }
    }

    fn key_event(code: u16, value: i32) -> InputEvent {
        InputEvent {
            time: libc::timeval { tv_sec: 0, tv_usec: 0 },
            kind: EV_KEY,
            code,
            value,
        }
    }

    fn rel_event(code: u16, value: i32) -> InputEvent {
        InputEvent {
            time: libc::timeval { tv_sec: 0, tv_usec: 0 },
            kind: EV_REL,
            code,
            value,
        }
    }

    #[test]
    fn scaling_key_press_advances_but_release_does_not() {
        let mut sink = RecordingSink::default();
        let mut mode = ScalingMode::Fullscreen;
        dispatch_event(key_event(200, 1), Some(200), &mut mode, &mut sink);
        dispatch_event(key_event(200, 0), Some(200), &mut mode, &mut sink);
        assert_eq!(mode, ScalingMode::AspectRatio);
        assert_eq!(sink.scaling.borrow().len(), 1);
    }

    #[test]
    fn scaling_key_autorepeat_is_suppressed() {
        let mut sink = RecordingSink::default();
        let mut mode = ScalingMode::Fullscreen;
        dispatch_event(key_event(200, 1), Some(200), &mut mode, &mut sink);
        dispatch_event(key_event(200, 2), Some(200), &mut mode, &mut sink);
        dispatch_event(key_event(200, 2), Some(200), &mut mode, &mut sink);
        assert_eq!(mode, ScalingMode::AspectRatio);
        assert_eq!(sink.scaling.borrow().len(), 1);
    }

    #[test]
    fn mouse_button_range_dispatches_as_button_not_key() {
        let mut sink = RecordingSink::default();
        let mut mode = ScalingMode::Fullscreen;
        dispatch_event(key_event(BTN_LEFT, 1), None, &mut mode, &mut sink);
        assert_eq!(sink.buttons.borrow().as_slice(), &[(MouseButton::Left, true)]);
        assert!(sink.keys.borrow().is_empty());
    }

    #[test]
    fn ordinary_keycode_dispatches_as_key() {
        let mut sink = RecordingSink::default();
        let mut mode = ScalingMode::Fullscreen;
        dispatch_event(key_event(30, 1), None, &mut mode, &mut sink);
        assert_eq!(sink.keys.borrow().as_slice(), &[(Keysym::A, true)]);
    }

    #[test]
    fn unmapped_keycode_translates_to_unknown() {
        let mut sink = RecordingSink::default();
        let mut mode = ScalingMode::Fullscreen;
        dispatch_event(key_event(0xfff, 1), None, &mut mode, &mut sink);
        assert_eq!(sink.keys.borrow().as_slice(), &[(Keysym::Unknown, true)]);
    }

    #[test]
    fn key_autorepeat_does_not_duplicate_edges() {
        let mut sink = RecordingSink::default();
        let mut mode = ScalingMode::Fullscreen;
        dispatch_event(key_event(30, 1), None, &mut mode, &mut sink);
        dispatch_event(key_event(30, 2), None, &mut mode, &mut sink);
        assert_eq!(sink.keys.borrow().len(), 1);
    }

    #[test]
    fn rel_axes_dispatch_motion() {
        let mut sink = RecordingSink::default();
        let mut mode = ScalingMode::Fullscreen;
        dispatch_event(rel_event(REL_X, 5), None, &mut mode, &mut sink);
        dispatch_event(rel_event(REL_Y, -3), None, &mut mode, &mut sink);
        assert_eq!(sink.motion.borrow().as_slice(), &[(5, 0), (0, -3)]);
    }

    #[test]
    fn wheel_emits_press_then_release() {
        let mut sink = RecordingSink::default();
        let mut mode = ScalingMode::Fullscreen;
        dispatch_event(rel_event(REL_WHEEL, -1), None, &mut mode, &mut sink);
        assert_eq!(
            sink.buttons.borrow().as_slice(),
            &[(MouseButton::WheelDown, true), (MouseButton::WheelDown, false)]
        );
    }

    #[test]
    fn syn_and_msc_are_ignored_without_panicking() {
        let mut sink = RecordingSink::default();
        let mut mode = ScalingMode::Fullscreen;
        dispatch_event(
            InputEvent { time: libc::timeval { tv_sec: 0, tv_usec: 0 }, kind: 0x00, code: 0, value: 0 },
            None,
            &mut mode,
            &mut sink,
        );
        dispatch_event(
            InputEvent { time: libc::timeval { tv_sec: 0, tv_usec: 0 }, kind: 0x04, code: 4, value: 1 },
            None,
            &mut mode,
            &mut sink,
        );
        assert!(sink.keys.borrow().is_empty());
        assert!(sink.buttons.borrow().is_empty());
    }
}
