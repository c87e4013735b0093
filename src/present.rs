//! The present engine: buffer rotation, the triple-buffer
//! flip worker, and `FlipHWSurface`/`UpdateRects`.

use std::os::unix::io::RawFd;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};

use kmsdrm_sys as sys;

use crate::atomic::{AtomicRequest, PropertyBlob};
use crate::buffer::BufferSlot;
use crate::error::Error;
use crate::modeset::{self, PipeBinding, ScalingMode};

/// How many buffers `set_video_mode` reserved, derived from the host's
/// `SDL_DOUBLEBUF`/`SDL_TRIPLEBUF` surface flags.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Buffering {
    Single,
    Double,
    Triple,
}

impl Buffering {
    pub fn from_flags(flags: u32) -> Self {
        if flags & video_flags::TRIPLEBUF != 0 {
            Buffering::Triple
        } else if flags & video_flags::DOUBLEBUF != 0 {
            Buffering::Double
        } else {
            Buffering::Single
        }
    }

    pub fn n_buf(self) -> usize {
        match self {
            Buffering::Single => 1,
            Buffering::Double => 2,
            Buffering::Triple => 3,
        }
    }
}

/// Surface-flag bits understood by `set_video_mode`, mirroring SDL 1.2's
/// `SDL_DOUBLEBUF`/`SDL_TRIPLEBUF`.
pub mod video_flags {
    pub const DOUBLEBUF: u32 = 0x4000_0000;
    pub const TRIPLEBUF: u32 = 0x0800_0000;
}

/// The three reserved slot indices, always a permutation of `0..n_buf`.
/// `app_flip` is the app-thread half of a flip (swap front/back);
/// `worker_rotate` is the triple-buffer worker's half (swap
/// queued/front). One call of each, in that order, advances a full
/// flip cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SlotIndices {
    pub front: usize,
    pub back: usize,
    pub queued: usize,
    pub n_buf: usize,
}

impl SlotIndices {
    pub fn new(n_buf: usize) -> Self {
        match n_buf {
            1 => SlotIndices {
                front: 0,
                back: 0,
                queued: 0,
                n_buf,
            },
            2 => SlotIndices {
                front: 0,
                back: 1,
                queued: 1,
                n_buf,
            },
            _ => SlotIndices {
                front: 0,
                back: 1,
                queued: 2,
                n_buf,
            },
        }
    }

    pub fn app_flip(&mut self) {
        std::mem::swap(&mut self.front, &mut self.back);
    }

    pub fn worker_rotate(&mut self) {
        std::mem::swap(&mut self.queued, &mut self.front);
    }

    pub fn is_permutation(&self) -> bool {
        match self.n_buf {
            1 => self.front == 0 && self.back == 0 && self.queued == 0,
            2 => {
                let mut v = [self.front, self.back];
                v.sort_unstable();
                v == [0, 1]
            }
            _ => {
                let mut v = [self.front, self.back, self.queued];
                v.sort_unstable();
                v == [0, 1, 2]
            }
        }
    }
}

struct Shared {
    slots: Vec<BufferSlot>,
    indices: SlotIndices,
    template: AtomicRequest,
    stop: bool,
    pending: bool,
}

/// Owns the buffer array, the cached atomic-request template, and (for
/// triple buffering) the flip worker thread.
pub struct PresentEngine {
    fd: RawFd,
    buffering: Buffering,
    binding: PipeBinding,
    has_damage_clips: bool,
    scaling_mode: Arc<Mutex<ScalingMode>>,
    gamma_blob: Arc<Mutex<Option<PropertyBlob>>>,
    shared: Arc<Mutex<Shared>>,
    cond: Arc<Condvar>,
    worker: Option<JoinHandle<()>>,
}

impl PresentEngine {
    /// Builds the engine, starting the flip worker when triple-buffered.
    /// Blocks until the worker is confirmed blocked in its first wait,
    /// so `set_video_mode` only returns once the worker is ready.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        fd: RawFd,
        buffering: Buffering,
        binding: PipeBinding,
        slots: Vec<BufferSlot>,
        template: AtomicRequest,
        has_damage_clips: bool,
        scaling_mode: Arc<Mutex<ScalingMode>>,
        gamma_blob: Arc<Mutex<Option<PropertyBlob>>>,
    ) -> Self {
        let indices = SlotIndices::new(buffering.n_buf());
        let shared = Arc::new(Mutex::new(Shared {
            slots,
            indices,
            template,
            stop: false,
            pending: false,
        }));
        let cond = Arc::new(Condvar::new());

        let mut engine = PresentEngine {
            fd,
            buffering,
            binding,
            has_damage_clips,
            scaling_mode,
            gamma_blob,
            shared,
            cond,
            worker: None,
        };

        if buffering == Buffering::Triple {
            engine.start_worker();
        }

        engine
    }

    fn start_worker(&mut self) {
        let ready = Arc::new((Mutex::new(false), Condvar::new()));
        let ready_worker = ready.clone();
        let shared = self.shared.clone();
        let cond = self.cond.clone();
        let fd = self.fd;
        let binding = self.binding.clone();
        let scaling_mode = self.scaling_mode.clone();
        let gamma_blob = self.gamma_blob.clone();

        let handle: JoinHandle<()> = thread::spawn(move || {
            worker_main(shared, cond, ready_worker, fd, binding, scaling_mode, gamma_blob)
        });

        let (lock, cv) = &*ready;
        let mut started = lock.lock().unwrap();
        while !*started {
            started = cv.wait(started).unwrap();
        }
        drop(started);

        self.worker = Some(handle);
    }

    fn active_index(&self, guard: &Shared) -> usize {
        if self.buffering == Buffering::Single {
            guard.indices.front
        } else {
            guard.indices.back
        }
    }

    /// The pointer and pitch the app should draw into: the back buffer
    /// when double/triple buffered, the front buffer otherwise.
    pub fn draw_target(&self) -> (*mut u8, u32) {
        let mut guard = self.shared.lock().unwrap();
        let idx = self.active_index(&guard);
        let pitch = guard.slots[idx].pitch;
        let ptr = guard.slots[idx].mapping.as_mut_slice().as_mut_ptr();
        (ptr, pitch)
    }

    /// `FlipHWSurface`. Single-buffer is a no-op that still rotates the
    /// (degenerate) index; double-buffer commits synchronously before
    /// swapping; triple-buffer swaps immediately and wakes the worker
    /// without blocking.
    pub fn flip(&self) -> Result<(), Error> {
        match self.buffering {
            Buffering::Single => {
                let mut guard = self.shared.lock().unwrap();
                guard.indices.app_flip();
                Ok(())
            }
            Buffering::Double => {
                let mut guard = self.shared.lock().unwrap();
                let fb_id = guard.slots[guard.indices.back].fb_id;
                let scaling = *self.scaling_mode.lock().unwrap();
                let gamma = self.gamma_blob.lock().unwrap().as_ref().map(|b| b.id);
                let mut req =
                    modeset::build_flip_request(&guard.template, &self.binding, scaling, gamma, fb_id)?;
                req.commit(self.fd, sys::DRM_MODE_ATOMIC_ALLOW_MODESET)?;
                guard.indices.app_flip();
                Ok(())
            }
            Buffering::Triple => {
                let mut guard = self.shared.lock().unwrap();
                guard.indices.app_flip();
                guard.pending = true;
                drop(guard);
                self.cond.notify_one();
                Ok(())
            }
        }
    }

    /// `SetColors`: publishes a new gamma-LUT blob and, by replacing the
    /// cached `Option<PropertyBlob>`, destroys the previous one via its
    /// `Drop` impl. Non-8bpp surfaces still update the caller's LUT
    /// table but never reach here, since only `bpp=8` surfaces have
    /// `crtc_gamma_lut` set.
    pub fn set_colors(&self, lut: &[u8], is_8bpp: bool) -> Result<(), Error> {
        if !is_8bpp || self.binding.props.crtc_gamma_lut.is_none() {
            return Ok(());
        }
        let blob = PropertyBlob::create(self.fd, lut)?;
        *self.gamma_blob.lock().unwrap() = Some(blob);
        Ok(())
    }

    /// `UpdateRects`: attaches `FB_DAMAGE_CLIPS` to the front buffer and
    /// commits non-blocking, tolerating `EBUSY`.
    pub fn update_rects(&self, rects: &[(u16, u16, u16, u16)]) -> Result<(), Error> {
        if !self.has_damage_clips || rects.is_empty() {
            return Ok(());
        }
        let prop = match self.binding.props.plane_damage_clips {
            Some(p) => p,
            None => return Ok(()),
        };

        let mut bytes = Vec::with_capacity(rects.len() * 16);
        for &(x1, y1, x2, y2) in rects {
            bytes.extend_from_slice(&(x1 as i32).to_ne_bytes());
            bytes.extend_from_slice(&(y1 as i32).to_ne_bytes());
            bytes.extend_from_slice(&(x2 as i32).to_ne_bytes());
            bytes.extend_from_slice(&(y2 as i32).to_ne_bytes());
        }
        let blob = PropertyBlob::create(self.fd, &bytes)?;

        let mut guard = self.shared.lock().unwrap();
        let fb_id = guard.slots[guard.indices.front].fb_id;
        let mut req = guard.template.duplicate()?;
        req.add(self.binding.plane_id, self.binding.props.plane_fb_id, fb_id as u64)?;
        req.add(self.binding.plane_id, prop, blob.id as u64)?;

        let flags = sys::DRM_MODE_ATOMIC_ALLOW_MODESET | sys::DRM_MODE_ATOMIC_NONBLOCK;
        match req.commit(self.fd, flags) {
            Ok(()) => Ok(()),
            Err(Error::Kernel { source, .. }) if source.raw_os_error() == Some(libc::EBUSY) => {
                Ok(())
            }
            Err(err) => Err(err),
        }
    }
}

impl Drop for PresentEngine {
    fn drop(&mut self) {
        if let Some(handle) = self.worker.take() {
            {
                let mut guard = self.shared.lock().unwrap();
                guard.stop = true;
            }
            self.cond.notify_one();
            if handle.join().is_err() {
                log::warn!("present engine: flip worker panicked");
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn worker_main(
    shared: Arc<Mutex<Shared>>,
    cond: Arc<Condvar>,
    ready: Arc<(Mutex<bool>, Condvar)>,
    fd: RawFd,
    binding: PipeBinding,
    scaling_mode: Arc<Mutex<ScalingMode>>,
    gamma_blob: Arc<Mutex<Option<PropertyBlob>>>,
) {
    loop {
        let mut guard = shared.lock().unwrap();
        {
            let (lock, cv) = &*ready;
            let mut started = lock.lock().unwrap();
            if !*started {
                *started = true;
                cv.notify_one();
            }
        }
        while !guard.stop && !guard.pending {
            guard = cond.wait(guard).unwrap();
        }
        if guard.stop {
            return;
        }
        guard.pending = false;
        guard.indices.worker_rotate();
        let fb_id = guard.slots[guard.indices.queued].fb_id;
        let scaling = *scaling_mode.lock().unwrap();
        let gamma = gamma_blob.lock().unwrap().as_ref().map(|b| b.id);

        let built = modeset::build_flip_request(&guard.template, &binding, scaling, gamma, fb_id);
        drop(guard);

        match built {
            Ok(mut req) => {
                if let Err(err) = req.commit(fd, sys::DRM_MODE_ATOMIC_ALLOW_MODESET) {
                    log::warn!("flip worker: commit failed: {}", err);
                }
            }
            Err(err) => log::warn!("flip worker: failed to build flip request: {}", err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_buffer_indices_never_move() {
        let mut idx = SlotIndices::new(1);
        for _ in 0..3 {
            idx.app_flip();
            assert!(idx.is_permutation());
            assert_eq!((idx.front, idx.back, idx.queued), (0, 0, 0));
        }
    }

    #[test]
    fn double_buffer_swaps_front_and_back() {
        let mut idx = SlotIndices::new(2);
        assert_eq!((idx.front, idx.back), (0, 1));
        idx.app_flip();
        assert_eq!((idx.front, idx.back), (1, 0));
        assert!(idx.is_permutation());
        idx.app_flip();
        assert_eq!((idx.front, idx.back), (0, 1));
    }

    #[test]
    fn triple_buffer_front_visits_every_slot_in_three_flips() {
        // a flip requested before the worker has drained its queue blocks.
        let mut idx = SlotIndices::new(3);
        let mut seen = Vec::new();
        for _ in 0..3 {
            idx.app_flip();
            assert!(idx.is_permutation());
            idx.worker_rotate();
            assert!(idx.is_permutation());
            seen.push(idx.front);
        }
        seen.sort_unstable();
        assert_eq!(seen, vec![0, 1, 2]);
    }

    #[test]
    fn buffering_from_flags_prefers_triple_over_double() {
        let both = video_flags::DOUBLEBUF | video_flags::TRIPLEBUF;
        assert_eq!(Buffering::from_flags(both), Buffering::Triple);
        assert_eq!(Buffering::from_flags(video_flags::DOUBLEBUF), Buffering::Double);
        assert_eq!(Buffering::from_flags(0), Buffering::Single);
    }

    #[test]
    fn buffering_n_buf_matches_reserved_slot_count() {
        assert_eq!(Buffering::Single.n_buf(), 1);
        assert_eq!(Buffering::Double.n_buf(), 2);
        assert_eq!(Buffering::Triple.n_buf(), 3);
    }
}
