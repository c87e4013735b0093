use std::io;

use thiserror::Error;

/// All error types surfaced by the backend.
#[derive(Debug, Error)]
pub enum Error {
    /// No DRM device exposes `DRM_CAP_DUMB_BUFFER`, or no pipe in the
    /// registry satisfies the filter in [`crate::pipe`].
    #[error("no usable KMS/DRM device or display pipe was found")]
    Unsupported,
    /// The requested `(depth, flags)` pair has no entry in the color catalog.
    #[error("unsupported pixel format for depth {depth} with the given flags")]
    BadPixelFormat {
        /// The requested color depth in bits.
        depth: u32,
    },
    /// An ioctl or libdrm call failed.
    #[error("kernel/libdrm call `{call}` failed: {source}")]
    Kernel {
        /// Name of the ioctl or libdrm function that failed.
        call: &'static str,
        /// The underlying OS error.
        #[source]
        source: io::Error,
    },
    /// A kernel allocation (dumb buffer, property blob) failed.
    #[error("out of memory allocating `{what}`")]
    OutOfMemory {
        /// What failed to allocate.
        what: &'static str,
    },
    /// `FlipHWSurface` was called with no active pipe.
    #[error("flip requested with no active display pipe")]
    Unarmed,
    /// Failure to convert a Rust string into a C string.
    #[error("failed to build a C string")]
    NulString(#[from] std::ffi::NulError),
    /// I/O failure opening a device node.
    #[error("I/O error")]
    Io(#[from] io::Error),
}

/// A specialized [`Result`](std::result::Result) type for this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Builds an [`Error::Kernel`] from the current `errno`.
pub(crate) fn kernel_error(call: &'static str) -> Error {
    Error::Kernel {
        call,
        source: io::Error::last_os_error(),
    }
}
