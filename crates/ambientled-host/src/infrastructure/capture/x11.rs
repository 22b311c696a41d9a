//! Linux screen capture via the X11 Xlib API.
//!
//! Each capture session owns its own display connection and grabs its
//! rectangle of the root window with `XGetImage`, then reduces the image to
//! one color per LED with [`ambientled_core::average_into`].
//!
//! # Implementation notes
//!
//! - Sessions are grabbed from the capture loop thread, not the thread that
//!   opened them, so Xlib thread support is switched on (`XInitThreads`)
//!   before the first connection is opened.
//! - Display identifiers containing `:` (`":0"`, `"host:1.0"`) are passed to
//!   `XOpenDisplay`; anything else uses `$DISPLAY`.
//! - Rectangles are in root window coordinates.  They are checked against
//!   the screen size when the session opens, since an out-of-bounds
//!   `XGetImage` raises `BadMatch` and the default Xlib error handler exits
//!   the process.

use std::ffi::CString;
use std::os::raw::c_int;
use std::ptr;
use std::sync::Once;

use ambientled_core::{average_into, CaptureRect, ImageView, Orientation, PixelFormat};
use tracing::debug;
use x11::xlib;

use crate::application::capture_loop::{CaptureError, CaptureHandle, CaptureRequest, CaptureService};

/// 24-bit pixels stored B, G, R.
const BGR24: PixelFormat = PixelFormat {
    bytes_per_pixel: 3,
    red: 2,
    green: 1,
    blue: 0,
};

/// 32-bit pixels stored X, R, G, B (big-endian servers).
const XRGB32: PixelFormat = PixelFormat {
    bytes_per_pixel: 4,
    red: 1,
    green: 2,
    blue: 3,
};

/// X11 implementation of [`CaptureService`].
pub struct X11CaptureService {
    sample_step: usize,
    threads_init: Once,
}

impl X11CaptureService {
    /// Creates the service.  No X connection is made until the first session.
    pub fn new(sample_step: usize) -> Self {
        Self {
            sample_step,
            threads_init: Once::new(),
        }
    }
}

impl CaptureService for X11CaptureService {
    fn create_capture(
        &self,
        request: &CaptureRequest,
    ) -> Result<Box<dyn CaptureHandle>, CaptureError> {
        self.threads_init.call_once(|| {
            // SAFETY: called once, before this service opens any display.
            let status = unsafe { xlib::XInitThreads() };
            debug!("XInitThreads returned {status}");
        });
        let session = X11Capture::open(request, self.sample_step)?;
        Ok(Box::new(session))
    }
}

/// One open X11 capture session.
struct X11Capture {
    display: *mut xlib::Display,
    root: xlib::Window,
    rect: CaptureRect,
    orientation: Orientation,
    length: usize,
    step: usize,
    frame: Vec<u8>,
}

// SAFETY: the display connection is used by exactly one session, and
// sessions are only ever used from one thread at a time (`&mut self`).
// Xlib thread support is initialised before the connection is opened.
unsafe impl Send for X11Capture {}

impl X11Capture {
    fn open(request: &CaptureRequest, step: usize) -> Result<Self, CaptureError> {
        let session_failed = |reason: String| CaptureError::SessionFailed {
            display: request.display.clone(),
            reason,
        };

        let name = if request.display.contains(':') {
            Some(
                CString::new(request.display.as_str())
                    .map_err(|_| session_failed("display name contains NUL".to_string()))?,
            )
        } else {
            None
        };
        let name_ptr = name.as_ref().map_or(ptr::null(), |n| n.as_ptr());

        // SAFETY: `name_ptr` is null or a NUL-terminated string that outlives
        // the call.  The returned pointer is freed by XCloseDisplay in Drop.
        let display = unsafe { xlib::XOpenDisplay(name_ptr) };
        if display.is_null() {
            let display_env = std::env::var("DISPLAY").unwrap_or_else(|_| "<unset>".to_string());
            return Err(session_failed(format!(
                "XOpenDisplay failed; DISPLAY={display_env}"
            )));
        }

        // SAFETY: `display` is a valid connection from here on.
        let (root, width, height) = unsafe {
            let screen = xlib::XDefaultScreen(display);
            (
                xlib::XDefaultRootWindow(display),
                xlib::XDisplayWidth(display, screen),
                xlib::XDisplayHeight(display, screen),
            )
        };

        let session = Self {
            display,
            root,
            rect: request.rect,
            orientation: request.orientation,
            length: request.length,
            step,
            frame: Vec::with_capacity(request.frame_len()),
        };

        let rect = request.rect;
        let right = u64::from(rect.x) + u64::from(rect.width);
        let bottom = u64::from(rect.y) + u64::from(rect.height);
        if right > width.max(0) as u64 || bottom > height.max(0) as u64 {
            // `session` drops here and closes the connection.
            return Err(session_failed(format!(
                "rectangle {}x{}+{}+{} exceeds the {width}x{height} screen",
                rect.width, rect.height, rect.x, rect.y
            )));
        }

        debug!(
            "X11 capture session open on {:?}: {}x{}+{}+{}",
            request.display, rect.width, rect.height, rect.x, rect.y
        );
        Ok(session)
    }

    /// Reduces a grabbed image into `self.frame`.
    fn reduce(&mut self, image: &xlib::XImage) -> Result<(), CaptureError> {
        let format = match (image.bits_per_pixel, image.red_mask, image.byte_order) {
            (32, 0x00ff_0000, xlib::LSBFirst) => PixelFormat::BGRX32,
            (32, 0x0000_00ff, xlib::LSBFirst) => PixelFormat::RGBX32,
            (32, 0x00ff_0000, xlib::MSBFirst) => XRGB32,
            (24, 0x00ff_0000, xlib::LSBFirst) => BGR24,
            (24, 0x0000_00ff, xlib::LSBFirst) => PixelFormat::RGB24,
            (bpp, red_mask, order) => {
                return Err(CaptureError::Grab(format!(
                    "unsupported pixel layout: {bpp} bpp, red mask {red_mask:#x}, byte order {order}"
                )))
            }
        };

        let stride = usize::try_from(image.bytes_per_line).unwrap_or(0);
        let width = usize::try_from(image.width).unwrap_or(0);
        let height = usize::try_from(image.height).unwrap_or(0);
        // SAFETY: Xlib allocated `bytes_per_line × height` bytes at `data`
        // and keeps them alive until XDestroyImage.
        let data = unsafe { std::slice::from_raw_parts(image.data as *const u8, stride * height) };

        let view = ImageView::new(data, width, height, stride, format)
            .map_err(|e| CaptureError::Grab(e.to_string()))?;
        average_into(&view, self.orientation, self.length, self.step, &mut self.frame);
        Ok(())
    }
}

impl CaptureHandle for X11Capture {
    fn grab(&mut self) -> Result<&[u8], CaptureError> {
        // SAFETY: the connection is open and the rectangle was checked
        // against the screen size when the session was created.
        let image = unsafe {
            xlib::XGetImage(
                self.display,
                self.root,
                self.rect.x as c_int,
                self.rect.y as c_int,
                self.rect.width,
                self.rect.height,
                xlib::XAllPlanes(),
                xlib::ZPixmap,
            )
        };
        if image.is_null() {
            return Err(CaptureError::Grab("XGetImage returned no image".to_string()));
        }

        // SAFETY: `image` is non-null and stays valid until XDestroyImage.
        let result = self.reduce(unsafe { &*image });
        // SAFETY: `image` came from XGetImage and is not used afterwards.
        unsafe { xlib::XDestroyImage(image) };

        result.map(|()| self.frame.as_slice())
    }
}

impl Drop for X11Capture {
    fn drop(&mut self) {
        // SAFETY: `display` was opened in `open` and is not used after this.
        unsafe { xlib::XCloseDisplay(self.display) };
        debug!("X11 capture session closed");
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
