//! Screen capture backends.
//!
//! Every backend implements [`CaptureService`] from the application layer:
//!
//! - **`x11`** (Linux) – grabs the rectangle with Xlib `XGetImage` and reduces
//!   it to one color per LED with the core area-averaging sampler.
//! - **`pattern`** – a rotating hue sweep; drives the controllers without a
//!   display, useful for checking wiring and calibration.
//! - **`mock`** – scripted frames and failures for tests.

use crate::application::capture_loop::{CaptureError, CaptureHandle, CaptureRequest, CaptureService};

pub mod mock;
pub mod pattern;

#[cfg(target_os = "linux")]
pub mod x11;

/// Returns the native capture backend for this platform.
///
/// `sample_step` is the pixel stride used when averaging a rectangle.
pub fn native_service(sample_step: usize) -> Box<dyn CaptureService> {
    #[cfg(target_os = "linux")]
    return Box::new(x11::X11CaptureService::new(sample_step));

    #[cfg(not(target_os = "linux"))]
    {
        let _ = sample_step;
        Box::new(UnavailableCaptureService)
    }
}

/// Capture service for platforms without a native backend.
///
/// Every session request fails with [`CaptureError::Unavailable`], so the
/// host refuses to start instead of driving the LEDs with garbage.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableCaptureService;

impl CaptureService for UnavailableCaptureService {
    fn create_capture(
        &self,
        request: &CaptureRequest,
    ) -> Result<Box<dyn CaptureHandle>, CaptureError> {
        Err(CaptureError::Unavailable(format!(
            "no native capture backend on {} (display {:?}); use --capture pattern",
            std::env::consts::OS,
            request.display
        )))
    }
}
