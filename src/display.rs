use image::RgbImage;

use crate::error::Result;

/// Where annotated frames end up, and where the user asks to stop.
pub trait DisplaySink {
    fn show(&mut self, frame: &RgbImage) -> Result<()>;

    /// Polled once per loop iteration.
    fn stop_requested(&self) -> bool;

    /// A user visible error, e.g. the camera went away.
    fn report_error(&mut self, message: &str);

    fn notify(&mut self, message: &str);
}

impl<D: DisplaySink + ?Sized> DisplaySink for &mut D {
    fn show(&mut self, frame: &RgbImage) -> Result<()> {
        (**self).show(frame)
    }

    fn stop_requested(&self) -> bool {
        (**self).stop_requested()
    }

    fn report_error(&mut self, message: &str) {
        (**self).report_error(message)
    }

    fn notify(&mut self, message: &str) {
        (**self).notify(message)
    }
}
