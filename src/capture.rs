//! Frame sources. Any error from `read` ends the capture loop.

use std::path::Path;

use image::{Rgb, RgbImage};

use crate::error::{Error, Result};

pub trait FrameSource {
    fn read(&mut self) -> Result<RgbImage>;
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn read(&mut self) -> Result<RgbImage> {
        (**self).read()
    }
}

/// Replays one decoded image forever. Useful without a camera attached.
pub struct StillImage {
    frame: RgbImage,
}

impl StillImage {
    pub fn open(path: &Path) -> Result<Self> {
        let frame = image::open(path)?.to_rgb8();
        log::info!(
            "Replaying {path:?} ({}x{})",
            frame.width(),
            frame.height()
        );
        Ok(Self { frame })
    }

    pub fn new(frame: RgbImage) -> Self {
        Self { frame }
    }
}

impl FrameSource for StillImage {
    fn read(&mut self) -> Result<RgbImage> {
        Ok(self.frame.clone())
    }
}

#[cfg(feature = "webcam")]
pub use webcam::Webcam;

#[cfg(feature = "webcam")]
mod webcam {
    use image::RgbImage;
    use v4l::{
        buffer::Type, io::mmap::Stream, io::traits::CaptureStream, video::Capture, Device, FourCC,
    };

    use super::{yuyv_to_rgb, FrameSource};
    use crate::error::{Error, Result};

    const BUFFER_COUNT: u32 = 4;

    /// A V4L2 capture device streaming through mmap buffers.
    pub struct Webcam {
        index: usize,
        width: u32,
        height: u32,
        fourcc: FourCC,
        stream: Stream<'static>,
        _device: Device,
    }

    impl Webcam {
        /// Opens `/dev/video<index>` asking for MJPG at `width x height`. The
        /// driver may pick a different size or YUYV, both are handled.
        pub fn open(index: usize, width: u32, height: u32) -> Result<Self> {
            let device = Device::new(index)
                .map_err(|err| Error::Capture(format!("cannot open /dev/video{index}: {err}")))?;

            let mut format = device
                .format()
                .map_err(|err| Error::Capture(format!("cannot query format: {err}")))?;
            format.width = width;
            format.height = height;
            format.fourcc = FourCC::new(b"MJPG");
            let format = device
                .set_format(&format)
                .map_err(|err| Error::Capture(format!("cannot set format: {err}")))?;

            if format.fourcc != FourCC::new(b"MJPG") && format.fourcc != FourCC::new(b"YUYV") {
                return Err(Error::Capture(format!(
                    "unsupported pixel format {}",
                    format.fourcc
                )));
            }

            let stream = Stream::with_buffers(&device, Type::VideoCapture, BUFFER_COUNT)
                .map_err(|err| Error::Capture(format!("cannot start stream: {err}")))?;

            log::info!(
                "Opened /dev/video{index} at {}x{} ({})",
                format.width,
                format.height,
                format.fourcc
            );
            Ok(Self {
                index,
                width: format.width,
                height: format.height,
                fourcc: format.fourcc,
                stream,
                _device: device,
            })
        }
    }

    impl FrameSource for Webcam {
        fn read(&mut self) -> Result<RgbImage> {
            let (buffer, meta) = self
                .stream
                .next()
                .map_err(|err| Error::Capture(format!("read failed: {err}")))?;
            let used = (meta.bytesused as usize).min(buffer.len());
            let data = if used == 0 { buffer } else { &buffer[..used] };

            if self.fourcc == FourCC::new(b"MJPG") {
                let frame =
                    image::load_from_memory_with_format(data, image::ImageFormat::Jpeg)?;
                Ok(frame.to_rgb8())
            } else {
                yuyv_to_rgb(data, self.width, self.height)
            }
        }
    }

    impl Drop for Webcam {
        fn drop(&mut self) {
            log::info!("Released /dev/video{}", self.index);
        }
    }
}

/// Converts packed YUYV 4:2:2 (BT.601) to RGB.
pub fn yuyv_to_rgb(data: &[u8], width: u32, height: u32) -> Result<RgbImage> {
    let expected = width as usize * height as usize * 2;
    if data.len() < expected || width % 2 != 0 {
        return Err(Error::Capture(format!(
            "short YUYV frame: {} bytes for {width}x{height}",
            data.len()
        )));
    }

    let mut frame = RgbImage::new(width, height);
    for (index, chunk) in data[..expected].chunks_exact(4).enumerate() {
        let [y0, u, y1, v] = [chunk[0], chunk[1], chunk[2], chunk[3]];
        let pixel = index as u32 * 2;
        let (x, y) = (pixel % width, pixel / width);
        frame.put_pixel(x, y, yuv_pixel(y0, u, v));
        frame.put_pixel(x + 1, y, yuv_pixel(y1, u, v));
    }
    Ok(frame)
}

fn yuv_pixel(y: u8, u: u8, v: u8) -> Rgb<u8> {
    let c = y as f32 - 16.0;
    let d = u as f32 - 128.0;
    let e = v as f32 - 128.0;
    let clamp = |value: f32| value.round().clamp(0.0, 255.0) as u8;
    Rgb([
        clamp(1.164 * c + 1.596 * e),
        clamp(1.164 * c - 0.392 * d - 0.813 * e),
        clamp(1.164 * c + 2.017 * d),
    ])
}
