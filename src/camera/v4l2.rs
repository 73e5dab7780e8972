use image::{GrayImage, ImageBuffer, ImageFormat, Luma};
use v4l::buffer::Type;
use v4l::io::mmap::Stream;
use v4l::io::traits::CaptureStream;
use v4l::video::Capture;
use v4l::{Device, FourCC};

use crate::common::config::CameraConfig;
use crate::common::{FaceUnlockError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// 8-bit luma, what IR cameras deliver.
    Grey,
    Mjpeg,
    Yuyv,
}

impl PixelFormat {
    pub fn from_fourcc(fourcc: &FourCC) -> Option<Self> {
        match &fourcc.repr {
            b"GREY" | b"Y8  " => Some(PixelFormat::Grey),
            b"MJPG" => Some(PixelFormat::Mjpeg),
            b"YUYV" => Some(PixelFormat::Yuyv),
            _ => None,
        }
    }
}

/// An open, streaming capture device.
///
/// The device stays exclusively ours until this value is dropped.
pub struct Camera {
    // Field order matters: the stream must stop before the device closes.
    stream: Stream<'static>,
    _device: Device,
    index: u32,
    format: PixelFormat,
    width: u32,
    height: u32,
}

fn sensor_err(context: &str, e: impl std::fmt::Display) -> FaceUnlockError {
    FaceUnlockError::SensorUnavailable(format!("{}: {}", context, e))
}

impl Camera {
    pub fn open(config: &CameraConfig) -> Result<Self> {
        let index = config.device_index;
        let device = Device::new(index as usize)
            .map_err(|e| sensor_err(&format!("Failed to open camera {}", index), e))?;

        let mut fmt = device
            .format()
            .map_err(|e| sensor_err("Failed to get format", e))?;
        fmt.width = config.width;
        fmt.height = config.height;

        // Keep GREY for IR cameras, otherwise ask for MJPG.
        if PixelFormat::from_fourcc(&fmt.fourcc) != Some(PixelFormat::Grey) {
            fmt.fourcc = FourCC::new(b"MJPG");
        }
        if let Err(e) = device.set_format(&fmt) {
            tracing::debug!("Could not set exact format: {}. Using device defaults.", e);
        }

        let actual = device
            .format()
            .map_err(|e| sensor_err("Failed to get final format", e))?;
        let format = PixelFormat::from_fourcc(&actual.fourcc).ok_or_else(|| {
            FaceUnlockError::SensorUnavailable(format!(
                "Unsupported pixel format {:?} on /dev/video{}",
                actual.fourcc.str().unwrap_or("????"),
                index
            ))
        })?;
        if actual.width != config.width || actual.height != config.height {
            tracing::debug!(
                "Camera resolution {}x{} differs from requested {}x{}",
                actual.width,
                actual.height,
                config.width,
                config.height
            );
        }

        let stream = Stream::with_buffers(&device, Type::VideoCapture, config.buffer_count)
            .map_err(|e| sensor_err("Failed to create stream", e))?;

        tracing::debug!(
            "Opened /dev/video{} at {}x{} {:?}",
            index,
            actual.width,
            actual.height,
            format
        );

        Ok(Self {
            stream,
            _device: device,
            index,
            format,
            width: actual.width,
            height: actual.height,
        })
    }

    pub fn capture(&mut self) -> Result<GrayImage> {
        let (buf, _meta) = self
            .stream
            .next()
            .map_err(|e| sensor_err("Failed to capture", e))?;
        decode_frame(self.format, buf, self.width, self.height)
    }

    /// Dequeue a frame without decoding it.
    pub fn skip(&mut self) -> Result<()> {
        self.stream
            .next()
            .map(|_| ())
            .map_err(|e| sensor_err("Failed to capture", e))
    }
}

impl Drop for Camera {
    fn drop(&mut self) {
        tracing::debug!("Releasing /dev/video{}", self.index);
    }
}

/// Convert a raw capture buffer to a luma image.
pub fn decode_frame(format: PixelFormat, data: &[u8], width: u32, height: u32) -> Result<GrayImage> {
    let pixels = (width as usize) * (height as usize);
    match format {
        PixelFormat::Grey => {
            if data.len() < pixels {
                return Err(short_frame(data.len(), pixels));
            }
            ImageBuffer::<Luma<u8>, _>::from_raw(width, height, data[..pixels].to_vec())
                .ok_or_else(|| FaceUnlockError::SensorUnavailable("Failed to create grayscale image buffer".into()))
        }
        PixelFormat::Yuyv => {
            // Y0 U Y1 V: every even byte is luma.
            if data.len() < pixels * 2 {
                return Err(short_frame(data.len(), pixels * 2));
            }
            let luma: Vec<u8> = data.iter().step_by(2).take(pixels).copied().collect();
            ImageBuffer::<Luma<u8>, _>::from_raw(width, height, luma)
                .ok_or_else(|| FaceUnlockError::SensorUnavailable("Failed to create YUYV luma buffer".into()))
        }
        PixelFormat::Mjpeg => {
            let decoded = image::load_from_memory_with_format(data, ImageFormat::Jpeg)?;
            Ok(decoded.to_luma8())
        }
    }
}

fn short_frame(got: usize, want: usize) -> FaceUnlockError {
    FaceUnlockError::SensorUnavailable(format!("Short frame: {} bytes, expected {}", got, want))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, RgbImage};
    use std::io::Cursor;

    #[test]
    fn test_fourcc_mapping() {
        assert_eq!(PixelFormat::from_fourcc(&FourCC::new(b"GREY")), Some(PixelFormat::Grey));
        assert_eq!(PixelFormat::from_fourcc(&FourCC::new(b"YUYV")), Some(PixelFormat::Yuyv));
        assert_eq!(PixelFormat::from_fourcc(&FourCC::new(b"MJPG")), Some(PixelFormat::Mjpeg));
        assert_eq!(PixelFormat::from_fourcc(&FourCC::new(b"H264")), None);
    }

    #[test]
    fn test_grey_ignores_buffer_padding() {
        let mut data = vec![7u8; 4 * 2];
        data.extend_from_slice(&[0xff; 16]);
        let img = decode_frame(PixelFormat::Grey, &data, 4, 2).unwrap();
        assert_eq!(img.dimensions(), (4, 2));
        assert!(img.pixels().all(|p| p[0] == 7));
    }

    #[test]
    fn test_yuyv_keeps_luma() {
        // Two pixels: Y0=10 U=128 Y1=20 V=128
        let img = decode_frame(PixelFormat::Yuyv, &[10, 128, 20, 128], 2, 1).unwrap();
        assert_eq!(img.get_pixel(0, 0)[0], 10);
        assert_eq!(img.get_pixel(1, 0)[0], 20);
    }

    #[test]
    fn test_short_frame_is_a_sensor_error() {
        let err = decode_frame(PixelFormat::Grey, &[0; 3], 4, 4).unwrap_err();
        assert!(err.is_soft_sensor_failure());
    }

    #[test]
    fn test_mjpeg_decodes_to_luma() {
        let rgb = RgbImage::from_pixel(8, 8, image::Rgb([200, 200, 200]));
        let mut jpeg = Vec::new();
        DynamicImage::ImageRgb8(rgb)
            .write_to(&mut Cursor::new(&mut jpeg), ImageFormat::Jpeg)
            .unwrap();

        let img = decode_frame(PixelFormat::Mjpeg, &jpeg, 8, 8).unwrap();
        assert_eq!(img.dimensions(), (8, 8));
        assert!(img.get_pixel(4, 4)[0] > 150);
    }
}
