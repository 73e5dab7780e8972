pub mod v4l2;

pub use v4l2::{decode_frame, Camera, PixelFormat};
