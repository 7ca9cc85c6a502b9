//! snapscribe-processing - Frame encoding for Snapscribe
//!
//! Turns raw camera frames of any pixel format into upright JPEG buffers
//! ready to be uploaded to a recognition service.

pub mod codec;
pub mod encoder;

pub use codec::{ImageJpegCodec, JpegCodec};
pub use encoder::{EncodeError, EncodedImage, FrameEncoder};
