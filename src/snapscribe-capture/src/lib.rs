//! snapscribe-capture - Camera frames for Snapscribe
//!
//! Provides the owned, single-use `Frame` handle with its release primitive,
//! and a file-backed camera standing in for the device camera subsystem.

pub mod camera;
pub mod error;
pub mod frame;

pub use camera::{CaptureRequest, FileCamera, PermissionGate, StaticPermission};
pub use error::CaptureError;
pub use frame::{Frame, PixelFormat, Plane};
