//! pinchvol-hw — Hardware abstraction for camera capture and system volume.
//!
//! Provides V4L2-based camera access producing RGB frames, and a volume
//! sink that drives the desktop mixer.

pub mod camera;
pub mod frame;
pub mod volume;

pub use camera::{Camera, CameraError, FrameSource};
pub use frame::Frame;
pub use volume::{open_default_sink, CommandSink, VolumeBackend, VolumeError, VolumeSink};
