//! Detection loop around the objloc core: reference profile, single-slot
//! frame buffer, per-cycle pipeline and fixed-rate scheduling.

pub mod config;
pub mod errors;
pub mod frame_buffer;
pub mod locator;
pub mod reference;
pub mod scheduler;

pub use config::LocatorConfig;
pub use errors::{CalibrationLoadError, ConfigError};
pub use frame_buffer::FrameBuffer;
pub use locator::{CycleReport, DetectionSink, NotLocatedReason, NullSink, ObjectLocator};
pub use reference::ReferenceProfile;
pub use scheduler::TickScheduler;
