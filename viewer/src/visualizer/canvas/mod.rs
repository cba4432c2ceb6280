//! Drawing surfaces, waveform rendering and redraw scheduling.

pub mod rendering;
pub mod scheduler;
pub mod sizing;
pub mod surface;

pub use rendering::{RenderOutcome, Theme, TraceRequest, WaveformRenderer};
pub use scheduler::RedrawScheduler;
pub use sizing::{SizeStatus, SurfaceSizer};
pub use surface::{
    DisplayList, DrawCommand, PointerEvent, RecordingFactory, RecordingSurface, Surface,
    SurfaceFactory, SurfaceId,
};
