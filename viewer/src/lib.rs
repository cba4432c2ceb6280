//! Time-domain viewport and multi-surface render synchronization for waveform viewers.
//!
//! A [`Viewer`] owns one instance of every component: the event bus, the render
//! cache, the viewport, the shared cursor, the signal hierarchy and the virtual
//! row manager. Hosts feed it a parsed dataset, a surface factory and input
//! events; it paints into the surfaces it was given.

pub mod clock;
pub mod config;
pub mod controls;
pub mod dataflow;
pub mod dataset;
pub mod error;
pub mod viewer;
pub mod visualizer;

pub use clock::{Clock, ManualClock, MonotonicClock};
pub use config::ViewerConfig;
pub use controls::ControlAction;
pub use dataflow::{EventBus, EventKind, ViewerEvent};
pub use dataset::Dataset;
pub use error::{CacheError, ConfigError, DatasetError, StorageError, ViewerError};
pub use viewer::Viewer;
