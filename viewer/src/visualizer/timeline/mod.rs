//! Timeline domain: time ranges, the shared viewport and cursor, and
//! transition navigation.

pub mod cursor;
pub mod navigation;
pub mod time_domain;
pub mod viewport;

pub use cursor::Cursor;
pub use navigation::{EdgeKind, collect_transitions, find_next, find_previous};
pub use time_domain::{RulerTick, TimeRange, ruler_ticks};
pub use viewport::{MIN_ZOOM, Viewport, ViewportState};
