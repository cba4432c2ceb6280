//! The one shared cursor position.
//!
//! No surface keeps its own notion of "current time": surfaces register here
//! and the viewer redraws every registered surface when the cursor moves.

use super::time_domain::TimeRange;
use super::viewport::Viewport;
use crate::dataflow::{EventBus, ViewerEvent};
use crate::visualizer::canvas::surface::SurfaceId;
use indexmap::IndexSet;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CursorState {
    pub current_time: f64,
    pub start_time: f64,
    pub end_time: f64,
}

#[derive(Debug)]
pub struct Cursor {
    current: f64,
    bounds: TimeRange,
    surfaces: IndexSet<SurfaceId>,
    bus: EventBus,
}

impl Cursor {
    pub fn new(bus: EventBus) -> Self {
        Self {
            current: 0.0,
            bounds: TimeRange::default(),
            surfaces: IndexSet::new(),
            bus,
        }
    }

    pub fn current_time(&self) -> f64 {
        self.current
    }

    pub fn bounds(&self) -> TimeRange {
        self.bounds
    }

    pub fn state(&self) -> CursorState {
        CursorState {
            current_time: self.current,
            start_time: self.bounds.start,
            end_time: self.bounds.end,
        }
    }

    /// Replaces the bounds and re-clamps the current time into them.
    pub fn set_bounds(&mut self, bounds: TimeRange) -> Option<f64> {
        self.bounds = bounds;
        self.move_to(self.current)
    }

    /// Clamps `time` into the bounds. Returns the new time only when it changed.
    pub fn move_to(&mut self, time: f64) -> Option<f64> {
        if time.is_nan() {
            return None;
        }
        let time = self.bounds.clamp(time);
        if time == self.current {
            return None;
        }
        self.current = time;
        log::debug!("Cursor moved to {time}");
        self.bus.publish(ViewerEvent::CursorChanged { time });
        Some(time)
    }

    pub fn move_to_start(&mut self) -> Option<f64> {
        self.move_to(self.bounds.start)
    }

    pub fn move_to_end(&mut self) -> Option<f64> {
        self.move_to(self.bounds.end)
    }

    /// Click handling: local pixel position on a surface `width` pixels wide.
    pub fn move_to_x(&mut self, viewport: &Viewport, x: f64, width: f64) -> Option<f64> {
        self.move_to(viewport.x_to_time(x, width))
    }

    /// Returns false when the surface was already registered.
    pub fn register_surface(&mut self, surface: SurfaceId) -> bool {
        self.surfaces.insert(surface)
    }

    pub fn unregister_surface(&mut self, surface: SurfaceId) -> bool {
        self.surfaces.shift_remove(&surface)
    }

    pub fn surfaces(&self) -> impl Iterator<Item = SurfaceId> + '_ {
        self.surfaces.iter().copied()
    }

    pub fn surface_count(&self) -> usize {
        self.surfaces.len()
    }
}
