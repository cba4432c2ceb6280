//! Single source of truth for the visible time window and zoom factor.
//!
//! Every mutator keeps `total.start <= visible.start <= visible.end <= total.end`
//! and `min_zoom <= zoom_level <= max_zoom`, then publishes what changed.
//! Out-of-range requests are clamped, never rejected.

use super::time_domain::TimeRange;
use crate::dataflow::{EventBus, ViewerEvent};

pub const MIN_ZOOM: f64 = 1.0;

/// Read-only snapshot of the viewport.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewportState {
    pub total_start: f64,
    pub total_end: f64,
    pub visible_start: f64,
    pub visible_end: f64,
    pub zoom_level: f64,
    pub min_zoom: f64,
    pub max_zoom: f64,
}

#[derive(Debug)]
pub struct Viewport {
    total: TimeRange,
    visible: TimeRange,
    zoom_level: f64,
    max_zoom: f64,
    last_pan: Option<PanStep>,
    bus: EventBus,
}

/// The last unclamped pan, so that the opposite pan lands on the exact prior window.
#[derive(Debug, Clone, Copy)]
struct PanStep {
    delta: f64,
    before: TimeRange,
}

impl Viewport {
    pub fn new(bus: EventBus, max_zoom: f64) -> Self {
        Self {
            total: TimeRange::default(),
            visible: TimeRange::default(),
            zoom_level: MIN_ZOOM,
            max_zoom: sanitize_max_zoom(max_zoom),
            last_pan: None,
            bus,
        }
    }

    pub fn total(&self) -> TimeRange {
        self.total
    }

    pub fn visible(&self) -> TimeRange {
        self.visible
    }

    pub fn zoom_level(&self) -> f64 {
        self.zoom_level
    }

    pub fn max_zoom(&self) -> f64 {
        self.max_zoom
    }

    pub fn state(&self) -> ViewportState {
        ViewportState {
            total_start: self.total.start,
            total_end: self.total.end,
            visible_start: self.visible.start,
            visible_end: self.visible.end,
            zoom_level: self.zoom_level,
            min_zoom: MIN_ZOOM,
            max_zoom: self.max_zoom,
        }
    }

    /// Resets the total and visible range to the full span and zoom to 1.
    pub fn set_total_range(&mut self, start: f64, end: f64) {
        if !start.is_finite() || !end.is_finite() {
            log::warn!("Ignoring non-finite total range {start}..{end}");
            return;
        }
        let total = TimeRange::new(start, end);
        let zoom_changed = self.zoom_level != MIN_ZOOM;
        let range_changed = total != self.total || self.visible != total;

        self.total = total;
        self.visible = total;
        self.zoom_level = MIN_ZOOM;
        self.last_pan = None;

        if zoom_changed {
            self.bus.publish(ViewerEvent::ZoomChanged { level: MIN_ZOOM });
        }
        if zoom_changed || range_changed {
            self.publish_visible();
        }
    }

    pub fn set_max_zoom(&mut self, max_zoom: f64) {
        if max_zoom.is_nan() {
            return;
        }
        self.max_zoom = sanitize_max_zoom(max_zoom);
        if self.zoom_level > self.max_zoom {
            let center = self.visible.center();
            self.set_zoom(self.max_zoom, Some(center));
        }
    }

    /// Returns whether the zoom level or the visible window changed.
    pub fn set_zoom(&mut self, level: f64, center: Option<f64>) -> bool {
        if level.is_nan() || center.is_some_and(f64::is_nan) {
            return false;
        }
        let level = level.clamp(MIN_ZOOM, self.max_zoom);
        let visible = self.window_for(level, center.unwrap_or(self.visible.center()));

        let zoom_changed = level != self.zoom_level;
        let range_changed = visible != self.visible;
        if !zoom_changed && !range_changed {
            return false;
        }

        self.zoom_level = level;
        self.visible = visible;
        self.last_pan = None;
        log::debug!("Zoom {level} → visible {visible}");
        if zoom_changed {
            self.bus.publish(ViewerEvent::ZoomChanged { level });
        }
        self.publish_visible();
        true
    }

    pub fn zoom_in(&mut self, step: f64, center: Option<f64>) -> bool {
        self.set_zoom(self.zoom_level * step.abs().max(1.0), center)
    }

    pub fn zoom_out(&mut self, step: f64, center: Option<f64>) -> bool {
        self.set_zoom(self.zoom_level / step.abs().max(1.0), center)
    }

    pub fn reset_zoom(&mut self) -> bool {
        self.set_zoom(MIN_ZOOM, None)
    }

    /// Zooms so that `[a, b]` fills the visible window, as far as the zoom bounds allow.
    pub fn zoom_to_range(&mut self, a: f64, b: f64) -> bool {
        let selection = TimeRange::new(self.total.clamp(a), self.total.clamp(b));
        if selection.duration() <= 0.0 {
            return false;
        }
        let level = self.total.duration() / selection.duration();
        self.set_zoom(level, Some(selection.center()))
    }

    /// Shifts the visible window by `delta` without changing its width.
    ///
    /// Undoing an unclamped pan with the opposite delta restores the previous
    /// window bit for bit.
    pub fn pan(&mut self, delta: f64) -> bool {
        if !delta.is_finite() || delta == 0.0 {
            return false;
        }
        let before = self.visible;
        let (visible, clamped) = match self.last_pan {
            Some(step) if step.delta == -delta => (step.before, false),
            _ => {
                let start = before.start + delta;
                let visible = self.window_at(start, self.window_width());
                (visible, visible.start != start)
            }
        };
        if visible == before {
            return false;
        }

        self.last_pan = (!clamped).then_some(PanStep { delta, before });
        self.visible = visible;
        self.publish_visible();
        true
    }

    /// Maps `time` onto a surface `width` pixels wide.
    pub fn time_to_x(&self, time: f64, width: f64) -> f64 {
        let duration = self.visible.duration();
        if duration <= 0.0 {
            return 0.0;
        }
        (time - self.visible.start) / duration * width
    }

    pub fn x_to_time(&self, x: f64, width: f64) -> f64 {
        if width <= 0.0 {
            return self.visible.start;
        }
        self.visible.start + x / width * self.visible.duration()
    }

    fn window_for(&self, level: f64, center: f64) -> TimeRange {
        if level == MIN_ZOOM {
            return self.total;
        }
        let width = self.total.duration() / level;
        self.window_at(center - width / 2.0, width)
    }

    fn window_width(&self) -> f64 {
        if self.zoom_level == MIN_ZOOM {
            self.total.duration()
        } else {
            self.total.duration() / self.zoom_level
        }
    }

    /// Window of `width` starting at `start`, pushed back inside the total range.
    /// A window touching the end is pinned to `total.end` exactly.
    fn window_at(&self, start: f64, width: f64) -> TimeRange {
        let latest_start = (self.total.end - width).max(self.total.start);
        let start = start.clamp(self.total.start, latest_start);
        let end = if start == latest_start {
            self.total.end
        } else {
            (start + width).min(self.total.end)
        };
        TimeRange { start, end }
    }

    fn publish_visible(&self) {
        self.bus.publish(ViewerEvent::ViewportChanged {
            visible: self.visible,
        });
    }
}

fn sanitize_max_zoom(max_zoom: f64) -> f64 {
    if max_zoom.is_nan() {
        MIN_ZOOM
    } else {
        max_zoom.max(MIN_ZOOM)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataflow::EventKind;
    use std::cell::Cell;
    use std::rc::Rc;

    fn viewport() -> Viewport {
        let mut viewport = Viewport::new(EventBus::new(), 1_000.0);
        viewport.set_total_range(0.0, 200.0);
        viewport
    }

    fn assert_invariants(viewport: &Viewport) {
        let state = viewport.state();
        assert!(state.total_start <= state.visible_start);
        assert!(state.visible_start <= state.visible_end);
        assert!(state.visible_end <= state.total_end);
        assert!(state.min_zoom <= state.zoom_level && state.zoom_level <= state.max_zoom);
        let expected = (state.total_end - state.total_start) / state.zoom_level;
        assert!((state.visible_end - state.visible_start - expected).abs() < 1e-9);
    }

    #[test]
    fn zoom_two_centers_on_previous_midpoint() {
        let mut viewport = viewport();
        assert!(viewport.set_zoom(2.0, None));
        assert_eq!(viewport.visible(), TimeRange::new(50.0, 150.0));
        assert_invariants(&viewport);
    }

    #[test]
    fn zoom_window_is_clamped_inside_total() {
        let mut viewport = viewport();
        viewport.set_zoom(4.0, Some(190.0));
        assert_eq!(viewport.visible(), TimeRange::new(150.0, 200.0));
        viewport.set_zoom(4.0, Some(-30.0));
        assert_eq!(viewport.visible(), TimeRange::new(0.0, 50.0));
        assert_invariants(&viewport);
    }

    #[test]
    fn zoom_level_is_clamped() {
        let mut viewport = viewport();
        viewport.set_zoom(0.1, None);
        assert_eq!(viewport.zoom_level(), MIN_ZOOM);
        viewport.set_zoom(1e12, None);
        assert_eq!(viewport.zoom_level(), 1_000.0);
        assert_invariants(&viewport);
    }

    #[test]
    fn repeated_zoom_is_a_no_op() {
        let bus = EventBus::new();
        let zooms = Rc::new(Cell::new(0));
        let seen = zooms.clone();
        bus.subscribe(EventKind::ViewportChanged, move |_| {
            seen.set(seen.get() + 1);
            Ok(())
        });
        let mut viewport = Viewport::new(bus, 100.0);
        viewport.set_total_range(0.0, 200.0);
        zooms.set(0);

        assert!(viewport.set_zoom(2.0, None));
        assert!(!viewport.set_zoom(2.0, None));
        assert!(!viewport.set_zoom(f64::NAN, None));
        assert_eq!(zooms.get(), 1);
    }

    #[test]
    fn lowering_max_zoom_rederives_window() {
        let mut viewport = viewport();
        viewport.set_zoom(8.0, Some(100.0));
        viewport.set_max_zoom(2.0);
        assert_eq!(viewport.zoom_level(), 2.0);
        assert_eq!(viewport.visible(), TimeRange::new(50.0, 150.0));
    }

    #[test]
    fn pan_round_trip_restores_window() {
        let mut viewport = viewport();
        viewport.set_zoom(4.0, Some(100.0));
        let before = viewport.visible();

        assert!(viewport.pan(20.0));
        assert!(viewport.pan(-20.0));
        assert_eq!(viewport.visible(), before);
    }

    #[test]
    fn pan_round_trip_is_exact_for_inexact_deltas() {
        let bus = EventBus::new();
        let mut viewport = Viewport::new(bus, 1_000.0);
        viewport.set_total_range(0.0, 1.0);
        viewport.set_zoom(10.0, Some(0.15));
        let zoomed = viewport.visible();

        assert!(viewport.pan(0.1));
        assert!(viewport.pan(-0.1));
        assert_eq!(viewport.visible(), zoomed);

        viewport.pan(0.3);
        let shifted = viewport.visible();
        viewport.pan(0.1);
        viewport.pan(-0.1);
        assert_eq!(viewport.visible(), shifted);
        viewport.pan(-0.3);
        assert_eq!(viewport.visible(), zoomed);
    }

    #[test]
    fn clamped_pan_is_not_undone() {
        let mut viewport = viewport();
        viewport.set_zoom(4.0, Some(100.0));
        viewport.pan(100.0);
        assert_eq!(viewport.visible(), TimeRange::new(150.0, 200.0));
        viewport.pan(-100.0);
        assert_eq!(viewport.visible(), TimeRange::new(50.0, 100.0));
    }

    #[test]
    fn window_never_leaves_inexact_totals() {
        for i in 0..2_000 {
            let total_end = 0.1 * f64::from(i) + 0.07;
            let mut viewport = Viewport::new(EventBus::new(), 1_000.0);
            viewport.set_total_range(0.0, total_end);
            for zoom in [3.0, 7.0, 13.0, 999.0] {
                viewport.set_zoom(zoom, Some(total_end));
                assert_invariants(&viewport);
                viewport.pan(-total_end / 3.0);
                assert_invariants(&viewport);
                viewport.pan(1e9);
                assert_invariants(&viewport);
                assert_eq!(viewport.visible().end, total_end);
                viewport.pan(-1e9);
                assert_invariants(&viewport);
            }
        }
    }

    #[test]
    fn pan_is_clamped_and_keeps_width() {
        let mut viewport = viewport();
        viewport.set_zoom(4.0, Some(100.0));
        viewport.pan(1_000.0);
        assert_eq!(viewport.visible(), TimeRange::new(150.0, 200.0));
        assert!(!viewport.pan(10.0));
        viewport.pan(-1_000.0);
        assert_eq!(viewport.visible(), TimeRange::new(0.0, 50.0));
        assert_invariants(&viewport);
    }

    #[test]
    fn pixel_mapping_is_linear() {
        let mut viewport = viewport();
        viewport.set_zoom(2.0, None);
        assert_eq!(viewport.time_to_x(50.0, 800.0), 0.0);
        assert_eq!(viewport.time_to_x(100.0, 800.0), 400.0);
        assert_eq!(viewport.x_to_time(800.0, 800.0), 150.0);
        assert_eq!(viewport.x_to_time(10.0, 0.0), 50.0);
    }

    #[test]
    fn zoom_to_range_fits_selection() {
        let mut viewport = viewport();
        assert!(viewport.zoom_to_range(120.0, 80.0));
        assert_eq!(viewport.visible(), TimeRange::new(80.0, 120.0));
        assert!(!viewport.zoom_to_range(10.0, 10.0));
    }
}
