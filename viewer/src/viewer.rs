//! The per-instance context that owns and wires every viewer component.
//!
//! Nothing in the crate is global: a host creates one [`Viewer`] per waveform
//! panel, feeds it a dataset and input events, and calls
//! [`Viewer::on_animation_frame`] once per display frame.

use crate::clock::SharedClock;
use crate::config::ViewerConfig;
use crate::dataflow::{Debounce, EventBus, Throttle, ViewerEvent};
use crate::dataset::Dataset;
use crate::error::ViewerError;
use crate::visualizer::cache::{
    MEASURED_DIMENSIONS, PreferenceStorage, RADIX_PREFERENCES, RenderCache, SetOptions,
    WAVEFORM_IMAGES,
};
use crate::visualizer::canvas::rendering::WaveformRenderer;
use crate::visualizer::canvas::scheduler::RedrawScheduler;
use crate::visualizer::canvas::sizing::{SizeStatus, SurfaceSizer};
use crate::visualizer::canvas::surface::{PointerEvent, Surface, SurfaceFactory, SurfaceId};
use crate::visualizer::hierarchy::HierarchyTree;
use crate::visualizer::rows::{CellContent, RenderContext, RowChange, VirtualRowManager};
use crate::visualizer::timeline::{Cursor, EdgeKind, Viewport, find_next, find_previous};
use serde_json::Value;
use shared::{SurfaceDims, VarFormat, ViewerPreferences};

/// The time ruler always uses this id; row surfaces are numbered after it.
pub const RULER_SURFACE: SurfaceId = SurfaceId(0);

#[derive(Debug, Clone, Copy, PartialEq)]
struct WheelInput {
    surface: SurfaceId,
    x: f64,
    delta_y: f64,
    shift: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct DragState {
    surface: SurfaceId,
    start_x: f64,
    start_time: f64,
}

pub struct Viewer {
    config: ViewerConfig,
    bus: EventBus,
    viewport: Viewport,
    cursor: Cursor,
    tree: HierarchyTree,
    cache: RenderCache,
    rows: VirtualRowManager,
    renderer: WaveformRenderer,
    scheduler: RedrawScheduler,
    sizer: SurfaceSizer,
    dataset: Dataset,
    ruler: Box<dyn Surface>,
    wheel: Throttle<WheelInput>,
    drag_moves: Throttle<f64>,
    scroll: Debounce<f64>,
    drag: Option<DragState>,
}

impl Viewer {
    pub fn new(config: ViewerConfig, mut factory: Box<dyn SurfaceFactory>, clock: SharedClock) -> Self {
        let bus = EventBus::new();
        let ruler = factory.create(RULER_SURFACE, "time-ruler");
        let mut cursor = Cursor::new(bus.clone());
        cursor.register_surface(RULER_SURFACE);

        let rendering = &config.rendering;
        let sizer = SurfaceSizer::new(
            clock.clone(),
            rendering.size_retry_attempts,
            rendering.size_retry_base(),
            SurfaceDims::new(rendering.fallback_width, rendering.fallback_height),
        );

        Self {
            viewport: Viewport::new(bus.clone(), config.timeline.max_zoom),
            cursor,
            tree: HierarchyTree::new(bus.clone()),
            cache: RenderCache::new(config.cache.clone(), clock.clone()),
            rows: VirtualRowManager::new(
                factory,
                config.rows.row_height,
                config.rows.buffer_rows,
                config.rows.pool_capacity,
            ),
            renderer: WaveformRenderer::new(rendering.theme),
            scheduler: RedrawScheduler::new(rendering.redraws_per_frame),
            sizer,
            dataset: Dataset::default(),
            ruler,
            wheel: Throttle::new(clock.clone(), config.input.wheel_throttle()),
            drag_moves: Throttle::new(clock.clone(), config.input.drag_throttle()),
            scroll: Debounce::new(clock, config.input.scroll_debounce()),
            drag: None,
            bus,
            config,
        }
    }

    // ===== ACCESSORS =====

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn config(&self) -> &ViewerConfig {
        &self.config
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    pub fn cursor(&self) -> &Cursor {
        &self.cursor
    }

    pub fn tree(&self) -> &HierarchyTree {
        &self.tree
    }

    pub fn rows(&self) -> &VirtualRowManager {
        &self.rows
    }

    pub fn cache(&self) -> &RenderCache {
        &self.cache
    }

    pub fn cache_mut(&mut self) -> &mut RenderCache {
        &mut self.cache
    }

    pub fn renderer(&self) -> &WaveformRenderer {
        &self.renderer
    }

    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    pub fn pending_redraws(&self) -> usize {
        self.scheduler.pending()
    }

    // ===== DATASET =====

    /// Validates and installs a dataset. On error nothing is changed.
    pub fn load_data(&mut self, payload: &Value) -> Result<(), ViewerError> {
        let dataset = Dataset::from_json(payload).inspect_err(|error| {
            log::warn!("Rejected dataset: {error}");
        })?;
        let total = dataset.total_range().unwrap_or_default();

        let change = self.rows.reset();
        self.apply_row_change(change);
        self.scheduler.clear();
        self.drag = None;
        if let Err(error) = self.cache.clear(WAVEFORM_IMAGES.name()) {
            log::warn!("Stale traces kept: {error}");
        }

        self.viewport.set_total_range(total.start, total.end);
        self.cursor.set_bounds(total);
        self.cursor.move_to_start();
        self.tree.build(&dataset.signals);
        self.dataset = dataset;
        self.refresh_rows();
        self.request_redraw_all();

        log::info!(
            "Loaded {} signals spanning {total} ({} {})",
            self.dataset.len(),
            self.dataset.timescale.value,
            self.dataset.timescale.unit
        );
        self.bus.publish(ViewerEvent::DatasetLoaded {
            signals: self.dataset.len(),
            total,
        });
        Ok(())
    }

    // ===== CURSOR =====

    /// Moves the cursor, redraws the first frame of surfaces, then refreshes readouts.
    pub fn move_cursor(&mut self, time: f64) -> f64 {
        if self.cursor.move_to(time).is_some() {
            self.after_cursor_moved();
        }
        self.cursor.current_time()
    }

    pub fn move_cursor_to_start(&mut self) -> f64 {
        self.move_cursor(self.cursor.bounds().start)
    }

    pub fn move_cursor_to_end(&mut self) -> f64 {
        self.move_cursor(self.cursor.bounds().end)
    }

    fn after_cursor_moved(&mut self) {
        self.scheduler.queue_all(self.cursor.surfaces());
        self.draw_frame();
        self.refresh_readouts();
    }

    /// Jumps to the nearest earlier change across the rendered signals. Stays put without one.
    pub fn previous_transition(&mut self, kind: EdgeKind) -> Option<f64> {
        let now = self.cursor.current_time();
        let target = find_previous(self.rows.signals().iter().map(|signal| &**signal), now, kind)?;
        Some(self.move_cursor(target))
    }

    pub fn next_transition(&mut self, kind: EdgeKind) -> Option<f64> {
        let now = self.cursor.current_time();
        let target = find_next(self.rows.signals().iter().map(|signal| &**signal), now, kind)?;
        Some(self.move_cursor(target))
    }

    pub fn previous_transition_of(&mut self, name: &str, kind: EdgeKind) -> Option<f64> {
        let now = self.cursor.current_time();
        let signal = self.dataset.signal(name)?;
        let target = find_previous([&**signal], now, kind)?;
        Some(self.move_cursor(target))
    }

    pub fn next_transition_of(&mut self, name: &str, kind: EdgeKind) -> Option<f64> {
        let now = self.cursor.current_time();
        let signal = self.dataset.signal(name)?;
        let target = find_next([&**signal], now, kind)?;
        Some(self.move_cursor(target))
    }

    /// Formatted value of `name` at the cursor; `None` for unknown signals.
    pub fn value_readout(&mut self, name: &str) -> Option<String> {
        let format = self.radix(name);
        let signal = self.dataset.signal(name)?;
        Some(signal.value_at(self.cursor.current_time()).get_formatted(&format))
    }

    // ===== VIEWPORT =====

    pub fn set_zoom(&mut self, level: f64, center: Option<f64>) -> bool {
        let changed = self.viewport.set_zoom(level, center);
        self.after_viewport_change(changed)
    }

    pub fn zoom_in(&mut self) -> bool {
        let changed = self.viewport.zoom_in(self.config.timeline.zoom_step, None);
        self.after_viewport_change(changed)
    }

    pub fn zoom_out(&mut self) -> bool {
        let changed = self.viewport.zoom_out(self.config.timeline.zoom_step, None);
        self.after_viewport_change(changed)
    }

    pub fn reset_zoom(&mut self) -> bool {
        let changed = self.viewport.reset_zoom();
        self.after_viewport_change(changed)
    }

    pub fn zoom_to_range(&mut self, a: f64, b: f64) -> bool {
        let changed = self.viewport.zoom_to_range(a, b);
        self.after_viewport_change(changed)
    }

    pub fn set_max_zoom(&mut self, max_zoom: f64) -> bool {
        let before = self.viewport.state();
        self.viewport.set_max_zoom(max_zoom);
        let changed = before.visible_start != self.viewport.visible().start
            || before.visible_end != self.viewport.visible().end;
        self.after_viewport_change(changed)
    }

    pub fn pan(&mut self, delta: f64) -> bool {
        let changed = self.viewport.pan(delta);
        self.after_viewport_change(changed)
    }

    /// Pans by the configured fraction of the visible width; `direction` is -1 or +1.
    pub fn pan_step(&mut self, direction: f64) -> bool {
        let delta = self.viewport.visible().duration() * self.config.timeline.pan_fraction * direction.signum();
        self.pan(delta)
    }

    fn after_viewport_change(&mut self, changed: bool) -> bool {
        if changed {
            self.request_redraw_all();
        }
        changed
    }

    // ===== VISIBILITY & ROWS =====

    /// Returns false for unknown paths and for no-op changes.
    pub fn set_visible(&mut self, path: &str, visible: bool) -> bool {
        let Some(node) = self.tree.find(path) else {
            log::debug!("No hierarchy node at '{path}'");
            return false;
        };
        let changed = self.tree.set_visible(node, visible);
        if changed {
            self.refresh_rows();
        }
        changed
    }

    pub fn toggle_visible(&mut self, path: &str) -> bool {
        let Some(node) = self.tree.find(path) else {
            return false;
        };
        let changed = self.tree.toggle_visible(node);
        if changed {
            self.refresh_rows();
        }
        changed
    }

    pub fn show_all(&mut self) -> bool {
        let changed = self.tree.show_all();
        if changed {
            self.refresh_rows();
        }
        changed
    }

    pub fn hide_all(&mut self) -> bool {
        let changed = self.tree.hide_all();
        if changed {
            self.refresh_rows();
        }
        changed
    }

    pub fn toggle_expanded(&mut self, path: &str) -> bool {
        self.tree.find(path).is_some_and(|node| self.tree.toggle_expanded(node))
    }

    fn refresh_rows(&mut self) {
        let visible = self.tree.collect_visible(HierarchyTree::ROOT);
        let change = self.rows.set_signals(visible);
        self.apply_row_change(change);
    }

    /// Scroll input; applied once scrolling has been quiet for the debounce delay.
    pub fn scroll(&mut self, scroll_top: f64) {
        self.scroll.call(scroll_top);
    }

    pub fn set_scroll_top(&mut self, scroll_top: f64) {
        let change = self.rows.set_scroll_top(scroll_top);
        self.apply_row_change(change);
    }

    pub fn set_viewport_height(&mut self, height: f64) {
        let change = self.rows.set_viewport_height(height);
        self.apply_row_change(change);
    }

    fn apply_row_change(&mut self, change: RowChange) {
        if change.is_empty() {
            return;
        }
        for (name, id) in &change.unmounted {
            self.cursor.unregister_surface(*id);
            self.scheduler.remove(*id);
            self.sizer.forget(*id);
            log::trace!("Unmounted row {name}");
        }
        for (_, id) in &change.mounted {
            self.cursor.register_surface(*id);
            self.scheduler.queue(*id);
        }
        if !change.mounted.is_empty() {
            self.refresh_readouts();
        }
    }

    fn refresh_readouts(&mut self) {
        let time = self.cursor.current_time();
        let cache = &mut self.cache;
        self.rows.update_readouts(time, |name| {
            cache.get(RADIX_PREFERENCES, name).unwrap_or_default()
        });
    }

    // ===== RADIX =====

    pub fn radix(&mut self, name: &str) -> VarFormat {
        self.cache.get(RADIX_PREFERENCES, name).unwrap_or_default()
    }

    /// Changes a signal's display format and drops every trace drawn with the old one.
    pub fn set_radix(&mut self, name: &str, format: VarFormat) -> Result<bool, ViewerError> {
        if self.radix(name) == format {
            return Ok(false);
        }
        self.cache.invalidate(RADIX_PREFERENCES.name(), name)?;
        self.cache.set(RADIX_PREFERENCES, name, format, SetOptions::default())?;
        self.bus.publish(ViewerEvent::RadixChanged {
            signal: name.to_string(),
            format,
        });

        if let Some(id) = self.rows.row(name).map(|row| row.surface_id()) {
            self.scheduler.queue(id);
            self.bus.publish(ViewerEvent::RedrawRequested { surface: Some(id) });
        }
        self.refresh_readouts();
        Ok(true)
    }

    // ===== INPUT =====

    pub fn handle_pointer(&mut self, surface: SurfaceId, event: PointerEvent) {
        match event {
            PointerEvent::Click { x } => {
                let time = self.x_to_time(surface, x);
                self.move_cursor(time);
            }
            PointerEvent::Wheel { x, delta_y, shift } => {
                let input = WheelInput {
                    surface,
                    x,
                    delta_y,
                    shift,
                };
                if let Some(input) = self.wheel.call(input) {
                    self.apply_wheel(input);
                }
            }
            PointerEvent::DragStart { x } => {
                let time = self.x_to_time(surface, x);
                self.drag = Some(DragState {
                    surface,
                    start_x: x,
                    start_time: time,
                });
                self.drag_moves.cancel();
                self.bus.publish(ViewerEvent::DragStart { surface, time });
            }
            PointerEvent::DragMove { x } => {
                if self.drag.is_none() {
                    return;
                }
                if let Some(x) = self.drag_moves.call(x) {
                    self.apply_drag_move(x);
                }
            }
            PointerEvent::DragEnd { x } => {
                self.drag_moves.cancel();
                let Some(drag) = self.drag.take() else {
                    return;
                };
                let time = self.x_to_time(drag.surface, x);
                self.bus.publish(ViewerEvent::DragEnd {
                    surface: drag.surface,
                    start: drag.start_time,
                    time,
                });
                if (x - drag.start_x).abs() >= self.config.timeline.drag_zoom_min_px {
                    self.zoom_to_range(drag.start_time, time);
                } else {
                    self.move_cursor(time);
                }
            }
        }
    }

    fn apply_wheel(&mut self, input: WheelInput) {
        if input.delta_y == 0.0 || !input.delta_y.is_finite() {
            return;
        }
        if input.shift {
            self.pan_step(input.delta_y);
            return;
        }
        let center = self.x_to_time(input.surface, input.x);
        let step = self.config.timeline.zoom_step;
        let changed = if input.delta_y < 0.0 {
            self.viewport.zoom_in(step, Some(center))
        } else {
            self.viewport.zoom_out(step, Some(center))
        };
        self.after_viewport_change(changed);
    }

    fn apply_drag_move(&mut self, x: f64) {
        let Some(drag) = self.drag else {
            return;
        };
        let time = self.x_to_time(drag.surface, x);
        self.bus.publish(ViewerEvent::DragUpdate {
            surface: drag.surface,
            start: drag.start_time,
            time,
        });
    }

    fn x_to_time(&self, surface: SurfaceId, x: f64) -> f64 {
        let width = self.surface_width(surface);
        self.viewport.x_to_time(x, width)
    }

    fn surface_width(&self, id: SurfaceId) -> f64 {
        let measured = if id == RULER_SURFACE {
            self.ruler.measured_size().0
        } else {
            self.rows
                .row_for_surface(id)
                .and_then(|row| row.surface())
                .map_or(0.0, |surface| surface.measured_size().0)
        };
        if measured > 0.0 {
            measured
        } else {
            self.config.rendering.fallback_width
        }
    }

    /// The host reports that a surface's laid-out size may have changed.
    pub fn surface_resized(&mut self, id: SurfaceId) {
        self.sizer.forget(id);
        self.scheduler.queue(id);
        self.bus.publish(ViewerEvent::RedrawRequested { surface: Some(id) });
    }

    // ===== FRAME LOOP =====

    /// Runs pending rate-limited input and size retries, then draws one batch.
    /// Returns how many surfaces were drawn.
    pub fn on_animation_frame(&mut self) -> usize {
        if let Some(input) = self.wheel.poll() {
            self.apply_wheel(input);
        }
        if let Some(x) = self.drag_moves.poll() {
            self.apply_drag_move(x);
        }
        if let Some(scroll_top) = self.scroll.poll() {
            self.set_scroll_top(scroll_top);
        }
        for id in self.sizer.due() {
            self.scheduler.queue(id);
        }
        self.draw_frame()
    }

    pub fn request_redraw_all(&mut self) {
        self.scheduler.queue(RULER_SURFACE);
        self.scheduler.queue_all(self.rows.mounted_surfaces());
        self.bus.publish(ViewerEvent::RedrawRequested { surface: None });
    }

    fn draw_frame(&mut self) -> usize {
        let batch = self.scheduler.take_batch();
        batch.into_iter().filter(|id| self.draw_surface(*id)).count()
    }

    fn draw_surface(&mut self, id: SurfaceId) -> bool {
        let visible = self.viewport.visible();
        let cursor = self.cursor.current_time();

        if id == RULER_SURFACE {
            let Some(dims) = self.sizer.resolve(id, &*self.ruler).dims() else {
                return false;
            };
            let timescale = self.dataset.timescale.clone();
            self.renderer
                .draw_ruler(&mut *self.ruler, visible, cursor, &timescale, dims);
            return true;
        }

        let (name, status) = match self.rows.row_for_surface(id) {
            Some(row) => match row.surface() {
                Some(surface) => (row.name().to_string(), self.sizer.resolve(id, surface)),
                None => return false,
            },
            None => return false,
        };
        let dims = match status {
            SizeStatus::Ready(dims) | SizeStatus::Fallback(dims) => dims,
            SizeStatus::Retry { .. } => return false,
        };
        self.sync_dimensions(&name, dims);
        let format = self.radix(&name);

        let Some(row) = self.rows.row_for_surface_mut(id) else {
            return false;
        };
        let mut context = RenderContext {
            renderer: &mut self.renderer,
            cache: &mut self.cache,
            visible,
            cursor,
            format,
            dims,
        };
        matches!(row.render_waveform(&mut context), CellContent::Drawn(_))
    }

    /// Records a surface size; a changed size drops every trace drawn at the old one.
    fn sync_dimensions(&mut self, name: &str, dims: SurfaceDims) {
        match self.cache.get(MEASURED_DIMENSIONS, name) {
            Some(previous) if previous == dims => return,
            Some(_) => {
                if let Err(error) = self.cache.invalidate(MEASURED_DIMENSIONS.name(), name) {
                    log::warn!("Could not invalidate size of '{name}': {error}");
                }
            }
            None => {}
        }
        if let Err(error) = self.cache.set(MEASURED_DIMENSIONS, name, dims, SetOptions::default()) {
            log::warn!("Could not record size of '{name}': {error}");
        }
    }

    // ===== PREFERENCES =====

    /// Restores radix choices and measured sizes. Returns false when nothing usable was stored.
    pub fn restore_preferences(&mut self, storage: &dyn PreferenceStorage) -> Result<bool, ViewerError> {
        let Some(preferences) = storage.load()? else {
            return Ok(false);
        };
        let fingerprint = self.cache.fingerprint();
        if preferences.fingerprint != fingerprint {
            log::info!(
                "Ignoring preferences saved for cache layout {} (current {fingerprint})",
                preferences.fingerprint
            );
            return Ok(false);
        }

        for (name, format) in preferences.radix {
            self.cache.set(RADIX_PREFERENCES, name, format, SetOptions::default())?;
        }
        for (name, dims) in preferences.dimensions {
            self.cache.set(MEASURED_DIMENSIONS, name, dims, SetOptions::default())?;
        }
        log::info!("Restored viewer preferences");
        self.refresh_readouts();
        self.request_redraw_all();
        Ok(true)
    }

    pub fn persist_preferences(&mut self, storage: &dyn PreferenceStorage) -> Result<(), ViewerError> {
        let preferences = ViewerPreferences {
            fingerprint: self.cache.fingerprint(),
            radix: self.cache.snapshot(RADIX_PREFERENCES).into_iter().collect(),
            dimensions: self.cache.snapshot(MEASURED_DIMENSIONS).into_iter().collect(),
        };
        storage.save(&preferences)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::dataflow::EventKind;
    use crate::visualizer::cache::MemoryStorage;
    use crate::visualizer::canvas::surface::RecordingFactory;
    use crate::visualizer::timeline::TimeRange;
    use serde_json::json;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn payload() -> Value {
        json!({
            "signals": [
                { "name": "top.clk", "data": [
                    { "time": 0, "value": "0" }, { "time": 10, "value": "1" },
                    { "time": 20, "value": "0" }, { "time": 30, "value": "1" }
                ]},
                { "name": "top.cpu.state", "bitWidth": 4, "data": [
                    { "time": 0, "value": "0000" }, { "time": 25, "value": "1010" }
                ]},
                { "name": "top.cpu.valid", "data": [
                    { "time": 5, "value": "0" }, { "time": 40, "value": "1" }
                ]}
            ],
            "timescale": { "value": 1, "unit": "ns" }
        })
    }

    fn viewer() -> (Viewer, RecordingFactory, ManualClock) {
        let clock = ManualClock::new();
        let factory = RecordingFactory::new(400.0, 24.0);
        let mut viewer = Viewer::new(
            ViewerConfig::default(),
            Box::new(factory.clone()),
            Rc::new(clock.clone()),
        );
        viewer.set_viewport_height(240.0);
        viewer.load_data(&payload()).unwrap();
        (viewer, factory, clock)
    }

    fn drain(viewer: &mut Viewer) {
        while viewer.pending_redraws() > 0 {
            viewer.on_animation_frame();
        }
    }

    #[test]
    fn load_mounts_rows_and_bounds_cursor() {
        let (viewer, factory, _) = viewer();
        assert_eq!(viewer.viewport().total(), TimeRange::new(0.0, 40.0));
        assert_eq!(viewer.cursor().current_time(), 0.0);
        assert_eq!(viewer.rows().mounted_count(), 3);
        assert_eq!(viewer.cursor().surface_count(), 4);
        assert_eq!(factory.created_count(), 4);
    }

    #[test]
    fn rejected_payload_keeps_previous_state() {
        let (mut viewer, _, _) = viewer();
        viewer.move_cursor(12.0);
        assert!(viewer.load_data(&json!({ "signals": 3 })).is_err());
        assert_eq!(viewer.dataset().len(), 3);
        assert_eq!(viewer.cursor().current_time(), 12.0);
        assert_eq!(viewer.rows().mounted_count(), 3);
    }

    #[test]
    fn cursor_move_redraws_then_updates_readouts() {
        let (mut viewer, factory, _) = viewer();
        drain(&mut viewer);
        let clk = factory.surface_by_label("top.clk").unwrap();
        let frames_before = clk.borrow().frames;

        assert_eq!(viewer.move_cursor(12.0), 12.0);
        assert_eq!(clk.borrow().frames, frames_before + 1);
        assert_eq!(viewer.rows().row("top.clk").and_then(|r| r.value_text()), Some("1"));
        assert_eq!(viewer.rows().row("top.cpu.state").and_then(|r| r.value_text()), Some("0"));

        assert_eq!(viewer.move_cursor(500.0), 40.0);
        assert_eq!(viewer.move_cursor(40.0), 40.0);
        assert_eq!(clk.borrow().frames, frames_before + 2);
    }

    #[test]
    fn edge_navigation_uses_rendered_signals() {
        let (mut viewer, _, _) = viewer();
        viewer.move_cursor(15.0);
        assert_eq!(viewer.next_transition(EdgeKind::Any), Some(20.0));
        assert_eq!(viewer.next_transition(EdgeKind::Rising), Some(30.0));
        assert_eq!(viewer.previous_transition(EdgeKind::Falling), Some(20.0));

        viewer.set_visible("top.clk", false);
        assert_eq!(viewer.next_transition(EdgeKind::Any), Some(25.0));
        assert_eq!(viewer.previous_transition_of("top.clk", EdgeKind::Rising), Some(10.0));
        viewer.move_cursor(0.0);
        assert_eq!(viewer.previous_transition(EdgeKind::Any), None);
        assert_eq!(viewer.cursor().current_time(), 0.0);
    }

    #[test]
    fn radix_change_invalidates_traces_and_readouts() {
        let (mut viewer, factory, _) = viewer();
        drain(&mut viewer);
        viewer.move_cursor(30.0);
        assert_eq!(viewer.value_readout("top.cpu.state").as_deref(), Some("a"));
        let images_before = viewer.cache().len(WAVEFORM_IMAGES.name());

        assert!(viewer.set_radix("top.cpu.state", VarFormat::Unsigned).unwrap());
        assert!(!viewer.set_radix("top.cpu.state", VarFormat::Unsigned).unwrap());
        assert!(viewer.cache().len(WAVEFORM_IMAGES.name()) < images_before);
        assert_eq!(viewer.value_readout("top.cpu.state").as_deref(), Some("10"));
        assert_eq!(
            viewer.rows().row("top.cpu.state").and_then(|r| r.value_text()),
            Some("10")
        );

        drain(&mut viewer);
        let state = factory.surface_by_label("top.cpu.state").unwrap();
        assert!(state.borrow().texts().contains(&"10"));
    }

    #[test]
    fn wheel_zoom_is_throttled() {
        let (mut viewer, _, clock) = viewer();
        let wheel = PointerEvent::Wheel {
            x: 200.0,
            delta_y: -1.0,
            shift: false,
        };
        viewer.handle_pointer(RULER_SURFACE, wheel);
        viewer.handle_pointer(RULER_SURFACE, wheel);
        viewer.handle_pointer(RULER_SURFACE, wheel);
        assert_eq!(viewer.viewport().zoom_level(), 2.0);

        clock.advance_ms(20);
        viewer.on_animation_frame();
        assert_eq!(viewer.viewport().zoom_level(), 4.0);
        assert_eq!(viewer.viewport().visible(), TimeRange::new(15.0, 25.0));
    }

    #[test]
    fn drag_selects_range_and_short_drag_clicks() {
        let (mut viewer, _, _) = viewer();
        let ends = Rc::new(RefCell::new(Vec::new()));
        let seen = ends.clone();
        viewer.bus().subscribe(EventKind::DragEnd, move |event| {
            seen.borrow_mut().push(event.clone());
            Ok(())
        });

        viewer.handle_pointer(RULER_SURFACE, PointerEvent::DragStart { x: 100.0 });
        viewer.handle_pointer(RULER_SURFACE, PointerEvent::DragMove { x: 150.0 });
        viewer.handle_pointer(RULER_SURFACE, PointerEvent::DragEnd { x: 200.0 });
        assert_eq!(viewer.viewport().visible(), TimeRange::new(10.0, 20.0));
        assert_eq!(ends.borrow().len(), 1);

        viewer.handle_pointer(RULER_SURFACE, PointerEvent::DragStart { x: 223.0 });
        viewer.handle_pointer(RULER_SURFACE, PointerEvent::DragEnd { x: 225.0 });
        assert_eq!(viewer.viewport().visible(), TimeRange::new(10.0, 20.0));
        assert_eq!(viewer.cursor().current_time(), 15.625);
    }

    #[test]
    fn shift_wheel_pans() {
        let (mut viewer, _, _) = viewer();
        viewer.set_zoom(2.0, Some(0.0));
        let wheel = PointerEvent::Wheel {
            x: 0.0,
            delta_y: 3.0,
            shift: true,
        };
        viewer.handle_pointer(RULER_SURFACE, wheel);
        assert_eq!(viewer.viewport().visible(), TimeRange::new(5.0, 25.0));
    }

    #[test]
    fn unmeasured_rows_retry_then_fall_back() {
        let clock = ManualClock::new();
        let factory = RecordingFactory::new(0.0, 0.0);
        let mut viewer = Viewer::new(
            ViewerConfig::default(),
            Box::new(factory.clone()),
            Rc::new(clock.clone()),
        );
        viewer.set_viewport_height(240.0);
        viewer.load_data(&payload()).unwrap();

        assert_eq!(viewer.on_animation_frame(), 0);
        for _ in 0..10 {
            clock.advance_ms(1000);
            viewer.on_animation_frame();
        }
        let clk = factory.surface_by_label("top.clk").unwrap();
        assert_eq!(clk.borrow().backing, (800, 24));
        assert_eq!(
            viewer.cache_mut().get(MEASURED_DIMENSIONS, "top.clk"),
            Some(SurfaceDims::new(800.0, 24.0))
        );
    }

    #[test]
    fn resize_drops_traces_for_old_size() {
        let (mut viewer, factory, _) = viewer();
        drain(&mut viewer);
        let clk = factory.surface_by_label("top.clk").unwrap();
        let id = viewer.rows().row("top.clk").map(|r| r.surface_id()).unwrap();
        let traces = viewer.cache().len(WAVEFORM_IMAGES.name());

        clk.borrow_mut().measured = (600.0, 24.0);
        viewer.surface_resized(id);
        drain(&mut viewer);

        assert_eq!(clk.borrow().backing, (600, 24));
        assert_eq!(viewer.cache().len(WAVEFORM_IMAGES.name()), traces);
        assert_eq!(
            viewer.cache_mut().get(MEASURED_DIMENSIONS, "top.clk"),
            Some(SurfaceDims::new(600.0, 24.0))
        );
    }

    #[test]
    fn preferences_survive_a_new_viewer() {
        let storage = MemoryStorage::new();
        {
            let (mut viewer, _, _) = viewer();
            viewer.set_radix("top.cpu.state", VarFormat::Binary).unwrap();
            viewer.persist_preferences(&storage).unwrap();
        }
        let (mut viewer, _, _) = viewer();
        assert!(viewer.restore_preferences(&storage).unwrap());
        assert_eq!(viewer.radix("top.cpu.state"), VarFormat::Binary);

        let foreign = MemoryStorage::with_document("fingerprint = \"cfg_other\"\n");
        assert!(!viewer.restore_preferences(&foreign).unwrap());
        assert!(!viewer.restore_preferences(&MemoryStorage::new()).unwrap());
    }
}
