use super::surface::{DisplayList, Rgba, Surface};
use crate::visualizer::cache::{
    FORMATTED_VALUES, MEASURED_DIMENSIONS, RADIX_PREFERENCES, RenderCache, SetOptions,
    WAVEFORM_IMAGES,
};
use crate::visualizer::timeline::time_domain::{TimeRange, ruler_ticks};
use serde::{Deserialize, Serialize};
use shared::{Signal, SignalValue, SurfaceDims, Timescale, VarFormat};
use std::rc::Rc;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Dark,
    Light,
}

#[derive(Clone, Debug, PartialEq)]
enum PixelValue {
    Single(Rc<str>),
    Mixed,
}

#[derive(Clone, Debug)]
pub struct ThemeColors {
    pub row_bg: Rgba,
    pub ruler_bg: Rgba,
    pub neutral_12: Rgba,
    pub grid_color: Rgba,
    pub cursor_color: Rgba,
    pub segment_divider_color: Rgba,
    pub value_low_color: Rgba,
    pub value_high_color: Rgba,
    pub value_bus_color: Rgba,
    pub mixed_color: Rgba,
    pub state_high_impedance: Rgba,
    pub state_unknown: Rgba,
    pub state_uninitialized: Rgba,
    pub missing_color: Rgba,
    pub segment_alt_multiplier: f32,
}

impl ThemeColors {
    pub fn for_theme(theme: Theme) -> Self {
        match theme {
            Theme::Dark => ThemeColors {
                row_bg: (6, 9, 14, 1.0),
                ruler_bg: (5, 11, 22, 1.0),
                neutral_12: (253, 253, 253, 1.0),
                grid_color: (36, 50, 72, 0.35),
                cursor_color: (255, 165, 0, 1.0),
                segment_divider_color: (3, 4, 9, 1.0),
                value_low_color: (18, 50, 140, 1.0),
                value_high_color: (16, 96, 72, 1.0),
                value_bus_color: (44, 58, 150, 1.0),
                mixed_color: (226, 119, 40, 0.58),
                state_high_impedance: (234, 179, 8, 0.85),
                state_unknown: (220, 38, 38, 0.9),
                state_uninitialized: (220, 38, 38, 0.65),
                missing_color: (100, 110, 125, 0.6),
                segment_alt_multiplier: 0.45,
            },
            Theme::Light => ThemeColors {
                row_bg: (248, 250, 255, 1.0),
                ruler_bg: (234, 246, 255, 1.0),
                neutral_12: (17, 24, 39, 1.0),
                grid_color: (158, 173, 194, 0.35),
                cursor_color: (37, 99, 235, 0.8),
                segment_divider_color: (206, 212, 224, 1.0),
                value_low_color: (110, 148, 255, 1.0),
                value_high_color: (54, 200, 160, 1.0),
                value_bus_color: (152, 176, 255, 1.0),
                mixed_color: (226, 119, 40, 0.58),
                state_high_impedance: (202, 138, 4, 0.9),
                state_unknown: (220, 38, 38, 0.85),
                state_uninitialized: (220, 38, 38, 0.6),
                missing_color: (150, 160, 175, 0.6),
                segment_alt_multiplier: 1.1,
            },
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SignalState {
    Regular,
    HighImpedance,
    Unknown,
    Uninitialized,
    Missing,
}

pub fn classify_signal_state(value: &str) -> SignalState {
    let normalized = value.trim().to_ascii_uppercase();
    match normalized.as_str() {
        "Z" => SignalState::HighImpedance,
        "X" => SignalState::Unknown,
        "U" => SignalState::Uninitialized,
        "N/A" | "NA" | "" => SignalState::Missing,
        _ => SignalState::Regular,
    }
}

/// One waveform draw: which signal, over which window, into what size.
#[derive(Clone, Copy, Debug)]
pub struct TraceRequest<'a> {
    pub signal: &'a Signal,
    pub visible: TimeRange,
    pub cursor: f64,
    pub format: VarFormat,
    pub dims: SurfaceDims,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RenderOutcome {
    pub cached: bool,
    pub commands: usize,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RenderStats {
    pub renders: u64,
    pub trace_builds: u64,
    pub trace_hits: u64,
}

/// Paints waveform rows and the time ruler.
///
/// The trace itself (everything except the cursor) is a display list cached in
/// `rendered-waveform-images`. The cursor line is an overlay drawn on every call.
#[derive(Debug)]
pub struct WaveformRenderer {
    theme: Theme,
    colors: ThemeColors,
    stats: RenderStats,
}

const LABEL_CHAR_WIDTH: f64 = 7.0;
const MIN_LABEL_WIDTH: f64 = 18.0;
const RULER_TICK_SPACING: f64 = 80.0;

impl WaveformRenderer {
    pub fn new(theme: Theme) -> Self {
        Self {
            theme,
            colors: ThemeColors::for_theme(theme),
            stats: RenderStats::default(),
        }
    }

    pub fn theme(&self) -> Theme {
        self.theme
    }

    pub fn set_theme(&mut self, theme: Theme) {
        self.theme = theme;
        self.colors = ThemeColors::for_theme(theme);
    }

    pub fn stats(&self) -> RenderStats {
        self.stats
    }

    pub fn trace_key(&self, request: &TraceRequest<'_>) -> String {
        let (width, height) = request.dims.backing_size();
        format!(
            "{}|{:?}|{:?}|{}x{}|{:?}|{:?}",
            request.signal.name,
            request.visible.start,
            request.visible.end,
            width,
            height,
            request.format,
            self.theme
        )
    }

    pub fn draw(
        &mut self,
        surface: &mut dyn Surface,
        request: &TraceRequest<'_>,
        cache: &mut RenderCache,
    ) -> RenderOutcome {
        let (width, height) = request.dims.backing_size();
        if surface.backing_size() != (width, height) {
            surface.set_backing_size(width, height);
        }
        self.stats.renders += 1;

        let key = self.trace_key(request);
        let (trace, cached) = match cache.get(WAVEFORM_IMAGES, &key) {
            Some(trace) => {
                self.stats.trace_hits += 1;
                (trace, true)
            }
            None => {
                self.stats.trace_builds += 1;
                let trace = Rc::new(self.build_trace(request, cache));
                let options = SetOptions::default()
                    .depends_on(MEASURED_DIMENSIONS.name(), request.signal.name.as_str())
                    .depends_on(RADIX_PREFERENCES.name(), request.signal.name.as_str());
                if let Err(error) = cache.set(WAVEFORM_IMAGES, key, trace.clone(), options) {
                    log::warn!("Trace for '{}' not cached: {error}", request.signal.name);
                }
                (trace, false)
            }
        };

        surface.clear();
        trace.replay(surface);
        self.draw_cursor(surface, request.visible, request.cursor, width as f64, height as f64);

        RenderOutcome {
            cached,
            commands: trace.len(),
        }
    }

    fn draw_cursor(&self, surface: &mut dyn Surface, visible: TimeRange, cursor: f64, width: f64, height: f64) {
        let duration = visible.duration();
        if duration <= 0.0 || !visible.contains(cursor) {
            return;
        }
        let x = (cursor - visible.start) / duration * width;
        surface.set_stroke(self.colors.cursor_color, 2.0);
        surface.begin_path();
        surface.move_to(x, 0.0);
        surface.line_to(x, height);
        surface.stroke();
    }

    fn build_trace(&self, request: &TraceRequest<'_>, cache: &mut RenderCache) -> DisplayList {
        let (width, height) = request.dims.backing_size();
        let (width, height) = (width as f64, height as f64);
        let mut list = DisplayList::new();
        list.set_fill(self.colors.row_bg);
        list.fill_rect(0.0, 0.0, width, height);

        if request.signal.data.is_empty() || request.visible.duration() <= 0.0 {
            list.set_stroke(self.colors.missing_color, 1.0);
            list.polyline(&[(0.0, height / 2.0), (width, height / 2.0)]);
            return list;
        }

        let runs = pixel_runs(request.signal, request.visible, width as usize);
        if request.signal.is_single_bit() {
            self.add_logic_trace(&mut list, &runs, height);
        } else {
            self.add_bus_trace(&mut list, &runs, height, request.format, cache);
        }
        list
    }

    fn add_logic_trace(&self, list: &mut DisplayList, runs: &[(usize, usize, PixelValue)], height: f64) {
        let high_y = 3.0;
        let low_y = (height - 3.0).max(high_y);
        let mut points: Vec<(f64, f64)> = Vec::new();

        for (start, end, value) in runs {
            let (x0, x1) = (*start as f64, *end as f64);
            let level = match value {
                PixelValue::Single(value) => match value.trim() {
                    "1" => Some(high_y),
                    "0" => Some(low_y),
                    other => {
                        self.fill_state_band(list, classify_signal_state(other), x0, x1, height);
                        None
                    }
                },
                PixelValue::Mixed => {
                    list.set_fill(self.colors.mixed_color);
                    list.fill_rect(x0, 2.0, x1 - x0, (height - 4.0).max(1.5));
                    None
                }
            };

            match level {
                Some(y) => {
                    // Consecutive runs share an x, which yields the vertical edge.
                    points.push((x0, y));
                    points.push((x1, y));
                }
                None => self.flush_logic_line(list, &mut points),
            }
        }
        self.flush_logic_line(list, &mut points);
    }

    fn flush_logic_line(&self, list: &mut DisplayList, points: &mut Vec<(f64, f64)>) {
        if points.is_empty() {
            return;
        }
        points.dedup();
        list.set_stroke(self.colors.value_high_color, 1.5);
        list.polyline(points);
        points.clear();
    }

    fn fill_state_band(&self, list: &mut DisplayList, state: SignalState, x0: f64, x1: f64, height: f64) {
        let color = match state {
            SignalState::HighImpedance => self.colors.state_high_impedance,
            SignalState::Unknown => self.colors.state_unknown,
            SignalState::Uninitialized => self.colors.state_uninitialized,
            SignalState::Missing => return,
            SignalState::Regular => self.colors.value_bus_color,
        };
        let band = if state == SignalState::HighImpedance {
            (height - 4.0).max(2.0) * 0.55
        } else {
            (height - 4.0).max(1.5)
        };
        list.set_fill(color);
        list.fill_rect(x0, (height - band) / 2.0, x1 - x0, band);
    }

    fn add_bus_trace(
        &self,
        list: &mut DisplayList,
        runs: &[(usize, usize, PixelValue)],
        height: f64,
        format: VarFormat,
        cache: &mut RenderCache,
    ) {
        let mut segment_index = 0usize;
        for (start, end, value) in runs {
            let (x0, x1) = (*start as f64, *end as f64);
            let run_width = x1 - x0;
            match value {
                PixelValue::Mixed => {
                    list.set_fill(self.colors.mixed_color);
                    list.fill_rect(x0, 2.0, run_width, (height - 4.0).max(1.5));
                }
                PixelValue::Single(value) => {
                    let state = classify_signal_state(value);
                    if state == SignalState::Missing {
                        continue;
                    }
                    if state != SignalState::Regular {
                        self.fill_state_band(list, state, x0, x1, height);
                    } else {
                        let color = if segment_index % 2 == 0 {
                            self.colors.value_bus_color
                        } else {
                            tint_color(self.colors.value_bus_color, self.colors.segment_alt_multiplier)
                        };
                        list.set_fill(color);
                        list.fill_rect(x0, 2.0, run_width, (height - 4.0).max(1.5));
                    }
                    segment_index += 1;

                    if x0 > 0.5 {
                        list.set_fill(self.colors.segment_divider_color);
                        list.fill_rect(x0, 2.0, 1.0, (height - 4.0).max(1.5));
                    }

                    if run_width > MIN_LABEL_WIDTH && height > 14.0 {
                        let label = format_label(cache, format, value);
                        let text = truncate_value_text(&label, (run_width / LABEL_CHAR_WIDTH) as usize);
                        if !text.is_empty() {
                            list.set_fill(self.colors.neutral_12);
                            list.fill_text(text, x0 + 4.0, height / 2.0 + 4.0);
                        }
                    }
                }
            }
        }
    }

    /// Time ruler: tick marks every "nice" step, labelled in the dataset timescale.
    pub fn draw_ruler(
        &mut self,
        surface: &mut dyn Surface,
        visible: TimeRange,
        cursor: f64,
        timescale: &Timescale,
        dims: SurfaceDims,
    ) {
        let (width, height) = dims.backing_size();
        if surface.backing_size() != (width, height) {
            surface.set_backing_size(width, height);
        }
        let (width, height) = (width as f64, height as f64);
        self.stats.renders += 1;

        surface.clear();
        surface.set_fill(self.colors.ruler_bg);
        surface.fill_rect(0.0, 0.0, width, height);

        let mut last_label_right = f64::NEG_INFINITY;
        let minimum_label_gap = 8.0;
        for tick in ruler_ticks(visible, width, RULER_TICK_SPACING, timescale) {
            surface.set_fill(self.colors.neutral_12);
            surface.fill_rect(tick.x, 0.0, 1.0, (height * 0.3).max(1.0));

            let approx_width = (tick.label.len() as f64 * 6.5).max(35.0);
            let left_edge = (tick.x - approx_width / 2.0).max(0.0);
            if left_edge > last_label_right + minimum_label_gap {
                surface.fill_text(&tick.label, left_edge, height - 4.0);
                last_label_right = left_edge + approx_width;
            }
        }
        self.draw_cursor(surface, visible, cursor, width, height);
    }
}

fn format_label(cache: &mut RenderCache, format: VarFormat, value: &str) -> String {
    let key = format!("{}|{value}", format.as_static_str());
    let formatted = cache.get_or_insert_with(FORMATTED_VALUES, &key, SetOptions::default(), || {
        SignalValue::Present(value.to_string()).get_formatted(&format)
    });
    match formatted {
        Ok(text) => text,
        Err(error) => {
            log::warn!("Formatted value not cached: {error}");
            format.format(value)
        }
    }
}

/// Collapses the signal into runs of pixel columns that show the same value.
/// A column covered by more than one value becomes [`PixelValue::Mixed`].
fn pixel_runs(signal: &Signal, visible: TimeRange, width_px: usize) -> Vec<(usize, usize, PixelValue)> {
    let duration = visible.duration();
    if width_px == 0 || duration <= 0.0 {
        return Vec::new();
    }
    let time_per_pixel = duration / width_px as f64;
    let mut pixel_states: Vec<Option<PixelValue>> = vec![None; width_px];

    // The value effective at the left edge may come from a point before it.
    let first = signal.index_at(visible.start).unwrap_or(0);
    for index in first..signal.data.len() {
        let point = &signal.data[index];
        if point.time > visible.end {
            break;
        }
        let segment_start = if index == first {
            visible.start
        } else {
            point.time.max(visible.start)
        };
        let segment_end = signal
            .data
            .get(index + 1)
            .map_or(visible.end, |next| next.time.min(visible.end));
        if segment_end < segment_start {
            continue;
        }

        let start_px = ((segment_start - visible.start) / time_per_pixel).floor() as usize;
        let end_px = (((segment_end - visible.start) / time_per_pixel).ceil() as usize)
            .max(start_px + 1)
            .min(width_px);
        let value: Rc<str> = Rc::from(point.value.as_str());
        for entry in pixel_states.iter_mut().take(end_px).skip(start_px) {
            match entry {
                None => *entry = Some(PixelValue::Single(value.clone())),
                Some(PixelValue::Single(existing)) if existing.as_ref() != value.as_ref() => {
                    *entry = Some(PixelValue::Mixed);
                }
                Some(_) => {}
            }
        }
    }

    let mut runs: Vec<(usize, usize, PixelValue)> = Vec::new();
    for (px, state) in pixel_states.into_iter().enumerate() {
        let Some(state) = state else {
            continue;
        };
        match runs.last_mut() {
            Some((_, end, last)) if *end == px && *last == state => *end = px + 1,
            _ => runs.push((px, px + 1, state)),
        }
    }
    runs
}

fn tint_color(color: Rgba, multiplier: f32) -> Rgba {
    let (r, g, b, a) = color;
    let clamp = |component: u8| -> u8 {
        let scaled = (component as f32) * multiplier;
        scaled.clamp(0.0, 255.0).round() as u8
    };
    (clamp(r), clamp(g), clamp(b), a)
}

pub fn truncate_value_text(value: &str, max_chars: usize) -> String {
    if max_chars == 0 {
        return String::new();
    }
    let char_count = value.chars().count();
    if char_count <= max_chars {
        return value.to_string();
    }
    if max_chars <= 3 {
        value.chars().take(max_chars).collect()
    } else {
        let mut truncated: String = value.chars().take(max_chars - 3).collect();
        truncated.push_str("...");
        truncated
    }
}
