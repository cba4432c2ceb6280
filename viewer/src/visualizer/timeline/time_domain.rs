//! Time domain for the viewer: dataset-unit time ranges and ruler labelling.
//!
//! Times are plain `f64` values in dataset units. [`Timescale`] converts them
//! to physical time only when labels are produced.

use shared::Timescale;
use std::fmt;

/// Closed time interval `[start, end]` in dataset units.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TimeRange {
    pub start: f64,
    pub end: f64,
}

impl TimeRange {
    pub fn new(start: f64, end: f64) -> Self {
        TimeRange {
            start: start.min(end),
            end: start.max(end),
        }
    }

    pub fn duration(self) -> f64 {
        self.end - self.start
    }

    pub fn contains(self, time: f64) -> bool {
        time >= self.start && time <= self.end
    }

    pub fn center(self) -> f64 {
        self.start + self.duration() / 2.0
    }

    pub fn clamp(self, time: f64) -> f64 {
        time.clamp(self.start, self.end)
    }

    /// Overlap of two ranges, `None` when they are disjoint.
    pub fn intersect(self, other: TimeRange) -> Option<TimeRange> {
        let start = self.start.max(other.start);
        let end = self.end.min(other.end);
        (start <= end).then_some(TimeRange { start, end })
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} → {}", self.start, self.end)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeLabelUnit {
    Seconds,
    Milliseconds,
    Microseconds,
    Nanoseconds,
    Picoseconds,
    Femtoseconds,
}

impl TimeLabelUnit {
    const ALL: [TimeLabelUnit; 6] = [
        TimeLabelUnit::Seconds,
        TimeLabelUnit::Milliseconds,
        TimeLabelUnit::Microseconds,
        TimeLabelUnit::Nanoseconds,
        TimeLabelUnit::Picoseconds,
        TimeLabelUnit::Femtoseconds,
    ];

    pub fn base_seconds(self) -> f64 {
        match self {
            TimeLabelUnit::Seconds => 1.0,
            TimeLabelUnit::Milliseconds => 1e-3,
            TimeLabelUnit::Microseconds => 1e-6,
            TimeLabelUnit::Nanoseconds => 1e-9,
            TimeLabelUnit::Picoseconds => 1e-12,
            TimeLabelUnit::Femtoseconds => 1e-15,
        }
    }

    pub fn suffix(self) -> &'static str {
        match self {
            TimeLabelUnit::Seconds => "s",
            TimeLabelUnit::Milliseconds => "ms",
            TimeLabelUnit::Microseconds => "us",
            TimeLabelUnit::Nanoseconds => "ns",
            TimeLabelUnit::Picoseconds => "ps",
            TimeLabelUnit::Femtoseconds => "fs",
        }
    }
}

/// Picks the largest unit in which both the range and a single tick step read naturally.
pub fn select_time_unit(step_seconds: f64, range_seconds: f64) -> TimeLabelUnit {
    for unit in TimeLabelUnit::ALL {
        let scale = unit.base_seconds();
        if range_seconds / scale >= 1.0 && step_seconds / scale >= 0.1 {
            return unit;
        }
    }
    TimeLabelUnit::Femtoseconds
}

pub fn format_time_label(seconds: f64, unit: TimeLabelUnit) -> String {
    let mut formatted = format_axis_number(seconds / unit.base_seconds());
    formatted.push_str(unit.suffix());
    formatted
}

pub fn format_axis_number(value: f64) -> String {
    let mut s = if value.abs() >= 100.0 {
        format!("{:.0}", value.round())
    } else if value.abs() >= 10.0 {
        format!("{:.1}", value)
    } else if value.abs() >= 1.0 {
        format!("{:.2}", value)
    } else {
        format!("{:.3}", value)
    };

    if let Some(pos) = s.find('.') {
        while s.ends_with('0') {
            s.pop();
        }
        if s.len() > pos && s.ends_with('.') {
            s.pop();
        }
    }
    if s == "-0" {
        s = "0".to_string();
    }
    s
}

pub fn round_to_nice_number(value: f64) -> f64 {
    if value <= 0.0 || !value.is_finite() {
        return 1.0;
    }

    let magnitude = 10_f64.powf(value.log10().floor());
    let normalized = value / magnitude;

    let nice_normalized = if normalized <= 1.0 {
        1.0
    } else if normalized <= 2.0 {
        2.0
    } else if normalized <= 5.0 {
        5.0
    } else {
        10.0
    };

    nice_normalized * magnitude
}

/// One labelled tick on the time ruler.
#[derive(Debug, Clone, PartialEq)]
pub struct RulerTick {
    pub time: f64,
    pub x: f64,
    pub label: String,
}

/// Ticks at a "nice" step across `visible`, roughly one per `target_spacing_px`.
pub fn ruler_ticks(
    visible: TimeRange,
    width: f64,
    target_spacing_px: f64,
    timescale: &Timescale,
) -> Vec<RulerTick> {
    let duration = visible.duration();
    if duration <= 0.0 || width <= 0.0 || target_spacing_px <= 0.0 {
        return Vec::new();
    }

    let desired_ticks = (width / target_spacing_px).max(1.0);
    let step = round_to_nice_number(duration / desired_ticks);
    let unit = select_time_unit(
        timescale.to_seconds(step).abs(),
        timescale.to_seconds(duration).abs(),
    );

    let mut ticks = Vec::new();
    let mut index = (visible.start / step).ceil();
    loop {
        let time = index * step;
        if time > visible.end {
            break;
        }
        let x = (time - visible.start) / duration * width;
        ticks.push(RulerTick {
            time,
            x,
            label: format_time_label(timescale.to_seconds(time), unit),
        });
        index += 1.0;
    }
    ticks
}
