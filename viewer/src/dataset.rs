//! Validation of the `{ signals, timescale }` payload handed to `load_data`.

use crate::error::DatasetError;
use crate::visualizer::timeline::TimeRange;
use serde::Deserialize;
use serde_json::Value;
use shared::{Signal, TimePoint, Timescale};
use std::collections::HashSet;
use std::rc::Rc;

#[derive(Deserialize)]
struct RawSignal {
    name: String,
    #[serde(default)]
    data: Vec<RawPoint>,
    #[serde(default, rename = "bitWidth")]
    bit_width: Option<u32>,
}

#[derive(Deserialize)]
struct RawPoint {
    time: f64,
    value: RawValue,
}

/// Parsers emit values as strings, but plain numbers and booleans are accepted too.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawValue {
    Text(String),
    Number(serde_json::Number),
    Flag(bool),
}

impl RawValue {
    fn into_string(self) -> String {
        match self {
            RawValue::Text(text) => text,
            RawValue::Number(number) => number.to_string(),
            RawValue::Flag(flag) => if flag { "1" } else { "0" }.to_string(),
        }
    }
}

/// A validated dataset. Signals are immutable and shared by reference.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    pub signals: Vec<Rc<Signal>>,
    pub timescale: Timescale,
}

impl Dataset {
    pub fn from_json(payload: &Value) -> Result<Self, DatasetError> {
        let object = payload.as_object().ok_or(DatasetError::NotAnObject)?;
        let raw_signals = object
            .get("signals")
            .ok_or(DatasetError::MissingSignals)?
            .as_array()
            .ok_or(DatasetError::SignalsNotArray)?;

        let timescale = parse_timescale(object.get("timescale"));

        let mut seen = HashSet::new();
        let mut signals = Vec::with_capacity(raw_signals.len());
        for (index, raw) in raw_signals.iter().enumerate() {
            let raw = RawSignal::deserialize(raw)
                .map_err(|source| DatasetError::InvalidSignal { index, source })?;
            if raw.name.trim().is_empty() {
                return Err(DatasetError::EmptySignalName { index });
            }
            if raw.name.split('.').any(str::is_empty) {
                return Err(DatasetError::EmptyNameSegment { name: raw.name });
            }
            if !seen.insert(raw.name.clone()) {
                return Err(DatasetError::DuplicateSignal { name: raw.name });
            }

            let mut data: Vec<TimePoint> = raw
                .data
                .into_iter()
                .map(|point| TimePoint::new(point.time, point.value.into_string()))
                .collect();
            if !data.is_sorted_by(|a, b| a.time <= b.time) {
                log::warn!("Signal '{}' has out-of-order points, sorting by time", raw.name);
                data.sort_by(|a, b| a.time.total_cmp(&b.time));
            }

            let mut signal = Signal::new(raw.name, data);
            signal.bit_width = raw.bit_width;
            signals.push(Rc::new(signal));
        }

        Ok(Self { signals, timescale })
    }

    /// From the earliest first point to the latest last point across all signals.
    pub fn total_range(&self) -> Option<TimeRange> {
        let mut spans = self.signals.iter().filter_map(|signal| signal.time_span());
        let (mut start, mut end) = spans.next()?;
        for (first, last) in spans {
            start = start.min(first);
            end = end.max(last);
        }
        Some(TimeRange::new(start, end))
    }

    pub fn signal(&self, name: &str) -> Option<&Rc<Signal>> {
        self.signals.iter().find(|signal| signal.name == name)
    }

    pub fn len(&self) -> usize {
        self.signals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signals.is_empty()
    }
}

fn parse_timescale(value: Option<&Value>) -> Timescale {
    let Some(value) = value else {
        log::debug!("Dataset has no timescale, using {:?}", Timescale::default());
        return Timescale::default();
    };
    match Timescale::deserialize(value) {
        Ok(timescale) if timescale.is_valid() => timescale,
        Ok(timescale) => {
            log::warn!("Unsupported timescale {} {}, using 1 ns", timescale.value, timescale.unit);
            Timescale::default()
        }
        Err(error) => {
            log::warn!("Malformed timescale ({error}), using 1 ns");
            Timescale::default()
        }
    }
}
