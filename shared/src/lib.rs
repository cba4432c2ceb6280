use convert_base::Convert;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

// ===== CORE DATA TYPES =====

/// Display text used wherever a signal has no value to show.
pub const NO_DATA: &str = "no data";

/// A single value-change event.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TimePoint {
    pub time: f64,
    pub value: String,
}

impl TimePoint {
    pub fn new(time: f64, value: impl Into<String>) -> Self {
        Self {
            time,
            value: value.into(),
        }
    }
}

/// A named signal and its value changes, ordered by time.
///
/// The first point's value is effective from negative infinity up to the
/// second point.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Signal {
    pub name: String,
    pub data: Vec<TimePoint>,
    #[serde(default, rename = "bitWidth", skip_serializing_if = "Option::is_none")]
    pub bit_width: Option<u32>,
}

impl Signal {
    pub fn new(name: impl Into<String>, data: Vec<TimePoint>) -> Self {
        Self {
            name: name.into(),
            data,
            bit_width: None,
        }
    }

    pub fn with_bit_width(mut self, bit_width: u32) -> Self {
        self.bit_width = Some(bit_width);
        self
    }

    /// Time of the first and last value change.
    pub fn time_span(&self) -> Option<(f64, f64)> {
        let first = self.data.first()?;
        let last = self.data.last()?;
        Some((first.time, last.time))
    }

    /// Index of the point whose value is effective at `time`.
    pub fn index_at(&self, time: f64) -> Option<usize> {
        if self.data.is_empty() {
            return None;
        }
        let after = self.data.partition_point(|point| point.time <= time);
        Some(after.saturating_sub(1))
    }

    pub fn value_at(&self, time: f64) -> SignalValue {
        match self.index_at(time) {
            Some(index) => SignalValue::Present(self.data[index].value.clone()),
            None => SignalValue::Missing,
        }
    }

    /// Points where the value differs from the preceding point.
    pub fn transitions(&self) -> impl Iterator<Item = Transition<'_>> + '_ {
        self.data.windows(2).filter_map(|pair| {
            let (before, after) = (&pair[0], &pair[1]);
            (before.value != after.value).then_some(Transition {
                time: after.time,
                from: &before.value,
                to: &after.value,
            })
        })
    }

    /// Single-bit signals are drawn as logic traces, everything else as a bus.
    pub fn is_single_bit(&self) -> bool {
        match self.bit_width {
            Some(width) => width == 1,
            None => self
                .data
                .iter()
                .all(|point| point.value.trim().chars().count() <= 1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transition<'a> {
    pub time: f64,
    pub from: &'a str,
    pub to: &'a str,
}

impl Transition<'_> {
    pub fn is_rising(&self) -> bool {
        self.from.trim() == "0" && self.to.trim() == "1"
    }

    pub fn is_falling(&self) -> bool {
        self.from.trim() == "1" && self.to.trim() == "0"
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum SignalValue {
    Present(String),
    Missing,
}

impl SignalValue {
    pub fn get_formatted(&self, format: &VarFormat) -> String {
        match self {
            SignalValue::Present(value) => format.format(value),
            SignalValue::Missing => NO_DATA.to_string(),
        }
    }

    pub fn raw(&self) -> Option<&str> {
        match self {
            SignalValue::Present(value) => Some(value),
            SignalValue::Missing => None,
        }
    }
}

// ===== TIMESCALE =====

const KNOWN_TIME_UNITS: [(&str, f64); 6] = [
    ("fs", 1e-15),
    ("ps", 1e-12),
    ("ns", 1e-9),
    ("us", 1e-6),
    ("ms", 1e-3),
    ("s", 1.0),
];

/// Physical duration of one dataset time unit, e.g. `{ value: 10, unit: "ps" }`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Timescale {
    pub value: f64,
    pub unit: String,
}

impl Timescale {
    pub fn is_valid(&self) -> bool {
        self.value.is_finite() && self.value > 0.0 && self.unit_seconds().is_some()
    }

    fn unit_seconds(&self) -> Option<f64> {
        let unit = self.unit.trim();
        let unit = if unit == "μs" { "us" } else { unit };
        KNOWN_TIME_UNITS
            .iter()
            .find(|(name, _)| *name == unit)
            .map(|(_, seconds)| *seconds)
    }

    /// Seconds represented by `time` dataset units.
    pub fn to_seconds(&self, time: f64) -> f64 {
        time * self.value * self.unit_seconds().unwrap_or(1e-9)
    }
}

impl Default for Timescale {
    fn default() -> Self {
        Self {
            value: 1.0,
            unit: "ns".to_string(),
        }
    }
}

// ===== VALUE FORMATTING =====

#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum VarFormat {
    ASCII,
    Binary,
    BinaryWithGroups,
    #[default]
    Hexadecimal,
    Octal,
    Signed,
    Unsigned,
}

impl VarFormat {
    pub const ALL: [VarFormat; 7] = [
        VarFormat::ASCII,
        VarFormat::Binary,
        VarFormat::BinaryWithGroups,
        VarFormat::Hexadecimal,
        VarFormat::Octal,
        VarFormat::Signed,
        VarFormat::Unsigned,
    ];

    pub fn as_static_str(&self) -> &'static str {
        match self {
            VarFormat::ASCII => "Text",
            VarFormat::Binary => "Bin",
            VarFormat::BinaryWithGroups => "Bins",
            VarFormat::Hexadecimal => "Hex",
            VarFormat::Octal => "Oct",
            VarFormat::Signed => "Int",
            VarFormat::Unsigned => "UInt",
        }
    }

    /// Formats a raw binary value. Values containing anything but `0`/`1`
    /// (X, Z, U, ...) are returned unchanged.
    pub fn format(&self, value: &str) -> String {
        let trimmed = value.trim();
        let bits = trimmed.strip_prefix(['b', 'B']).unwrap_or(trimmed);
        if bits.is_empty() || !bits.bytes().all(|b| b == b'0' || b == b'1') {
            return trimmed.to_string();
        }

        match self {
            VarFormat::Binary => bits.to_string(),
            VarFormat::BinaryWithGroups => group_from_right(bits, 4)
                .into_iter()
                .collect::<Vec<_>>()
                .join(" "),
            VarFormat::Hexadecimal => group_from_right(bits, 4)
                .into_iter()
                .map(|group| digit_char(u32::from_str_radix(&group, 2).unwrap_or(0)))
                .collect(),
            VarFormat::Octal => group_from_right(bits, 3)
                .into_iter()
                .map(|group| digit_char(u32::from_str_radix(&group, 2).unwrap_or(0)))
                .collect(),
            VarFormat::Unsigned => binary_to_decimal(bits),
            VarFormat::Signed => {
                if bits.starts_with('1') {
                    format!("-{}", binary_to_decimal(&twos_complement(bits)))
                } else {
                    binary_to_decimal(bits)
                }
            }
            VarFormat::ASCII => group_from_right(bits, 8)
                .into_iter()
                .map(|group| {
                    let byte = u8::from_str_radix(&group, 2).unwrap_or(0);
                    if byte.is_ascii_graphic() || byte == b' ' {
                        byte as char
                    } else {
                        '.'
                    }
                })
                .collect(),
        }
    }
}

/// Splits `bits` into `size`-wide groups aligned to the least significant bit,
/// zero-padding the leading group.
fn group_from_right(bits: &str, size: usize) -> Vec<String> {
    let padding = (size - bits.len() % size) % size;
    let padded = format!("{}{}", "0".repeat(padding), bits);
    padded
        .as_bytes()
        .chunks(size)
        .map(|chunk| String::from_utf8_lossy(chunk).into_owned())
        .collect()
}

fn digit_char(digit: u32) -> char {
    char::from_digit(digit, 16).unwrap_or('?')
}

fn twos_complement(bits: &str) -> String {
    let mut inverted: Vec<u8> = bits
        .bytes()
        .map(|b| if b == b'0' { b'1' } else { b'0' })
        .collect();
    for bit in inverted.iter_mut().rev() {
        if *bit == b'0' {
            *bit = b'1';
            break;
        }
        *bit = b'0';
    }
    String::from_utf8_lossy(&inverted).into_owned()
}

fn binary_to_decimal(bits: &str) -> String {
    let significant = bits.trim_start_matches('0');
    if significant.is_empty() {
        return "0".to_string();
    }
    if significant.len() <= 128 {
        if let Ok(value) = u128::from_str_radix(significant, 2) {
            return value.to_string();
        }
    }

    // Wider than u128: digit-vector conversion, least significant digit first.
    let digits: Vec<u8> = significant.bytes().rev().map(|b| b - b'0').collect();
    let mut base = Convert::new(2, 10);
    let output = base.convert::<u8, u64>(&digits);
    let decimal: String = output
        .iter()
        .rev()
        .skip_while(|digit| **digit == 0)
        .filter_map(|digit| char::from_digit(*digit as u32, 10))
        .collect();
    if decimal.is_empty() {
        "0".to_string()
    } else {
        decimal
    }
}

// ===== PERSISTED PREFERENCES =====

/// Measured CSS size of a drawing surface together with its device pixel ratio.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct SurfaceDims {
    pub width: f64,
    pub height: f64,
    #[serde(default = "default_pixel_ratio")]
    pub pixel_ratio: f64,
}

fn default_pixel_ratio() -> f64 {
    1.0
}

impl SurfaceDims {
    pub fn new(width: f64, height: f64) -> Self {
        Self {
            width,
            height,
            pixel_ratio: 1.0,
        }
    }

    pub fn with_pixel_ratio(mut self, pixel_ratio: f64) -> Self {
        self.pixel_ratio = pixel_ratio;
        self
    }

    pub fn is_ready(&self) -> bool {
        self.width > 0.0 && self.height > 0.0
    }

    /// Backing-buffer size for high-density displays.
    pub fn backing_size(&self) -> (u32, u32) {
        let ratio = if self.pixel_ratio > 0.0 { self.pixel_ratio } else { 1.0 };
        (
            (self.width * ratio).round().max(1.0) as u32,
            (self.height * ratio).round().max(1.0) as u32,
        )
    }
}

/// Viewer preferences that survive a reload, keyed by the cache layout fingerprint.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct ViewerPreferences {
    pub fingerprint: String,
    #[serde(default)]
    pub radix: BTreeMap<String, VarFormat>,
    #[serde(default)]
    pub dimensions: BTreeMap<String, SurfaceDims>,
}

impl ViewerPreferences {
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string(self)
    }

    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }
}

// ===== UTILITY FUNCTIONS =====

pub fn generate_fingerprint<T: Hash>(value: &T) -> String {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    format!("cfg_{:x}", hasher.finish())
}
