//! Opcode specs and value resolution
//!
//! An `OpcodeSpec` describes the default, bounds and policy of one
//! instrument parameter. `resolve` turns a raw textual value into a
//! validated runtime value according to that spec.

use super::note::parse_note;
use std::fmt::Debug;
use std::ops::BitOr;

/// Policy flags for an opcode spec
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OpcodeFlags(u32);

impl OpcodeFlags {
    pub const NONE: Self = Self(0);
    /// Accept note names (`c4`, `f#2`) in addition to numbers
    pub const CAN_BE_NOTE: Self = Self(1 << 0);
    /// Clamp values below the lower bound
    pub const ENFORCE_LOWER_BOUND: Self = Self(1 << 1);
    /// Clamp values above the upper bound
    pub const ENFORCE_UPPER_BOUND: Self = Self(1 << 2);
    /// Clamp to both bounds
    pub const ENFORCE_BOUNDS: Self = Self((1 << 1) | (1 << 2));
    /// Keep values below the lower bound, flagged out of range
    pub const PERMISSIVE_LOWER_BOUND: Self = Self(1 << 3);
    /// Keep values above the upper bound, flagged out of range
    pub const PERMISSIVE_UPPER_BOUND: Self = Self(1 << 4);
    /// Keep out-of-range values on both sides
    pub const PERMISSIVE_BOUNDS: Self = Self((1 << 3) | (1 << 4));
    /// Divide by 100
    pub const NORMALIZE_PERCENT: Self = Self(1 << 5);
    /// Divide by 127
    pub const NORMALIZE_MIDI: Self = Self(1 << 6);
    /// Divide by 8192, mapping [-8192, 8191] onto [-1, 1)
    pub const NORMALIZE_BEND: Self = Self(1 << 7);
    /// Convert decibels to linear magnitude
    pub const DB_TO_MAG: Self = Self(1 << 8);
    /// Wrap into [0, 1)
    pub const WRAP_PHASE: Self = Self(1 << 9);

    /// Check whether every flag in `other` is set
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Check whether any flag in `other` is set
    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    /// Const-friendly union
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }
}

impl BitOr for OpcodeFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

/// Value types an opcode can resolve to
pub trait OpcodeValue: Copy + PartialOrd + Debug {
    /// Convert from the internal resolution domain
    fn from_f64(value: f64) -> Self;

    /// Convert into the internal resolution domain
    fn to_f64(self) -> f64;

    /// Parse a keyword that is not a number (e.g. `on`)
    fn from_keyword(_word: &str) -> Option<Self> {
        None
    }
}

macro_rules! integer_opcode_value {
    ($($ty:ty),*) => {
        $(
            impl OpcodeValue for $ty {
                fn from_f64(value: f64) -> Self {
                    // `as` saturates, and truncates toward zero like a leading-int read
                    value as $ty
                }

                fn to_f64(self) -> f64 {
                    self as f64
                }
            }
        )*
    };
}

integer_opcode_value!(i8, i16, i32, i64, u8, u16, u32);

impl OpcodeValue for f32 {
    fn from_f64(value: f64) -> Self {
        value as f32
    }

    fn to_f64(self) -> f64 {
        self as f64
    }
}

impl OpcodeValue for bool {
    fn from_f64(value: f64) -> Self {
        value != 0.0
    }

    fn to_f64(self) -> f64 {
        if self { 1.0 } else { 0.0 }
    }

    fn from_keyword(word: &str) -> Option<Self> {
        match word.to_ascii_lowercase().as_str() {
            "on" | "true" | "yes" => Some(true),
            "off" | "false" | "no" => Some(false),
            _ => None,
        }
    }
}

/// Default, bounds and policy of one instrument parameter
#[derive(Debug, Clone, Copy)]
pub struct OpcodeSpec<T> {
    /// Default value, in source units
    pub default: T,
    /// Inclusive bounds, in source units
    pub bounds: (T, T),
    /// Normalization and bounds policy
    pub flags: OpcodeFlags,
}

/// Result of resolving a raw value against a spec
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Resolved<T> {
    /// The runtime value
    pub value: T,
    /// False when the raw value could not be used and the default was substituted
    pub valid: bool,
    /// False when a permissive policy let an out-of-range value through
    pub in_range: bool,
}

impl<T> Resolved<T> {
    /// Check whether the value can be used without a diagnostic
    pub fn is_clean(&self) -> bool {
        self.valid && self.in_range
    }
}

impl<T: OpcodeValue> OpcodeSpec<T> {
    /// Create a spec
    pub const fn new(default: T, bounds: (T, T), flags: OpcodeFlags) -> Self {
        Self { default, bounds, flags }
    }

    /// The default value in runtime units
    pub fn normalized_default(&self) -> T {
        T::from_f64(self.normalize(self.default.to_f64()))
    }

    /// The bounds in runtime units
    pub fn normalized_bounds(&self) -> (T, T) {
        let (lo, hi) = self.normalized_bounds_f64();
        (T::from_f64(lo), T::from_f64(hi))
    }

    fn normalized_bounds_f64(&self) -> (f64, f64) {
        if self.flags.contains(OpcodeFlags::WRAP_PHASE) {
            return (0.0, 1.0);
        }
        let lo = self.normalize(self.bounds.0.to_f64());
        let hi = self.normalize(self.bounds.1.to_f64());
        (lo.min(hi), lo.max(hi))
    }

    /// Apply the spec's unit normalization to a source-unit value
    pub fn normalize(&self, value: f64) -> f64 {
        let flags = self.flags;
        let mut value = value;
        if flags.contains(OpcodeFlags::NORMALIZE_PERCENT) {
            value /= 100.0;
        }
        if flags.contains(OpcodeFlags::NORMALIZE_MIDI) {
            value /= 127.0;
        }
        if flags.contains(OpcodeFlags::NORMALIZE_BEND) {
            value /= 8192.0;
        }
        if flags.contains(OpcodeFlags::DB_TO_MAG) {
            value = 10f64.powf(value / 20.0);
        }
        if flags.contains(OpcodeFlags::WRAP_PHASE) {
            value = value.rem_euclid(1.0);
            // rem_euclid can round up to exactly 1.0 for tiny negative inputs
            if value >= 1.0 {
                value = 0.0;
            }
        }
        value
    }

    fn fallback(&self) -> Resolved<T> {
        Resolved {
            value: self.normalized_default(),
            valid: false,
            in_range: true,
        }
    }

    /// Resolve a raw textual value
    pub fn resolve(&self, raw: &str) -> Resolved<T> {
        let raw = raw.trim();

        if let Some(value) = T::from_keyword(raw) {
            return self.resolve_number(value.to_f64());
        }

        let parsed = if self.flags.contains(OpcodeFlags::CAN_BE_NOTE) {
            parse_note(raw).map(f64::from).or_else(|| read_leading_number(raw))
        } else {
            read_leading_number(raw)
        };

        match parsed {
            Some(value) => self.resolve_number(value),
            None => self.fallback(),
        }
    }

    /// Resolve an already-numeric value given in source units
    pub fn resolve_number(&self, value: f64) -> Resolved<T> {
        if !value.is_finite() {
            return self.fallback();
        }

        let value = self.normalize(value);
        if !value.is_finite() {
            return self.fallback();
        }

        let (lo, hi) = self.normalized_bounds_f64();
        let flags = self.flags;
        let mut in_range = true;

        let value = if value < lo {
            if flags.contains(OpcodeFlags::ENFORCE_LOWER_BOUND) {
                lo
            } else if flags.contains(OpcodeFlags::PERMISSIVE_LOWER_BOUND) {
                in_range = false;
                value
            } else {
                return self.fallback();
            }
        } else if value > hi {
            if flags.contains(OpcodeFlags::ENFORCE_UPPER_BOUND) {
                hi
            } else if flags.contains(OpcodeFlags::PERMISSIVE_UPPER_BOUND) {
                in_range = false;
                value
            } else {
                return self.fallback();
            }
        } else {
            value
        };

        // A finite f64 can still overflow the target type
        let value = T::from_f64(value);
        if !value.to_f64().is_finite() {
            return self.fallback();
        }

        Resolved {
            value,
            valid: true,
            in_range,
        }
    }
}

/// Free-function form of [`OpcodeSpec::resolve`]
pub fn resolve<T: OpcodeValue>(raw: &str, spec: &OpcodeSpec<T>) -> Resolved<T> {
    spec.resolve(raw)
}

/// Read the longest numeric prefix of `text`
///
/// Accepts an optional sign, digits, a fractional part and an exponent.
/// Trailing characters after the number are ignored.
pub fn read_leading_number(text: &str) -> Option<f64> {
    let bytes = text.as_bytes();
    let mut end = 0;

    if end < bytes.len() && (bytes[end] == b'+' || bytes[end] == b'-') {
        end += 1;
    }

    let int_start = end;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    let mut digits = end - int_start;

    if end < bytes.len() && bytes[end] == b'.' {
        let frac_start = end + 1;
        let mut frac_end = frac_start;
        while frac_end < bytes.len() && bytes[frac_end].is_ascii_digit() {
            frac_end += 1;
        }
        digits += frac_end - frac_start;
        end = frac_end;
    }

    if digits == 0 {
        return None;
    }

    if end < bytes.len() && (bytes[end] == b'e' || bytes[end] == b'E') {
        let mut exp_end = end + 1;
        if exp_end < bytes.len() && (bytes[exp_end] == b'+' || bytes[exp_end] == b'-') {
            exp_end += 1;
        }
        let exp_digits_start = exp_end;
        while exp_end < bytes.len() && bytes[exp_end].is_ascii_digit() {
            exp_end += 1;
        }
        if exp_end > exp_digits_start {
            end = exp_end;
        }
    }

    text[..end].parse().ok()
}
