//! YAML instrument definitions
//!
//! ```yaml
//! global:
//!   ampeg_release: 0.3
//! curves:
//!   - curve_index: 7
//!     interpolator: spline
//!     v000: 0
//!     v064: 0.8
//!     v127: 1
//! regions:
//!   - lokey: c3
//!     hikey: b4
//!     ampeg_attack: 0.01
//!     ampeg_attack_oncc1: 0.5
//!     ampeg_attack_curvecc1: 7
//! ```
//!
//! Values stay textual until they reach parameter resolution, so a YAML
//! number and a quoted string are treated the same.

use crate::curve::Interpolator;
use crate::opcode::{Diagnostic, DiagnosticKind};
use serde::Deserialize;
use serde_yaml::{Mapping, Value};

/// Raw contents of an instrument file
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InstrumentFile {
    /// Opcodes applied to every region before its own
    #[serde(default)]
    pub global: Mapping,

    /// `<curve>`-style opcode maps
    #[serde(default)]
    pub curves: Vec<Mapping>,

    /// Region opcode maps
    #[serde(default)]
    pub regions: Vec<Mapping>,
}

/// Opcodes of one header as text pairs, in file order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OpcodeList {
    pub opcodes: Vec<(String, String)>,
}

impl OpcodeList {
    /// Flatten a YAML mapping
    ///
    /// Non-scalar values and non-string keys are reported and skipped.
    pub fn from_mapping(mapping: &Mapping, diagnostics: &mut Vec<Diagnostic>) -> Self {
        let mut opcodes = Vec::with_capacity(mapping.len());
        for (key, value) in mapping {
            let Some(name) = scalar_text(key) else {
                diagnostics.push(Diagnostic::new("?", "", DiagnosticKind::Unknown));
                continue;
            };
            match scalar_text(value) {
                Some(text) => opcodes.push((name, text)),
                None => diagnostics.push(Diagnostic::new(&name, "", DiagnosticKind::Invalid)),
            }
        }
        Self { opcodes }
    }

    /// Prepend `other`, so that our own opcodes override it
    pub fn inherit(&mut self, other: &OpcodeList) {
        let mut merged = other.opcodes.clone();
        merged.append(&mut self.opcodes);
        self.opcodes = merged;
    }

    /// Remove the `interpolator` entry of a curve header
    pub fn take_interpolator(&mut self, diagnostics: &mut Vec<Diagnostic>) -> Interpolator {
        let mut interpolator = Interpolator::default();
        self.opcodes.retain(|(name, value)| {
            if name != "interpolator" {
                return true;
            }
            match value.trim() {
                "linear" => interpolator = Interpolator::Linear,
                "spline" => interpolator = Interpolator::Spline,
                _ => diagnostics.push(Diagnostic::new(name, value, DiagnosticKind::Invalid)),
            }
            false
        });
        interpolator
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.opcodes.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(true) => Some("on".to_string()),
        Value::Bool(false) => Some("off".to_string()),
        _ => None,
    }
}
