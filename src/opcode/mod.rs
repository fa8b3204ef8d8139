//! Parameter resolution for instrument opcodes
//!
//! Raw values come from the instrument parser as text. Each opcode has a
//! process-wide spec that says how to parse, normalize and bound it.

pub mod defaults;
mod note;
mod spec;

pub use note::parse_note;
pub use spec::{read_leading_number, resolve, OpcodeFlags, OpcodeSpec, OpcodeValue, Resolved};

use std::fmt;

/// Why an opcode was not applied as written
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticKind {
    /// Unparseable or rejected; the default was used
    Invalid,
    /// Kept, but outside the spec bounds
    OutOfRange,
    /// Not an opcode this engine knows
    Unknown,
}

/// A non-fatal problem found while resolving an opcode
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub opcode: String,
    pub value: String,
    pub kind: DiagnosticKind,
}

impl Diagnostic {
    pub fn new(opcode: &str, value: &str, kind: DiagnosticKind) -> Self {
        Self {
            opcode: opcode.to_string(),
            value: value.to_string(),
            kind,
        }
    }

    /// Build a diagnostic from a resolution result, if it needs one
    pub fn check<T>(opcode: &str, value: &str, resolved: &Resolved<T>) -> Option<Self> {
        if !resolved.valid {
            Some(Self::new(opcode, value, DiagnosticKind::Invalid))
        } else if !resolved.in_range {
            Some(Self::new(opcode, value, DiagnosticKind::OutOfRange))
        } else {
            None
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let what = match self.kind {
            DiagnosticKind::Invalid => "invalid value, using default",
            DiagnosticKind::OutOfRange => "value out of range",
            DiagnosticKind::Unknown => "unknown opcode",
        };
        write!(f, "{}={}: {}", self.opcode, self.value, what)
    }
}

/// Resolve `raw` against `spec`, recording any problem in `diagnostics`
pub fn resolve_reporting<T: OpcodeValue>(
    spec: &OpcodeSpec<T>,
    opcode: &str,
    raw: &str,
    diagnostics: &mut Vec<Diagnostic>,
) -> Resolved<T> {
    let resolved = spec.resolve(raw);
    diagnostics.extend(Diagnostic::check(opcode, raw, &resolved));
    resolved
}

/// Split an opcode name with a trailing number, e.g. `ampeg_attack_oncc7`
///
/// Returns the part before `marker` and the number that
/// follows it. `split_indexed("ampeg_attack_oncc7", "_oncc")` gives
/// `Some(("ampeg_attack", 7))`.
pub fn split_indexed<'a>(name: &'a str, marker: &str) -> Option<(&'a str, u16)> {
    let at = name.rfind(marker)?;
    let digits = &name[at + marker.len()..];
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some((&name[..at], digits.parse().ok()?))
}
