//! Indexed collections of curves

use super::curve::{Curve, Interpolator, NUM_POINTS, NUM_PREDEFINED};
use crate::opcode::defaults::{CURVE_INDEX, CURVE_POINT, MAX_CURVES};
use crate::opcode::{resolve_reporting, split_indexed, Diagnostic, DiagnosticKind};
use thiserror::Error;

/// Why a curve could not be added to a set
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CurveError {
    #[error("curve index {0} is out of range (0..{max})", max = MAX_CURVES)]
    IndexOutOfRange(usize),
    #[error("implicitly indexed curve rejected: the set uses explicit indices")]
    ImplicitAfterExplicit,
}

/// A collection of curves addressed by index
///
/// Curves are numbered in insertion order until one is added with an
/// explicit index; from then on the set only accepts explicit indices.
/// Lookups never fail: a missing curve is the default identity curve.
#[derive(Debug, Clone, Default)]
pub struct CurveSet {
    curves: Vec<Option<Curve>>,
    explicit_indexing: bool,
}

impl CurveSet {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a set holding the built-in curves at indices 0..7
    pub fn predefined() -> Self {
        let mut set = Self::new();
        for index in 0..NUM_PREDEFINED {
            set.curves.push(Some(Curve::predefined(index)));
        }
        set
    }

    /// Add a curve, returning the index it was stored at
    pub fn add_curve(&mut self, curve: Curve, explicit_index: Option<usize>) -> Result<usize, CurveError> {
        match explicit_index {
            None => {
                if self.explicit_indexing {
                    return Err(CurveError::ImplicitAfterExplicit);
                }
                if self.curves.len() >= MAX_CURVES as usize {
                    return Err(CurveError::IndexOutOfRange(self.curves.len()));
                }
                self.curves.push(Some(curve));
                Ok(self.curves.len() - 1)
            }
            Some(index) => {
                if index >= MAX_CURVES as usize {
                    return Err(CurveError::IndexOutOfRange(index));
                }
                self.explicit_indexing = true;
                if self.curves.len() <= index {
                    self.curves.resize(index + 1, None);
                }
                self.curves[index] = Some(curve);
                Ok(index)
            }
        }
    }

    /// Add a curve described by `<curve>`-style opcodes
    ///
    /// Understands `curve_index` and `v000`..`v127`. Values go through the
    /// usual opcode resolution; problems are appended to `diagnostics`.
    pub fn add_curve_from_opcodes<'a>(
        &mut self,
        opcodes: impl IntoIterator<Item = (&'a str, &'a str)>,
        interpolator: Interpolator,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> Result<usize, CurveError> {
        let mut explicit_index = None;
        let mut points = Vec::new();

        for (name, value) in opcodes {
            if name == "curve_index" {
                let resolved = resolve_reporting(&CURVE_INDEX, name, value, diagnostics);
                if resolved.valid {
                    explicit_index = Some(resolved.value as usize);
                }
                continue;
            }

            match split_indexed(name, "v") {
                Some(("", index)) if (index as usize) < NUM_POINTS => {
                    let resolved = resolve_reporting(&CURVE_POINT, name, value, diagnostics);
                    if resolved.valid {
                        points.push((index as usize, resolved.value));
                    }
                }
                _ => diagnostics.push(Diagnostic::new(name, value, DiagnosticKind::Unknown)),
            }
        }

        let curve = Curve::from_points(&points, interpolator, false);
        self.add_curve(curve, explicit_index)
    }

    /// Look up a curve; missing curves fall back to the identity curve
    pub fn get_curve(&self, index: usize) -> &Curve {
        self.curves
            .get(index)
            .and_then(|slot| slot.as_ref())
            .unwrap_or_else(|| Curve::default_curve())
    }

    /// Number of index slots (populated or not)
    pub fn len(&self) -> usize {
        self.curves.len()
    }

    /// Check if the set has no slots
    pub fn is_empty(&self) -> bool {
        self.curves.is_empty()
    }

    /// Number of populated slots
    pub fn num_curves(&self) -> usize {
        self.curves.iter().filter(|c| c.is_some()).count()
    }

    /// Populated slots with their indices
    pub fn iter(&self) -> impl Iterator<Item = (usize, &Curve)> {
        self.curves
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| slot.as_ref().map(|curve| (index, curve)))
    }

    /// Whether the set switched to explicit indexing
    pub fn uses_explicit_indexing(&self) -> bool {
        self.explicit_indexing
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_curve_is_identity() {
        let set = CurveSet::new();
        let curve = set.get_curve(9999);
        for x in [0.0f32, 0.3, 0.5, 1.0] {
            assert!((curve.eval_normalized(x) - x).abs() < 1e-6);
        }
    }

    #[test]
    fn test_predefined_set() {
        let set = CurveSet::predefined();
        assert_eq!(set.len(), NUM_PREDEFINED);
        assert_eq!(set.get_curve(1).eval_cc7(0), -1.0);
        assert!(!set.uses_explicit_indexing());
    }

    #[test]
    fn test_sequential_indexing() {
        let mut set = CurveSet::new();
        assert_eq!(set.add_curve(Curve::bipolar(1.0, 0.0), None), Ok(0));
        assert_eq!(set.add_curve(Curve::bipolar(0.5, 0.5), None), Ok(1));
        assert_eq!(set.get_curve(1).eval_cc7(64), 0.5);
    }

    #[test]
    fn test_explicit_indexing_leaves_gaps() {
        let mut set = CurveSet::new();
        assert_eq!(set.add_curve(Curve::bipolar(1.0, 0.0), Some(10)), Ok(10));
        assert!(set.uses_explicit_indexing());
        assert_eq!(set.len(), 11);
        assert_eq!(set.num_curves(), 1);
        assert_eq!(set.iter().map(|(i, _)| i).collect::<Vec<_>>(), vec![10]);
        // Unpopulated slot falls back to identity
        assert_eq!(set.get_curve(5), Curve::default_curve());
        assert_eq!(set.get_curve(10).eval_cc7(0), 1.0);
    }

    #[test]
    fn test_implicit_rejected_after_explicit() {
        let mut set = CurveSet::new();
        set.add_curve(Curve::default(), Some(2)).unwrap();
        assert_eq!(
            set.add_curve(Curve::default(), None),
            Err(CurveError::ImplicitAfterExplicit)
        );
    }

    #[test]
    fn test_explicit_index_out_of_range() {
        let mut set = CurveSet::new();
        assert_eq!(
            set.add_curve(Curve::default(), Some(256)),
            Err(CurveError::IndexOutOfRange(256))
        );
        assert!(!set.uses_explicit_indexing());
    }

    #[test]
    fn test_curve_from_opcodes() {
        let mut set = CurveSet::predefined();
        let mut diagnostics = Vec::new();
        let opcodes = [
            ("curve_index", "17"),
            ("v000", "1"),
            ("v127", "0"),
            ("v063", "oops"),
            ("color", "red"),
        ];
        let index = set
            .add_curve_from_opcodes(opcodes, Interpolator::Linear, &mut diagnostics)
            .unwrap();
        assert_eq!(index, 17);
        assert_eq!(set.get_curve(17).eval_cc7(0), 1.0);
        assert_eq!(set.get_curve(17).eval_cc7(127), 0.0);
        assert_eq!(diagnostics.len(), 2);
        assert_eq!(diagnostics[0].kind, DiagnosticKind::Invalid);
        assert_eq!(diagnostics[1].kind, DiagnosticKind::Unknown);
    }
}
