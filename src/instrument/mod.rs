//! Instrument snapshots
//!
//! An `Instrument` is built on the worker thread from a definition file and
//! then shared read-only with the audio thread as an `Arc`. Reloading builds
//! a whole new snapshot; nothing inside one is ever mutated.

mod error;
mod file;
mod tuning;

pub use error::LoadError;
pub use file::{InstrumentFile, OpcodeList};
pub use tuning::{Tuning, ROOT_KEY};

use crate::curve::{CurveError, CurveSet};
use crate::opcode::Diagnostic;
use crate::synth::Region;
use std::path::{Path, PathBuf};

/// A loaded instrument: its regions and curves
#[derive(Debug, Clone)]
pub struct Instrument {
    path: Option<PathBuf>,
    regions: Vec<Region>,
    curves: CurveSet,
    diagnostics: Vec<Diagnostic>,
    rejected_curves: Vec<(usize, CurveError)>,
}

impl Default for Instrument {
    fn default() -> Self {
        Self::empty()
    }
}

impl Instrument {
    /// An instrument with no regions and the built-in curves
    pub fn empty() -> Self {
        Self {
            path: None,
            regions: Vec::new(),
            curves: CurveSet::predefined(),
            diagnostics: Vec::new(),
            rejected_curves: Vec::new(),
        }
    }

    /// Load an instrument definition file
    pub fn from_file(path: &Path) -> Result<Self, LoadError> {
        if !path.is_file() {
            return Err(LoadError::NotAFile {
                path: path.to_path_buf(),
            });
        }
        let text = std::fs::read_to_string(path)?;
        let mut instrument = Self::from_yaml_str(&text)?;
        instrument.path = Some(path.to_path_buf());
        Ok(instrument)
    }

    /// Build an instrument from the text of a definition file
    ///
    /// Bad values never fail the load: they resolve to defaults and are
    /// collected in [`Instrument::diagnostics`].
    pub fn from_yaml_str(text: &str) -> Result<Self, LoadError> {
        let file: InstrumentFile = serde_yaml::from_str(text)?;
        Ok(Self::from_definition(&file))
    }

    /// Resolve every header of a parsed definition
    pub fn from_definition(file: &InstrumentFile) -> Self {
        let mut instrument = Self::empty();
        let diagnostics = &mut instrument.diagnostics;

        for (position, mapping) in file.curves.iter().enumerate() {
            let mut opcodes = OpcodeList::from_mapping(mapping, diagnostics);
            let interpolator = opcodes.take_interpolator(diagnostics);
            if let Err(e) = instrument
                .curves
                .add_curve_from_opcodes(opcodes.iter(), interpolator, diagnostics)
            {
                instrument.rejected_curves.push((position, e));
            }
        }

        let global = OpcodeList::from_mapping(&file.global, diagnostics);
        for mapping in &file.regions {
            let mut opcodes = OpcodeList::from_mapping(mapping, diagnostics);
            opcodes.inherit(&global);
            instrument.regions.push(Region::from_opcodes(opcodes.iter(), diagnostics));
        }

        instrument
    }

    /// File the instrument was loaded from
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    pub fn curves(&self) -> &CurveSet {
        &self.curves
    }

    /// Resolution problems found while loading
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Curve headers that could not be added, by position in the file
    pub fn rejected_curves(&self) -> &[(usize, CurveError)] {
        &self.rejected_curves
    }

    /// Regions triggered by a note-on
    pub fn regions_for(&self, note: u8, velocity: f32) -> impl Iterator<Item = &Region> {
        self.regions.iter().filter(move |r| r.matches(note, velocity))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opcode::DiagnosticKind;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const PIANO: &str = r#"
global:
  ampeg_release: 0.4
curves:
  - curve_index: 9
    interpolator: spline
    v000: 0
    v064: 0.8
    v127: 1
  - v000: 1
regions:
  - lokey: c2
    hikey: b3
    ampeg_attack: 0.01
    ampeg_attack_oncc1: 0.5
    ampeg_attack_curvecc1: 9
  - lokey: c4
    hikey: c6
    ampeg_release: 1.5
    ampeg_sustain: lots
"#;

    #[test]
    fn test_empty_instrument() {
        let instrument = Instrument::empty();
        assert!(instrument.regions().is_empty());
        assert_eq!(instrument.curves().len(), 7);
        assert!(instrument.path().is_none());
    }

    #[test]
    fn test_load_definition() {
        let instrument = Instrument::from_yaml_str(PIANO).unwrap();
        assert_eq!(instrument.regions().len(), 2);

        let low = &instrument.regions()[0];
        assert_eq!(low.lo_key, 36);
        assert_eq!(low.amp_eg.release.base, 0.4);
        assert_eq!(low.amp_eg.attack.cc[0].curve, 9);

        let high = &instrument.regions()[1];
        assert_eq!(high.amp_eg.release.base, 1.5);
        assert_eq!(high.amp_eg.sustain.base, 1.0);

        assert!((instrument.curves().get_curve(9).eval_cc7(64) - 0.8).abs() < 1e-6);
        assert_eq!(instrument.rejected_curves().len(), 1);
        assert_eq!(instrument.rejected_curves()[0].0, 1);

        assert_eq!(instrument.diagnostics().len(), 1);
        assert_eq!(instrument.diagnostics()[0].opcode, "ampeg_sustain");
        assert_eq!(instrument.diagnostics()[0].kind, DiagnosticKind::Invalid);
    }

    #[test]
    fn test_regions_for_note() {
        let instrument = Instrument::from_yaml_str(PIANO).unwrap();
        assert_eq!(instrument.regions_for(40, 0.5).count(), 1);
        assert_eq!(instrument.regions_for(90, 0.5).count(), 0);
    }

    #[test]
    fn test_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(PIANO.as_bytes()).unwrap();
        let instrument = Instrument::from_file(file.path()).unwrap();
        assert_eq!(instrument.path(), Some(file.path()));
    }

    #[test]
    fn test_syntax_error() {
        let err = Instrument::from_yaml_str("regions: [").unwrap_err();
        assert!(matches!(err, LoadError::Yaml(_)));
    }

    #[test]
    fn test_missing_file() {
        let err = Instrument::from_file(Path::new("/nonexistent/piano.yaml")).unwrap_err();
        assert!(matches!(err, LoadError::NotAFile { .. }));
    }
}
