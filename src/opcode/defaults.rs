//! Process-wide opcode specs
//!
//! Every instrument parameter the engine understands has one `const` spec
//! here. Bounds are in source units; resolution normalizes them together
//! with the value.

use super::spec::{OpcodeFlags as F, OpcodeSpec};

pub type FloatSpec = OpcodeSpec<f32>;
pub type Int32Spec = OpcodeSpec<i32>;
pub type UInt8Spec = OpcodeSpec<u8>;
pub type UInt16Spec = OpcodeSpec<u16>;
pub type UInt32Spec = OpcodeSpec<u32>;
pub type BoolSpec = OpcodeSpec<bool>;

/// Highest voice count the engine will allocate
pub const MAX_VOICES: u32 = 256;
/// Number of MIDI controllers tracked
pub const NUM_CCS: u16 = 512;
/// Number of addressable curve slots
pub const MAX_CURVES: u16 = 256;

const PERMISSIVE: F = F::PERMISSIVE_BOUNDS;

// Key and velocity ranges
pub const KEY: UInt8Spec = OpcodeSpec::new(60, (0, 127), F::CAN_BE_NOTE);
pub const LO_KEY: UInt8Spec = OpcodeSpec::new(0, (0, 127), F::CAN_BE_NOTE);
pub const HI_KEY: UInt8Spec = OpcodeSpec::new(127, (0, 127), F::CAN_BE_NOTE);
pub const LO_VEL: FloatSpec = OpcodeSpec::new(0.0, (0.0, 127.0), F::NORMALIZE_MIDI.union(PERMISSIVE));
pub const HI_VEL: FloatSpec = OpcodeSpec::new(127.0, (0.0, 127.0), F::NORMALIZE_MIDI.union(PERMISSIVE));
pub const LO_CC: FloatSpec = OpcodeSpec::new(0.0, (0.0, 127.0), F::NORMALIZE_MIDI.union(PERMISSIVE));
pub const HI_CC: FloatSpec = OpcodeSpec::new(127.0, (0.0, 127.0), F::NORMALIZE_MIDI.union(PERMISSIVE));
pub const LO_BEND: FloatSpec = OpcodeSpec::new(-8191.0, (-8192.0, 8191.0), F::NORMALIZE_BEND.union(PERMISSIVE));
pub const HI_BEND: FloatSpec = OpcodeSpec::new(8191.0, (-8192.0, 8191.0), F::NORMALIZE_BEND.union(PERMISSIVE));

// Sample playback
pub const DELAY: FloatSpec = OpcodeSpec::new(0.0, (0.0, 100.0), PERMISSIVE);
pub const OFFSET: OpcodeSpec<i64> = OpcodeSpec::new(0, (0, i32::MAX as i64), PERMISSIVE);
pub const LOOP_CROSSFADE: FloatSpec =
    OpcodeSpec::new(1e-3, (1e-3, 1.0), F::ENFORCE_LOWER_BOUND.union(F::PERMISSIVE_UPPER_BOUND));
pub const OSCILLATOR: BoolSpec = OpcodeSpec::new(false, (false, true), F::NONE);
pub const OSCILLATOR_PHASE: FloatSpec = OpcodeSpec::new(0.0, (-1000.0, 1000.0), PERMISSIVE);
pub const OSCILLATOR_MULTI: Int32Spec = OpcodeSpec::new(1, (1, 9), F::ENFORCE_BOUNDS);

// Amplitude
pub const VOLUME: FloatSpec = OpcodeSpec::new(0.0, (-144.0, 48.0), F::DB_TO_MAG.union(PERMISSIVE));
pub const AMPLITUDE: FloatSpec = OpcodeSpec::new(100.0, (0.0, 10000.0), F::NORMALIZE_PERCENT.union(PERMISSIVE));
pub const PAN: FloatSpec = OpcodeSpec::new(0.0, (-100.0, 100.0), F::NORMALIZE_PERCENT.union(PERMISSIVE));
pub const AMP_VELTRACK: FloatSpec = OpcodeSpec::new(100.0, (-100.0, 100.0), F::NORMALIZE_PERCENT.union(PERMISSIVE));

// Polyphony and controllers
pub const POLYPHONY: UInt32Spec = OpcodeSpec::new(MAX_VOICES, (0, MAX_VOICES), F::ENFORCE_BOUNDS);
pub const CC_NUMBER: UInt16Spec = OpcodeSpec::new(0, (0, NUM_CCS - 1), F::NONE);
pub const CURVE_CC: UInt16Spec = OpcodeSpec::new(0, (0, MAX_CURVES - 1), F::NONE);
pub const SUSTAIN_CC: UInt8Spec = OpcodeSpec::new(64, (0, 127), F::NONE);
pub const CHECK_SUSTAIN: BoolSpec = OpcodeSpec::new(true, (false, true), F::ENFORCE_BOUNDS);

// LFO
pub const LFO_FREQ: FloatSpec = OpcodeSpec::new(0.0, (0.0, 100.0), PERMISSIVE);
pub const LFO_PHASE: FloatSpec = OpcodeSpec::new(0.0, (0.0, 1.0), F::WRAP_PHASE.union(PERMISSIVE));

// Envelope generators
pub const EG_TIME: FloatSpec = OpcodeSpec::new(0.0, (0.0, 100.0), PERMISSIVE);
pub const EG_RELEASE: FloatSpec = OpcodeSpec::new(0.001, (0.0, 100.0), PERMISSIVE);
pub const EG_TIME_MOD: FloatSpec = OpcodeSpec::new(0.0, (-100.0, 100.0), PERMISSIVE);
pub const EG_SUSTAIN: FloatSpec = OpcodeSpec::new(100.0, (0.0, 100.0), F::NORMALIZE_PERCENT.union(PERMISSIVE));
pub const EG_PERCENT: FloatSpec = OpcodeSpec::new(0.0, (0.0, 100.0), F::NORMALIZE_PERCENT.union(PERMISSIVE));
pub const EG_PERCENT_MOD: FloatSpec = OpcodeSpec::new(0.0, (-100.0, 100.0), F::NORMALIZE_PERCENT.union(PERMISSIVE));
pub const EG_SHAPE: FloatSpec = OpcodeSpec::new(0.0, (-100.0, 100.0), PERMISSIVE);

// Curves
pub const CURVE_INDEX: UInt16Spec = OpcodeSpec::new(0, (0, MAX_CURVES - 1), F::NONE);
pub const CURVE_POINT: FloatSpec = OpcodeSpec::new(0.0, (-1.0, 1.0), PERMISSIVE);

// Effects
pub const COMP_GAIN: FloatSpec = OpcodeSpec::new(0.0, (-100.0, 100.0), F::DB_TO_MAG);
pub const APAN_PHASE: FloatSpec = OpcodeSpec::new(0.5, (0.0, 1.0), F::WRAP_PHASE);

/// Every float spec, by opcode-family name
pub const FLOAT_SPECS: &[(&str, FloatSpec)] = &[
    ("lovel", LO_VEL),
    ("hivel", HI_VEL),
    ("locc", LO_CC),
    ("hicc", HI_CC),
    ("lobend", LO_BEND),
    ("hibend", HI_BEND),
    ("delay", DELAY),
    ("loop_crossfade", LOOP_CROSSFADE),
    ("oscillator_phase", OSCILLATOR_PHASE),
    ("volume", VOLUME),
    ("amplitude", AMPLITUDE),
    ("pan", PAN),
    ("amp_veltrack", AMP_VELTRACK),
    ("lfo_freq", LFO_FREQ),
    ("lfo_phase", LFO_PHASE),
    ("eg_time", EG_TIME),
    ("eg_release", EG_RELEASE),
    ("eg_time_mod", EG_TIME_MOD),
    ("eg_sustain", EG_SUSTAIN),
    ("eg_percent", EG_PERCENT),
    ("eg_percent_mod", EG_PERCENT_MOD),
    ("eg_shape", EG_SHAPE),
    ("curve_point", CURVE_POINT),
    ("comp_gain", COMP_GAIN),
    ("apan_phase", APAN_PHASE),
];

/// Every 8-bit unsigned spec, by opcode-family name
pub const UINT8_SPECS: &[(&str, UInt8Spec)] = &[
    ("key", KEY),
    ("lokey", LO_KEY),
    ("hikey", HI_KEY),
    ("sustain_cc", SUSTAIN_CC),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_round_trip_float() {
        for (name, spec) in FLOAT_SPECS {
            let resolved = spec.resolve(&spec.default.to_string());
            assert!(resolved.valid, "{} default should parse", name);
            let expected = spec.normalized_default();
            assert!(
                (resolved.value - expected).abs() <= 1e-6 * expected.abs().max(1.0),
                "{}: {} != {}",
                name,
                resolved.value,
                expected
            );
        }
    }

    #[test]
    fn test_default_round_trip_integer() {
        for (name, spec) in UINT8_SPECS {
            let resolved = spec.resolve(&spec.default.to_string());
            assert_eq!(resolved.value, spec.normalized_default(), "{}", name);
        }
        for spec in [POLYPHONY] {
            assert_eq!(spec.resolve(&spec.default.to_string()).value, spec.default);
        }
        for spec in [CC_NUMBER, CURVE_CC, CURVE_INDEX] {
            assert_eq!(spec.resolve(&spec.default.to_string()).value, spec.default);
        }
        assert_eq!(OSCILLATOR_MULTI.resolve("1").value, 1);
        assert_eq!(OFFSET.resolve("0").value, 0);
        assert!(CHECK_SUSTAIN.resolve("true").value);
    }

    #[test]
    fn test_midi_normalization() {
        assert_eq!(HI_VEL.resolve("127").value, 1.0);
        assert_eq!(LO_CC.resolve("0").value, 0.0);
    }

    #[test]
    fn test_bend_normalization() {
        assert_eq!(LO_BEND.resolve("-8192").value, -1.0);
        let top = HI_BEND.resolve("8191").value;
        assert!(top < 1.0);
        assert!(top > 0.999);
    }

    #[test]
    fn test_key_accepts_notes() {
        assert_eq!(LO_KEY.resolve("c4").value, 60);
        assert_eq!(HI_KEY.resolve("72").value, 72);
        assert!(!HI_KEY.resolve("c11").valid);
    }

    #[test]
    fn test_enforced_polyphony() {
        assert_eq!(POLYPHONY.resolve("1000").value, MAX_VOICES);
        assert_eq!(OSCILLATOR_MULTI.resolve("0").value, 1);
        assert_eq!(OSCILLATOR_MULTI.resolve("10").value, 9);
    }

    #[test]
    fn test_permissive_passes_raw_value() {
        let r = EG_TIME.resolve("250");
        assert_eq!(r.value, 250.0);
        assert!(!r.in_range);
    }

    #[test]
    fn test_loop_crossfade_one_sided() {
        assert_eq!(LOOP_CROSSFADE.resolve("0").value, 1e-3);
        let r = LOOP_CROSSFADE.resolve("2");
        assert_eq!(r.value, 2.0);
        assert!(!r.in_range);
    }
}
