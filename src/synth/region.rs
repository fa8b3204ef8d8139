//! Regions and their amplitude envelope descriptions
//!
//! A region is built on the worker thread from resolved opcodes and is
//! read-only afterwards.

use super::MidiState;
use crate::curve::CurveSet;
use crate::opcode::defaults::{
    FloatSpec, AMPLITUDE, AMP_VELTRACK, CURVE_CC, DELAY, EG_PERCENT, EG_PERCENT_MOD, EG_RELEASE,
    EG_SHAPE, EG_SUSTAIN, EG_TIME, EG_TIME_MOD, HI_KEY, HI_VEL, KEY, LO_KEY, LO_VEL, OSCILLATOR,
    VOLUME,
};
use crate::opcode::{resolve_reporting, split_indexed, Diagnostic, DiagnosticKind};

/// A controller modulating one envelope parameter
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CcModifier {
    /// Controller number
    pub cc: u16,
    /// Contribution at full controller value
    pub amount: f32,
    /// Curve applied to the controller value
    pub curve: u16,
}

/// One envelope parameter with its velocity and controller modulation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EgParameter {
    pub base: f32,
    pub vel2: f32,
    pub cc: Vec<CcModifier>,
}

impl EgParameter {
    /// A parameter with no modulation
    pub fn constant(base: f32) -> Self {
        Self {
            base,
            ..Default::default()
        }
    }

    /// Evaluate for a note-on
    ///
    /// A sum that overflows to infinity or NaN evaluates to 0.
    pub fn evaluate(&self, curves: &CurveSet, state: &MidiState, velocity: f32) -> f32 {
        let mut value = self.base + self.vel2 * velocity;
        for modifier in &self.cc {
            let curve = curves.get_curve(modifier.curve as usize);
            value += modifier.amount * curve.eval_normalized(state.cc(modifier.cc));
        }
        if value.is_finite() {
            value
        } else {
            0.0
        }
    }

    fn modifier_mut(&mut self, cc: u16) -> &mut CcModifier {
        let position = match self.cc.iter().position(|m| m.cc == cc) {
            Some(position) => position,
            None => {
                self.cc.push(CcModifier { cc, amount: 0.0, curve: 0 });
                self.cc.len() - 1
            }
        };
        &mut self.cc[position]
    }
}

/// Resolved amplitude envelope parameters of a region
///
/// Times are in seconds, levels normalized to [0, 1].
#[derive(Debug, Clone, PartialEq)]
pub struct EnvelopeDescriptor {
    pub delay: EgParameter,
    pub attack: EgParameter,
    pub hold: EgParameter,
    pub decay: EgParameter,
    pub sustain: EgParameter,
    pub release: EgParameter,
    pub start: EgParameter,
    pub attack_shape: f32,
    pub decay_shape: f32,
    pub release_shape: f32,
}

impl Default for EnvelopeDescriptor {
    fn default() -> Self {
        Self {
            delay: EgParameter::constant(EG_TIME.normalized_default()),
            attack: EgParameter::constant(EG_TIME.normalized_default()),
            hold: EgParameter::constant(EG_TIME.normalized_default()),
            decay: EgParameter::constant(EG_TIME.normalized_default()),
            sustain: EgParameter::constant(EG_SUSTAIN.normalized_default()),
            release: EgParameter::constant(EG_RELEASE.normalized_default()),
            start: EgParameter::constant(EG_PERCENT.normalized_default()),
            attack_shape: EG_SHAPE.normalized_default(),
            decay_shape: EG_SHAPE.normalized_default(),
            release_shape: EG_SHAPE.normalized_default(),
        }
    }
}

#[derive(Clone, Copy)]
enum EgUnit {
    Time,
    Release,
    Level,
    Start,
}

impl EgUnit {
    fn base_spec(self) -> &'static FloatSpec {
        match self {
            EgUnit::Time => &EG_TIME,
            EgUnit::Release => &EG_RELEASE,
            EgUnit::Level => &EG_SUSTAIN,
            EgUnit::Start => &EG_PERCENT,
        }
    }

    fn mod_spec(self) -> &'static FloatSpec {
        match self {
            EgUnit::Time | EgUnit::Release => &EG_TIME_MOD,
            EgUnit::Level | EgUnit::Start => &EG_PERCENT_MOD,
        }
    }
}

impl EnvelopeDescriptor {
    pub fn delay(&self, curves: &CurveSet, state: &MidiState, velocity: f32) -> f32 {
        self.delay.evaluate(curves, state, velocity).max(0.0)
    }

    pub fn attack(&self, curves: &CurveSet, state: &MidiState, velocity: f32) -> f32 {
        self.attack.evaluate(curves, state, velocity).max(0.0)
    }

    pub fn hold(&self, curves: &CurveSet, state: &MidiState, velocity: f32) -> f32 {
        self.hold.evaluate(curves, state, velocity).max(0.0)
    }

    pub fn decay(&self, curves: &CurveSet, state: &MidiState, velocity: f32) -> f32 {
        self.decay.evaluate(curves, state, velocity).max(0.0)
    }

    pub fn sustain(&self, curves: &CurveSet, state: &MidiState, velocity: f32) -> f32 {
        self.sustain.evaluate(curves, state, velocity).clamp(0.0, 1.0)
    }

    pub fn release(&self, curves: &CurveSet, state: &MidiState, velocity: f32) -> f32 {
        self.release.evaluate(curves, state, velocity).max(0.0)
    }

    pub fn start(&self, curves: &CurveSet, state: &MidiState, velocity: f32) -> f32 {
        self.start.evaluate(curves, state, velocity).clamp(0.0, 1.0)
    }

    fn parameter_mut(&mut self, name: &str) -> Option<(&mut EgParameter, EgUnit)> {
        match name {
            "delay" => Some((&mut self.delay, EgUnit::Time)),
            "attack" => Some((&mut self.attack, EgUnit::Time)),
            "hold" => Some((&mut self.hold, EgUnit::Time)),
            "decay" => Some((&mut self.decay, EgUnit::Time)),
            "sustain" => Some((&mut self.sustain, EgUnit::Level)),
            "release" => Some((&mut self.release, EgUnit::Release)),
            "start" => Some((&mut self.start, EgUnit::Start)),
            _ => None,
        }
    }

    /// Apply one envelope opcode with the `ampeg_` prefix stripped
    ///
    /// Returns false when the name is not an envelope opcode.
    pub fn apply_opcode(&mut self, name: &str, opcode: &str, raw: &str, diagnostics: &mut Vec<Diagnostic>) -> bool {
        let shape = match name {
            "attack_shape" => Some(&mut self.attack_shape),
            "decay_shape" => Some(&mut self.decay_shape),
            "release_shape" => Some(&mut self.release_shape),
            _ => None,
        };
        if let Some(shape) = shape {
            *shape = resolve_reporting(&EG_SHAPE, opcode, raw, diagnostics).value;
            return true;
        }

        if let Some(param) = name.strip_prefix("vel2") {
            return match self.parameter_mut(param) {
                // No velocity modulation of the start level
                Some((_, EgUnit::Start)) | None => false,
                Some((parameter, unit)) => {
                    parameter.vel2 = resolve_reporting(unit.mod_spec(), opcode, raw, diagnostics).value;
                    true
                }
            };
        }

        if let Some((param, cc)) = split_indexed(name, "_oncc") {
            return match self.parameter_mut(param) {
                Some((parameter, unit)) => {
                    let amount = resolve_reporting(unit.mod_spec(), opcode, raw, diagnostics).value;
                    parameter.modifier_mut(cc).amount = amount;
                    true
                }
                None => false,
            };
        }

        if let Some((param, cc)) = split_indexed(name, "_curvecc") {
            return match self.parameter_mut(param) {
                Some((parameter, _)) => {
                    let curve = resolve_reporting(&CURVE_CC, opcode, raw, diagnostics).value;
                    parameter.modifier_mut(cc).curve = curve;
                    true
                }
                None => false,
            };
        }

        match self.parameter_mut(name) {
            Some((parameter, unit)) => {
                parameter.base = resolve_reporting(unit.base_spec(), opcode, raw, diagnostics).value;
                true
            }
            None => false,
        }
    }
}

/// Sample looping behaviour of a region
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoopMode {
    #[default]
    NoLoop,
    OneShot,
    LoopContinuous,
    LoopSustain,
}

impl LoopMode {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "no_loop" => Some(Self::NoLoop),
            "one_shot" => Some(Self::OneShot),
            "loop_continuous" => Some(Self::LoopContinuous),
            "loop_sustain" => Some(Self::LoopSustain),
            _ => None,
        }
    }
}

/// How one sample or oscillator is triggered and shaped
#[derive(Debug, Clone, PartialEq)]
pub struct Region {
    pub lo_key: u8,
    pub hi_key: u8,
    pub lo_vel: f32,
    pub hi_vel: f32,
    /// Start delay in seconds
    pub delay: f32,
    /// Linear gain from `volume` and `amplitude`
    pub gain: f32,
    pub amp_veltrack: f32,
    pub loop_mode: LoopMode,
    pub oscillator: bool,
    pub amp_eg: EnvelopeDescriptor,
}

impl Default for Region {
    fn default() -> Self {
        Self {
            lo_key: LO_KEY.normalized_default(),
            hi_key: HI_KEY.normalized_default(),
            lo_vel: LO_VEL.normalized_default(),
            hi_vel: HI_VEL.normalized_default(),
            delay: DELAY.normalized_default(),
            gain: VOLUME.normalized_default() * AMPLITUDE.normalized_default(),
            amp_veltrack: AMP_VELTRACK.normalized_default(),
            loop_mode: LoopMode::default(),
            oscillator: OSCILLATOR.normalized_default(),
            amp_eg: EnvelopeDescriptor::default(),
        }
    }
}

impl Region {
    /// Build a region from raw opcode/value pairs
    ///
    /// Every value is resolved against its spec. Problems and unknown
    /// opcodes are appended to `diagnostics`; the region is always usable.
    pub fn from_opcodes<'a>(
        opcodes: impl IntoIterator<Item = (&'a str, &'a str)>,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> Self {
        let mut region = Self::default();
        let mut volume = VOLUME.normalized_default();
        let mut amplitude = AMPLITUDE.normalized_default();

        for (opcode, raw) in opcodes {
            let known = match opcode {
                "key" => {
                    let key = resolve_reporting(&KEY, opcode, raw, diagnostics).value;
                    region.lo_key = key;
                    region.hi_key = key;
                    true
                }
                "lokey" => {
                    region.lo_key = resolve_reporting(&LO_KEY, opcode, raw, diagnostics).value;
                    true
                }
                "hikey" => {
                    region.hi_key = resolve_reporting(&HI_KEY, opcode, raw, diagnostics).value;
                    true
                }
                "lovel" => {
                    region.lo_vel = resolve_reporting(&LO_VEL, opcode, raw, diagnostics).value;
                    true
                }
                "hivel" => {
                    region.hi_vel = resolve_reporting(&HI_VEL, opcode, raw, diagnostics).value;
                    true
                }
                "delay" => {
                    region.delay = resolve_reporting(&DELAY, opcode, raw, diagnostics).value;
                    true
                }
                "volume" => {
                    volume = resolve_reporting(&VOLUME, opcode, raw, diagnostics).value;
                    true
                }
                "amplitude" => {
                    amplitude = resolve_reporting(&AMPLITUDE, opcode, raw, diagnostics).value;
                    true
                }
                "amp_veltrack" => {
                    region.amp_veltrack = resolve_reporting(&AMP_VELTRACK, opcode, raw, diagnostics).value;
                    true
                }
                "loop_mode" => {
                    match LoopMode::parse(raw) {
                        Some(mode) => region.loop_mode = mode,
                        None => diagnostics.push(Diagnostic::new(opcode, raw, DiagnosticKind::Invalid)),
                    }
                    true
                }
                "oscillator" => {
                    region.oscillator = if raw.trim() == "auto" {
                        false
                    } else {
                        resolve_reporting(&OSCILLATOR, opcode, raw, diagnostics).value
                    };
                    true
                }
                _ => match opcode.strip_prefix("ampeg_") {
                    Some(name) => region.amp_eg.apply_opcode(name, opcode, raw, diagnostics),
                    None => false,
                },
            };

            if !known {
                diagnostics.push(Diagnostic::new(opcode, raw, DiagnosticKind::Unknown));
            }
        }

        region.gain = volume * amplitude;
        region
    }

    /// Whether a note-on with `note` and normalized `velocity` triggers this region
    pub fn matches(&self, note: u8, velocity: f32) -> bool {
        (self.lo_key..=self.hi_key).contains(&note) && velocity >= self.lo_vel && velocity <= self.hi_vel
    }

    /// One-shot oscillator regions have no natural end, so their envelope releases by itself
    pub fn is_one_shot_oscillator(&self) -> bool {
        self.loop_mode == LoopMode::OneShot && self.oscillator
    }

    /// Gain for a note-on at normalized `velocity`, including velocity tracking
    pub fn velocity_gain(&self, velocity: f32) -> f32 {
        let track = self.amp_veltrack;
        let scale = if track >= 0.0 {
            1.0 - track * (1.0 - velocity)
        } else {
            1.0 + track * velocity
        };
        self.gain * scale.max(0.0)
    }
}
