//! Amplitude envelope generator
//!
//! A per-voice state machine rendered a block at a time:
//! Delay, Attack, Hold, Decay, Sustain, Release, a short Fadeout to
//! silence, then Done. Segment progress is tracked by normalized counters
//! and the curve of each segment is bent by its shape parameter.

use super::region::EnvelopeDescriptor;
use super::MidiState;
use crate::curve::CurveSet;

/// Sustain levels at or below this make the envelope release by itself
pub const SUSTAIN_FREE_RUNNING_THRESHOLD: f32 = 0.0032;
/// Release ends and the fadeout starts once the value falls to this level
pub const RELEASE_THRESHOLD: f32 = 1e-4;
/// Length of the final fadeout, in seconds
pub const TRANSITION_TIME: f32 = 0.01;
/// Shortest decay or release time, in seconds
pub const MIN_EXP_TIME: f32 = 25e-3;

const VIRTUALLY_ZERO: f32 = 1e-5;

/// Envelope stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeState {
    Delay,
    Attack,
    Hold,
    Decay,
    Sustain,
    Release,
    Fadeout,
    Done,
}

/// Envelope generator
#[derive(Debug, Clone)]
pub struct Envelope {
    sample_rate: f32,
    state: EnvelopeState,
    value: f32,

    delay: usize,
    hold: usize,
    attack_step: f32,
    decay_rate: f32,
    release_rate: f32,
    start: f32,
    sustain: f32,
    attack_shape: f32,
    decay_shape: f32,
    release_shape: f32,

    attack_count: f32,
    decay_count: f32,
    release_count: f32,
    release_value: f32,
    fadeout_delta: f32,

    free_running: bool,
    should_release: bool,
    release_delay: Option<usize>,
}

impl Default for Envelope {
    fn default() -> Self {
        Self::new()
    }
}

/// Exponent of the rising attack curve
fn rise_exponent(shape: f32) -> f32 {
    if shape <= 0.0 {
        -shape + 1.0
    } else {
        1.0 / shape + 1.0
    }
}

/// Exponent of the falling decay and release curves
fn fall_exponent(shape: f32) -> f32 {
    if shape <= 0.0 {
        -shape + 1.0
    } else {
        1.0 / (shape + 1.0)
    }
}

impl Envelope {
    /// Create an idle envelope
    pub fn new() -> Self {
        Self {
            sample_rate: 48_000.0,
            state: EnvelopeState::Done,
            value: 0.0,
            delay: 0,
            hold: 0,
            attack_step: 1.0,
            decay_rate: 1.0,
            release_rate: 1.0,
            start: 0.0,
            sustain: 1.0,
            attack_shape: 0.0,
            decay_shape: 0.0,
            release_shape: 0.0,
            attack_count: 0.0,
            decay_count: 0.0,
            release_count: 0.0,
            release_value: 0.0,
            fadeout_delta: 0.0,
            free_running: false,
            should_release: false,
            release_delay: None,
        }
    }

    // Casts saturate, so a huge time becomes usize::MAX samples
    fn seconds_to_samples(&self, seconds: f32) -> usize {
        if seconds.is_nan() || seconds <= 0.0 {
            return 0;
        }
        (seconds * self.sample_rate) as usize
    }

    fn seconds_to_lin_rate(&self, seconds: f32) -> f32 {
        if seconds.is_nan() || seconds <= 0.0 {
            return 1.0;
        }
        1.0 / (self.sample_rate * seconds)
    }

    fn seconds_to_exp_rate(&self, seconds: f32) -> f32 {
        if seconds.is_nan() || seconds <= 0.0 {
            return 1.0;
        }
        1.0 / (self.sample_rate * seconds.max(MIN_EXP_TIME))
    }

    /// Prepare the envelope for a new note
    ///
    /// `trigger_delay` is the offset of the note-on inside the current
    /// block, in samples. `free_running` marks regions with no natural
    /// end (one-shot oscillators), which release as soon as they sustain.
    #[allow(clippy::too_many_arguments)]
    pub fn reset(
        &mut self,
        descriptor: &EnvelopeDescriptor,
        curves: &CurveSet,
        midi: &MidiState,
        trigger_delay: usize,
        velocity: f32,
        sample_rate: f32,
        free_running: bool,
    ) {
        self.sample_rate = sample_rate;

        let delay = self.seconds_to_samples(descriptor.delay(curves, midi, velocity));
        self.delay = trigger_delay.saturating_add(delay);
        self.attack_step = self.seconds_to_lin_rate(descriptor.attack(curves, midi, velocity));
        self.hold = self.seconds_to_samples(descriptor.hold(curves, midi, velocity));
        self.decay_rate = self.seconds_to_exp_rate(descriptor.decay(curves, midi, velocity));
        self.release_rate = self.seconds_to_exp_rate(descriptor.release(curves, midi, velocity));
        self.sustain = descriptor.sustain(curves, midi, velocity);
        self.start = descriptor.start(curves, midi, velocity);
        self.attack_shape = descriptor.attack_shape;
        self.decay_shape = descriptor.decay_shape;
        self.release_shape = descriptor.release_shape;

        self.attack_count = 0.0;
        self.decay_count = 1.0;
        self.release_count = 1.0;
        self.release_value = 0.0;
        self.fadeout_delta = 0.0;

        self.free_running = free_running || self.sustain <= SUSTAIN_FREE_RUNNING_THRESHOLD;
        self.should_release = false;
        self.release_delay = None;
        self.value = self.start;
        self.state = EnvelopeState::Delay;
    }

    /// Release the envelope `delay` samples into the next rendered block
    pub fn start_release(&mut self, delay: usize) {
        self.should_release = true;
        self.release_delay = Some(delay);
    }

    /// Change the release time of a playing envelope
    pub fn set_release_time(&mut self, seconds: f32) {
        self.release_rate = self.seconds_to_exp_rate(seconds);
    }

    /// Whether the envelope still produces output
    pub fn is_smoothing(&self) -> bool {
        self.state != EnvelopeState::Done
    }

    /// Whether a release has been requested or is underway
    pub fn is_released(&self) -> bool {
        self.should_release || matches!(self.state, EnvelopeState::Release | EnvelopeState::Fadeout)
    }

    /// Samples left in the delay stage
    pub fn remaining_delay(&self) -> usize {
        self.delay
    }

    pub fn state(&self) -> EnvelopeState {
        self.state
    }

    /// Value of the last rendered sample
    pub fn value(&self) -> f32 {
        self.value
    }

    fn enter_release(&mut self) {
        if matches!(
            self.state,
            EnvelopeState::Release | EnvelopeState::Fadeout | EnvelopeState::Done
        ) {
            return;
        }
        self.release_value = if self.value < VIRTUALLY_ZERO {
            self.sustain
        } else {
            self.value
        };
        self.release_count = 1.0;
        self.state = EnvelopeState::Release;
    }

    fn enter_fadeout(&mut self) {
        self.state = EnvelopeState::Fadeout;
        self.fadeout_delta = -self.value.max(RELEASE_THRESHOLD) / (self.sample_rate * TRANSITION_TIME);
    }

    /// Render the next `output.len()` samples
    pub fn get_block(&mut self, output: &mut [f32]) {
        let mut offset = 0;

        while offset < output.len() {
            let mut size = output.len() - offset;

            if self.should_release {
                match self.release_delay {
                    Some(0) => {
                        self.enter_release();
                        self.release_delay = None;
                    }
                    Some(remaining) => size = size.min(remaining),
                    None => {}
                }
            }

            let count = self.render_segment(&mut output[offset..offset + size]);

            if let Some(remaining) = self.release_delay {
                self.release_delay = Some(remaining.saturating_sub(count));
            }
            offset += count;
        }

        debug_assert!(output.iter().all(|v| v.is_finite()), "envelope produced a non-finite sample");
        for sample in output.iter_mut() {
            if !sample.is_finite() {
                *sample = 0.0;
            }
        }
        if !self.value.is_finite() {
            self.value = 0.0;
        }
    }

    /// Render within the current state; returns the number of samples written
    ///
    /// May return 0 when the state changes without producing output.
    fn render_segment(&mut self, output: &mut [f32]) -> usize {
        let size = output.len();
        let mut count = 0;

        match self.state {
            EnvelopeState::Delay => {
                while count < size && self.delay > 0 {
                    self.value = self.start;
                    output[count] = self.value;
                    self.delay -= 1;
                    count += 1;
                }
                if self.delay == 0 {
                    self.attack_count = 0.0;
                    self.state = EnvelopeState::Attack;
                }
            }
            EnvelopeState::Attack => {
                let exponent = rise_exponent(self.attack_shape);
                while count < size && self.attack_count < 1.0 {
                    self.attack_count = (self.attack_count + self.attack_step).min(1.0);
                    self.value = self.start + (1.0 - self.start) * self.attack_count.powf(exponent);
                    output[count] = self.value;
                    count += 1;
                }
                if self.attack_count >= 1.0 {
                    self.value = 1.0;
                    self.state = EnvelopeState::Hold;
                }
            }
            EnvelopeState::Hold => {
                while count < size && self.hold > 0 {
                    output[count] = self.value;
                    self.hold -= 1;
                    count += 1;
                }
                if self.hold == 0 {
                    self.decay_count = if self.sustain < 1.0 { 1.0 } else { 0.0 };
                    self.state = EnvelopeState::Decay;
                }
            }
            EnvelopeState::Decay => {
                let exponent = fall_exponent(self.decay_shape);
                while count < size && self.decay_count > 0.0 {
                    self.decay_count = (self.decay_count - self.decay_rate).max(0.0);
                    self.value = self.sustain + (1.0 - self.sustain) * self.decay_count.powf(exponent);
                    output[count] = self.value;
                    count += 1;
                }
                if self.decay_count <= 0.0 {
                    self.value = self.sustain;
                    self.state = EnvelopeState::Sustain;
                }
            }
            EnvelopeState::Sustain => {
                if self.free_running && !self.should_release {
                    self.start_release(0);
                    return 0;
                }
                self.value = self.sustain;
                output.fill(self.value);
                count = size;
            }
            EnvelopeState::Release => {
                let exponent = fall_exponent(self.release_shape);
                while count < size {
                    self.release_count = (self.release_count - self.release_rate).max(0.0);
                    let next = self.release_value * self.release_count.powf(exponent);
                    if next <= RELEASE_THRESHOLD || self.release_count <= 0.0 {
                        self.enter_fadeout();
                        break;
                    }
                    self.value = next;
                    output[count] = self.value;
                    count += 1;
                }
            }
            EnvelopeState::Fadeout => {
                while count < size {
                    self.value += self.fadeout_delta;
                    if self.value.is_nan() || self.value <= 0.0 {
                        self.value = 0.0;
                        self.state = EnvelopeState::Done;
                        break;
                    }
                    output[count] = self.value;
                    count += 1;
                }
            }
            EnvelopeState::Done => {
                self.value = 0.0;
                output.fill(0.0);
                count = size;
            }
        }

        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synth::region::EgParameter;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    const SAMPLE_RATE: f32 = 8000.0;

    fn descriptor(attack: f32, decay: f32, sustain: f32, release: f32) -> EnvelopeDescriptor {
        EnvelopeDescriptor {
            attack: EgParameter::constant(attack),
            decay: EgParameter::constant(decay),
            sustain: EgParameter::constant(sustain),
            release: EgParameter::constant(release),
            ..Default::default()
        }
    }

    fn started(desc: &EnvelopeDescriptor, free_running: bool) -> Envelope {
        let mut env = Envelope::new();
        env.reset(desc, &CurveSet::predefined(), &MidiState::new(), 0, 1.0, SAMPLE_RATE, free_running);
        env
    }

    fn render(env: &mut Envelope, samples: usize) -> Vec<f32> {
        let mut out = vec![0.0; samples];
        env.get_block(&mut out);
        out
    }

    #[test]
    fn test_new_envelope_is_done() {
        let mut env = Envelope::new();
        assert_eq!(env.state(), EnvelopeState::Done);
        assert!(!env.is_smoothing());
        assert!(render(&mut env, 16).iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_instant_envelope() {
        let mut env = started(&descriptor(0.0, 0.0, 1.0, 0.1), false);
        assert_eq!(env.remaining_delay(), 0);
        let out = render(&mut env, 4);
        assert!((out[0] - 1.0).abs() < 1e-6);
        assert_eq!(env.state(), EnvelopeState::Sustain);
    }

    #[test]
    fn test_delay_holds_start() {
        let desc = EnvelopeDescriptor {
            delay: EgParameter::constant(0.001),
            start: EgParameter::constant(0.25),
            attack: EgParameter::constant(0.01),
            ..Default::default()
        };
        let mut env = Envelope::new();
        env.reset(&desc, &CurveSet::predefined(), &MidiState::new(), 4, 1.0, SAMPLE_RATE, false);
        assert_eq!(env.remaining_delay(), 12);

        let out = render(&mut env, 16);
        assert!(out[..12].iter().all(|&v| v == 0.25));
        assert!(out[12] > 0.25);
        assert_eq!(env.remaining_delay(), 0);
        assert_eq!(env.state(), EnvelopeState::Attack);
    }

    #[test]
    fn test_attack_is_monotonic() {
        let mut env = started(&descriptor(0.01, 0.0, 1.0, 0.1), false);
        let out = render(&mut env, 80);
        assert!(out.windows(2).all(|w| w[1] >= w[0]));
        assert!((out[79] - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_decay_reaches_sustain() {
        let mut env = started(&descriptor(0.0, 0.05, 0.5, 0.1), false);
        let out = render(&mut env, 1000);
        assert!(out[1] < 1.0 && out[1] > 0.5);
        assert_eq!(env.state(), EnvelopeState::Sustain);
        assert_eq!(*out.last().unwrap(), 0.5);
    }

    #[test]
    fn test_start_release_marks_released() {
        let mut env = started(&descriptor(0.0, 0.0, 1.0, 0.1), false);
        render(&mut env, 8);
        assert!(!env.is_released());
        env.start_release(0);
        assert!(env.is_released());
        render(&mut env, 1);
        assert_eq!(env.state(), EnvelopeState::Release);
    }

    #[test]
    fn test_pending_release_counts_as_released() {
        let mut env = started(&descriptor(0.0, 0.0, 1.0, 0.1), false);
        render(&mut env, 8);
        env.start_release(10);
        assert!(env.is_released());
        for _ in 0..10 {
            render(&mut env, 1);
            assert!(env.is_released());
        }
        assert_eq!(env.state(), EnvelopeState::Release);
    }

    #[test]
    fn test_release_mid_block() {
        let mut env = started(&descriptor(0.0, 0.0, 1.0, 0.1), false);
        render(&mut env, 8);
        env.start_release(10);
        let out = render(&mut env, 32);
        assert!(out[..10].iter().all(|&v| v == 1.0));
        assert!(out[10] < 1.0);
        assert_eq!(env.state(), EnvelopeState::Release);
    }

    #[test]
    fn test_release_captures_current_value() {
        let mut env = started(&descriptor(0.1, 0.0, 1.0, 0.1), false);
        let out = render(&mut env, 100);
        let level = out[99];
        assert!(level < 1.0);
        env.start_release(0);
        let out = render(&mut env, 1);
        assert!(out[0] < level && out[0] > level * 0.9);
    }

    #[test]
    fn test_release_reaches_done() {
        let mut env = started(&descriptor(0.0, 0.0, 0.8, 0.05), false);
        render(&mut env, 16);
        env.start_release(0);
        let out = render(&mut env, 2000);
        assert_eq!(env.state(), EnvelopeState::Done);
        assert_eq!(env.value(), 0.0);
        assert!(!env.is_smoothing());
        assert!(out.windows(2).all(|w| w[1] <= w[0]));
        assert_eq!(*out.last().unwrap(), 0.0);
    }

    #[test]
    fn test_zero_sustain_runs_free() {
        let mut env = started(&descriptor(0.0, 0.03, 0.0, 0.03), false);
        render(&mut env, 4000);
        assert_eq!(env.state(), EnvelopeState::Done);
    }

    #[test]
    fn test_one_shot_region_runs_free() {
        let mut env = started(&descriptor(0.0, 0.0, 1.0, 0.03), true);
        render(&mut env, 8);
        assert!(env.is_released());
        render(&mut env, 4000);
        assert_eq!(env.state(), EnvelopeState::Done);
    }

    #[test]
    fn test_release_during_delay() {
        let desc = EnvelopeDescriptor {
            delay: EgParameter::constant(1.0),
            sustain: EgParameter::constant(0.6),
            ..Default::default()
        };
        let mut env = started(&desc, false);
        env.start_release(0);
        let out = render(&mut env, 1);
        assert_eq!(env.state(), EnvelopeState::Release);
        assert!(out[0] <= 0.6);
    }

    #[test]
    fn test_set_release_time() {
        let mut fast = started(&descriptor(0.0, 0.0, 1.0, 1.0), false);
        let mut slow = fast.clone();
        fast.set_release_time(0.05);
        fast.start_release(0);
        slow.start_release(0);
        let fast_out = render(&mut fast, 100);
        let slow_out = render(&mut slow, 100);
        assert!(fast_out[50] < slow_out[50]);
    }

    #[test]
    fn test_shapes_bend_curves() {
        let mut linear = started(&descriptor(0.01, 0.0, 1.0, 0.1), false);
        let mut convex = {
            let mut desc = descriptor(0.01, 0.0, 1.0, 0.1);
            desc.attack_shape = -3.0;
            started(&desc, false)
        };
        let a = render(&mut linear, 40);
        let b = render(&mut convex, 40);
        assert!(b[20] < a[20]);
    }

    #[test]
    fn test_huge_delay_saturates() {
        let desc = EnvelopeDescriptor {
            delay: EgParameter::constant(1e30),
            start: EgParameter::constant(0.5),
            ..Default::default()
        };
        let mut env = Envelope::new();
        env.reset(&desc, &CurveSet::predefined(), &MidiState::new(), 10, 1.0, SAMPLE_RATE, false);
        assert_eq!(env.remaining_delay(), usize::MAX);
        assert!(render(&mut env, 16).iter().all(|&v| v == 0.5));
        assert_eq!(env.state(), EnvelopeState::Delay);
    }

    #[test]
    fn test_overflowing_modulation_stays_finite() {
        let desc = EnvelopeDescriptor {
            sustain: EgParameter {
                base: 3e38,
                vel2: 3e38,
                cc: Vec::new(),
            },
            release: EgParameter::constant(0.01),
            ..Default::default()
        };
        let mut env = started(&desc, false);
        let out = render(&mut env, 2000);
        assert!(out.iter().all(|v| v.is_finite()));
        assert_eq!(env.state(), EnvelopeState::Done);
    }

    #[test]
    fn test_random_envelopes_are_finite_and_end() {
        let mut rng = StdRng::seed_from_u64(0x5f2);
        let curves = CurveSet::predefined();
        let midi = MidiState::new();

        for _ in 0..1000 {
            let desc = EnvelopeDescriptor {
                delay: EgParameter::constant(rng.random_range(0.0..0.02)),
                attack: EgParameter::constant(rng.random_range(0.0..0.05)),
                hold: EgParameter::constant(rng.random_range(0.0..0.02)),
                decay: EgParameter::constant(rng.random_range(0.0..0.05)),
                sustain: EgParameter::constant(rng.random_range(0.0..=1.0)),
                release: EgParameter::constant(rng.random_range(0.0..0.05)),
                start: EgParameter::constant(rng.random_range(0.0..=1.0)),
                attack_shape: rng.random_range(-10.0..10.0),
                decay_shape: rng.random_range(-10.0..10.0),
                release_shape: rng.random_range(-10.0..10.0),
            };
            let mut env = Envelope::new();
            env.reset(&desc, &curves, &midi, rng.random_range(0..64), rng.random_range(0.0..=1.0), SAMPLE_RATE, rng.random_bool(0.1));

            let mut block = [0.0f32; 64];
            let before_release = rng.random_range(0..40);
            for _ in 0..before_release {
                env.get_block(&mut block);
                assert!(block.iter().all(|v| v.is_finite()));
            }

            env.start_release(rng.random_range(0..64));
            for _ in 0..80 {
                env.get_block(&mut block);
                assert!(block.iter().all(|v| v.is_finite() && *v >= 0.0));
            }

            assert_eq!(env.state(), EnvelopeState::Done);
            assert_eq!(env.value(), 0.0);
        }
    }
}
