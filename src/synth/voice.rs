//! Voices and the voice pool
//!
//! The pool is allocated on the worker thread and handed to the audio
//! thread whole; nothing here allocates after construction.

use super::envelope::Envelope;
use super::region::Region;
use super::MidiState;
use crate::curve::CurveSet;

/// One sounding note of one region
#[derive(Debug, Clone, Default)]
pub struct Voice {
    envelope: Envelope,
    note: u8,
    gain: f32,
}

impl Voice {
    /// Start the voice for `region`
    #[allow(clippy::too_many_arguments)]
    pub fn start(
        &mut self,
        region: &Region,
        curves: &CurveSet,
        midi: &MidiState,
        note: u8,
        velocity: f32,
        delay: usize,
        sample_rate: f32,
    ) {
        self.note = note;
        self.gain = region.velocity_gain(velocity);
        let delay = delay.saturating_add((region.delay.max(0.0) * sample_rate) as usize);
        self.envelope.reset(
            &region.amp_eg,
            curves,
            midi,
            delay,
            velocity,
            sample_rate,
            region.is_one_shot_oscillator(),
        );
    }

    /// Release the voice `delay` samples into the next block
    pub fn release(&mut self, delay: usize) {
        self.envelope.start_release(delay);
    }

    /// Check if the voice is producing output
    pub fn is_active(&self) -> bool {
        self.envelope.is_smoothing()
    }

    pub fn is_released(&self) -> bool {
        self.envelope.is_released()
    }

    pub fn note(&self) -> u8 {
        self.note
    }

    pub fn envelope(&self) -> &Envelope {
        &self.envelope
    }

    /// Add this voice's envelope, scaled by its gain, into `output`
    ///
    /// `scratch` must be at least as long as `output`.
    pub fn render_into(&mut self, output: &mut [f32], scratch: &mut [f32]) {
        let scratch = &mut scratch[..output.len()];
        self.envelope.get_block(scratch);
        for (out, env) in output.iter_mut().zip(scratch.iter()) {
            *out += env * self.gain;
        }
    }
}

/// A fixed set of voices
#[derive(Debug, Clone, Default)]
pub struct VoicePool {
    voices: Vec<Voice>,
}

impl VoicePool {
    /// Create a pool of `count` idle voices
    pub fn with_capacity(count: usize) -> Self {
        Self {
            voices: vec![Voice::default(); count],
        }
    }

    /// Number of voices in the pool
    pub fn len(&self) -> usize {
        self.voices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.voices.is_empty()
    }

    /// Number of voices still producing output
    pub fn active_count(&self) -> usize {
        self.voices.iter().filter(|v| v.is_active()).count()
    }

    /// Pick a voice for a new note
    ///
    /// Prefers an idle voice, then the quietest released one. Returns
    /// `None` when every voice is held.
    pub fn find_free(&mut self) -> Option<&mut Voice> {
        if let Some(index) = self.voices.iter().position(|v| !v.is_active()) {
            return self.voices.get_mut(index);
        }
        self.voices
            .iter_mut()
            .filter(|v| v.is_released())
            .min_by(|a, b| a.envelope.value().total_cmp(&b.envelope.value()))
    }

    /// Release every held voice playing `note`
    pub fn release_note(&mut self, note: u8, delay: usize) {
        for voice in self.voices.iter_mut() {
            if voice.is_active() && !voice.is_released() && voice.note == note {
                voice.release(delay);
            }
        }
    }

    /// Release every voice
    pub fn release_all(&mut self, delay: usize) {
        for voice in self.voices.iter_mut().filter(|v| v.is_active()) {
            voice.release(delay);
        }
    }

    /// Sum every active voice into `output`
    pub fn render(&mut self, output: &mut [f32], scratch: &mut [f32]) {
        for voice in self.voices.iter_mut().filter(|v| v.is_active()) {
            voice.render_into(output, scratch);
        }
    }
}
