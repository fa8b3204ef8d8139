//! Per-voice synthesis state
//!
//! Regions, controller state, amplitude envelopes and the voice pool.

mod envelope;
mod midi;
mod region;
mod voice;

pub use envelope::{
    Envelope, EnvelopeState, MIN_EXP_TIME, RELEASE_THRESHOLD, SUSTAIN_FREE_RUNNING_THRESHOLD, TRANSITION_TIME,
};
pub use midi::MidiState;
pub use region::{CcModifier, EgParameter, EnvelopeDescriptor, LoopMode, Region};
pub use voice::{Voice, VoicePool};
