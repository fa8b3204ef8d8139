//! Live MIDI controller state
//!
//! Owned by the audio thread. Values are stored normalized to [0, 1].

use crate::opcode::defaults::NUM_CCS;

/// Snapshot of controller values
#[derive(Debug, Clone)]
pub struct MidiState {
    cc: [f32; NUM_CCS as usize],
}

impl MidiState {
    /// Create a state with every controller at zero
    pub fn new() -> Self {
        Self {
            cc: [0.0; NUM_CCS as usize],
        }
    }

    /// Normalized value of a controller; unknown controllers read as zero
    pub fn cc(&self, number: u16) -> f32 {
        self.cc.get(number as usize).copied().unwrap_or(0.0)
    }

    /// Set a controller from its normalized value
    pub fn set_cc(&mut self, number: u16, value: f32) {
        if let Some(slot) = self.cc.get_mut(number as usize) {
            *slot = value.clamp(0.0, 1.0);
        }
    }

    /// Set a controller from a 7-bit value
    pub fn set_cc7(&mut self, number: u16, value: u8) {
        self.set_cc(number, value.min(127) as f32 / 127.0);
    }
}

impl Default for MidiState {
    fn default() -> Self {
        Self::new()
    }
}
