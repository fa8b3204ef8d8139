//! Configuration schema definitions

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration for sfzkit
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SfzkitConfig {
    /// Audio stream settings
    #[serde(default)]
    pub audio: AudioConfig,

    /// Engine resources and worker behaviour
    #[serde(default)]
    pub engine: EngineSettings,

    /// Instrument definition to load at startup
    #[serde(default)]
    pub instrument: Option<PathBuf>,

    /// Scala tuning to load at startup
    #[serde(default)]
    pub tuning: Option<PathBuf>,
}

impl SfzkitConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        // Validate audio settings
        if self.audio.sample_rate < 8000 || self.audio.sample_rate > 192000 {
            bail!("Sample rate must be between 8000 and 192000");
        }
        if self.audio.block_size < 16 || self.audio.block_size > 8192 {
            bail!("Block size must be between 16 and 8192");
        }

        // Validate engine settings
        if self.engine.voices == 0 || self.engine.voices > crate::opcode::defaults::MAX_VOICES as usize {
            bail!(
                "Voice count must be between 1 and {}",
                crate::opcode::defaults::MAX_VOICES
            );
        }
        if ![1, 2, 4, 8].contains(&self.engine.oversampling) {
            bail!("Oversampling must be 1, 2, 4 or 8");
        }
        if self.engine.queue_capacity < 8 {
            bail!("Queue capacity must be at least 8");
        }

        Ok(())
    }

    /// Reload-check period in samples; 0 disables checking
    pub fn reload_check_samples(&self) -> usize {
        (self.engine.reload_check_interval_ms as u64 * self.audio.sample_rate as u64 / 1000) as usize
    }
}

/// Audio stream configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    /// Sample rate in Hz (default: 48000)
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,

    /// Samples per rendered block (default: 512)
    #[serde(default = "default_block_size")]
    pub block_size: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: default_sample_rate(),
            block_size: default_block_size(),
        }
    }
}

fn default_sample_rate() -> u32 { 48000 }
fn default_block_size() -> usize { 512 }

/// Engine resources and worker settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSettings {
    /// Polyphony (default: 64)
    #[serde(default = "default_voices")]
    pub voices: usize,

    /// Sample preload size in frames (default: 8192)
    #[serde(default = "default_preload_size")]
    pub preload_size: u32,

    /// Oversampling factor: 1, 2, 4 or 8 (default: 1)
    #[serde(default = "default_oversampling")]
    pub oversampling: u32,

    /// Slots in each queue between the audio thread and the worker (default: 64)
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// How often to check files for changes, in ms; 0 disables (default: 1000)
    #[serde(default = "default_reload_check_interval_ms")]
    pub reload_check_interval_ms: u32,

    /// Log engine counters periodically (default: false)
    #[serde(default)]
    pub log_status: bool,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            voices: default_voices(),
            preload_size: default_preload_size(),
            oversampling: default_oversampling(),
            queue_capacity: default_queue_capacity(),
            reload_check_interval_ms: default_reload_check_interval_ms(),
            log_status: false,
        }
    }
}

fn default_voices() -> usize { 64 }
fn default_preload_size() -> u32 { 8192 }
fn default_oversampling() -> u32 { 1 }
fn default_queue_capacity() -> usize { 64 }
fn default_reload_check_interval_ms() -> u32 { 1000 }
