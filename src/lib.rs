//! sfzkit - the control core of a polyphonic sample player
//!
//! Instrument parameters are resolved against declarative specs, envelope
//! and controller curves are evaluated per voice, and anything that may
//! block or allocate runs on a worker thread that hands finished snapshots
//! to the audio thread.

pub mod config;
pub mod curve;
pub mod engine;
pub mod instrument;
pub mod opcode;
pub mod synth;

pub use config::SfzkitConfig;
pub use engine::Engine;
