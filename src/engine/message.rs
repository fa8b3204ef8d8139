//! Messages exchanged between the audio thread and the worker
//!
//! Requests are plain `Copy` data so that building and queueing one never
//! allocates. Responses carry owned snapshots built by the worker.

use crate::instrument::{Instrument, LoadError, Tuning};
use crate::synth::VoicePool;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Longest path a request can carry, in bytes
pub const MAX_PATH_SIZE: usize = 1024;

/// Operation kinds; at most one request of each is in flight
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkKind {
    ReloadCheck,
    LoadInstrument,
    LoadTuning,
    SetVoiceCount,
    SetPreloadSize,
    SetOversampling,
    LogStatus,
}

impl WorkKind {
    pub const COUNT: usize = 7;

    pub const ALL: [WorkKind; Self::COUNT] = [
        WorkKind::ReloadCheck,
        WorkKind::LoadInstrument,
        WorkKind::LoadTuning,
        WorkKind::SetVoiceCount,
        WorkKind::SetPreloadSize,
        WorkKind::SetOversampling,
        WorkKind::LogStatus,
    ];

    /// Position in [`WorkKind::ALL`]
    pub fn index(self) -> usize {
        self as usize
    }

    pub(crate) fn bit(self) -> u8 {
        1 << self.index()
    }
}

impl fmt::Display for WorkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WorkKind::ReloadCheck => "reload check",
            WorkKind::LoadInstrument => "load instrument",
            WorkKind::LoadTuning => "load tuning",
            WorkKind::SetVoiceCount => "set voice count",
            WorkKind::SetPreloadSize => "set preload size",
            WorkKind::SetOversampling => "set oversampling",
            WorkKind::LogStatus => "log status",
        };
        f.write_str(name)
    }
}

/// A file path stored inline
#[derive(Clone, Copy)]
pub struct FixedPath {
    bytes: [u8; MAX_PATH_SIZE],
    len: usize,
}

impl FixedPath {
    /// Copy `path` into a fixed buffer
    pub fn new(path: &str) -> Result<Self, LoadError> {
        let len = path.len();
        if len > MAX_PATH_SIZE {
            return Err(LoadError::PathTooLong { len, max: MAX_PATH_SIZE });
        }
        let mut bytes = [0u8; MAX_PATH_SIZE];
        bytes[..len].copy_from_slice(path.as_bytes());
        Ok(Self { bytes, len })
    }

    pub fn as_str(&self) -> &str {
        // Built from a &str, so always valid UTF-8
        std::str::from_utf8(&self.bytes[..self.len]).unwrap_or("")
    }

    pub fn to_path_buf(&self) -> PathBuf {
        PathBuf::from(self.as_str())
    }
}

impl fmt::Debug for FixedPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.as_str())
    }
}

impl PartialEq for FixedPath {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

/// Internal oversampling factor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Oversampling {
    #[default]
    X1,
    X2,
    X4,
    X8,
}

impl Oversampling {
    /// Round `factor` up to a power of two and clamp it to 1..=8
    pub fn from_factor(factor: u32) -> Self {
        match factor.max(1).checked_next_power_of_two().unwrap_or(8) {
            1 => Oversampling::X1,
            2 => Oversampling::X2,
            4 => Oversampling::X4,
            _ => Oversampling::X8,
        }
    }

    pub fn factor(self) -> u32 {
        match self {
            Oversampling::X1 => 1,
            Oversampling::X2 => 2,
            Oversampling::X4 => 4,
            Oversampling::X8 => 8,
        }
    }
}

/// Work for the background thread
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WorkRequest {
    /// Reload the instrument or tuning if their files changed
    ReloadCheck,
    LoadInstrument { path: FixedPath, token: u64 },
    LoadTuning { path: FixedPath, token: u64 },
    SetVoiceCount(usize),
    SetPreloadSize(u32),
    SetOversampling(Oversampling),
    /// Log engine counters
    LogStatus,
}

impl WorkRequest {
    pub fn kind(&self) -> WorkKind {
        match self {
            WorkRequest::ReloadCheck => WorkKind::ReloadCheck,
            WorkRequest::LoadInstrument { .. } => WorkKind::LoadInstrument,
            WorkRequest::LoadTuning { .. } => WorkKind::LoadTuning,
            WorkRequest::SetVoiceCount(_) => WorkKind::SetVoiceCount,
            WorkRequest::SetPreloadSize(_) => WorkKind::SetPreloadSize,
            WorkRequest::SetOversampling(_) => WorkKind::SetOversampling,
            WorkRequest::LogStatus => WorkKind::LogStatus,
        }
    }
}

/// Results sent back to the audio thread
///
/// Every request is answered by zero or more result messages followed by
/// exactly one `Completed` of its kind.
pub enum WorkResponse {
    InstrumentLoaded { token: u64, instrument: Arc<Instrument> },
    TuningLoaded { token: u64, tuning: Arc<Tuning> },
    VoicesResized(Box<VoicePool>),
    PreloadSizeChanged(u32),
    OversamplingChanged(Oversampling),
    Completed(WorkKind),
}

impl fmt::Debug for WorkResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkResponse::InstrumentLoaded { token, instrument } => f
                .debug_struct("InstrumentLoaded")
                .field("token", token)
                .field("regions", &instrument.regions().len())
                .finish(),
            WorkResponse::TuningLoaded { token, tuning } => f
                .debug_struct("TuningLoaded")
                .field("token", token)
                .field("degrees", &tuning.len())
                .finish(),
            WorkResponse::VoicesResized(pool) => write!(f, "VoicesResized({})", pool.len()),
            WorkResponse::PreloadSizeChanged(size) => write!(f, "PreloadSizeChanged({})", size),
            WorkResponse::OversamplingChanged(o) => write!(f, "OversamplingChanged({:?})", o),
            WorkResponse::Completed(kind) => write!(f, "Completed({:?})", kind),
        }
    }
}

/// Snapshots replaced on the audio thread, returned to be freed elsewhere
pub enum Retired {
    Instrument(Arc<Instrument>),
    Tuning(Arc<Tuning>),
    Voices(Box<VoicePool>),
}
