//! Real-time engine and its background worker
//!
//! [`Engine`] lives on the audio thread. Anything that may block or
//! allocate is sent to the [`Worker`] as a request; results come back as
//! whole snapshots that are swapped in at the start of the next block.

mod link;
mod message;
mod recorder;
mod worker;

pub use link::{link, RtLink, Status, WorkerLink};
pub use message::{FixedPath, Oversampling, Retired, WorkKind, WorkRequest, WorkResponse, MAX_PATH_SIZE};
pub use recorder::Recorder;
pub use worker::{Worker, WorkerHandle, POLL_INTERVAL};

use crate::config::SfzkitConfig;
use crate::instrument::{Instrument, LoadError, Tuning};
use crate::opcode::defaults::MAX_VOICES;
use crate::synth::{MidiState, VoicePool};
use std::sync::Arc;

/// The audio-thread side of the sampler
///
/// After construction no method allocates, blocks or frees memory: new
/// snapshots arrive from the worker and replaced ones go back to it.
pub struct Engine {
    sample_rate: f32,
    link: RtLink,

    instrument: Arc<Instrument>,
    tuning: Arc<Tuning>,
    voices: Box<VoicePool>,
    midi: MidiState,
    scratch: Vec<f32>,
    preload_size: u32,
    oversampling: Oversampling,

    parked: [Option<WorkRequest>; WorkKind::COUNT],
    retire_slot: Option<Retired>,
    instrument_token: u64,
    tuning_token: u64,

    reload_check_samples: usize,
    samples_since_check: usize,
    status_samples: usize,
    samples_since_status: usize,
}

impl Engine {
    /// Create an engine and the worker that serves it
    ///
    /// The worker can be driven by hand with [`Worker::run_pending`] or moved
    /// to its own thread with [`Worker::spawn`]. Startup instrument and
    /// tuning paths in `config` are queued as ordinary load requests.
    pub fn new(config: &SfzkitConfig) -> Result<(Self, Worker), LoadError> {
        let (rt, worker_link) = link(config.engine.queue_capacity);
        let worker = Worker::new(worker_link, config.engine.preload_size);

        let voices = Box::new(VoicePool::with_capacity(config.engine.voices));
        rt.status().set_num_voices(voices.len());
        let instrument = Arc::new(Instrument::empty());
        rt.status().set_instrument_size(0, instrument.curves().num_curves());

        let mut engine = Self {
            sample_rate: config.audio.sample_rate as f32,
            link: rt,
            instrument,
            tuning: Arc::new(Tuning::default()),
            voices,
            midi: MidiState::new(),
            scratch: vec![0.0; config.audio.block_size.max(1)],
            preload_size: config.engine.preload_size,
            oversampling: Oversampling::from_factor(config.engine.oversampling),
            parked: [None; WorkKind::COUNT],
            retire_slot: None,
            instrument_token: 0,
            tuning_token: 0,
            reload_check_samples: config.reload_check_samples(),
            samples_since_check: 0,
            status_samples: if config.engine.log_status {
                config.audio.sample_rate as usize
            } else {
                0
            },
            samples_since_status: 0,
        };

        if let Some(path) = &config.instrument {
            engine.load_instrument(&path.to_string_lossy())?;
        }
        if let Some(path) = &config.tuning {
            engine.load_tuning(&path.to_string_lossy())?;
        }

        Ok((engine, worker))
    }

    /// Send a request, or park it until the previous one of its kind completes
    ///
    /// A parked request is replaced by any newer one of the same kind.
    fn submit_or_park(&mut self, request: WorkRequest) {
        let kind = request.kind();
        if self.link.is_in_flight(kind) {
            self.parked[kind.index()] = Some(request);
        } else {
            self.link.submit(request);
        }
    }

    /// Load an instrument definition in the background
    pub fn load_instrument(&mut self, path: &str) -> Result<(), LoadError> {
        let path = FixedPath::new(path)?;
        self.instrument_token += 1;
        self.submit_or_park(WorkRequest::LoadInstrument {
            path,
            token: self.instrument_token,
        });
        Ok(())
    }

    /// Load a Scala tuning in the background
    pub fn load_tuning(&mut self, path: &str) -> Result<(), LoadError> {
        let path = FixedPath::new(path)?;
        self.tuning_token += 1;
        self.submit_or_park(WorkRequest::LoadTuning {
            path,
            token: self.tuning_token,
        });
        Ok(())
    }

    /// Resize the voice pool; playing voices are cut when the new pool arrives
    pub fn set_num_voices(&mut self, count: usize) {
        let count = count.clamp(1, MAX_VOICES as usize);
        self.submit_or_park(WorkRequest::SetVoiceCount(count));
    }

    pub fn set_preload_size(&mut self, size: u32) {
        self.submit_or_park(WorkRequest::SetPreloadSize(size));
    }

    /// Set the oversampling factor, rounded up to a power of two in 1..=8
    pub fn set_oversampling(&mut self, factor: u32) {
        self.submit_or_park(WorkRequest::SetOversampling(Oversampling::from_factor(factor)));
    }

    /// Ask the worker to reload files that changed, unless a check or load is pending
    pub fn check_for_changes(&mut self) {
        let busy = [WorkKind::ReloadCheck, WorkKind::LoadInstrument, WorkKind::LoadTuning]
            .iter()
            .any(|&kind| self.link.is_in_flight(kind) || self.parked[kind.index()].is_some());
        if !busy {
            self.link.submit(WorkRequest::ReloadCheck);
        }
    }

    /// Start a note `delay` samples into the next block
    pub fn note_on(&mut self, delay: usize, note: u8, velocity: u8) {
        let velocity = velocity.min(127) as f32 / 127.0;

        let instrument = &self.instrument;
        for region in instrument.regions_for(note, velocity) {
            let Some(voice) = self.voices.find_free() else {
                break;
            };
            voice.start(
                region,
                instrument.curves(),
                &self.midi,
                note,
                velocity,
                delay,
                self.sample_rate,
            );
        }
    }

    /// Release a note `delay` samples into the next block
    pub fn note_off(&mut self, delay: usize, note: u8) {
        self.voices.release_note(note, delay);
    }

    /// Set a controller from a 7-bit value
    pub fn cc(&mut self, number: u16, value: u8) {
        self.midi.set_cc7(number, value);
    }

    /// Release every playing voice
    pub fn all_notes_off(&mut self) {
        self.voices.release_all(0);
    }

    /// Render the summed voice envelopes into `output`
    pub fn render_block(&mut self, output: &mut [f32]) {
        self.apply_responses();
        self.schedule_background_work(output.len());

        output.fill(0.0);
        let chunk = self.scratch.len();
        for part in output.chunks_mut(chunk) {
            self.voices.render(part, &mut self.scratch);
        }

        self.link.status().record_block(self.voices.active_count());
    }

    fn schedule_background_work(&mut self, samples: usize) {
        if self.reload_check_samples > 0 {
            self.samples_since_check = self.samples_since_check.saturating_add(samples);
            if self.samples_since_check >= self.reload_check_samples {
                self.check_for_changes();
            }
        }

        if self.status_samples > 0 {
            self.samples_since_status += samples;
            if self.samples_since_status >= self.status_samples
                && self.link.submit(WorkRequest::LogStatus)
            {
                self.samples_since_status = 0;
            }
        }
    }

    /// Hand a replaced snapshot back; keeps it if the queue is full
    fn retire(&mut self, retired: Retired) {
        if let Err(retired) = self.link.retire(retired) {
            self.retire_slot = Some(retired);
        }
    }

    fn apply_responses(&mut self) {
        if let Some(retired) = self.retire_slot.take() {
            self.retire(retired);
            if self.retire_slot.is_some() {
                return;
            }
        }

        while let Some(response) = self.link.poll() {
            match response {
                WorkResponse::InstrumentLoaded { token, instrument } => {
                    if token < self.instrument_token {
                        self.link.status().record_stale_response();
                        self.retire(Retired::Instrument(instrument));
                    } else {
                        self.link
                            .status()
                            .set_instrument_size(instrument.regions().len(), instrument.curves().num_curves());
                        let old = std::mem::replace(&mut self.instrument, instrument);
                        self.retire(Retired::Instrument(old));
                    }
                }
                WorkResponse::TuningLoaded { token, tuning } => {
                    if token < self.tuning_token {
                        self.link.status().record_stale_response();
                        self.retire(Retired::Tuning(tuning));
                    } else {
                        let old = std::mem::replace(&mut self.tuning, tuning);
                        self.retire(Retired::Tuning(old));
                    }
                }
                WorkResponse::VoicesResized(voices) => {
                    self.link.status().set_num_voices(voices.len());
                    let old = std::mem::replace(&mut self.voices, voices);
                    self.retire(Retired::Voices(old));
                }
                WorkResponse::PreloadSizeChanged(size) => self.preload_size = size,
                WorkResponse::OversamplingChanged(factor) => self.oversampling = factor,
                WorkResponse::Completed(kind) => {
                    if kind == WorkKind::ReloadCheck {
                        self.samples_since_check = 0;
                    }
                    if let Some(parked) = self.parked[kind.index()].take() {
                        self.link.submit(parked);
                    }
                }
            }

            if self.retire_slot.is_some() {
                break;
            }
        }
    }

    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    pub fn instrument(&self) -> &Instrument {
        &self.instrument
    }

    pub fn tuning(&self) -> &Tuning {
        &self.tuning
    }

    /// Size of the voice pool currently in use
    pub fn num_voices(&self) -> usize {
        self.voices.len()
    }

    pub fn active_voices(&self) -> usize {
        self.voices.active_count()
    }

    pub fn preload_size(&self) -> u32 {
        self.preload_size
    }

    pub fn oversampling(&self) -> Oversampling {
        self.oversampling
    }

    pub fn midi(&self) -> &MidiState {
        &self.midi
    }

    /// Whether a request of `kind` is sent or parked and not yet completed
    pub fn is_pending(&self, kind: WorkKind) -> bool {
        self.link.is_in_flight(kind) || self.parked[kind.index()].is_some()
    }

    /// Shared counters
    pub fn status(&self) -> Arc<Status> {
        Arc::clone(self.link.status())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn test_config() -> SfzkitConfig {
        let mut config = SfzkitConfig::default();
        config.audio.sample_rate = 8000;
        config.audio.block_size = 64;
        config.engine.voices = 8;
        config.engine.reload_check_interval_ms = 0;
        config
    }

    fn instrument_file(text: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(text.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_engine_creation() {
        let (engine, _worker) = Engine::new(&test_config()).unwrap();
        assert_eq!(engine.sample_rate(), 8000.0);
        assert_eq!(engine.num_voices(), 8);
        assert!(engine.instrument().regions().is_empty());
        assert_eq!(engine.oversampling(), Oversampling::X1);
    }

    #[test]
    fn test_silent_without_instrument() {
        let (mut engine, _worker) = Engine::new(&test_config()).unwrap();
        engine.note_on(0, 60, 100);
        let mut buffer = [1.0f32; 64];
        engine.render_block(&mut buffer);
        assert!(buffer.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_huge_region_delay_with_offset() {
        let file = instrument_file("regions:\n  - delay: 1e30\n");
        let (mut engine, mut worker) = Engine::new(&test_config()).unwrap();
        engine.load_instrument(file.path().to_str().unwrap()).unwrap();
        worker.run_pending();

        let mut buffer = [0.0f32; 64];
        engine.render_block(&mut buffer);
        engine.note_on(10, 60, 100);
        engine.render_block(&mut buffer);
        assert!(buffer.iter().all(|&v| v == 0.0));
        assert_eq!(engine.active_voices(), 1);
    }

    #[test]
    fn test_load_and_play() {
        let file = instrument_file("regions:\n  - lokey: 0\n    hikey: 127\n    ampeg_release: 0.05\n");
        let (mut engine, mut worker) = Engine::new(&test_config()).unwrap();
        engine.load_instrument(file.path().to_str().unwrap()).unwrap();
        worker.run_pending();

        let mut buffer = [0.0f32; 64];
        engine.render_block(&mut buffer);
        assert_eq!(engine.instrument().regions().len(), 1);

        engine.note_on(10, 60, 127);
        engine.render_block(&mut buffer);
        assert!(buffer[..10].iter().all(|&v| v == 0.0));
        assert!((buffer[10] - 1.0).abs() < 1e-6);
        assert_eq!(engine.active_voices(), 1);

        engine.note_off(0, 60);
        for _ in 0..20 {
            engine.render_block(&mut buffer);
        }
        assert_eq!(engine.active_voices(), 0);
    }

    #[test]
    fn test_parked_request_replaced_by_newer() {
        let (mut engine, mut worker) = Engine::new(&test_config()).unwrap();
        engine.set_num_voices(4);
        engine.set_num_voices(16);
        engine.set_num_voices(32);
        assert!(engine.is_pending(WorkKind::SetVoiceCount));

        worker.run_pending();
        let mut buffer = [0.0f32; 64];
        engine.render_block(&mut buffer);
        assert_eq!(engine.num_voices(), 4);

        // The parked request went out when the first one completed
        worker.run_pending();
        engine.render_block(&mut buffer);
        assert_eq!(engine.num_voices(), 32);
        assert!(!engine.is_pending(WorkKind::SetVoiceCount));
    }

    #[test]
    fn test_stale_instrument_discarded() {
        let first = instrument_file("regions:\n  - key: 60\n");
        let second = instrument_file("regions:\n  - key: 60\n  - key: 62\n");
        let (mut engine, mut worker) = Engine::new(&test_config()).unwrap();

        engine.load_instrument(first.path().to_str().unwrap()).unwrap();
        engine.load_instrument(second.path().to_str().unwrap()).unwrap();
        worker.run_pending();

        let mut buffer = [0.0f32; 64];
        engine.render_block(&mut buffer);
        // The first load finished but a newer one was already requested
        assert!(engine.instrument().regions().is_empty());
        assert_eq!(engine.status().stale_responses(), 1);

        worker.run_pending();
        engine.render_block(&mut buffer);
        assert_eq!(engine.instrument().regions().len(), 2);
    }

    #[test]
    fn test_resources_applied_at_block_start() {
        let (mut engine, mut worker) = Engine::new(&test_config()).unwrap();
        engine.set_preload_size(2048);
        engine.set_oversampling(3);
        worker.run_pending();
        assert_eq!(engine.preload_size(), 8192);

        let mut buffer = [0.0f32; 16];
        engine.render_block(&mut buffer);
        assert_eq!(engine.preload_size(), 2048);
        assert_eq!(engine.oversampling(), Oversampling::X4);
    }

    #[test]
    fn test_cc_modulates_envelope() {
        let file = instrument_file(
            "regions:\n  - ampeg_attack: 0\n    ampeg_attack_oncc1: 0.01\n",
        );
        let (mut engine, mut worker) = Engine::new(&test_config()).unwrap();
        engine.load_instrument(file.path().to_str().unwrap()).unwrap();
        worker.run_pending();
        let mut buffer = [0.0f32; 64];
        engine.render_block(&mut buffer);

        engine.cc(1, 127);
        engine.note_on(0, 60, 127);
        engine.render_block(&mut buffer);
        // 10 ms attack at 8 kHz
        assert!(buffer[0] < 0.1);
        assert!((buffer[63] - 0.8).abs() < 1e-3);
    }

    #[test]
    fn test_reload_check_throttled() {
        let mut config = test_config();
        config.engine.reload_check_interval_ms = 8;
        let (mut engine, mut worker) = Engine::new(&config).unwrap();

        let mut buffer = [0.0f32; 64];
        engine.render_block(&mut buffer);
        assert!(engine.is_pending(WorkKind::ReloadCheck));
        for _ in 0..4 {
            engine.render_block(&mut buffer);
        }
        assert_eq!(worker.run_pending(), 1);
    }
}
