//! Background worker
//!
//! Executes requests from the audio thread in submission order. This is
//! where files are read, snapshots are built and old snapshots are freed.

use super::link::WorkerLink;
use super::message::{WorkRequest, WorkResponse};
use crate::instrument::{Instrument, LoadError, Tuning};
use crate::synth::VoicePool;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, SystemTime};

/// How long the worker thread sleeps when it has nothing to do
pub const POLL_INTERVAL: Duration = Duration::from_millis(2);

/// A watched file and the request token it was last loaded for
#[derive(Debug, Clone, Default)]
struct Watched {
    path: Option<PathBuf>,
    modified: Option<SystemTime>,
    token: u64,
}

impl Watched {
    fn remember(&mut self, path: PathBuf, token: u64) {
        self.modified = modified_time(&path);
        self.path = Some(path);
        self.token = token;
    }

    /// The path, if the file changed since it was remembered
    fn changed(&self) -> Option<PathBuf> {
        let path = self.path.as_ref()?;
        let modified = modified_time(path);
        if modified.is_some() && modified != self.modified {
            Some(path.clone())
        } else {
            None
        }
    }
}

fn modified_time(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

/// Worker-side state
pub struct Worker {
    link: WorkerLink,
    instrument: Watched,
    tuning: Watched,
    preload_size: u32,
    // Responses the full queue could not take yet, in order
    backlog: VecDeque<WorkResponse>,
}

impl Worker {
    pub(crate) fn new(link: WorkerLink, preload_size: u32) -> Self {
        Self {
            link,
            instrument: Watched::default(),
            tuning: Watched::default(),
            preload_size,
            backlog: VecDeque::new(),
        }
    }

    pub fn preload_size(&self) -> u32 {
        self.preload_size
    }

    /// Responses waiting for room in the response queue
    pub fn backlog_len(&self) -> usize {
        self.backlog.len()
    }

    /// Execute every queued request and free retired snapshots
    ///
    /// Responses held back by a full queue are sent first. Returns the
    /// number of requests handled.
    pub fn run_pending(&mut self) -> usize {
        self.flush_backlog();
        let mut handled = 0;
        while let Some(request) = self.link.next_request() {
            self.handle(request);
            handled += 1;
        }
        self.link.drain_retired();
        handled
    }

    /// Execute one request
    pub fn handle(&mut self, request: WorkRequest) {
        let kind = request.kind();
        log::debug!("worker: {}", kind);

        match request {
            WorkRequest::ReloadCheck => {
                if let Some(path) = self.instrument.changed() {
                    log::info!("Instrument {:?} changed on disk, reloading", path);
                    let token = self.instrument.token;
                    self.load_instrument(path, token);
                }
                if let Some(path) = self.tuning.changed() {
                    log::info!("Tuning {:?} changed on disk, reloading", path);
                    let token = self.tuning.token;
                    self.load_tuning(path, token);
                }
            }
            WorkRequest::LoadInstrument { path, token } => {
                self.load_instrument(path.to_path_buf(), token);
            }
            WorkRequest::LoadTuning { path, token } => {
                self.load_tuning(path.to_path_buf(), token);
            }
            WorkRequest::SetVoiceCount(count) => {
                let pool = Box::new(VoicePool::with_capacity(count));
                log::info!("Voice pool resized to {}", count);
                self.respond(WorkResponse::VoicesResized(pool));
            }
            WorkRequest::SetPreloadSize(size) => {
                self.preload_size = size;
                log::info!("Preload size set to {}", size);
                self.respond(WorkResponse::PreloadSizeChanged(size));
            }
            WorkRequest::SetOversampling(factor) => {
                log::info!("Oversampling set to x{}", factor.factor());
                self.respond(WorkResponse::OversamplingChanged(factor));
            }
            WorkRequest::LogStatus => self.log_status(),
        }

        self.respond(WorkResponse::Completed(kind));
        self.link.drain_retired();
    }

    fn respond(&mut self, response: WorkResponse) {
        if !self.backlog.is_empty() {
            self.backlog.push_back(response);
            return;
        }
        if let Err(response) = self.link.try_respond(response) {
            log::warn!("Response queue full; holding responses until the audio side catches up");
            self.backlog.push_back(response);
        }
    }

    fn flush_backlog(&mut self) {
        while let Some(response) = self.backlog.pop_front() {
            if let Err(response) = self.link.try_respond(response) {
                self.backlog.push_front(response);
                break;
            }
        }
    }

    fn load_instrument(&mut self, path: PathBuf, token: u64) {
        // Remember the path even on failure so fixing the file triggers a reload
        self.instrument.remember(path.clone(), token);

        match Instrument::from_file(&path) {
            Ok(instrument) => {
                for diagnostic in instrument.diagnostics() {
                    log::warn!("{:?}: {}", path, diagnostic);
                }
                for (position, error) in instrument.rejected_curves() {
                    log::warn!("{:?}: curve #{}: {}", path, position, error);
                }
                log::info!(
                    "Loaded instrument {:?}: {} regions, {} curves",
                    path,
                    instrument.regions().len(),
                    instrument.curves().num_curves()
                );
                self.respond(WorkResponse::InstrumentLoaded {
                    token,
                    instrument: Arc::new(instrument),
                });
            }
            Err(e) => log_load_error("instrument", &path, &e),
        }
    }

    fn load_tuning(&mut self, path: PathBuf, token: u64) {
        self.tuning.remember(path.clone(), token);

        match Tuning::from_file(&path) {
            Ok(tuning) => {
                log::info!("Loaded tuning {:?}: {} ({} degrees)", path, tuning.description(), tuning.len());
                self.respond(WorkResponse::TuningLoaded {
                    token,
                    tuning: Arc::new(tuning),
                });
            }
            Err(e) => log_load_error("tuning", &path, &e),
        }
    }

    fn log_status(&self) {
        let status = self.link.status();
        log::info!(
            "Status: {}/{} voices active, {} regions, {} curves, {} blocks, {} dropped requests, {} stale responses",
            status.active_voices(),
            status.num_voices(),
            status.num_regions(),
            status.num_curves(),
            status.blocks_rendered(),
            status.dropped_requests(),
            status.stale_responses()
        );
    }

    /// Run the worker on its own thread until the handle is stopped
    pub fn spawn(mut self) -> std::io::Result<WorkerHandle> {
        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);

        let thread = thread::Builder::new()
            .name("sfzkit-worker".to_string())
            .spawn(move || {
                log::debug!("Worker thread started");
                while flag.load(Ordering::Relaxed) {
                    if self.run_pending() == 0 || !self.backlog.is_empty() {
                        thread::park_timeout(POLL_INTERVAL);
                    }
                }
                self.run_pending();
                log::debug!("Worker thread stopped");
            })?;

        Ok(WorkerHandle {
            running,
            thread: Some(thread),
        })
    }
}

fn log_load_error(what: &str, path: &Path, error: &LoadError) {
    log::error!("Failed to load {} {:?}: {}; keeping the previous one", what, path, error);
}

/// Handle to a running worker thread; stops it when dropped
pub struct WorkerHandle {
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl WorkerHandle {
    /// Wake the worker early
    pub fn wake(&self) {
        if let Some(thread) = &self.thread {
            thread.thread().unpark();
        }
    }

    /// Stop the thread and wait for it to exit
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            thread.thread().unpark();
            if thread.join().is_err() {
                log::error!("Worker thread panicked");
            }
        }
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}
