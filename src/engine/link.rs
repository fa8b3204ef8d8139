//! Lock-free queues between the audio thread and the worker
//!
//! Three single-producer single-consumer ring buffers: requests to the
//! worker, responses back, and replaced snapshots to be freed by the worker.
//! Plus a block of relaxed atomics for counters both sides can read.

use super::message::{Retired, WorkKind, WorkRequest, WorkResponse};
use ringbuf::{traits::*, HeapCons, HeapProd, HeapRb};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

/// Counters shared by both threads
#[derive(Debug, Default)]
pub struct Status {
    dropped_requests: AtomicU64,
    stale_responses: AtomicU64,
    active_voices: AtomicUsize,
    num_voices: AtomicUsize,
    num_regions: AtomicUsize,
    num_curves: AtomicUsize,
    blocks_rendered: AtomicU64,
}

impl Status {
    /// Requests lost because the queue was full
    pub fn dropped_requests(&self) -> u64 {
        self.dropped_requests.load(Ordering::Relaxed)
    }

    /// Load results discarded because a newer load was requested
    pub fn stale_responses(&self) -> u64 {
        self.stale_responses.load(Ordering::Relaxed)
    }

    pub fn active_voices(&self) -> usize {
        self.active_voices.load(Ordering::Relaxed)
    }

    pub fn num_voices(&self) -> usize {
        self.num_voices.load(Ordering::Relaxed)
    }

    pub fn num_regions(&self) -> usize {
        self.num_regions.load(Ordering::Relaxed)
    }

    pub fn num_curves(&self) -> usize {
        self.num_curves.load(Ordering::Relaxed)
    }

    pub fn blocks_rendered(&self) -> u64 {
        self.blocks_rendered.load(Ordering::Relaxed)
    }

    pub(crate) fn record_stale_response(&self) {
        self.stale_responses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_block(&self, active_voices: usize) {
        self.active_voices.store(active_voices, Ordering::Relaxed);
        self.blocks_rendered.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn set_num_voices(&self, count: usize) {
        self.num_voices.store(count, Ordering::Relaxed);
    }

    pub(crate) fn set_instrument_size(&self, regions: usize, curves: usize) {
        self.num_regions.store(regions, Ordering::Relaxed);
        self.num_curves.store(curves, Ordering::Relaxed);
    }
}

/// Create a connected pair of endpoints with `capacity` slots per queue
pub fn link(capacity: usize) -> (RtLink, WorkerLink) {
    let capacity = capacity.max(1);
    let (request_tx, request_rx) = HeapRb::<WorkRequest>::new(capacity).split();
    let (response_tx, response_rx) = HeapRb::<WorkResponse>::new(capacity).split();
    let (retire_tx, retire_rx) = HeapRb::<Retired>::new(capacity).split();
    let status = Arc::new(Status::default());

    let rt = RtLink {
        requests: request_tx,
        responses: response_rx,
        retired: retire_tx,
        in_flight: 0,
        status: Arc::clone(&status),
    };
    let worker = WorkerLink {
        requests: request_rx,
        responses: response_tx,
        retired: retire_rx,
        status,
    };
    (rt, worker)
}

/// Audio-thread endpoint; every method is wait-free and allocation-free
pub struct RtLink {
    requests: HeapProd<WorkRequest>,
    responses: HeapCons<WorkResponse>,
    retired: HeapProd<Retired>,
    in_flight: u8,
    status: Arc<Status>,
}

impl RtLink {
    /// Whether a request of `kind` has been sent and not yet completed
    pub fn is_in_flight(&self, kind: WorkKind) -> bool {
        self.in_flight & kind.bit() != 0
    }

    /// Send a request
    ///
    /// Returns false without sending when a request of the same kind is in
    /// flight, or when the queue is full (the request is dropped and counted).
    pub fn submit(&mut self, request: WorkRequest) -> bool {
        let kind = request.kind();
        if self.is_in_flight(kind) {
            return false;
        }
        if self.requests.try_push(request).is_err() {
            self.status.dropped_requests.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        self.in_flight |= kind.bit();
        true
    }

    /// Take the next response, marking its kind idle on `Completed`
    pub fn poll(&mut self) -> Option<WorkResponse> {
        let response = self.responses.try_pop()?;
        if let WorkResponse::Completed(kind) = response {
            self.in_flight &= !kind.bit();
        }
        Some(response)
    }

    /// Hand a replaced snapshot to the worker; gives it back if the queue is full
    pub fn retire(&mut self, retired: Retired) -> Result<(), Retired> {
        self.retired.try_push(retired)
    }

    pub fn status(&self) -> &Arc<Status> {
        &self.status
    }
}

/// Worker-thread endpoint
pub struct WorkerLink {
    requests: HeapCons<WorkRequest>,
    responses: HeapProd<WorkResponse>,
    retired: HeapCons<Retired>,
    status: Arc<Status>,
}

impl WorkerLink {
    /// Take the next request in submission order
    pub fn next_request(&mut self) -> Option<WorkRequest> {
        self.requests.try_pop()
    }

    /// Queue a response; gives it back if the queue is full
    pub fn try_respond(&mut self, response: WorkResponse) -> Result<(), WorkResponse> {
        self.responses.try_push(response)
    }

    /// Free every retired snapshot; returns how many were freed
    pub fn drain_retired(&mut self) -> usize {
        let mut count = 0;
        while let Some(retired) = self.retired.try_pop() {
            drop(retired);
            count += 1;
        }
        count
    }

    pub fn status(&self) -> &Arc<Status> {
        &self.status
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synth::VoicePool;

    #[test]
    fn test_one_request_per_kind() {
        let (mut rt, mut worker) = link(8);
        assert!(rt.submit(WorkRequest::ReloadCheck));
        assert!(!rt.submit(WorkRequest::ReloadCheck));
        assert!(rt.is_in_flight(WorkKind::ReloadCheck));
        assert!(rt.submit(WorkRequest::LogStatus));

        assert_eq!(worker.next_request(), Some(WorkRequest::ReloadCheck));
        assert_eq!(worker.next_request(), Some(WorkRequest::LogStatus));
        assert_eq!(worker.next_request(), None);
    }

    #[test]
    fn test_completed_clears_in_flight() {
        let (mut rt, mut worker) = link(8);
        rt.submit(WorkRequest::SetPreloadSize(4096));
        worker.next_request();
        assert!(worker.try_respond(WorkResponse::PreloadSizeChanged(4096)).is_ok());
        assert!(worker.try_respond(WorkResponse::Completed(WorkKind::SetPreloadSize)).is_ok());

        assert!(matches!(rt.poll(), Some(WorkResponse::PreloadSizeChanged(4096))));
        assert!(rt.is_in_flight(WorkKind::SetPreloadSize));
        assert!(matches!(rt.poll(), Some(WorkResponse::Completed(_))));
        assert!(!rt.is_in_flight(WorkKind::SetPreloadSize));
        assert!(rt.poll().is_none());
    }

    #[test]
    fn test_full_queue_drops_and_counts() {
        let (mut rt, _worker) = link(2);
        assert!(rt.submit(WorkRequest::ReloadCheck));
        assert!(rt.submit(WorkRequest::LogStatus));
        assert!(!rt.submit(WorkRequest::SetVoiceCount(4)));
        assert!(!rt.is_in_flight(WorkKind::SetVoiceCount));
        assert_eq!(rt.status().dropped_requests(), 1);
    }

    #[test]
    fn test_full_response_queue_gives_back() {
        let (mut rt, mut worker) = link(1);
        assert!(worker.try_respond(WorkResponse::Completed(WorkKind::LogStatus)).is_ok());
        let back = worker.try_respond(WorkResponse::Completed(WorkKind::ReloadCheck));
        assert!(matches!(back, Err(WorkResponse::Completed(WorkKind::ReloadCheck))));
        assert!(rt.poll().is_some());
        assert!(worker.try_respond(WorkResponse::Completed(WorkKind::ReloadCheck)).is_ok());
    }

    #[test]
    fn test_retire_round_trip() {
        let (mut rt, mut worker) = link(1);
        assert!(rt.retire(Retired::Voices(Box::new(VoicePool::with_capacity(4)))).is_ok());
        assert!(rt.retire(Retired::Voices(Box::new(VoicePool::with_capacity(4)))).is_err());
        assert_eq!(worker.drain_retired(), 1);
        assert_eq!(worker.drain_retired(), 0);
    }
}
