// src/engine/api.rs
//
// The compression engine: the caller-facing orchestrator owning the single
// background worker. Submissions are non-blocking; results are delivered
// asynchronously, correlated strictly by request id. A fatal worker failure
// terminates the whole worker, fails every outstanding task, and the next
// submission transparently respawns a fresh worker with empty codec caches.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use parking_lot::Mutex;
use tracing::{debug, error, warn};

use crate::engine::artifact::{CompressionResult, TaskOutcome};
use crate::engine::worker::{run_worker, JobPayload, WorkerRequest, WorkerResponse};
use crate::error::{PixpressError, Result};
use crate::request::{CompressionRequest, CompressorSettings, RequestId};

/// Task lifecycle: Pending -> Compressing -> Done | Error.
/// Error -> Compressing happens only through an explicit [`CompressionEngine::retry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TaskState {
    Pending = 0,
    Compressing = 1,
    Done = 2,
    Error = 3,
}

impl TaskState {
    fn from_u8(value: u8) -> TaskState {
        match value {
            0 => TaskState::Pending,
            1 => TaskState::Compressing,
            2 => TaskState::Done,
            _ => TaskState::Error,
        }
    }
}

/// Handle to one submitted task. The result arrives exactly once.
pub struct TaskHandle {
    id: RequestId,
    rx: Receiver<CompressionResult>,
    state: Arc<AtomicU8>,
}

impl TaskHandle {
    pub fn id(&self) -> &RequestId {
        &self.id
    }

    pub fn state(&self) -> TaskState {
        TaskState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Block until the result is delivered.
    pub fn wait(self) -> CompressionResult {
        match self.rx.recv() {
            Ok(result) => result,
            Err(_) => CompressionResult {
                id: self.id,
                outcome: TaskOutcome::Failure {
                    message: PixpressError::EngineTerminated.to_string(),
                },
            },
        }
    }

    pub fn wait_timeout(&self, timeout: Duration) -> Option<CompressionResult> {
        self.rx.recv_timeout(timeout).ok()
    }

    pub fn try_result(&self) -> Option<CompressionResult> {
        self.rx.try_recv().ok()
    }
}

struct PendingEntry {
    tx: Sender<CompressionResult>,
    state: Arc<AtomicU8>,
}

type PendingMap = Arc<Mutex<HashMap<RequestId, PendingEntry>>>;

/// Correlates worker responses with outstanding requests. Exits when the
/// worker's response channel disconnects, finalizing whatever is left.
fn pump_responses(
    resp_rx: Receiver<WorkerResponse>,
    pending: PendingMap,
    crashed: Arc<AtomicBool>,
    shutting_down: Arc<AtomicBool>,
) {
    for response in resp_rx.iter() {
        match response {
            WorkerResponse::Started { id } => {
                let pending = pending.lock();
                match pending.get(&id) {
                    Some(entry) => entry
                        .state
                        .store(TaskState::Compressing as u8, Ordering::SeqCst),
                    None => warn!(%id, "ignoring start notice for unknown request id"),
                }
            }
            WorkerResponse::Finished { id, outcome } => {
                let entry = pending.lock().remove(&id);
                match entry {
                    Some(entry) => {
                        let state = if outcome.is_success() {
                            TaskState::Done
                        } else {
                            TaskState::Error
                        };
                        entry.state.store(state as u8, Ordering::SeqCst);
                        let _ = entry.tx.send(CompressionResult { id, outcome });
                    }
                    None => warn!(%id, "ignoring response for unknown request id"),
                }
            }
        }
    }

    // The worker is gone. Everything still outstanding gets finalized: a
    // task in a dead worker can never run, and no request may be dropped
    // silently.
    let leftovers: Vec<(RequestId, PendingEntry)> = pending.lock().drain().collect();
    let message = if shutting_down.load(Ordering::SeqCst) {
        PixpressError::EngineTerminated.to_string()
    } else {
        crashed.store(true, Ordering::SeqCst);
        error!(
            outstanding = leftovers.len(),
            "worker terminated unexpectedly; failing in-flight tasks"
        );
        PixpressError::EngineCrashed.to_string()
    };
    for (id, entry) in leftovers {
        entry.state.store(TaskState::Error as u8, Ordering::SeqCst);
        let _ = entry.tx.send(CompressionResult {
            id,
            outcome: TaskOutcome::Failure {
                message: message.clone(),
            },
        });
    }
}

/// One worker incarnation: its request channel, pending map, and threads.
struct WorkerLink {
    req_tx: Option<Sender<WorkerRequest>>,
    pending: PendingMap,
    crashed: Arc<AtomicBool>,
    shutting_down: Arc<AtomicBool>,
    worker_thread: Option<JoinHandle<()>>,
    pump_thread: Option<JoinHandle<()>>,
}

impl WorkerLink {
    fn spawn(generation: u64) -> Self {
        let (req_tx, req_rx) = unbounded();
        let (resp_tx, resp_rx) = unbounded();
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let crashed = Arc::new(AtomicBool::new(false));
        let shutting_down = Arc::new(AtomicBool::new(false));

        debug!(generation, "spawning compression worker");
        let worker_thread = std::thread::Builder::new()
            .name(format!("pixpress-worker-{generation}"))
            .spawn(move || run_worker(req_rx, resp_tx))
            .expect("failed to spawn compression worker thread");

        let pump_pending = Arc::clone(&pending);
        let pump_crashed = Arc::clone(&crashed);
        let pump_shutdown = Arc::clone(&shutting_down);
        let pump_thread = std::thread::Builder::new()
            .name(format!("pixpress-pump-{generation}"))
            .spawn(move || pump_responses(resp_rx, pump_pending, pump_crashed, pump_shutdown))
            .expect("failed to spawn response pump thread");

        Self {
            req_tx: Some(req_tx),
            pending,
            crashed,
            shutting_down,
            worker_thread: Some(worker_thread),
            pump_thread: Some(pump_thread),
        }
    }

    fn is_crashed(&self) -> bool {
        self.crashed.load(Ordering::SeqCst)
    }

    fn register(
        &self,
        id: RequestId,
        tx: Sender<CompressionResult>,
        state: Arc<AtomicU8>,
    ) -> Result<()> {
        let mut pending = self.pending.lock();
        if pending.contains_key(&id) {
            return Err(PixpressError::duplicate_request_id(id.as_str()));
        }
        pending.insert(id, PendingEntry { tx, state });
        Ok(())
    }

    fn unregister(&self, id: &RequestId) {
        self.pending.lock().remove(id);
    }

    /// Returns the message back to the caller when the worker is gone.
    fn send(&self, message: WorkerRequest) -> std::result::Result<(), WorkerRequest> {
        match &self.req_tx {
            Some(tx) => tx.send(message).map_err(|err| err.into_inner()),
            None => Err(message),
        }
    }
}

impl Drop for WorkerLink {
    fn drop(&mut self) {
        // Disconnect the request channel so the worker drains its queue and
        // exits; then wait for both threads. The worker join may carry a
        // panic from a fatal failure - that is expected on the respawn path.
        self.req_tx.take();
        if let Some(handle) = self.worker_thread.take() {
            let _ = handle.join();
        }
        if let Some(handle) = self.pump_thread.take() {
            let _ = handle.join();
        }
    }
}

struct EngineState {
    link: WorkerLink,
    generation: u64,
}

impl EngineState {
    fn respawn(&mut self) {
        self.generation += 1;
        error!(generation = self.generation, "respawning compression worker");
        let fresh = WorkerLink::spawn(self.generation);
        // Dropping the old link joins its threads; its pump finalizes any
        // tasks the dead worker left behind.
        let old = std::mem::replace(&mut self.link, fresh);
        drop(old);
    }
}

/// The compression orchestrator. One long-lived background worker per
/// engine; the calling context never decodes or encodes anything itself.
///
/// There is no cancellation: once a task reaches the worker it runs to
/// completion or failure. Backpressure is implicit and unbounded - bursts
/// queue behind the current task, raising tail latency but never dropping
/// work.
pub struct CompressionEngine {
    state: Mutex<EngineState>,
}

impl CompressionEngine {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(EngineState {
                link: WorkerLink::spawn(0),
                generation: 0,
            }),
        }
    }

    /// Enqueue a request on the background worker. Non-blocking; the result
    /// arrives on the returned handle. Requests run in FIFO arrival order.
    ///
    /// Fails fast only on a duplicate outstanding id; every accepted request
    /// eventually resolves to exactly one result.
    pub fn submit(&self, request: CompressionRequest) -> Result<TaskHandle> {
        let mut state = self.state.lock();
        if state.link.is_crashed() {
            state.respawn();
        }

        let id = request.id.clone();
        let (tx, rx) = bounded(1);
        let task_state = Arc::new(AtomicU8::new(TaskState::Pending as u8));
        state
            .link
            .register(id.clone(), tx, Arc::clone(&task_state))?;

        let message = WorkerRequest::Compress(JobPayload::from_request(request));
        let rx = match state.link.send(message) {
            Ok(()) => rx,
            Err(message) => {
                // The worker died between the crash check and the send. Its
                // pump may already have pushed a crash failure into the first
                // channel, so bind the resend to a fresh channel: the handle
                // must only ever see results from the registration that
                // actually carries the job.
                warn!(%id, "worker unavailable at submit; respawning");
                state.link.unregister(&id);
                state.respawn();
                let (tx, rx) = bounded(1);
                state
                    .link
                    .register(id.clone(), tx, Arc::clone(&task_state))?;
                if state.link.send(message).is_err() {
                    state.link.unregister(&id);
                    return Err(PixpressError::EngineCrashed);
                }
                rx
            }
        };

        Ok(TaskHandle {
            id,
            rx,
            state: task_state,
        })
    }

    /// Resubmit a failed request: a brand-new submission reusing the
    /// original input bytes and the settings passed *now*. If the caller's
    /// settings changed since the original submission, the retry applies the
    /// current ones - pass the recorded settings back in for a bit-identical
    /// retry. The task contract allows one retry per failed request.
    pub fn retry(
        &self,
        failed: &CompressionRequest,
        current: &CompressorSettings,
    ) -> Result<TaskHandle> {
        let request = CompressionRequest::new(
            failed.id.clone(),
            Arc::clone(&failed.input),
            failed.input_mime.clone(),
            current,
        );
        self.submit(request)
    }

    /// Submit and block until the result arrives.
    pub fn compress(&self, request: CompressionRequest) -> Result<CompressionResult> {
        Ok(self.submit(request)?.wait())
    }

    #[cfg(test)]
    pub(crate) fn inject_fatal(&self) {
        let state = self.state.lock();
        let _ = state.link.send(WorkerRequest::Poison);
    }

    #[cfg(test)]
    pub(crate) fn generation(&self) -> u64 {
        self.state.lock().generation
    }
}

impl Default for CompressionEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for CompressionEngine {
    fn drop(&mut self) {
        // Mark intentional shutdown so the pump finalizes any remainder as
        // "terminated" rather than "crashed".
        let state = self.state.get_mut();
        state.link.shutting_down.store(true, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::Format;
    use crate::levels::QualityLevel;
    use image::{DynamicImage, Rgb, RgbImage};
    use std::io::Cursor;

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x * 7 % 256) as u8, (y * 3 % 256) as u8, 99])
        });
        let mut buffer = Vec::new();
        DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut buffer), image::ImageFormat::Png)
            .unwrap();
        buffer
    }

    fn request(id: &str, target: Option<Format>) -> CompressionRequest {
        let settings = CompressorSettings {
            quality_level: QualityLevel::Balanced,
            target_format: target,
        };
        CompressionRequest::new(
            RequestId::new(id),
            png_bytes(16, 16),
            "image/png",
            &settings,
        )
    }

    #[test]
    fn test_submit_delivers_correlated_result() {
        let engine = CompressionEngine::new();
        let handle = engine.submit(request("solo", Some(Format::Jpeg))).unwrap();
        let result = handle.wait();
        assert_eq!(result.id.as_str(), "solo");
        match result.outcome {
            TaskOutcome::Success(artifact) => {
                assert_eq!(artifact.mime, "image/jpeg");
                assert!(!artifact.bytes.is_empty());
            }
            TaskOutcome::Failure { message } => panic!("unexpected failure: {message}"),
        }
    }

    #[test]
    fn test_state_reaches_done() {
        let engine = CompressionEngine::new();
        let handle = engine.submit(request("stateful", None)).unwrap();
        let state_probe = Arc::clone(&handle.state);
        let result = handle.wait();
        assert!(result.outcome.is_success());
        assert_eq!(
            TaskState::from_u8(state_probe.load(Ordering::SeqCst)),
            TaskState::Done
        );
    }

    #[test]
    fn test_concurrent_submissions_each_resolve_once() {
        let engine = CompressionEngine::new();
        let handles: Vec<TaskHandle> = (0..5)
            .map(|i| {
                engine
                    .submit(request(&format!("batch-{i}"), Some(Format::Webp)))
                    .unwrap()
            })
            .collect();

        for (i, handle) in handles.into_iter().enumerate() {
            let result = handle.wait();
            assert_eq!(result.id.as_str(), format!("batch-{i}"));
            assert!(result.outcome.is_success());
        }
    }

    #[test]
    fn test_duplicate_outstanding_id_rejected() {
        let engine = CompressionEngine::new();
        // Pin an entry into the pending map so the id is outstanding for sure.
        {
            let state = engine.state.lock();
            let (tx, _rx) = bounded(1);
            state
                .link
                .register(
                    RequestId::new("dup"),
                    tx,
                    Arc::new(AtomicU8::new(TaskState::Pending as u8)),
                )
                .unwrap();
        }
        let err = engine.submit(request("dup", None)).unwrap_err();
        assert!(matches!(err, PixpressError::DuplicateRequestId { .. }));
    }

    #[test]
    fn test_task_failure_outcome_not_crash() {
        let engine = CompressionEngine::new();
        let settings = CompressorSettings::default();
        let bad = CompressionRequest::new(
            RequestId::new("bad-bytes"),
            b"not an image".to_vec(),
            "image/png",
            &settings,
        );
        let result = engine.submit(bad).unwrap().wait();
        match result.outcome {
            TaskOutcome::Failure { message } => assert!(!message.is_empty()),
            TaskOutcome::Success(_) => panic!("garbage bytes must not decode"),
        }
        // The worker survived; a good request still goes through.
        let result = engine.submit(request("after-bad", None)).unwrap().wait();
        assert!(result.outcome.is_success());
    }

    #[test]
    fn test_fatal_failure_fails_inflight_and_respawns() {
        let engine = CompressionEngine::new();
        engine.inject_fatal();
        // Queued behind the poison: resolves either as a crash-failure (it
        // was in the dead worker's queue) or as a success (it raced onto the
        // respawned worker) - never silently dropped.
        let in_flight = engine.submit(request("t1", None)).unwrap();
        let result = in_flight
            .wait_timeout(Duration::from_secs(60))
            .expect("in-flight task must resolve");
        assert_eq!(result.id.as_str(), "t1");

        // A later submission lands on a fresh worker and completes.
        let result = engine.submit(request("t2", None)).unwrap().wait();
        assert!(result.outcome.is_success(), "post-respawn task must work");
        assert!(engine.generation() >= 1, "a respawn must have happened");
    }

    #[test]
    fn test_clean_shutdown_without_tasks() {
        let engine = CompressionEngine::new();
        drop(engine);
    }
}
