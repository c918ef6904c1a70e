// src/engine/worker.rs
//
// The single background worker: message protocol, the worker loop that owns
// the codec registry, and per-task execution. Task-level codec failures are
// caught and reported; a panic escaping this loop kills the worker and is
// handled by the orchestrator's respawn path.

use std::sync::Arc;
use std::time::Instant;

use crossbeam_channel::{Receiver, Sender};
use tracing::{debug, warn};

use crate::engine::artifact::{assemble, Artifact, TaskOutcome};
use crate::engine::decoder::sniff_format;
use crate::engine::policy::{apply_adaptive_policy, EncodeParams};
use crate::engine::registry::CodecRegistry;
use crate::error::{PixpressError, Result};
use crate::formats::Format;
use crate::levels::{effective_level, resolve, QualityLevel};
use crate::request::{CompressionRequest, RequestId};

#[derive(Debug, Clone)]
pub(crate) struct JobOptions {
    pub quality_level: QualityLevel,
    pub target_format: Option<Format>,
}

#[derive(Debug, Clone)]
pub(crate) struct JobPayload {
    pub id: RequestId,
    pub input: Arc<Vec<u8>>,
    pub input_mime: String,
    pub options: JobOptions,
}

impl JobPayload {
    pub fn from_request(request: CompressionRequest) -> Self {
        Self {
            id: request.id,
            input: request.input,
            input_mime: request.input_mime,
            options: JobOptions {
                quality_level: request.quality_level,
                target_format: request.target_format,
            },
        }
    }
}

pub(crate) enum WorkerRequest {
    Compress(JobPayload),
    /// Test hook simulating an error escaping the task boundary.
    #[cfg(test)]
    Poison,
}

pub(crate) enum WorkerResponse {
    Started { id: RequestId },
    Finished { id: RequestId, outcome: TaskOutcome },
}

/// Worker loop. Owns the codec registry (and with it the stateful JPEG XL
/// handle) for as long as this worker instance lives. Exits when the request
/// channel disconnects.
pub(crate) fn run_worker(rx: Receiver<WorkerRequest>, tx: Sender<WorkerResponse>) {
    let mut registry = CodecRegistry::new();
    while let Ok(message) = rx.recv() {
        match message {
            WorkerRequest::Compress(job) => {
                let id = job.id.clone();
                let _ = tx.send(WorkerResponse::Started { id: id.clone() });
                let outcome = execute_job(&mut registry, &job);
                let _ = tx.send(WorkerResponse::Finished { id, outcome });
            }
            #[cfg(test)]
            WorkerRequest::Poison => panic!("injected fatal worker failure"),
        }
    }
    debug!("worker loop exiting");
}

fn execute_job(registry: &mut CodecRegistry, job: &JobPayload) -> TaskOutcome {
    let started = Instant::now();
    debug!(id = %job.id, mime = %job.input_mime, "task compressing");
    match compress(registry, job, started) {
        Ok(artifact) => {
            debug!(
                id = %job.id,
                size = artifact.size_bytes,
                ratio = artifact.ratio_percent,
                "task done"
            );
            TaskOutcome::Success(artifact)
        }
        Err(err) => {
            warn!(id = %job.id, error = %err, "task failed");
            TaskOutcome::Failure {
                message: err.to_string(),
            }
        }
    }
}

/// Output format when the caller did not force one: the input's own format -
/// mime first, magic bytes second, jpeg as the last resort. Heic flows
/// through the encode substitution downstream.
fn output_format_for(job: &JobPayload) -> Format {
    job.options
        .target_format
        .or_else(|| Format::from_mime(&job.input_mime))
        .or_else(|| sniff_format(&job.input))
        .unwrap_or(Format::Jpeg)
}

pub(crate) fn compress(
    registry: &mut CodecRegistry,
    job: &JobPayload,
    started: Instant,
) -> Result<Artifact> {
    let buffer = registry.decode(&job.input, &job.input_mime)?;

    let requested = output_format_for(job);
    let encode_format = requested.encode_target();
    let level = effective_level(encode_format, job.options.quality_level);
    let config = resolve(encode_format, level);
    if !config.supported {
        return Err(PixpressError::unsupported_level(encode_format, level));
    }

    let mut params = EncodeParams::from_config(&config);
    apply_adaptive_policy(&mut params, buffer.pixel_count());

    let (encoded, actual_format) = registry.encode(&buffer, requested, &params)?;
    Ok(assemble(
        job.input.len(),
        encoded,
        actual_format,
        started.elapsed(),
    ))
}
