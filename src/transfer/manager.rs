//! Bounded pool of outbound transfers.
//!
//! # Responsibilities
//! - Admit new transfers up to the configured cap
//! - Drive the engine for a bounded time each tick
//! - Deliver at most one completion per tick
//! - Finish file-backed transfers (modification time on success,
//!   partial file removed on failure)
//!
//! # Design Decisions
//! - A rejected start creates nothing and hands out no handle
//! - Success means a response arrived without transport error and its
//!   status is below 400
//! - Cancelled transfers are forgotten; a late report for them is ignored

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime};

use reqwest::Url;
use thiserror::Error;

use crate::config::TransferConfig;
use crate::observability::metrics;
use crate::transfer::engine::{Engine, EngineError, Finished, Job};
use crate::transfer::task::{Sink, TransferId, TransferKind, TransferRequest, TransferTask};

#[derive(Debug, Error)]
pub enum TransferError {
    #[error("transfer capacity exhausted ({max} active)")]
    CapacityExhausted { max: usize },

    #[error("invalid transfer url {url:?}: {source}")]
    InvalidUrl { url: String, source: url::ParseError },

    #[error("unsupported url scheme {0:?}")]
    UnsupportedScheme(String),

    #[error("{0} transfer requires a file path")]
    MissingPath(&'static str),

    #[error("cannot read upload source {}: {source}", .path.display())]
    Source { path: PathBuf, source: std::io::Error },

    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// A finished transfer reported to the application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completed {
    pub id: TransferId,
    pub ok: bool,
    /// Response body, only for successful in-memory transfers.
    pub body: Option<Vec<u8>>,
}

pub struct TransferManager {
    engine: Engine,
    tasks: BTreeMap<TransferId, TransferTask>,
    next_id: u64,
    max_active: usize,
    poll_wait: Duration,
    drive_iterations: usize,
}

impl TransferManager {
    pub fn new(config: &TransferConfig) -> Result<Self, TransferError> {
        if config.accept_invalid_certs {
            tracing::warn!("TLS certificate validation disabled for outbound transfers");
        }

        Ok(Self {
            engine: Engine::new(config)?,
            tasks: BTreeMap::new(),
            next_id: 1,
            max_active: config.max_active,
            poll_wait: config.poll_wait(),
            drive_iterations: config.drive_iterations,
        })
    }

    /// Register a transfer. It starts moving on the next [`poll`](Self::poll).
    pub fn start(&mut self, request: TransferRequest) -> Result<TransferId, TransferError> {
        if self.tasks.len() >= self.max_active {
            metrics::record_transfer_rejected();
            tracing::warn!(
                active = self.tasks.len(),
                url = %request.url,
                "Transfer rejected: capacity exhausted"
            );
            return Err(TransferError::CapacityExhausted {
                max: self.max_active,
            });
        }

        let url = build_url(&request.url, &request.query)?;
        let sink = Sink::for_request(&request);
        let buffer = sink == Sink::Buffer;

        let job = match request.kind {
            TransferKind::Get => Job::Fetch { url, buffer },
            TransferKind::Post => Job::Post {
                url,
                body: request.body,
                buffer,
            },
            TransferKind::Download => {
                let path = request.path.ok_or(TransferError::MissingPath("download"))?;
                Job::Download { url, path }
            }
            TransferKind::Upload => {
                let path = request.path.ok_or(TransferError::MissingPath("upload"))?;
                let (file, length) = open_source(&path)?;
                Job::Upload { url, file, length }
            }
        };

        let id = TransferId::new(self.next_id);
        self.next_id += 1;

        let abort = self.engine.submit(id, job);
        self.tasks.insert(
            id,
            TransferTask {
                id,
                kind: request.kind,
                url: request.url,
                sink,
                notify: request.notify,
                abort,
                started: Instant::now(),
            },
        );

        metrics::record_transfer_started(request.kind.as_str());
        tracing::debug!(transfer_id = %id, kind = request.kind.as_str(), active = self.tasks.len(), "Transfer started");

        Ok(id)
    }

    /// Fire-and-forget POST. Returns `false` when it could not be started.
    pub fn push(&mut self, url: &str, payload: impl Into<Vec<u8>>) -> bool {
        self.start(TransferRequest::post(url, payload).detached())
            .is_ok()
    }

    /// Abandon a transfer. Its completion is never reported.
    pub fn cancel(&mut self, id: TransferId) -> bool {
        match self.tasks.remove(&id) {
            Some(task) => {
                task.abort.abort();
                tracing::debug!(transfer_id = %id, "Transfer cancelled");
                true
            }
            None => false,
        }
    }

    /// Drive in-flight transfers and finish at most one of them.
    ///
    /// Returns the finished transfer if it asked to be notified.
    pub fn poll(&mut self) -> Option<Completed> {
        if self.tasks.is_empty() {
            return None;
        }

        self.engine.drive(self.poll_wait, self.drive_iterations);

        while let Some(finished) = self.engine.next_finished() {
            if let Some(task) = self.tasks.remove(&finished.id) {
                return finish(task, finished);
            }
        }
        None
    }

    /// Number of registered transfers.
    pub fn active(&self) -> usize {
        self.tasks.len()
    }
}

impl Drop for TransferManager {
    fn drop(&mut self) {
        for task in self.tasks.values() {
            task.abort.abort();
        }
        if !self.tasks.is_empty() {
            tracing::debug!(abandoned = self.tasks.len(), "Transfer manager dropped with active transfers");
        }
    }
}

fn build_url(raw: &str, query: &[(String, String)]) -> Result<Url, TransferError> {
    let mut url = Url::parse(raw).map_err(|source| TransferError::InvalidUrl {
        url: raw.to_string(),
        source,
    })?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(TransferError::UnsupportedScheme(url.scheme().to_string()));
    }

    if !query.is_empty() {
        url.query_pairs_mut().extend_pairs(query);
    }
    Ok(url)
}

fn open_source(path: &Path) -> Result<(std::fs::File, u64), TransferError> {
    let source = |source| TransferError::Source {
        path: path.to_path_buf(),
        source,
    };
    let file = std::fs::File::open(path).map_err(source)?;
    let length = file.metadata().map_err(source)?.len();
    Ok((file, length))
}

fn finish(task: TransferTask, finished: Finished) -> Option<Completed> {
    let ok = finished.succeeded();
    let elapsed_ms = task.started.elapsed().as_millis() as u64;

    if let Sink::File { path, modified } = &task.sink {
        if ok {
            if let Some(modified) = modified {
                if let Err(e) = set_modified(path, *modified) {
                    tracing::warn!(transfer_id = %task.id, path = %path.display(), error = %e, "Failed to set modification time");
                }
            }
        } else if finished.wrote_file {
            if let Err(e) = std::fs::remove_file(path) {
                tracing::warn!(transfer_id = %task.id, path = %path.display(), error = %e, "Failed to remove partial download");
            }
        }
    }

    if ok {
        tracing::debug!(
            transfer_id = %task.id,
            status = ?finished.status,
            elapsed_ms,
            "Transfer completed"
        );
    } else {
        tracing::warn!(
            transfer_id = %task.id,
            url = %task.url,
            status = ?finished.status,
            error = ?finished.error,
            elapsed_ms,
            "Transfer failed"
        );
    }
    metrics::record_transfer_completed(task.kind.as_str(), ok);

    if !task.notify {
        return None;
    }

    let body = (ok && task.sink == Sink::Buffer).then_some(finished.body);
    Some(Completed {
        id: task.id,
        ok,
        body,
    })
}

fn set_modified(path: &Path, modified: SystemTime) -> std::io::Result<()> {
    std::fs::File::options()
        .write(true)
        .open(path)?
        .set_modified(modified)
}
