//! The transport engine behind every transfer.
//!
//! # Responsibilities
//! - Own a current-thread tokio runtime and one shared `reqwest` client
//! - Run each transfer as a spawned job that reports back over a channel
//! - Make progress only while a tick drives it, for a bounded time
//!
//! # Design Decisions
//! - The runtime never runs on its own thread; spawned jobs advance only
//!   inside [`Engine::drive`], which keeps all state on the tick thread
//! - Download files are created on the first received byte, so a transfer
//!   that fails before any payload leaves nothing behind
//! - Bodies of error responses (status >= 400) are never written to disk
//! - Upload sources are streamed from the open file handle in fixed-size
//!   reads; the declared length comes from the file's metadata

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::header::CONTENT_LENGTH;
use reqwest::{redirect, Body, Client, RequestBuilder, Url};
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::io::ReaderStream;
use tokio::runtime::Runtime;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;

use crate::config::TransferConfig;
use crate::transfer::task::TransferId;

/// Read size when streaming an upload source.
const UPLOAD_CHUNK: usize = 64 * 1024;

/// Why a job ended without a usable response.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("http: {0}")]
    Http(#[from] reqwest::Error),

    #[error("file: {0}")]
    Io(#[from] std::io::Error),
}

/// Work handed to the engine.
#[derive(Debug)]
pub(crate) enum Job {
    Fetch { url: Url, buffer: bool },
    Post { url: Url, body: Vec<u8>, buffer: bool },
    Download { url: Url, path: PathBuf },
    Upload { url: Url, file: std::fs::File, length: u64 },
}

/// Completion report of one job.
#[derive(Debug)]
pub(crate) struct Finished {
    pub id: TransferId,
    /// Response status, `None` if no response arrived.
    pub status: Option<u16>,
    pub body: Vec<u8>,
    /// The destination file was created and may hold partial data.
    pub wrote_file: bool,
    pub error: Option<JobError>,
}

impl Finished {
    pub fn succeeded(&self) -> bool {
        self.error.is_none() && self.status.is_some_and(|status| status < 400)
    }
}

pub(crate) struct Engine {
    runtime: Runtime,
    client: Client,
    tx: mpsc::UnboundedSender<Finished>,
    rx: mpsc::UnboundedReceiver<Finished>,
    /// Reports received while driving but not yet handed out.
    ready: VecDeque<Finished>,
}

impl Engine {
    pub fn new(config: &TransferConfig) -> Result<Self, EngineError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(EngineError::Runtime)?;

        let client = {
            let _guard = runtime.enter();
            Client::builder()
                .connect_timeout(config.connect_timeout())
                .timeout(config.total_timeout())
                .redirect(redirect::Policy::limited(config.max_redirects))
                .danger_accept_invalid_certs(config.accept_invalid_certs)
                .user_agent(config.user_agent.as_str())
                .build()
                .map_err(EngineError::Client)?
        };

        let (tx, rx) = mpsc::unbounded_channel();

        Ok(Self {
            runtime,
            client,
            tx,
            rx,
            ready: VecDeque::new(),
        })
    }

    /// Start a job. It makes no progress until the next [`Engine::drive`].
    pub fn submit(&self, id: TransferId, job: Job) -> AbortHandle {
        let client = self.client.clone();
        let tx = self.tx.clone();
        self.runtime
            .spawn(async move {
                let finished = run(client, id, job).await;
                tx.send(finished).ok();
            })
            .abort_handle()
    }

    /// Let jobs run: wait up to `wait` for the first report, then give
    /// the scheduler `iterations` more passes.
    pub fn drive(&mut self, wait: Duration, iterations: usize) {
        let wait = if self.ready.is_empty() { wait } else { Duration::ZERO };
        let Self { runtime, rx, ready, .. } = self;

        runtime.block_on(async move {
            if let Ok(Some(finished)) = tokio::time::timeout(wait, rx.recv()).await {
                ready.push_back(finished);
            }
            for _ in 0..iterations {
                tokio::task::yield_now().await;
                while let Ok(finished) = rx.try_recv() {
                    ready.push_back(finished);
                }
            }
        });
    }

    /// Oldest completion report not yet handed out.
    pub fn next_finished(&mut self) -> Option<Finished> {
        self.ready.pop_front()
    }

    #[cfg(test)]
    pub fn ready_len(&self) -> usize {
        self.ready.len()
    }
}

/// Errors creating the engine.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to build transfer runtime: {0}")]
    Runtime(std::io::Error),

    #[error("failed to build HTTP client: {0}")]
    Client(reqwest::Error),
}

async fn run(client: Client, id: TransferId, job: Job) -> Finished {
    let mut finished = Finished {
        id,
        status: None,
        body: Vec::new(),
        wrote_file: false,
        error: None,
    };

    let outcome = match job {
        Job::Fetch { url, buffer } => fetch(client.get(url), buffer, &mut finished).await,
        Job::Post { url, body, buffer } => fetch(client.post(url).body(body), buffer, &mut finished).await,
        Job::Download { url, path } => download(client.get(url), &path, &mut finished).await,
        Job::Upload { url, file, length } => upload(&client, url, file, length, &mut finished).await,
    };

    if let Err(e) = outcome {
        finished.error = Some(e);
    }
    finished
}

async fn fetch(request: RequestBuilder, buffer: bool, finished: &mut Finished) -> Result<(), JobError> {
    let mut response = request.send().await?;
    finished.status = Some(response.status().as_u16());

    while let Some(chunk) = response.chunk().await? {
        if buffer {
            finished.body.extend_from_slice(&chunk);
        }
    }
    Ok(())
}

async fn download(request: RequestBuilder, path: &Path, finished: &mut Finished) -> Result<(), JobError> {
    let mut response = request.send().await?;
    let status = response.status().as_u16();
    finished.status = Some(status);
    if status >= 400 {
        return Ok(());
    }

    let mut file = None;
    while let Some(chunk) = response.chunk().await? {
        if file.is_none() {
            file = Some(create_destination(path).await?);
            finished.wrote_file = true;
        }
        if let Some(out) = file.as_mut() {
            out.write_all(&chunk).await?;
        }
    }

    match file {
        Some(mut out) => out.flush().await?,
        // Successful empty body: still leave an (empty) file behind.
        None => {
            create_destination(path).await?;
            finished.wrote_file = true;
        }
    }
    Ok(())
}

async fn create_destination(path: &Path) -> std::io::Result<tokio::fs::File> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::File::create(path).await
}

async fn upload(
    client: &Client,
    url: Url,
    file: std::fs::File,
    length: u64,
    finished: &mut Finished,
) -> Result<(), JobError> {
    let source = tokio::fs::File::from_std(file).take(length);
    let body = Body::wrap_stream(ReaderStream::with_capacity(source, UPLOAD_CHUNK));

    let mut response = client
        .put(url)
        .header(CONTENT_LENGTH, length)
        .body(body)
        .send()
        .await?;
    finished.status = Some(response.status().as_u16());
    while response.chunk().await?.is_some() {}
    Ok(())
}
