//! Transfer task types.
//!
//! # Responsibilities
//! - Describe an outbound transfer before it starts (`TransferRequest`)
//! - Track a running transfer inside the manager (`TransferTask`)
//! - Decide where response bytes go (`Sink`)

use std::path::PathBuf;
use std::time::{Instant, SystemTime};

use tokio::task::AbortHandle;

/// Handle for one transfer, unique within a manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TransferId(u64);

impl TransferId {
    pub(crate) fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for TransferId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "xfer-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferKind {
    /// GET, response body buffered in memory.
    Get,
    /// POST with an in-memory body, response body buffered in memory.
    Post,
    /// GET streamed into a file.
    Download,
    /// PUT with a file as the request body.
    Upload,
}

impl TransferKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferKind::Get => "get",
            TransferKind::Post => "post",
            TransferKind::Download => "download",
            TransferKind::Upload => "upload",
        }
    }
}

/// Description of a transfer to start.
///
/// ```ignore
/// let request = TransferRequest::get("http://example.com/items").query([("page", "2")]);
/// let id = manager.start(request)?;
/// ```
#[derive(Debug, Clone)]
pub struct TransferRequest {
    pub(crate) kind: TransferKind,
    pub(crate) url: String,
    pub(crate) query: Vec<(String, String)>,
    pub(crate) body: Vec<u8>,
    pub(crate) path: Option<PathBuf>,
    pub(crate) modified: Option<SystemTime>,
    pub(crate) notify: bool,
}

impl TransferRequest {
    fn new(kind: TransferKind, url: impl Into<String>) -> Self {
        Self {
            kind,
            url: url.into(),
            query: Vec::new(),
            body: Vec::new(),
            path: None,
            modified: None,
            notify: true,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(TransferKind::Get, url)
    }

    pub fn post(url: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        let mut request = Self::new(TransferKind::Post, url);
        request.body = body.into();
        request
    }

    /// Stream the response into `path`. On success the file's modification
    /// time is set to `modified` when given; on failure the file is removed.
    pub fn download(url: impl Into<String>, path: impl Into<PathBuf>, modified: Option<SystemTime>) -> Self {
        let mut request = Self::new(TransferKind::Download, url);
        request.path = Some(path.into());
        request.modified = modified;
        request
    }

    /// Send the contents of `path` as a PUT body.
    pub fn upload(url: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        let mut request = Self::new(TransferKind::Upload, url);
        request.path = Some(path.into());
        request
    }

    /// Append query pairs to the URL.
    pub fn query<K, V>(mut self, pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.query
            .extend(pairs.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Do not report completion to the application.
    pub fn detached(mut self) -> Self {
        self.notify = false;
        self
    }

    pub fn kind(&self) -> TransferKind {
        self.kind
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

/// Where the response body of a running transfer goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Sink {
    /// Kept in memory and handed to the application on success.
    Buffer,
    /// Streamed into a file created on the first received byte.
    File {
        path: PathBuf,
        modified: Option<SystemTime>,
    },
    /// Read and dropped.
    Discard,
}

impl Sink {
    pub fn for_request(request: &TransferRequest) -> Self {
        match (request.kind, &request.path) {
            (TransferKind::Download, Some(path)) => Sink::File {
                path: path.clone(),
                modified: request.modified,
            },
            (TransferKind::Get | TransferKind::Post, _) if request.notify => Sink::Buffer,
            _ => Sink::Discard,
        }
    }
}

/// A transfer registered with the engine.
#[derive(Debug)]
pub(crate) struct TransferTask {
    pub id: TransferId,
    pub kind: TransferKind,
    pub url: String,
    pub sink: Sink,
    pub notify: bool,
    pub abort: AbortHandle,
    pub started: Instant,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builders_set_kind_and_notify() {
        assert_eq!(TransferRequest::get("http://a").kind(), TransferKind::Get);
        assert!(TransferRequest::get("http://a").notify);
        assert!(!TransferRequest::post("http://a", "x").detached().notify);
    }

    #[test]
    fn query_pairs_accumulate() {
        let request = TransferRequest::get("http://a")
            .query([("a", "1")])
            .query(vec![("b".to_string(), "2".to_string())]);
        assert_eq!(
            request.query,
            vec![("a".into(), "1".into()), ("b".into(), "2".into())]
        );
    }

    #[test]
    fn sink_follows_kind() {
        let download = TransferRequest::download("http://a", "/tmp/x", None);
        assert!(matches!(Sink::for_request(&download), Sink::File { .. }));
        assert_eq!(Sink::for_request(&TransferRequest::get("http://a")), Sink::Buffer);
        assert_eq!(
            Sink::for_request(&TransferRequest::post("http://a", "x").detached()),
            Sink::Discard
        );
        assert_eq!(
            Sink::for_request(&TransferRequest::upload("http://a", "/tmp/x")),
            Sink::Discard
        );
    }
}
