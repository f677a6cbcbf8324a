//! Logical streams: one sequential request processor per stream id.
//!
//! Each stream runs its own tokio task that drains an unbounded FIFO queue, so
//! requests on one stream are handled strictly in arrival order while different
//! streams proceed concurrently. Before a request reaches the
//! [`StreamListener`] it is checked against the stream's [`OpenFileTable`]:
//!
//! | Request | Precondition                      | Rejection                 |
//! |---------|-----------------------------------|---------------------------|
//! | open    | path not open                     | `FileLocked`              |
//! | close   | handle open                       | `FileNotOpen`             |
//! | stat    | path open                         | `FileNotOpen`             |
//! | read    | handle open                       | `FileNotOpen`             |
//! | readv   | non-empty, all handles open       | `ArgMissing`/`FileNotOpen`|
//! | write   | handle open with new or update    | `FileNotOpen`/`FileLocked`|
//! | sync    | handle open (Ok if not writable)  | `FileNotOpen`             |

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use super::manager::StreamRegistry;
use super::table::{OpenFile, OpenFileTable};
use crate::error::{Result, XrdError};
use crate::protocol::{
    CloseRequest, ErrorCode, FileHandle, OpenFlags, OpenRequest, ReadRequest, ReadVRequest,
    Request, RequestKind, Response, StatRequest, StreamId, SyncRequest, WriteRequest,
};
use crate::server::ConnectionContext;

/// Per-stream file operation hooks.
///
/// Hooks run on the stream's task after the open-file checks passed. A hook
/// either responds itself (through [`LogicalStream::respond`]) or returns an
/// error, which is turned into an error response for the request.
///
/// `on_open` must call [`LogicalStream::add_file`] on success and `on_close`
/// [`LogicalStream::remove_file`], otherwise later requests for the file are
/// rejected. Both may be called later from another task. An open that returns
/// `Ok` stays in flight until `add_file` lands; a listener that fails such an
/// open asynchronously calls [`LogicalStream::abandon_open`] instead.
#[async_trait]
pub trait StreamListener: Send + Sync {
    /// kXR_open for a path not yet open on this stream
    async fn on_open(&self, _stream: &LogicalStream, _request: OpenRequest) -> Result<()> {
        Err(XrdError::unsupported(RequestKind::OPEN))
    }

    /// kXR_close for an open handle
    async fn on_close(&self, _stream: &LogicalStream, _request: CloseRequest) -> Result<()> {
        Err(XrdError::unsupported(RequestKind::CLOSE))
    }

    /// kXR_read for an open handle
    async fn on_read(&self, _stream: &LogicalStream, _request: ReadRequest) -> Result<()> {
        Err(XrdError::unsupported(RequestKind::READ))
    }

    /// kXR_readv whose segments all refer to open handles
    async fn on_readv(&self, _stream: &LogicalStream, _request: ReadVRequest) -> Result<()> {
        Err(XrdError::unsupported(RequestKind::READV))
    }

    /// kXR_write for a handle opened for writing
    async fn on_write(&self, _stream: &LogicalStream, _request: WriteRequest) -> Result<()> {
        Err(XrdError::unsupported(RequestKind::WRITE))
    }

    /// kXR_sync for a handle opened for writing
    async fn on_sync(&self, _stream: &LogicalStream, _request: SyncRequest) -> Result<()> {
        Err(XrdError::unsupported(RequestKind::SYNC))
    }

    /// kXR_stat for an open path
    async fn on_status(&self, _stream: &LogicalStream, _request: StatRequest) -> Result<()> {
        Err(XrdError::unsupported(RequestKind::STAT))
    }

    /// The stream is shutting down; files still in the table are about to be forgotten.
    async fn handle_stream_close(&self, _stream: &LogicalStream) {}
}

struct Inner {
    stream_id: StreamId,
    cx: ConnectionContext,
    table: Mutex<OpenFileTable>,
    queue: mpsc::UnboundedSender<Request>,
    stop: watch::Sender<bool>,
    registry: Weak<StreamRegistry>,
    pending_opens: AtomicUsize,
    /// Requests queued or being processed
    outstanding: AtomicUsize,
    /// Set once the table drained through `remove_file`
    retire_requested: AtomicBool,
    closed: AtomicBool,
    max_segment_size: usize,
    task: Mutex<Option<JoinHandle<()>>>,
}

/// Handle to a running logical stream. Clones share the same stream.
#[derive(Clone)]
pub struct LogicalStream {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for LogicalStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogicalStream")
            .field("stream_id", &self.inner.stream_id)
            .field("open_files", &self.open_file_count())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl LogicalStream {
    /// Start a stream task.
    ///
    /// When `registry` is alive the stream retires itself from it once
    /// `remove_file` emptied its table, no open is in flight and nothing is
    /// queued.
    pub(crate) fn spawn(
        stream_id: StreamId,
        cx: ConnectionContext,
        listener: Arc<dyn StreamListener>,
        registry: Weak<StreamRegistry>,
        max_segment_size: usize,
    ) -> Self {
        let (queue, rx) = mpsc::unbounded_channel();
        let (stop, stop_rx) = watch::channel(false);
        let stream = Self {
            inner: Arc::new(Inner {
                stream_id,
                cx,
                table: Mutex::new(OpenFileTable::new()),
                queue,
                stop,
                registry,
                pending_opens: AtomicUsize::new(0),
                outstanding: AtomicUsize::new(0),
                retire_requested: AtomicBool::new(false),
                closed: AtomicBool::new(false),
                max_segment_size,
                task: Mutex::new(None),
            }),
        };

        let task = tokio::spawn(stream.clone().run(listener, rx, stop_rx));
        *stream
            .inner
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(task);
        tracing::debug!(stream_id, "Logical stream started");
        stream
    }

    /// Stream id this stream was created for
    pub fn stream_id(&self) -> StreamId {
        self.inner.stream_id
    }

    /// Connection the stream belongs to
    pub fn context(&self) -> &ConnectionContext {
        &self.inner.cx
    }

    /// Queue a response on the connection.
    pub fn respond(&self, response: Response) -> Result<()> {
        self.inner.cx.respond(response)
    }

    /// Append a request to the stream's FIFO queue.
    pub fn enqueue(&self, request: Request) -> Result<()> {
        if self.is_closed() {
            return Err(XrdError::ConnectionClosed);
        }
        let is_open = matches!(request, Request::Open(_));
        if is_open {
            self.inner.pending_opens.fetch_add(1, Ordering::SeqCst);
        }
        self.inner.outstanding.fetch_add(1, Ordering::SeqCst);
        self.inner.queue.send(request).map_err(|_| {
            if is_open {
                self.finish_open();
            }
            self.inner.outstanding.fetch_sub(1, Ordering::SeqCst);
            XrdError::ConnectionClosed
        })
    }

    /// Record a successfully opened file.
    ///
    /// Completes one open in flight, if any.
    pub fn add_file(&self, path: impl Into<String>, handle: FileHandle, flags: OpenFlags) -> bool {
        let path = path.into();
        tracing::debug!(stream_id = self.stream_id(), %path, %handle, %flags, "File opened");
        let inserted = self.lock_table().insert(path, handle, flags);
        self.inner.retire_requested.store(false, Ordering::SeqCst);
        self.finish_open();
        inserted
    }

    /// Give up an open that returned `Ok` but will never call `add_file`.
    pub fn abandon_open(&self) {
        self.finish_open();
        self.try_retire();
    }

    /// Forget the file behind `handle`.
    ///
    /// Removing the last file retires the stream once nothing else is pending.
    pub fn remove_file(&self, handle: FileHandle) -> Option<OpenFile> {
        let (removed, now_empty) = {
            let mut table = self.lock_table();
            let removed = table.remove_handle(handle);
            (removed, table.is_empty())
        };
        if let Some(file) = &removed {
            tracing::debug!(stream_id = self.stream_id(), path = %file.path, %handle, "File closed");
            if now_empty {
                self.request_retirement();
            }
        }
        removed
    }

    /// Forget the file open under `path`.
    pub fn remove_path(&self, path: &str) -> Option<OpenFile> {
        let (removed, now_empty) = {
            let mut table = self.lock_table();
            let removed = table.remove_path(path);
            (removed, table.is_empty())
        };
        if removed.is_some() && now_empty {
            self.request_retirement();
        }
        removed
    }

    /// Path behind an open handle
    pub fn file_path(&self, handle: FileHandle) -> Option<String> {
        self.lock_table().path(handle).map(str::to_string)
    }

    /// Snapshot of the open files
    pub fn open_files(&self) -> Vec<OpenFile> {
        self.lock_table().entries()
    }

    /// Number of open files
    pub fn open_file_count(&self) -> usize {
        self.lock_table().len()
    }

    /// Opens queued or in progress
    pub fn pending_opens(&self) -> usize {
        self.inner.pending_opens.load(Ordering::SeqCst)
    }

    /// No open file and no open on its way
    pub fn is_idle(&self) -> bool {
        self.lock_table().is_empty() && self.pending_opens() == 0
    }

    /// Requests queued or being processed
    pub(crate) fn outstanding(&self) -> usize {
        self.inner.outstanding.load(Ordering::SeqCst)
    }

    /// Whether `close` was called
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Stop accepting work. The current request completes; queued ones are dropped.
    pub fn close(&self) {
        if !self.inner.closed.swap(true, Ordering::SeqCst) {
            self.inner.stop.send_replace(true);
        }
    }

    /// Close and wait until `handle_stream_close` has run.
    pub async fn shutdown(&self) {
        self.close();
        let task = self
            .inner
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                tracing::error!(stream_id = self.stream_id(), "Stream task failed: {}", e);
            }
        }
    }

    /// Whether both handles refer to the same stream
    pub fn ptr_eq(&self, other: &LogicalStream) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    fn finish_open(&self) {
        let _ = self
            .inner
            .pending_opens
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
    }

    fn request_retirement(&self) {
        self.inner.retire_requested.store(true, Ordering::SeqCst);
        self.try_retire();
    }

    /// Retire from the registry if `remove_file` asked for it and the stream
    /// is still idle. Callers must not hold the table lock.
    fn try_retire(&self) -> bool {
        if !self.inner.retire_requested.load(Ordering::SeqCst) {
            return false;
        }
        let Some(registry) = self.inner.registry.upgrade() else {
            return false;
        };
        let retired = registry.retire_if_idle(self);
        if retired {
            tracing::debug!(stream_id = self.stream_id(), "Logical stream retired");
        }
        retired
    }

    fn lock_table(&self) -> MutexGuard<'_, OpenFileTable> {
        self.inner
            .table
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    async fn run(
        self,
        listener: Arc<dyn StreamListener>,
        mut rx: mpsc::UnboundedReceiver<Request>,
        mut stop: watch::Receiver<bool>,
    ) {
        loop {
            let request = tokio::select! {
                biased;
                _ = stop.changed() => break,
                request = rx.recv() => match request {
                    Some(request) => request,
                    None => break,
                },
            };

            self.process(listener.as_ref(), request).await;
            self.inner.outstanding.fetch_sub(1, Ordering::SeqCst);

            // a retirement deferred by queued work
            if self.try_retire() {
                break;
            }
        }

        self.inner.closed.store(true, Ordering::SeqCst);
        listener.handle_stream_close(&self).await;
        self.lock_table().clear();
        tracing::debug!(stream_id = self.stream_id(), "Logical stream closed");
    }

    async fn process(&self, listener: &dyn StreamListener, request: Request) {
        let stream_id = request.stream_id();
        let kind = request.kind();
        let is_open = kind == RequestKind::Open;

        let result = self.route(listener, request).await;
        if is_open && result.is_err() {
            self.finish_open();
        }

        if let Err(err) = result {
            tracing::debug!(stream_id, kind = %kind, error = %err, "Request rejected");
            if self.inner.cx.respond_with(stream_id, &err).is_err() {
                tracing::debug!(stream_id, "Connection gone, dropping error response");
            }
        }
    }

    async fn route(&self, listener: &dyn StreamListener, request: Request) -> Result<()> {
        match request {
            Request::Open(open) => {
                let already_open = self.lock_table().contains_path(&open.path);
                if already_open {
                    return Err(XrdError::wire(
                        ErrorCode::FileLocked,
                        "File already open within this logical stream",
                    ));
                }
                listener.on_open(self, open).await
            },
            Request::Close(close) => {
                let known = self.lock_table().contains_handle(close.handle);
                if !known {
                    return Err(not_open(close.handle));
                }
                listener.on_close(self, close).await
            },
            Request::Stat(stat) => {
                let known = self.lock_table().contains_path(&stat.path);
                if !known {
                    return Err(XrdError::wire(
                        ErrorCode::FileNotOpen,
                        format!("{} is not open on this logical stream", stat.path),
                    ));
                }
                listener.on_status(self, stat).await
            },
            Request::Read(read) => {
                let known = self.lock_table().contains_handle(read.handle);
                if !known {
                    return Err(not_open(read.handle));
                }
                listener.on_read(self, read).await
            },
            Request::ReadV(readv) => {
                self.check_segments(&readv)?;
                listener.on_readv(self, readv).await
            },
            Request::Write(write) => {
                let flags = self.lock_table().flags(write.handle);
                match flags {
                    None => Err(not_open(write.handle)),
                    Some(flags) if flags.allows_write() => listener.on_write(self, write).await,
                    Some(_) => Err(XrdError::wire(
                        ErrorCode::FileLocked,
                        "No write access allowed on this file handle",
                    )),
                }
            },
            Request::Sync(sync) => {
                let flags = self.lock_table().flags(sync.handle);
                match flags {
                    None => Err(not_open(sync.handle)),
                    Some(flags) if flags.allows_write() => listener.on_sync(self, sync).await,
                    Some(_) => self.respond(Response::ok(sync.stream_id)),
                }
            },
            other => Err(XrdError::unsupported(other.request_code())),
        }
    }

    fn check_segments(&self, readv: &ReadVRequest) -> Result<()> {
        if readv.segments.is_empty() {
            return Err(XrdError::wire(
                ErrorCode::ArgMissing,
                "Request contains no vector",
            ));
        }
        let table = self.lock_table();
        for segment in &readv.segments {
            if !table.contains_handle(segment.handle) {
                return Err(not_open(segment.handle));
            }
            let too_long = usize::try_from(segment.length)
                .map_or(true, |len| len > self.inner.max_segment_size);
            if too_long {
                return Err(XrdError::wire(
                    ErrorCode::ArgInvalid,
                    format!(
                        "Single readv transfer is too large: {} bytes",
                        segment.length
                    ),
                ));
            }
        }
        Ok(())
    }
}

fn not_open(handle: FileHandle) -> XrdError {
    XrdError::wire(
        ErrorCode::FileNotOpen,
        format!("Invalid file handle {}", handle),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Outbound;
    use crate::protocol::ReadSegment;
    use crate::server::ConnectionInfo;
    use bytes::Bytes;
    use std::time::Duration;
    use tokio::sync::mpsc::UnboundedReceiver;

    /// Opens files with handle = running counter, echoes writes, counts hook calls.
    #[derive(Default)]
    struct Recorder {
        next_handle: AtomicUsize,
        calls: AtomicUsize,
        closed: AtomicBool,
    }

    #[async_trait]
    impl StreamListener for Recorder {
        async fn on_open(&self, stream: &LogicalStream, request: OpenRequest) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let handle = FileHandle::new(self.next_handle.fetch_add(1, Ordering::SeqCst) as u32);
            stream.add_file(request.path, handle, request.flags);
            stream.respond(Response::Open {
                stream_id: request.stream_id,
                handle,
                stat: None,
            })
        }

        async fn on_close(&self, stream: &LogicalStream, request: CloseRequest) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            stream.remove_file(request.handle);
            stream.respond(Response::ok(request.stream_id))
        }

        async fn on_read(&self, stream: &LogicalStream, request: ReadRequest) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            stream.respond(Response::Data {
                stream_id: request.stream_id,
                data: Bytes::from(vec![0u8; request.length as usize]),
            })
        }

        async fn on_write(&self, stream: &LogicalStream, request: WriteRequest) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            stream.respond(Response::ok(request.stream_id))
        }

        async fn on_sync(&self, _stream: &LogicalStream, _request: SyncRequest) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(XrdError::storage(
                crate::protocol::InternalCode::DiskIo,
                "fsync failed",
            ))
        }

        async fn handle_stream_close(&self, _stream: &LogicalStream) {
            self.closed.store(true, Ordering::SeqCst);
        }
    }

    /// Accepts opens without ever completing them
    struct Silent;

    #[async_trait]
    impl StreamListener for Silent {
        async fn on_open(&self, _stream: &LogicalStream, _request: OpenRequest) -> Result<()> {
            Ok(())
        }
    }

    fn start(listener: Arc<dyn StreamListener>) -> (LogicalStream, UnboundedReceiver<Outbound>) {
        let (cx, rx) = ConnectionContext::channel(ConnectionInfo::default());
        let stream = LogicalStream::spawn(1, cx, listener, Weak::new(), 1024);
        (stream, rx)
    }

    fn open(path: &str, flags: u16) -> Request {
        Request::Open(OpenRequest {
            stream_id: 1,
            mode: 0,
            flags: OpenFlags::from_bits(flags),
            path: path.to_string(),
            opaque: None,
        })
    }

    async fn next(rx: &mut UnboundedReceiver<Outbound>) -> Response {
        match tokio::time::timeout(Duration::from_secs(5), rx.recv()).await {
            Ok(Some(Outbound::Response(response))) => response,
            other => panic!("expected response, got {:?}", other),
        }
    }

    fn error_code(response: &Response) -> Option<ErrorCode> {
        match response {
            Response::Error { code, .. } => Some(*code),
            _ => None,
        }
    }

    #[tokio::test]
    async fn test_double_open_is_locked() {
        let listener = Arc::new(Recorder::default());
        let (stream, mut rx) = start(listener.clone());

        stream.enqueue(open("/a", OpenFlags::READ)).unwrap();
        stream.enqueue(open("/a", OpenFlags::READ)).unwrap();

        assert!(matches!(next(&mut rx).await, Response::Open { .. }));
        assert_eq!(error_code(&next(&mut rx).await), Some(ErrorCode::FileLocked));
        assert_eq!(stream.open_file_count(), 1);
        assert_eq!(stream.pending_opens(), 0);
        assert_eq!(listener.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_open_in_flight_until_file_added() {
        let (stream, _rx) = start(Arc::new(Silent));

        stream.enqueue(open("/a", OpenFlags::READ)).unwrap();
        tokio::time::timeout(Duration::from_secs(5), async {
            while stream.outstanding() > 0 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
        assert_eq!(stream.pending_opens(), 1);
        assert!(!stream.is_idle());

        let handle = FileHandle::new(1);
        assert!(stream.add_file("/a", handle, OpenFlags::from_bits(OpenFlags::READ)));
        assert_eq!(stream.pending_opens(), 0);
        assert_eq!(stream.open_file_count(), 1);

        stream.enqueue(open("/b", OpenFlags::READ)).unwrap();
        assert_eq!(stream.pending_opens(), 1);
        stream.abandon_open();
        stream.abandon_open();
        assert_eq!(stream.pending_opens(), 0);

        assert!(stream.remove_file(handle).is_some());
        assert!(stream.is_idle());
    }

    #[tokio::test]
    async fn test_unknown_handle_never_reaches_listener() {
        let listener = Arc::new(Recorder::default());
        let (stream, mut rx) = start(listener.clone());
        let handle = FileHandle::new(77);

        for request in [
            Request::Read(ReadRequest {
                stream_id: 1,
                handle,
                offset: 0,
                length: 1,
            }),
            Request::Write(WriteRequest {
                stream_id: 1,
                handle,
                offset: 0,
                data: Bytes::from_static(b"x"),
            }),
            Request::Sync(SyncRequest { stream_id: 1, handle }),
            Request::Close(CloseRequest { stream_id: 1, handle }),
            Request::Stat(StatRequest {
                stream_id: 1,
                options: 0,
                path: "/missing".to_string(),
            }),
        ] {
            stream.enqueue(request).unwrap();
            assert_eq!(error_code(&next(&mut rx).await), Some(ErrorCode::FileNotOpen));
        }
        assert_eq!(listener.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_write_requires_new_or_update() {
        let listener = Arc::new(Recorder::default());
        let (stream, mut rx) = start(listener.clone());

        stream.enqueue(open("/ro", OpenFlags::READ)).unwrap();
        let Response::Open { handle, .. } = next(&mut rx).await else {
            panic!("open failed");
        };

        stream
            .enqueue(Request::Write(WriteRequest {
                stream_id: 1,
                handle,
                offset: 0,
                data: Bytes::from_static(b"data"),
            }))
            .unwrap();
        assert_eq!(error_code(&next(&mut rx).await), Some(ErrorCode::FileLocked));

        // sync on a read-only handle succeeds without the listener
        stream
            .enqueue(Request::Sync(SyncRequest { stream_id: 1, handle }))
            .unwrap();
        assert_eq!(next(&mut rx).await, Response::ok(1));
        assert_eq!(listener.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_listener_error_is_mapped() {
        let listener = Arc::new(Recorder::default());
        let (stream, mut rx) = start(listener);

        stream.enqueue(open("/rw", OpenFlags::UPDATE)).unwrap();
        let Response::Open { handle, .. } = next(&mut rx).await else {
            panic!("open failed");
        };
        stream
            .enqueue(Request::Sync(SyncRequest { stream_id: 1, handle }))
            .unwrap();
        assert_eq!(error_code(&next(&mut rx).await), Some(ErrorCode::IoError));
    }

    #[tokio::test]
    async fn test_readv_validation() {
        let listener = Arc::new(Recorder::default());
        let (stream, mut rx) = start(listener);

        stream.enqueue(open("/v", OpenFlags::READ)).unwrap();
        let Response::Open { handle, .. } = next(&mut rx).await else {
            panic!("open failed");
        };

        let readv = |segments: Vec<ReadSegment>| {
            Request::ReadV(ReadVRequest {
                stream_id: 1,
                segments,
            })
        };

        stream.enqueue(readv(vec![])).unwrap();
        assert_eq!(error_code(&next(&mut rx).await), Some(ErrorCode::ArgMissing));

        stream
            .enqueue(readv(vec![ReadSegment {
                handle: FileHandle::new(999),
                length: 8,
                offset: 0,
            }]))
            .unwrap();
        assert_eq!(error_code(&next(&mut rx).await), Some(ErrorCode::FileNotOpen));

        stream
            .enqueue(readv(vec![ReadSegment {
                handle,
                length: 4096,
                offset: 0,
            }]))
            .unwrap();
        assert_eq!(error_code(&next(&mut rx).await), Some(ErrorCode::ArgInvalid));

        // valid vector falls through to the default hook
        stream
            .enqueue(readv(vec![ReadSegment {
                handle,
                length: 16,
                offset: 0,
            }]))
            .unwrap();
        assert_eq!(error_code(&next(&mut rx).await), Some(ErrorCode::Unsupported));
    }

    #[tokio::test]
    async fn test_shutdown_runs_close_hook_and_clears_table() {
        let listener = Arc::new(Recorder::default());
        let (stream, mut rx) = start(listener.clone());

        stream.enqueue(open("/a", OpenFlags::NEW)).unwrap();
        next(&mut rx).await;
        assert_eq!(stream.open_file_count(), 1);

        stream.shutdown().await;
        assert!(listener.closed.load(Ordering::SeqCst));
        assert_eq!(stream.open_file_count(), 0);
        assert!(stream.enqueue(open("/b", OpenFlags::NEW)).is_err());
    }
}
