//! Logical stream manager: stream id → [`LogicalStream`] plus admission control.
//!
//! ## Policies
//!
//! | Policy        | Streams                          | Admission                               |
//! |---------------|----------------------------------|-----------------------------------------|
//! | `Multiplexed` | one per stream id, on demand     | at most `max_streams` live streams      |
//! | `Dedicated`   | a single pseudo-stream           | one open file (or open in flight)       |
//! | `Direct`      | none, file ops go to dispatcher  | -                                       |
//!
//! A multiplexed stream retires itself when `remove_file` empties its
//! open-file table, once no open is in flight and its queue is drained. That
//! frees capacity for new stream ids. Streams that never held a file stay
//! registered until the connection ends.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use super::stream::LogicalStream;
use crate::error::{Result, XrdError};
use crate::protocol::{Request, StreamId, DEFAULT_MAX_FRAME_SIZE, DEFAULT_MAX_STREAMS};
use crate::server::{ConnectionContext, ConnectionHandler};

/// Stream id of the dedicated-channel pseudo-stream.
pub const DEDICATED_STREAM_ID: StreamId = 0;

/// How a connection maps requests onto logical streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPolicy {
    /// One logical stream per stream id
    Multiplexed {
        /// Cap on concurrent streams
        max_streams: usize,
    },
    /// Single session per connection, one file at a time
    Dedicated,
    /// No logical streams; file operations are dispatched like any other request
    Direct,
}

impl Default for SessionPolicy {
    fn default() -> Self {
        SessionPolicy::Multiplexed {
            max_streams: DEFAULT_MAX_STREAMS,
        }
    }
}

impl SessionPolicy {
    /// Whether file operations go through logical streams
    pub fn uses_streams(&self) -> bool {
        !matches!(self, SessionPolicy::Direct)
    }

    /// Effective stream limit
    pub fn max_streams(&self) -> usize {
        match self {
            SessionPolicy::Multiplexed { max_streams } => *max_streams,
            SessionPolicy::Dedicated => 1,
            SessionPolicy::Direct => 0,
        }
    }
}

impl std::fmt::Display for SessionPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionPolicy::Multiplexed { max_streams } => write!(f, "multiplexed({})", max_streams),
            SessionPolicy::Dedicated => f.write_str("dedicated"),
            SessionPolicy::Direct => f.write_str("direct"),
        }
    }
}

/// Live streams of one connection, shared with the streams for self-retirement.
#[derive(Debug, Default)]
pub struct StreamRegistry {
    streams: Mutex<HashMap<StreamId, LogicalStream>>,
}

impl StreamRegistry {
    fn lock(&self) -> MutexGuard<'_, HashMap<StreamId, LogicalStream>> {
        self.streams.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Unregister and stop `stream` if it is idle, has nothing queued and is
    /// still registered.
    ///
    /// Requests are only enqueued while holding the registry lock, so an empty
    /// queue seen here stays empty.
    pub(crate) fn retire_if_idle(&self, stream: &LogicalStream) -> bool {
        let mut streams = self.lock();
        if stream.outstanding() > 0 || !stream.is_idle() {
            return false;
        }
        let registered = streams
            .get(&stream.stream_id())
            .is_some_and(|current| current.ptr_eq(stream));
        if registered {
            streams.remove(&stream.stream_id());
            stream.close();
        }
        registered
    }
}

/// Owns the logical streams of one physical connection.
pub struct LogicalStreamManager {
    policy: SessionPolicy,
    cx: ConnectionContext,
    handler: Arc<dyn ConnectionHandler>,
    registry: Arc<StreamRegistry>,
    max_segment_size: usize,
}

impl std::fmt::Debug for LogicalStreamManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogicalStreamManager")
            .field("policy", &self.policy)
            .field("streams", &self.stream_count())
            .finish()
    }
}

impl LogicalStreamManager {
    /// Create a manager for one connection
    pub fn new(
        policy: SessionPolicy,
        cx: ConnectionContext,
        handler: Arc<dyn ConnectionHandler>,
    ) -> Self {
        Self {
            policy,
            cx,
            handler,
            registry: Arc::new(StreamRegistry::default()),
            max_segment_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }

    /// Largest single readv segment accepted by streams
    pub fn with_max_segment_size(mut self, max_segment_size: usize) -> Self {
        self.max_segment_size = max_segment_size;
        self
    }

    /// Active policy
    pub fn policy(&self) -> SessionPolicy {
        self.policy
    }

    /// Existing stream for `stream_id`, or a new one if capacity allows.
    ///
    /// Under the dedicated policy every id maps to the single pseudo-stream.
    pub fn get_stream(&self, stream_id: StreamId) -> Result<LogicalStream> {
        self.get_or_create(stream_id).map(|(_, stream)| stream)
    }

    /// Route a file operation to its logical stream.
    pub fn dispatch(&self, request: Request) -> Result<()> {
        // hold the registry until the request is queued
        let (_streams, stream) = self.get_or_create(request.stream_id())?;

        if self.policy == SessionPolicy::Dedicated
            && matches!(request, Request::Open(_))
            && stream.open_file_count() + stream.pending_opens() > 0
        {
            tracing::warn!(
                stream_id = request.stream_id(),
                "Too many concurrent opens on this dedicated channel"
            );
            return Err(XrdError::TooManyLogicalStreams { limit: 1 });
        }

        stream.enqueue(request)
    }

    /// Close and unregister a stream; no-op when absent.
    pub fn destroy_stream(&self, stream_id: StreamId) {
        let removed = self.registry.lock().remove(&stream_id);
        if let Some(stream) = removed {
            stream.close();
        }
    }

    /// Close every stream and wait for their close hooks.
    pub async fn destroy_all_streams(&self) {
        let streams: Vec<LogicalStream> =
            self.registry.lock().drain().map(|(_, stream)| stream).collect();
        if !streams.is_empty() {
            tracing::debug!(count = streams.len(), "Destroying logical streams");
        }
        for stream in streams {
            stream.shutdown().await;
        }
    }

    /// Number of registered streams
    pub fn stream_count(&self) -> usize {
        self.registry.lock().len()
    }

    /// Open files across all streams
    pub fn open_file_count(&self) -> usize {
        self.registry
            .lock()
            .values()
            .map(LogicalStream::open_file_count)
            .sum()
    }

    /// Whether any stream has an open file or an open in flight
    pub fn has_activity(&self) -> bool {
        self.registry.lock().values().any(|stream| !stream.is_idle())
    }

    /// Look up or admit the stream for `stream_id`, returning it with the
    /// registry still locked.
    ///
    /// The listener hook runs without the lock held, so admission is checked
    /// again before the new stream is inserted.
    fn get_or_create(
        &self,
        stream_id: StreamId,
    ) -> Result<(MutexGuard<'_, HashMap<StreamId, LogicalStream>>, LogicalStream)> {
        let key = match self.policy {
            SessionPolicy::Dedicated => DEDICATED_STREAM_ID,
            _ => stream_id,
        };
        let limit = self.policy.max_streams();
        let mut listener = None;

        loop {
            let mut streams = self.registry.lock();
            if let Some(stream) = streams.get(&key) {
                let stream = stream.clone();
                return Ok((streams, stream));
            }
            if streams.len() >= limit {
                tracing::warn!(stream_id, limit, "Logical stream limit reached");
                return Err(XrdError::TooManyLogicalStreams { limit });
            }

            match listener.take() {
                Some(listener) => {
                    let registry = match self.policy {
                        SessionPolicy::Multiplexed { .. } => Arc::downgrade(&self.registry),
                        _ => Weak::new(),
                    };
                    let stream = LogicalStream::spawn(
                        key,
                        self.cx.clone(),
                        listener,
                        registry,
                        self.max_segment_size,
                    );
                    streams.insert(key, stream.clone());
                    return Ok((streams, stream));
                },
                None => {
                    drop(streams);
                    listener = Some(self.handler.handle_new_stream(key));
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Outbound;
    use crate::protocol::{
        CloseRequest, ErrorCode, FileHandle, OpenFlags, OpenRequest, ReadRequest, Response,
    };
    use crate::server::{ConnectionInfo, RequestHandler};
    use crate::session::StreamListener;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;
    use tokio::sync::mpsc::UnboundedReceiver;

    #[derive(Default)]
    struct Files {
        next: AtomicU32,
    }

    #[async_trait]
    impl StreamListener for Files {
        async fn on_open(&self, stream: &LogicalStream, request: OpenRequest) -> Result<()> {
            let handle = FileHandle::new(self.next.fetch_add(1, Ordering::SeqCst));
            stream.add_file(request.path, handle, request.flags);
            stream.respond(Response::Open {
                stream_id: request.stream_id,
                handle,
                stat: None,
            })
        }

        async fn on_close(&self, stream: &LogicalStream, request: CloseRequest) -> Result<()> {
            stream.remove_file(request.handle);
            stream.respond(Response::ok(request.stream_id))
        }
    }

    /// Completes opens and closes on spawned tasks, after the hook returned.
    #[derive(Default)]
    struct DeferredFiles {
        next: Arc<AtomicU32>,
    }

    #[async_trait]
    impl StreamListener for DeferredFiles {
        async fn on_open(&self, stream: &LogicalStream, request: OpenRequest) -> Result<()> {
            let stream = stream.clone();
            let next = self.next.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                let handle = FileHandle::new(next.fetch_add(1, Ordering::SeqCst));
                stream.add_file(request.path, handle, request.flags);
                let _ = stream.respond(Response::Open {
                    stream_id: request.stream_id,
                    handle,
                    stat: None,
                });
            });
            Ok(())
        }

        async fn on_close(&self, stream: &LogicalStream, request: CloseRequest) -> Result<()> {
            let stream = stream.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                stream.remove_file(request.handle);
                let _ = stream.respond(Response::ok(request.stream_id));
            });
            Ok(())
        }

        async fn on_read(&self, stream: &LogicalStream, request: ReadRequest) -> Result<()> {
            stream.respond(Response::Data {
                stream_id: request.stream_id,
                data: bytes::Bytes::from_static(b"data"),
            })
        }
    }

    struct Handler {
        listener: Arc<dyn StreamListener>,
    }

    #[async_trait]
    impl RequestHandler for Handler {}

    impl ConnectionHandler for Handler {
        fn handle_new_stream(&self, _stream_id: StreamId) -> Arc<dyn StreamListener> {
            self.listener.clone()
        }
    }

    fn manager_with(
        policy: SessionPolicy,
        listener: Arc<dyn StreamListener>,
    ) -> (LogicalStreamManager, UnboundedReceiver<Outbound>) {
        let (cx, rx) = ConnectionContext::channel(ConnectionInfo::default());
        let handler = Arc::new(Handler { listener });
        (LogicalStreamManager::new(policy, cx, handler), rx)
    }

    fn manager(policy: SessionPolicy) -> (LogicalStreamManager, UnboundedReceiver<Outbound>) {
        manager_with(policy, Arc::new(Files::default()))
    }

    async fn wait_for_streams(manager: &LogicalStreamManager, count: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while manager.stream_count() != count {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("stream count never settled");
    }

    fn open(stream_id: StreamId, path: &str) -> Request {
        Request::Open(OpenRequest {
            stream_id,
            mode: 0,
            flags: OpenFlags::new().with(OpenFlags::NEW),
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

    #[tokio::test]
    async fn test_admission_up_to_max_streams() {
        let (manager, _rx) = manager(SessionPolicy::Multiplexed { max_streams: 3 });
        for id in 1..=3 {
            manager.get_stream(id).unwrap();
        }
        // existing ids are still served at capacity
        assert!(manager.get_stream(2).is_ok());
        assert!(matches!(
            manager.get_stream(4),
            Err(XrdError::TooManyLogicalStreams { limit: 3 })
        ));

        manager.destroy_stream(1);
        manager.destroy_stream(1);
        assert_eq!(manager.stream_count(), 2);
        assert!(manager.get_stream(4).is_ok());
    }

    #[tokio::test]
    async fn test_stream_retires_after_last_close() {
        let (manager, mut rx) = manager(SessionPolicy::default());
        manager.dispatch(open(7, "/a")).unwrap();
        let Response::Open { handle, .. } = next(&mut rx).await else {
            panic!("open failed");
        };
        assert_eq!(manager.stream_count(), 1);
        assert_eq!(manager.open_file_count(), 1);

        manager
            .dispatch(Request::Close(CloseRequest {
                stream_id: 7,
                handle,
            }))
            .unwrap();
        assert_eq!(next(&mut rx).await, Response::ok(7));
        wait_for_streams(&manager, 0).await;
    }

    #[tokio::test]
    async fn test_deferred_open_keeps_stream_for_read() {
        let (manager, mut rx) =
            manager_with(SessionPolicy::default(), Arc::new(DeferredFiles::default()));
        manager.dispatch(open(4, "/x")).unwrap();

        let Response::Open { handle, .. } = next(&mut rx).await else {
            panic!("open failed");
        };
        assert_eq!(manager.stream_count(), 1);
        assert_eq!(manager.open_file_count(), 1);

        manager
            .dispatch(Request::Read(ReadRequest {
                stream_id: 4,
                handle,
                offset: 0,
                length: 4,
            }))
            .unwrap();
        assert_eq!(
            next(&mut rx).await,
            Response::Data {
                stream_id: 4,
                data: bytes::Bytes::from_static(b"data"),
            }
        );
        assert_eq!(manager.stream_count(), 1);
    }

    #[tokio::test]
    async fn test_deferred_close_retires_and_frees_capacity() {
        let (manager, mut rx) = manager_with(
            SessionPolicy::Multiplexed { max_streams: 1 },
            Arc::new(DeferredFiles::default()),
        );
        manager.dispatch(open(4, "/x")).unwrap();
        let Response::Open { handle, .. } = next(&mut rx).await else {
            panic!("open failed");
        };
        assert!(matches!(
            manager.get_stream(5),
            Err(XrdError::TooManyLogicalStreams { limit: 1 })
        ));

        manager
            .dispatch(Request::Close(CloseRequest {
                stream_id: 4,
                handle,
            }))
            .unwrap();
        assert_eq!(next(&mut rx).await, Response::ok(4));
        wait_for_streams(&manager, 0).await;

        manager.dispatch(open(5, "/y")).unwrap();
        assert!(matches!(next(&mut rx).await, Response::Open { stream_id: 5, .. }));
    }

    /// Records whether the registry was free while a listener was built.
    #[derive(Default)]
    struct LockCheck {
        registry: std::sync::OnceLock<Arc<StreamRegistry>>,
        unlocked: std::sync::atomic::AtomicBool,
    }

    #[async_trait]
    impl RequestHandler for LockCheck {}

    impl ConnectionHandler for LockCheck {
        fn handle_new_stream(&self, _stream_id: StreamId) -> Arc<dyn StreamListener> {
            let free = self
                .registry
                .get()
                .is_some_and(|registry| registry.streams.try_lock().is_ok());
            self.unlocked.store(free, Ordering::SeqCst);
            Arc::new(Files::default())
        }
    }

    #[tokio::test]
    async fn test_new_stream_hook_runs_outside_registry_lock() {
        let (cx, _rx) = ConnectionContext::channel(ConnectionInfo::default());
        let handler = Arc::new(LockCheck::default());
        let manager = LogicalStreamManager::new(SessionPolicy::default(), cx, handler.clone());
        handler.registry.set(manager.registry.clone()).unwrap();

        manager.dispatch(open(2, "/a")).unwrap();
        assert!(handler.unlocked.load(Ordering::SeqCst));
        assert_eq!(manager.stream_count(), 1);
    }

    #[tokio::test]
    async fn test_rejected_request_keeps_stream() {
        let (manager, mut rx) = manager(SessionPolicy::default());
        manager
            .dispatch(Request::Read(ReadRequest {
                stream_id: 6,
                handle: FileHandle::new(9),
                offset: 0,
                length: 1,
            }))
            .unwrap();
        assert!(matches!(
            next(&mut rx).await,
            Response::Error { code: ErrorCode::FileNotOpen, .. }
        ));
        tokio::task::yield_now().await;
        assert_eq!(manager.stream_count(), 1);
    }

    #[tokio::test]
    async fn test_dedicated_allows_one_open() {
        let (manager, mut rx) = manager(SessionPolicy::Dedicated);
        manager.dispatch(open(3, "/a")).unwrap();
        let err = manager.dispatch(open(4, "/b")).unwrap_err();
        assert!(matches!(err, XrdError::TooManyLogicalStreams { limit: 1 }));
        assert_eq!(err.error_code(), ErrorCode::ServerError);

        let Response::Open {
            stream_id, handle, ..
        } = next(&mut rx).await
        else {
            panic!("open failed");
        };
        assert_eq!(stream_id, 3);
        assert_eq!(manager.stream_count(), 1);

        manager
            .dispatch(Request::Close(CloseRequest {
                stream_id: 9,
                handle,
            }))
            .unwrap();
        assert_eq!(next(&mut rx).await, Response::ok(9));

        // the pseudo-stream stays, and takes a new open once the file is closed
        manager.dispatch(open(5, "/b")).unwrap();
        assert!(matches!(next(&mut rx).await, Response::Open { stream_id: 5, .. }));
        assert_eq!(manager.stream_count(), 1);
    }

    #[tokio::test]
    async fn test_destroy_all_streams() {
        let (manager, mut rx) = manager(SessionPolicy::default());
        manager.dispatch(open(1, "/a")).unwrap();
        manager.dispatch(open(2, "/b")).unwrap();
        next(&mut rx).await;
        next(&mut rx).await;
        assert_eq!(manager.open_file_count(), 2);

        manager.destroy_all_streams().await;
        assert_eq!(manager.stream_count(), 0);
        assert_eq!(manager.open_file_count(), 0);
    }
}
