use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use bytes::Bytes;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use tracing::debug;

use crate::common::{Result, StrataError};

use super::BlockStore;

/// A disk I/O request together with the channel its result is sent back on.
pub enum DiskRequest {
    Read {
        path: String,
        offset: u64,
        max_len: usize,
        reply: Sender<Result<Option<Bytes>>>,
    },
    Write {
        path: String,
        offset: u64,
        data: Bytes,
        reply: Sender<Result<()>>,
    },
    Truncate {
        path: String,
        len: u64,
        reply: Sender<Result<()>>,
    },
}

/// DiskScheduler funnels all block I/O of one database through a single
/// background worker so physical file access is serialized.
///
/// It implements [`BlockStore`] itself: every call queues a request and
/// blocks until the worker replies.
pub struct DiskScheduler {
    /// The store the worker performs I/O against
    store: Arc<dyn BlockStore>,
    /// Channel sender for queuing requests
    request_sender: Sender<DiskRequest>,
    /// Flag to signal shutdown
    shutdown: Arc<AtomicBool>,
    /// Handle to the background worker thread
    worker_handle: Option<JoinHandle<()>>,
}

impl DiskScheduler {
    /// Creates a new DiskScheduler and spawns its worker thread.
    pub fn new(store: Arc<dyn BlockStore>) -> Self {
        let (sender, receiver) = bounded::<DiskRequest>(128);
        let shutdown = Arc::new(AtomicBool::new(false));

        let store_clone = Arc::clone(&store);
        let shutdown_clone = Arc::clone(&shutdown);

        let worker_handle = thread::spawn(move || {
            Self::start_worker_thread(store_clone, receiver, shutdown_clone);
        });

        Self {
            store,
            request_sender: sender,
            shutdown,
            worker_handle: Some(worker_handle),
        }
    }

    /// Queues a request for the worker.
    pub fn schedule(&self, request: DiskRequest) -> Result<()> {
        self.request_sender
            .send(request)
            .map_err(|e| StrataError::DiskScheduler(format!("Failed to schedule request: {}", e)))
    }

    /// Waits for the worker's reply to a scheduled request.
    fn wait<T>(reply: Receiver<Result<T>>) -> Result<T> {
        reply.recv().map_err(|e| {
            StrataError::DiskScheduler(format!("Failed to receive completion: {}", e))
        })?
    }

    fn start_worker_thread(
        store: Arc<dyn BlockStore>,
        receiver: Receiver<DiskRequest>,
        shutdown: Arc<AtomicBool>,
    ) {
        loop {
            if shutdown.load(Ordering::Relaxed) {
                // Drain remaining requests before exiting
                while let Ok(request) = receiver.try_recv() {
                    Self::process_request(store.as_ref(), request);
                }
                break;
            }

            match receiver.recv_timeout(Duration::from_millis(100)) {
                Ok(request) => Self::process_request(store.as_ref(), request),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        debug!("disk worker stopped");
    }

    fn process_request(store: &dyn BlockStore, request: DiskRequest) {
        // A dropped receiver means the caller gave up; nothing to report to.
        match request {
            DiskRequest::Read {
                path,
                offset,
                max_len,
                reply,
            } => {
                let _ = reply.send(store.read_block(&path, offset, max_len));
            }
            DiskRequest::Write {
                path,
                offset,
                data,
                reply,
            } => {
                let _ = reply.send(store.write_block(&path, offset, &data));
            }
            DiskRequest::Truncate { path, len, reply } => {
                let _ = reply.send(store.truncate(&path, len));
            }
        }
    }

    /// Returns the store the worker writes to.
    pub fn store(&self) -> &Arc<dyn BlockStore> {
        &self.store
    }
}

impl BlockStore for DiskScheduler {
    fn read_block(&self, path: &str, offset: u64, max_len: usize) -> Result<Option<Bytes>> {
        let (tx, rx) = bounded(1);
        self.schedule(DiskRequest::Read {
            path: path.to_string(),
            offset,
            max_len,
            reply: tx,
        })?;
        Self::wait(rx)
    }

    fn write_block(&self, path: &str, offset: u64, data: &[u8]) -> Result<()> {
        let (tx, rx) = bounded(1);
        self.schedule(DiskRequest::Write {
            path: path.to_string(),
            offset,
            data: Bytes::copy_from_slice(data),
            reply: tx,
        })?;
        Self::wait(rx)
    }

    fn truncate(&self, path: &str, len: u64) -> Result<()> {
        let (tx, rx) = bounded(1);
        self.schedule(DiskRequest::Truncate {
            path: path.to_string(),
            len,
            reply: tx,
        })?;
        Self::wait(rx)
    }
}

impl Drop for DiskScheduler {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);

        if let Some(handle) = self.worker_handle.take() {
            let _ = handle.join();
        }
    }
}
