//! Streams: ordered queues of copy and fill work.
//!
//! Each live stream owns one worker thread draining an unbounded job
//! queue, so operations queued on the same stream execute in submission
//! order while distinct streams run independently. Handles are plain
//! identifiers resolved through a process-wide table; a destroyed
//! handle is never reused.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc;
use std::sync::{Mutex, MutexGuard, OnceLock, PoisonError};
use std::thread;

use crate::status::{Result, Status};

/// Identifier of a live stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StreamHandle(u64);

pub(crate) type Job = Box<dyn FnOnce() + Send + 'static>;

struct StreamState {
    sender: mpsc::Sender<Job>,
    worker: thread::JoinHandle<()>,
}

fn streams() -> MutexGuard<'static, HashMap<u64, StreamState>> {
    static STREAMS: OnceLock<Mutex<HashMap<u64, StreamState>>> = OnceLock::new();
    STREAMS
        .get_or_init(Default::default)
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
}

/// Creates a stream and spawns its worker thread.
pub fn stream_create() -> Result<StreamHandle> {
    static NEXT_ID: AtomicU64 = AtomicU64::new(1);

    let (sender, receiver) = mpsc::channel::<Job>();
    let worker = thread::Builder::new()
        .name("ferry-stream".into())
        .spawn(move || {
            while let Ok(job) = receiver.recv() {
                job();
            }
        })
        .map_err(|_| Status::ERROR_EXECUTION_FAILED)?;
    let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    streams().insert(id, StreamState { sender, worker });
    Ok(StreamHandle(id))
}

/// Appends a job to the stream's queue.
pub(crate) fn enqueue(stream: StreamHandle, job: Job) -> Result<()> {
    let streams = streams();
    let state = streams
        .get(&stream.0)
        .ok_or(Status::ERROR_INVALID_HANDLE)?;
    state
        .sender
        .send(job)
        .map_err(|_| Status::ERROR_EXECUTION_FAILED)
}

/// Blocks until every job queued on the stream so far has run.
pub fn stream_synchronize(stream: StreamHandle) -> Result<()> {
    let (done, barrier) = mpsc::channel();
    enqueue(
        stream,
        Box::new(move || {
            let _ = done.send(());
        }),
    )?;
    barrier.recv().map_err(|_| Status::ERROR_EXECUTION_FAILED)
}

/// Destroys the stream, draining any work still queued on it.
///
/// The handle is dead afterwards; destroying it again fails with
/// `ERROR_INVALID_HANDLE`.
pub fn stream_destroy(stream: StreamHandle) -> Result<()> {
    let state = streams()
        .remove(&stream.0)
        .ok_or(Status::ERROR_INVALID_HANDLE)?;
    drop(state.sender);
    state.worker.join().map_err(|_| Status::ERROR_EXECUTION_FAILED)
}
