// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Background package I/O.
//!
//! A small worker pool pulls prioritized read requests off a shared queue
//! and pushes completed byte buffers back over a channel. The scheduling
//! thread only ever calls the non-blocking [`IoDispatcher::poll`]; the
//! workers are the only place a package read can block.

use crate::name::Name;
use crossbeam::channel::{unbounded, Receiver, Sender};
use dashmap::DashSet;
use parking_lot::{Condvar, Mutex};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::thread::JoinHandle;

/// Something a package's bytes can be read from.
pub trait ByteSource: Send + 'static {
    /// Read the whole package into memory.
    fn read_all(&mut self) -> io::Result<Vec<u8>>;
}

/// A package file on disk.
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl ByteSource for FileSource {
    fn read_all(&mut self) -> io::Result<Vec<u8>> {
        fs::read(&self.path)
    }
}

/// An already in-memory package (tests, embedded data).
pub struct MemorySource {
    bytes: Vec<u8>,
}

impl MemorySource {
    #[must_use]
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }
}

impl ByteSource for MemorySource {
    fn read_all(&mut self) -> io::Result<Vec<u8>> {
        Ok(std::mem::take(&mut self.bytes))
    }
}

/// One finished read, delivered through [`IoDispatcher::poll`].
pub struct IoCompletion {
    pub id: u64,
    pub package: Name,
    pub result: Result<Vec<u8>, String>,
}

struct PendingRequest {
    id: u64,
    package: Name,
    priority: i32,
    source: Box<dyn ByteSource>,
}

impl PartialEq for PendingRequest {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for PendingRequest {}

impl PartialOrd for PendingRequest {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PendingRequest {
    fn cmp(&self, other: &Self) -> Ordering {
        // Max-heap: higher priority first, then FIFO by submission id.
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.id.cmp(&self.id))
    }
}

#[derive(Default)]
struct RequestQueue {
    heap: Mutex<BinaryHeap<PendingRequest>>,
    available: Condvar,
}

/// Prioritized background read pool.
pub struct IoDispatcher {
    queue: Arc<RequestQueue>,
    completions: Receiver<IoCompletion>,
    cancelled: Arc<DashSet<u64>>,
    shutdown: Arc<AtomicBool>,
    next_id: AtomicU64,
    workers: Vec<JoinHandle<()>>,
}

impl IoDispatcher {
    /// Spawn `workers` read threads (clamped to at least one).
    #[must_use]
    pub fn new(workers: usize) -> Self {
        let queue = Arc::new(RequestQueue::default());
        let cancelled = Arc::new(DashSet::new());
        let shutdown = Arc::new(AtomicBool::new(false));
        let (tx, rx) = unbounded();
        let workers = (0..workers.max(1))
            .map(|i| {
                let queue = Arc::clone(&queue);
                let cancelled = Arc::clone(&cancelled);
                let shutdown = Arc::clone(&shutdown);
                let tx = tx.clone();
                std::thread::Builder::new()
                    .name(format!("relic-io-{}", i))
                    .spawn(move || worker_loop(&queue, &cancelled, &shutdown, &tx))
                    .expect("spawn I/O worker")
            })
            .collect();
        Self {
            queue,
            completions: rx,
            cancelled,
            shutdown,
            next_id: AtomicU64::new(1),
            workers,
        }
    }

    /// Queue a read. Higher `priority` is serviced first; ties are FIFO.
    pub fn submit(&self, package: Name, priority: i32, source: Box<dyn ByteSource>) -> u64 {
        let id = self.next_id.fetch_add(1, AtomicOrdering::Relaxed);
        let mut heap = self.queue.heap.lock();
        heap.push(PendingRequest {
            id,
            package,
            priority,
            source,
        });
        drop(heap);
        self.queue.available.notify_one();
        id
    }

    /// Drop request `id`. If a worker already picked it up, its completion
    /// is discarded instead.
    pub fn cancel(&self, id: u64) {
        self.cancelled.insert(id);
    }

    /// Non-blocking: next finished read, if any.
    pub fn poll(&self) -> Option<IoCompletion> {
        loop {
            let completion = self.completions.try_recv().ok()?;
            if self.cancelled.remove(&completion.id).is_some() {
                continue;
            }
            return Some(completion);
        }
    }
}

impl Drop for IoDispatcher {
    fn drop(&mut self) {
        self.shutdown.store(true, AtomicOrdering::SeqCst);
        self.queue.available.notify_all();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

fn worker_loop(
    queue: &RequestQueue,
    cancelled: &DashSet<u64>,
    shutdown: &AtomicBool,
    completions: &Sender<IoCompletion>,
) {
    loop {
        let mut request = {
            let mut heap = queue.heap.lock();
            loop {
                if shutdown.load(AtomicOrdering::SeqCst) {
                    return;
                }
                if let Some(request) = heap.pop() {
                    break request;
                }
                queue.available.wait(&mut heap);
            }
        };
        if cancelled.remove(&request.id).is_some() {
            continue;
        }
        let result = request.source.read_all().map_err(|err| err.to_string());
        if let Err(ref reason) = result {
            log::warn!("package '{}': read failed: {}", request.package, reason);
        }
        // Receiver gone means the dispatcher is being torn down.
        if completions
            .send(IoCompletion {
                id: request.id,
                package: request.package,
                result,
            })
            .is_err()
        {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    fn wait_poll(io: &IoDispatcher) -> IoCompletion {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            if let Some(completion) = io.poll() {
                return completion;
            }
            assert!(Instant::now() < deadline, "I/O completion timed out");
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn test_memory_source_completes() {
        let io = IoDispatcher::new(1);
        let id = io.submit(
            Name::intern("MemPkg"),
            0,
            Box::new(MemorySource::new(vec![1, 2, 3])),
        );
        let completion = wait_poll(&io);
        assert_eq!(completion.id, id);
        assert_eq!(completion.package, Name::intern("MemPkg"));
        assert_eq!(completion.result.unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_file_source_reads_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pkg.rpk");
        fs::write(&path, b"package bytes").unwrap();
        let io = IoDispatcher::new(2);
        io.submit(Name::intern("DiskPkg"), 0, Box::new(FileSource::new(path)));
        let completion = wait_poll(&io);
        assert_eq!(completion.result.unwrap(), b"package bytes");
    }

    #[test]
    fn test_missing_file_reports_error() {
        let io = IoDispatcher::new(1);
        io.submit(
            Name::intern("GhostPkg"),
            0,
            Box::new(FileSource::new(PathBuf::from("/nonexistent/ghost.rpk"))),
        );
        let completion = wait_poll(&io);
        assert!(completion.result.is_err());
    }

    #[test]
    fn test_cancelled_completion_is_discarded() {
        let io = IoDispatcher::new(1);
        let id = io.submit(
            Name::intern("CancelPkg"),
            0,
            Box::new(MemorySource::new(vec![0; 8])),
        );
        io.cancel(id);
        let follow = io.submit(
            Name::intern("KeepPkg"),
            -1,
            Box::new(MemorySource::new(vec![7])),
        );
        let completion = wait_poll(&io);
        assert_eq!(completion.id, follow);
    }
}
