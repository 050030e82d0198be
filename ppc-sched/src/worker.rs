//! Fixed-size worker pool for blocking host I/O that syscall handlers
//! must not run on a core thread.
//!
//! A core thread holds the scheduler lock while dispatching a kernel
//! call; blocking that thread on real I/O would stall every other
//! guest thread waiting to be scheduled. Handlers that need to block
//! submit a job here instead and pick up the result on a later call.
//!
//! Grounded in the teacher's `Mutex`-guarded shared-state pattern
//! (`exec/src/lib.rs`'s `SharedState`), reshaped into a classic
//! job-queue pool rather than a single shared struct.

use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

const NUM_WORKERS: usize = 2;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// A small fixed-size pool of host threads that run submitted closures.
///
/// Dropping the pool blocks until every in-flight job finishes and all
/// worker threads have joined.
pub struct WorkerPool {
    sender: Option<mpsc::Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::channel::<Job>();
        let receiver = Arc::new(Mutex::new(receiver));

        let workers = (0..NUM_WORKERS)
            .map(|id| {
                let receiver = Arc::clone(&receiver);
                std::thread::Builder::new()
                    .name(format!("ppc-worker-{id}"))
                    .spawn(move || loop {
                        let job = {
                            let rx = receiver.lock().unwrap();
                            rx.recv()
                        };
                        match job {
                            Ok(job) => job(),
                            Err(_) => break,
                        }
                    })
                    .expect("failed to spawn worker thread")
            })
            .collect();

        Self { sender: Some(sender), workers }
    }

    /// Queue `job` to run on the next free worker. Panics if the pool
    /// has already been shut down.
    pub fn submit(&self, job: impl FnOnce() + Send + 'static) {
        self.sender
            .as_ref()
            .expect("worker pool already shut down")
            .send(Box::new(job))
            .expect("worker pool threads gone");
    }
}

impl Default for WorkerPool {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        // Closing the channel unblocks every worker's `recv()` with
        // `Err`, so each thread exits its loop and can be joined.
        self.sender.take();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Barrier;

    #[test]
    fn runs_submitted_jobs() {
        let pool = WorkerPool::new();
        let done = Arc::new(AtomicU32::new(0));
        let barrier = Arc::new(Barrier::new(4));

        for _ in 0..3 {
            let done = Arc::clone(&done);
            let barrier = Arc::clone(&barrier);
            pool.submit(move || {
                done.fetch_add(1, Ordering::SeqCst);
                barrier.wait();
            });
        }
        barrier.wait();

        assert_eq!(done.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn drop_joins_workers_cleanly() {
        let pool = WorkerPool::new();
        pool.submit(|| {});
        drop(pool);
    }
}
