//! A single-threaded cooperative executor.
//!
//! All event handling (state-change notifications, ping acks) runs through one dispatcher so
//! handlers never race each other, only against the caller threads that lock the controller
//! directly.

use std::sync::mpsc;
use std::thread;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Owns one worker thread draining a FIFO queue of closures.
pub struct EventDispatcher {
    sender: Option<mpsc::Sender<Job>>,
    worker: Option<thread::JoinHandle<()>>,
}

impl EventDispatcher {
    pub fn new(thread_name: impl Into<String>) -> Self {
        let (sender, receiver) = mpsc::channel::<Job>();
        let worker = thread::Builder::new()
            .name(thread_name.into())
            .spawn(move || {
                for job in receiver {
                    job();
                }
            })
            .expect("failed to spawn event dispatcher thread");

        Self { sender: Some(sender), worker: Some(worker) }
    }

    /// Enqueue a closure to run on the worker thread, after everything already queued.
    pub fn add<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        match &self.sender {
            Some(sender) if sender.send(Box::new(job)).is_ok() => {}
            _ => tracing::error!("event dispatcher worker is gone; dropping job"),
        }
    }
}

impl Drop for EventDispatcher {
    fn drop(&mut self) {
        // Drop the sender first so the worker's `for job in receiver` loop drains whatever is
        // already queued and then exits, rather than blocking forever.
        self.sender.take();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}
