use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use tracing::{debug, warn};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Fixed-size pool of OS threads fed by a bounded queue.
///
/// When the queue is full the submitting thread runs the job itself, which
/// throttles producers instead of dropping work.
pub struct WorkerPool {
    name: String,
    sender: Option<SyncSender<Job>>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn new(name: impl Into<String>, threads: usize, queue_capacity: usize) -> Self {
        let name = name.into();
        let (sender, receiver) = mpsc::sync_channel::<Job>(queue_capacity);
        let receiver = Arc::new(Mutex::new(receiver));
        let workers = (0..threads.max(1))
            .filter_map(|i| {
                let rx = Arc::clone(&receiver);
                thread::Builder::new()
                    .name(format!("{name}-{i}"))
                    .spawn(move || worker_loop(rx))
                    .map_err(|e| warn!(error = %e, "failed to spawn worker thread"))
                    .ok()
            })
            .collect();
        Self {
            name,
            sender: Some(sender),
            workers,
        }
    }

    /// Queue `job`, or run it on the caller if the queue is full.
    pub fn execute<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let Some(sender) = &self.sender else {
            job();
            return;
        };
        match sender.try_send(Box::new(job)) {
            Ok(()) => {}
            Err(TrySendError::Full(job)) => {
                debug!(pool = %self.name, "queue full, running on caller");
                job();
            }
            Err(TrySendError::Disconnected(job)) => job(),
        }
    }

    pub fn thread_count(&self) -> usize {
        self.workers.len()
    }
}

fn worker_loop(receiver: Arc<Mutex<Receiver<Job>>>) {
    loop {
        let next = receiver.lock().expect("lock poisoned").recv();
        match next {
            Ok(job) => job(),
            Err(_) => break,
        }
    }
}

impl Drop for WorkerPool {
    /// Finish queued jobs, then join the workers.
    fn drop(&mut self) {
        self.sender.take();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Barrier;

    #[test]
    fn runs_every_job() {
        let count = Arc::new(AtomicUsize::new(0));
        {
            let pool = WorkerPool::new("test", 4, 16);
            assert_eq!(pool.thread_count(), 4);
            for _ in 0..100 {
                let c = Arc::clone(&count);
                pool.execute(move || {
                    c.fetch_add(1, Ordering::SeqCst);
                });
            }
        }
        assert_eq!(count.load(Ordering::SeqCst), 100);
    }

    #[test]
    fn full_queue_runs_on_caller() {
        let pool = WorkerPool::new("busy", 1, 1);
        let gate = Arc::new(Barrier::new(2));
        let (started_tx, started_rx) = mpsc::channel();

        // Occupy the only worker.
        let g = Arc::clone(&gate);
        pool.execute(move || {
            started_tx.send(()).unwrap();
            g.wait();
        });
        started_rx.recv().unwrap();

        // Fills the one queue slot.
        pool.execute(|| {});

        let caller = thread::current().id();
        let ran_on = Arc::new(Mutex::new(None));
        let r = Arc::clone(&ran_on);
        pool.execute(move || {
            *r.lock().unwrap() = Some(thread::current().id());
        });
        assert_eq!(*ran_on.lock().unwrap(), Some(caller));

        gate.wait();
    }
}
