//! Bounded job queue shared by a fixed pool of workers

use std::sync::mpsc::{Receiver, SyncSender, sync_channel};
use std::sync::{Mutex, PoisonError};

/// Receiving half of a bounded queue, shareable across worker threads.
///
/// Producers hold `SyncSender`s; `send` blocks while the queue is full.
/// Workers call [`next()`](JobQueue::next) to take ownership of one job.
/// The queue closes once every sender is dropped and the buffer is drained.
pub struct JobQueue<T> {
    rx: Mutex<Receiver<T>>,
}

impl<T> std::fmt::Debug for JobQueue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobQueue").finish_non_exhaustive()
    }
}

/// Create a queue holding at most `capacity` pending jobs
pub fn job_queue<T>(capacity: usize) -> (SyncSender<T>, JobQueue<T>) {
    let (tx, rx) = sync_channel(capacity);
    (tx, JobQueue { rx: Mutex::new(rx) })
}

impl<T> JobQueue<T> {
    /// Block until a job is available; `None` once the queue is closed
    pub fn next(&self) -> Option<T> {
        self.rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .recv()
            .ok()
    }
}

/// Run `workers` scoped threads that each pull jobs until the queue closes.
///
/// `handler` receives the worker index and an owned job. Returns once every
/// worker has exited, i.e. the queue is closed and fully drained.
pub fn run_workers<T, F>(workers: usize, queue: &JobQueue<T>, handler: F)
where
    T: Send,
    F: Fn(usize, T) + Sync,
{
    std::thread::scope(|s| {
        for id in 0..workers.max(1) {
            let handler = &handler;
            s.spawn(move || {
                while let Some(job) = queue.next() {
                    handler(id, job);
                }
            });
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn next_returns_jobs_then_none() {
        let (tx, q) = job_queue(3);
        tx.send(1).unwrap();
        tx.send(2).unwrap();
        drop(tx);
        assert_eq!(q.next(), Some(1));
        assert_eq!(q.next(), Some(2));
        assert_eq!(q.next(), None);
    }

    #[test]
    fn workers_drain_everything() {
        let (tx, q) = job_queue(2);
        let sum = AtomicUsize::new(0);
        let seen = AtomicUsize::new(0);
        std::thread::scope(|s| {
            s.spawn(move || {
                for i in 1..=100 {
                    tx.send(i).unwrap();
                }
            });
            run_workers(4, &q, |_, job: usize| {
                sum.fetch_add(job, Ordering::Relaxed);
                seen.fetch_add(1, Ordering::Relaxed);
            });
        });
        assert_eq!(seen.load(Ordering::Relaxed), 100);
        assert_eq!(sum.load(Ordering::Relaxed), 5050);
    }

    #[test]
    fn zero_workers_still_drains() {
        let (tx, q) = job_queue(4);
        tx.send(7).unwrap();
        drop(tx);
        let seen = AtomicUsize::new(0);
        run_workers(0, &q, |_, _job: i32| {
            seen.fetch_add(1, Ordering::Relaxed);
        });
        assert_eq!(seen.load(Ordering::Relaxed), 1);
    }
}
