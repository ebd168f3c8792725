//! Unbounded work queue drained by a fixed number of blocking workers.
//!
//! The number of worker threads is the only concurrency limit: at most that
//! many items are in flight at once, while any number may wait in the queue.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

struct QueueState<T> {
    pending: VecDeque<T>,
    in_flight: usize,
    closed: bool,
}

impl<T> QueueState<T> {
    fn outstanding(&self) -> usize {
        self.pending.len() + self.in_flight
    }
}

pub struct WorkQueue<T> {
    state: Mutex<QueueState<T>>,
    work: Condvar,
    idle: Condvar,
}

impl<T> Default for WorkQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> WorkQueue<T> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState {
                pending: VecDeque::new(),
                in_flight: 0,
                closed: false,
            }),
            work: Condvar::new(),
            idle: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn push(&self, item: T) {
        self.lock().pending.push_back(item);
        self.work.notify_one();
    }

    /// Blocks until an item is available. Returns `None` once the queue is
    /// closed and fully drained. The caller must call [`WorkQueue::finish`]
    /// after handling the returned item.
    pub fn next(&self) -> Option<T> {
        let mut state = self.lock();
        loop {
            if let Some(item) = state.pending.pop_front() {
                state.in_flight += 1;
                return Some(item);
            }
            if state.closed {
                return None;
            }
            state = self.work.wait(state).unwrap_or_else(PoisonError::into_inner);
        }
    }

    pub fn finish(&self) {
        let mut state = self.lock();
        state.in_flight = state.in_flight.saturating_sub(1);
        if state.outstanding() == 0 {
            self.idle.notify_all();
        }
    }

    pub fn outstanding(&self) -> usize {
        self.lock().outstanding()
    }

    /// Wait until nothing is queued or in flight, calling `heartbeat` with the
    /// outstanding count every `interval` while waiting.
    pub fn wait_idle(&self, interval: Duration, mut heartbeat: impl FnMut(usize)) {
        let mut state = self.lock();
        while state.outstanding() > 0 {
            let (guard, timeout) = self
                .idle
                .wait_timeout(state, interval)
                .unwrap_or_else(PoisonError::into_inner);
            state = guard;
            if timeout.timed_out() && state.outstanding() > 0 {
                heartbeat(state.outstanding());
            }
        }
    }

    /// Workers exit once the remaining items are drained.
    pub fn close(&self) {
        self.lock().closed = true;
        self.work.notify_all();
    }
}

/// Closes the queue when dropped so scoped workers are released on every exit path.
pub struct CloseOnDrop<'q, T>(pub &'q WorkQueue<T>);

impl<T> Drop for CloseOnDrop<'_, T> {
    fn drop(&mut self) {
        self.0.close();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    use super::*;

    #[test]
    fn drains_after_close() {
        let queue = WorkQueue::new();
        queue.push(1);
        queue.push(2);
        queue.close();
        assert_eq!(queue.next(), Some(1));
        queue.finish();
        assert_eq!(queue.next(), Some(2));
        queue.finish();
        assert_eq!(queue.next(), None);
        assert_eq!(queue.outstanding(), 0);
    }

    #[test]
    fn workers_never_exceed_thread_count() {
        let queue = WorkQueue::new();
        let current = AtomicUsize::new(0);
        let peak = AtomicUsize::new(0);
        let done = AtomicUsize::new(0);

        thread::scope(|scope| {
            let _close = CloseOnDrop(&queue);
            for _ in 0..3 {
                scope.spawn(|| {
                    while let Some(_item) = queue.next() {
                        let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        thread::sleep(Duration::from_millis(5));
                        current.fetch_sub(1, Ordering::SeqCst);
                        done.fetch_add(1, Ordering::SeqCst);
                        queue.finish();
                    }
                });
            }
            for item in 0..20 {
                queue.push(item);
            }
            queue.wait_idle(Duration::from_millis(1), |_| {});
        });

        assert_eq!(done.load(Ordering::SeqCst), 20);
        assert!(peak.load(Ordering::SeqCst) <= 3);
    }

    #[test]
    fn heartbeat_reports_outstanding() {
        let queue = WorkQueue::new();
        let mut beats = Vec::new();
        thread::scope(|scope| {
            let _close = CloseOnDrop(&queue);
            queue.push(());
            scope.spawn(|| {
                while queue.next().is_some() {
                    thread::sleep(Duration::from_millis(30));
                    queue.finish();
                }
            });
            queue.wait_idle(Duration::from_millis(5), |remaining| beats.push(remaining));
        });
        assert!(!beats.is_empty());
        assert!(beats.iter().all(|&remaining| remaining == 1));
    }
}
