//! Capacity-1 synchronous hand-off to a dedicated worker thread.
//!
//! There is no internal queue: posting while the previous item is still
//! being processed blocks the caller until the worker is done. One item
//! resolves at a time and round-to-round order is preserved for free.

use std::thread::{self, JoinHandle};

use parking_lot::{Condvar, Mutex};
use std::sync::Arc;

struct State<T> {
    item: Option<T>,
    busy: bool,
    terminated: bool,
}

struct Inner<T> {
    state: Mutex<State<T>>,
    cond: Condvar,
}

pub struct Handoff<T: Send + 'static> {
    inner: Arc<Inner<T>>,
    worker: Option<JoinHandle<()>>,
}

impl<T: Send + 'static> Handoff<T> {
    pub fn new(name: &str, mut delegate: impl FnMut(T) + Send + 'static) -> Handoff<T> {
        let inner = Arc::new(Inner {
            state: Mutex::new(State { item: None, busy: false, terminated: false }),
            cond: Condvar::new(),
        });
        let worker_inner = inner.clone();
        let worker = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || loop {
                let item = {
                    let mut state = worker_inner.state.lock();
                    while state.item.is_none() && !state.terminated {
                        worker_inner.cond.wait(&mut state);
                    }
                    match state.item.take() {
                        Some(item) => {
                            state.busy = true;
                            item
                        }
                        // Terminated with nothing pending.
                        None => break,
                    }
                };
                delegate(item);
                let mut state = worker_inner.state.lock();
                state.busy = false;
                worker_inner.cond.notify_all();
                if state.terminated {
                    break;
                }
            })
            .expect("spawn hand-off worker");
        Handoff { inner, worker: Some(worker) }
    }

    /// Hand one item to the worker, blocking while the previous item is
    /// still in flight. Items posted after termination are discarded.
    pub fn post(&self, item: T) {
        let mut state = self.inner.state.lock();
        while (state.item.is_some() || state.busy) && !state.terminated {
            self.inner.cond.wait(&mut state);
        }
        if state.terminated {
            return;
        }
        state.item = Some(item);
        self.inner.cond.notify_all();
    }

    /// Stop accepting work. The in-flight item, if any, completes.
    pub fn terminate(&self) {
        let mut state = self.inner.state.lock();
        state.terminated = true;
        self.inner.cond.notify_all();
    }
}

impl<T: Send + 'static> Drop for Handoff<T> {
    fn drop(&mut self) {
        self.terminate();
        if let Some(worker) = self.worker.take() {
            // The last handle can be dropped from the worker itself (the
            // delegate tearing down its own battle); joining would then
            // self-deadlock.
            if worker.thread().id() != thread::current().id() {
                let _ = worker.join();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn items_are_processed_in_post_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let handoff = Handoff::new("test-order", move |n: usize| {
            sink.lock().push(n);
        });
        for n in 0..16 {
            handoff.post(n);
        }
        handoff.terminate();
        drop(handoff);
        assert_eq!(*seen.lock(), (0..16).collect::<Vec<_>>());
    }

    #[test]
    fn post_blocks_while_worker_is_busy() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let (in_flight_w, peak_w) = (in_flight.clone(), peak.clone());
        let handoff = Handoff::new("test-busy", move |_: ()| {
            let now = in_flight_w.fetch_add(1, Ordering::SeqCst) + 1;
            peak_w.fetch_max(now, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(20));
            in_flight_w.fetch_sub(1, Ordering::SeqCst);
        });
        for _ in 0..4 {
            handoff.post(());
        }
        drop(handoff);
        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn post_after_terminate_is_discarded() {
        let count = Arc::new(AtomicUsize::new(0));
        let count_w = count.clone();
        let handoff = Handoff::new("test-term", move |_: ()| {
            count_w.fetch_add(1, Ordering::SeqCst);
        });
        handoff.post(());
        handoff.terminate();
        handoff.post(());
        drop(handoff);
        assert!(count.load(Ordering::SeqCst) <= 1);
    }
}
