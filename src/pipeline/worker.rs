//! # Worker Pool
//! Bounded thread pool used by the parallel strategy. Submission blocks when
//! the queue is full, which is the backpressure contract callers rely on;
//! the active depth is exported so outer layers can throttle.
//!
//! Results are re-ordered by input index before returning, so batch output
//! order always matches input order regardless of completion order.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread;

#[derive(Clone)]
pub struct WorkerPool {
    workers: usize,
    queue_cap: usize,
    active: Arc<AtomicUsize>,
}

impl WorkerPool {
    /// `workers` threads over a queue of `queue_cap` pending items.
    pub fn new(workers: usize, queue_cap: usize) -> Self {
        Self {
            workers: workers.max(1),
            queue_cap: queue_cap.max(1),
            active: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Pool sized to the machine, with a small bounded queue.
    pub fn default_for_host() -> Self {
        let workers = thread::available_parallelism().map(|n| n.get()).unwrap_or(4);
        Self::new(workers, workers * 4)
    }

    /// Items currently being processed by workers.
    pub fn active_depth(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Apply `f` to every item concurrently and return results in input
    /// order. `f` receives the item's index alongside the item.
    pub fn map_ordered<T, R, F>(&self, items: Vec<T>, f: F) -> Vec<R>
    where
        T: Send,
        R: Send,
        F: Fn(usize, T) -> R + Sync,
    {
        if items.is_empty() {
            return Vec::new();
        }

        let (in_tx, in_rx) = mpsc::sync_channel::<(usize, T)>(self.queue_cap);
        let in_rx = Mutex::new(in_rx);
        let (out_tx, out_rx) = mpsc::channel::<(usize, R)>();

        let mut collected: Vec<(usize, R)> = Vec::with_capacity(items.len());

        thread::scope(|scope| {
            for _ in 0..self.workers {
                let out_tx = out_tx.clone();
                let in_rx = &in_rx;
                let f = &f;
                let active = &self.active;
                scope.spawn(move || loop {
                    let next = { in_rx.lock().expect("pool queue lock poisoned").recv() };
                    match next {
                        Ok((idx, item)) => {
                            active.fetch_add(1, Ordering::SeqCst);
                            metrics::gauge!("worker_pool_active").increment(1.0);
                            let result = f(idx, item);
                            active.fetch_sub(1, Ordering::SeqCst);
                            metrics::gauge!("worker_pool_active").decrement(1.0);
                            if out_tx.send((idx, result)).is_err() {
                                break;
                            }
                        }
                        Err(_) => break,
                    }
                });
            }
            drop(out_tx);

            // Blocks when the queue is full; that is the backpressure.
            for (idx, item) in items.into_iter().enumerate() {
                in_tx.send((idx, item)).expect("worker pool hung up");
            }
            drop(in_tx);

            collected.extend(out_rx.iter());
        });

        collected.sort_by_key(|(idx, _)| *idx);
        collected.into_iter().map(|(_, r)| r).collect()
    }
}
