use std::{
    collections::VecDeque,
    sync::{Condvar, Mutex, MutexGuard, PoisonError},
};

use crate::defaults::DEFAULT_CHANNEL_CAPACITY;

#[derive(Debug)]
struct State<T, E> {
    queue: VecDeque<T>,
    finished: bool,
    error: Option<E>,
}

impl<T, E> State<T, E> {
    fn is_closed(&self) -> bool {
        self.finished || self.error.is_some()
    }
}

/// Capacity-limited FIFO handoff between one producer and one consumer.
///
/// The producer blocks in [`put`](Self::put) while the queue is full and signals the
/// end of the stream with [`signal_done`](Self::signal_done) or
/// [`signal_error`](Self::signal_error). The consumer blocks in [`get`](Self::get)
/// until a record, end-of-stream, or the terminal error is available. Records queued
/// before an error are still delivered ahead of it, and once surfaced the error is
/// returned again on every later call.
///
/// Queue, finished flag and error cell share one mutex and one condition variable.
#[derive(Debug)]
pub struct BoundedChannel<T, E> {
    capacity: usize,
    state: Mutex<State<T, E>>,
    changed: Condvar,
}

impl<T, E: Clone> Default for BoundedChannel<T, E> {
    fn default() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }
}

impl<T, E: Clone> BoundedChannel<T, E> {
    /// A capacity of zero is treated as one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            state: Mutex::new(State {
                queue: VecDeque::with_capacity(capacity),
                finished: false,
                error: None,
            }),
            changed: Condvar::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().queue.is_empty()
    }

    /// True once the stream was finished, failed or cancelled; `put` drops records
    /// from then on.
    pub fn is_closed(&self) -> bool {
        self.lock().is_closed()
    }

    /// Appends `item`, blocking while the queue is full.
    ///
    /// Returns `false` without queueing when the channel is already closed, including
    /// when it closes while this call is waiting for room.
    pub fn put(&self, item: T) -> bool {
        let mut state = self.lock();
        loop {
            if state.is_closed() {
                return false;
            }
            if state.queue.len() < self.capacity {
                break;
            }
            state = self.wait(state);
        }
        state.queue.push_back(item);
        self.changed.notify_all();
        true
    }

    /// Takes the oldest record, blocking while the queue is empty and the stream is
    /// still open. `Ok(None)` marks a clean end of stream.
    pub fn get(&self) -> Result<Option<T>, E> {
        let mut state = self.lock();
        loop {
            if let Some(item) = state.queue.pop_front() {
                self.changed.notify_all();
                return Ok(Some(item));
            }
            if let Some(error) = state.error.as_ref() {
                return Err(error.clone());
            }
            if state.finished {
                return Ok(None);
            }
            state = self.wait(state);
        }
    }

    /// Marks the end of production. Idempotent.
    pub fn signal_done(&self) {
        let mut state = self.lock();
        state.finished = true;
        self.changed.notify_all();
    }

    /// Records the terminal error. Only the first error is kept, and none is recorded
    /// once the stream finished.
    pub fn signal_error(&self, error: E) {
        let mut state = self.lock();
        if !state.is_closed() {
            state.error = Some(error);
        }
        self.changed.notify_all();
    }

    /// Consumer-side abandonment: drops queued records, closes the channel and wakes
    /// a producer blocked in `put`.
    pub fn cancel(&self) {
        let mut state = self.lock();
        state.finished = true;
        state.queue.clear();
        self.changed.notify_all();
    }

    fn lock(&self) -> MutexGuard<'_, State<T, E>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn wait<'a>(&self, guard: MutexGuard<'a, State<T, E>>) -> MutexGuard<'a, State<T, E>> {
        self.changed
            .wait(guard)
            .unwrap_or_else(PoisonError::into_inner)
    }
}
