use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;

use crate::cancel::Canceller;
use crate::error::{Error, Result};

/// Outcome of waiting for the next queued item.
#[derive(Debug, PartialEq, Eq)]
pub enum Next<T> {
    Job(T),
    /// Closed and fully drained.
    Exhausted,
    Cancelled,
}

#[async_trait]
pub trait Queue<T>: Send + Sync {
    /// Enqueues `item`, waiting for space while the queue is full.
    async fn submit(&self, item: T, cancel: &Canceller) -> Result<()>;

    /// Takes the oldest item, waiting while the queue is empty and open.
    async fn acquire(&self, cancel: &Canceller) -> Next<T>;

    fn close(&self);

    fn is_closed(&self) -> bool;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn capacity(&self) -> usize;
}

pub struct FifoQueue<T> {
    state: Mutex<State<T>>,
    capacity: usize,
    not_empty: Notify,
    not_full: Notify,
}

struct State<T> {
    items: VecDeque<T>,
    closed: bool,
}

impl<T> FifoQueue<T> {
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(Error::invalid_config("queue capacity must be at least 1"));
        }

        Ok(Self {
            state: Mutex::new(State {
                items: VecDeque::with_capacity(capacity),
                closed: false,
            }),
            capacity,
            not_empty: Notify::new(),
            not_full: Notify::new(),
        })
    }

    // A panic while holding the lock can't leave `State` half-updated, so a
    // poisoned lock is still safe to use.
    fn state(&self) -> MutexGuard<'_, State<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl<T: Send> Queue<T> for FifoQueue<T> {
    async fn submit(&self, item: T, cancel: &Canceller) -> Result<()> {
        loop {
            // register before checking state so a wakeup between the check
            // and the wait isn't lost
            let notified = self.not_full.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.state();
                if state.closed {
                    return Err(Error::QueueClosed);
                }
                if cancel.is_cancelled() {
                    return Err(Error::Cancelled);
                }
                if state.items.len() < self.capacity {
                    state.items.push_back(item);
                    drop(state);
                    self.not_empty.notify_one();
                    return Ok(());
                }
            }

            tokio::select! {
                _ = &mut notified => {}
                _ = cancel.cancelled() => return Err(Error::Cancelled),
            }
        }
    }

    async fn acquire(&self, cancel: &Canceller) -> Next<T> {
        loop {
            let notified = self.not_empty.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.state();
                if state.closed && state.items.is_empty() {
                    return Next::Exhausted;
                }
                if cancel.is_cancelled() {
                    return Next::Cancelled;
                }
                if let Some(item) = state.items.pop_front() {
                    drop(state);
                    self.not_full.notify_one();
                    return Next::Job(item);
                }
            }

            tokio::select! {
                _ = &mut notified => {}
                _ = cancel.cancelled() => return Next::Cancelled,
            }
        }
    }

    fn close(&self) {
        let mut state = self.state();
        if state.closed {
            return;
        }
        state.closed = true;
        drop(state);

        self.not_empty.notify_waiters();
        self.not_full.notify_waiters();
    }

    fn is_closed(&self) -> bool {
        self.state().closed
    }

    fn len(&self) -> usize {
        self.state().items.len()
    }

    fn capacity(&self) -> usize {
        self.capacity
    }
}
