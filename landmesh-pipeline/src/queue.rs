//! Thread-safe FIFO queue with shutdown
//!
//! Handles are cheap to clone and all refer to the same queue. Shutting a
//! queue down wakes every blocked caller; it can be resumed afterwards.

use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::warn;

/// Why a pop returned no item
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PopError {
    #[error("queue is empty")]
    Empty,

    #[error("queue is shut down")]
    Shutdown,

    #[error("timed out waiting for an item")]
    Timeout,
}

struct Inner<T> {
    name: String,
    items: Mutex<VecDeque<T>>,
    available: Condvar,
    space: Condvar,
    shutdown: AtomicBool,
    capacity: Option<usize>,
}

/// Multi-producer multi-consumer FIFO queue
pub struct ThreadsafeQueue<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for ThreadsafeQueue<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> std::fmt::Debug for ThreadsafeQueue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadsafeQueue")
            .field("name", &self.inner.name)
            .field("len", &self.len())
            .field("capacity", &self.inner.capacity)
            .field("shutdown", &self.is_shutdown())
            .finish()
    }
}

impl<T> ThreadsafeQueue<T> {
    fn with_capacity(name: impl Into<String>, capacity: Option<usize>) -> Self {
        Self {
            inner: Arc::new(Inner {
                name: name.into(),
                items: Mutex::new(VecDeque::new()),
                available: Condvar::new(),
                space: Condvar::new(),
                shutdown: AtomicBool::new(false),
                capacity,
            }),
        }
    }

    pub fn unbounded(name: impl Into<String>) -> Self {
        Self::with_capacity(name, None)
    }

    /// A queue holding at most `capacity` items (at least one)
    pub fn bounded(name: impl Into<String>, capacity: usize) -> Self {
        Self::with_capacity(name, Some(capacity.max(1)))
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn capacity(&self) -> Option<usize> {
        self.inner.capacity
    }

    /// Push an item, dropping the oldest one if the queue is full.
    ///
    /// Returns `false` if the queue is shut down.
    pub fn push(&self, item: T) -> bool {
        if self.is_shutdown() {
            warn!(queue = %self.inner.name, "Push on a shut down queue");
            return false;
        }
        let mut items = self.inner.items.lock();
        if let Some(capacity) = self.inner.capacity {
            if items.len() >= capacity {
                items.pop_front();
                warn!(queue = %self.inner.name, capacity, "Queue full, dropping oldest item");
            }
        }
        items.push_back(item);
        drop(items);
        self.inner.available.notify_one();
        true
    }

    /// Push an item, waiting for room if the queue is full.
    ///
    /// Returns `false` if the queue is or gets shut down.
    pub fn push_blocking_if_full(&self, item: T) -> bool {
        let mut items = self.inner.items.lock();
        if let Some(capacity) = self.inner.capacity {
            while items.len() >= capacity && !self.is_shutdown() {
                self.inner.space.wait(&mut items);
            }
        }
        if self.is_shutdown() {
            return false;
        }
        items.push_back(item);
        drop(items);
        self.inner.available.notify_one();
        true
    }

    /// Pop the oldest item without waiting
    pub fn pop(&self) -> Result<T, PopError> {
        if self.is_shutdown() {
            return Err(PopError::Shutdown);
        }
        let item = self.inner.items.lock().pop_front();
        match item {
            Some(item) => {
                self.inner.space.notify_one();
                Ok(item)
            }
            None => Err(PopError::Empty),
        }
    }

    /// Pop the oldest item, waiting until one is pushed or the queue is shut
    /// down
    pub fn pop_blocking(&self) -> Result<T, PopError> {
        let mut items = self.inner.items.lock();
        loop {
            if self.is_shutdown() {
                return Err(PopError::Shutdown);
            }
            if let Some(item) = items.pop_front() {
                drop(items);
                self.inner.space.notify_one();
                return Ok(item);
            }
            self.inner.available.wait(&mut items);
        }
    }

    /// Like [`ThreadsafeQueue::pop_blocking`], giving up after `timeout`
    pub fn pop_blocking_with_timeout(&self, timeout: Duration) -> Result<T, PopError> {
        let deadline = Instant::now() + timeout;
        let mut items = self.inner.items.lock();
        loop {
            if self.is_shutdown() {
                return Err(PopError::Shutdown);
            }
            if let Some(item) = items.pop_front() {
                drop(items);
                self.inner.space.notify_one();
                return Ok(item);
            }
            if self.inner.available.wait_until(&mut items, deadline).timed_out() {
                if self.is_shutdown() {
                    return Err(PopError::Shutdown);
                }
                return match items.pop_front() {
                    Some(item) => Ok(item),
                    None => Err(PopError::Timeout),
                };
            }
        }
    }

    /// Stop the queue and wake every waiting caller
    pub fn shutdown(&self) {
        self.inner.shutdown.store(true, Ordering::SeqCst);
        // Taking the lock orders the flag before any waiter re-checks it
        let _items = self.inner.items.lock();
        self.inner.available.notify_all();
        self.inner.space.notify_all();
    }

    /// Accept pushes and pops again after a shutdown
    pub fn resume(&self) {
        self.inner.shutdown.store(false, Ordering::SeqCst);
    }

    pub fn is_shutdown(&self) -> bool {
        self.inner.shutdown.load(Ordering::SeqCst)
    }

    pub fn is_empty(&self) -> bool {
        self.inner.items.lock().is_empty()
    }

    pub fn len(&self) -> usize {
        self.inner.items.lock().len()
    }
}
