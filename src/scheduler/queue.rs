use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::oneshot;

/// Unbounded async FIFO queue.
///
/// `poll` waits for the next item when the buffer is empty. Pushes are
/// handed directly to the oldest waiting `poll` caller and only land in the
/// buffer when nobody is waiting. The buffer and the waiter list share one
/// mutex so a push is matched against waiters atomically.
#[derive(Debug)]
pub struct BlockingQueue<T> {
    inner: Mutex<Inner<T>>,
}

#[derive(Debug)]
struct Inner<T> {
    items: VecDeque<T>,
    waiters: VecDeque<(u64, oneshot::Sender<T>)>,
    next_waiter: u64,
}

impl<T> Inner<T> {
    /// Hand `item` to the oldest live waiter, or give it back if there is none.
    fn deliver(&mut self, mut item: T) -> Option<T> {
        while let Some((_, waiter)) = self.waiters.pop_front() {
            match waiter.send(item) {
                Ok(()) => return None,
                Err(returned) => item = returned,
            }
        }
        Some(item)
    }
}

/// Registration of a suspended `poll`.
///
/// Dropped before completion, it removes itself from the waiter list, or,
/// if a push already handed it an item, returns that item to the queue.
struct Waiter<'a, T> {
    queue: &'a BlockingQueue<T>,
    id: u64,
    rx: oneshot::Receiver<T>,
    done: bool,
}

impl<T> Drop for Waiter<'_, T> {
    fn drop(&mut self) {
        if self.done {
            return;
        }

        let mut inner = self.queue.lock();
        if let Some(pos) = inner.waiters.iter().position(|(id, _)| *id == self.id) {
            inner.waiters.remove(pos);
            return;
        }

        // Push sends under the lock, so once our sender is gone the item is here
        self.rx.close();
        if let Ok(item) = self.rx.try_recv() {
            if let Some(item) = inner.deliver(item) {
                inner.items.push_front(item);
            }
        }
    }
}

impl<T> Default for BlockingQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> BlockingQueue<T> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                items: VecDeque::new(),
                waiters: VecDeque::new(),
                next_waiter: 0,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner<T>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add an item. If there are pending `poll` calls, the oldest one receives
    /// the item immediately and it never enters the buffer.
    pub fn push(&self, item: T) {
        let mut inner = self.lock();
        if let Some(item) = inner.deliver(item) {
            inner.items.push_back(item);
        }
    }

    /// Remove and return the head of the queue, waiting until an item is
    /// pushed if the buffer is empty. Concurrent callers are served in the
    /// order they called `poll`. Dropping the future never loses an item.
    pub async fn poll(&self) -> T {
        loop {
            let mut waiter = {
                let mut inner = self.lock();
                if let Some(item) = inner.items.pop_front() {
                    return item;
                }
                let (tx, rx) = oneshot::channel();
                let id = inner.next_waiter;
                inner.next_waiter += 1;
                inner.waiters.push_back((id, tx));
                Waiter {
                    queue: self,
                    id,
                    rx,
                    done: false,
                }
            };

            let received = (&mut waiter.rx).await;
            waiter.done = true;
            // Senders only leave the list through `send` or our own drop,
            // so this cannot fail. Re-register if it does.
            if let Ok(item) = received {
                return item;
            }
        }
    }

    /// Snapshot of the buffered items, mapped through `f`, head first.
    pub fn snapshot_with<R>(&self, f: impl FnMut(&T) -> R) -> Vec<R> {
        self.lock().items.iter().map(f).collect()
    }

    /// Number of buffered items. Pending waiters are not counted.
    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().items.is_empty()
    }

    /// Number of `poll` calls currently suspended.
    pub fn waiting(&self) -> usize {
        self.lock().waiters.len()
    }

    /// Drop all buffered items. Suspended `poll` calls stay suspended.
    pub fn clear(&self) {
        self.lock().items.clear();
    }
}

impl<T: Clone> BlockingQueue<T> {
    /// Copy of the buffered items, head first.
    pub fn entries(&self) -> Vec<T> {
        self.snapshot_with(T::clone)
    }
}
