//! In-process dispatch queue between the web handlers and the workers.
//!
//! A cloneable handle over a tokio mpsc channel. Producers never wait:
//! `push` either enqueues immediately or, for a bounded queue that is full,
//! fails immediately. Consumers share the receiving half behind an async
//! mutex and park in `pop` until a task arrives.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{mpsc, Mutex};

use super::types::DispatchTask;

/// Reasons `push` can refuse a task.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    #[error("dispatch queue full (capacity {0})")]
    Full(usize),
    #[error("dispatch queue closed")]
    Closed,
}

enum TaskSender {
    Unbounded(mpsc::UnboundedSender<DispatchTask>),
    Bounded(mpsc::Sender<DispatchTask>),
}

enum TaskReceiver {
    Unbounded(mpsc::UnboundedReceiver<DispatchTask>),
    Bounded(mpsc::Receiver<DispatchTask>),
}

impl TaskReceiver {
    async fn recv(&mut self) -> Option<DispatchTask> {
        match self {
            TaskReceiver::Unbounded(rx) => rx.recv().await,
            TaskReceiver::Bounded(rx) => rx.recv().await,
        }
    }
}

/// FIFO of dispatch tasks shared by producers and workers.
#[derive(Clone)]
pub struct DispatchQueue {
    inner: Arc<QueueInner>,
}

struct QueueInner {
    sender: TaskSender,
    receiver: Mutex<TaskReceiver>,
    depth: AtomicUsize,
    capacity: Option<usize>,
}

impl DispatchQueue {
    /// Queue without a capacity limit.
    pub fn unbounded() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self::from_parts(TaskSender::Unbounded(tx), TaskReceiver::Unbounded(rx), None)
    }

    /// Queue holding at most `capacity` waiting tasks (minimum 1).
    pub fn bounded(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, rx) = mpsc::channel(capacity);
        Self::from_parts(
            TaskSender::Bounded(tx),
            TaskReceiver::Bounded(rx),
            Some(capacity),
        )
    }

    /// Bounded when `capacity` is set, unbounded otherwise.
    pub fn with_capacity(capacity: Option<usize>) -> Self {
        match capacity {
            Some(capacity) => Self::bounded(capacity),
            None => Self::unbounded(),
        }
    }

    fn from_parts(sender: TaskSender, receiver: TaskReceiver, capacity: Option<usize>) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                sender,
                receiver: Mutex::new(receiver),
                depth: AtomicUsize::new(0),
                capacity,
            }),
        }
    }

    /// Enqueue a task without waiting.
    pub fn push(&self, task: DispatchTask) -> Result<(), QueueError> {
        // Count first so a fast consumer never decrements below zero.
        self.inner.depth.fetch_add(1, Ordering::SeqCst);

        let result = match &self.inner.sender {
            TaskSender::Unbounded(tx) => tx.send(task).map_err(|_| QueueError::Closed),
            TaskSender::Bounded(tx) => tx.try_send(task).map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => {
                    QueueError::Full(self.inner.capacity.unwrap_or_default())
                }
                mpsc::error::TrySendError::Closed(_) => QueueError::Closed,
            }),
        };

        if result.is_err() {
            self.inner.depth.fetch_sub(1, Ordering::SeqCst);
        }
        result
    }

    /// Wait for the next task.
    ///
    /// Cancel-safe: dropping the future before it resolves loses no task.
    pub async fn pop(&self) -> Option<DispatchTask> {
        let mut receiver = self.inner.receiver.lock().await;
        let task = receiver.recv().await;
        if task.is_some() {
            self.inner.depth.fetch_sub(1, Ordering::SeqCst);
        }
        task
    }

    /// Number of tasks waiting to be claimed.
    pub fn len(&self) -> usize {
        self.inner.depth.load(Ordering::SeqCst)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> Option<usize> {
        self.inner.capacity
    }
}
