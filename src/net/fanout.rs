//! Per-subscriber fan-out of a single ordered sequence.
//!
//! Every subscriber gets its own unbounded queue, so a slow subscriber never
//! causes another to lose items and nothing is dropped while a subscriber is
//! attached. Items published before a subscriber attached are not replayed.

use std::pin::Pin;
use std::sync::Mutex;
use std::task::{Context, Poll};

use futures_util::Stream;
use tokio::sync::mpsc;

/// Broadcasts every published item to every live subscriber, in order.
#[derive(Debug)]
pub struct Fanout<T> {
    /// `None` once closed; subscribers attached after that see an ended stream.
    subscribers: Mutex<Option<Vec<mpsc::UnboundedSender<T>>>>,
}

impl<T: Clone> Fanout<T> {
    pub fn new() -> Self {
        Self {
            subscribers: Mutex::new(Some(Vec::new())),
        }
    }

    /// Attach a new subscriber that receives items published from now on.
    pub fn subscribe(&self) -> FanoutStream<T> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut subscribers = self.subscribers.lock().expect("fanout mutex poisoned");
        if let Some(list) = subscribers.as_mut() {
            list.push(tx);
        }
        FanoutStream { rx }
    }

    /// Deliver `item` to every subscriber. Detached subscribers are pruned.
    pub fn publish(&self, item: T) {
        let mut subscribers = self.subscribers.lock().expect("fanout mutex poisoned");
        if let Some(list) = subscribers.as_mut() {
            list.retain(|tx| tx.send(item.clone()).is_ok());
        }
    }

    /// Publish a final item, then end every stream.
    pub fn close_with(&self, last: Option<T>) {
        let mut subscribers = self.subscribers.lock().expect("fanout mutex poisoned");
        if let Some(list) = subscribers.take() {
            if let Some(item) = last {
                for tx in &list {
                    let _ = tx.send(item.clone());
                }
            }
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .expect("fanout mutex poisoned")
            .as_ref()
            .map_or(0, |list| list.iter().filter(|tx| !tx.is_closed()).count())
    }
}

impl<T: Clone> Default for Fanout<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// One subscriber's view of a [`Fanout`].
#[derive(Debug)]
pub struct FanoutStream<T> {
    rx: mpsc::UnboundedReceiver<T>,
}

impl<T> FanoutStream<T> {
    /// Next item, or `None` once the fanout is closed and drained.
    pub async fn recv(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    /// Non-suspending receive, for draining in tests.
    pub fn try_recv(&mut self) -> Option<T> {
        self.rx.try_recv().ok()
    }
}

impl<T> Stream for FanoutStream<T> {
    type Item = T;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        self.rx.poll_recv(cx)
    }
}
