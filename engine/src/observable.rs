//! Observable values with an explicit subscribe/unsubscribe contract.
//!
//! A [`Subscription`] yields the current value first and then every later
//! change. Dropping it (or calling [`Subscription::unsubscribe`]) releases the
//! underlying receiver without affecting other subscribers.

use futures::Stream;
use tokio::sync::watch;

/// A live view over an observable value.
#[derive(Debug)]
pub struct Subscription<T> {
    rx: watch::Receiver<T>,
    primed: bool,
}

impl<T: Clone> Subscription<T> {
    pub(crate) fn new(rx: watch::Receiver<T>) -> Self {
        Self { rx, primed: false }
    }

    /// The latest value, without waiting.
    pub fn current(&self) -> T {
        self.rx.borrow().clone()
    }

    /// Wait for the next value.
    ///
    /// The first call returns the current value immediately. Returns `None`
    /// once the producer has gone away.
    pub async fn next(&mut self) -> Option<T> {
        if !self.primed {
            self.primed = true;
            return Some(self.rx.borrow_and_update().clone());
        }
        self.rx.changed().await.ok()?;
        Some(self.rx.borrow_and_update().clone())
    }

    /// Wait until a value satisfies `predicate` and return it.
    pub async fn wait_for(&mut self, mut predicate: impl FnMut(&T) -> bool) -> Option<T> {
        while let Some(value) = self.next().await {
            if predicate(&value) {
                return Some(value);
            }
        }
        None
    }

    /// Release the subscription.
    pub fn unsubscribe(self) {}
}

impl<T: Clone + Send + Sync + 'static> Subscription<T> {
    /// Adapt into a [`Stream`].
    pub fn into_stream(self) -> impl Stream<Item = T> + Send {
        futures::stream::unfold(self, |mut sub| async move {
            let value = sub.next().await?;
            Some((value, sub))
        })
    }
}

/// Producer side of an observable value.
#[derive(Debug)]
pub(crate) struct Observable<T> {
    tx: watch::Sender<T>,
}

impl<T: Clone + PartialEq> Observable<T> {
    pub(crate) fn new(initial: T) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx }
    }

    pub(crate) fn get(&self) -> T {
        self.tx.borrow().clone()
    }

    /// Publish a value. Subscribers are only woken when it differs.
    pub(crate) fn set(&self, value: T) {
        self.tx.send_if_modified(|current| {
            if *current == value {
                return false;
            }
            *current = value;
            true
        });
    }

    pub(crate) fn subscribe(&self) -> Subscription<T> {
        Subscription::new(self.tx.subscribe())
    }

    pub(crate) fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}
