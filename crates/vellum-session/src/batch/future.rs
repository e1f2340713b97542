use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::oneshot;
use vellum_common::{VellumError, VellumResult};

/// The eventual result of one query in a batch.
///
/// Resolves once the batch executes. Dropping the batch without executing
/// it resolves every pending future with [`VellumError::Cancelled`].
#[derive(Debug)]
pub struct BatchFuture<T> {
    rx: oneshot::Receiver<VellumResult<T>>,
}

/// The sending half held by a result handler.
pub(crate) type Completion<T> = oneshot::Sender<VellumResult<T>>;

impl<T> BatchFuture<T> {
    /// Creates a pending future and its completion.
    pub(crate) fn pending() -> (Completion<T>, Self) {
        let (tx, rx) = oneshot::channel();
        (tx, Self { rx })
    }

    /// Creates a future that is already resolved.
    pub(crate) fn ready(value: VellumResult<T>) -> Self {
        let (tx, future) = Self::pending();
        // The receiver is alive, so the send cannot fail.
        let _ = tx.send(value);
        future
    }
}

impl<T> Future for BatchFuture<T> {
    type Output = VellumResult<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|result| result.unwrap_or(Err(VellumError::Cancelled)))
    }
}
