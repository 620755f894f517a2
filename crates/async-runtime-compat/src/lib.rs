//! Runtime-agnostic async utilities
//!
//! This crate provides traits and implementations for spawning futures
//! across different async runtimes without coupling to a specific runtime.
//! On top of plain spawning it offers joinable handles and a cooperative
//! cancellation token, which together let a caller stop a background loop
//! and wait until it has actually finished.
//!
//! # Examples
//!
//! ```no_run
//! use async_runtime_compat::prelude::*;
//!
//! async fn example<S: Spawner>(spawner: &S) {
//!     let (cancel, token) = cancellation();
//!     let handle = spawn_joinable(spawner, async move {
//!         token.cancelled().await;
//!     });
//!     cancel.cancel();
//!     handle.await;
//! }
//!
//! // With smol
//! # #[cfg(feature = "smol")]
//! smol::block_on(async {
//!     let spawner = SmolSpawner;
//!     example(&spawner).await;
//! });
//! ```

#![warn(missing_docs)]

use futures::FutureExt;
use futures::future::RemoteHandle;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

/// A spawner that can spawn futures on an async runtime
pub trait Spawner: Send + Sync {
    /// Spawn a future on the runtime
    ///
    /// The future will run to completion in the background.
    fn spawn(&self, future: Pin<Box<dyn Future<Output = ()> + Send + 'static>>);
}

impl<S: Spawner + ?Sized> Spawner for std::sync::Arc<S> {
    fn spawn(&self, future: Pin<Box<dyn Future<Output = ()> + Send + 'static>>) {
        (**self).spawn(future)
    }
}

/// Handle to a task spawned with [`spawn_joinable`]
///
/// Awaiting the handle yields the task's output. Dropping the handle
/// without awaiting it cancels the task at its next suspension point,
/// so background work cannot outlive its owner by accident.
#[must_use = "dropping a JoinHandle cancels the task"]
pub struct JoinHandle<T> {
    inner: RemoteHandle<T>,
}

impl<T: 'static> Future for JoinHandle<T> {
    type Output = T;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<T> {
        self.inner.poll_unpin(cx)
    }
}

impl<T> std::fmt::Debug for JoinHandle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JoinHandle").finish_non_exhaustive()
    }
}

/// Spawn a future on any [`Spawner`] and keep a handle to its output
///
/// This works with every runtime because the spawned half only needs to be
/// polled; the output travels back through a oneshot channel.
pub fn spawn_joinable<S, F>(spawner: &S, future: F) -> JoinHandle<F::Output>
where
    S: Spawner + ?Sized,
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    let (remote, handle) = future.remote_handle();
    spawner.spawn(Box::pin(remote));
    JoinHandle { inner: handle }
}

/// Create a connected cancellation handle and token
pub fn cancellation() -> (CancelHandle, CancelToken) {
    let (tx, rx) = async_channel::bounded::<()>(1);
    (CancelHandle { tx }, CancelToken { rx })
}

/// Requests cancellation of every [`CancelToken`] created alongside it
///
/// Dropping the handle also counts as a cancellation request.
#[derive(Debug)]
pub struct CancelHandle {
    tx: async_channel::Sender<()>,
}

impl CancelHandle {
    /// Signal cancellation to all tokens
    pub fn cancel(&self) {
        self.tx.close();
    }
}

/// Cooperative cancellation token
#[derive(Debug, Clone)]
pub struct CancelToken {
    rx: async_channel::Receiver<()>,
}

impl CancelToken {
    /// Whether cancellation has been requested
    pub fn is_cancelled(&self) -> bool {
        self.rx.is_closed()
    }

    /// Resolves once cancellation has been requested
    pub async fn cancelled(&self) {
        // The channel never carries values; recv only returns once it is closed.
        while self.rx.recv().await.is_ok() {}
    }
}

/// Error returned by [`runtime_utils::timeout`] when the deadline passes first
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Elapsed {
    after: std::time::Duration,
}

impl Elapsed {
    /// The deadline that was exceeded
    pub fn duration(&self) -> std::time::Duration {
        self.after
    }
}

impl std::fmt::Display for Elapsed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "operation timed out after {:?}", self.after)
    }
}

impl std::error::Error for Elapsed {}

// Re-export spawner implementations
#[cfg(feature = "tokio")]
pub mod tokio;

#[cfg(feature = "smol")]
pub mod smol;

pub mod runtime_utils;

/// Prelude for common imports
pub mod prelude {
    pub use crate::runtime_utils::{sleep, timeout};
    pub use crate::{
        CancelHandle, CancelToken, Elapsed, JoinHandle, Spawner, cancellation, spawn_joinable,
    };

    #[cfg(feature = "tokio")]
    pub use crate::tokio::TokioSpawner;

    #[cfg(feature = "smol")]
    pub use crate::smol::SmolSpawner;
}

/// Create a spawner for the runtime selected by cargo features
///
/// `smol` wins when several runtime features are enabled at once.
pub fn default_spawner() -> std::sync::Arc<dyn Spawner> {
    #[cfg(feature = "smol")]
    let spawner: std::sync::Arc<dyn Spawner> = std::sync::Arc::new(crate::smol::SmolSpawner);

    #[cfg(all(feature = "tokio", not(feature = "smol")))]
    let spawner: std::sync::Arc<dyn Spawner> = std::sync::Arc::new(crate::tokio::TokioSpawner);

    #[cfg(not(any(feature = "smol", feature = "tokio")))]
    compile_error!("One of the runtime features must be enabled: smol or tokio");

    spawner
}
