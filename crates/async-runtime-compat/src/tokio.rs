//! Tokio runtime spawner implementation

use crate::Spawner;
use std::future::Future;
use std::pin::Pin;

/// Spawner for the Tokio runtime
#[derive(Debug, Clone, Copy)]
pub struct TokioSpawner;

impl Spawner for TokioSpawner {
    fn spawn(&self, future: Pin<Box<dyn Future<Output = ()> + Send + 'static>>) {
        // The JoinHandle detaches when dropped
        tokio::spawn(future);
    }
}
