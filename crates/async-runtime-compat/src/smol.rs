//! Smol runtime spawner implementation

use crate::Spawner;
use std::future::Future;
use std::pin::Pin;

/// Spawner for the Smol runtime
#[derive(Debug, Clone, Copy)]
pub struct SmolSpawner;

impl Spawner for SmolSpawner {
    fn spawn(&self, future: Pin<Box<dyn Future<Output = ()> + Send + 'static>>) {
        smol::spawn(future).detach();
    }
}
