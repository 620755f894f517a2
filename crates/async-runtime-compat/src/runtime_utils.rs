//! Runtime-agnostic utility functions
//!
//! This module provides utility functions that abstract over different async runtimes
//! to avoid repetitive cfg-flag patterns throughout the codebase.

use crate::Elapsed;
use futures::future::{Either, select};
use std::future::Future;
use std::time::Duration;

/// Sleep for the specified duration using the current runtime
///
/// This function automatically selects the appropriate sleep implementation
/// based on the enabled runtime feature. `smol` wins when both are enabled.
pub async fn sleep(duration: Duration) {
    #[cfg(feature = "smol")]
    smol::Timer::after(duration).await;

    #[cfg(all(feature = "tokio", not(feature = "smol")))]
    tokio::time::sleep(duration).await;

    #[cfg(not(any(feature = "smol", feature = "tokio")))]
    compile_error!("One of the runtime features must be enabled: smol or tokio");
}

/// Run a future with a deadline
///
/// The future is dropped if the deadline passes first.
pub async fn timeout<F: Future>(duration: Duration, future: F) -> Result<F::Output, Elapsed> {
    let future = std::pin::pin!(future);
    let timer = std::pin::pin!(sleep(duration));

    match select(future, timer).await {
        Either::Left((output, _)) => Ok(output),
        Either::Right(((), _)) => Err(Elapsed { after: duration }),
    }
}
