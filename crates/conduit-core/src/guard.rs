//! Isolated invocation of foreign code.
//!
//! Every lifecycle hook, middleware call and event handler goes through
//! [`guarded`].  A deadline expiry or a panic is turned into a [`HookError`]
//! just like an ordinary error return, so callers only ever deal with one
//! failure shape.

use std::any::Any;
use std::future::Future;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::time::Duration;

use futures::FutureExt;

use crate::error::{BoxError, HookError};

/// Awaits `fut`, enforcing an optional deadline and capturing panics.
pub async fn guarded<F, T>(deadline: Option<Duration>, fut: F) -> Result<T, HookError>
where
    F: Future<Output = Result<T, BoxError>>,
{
    let caught = AssertUnwindSafe(fut).catch_unwind();
    let outcome = match deadline {
        Some(limit) => match tokio::time::timeout(limit, caught).await {
            Ok(outcome) => outcome,
            Err(_) => return Err(HookError::TimedOut(limit)),
        },
        None => caught.await,
    };

    match outcome {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(HookError::Failed(e)),
        Err(payload) => Err(HookError::Panicked(panic_message(payload.as_ref()))),
    }
}

/// Runs a synchronous call, capturing panics.
pub fn guarded_sync<T>(f: impl FnOnce() -> T) -> Result<T, HookError> {
    catch_unwind(AssertUnwindSafe(f))
        .map_err(|payload| HookError::Panicked(panic_message(payload.as_ref())))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
