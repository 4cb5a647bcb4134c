//! Panic isolation for feature code.
//!
//! A panicking feature `init`, command or interaction callback is captured,
//! logged and converted to an error so one faulty feature cannot take the host
//! down.

use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};

use crate::types::{Error, Result};

/// Run `operation`, converting a panic into [`Error::Internal`].
pub fn with_recovery<F, T>(operation: F, operation_name: &str) -> Result<T>
where
    F: FnOnce() -> Result<T>,
{
    match catch_unwind(AssertUnwindSafe(operation)) {
        Ok(result) => result,
        Err(payload) => Err(recovered(&payload, operation_name)),
    }
}

/// Await `future`, converting a panic raised while polling it into
/// [`Error::Internal`].
pub async fn with_recovery_async<Fut, T>(future: Fut, operation_name: &str) -> Result<T>
where
    Fut: Future<Output = Result<T>>,
{
    match AssertUnwindSafe(future).catch_unwind().await {
        Ok(result) => result,
        Err(payload) => Err(recovered(&payload, operation_name)),
    }
}

fn recovered(payload: &Box<dyn Any + Send>, operation_name: &str) -> Error {
    let panic_msg = panic_message(payload);
    tracing::error!(
        "panic_recovered: operation={}, panic={}",
        operation_name,
        panic_msg
    );
    Error::internal(format!("panic in {}: {}", operation_name, panic_msg))
}

/// Extract the message from a panic payload.
pub fn panic_message(payload: &Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic (no message)".to_string()
    }
}
