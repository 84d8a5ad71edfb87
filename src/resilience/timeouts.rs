//! Caller-level deadlines.
//!
//! # Responsibilities
//! - Race a call against an optional deadline
//! - Map expiry to `TransportError::Timeout`
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities
//! - Expiry drops the call future, which abandons any Pending Call it holds

use std::future::Future;
use std::time::Duration;

use crate::transport::types::{TransportError, TransportResult};

/// Await `call`, failing with `Timeout` if `limit` elapses first.
pub async fn with_deadline<T, Fut>(limit: Option<Duration>, call: Fut) -> TransportResult<T>
where
    Fut: Future<Output = TransportResult<T>>,
{
    match limit {
        Some(limit) => match tokio::time::timeout(limit, call).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout(limit)),
        },
        None => call.await,
    }
}
