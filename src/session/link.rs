// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::time::Duration;

use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use crate::diag::{EngineError, EngineResult};

/// Race an I/O future against the session deadline and the cancel token.
///
/// Cancellation wins over completion so a cancelled session stops at the
/// next suspension point, which is exactly the observability the
/// concurrency model promises.
pub async fn io_with_timeout<F, T>(
    label: &'static str,
    fut: F,
    io_timeout: Duration,
    cancel: &CancellationToken,
) -> EngineResult<T>
where
    F: Future<Output = std::io::Result<T>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(EngineError::Cancelled),
        res = timeout(io_timeout, fut) => {
            match res {
                Ok(Ok(v)) => Ok(v),
                Ok(Err(e)) => Err(EngineError::TransportError(e)),
                Err(_) => Err(EngineError::Timeout { label }),
            }
        }
    }
}
