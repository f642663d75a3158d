//! Circuit-breaker guard around backend calls, plus event publishing

use crate::errors::{Error, RecoveryHint, Result};
use std::future::Future;
use std::time::{Duration, Instant};
use warden_utils::{CancellationToken, CircuitError};

use super::events::{OperationEvent, OperationKind};
use super::types::{CacheInner, CallContext};

impl CacheInner {
    /// Run one backend call through the breaker, honouring the deadline and
    /// cancellation of `ctx`
    pub(crate) async fn guarded<T, F, Fut>(&self, ctx: &CallContext, operation: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let deadline = ctx.deadline.or(self.config.operation_timeout);
        let cancel = ctx.cancel.as_ref();

        let Some(breaker) = &self.breaker else {
            return unguarded(deadline, cancel, operation()).await;
        };

        breaker
            .call_with(deadline, cancel, operation)
            .await
            .map_err(|e| match e {
                CircuitError::Open { retry_after } => Error::CircuitOpen {
                    breaker: breaker.name().to_string(),
                    retry_after,
                    recovery_hint: RecoveryHint::BypassCache,
                },
                other => other.into(),
            })
    }

    /// Fire-and-forget operation event
    pub(crate) fn emit(
        &self,
        operation: OperationKind,
        key: Option<&str>,
        started: Instant,
        error: Option<&Error>,
    ) {
        let event = OperationEvent {
            operation,
            key: key.map(str::to_string),
            success: error.is_none(),
            duration: started.elapsed(),
            error: error.map(ToString::to_string),
        };
        if self.events.send(event).is_err() {
            tracing::trace!(%operation, "No operation event subscribers");
        }
    }
}

async fn unguarded<T>(
    deadline: Option<Duration>,
    cancel: Option<&CancellationToken>,
    operation: impl Future<Output = Result<T>>,
) -> Result<T> {
    let cancelled = || Error::Cancelled {
        operation: "storage",
        recovery_hint: RecoveryHint::Ignore,
    };
    if cancel.is_some_and(CancellationToken::is_cancelled) {
        return Err(cancelled());
    }

    let bounded = async {
        match deadline {
            Some(limit) => tokio::time::timeout(limit, operation)
                .await
                .map_err(|_| Error::Timeout {
                    operation: "storage",
                    duration: limit,
                    recovery_hint: RecoveryHint::Retry { after: limit },
                })?,
            None => operation.await,
        }
    };

    match cancel {
        Some(token) => tokio::select! {
            result = bounded => result,
            _ = token.cancelled() => Err(cancelled()),
        },
        None => bounded.await,
    }
}
