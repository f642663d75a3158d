//! Circuit breaker state management and execution logic.

use super::config::CircuitBreakerConfig;
use super::metrics::MetricsState;
use super::transitions::StateTransitions;
use super::types::{CircuitBreakerStats, CircuitError, CircuitState};
use crate::resilience::cancel::CancellationToken;
use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

/// Circuit breaker implementation
pub struct CircuitBreaker {
    name: Arc<str>,
    config: CircuitBreakerConfig,
    metrics: Arc<MetricsState>,
    transitions: StateTransitions,
}

enum Outcome<T, E> {
    Completed(Result<T, E>),
    Panicked(String),
    TimedOut(Duration),
    Cancelled,
}

impl CircuitBreaker {
    /// Create a new circuit breaker with the given configuration
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self::with_name("default", config)
    }

    /// Create a named circuit breaker; the name shows up in logs
    pub fn with_name(name: impl Into<Arc<str>>, config: CircuitBreakerConfig) -> Self {
        let name = name.into();
        let metrics = Arc::new(MetricsState::new());
        let transitions =
            StateTransitions::new(Arc::clone(&name), config.clone(), Arc::clone(&metrics));

        Self {
            name,
            config,
            metrics,
            transitions,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Get the current state of the circuit.
    ///
    /// This never transitions: an open circuit whose timeout has elapsed
    /// reports `Open` until the next call probes it.
    pub fn state(&self) -> CircuitState {
        self.metrics.core.lock().state
    }

    /// Execute an operation through the circuit breaker
    pub async fn call<F, Fut, T, E>(&self, operation: F) -> Result<T, CircuitError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.call_with(None, None, operation).await
    }

    /// Execute an operation with an optional deadline and cancellation token.
    ///
    /// Deadline expiry, cancellation and panics all count as failures.
    pub async fn call_with<F, Fut, T, E>(
        &self,
        deadline: Option<Duration>,
        cancel: Option<&CancellationToken>,
        operation: F,
    ) -> Result<T, CircuitError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.metrics.record_request();

        let generation = match self.transitions.admit() {
            Ok(generation) => generation,
            Err(retry_after) => {
                self.metrics.record_rejection();
                return Err(CircuitError::Open { retry_after });
            }
        };

        if cancel.map(|c| c.is_cancelled()).unwrap_or(false) {
            self.transitions.record_failure(generation);
            return Err(CircuitError::Cancelled);
        }

        let outcome = Self::run(deadline, cancel, operation).await;

        match outcome {
            Outcome::Completed(Ok(value)) => {
                self.transitions.record_success(generation);
                Ok(value)
            }
            Outcome::Completed(Err(e)) => {
                self.transitions.record_failure(generation);
                Err(CircuitError::Inner(e))
            }
            Outcome::Panicked(message) => {
                tracing::warn!(breaker = %self.name, %message, "Guarded operation panicked");
                self.transitions.record_failure(generation);
                Err(CircuitError::Panicked { message })
            }
            Outcome::TimedOut(after) => {
                self.transitions.record_failure(generation);
                Err(CircuitError::Timeout { after })
            }
            Outcome::Cancelled => {
                self.transitions.record_failure(generation);
                Err(CircuitError::Cancelled)
            }
        }
    }

    async fn run<F, Fut, T, E>(
        deadline: Option<Duration>,
        cancel: Option<&CancellationToken>,
        operation: F,
    ) -> Outcome<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        // Panics while building the future are failures too
        let future = match std::panic::catch_unwind(AssertUnwindSafe(operation)) {
            Ok(future) => future,
            Err(payload) => return Outcome::Panicked(panic_message(payload)),
        };
        let guarded = AssertUnwindSafe(future).catch_unwind();

        let timer = async {
            match deadline {
                Some(after) => tokio::time::sleep(after).await,
                None => std::future::pending::<()>().await,
            }
        };
        let cancelled = async {
            match cancel {
                Some(token) => token.cancelled().await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            result = guarded => match result {
                Ok(result) => Outcome::Completed(result),
                Err(payload) => Outcome::Panicked(panic_message(payload)),
            },
            _ = timer => Outcome::TimedOut(deadline.unwrap_or_default()),
            _ = cancelled => Outcome::Cancelled,
        }
    }

    /// Force the circuit closed
    pub fn reset(&self) {
        self.transitions.reset();
    }

    /// Get current circuit breaker statistics
    pub fn stats(&self) -> CircuitBreakerStats {
        self.metrics.stats()
    }
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("state", &self.state())
            .field("config", &self.config)
            .finish()
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
