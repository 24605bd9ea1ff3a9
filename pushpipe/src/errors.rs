//! Error types for the pushpipe engine.
//!
//! Failures travelling through a pipeline are shared values: the same
//! [`Failure`] that a stage raises is delivered to every reachable downstream
//! stage before it unwinds back to the driving call, so it must be cheap to
//! clone and comparable to the error the stage body originally produced.

use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Result type for stage operations.
pub type PipeResult = Result<(), PipeError>;

/// A domain failure raised by a stage body.
///
/// Wraps the body's error behind a shared reference so the one failure value
/// can be fanned out to many stages and still be downcast to the original
/// error type by the caller that ultimately observes it.
#[derive(Debug, Clone)]
pub struct Failure(Arc<anyhow::Error>);

impl Failure {
    /// Wraps an error as a pipeline failure.
    #[must_use]
    pub fn new(err: impl Into<anyhow::Error>) -> Self {
        Self(Arc::new(err.into()))
    }

    /// Creates a failure from a plain message.
    #[must_use]
    pub fn msg<M>(message: M) -> Self
    where
        M: fmt::Display + fmt::Debug + Send + Sync + 'static,
    {
        Self(Arc::new(anyhow::Error::msg(message)))
    }

    /// Recovers a failure from a consumer error, preserving identity when the
    /// consumer merely forwarded a failure it was handed.
    #[must_use]
    pub fn from_consumer(err: anyhow::Error) -> Self {
        match err.downcast::<Self>() {
            Ok(failure) => failure,
            Err(other) => Self::new(other),
        }
    }

    /// The underlying error.
    #[must_use]
    pub fn inner(&self) -> &anyhow::Error {
        &self.0
    }

    /// Attempts to downcast the underlying error to a concrete type.
    #[must_use]
    pub fn downcast_ref<E>(&self) -> Option<&E>
    where
        E: fmt::Display + fmt::Debug + Send + Sync + 'static,
    {
        self.0.downcast_ref::<E>()
    }

    /// Returns true when two failures originate from the same raise.
    #[must_use]
    pub fn same_origin(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for Failure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        let err: &anyhow::Error = &self.0;
        let source: &(dyn std::error::Error + 'static) = err.as_ref();
        Some(source)
    }
}

/// The error type for pipeline operations.
#[derive(Debug, Clone, Error)]
pub enum PipeError {
    /// A domain failure raised by a stage body, re-raised to the caller after
    /// every reachable downstream stage has been notified.
    #[error(transparent)]
    Failure(#[from] Failure),

    /// The stage has already finished or been closed and can no longer
    /// receive values or failures.
    #[error("stage has terminated")]
    Terminated,

    /// A graph node was resolved a second time with another external target,
    /// or was consumed by a failed construction.
    #[error("graph node is already resolved")]
    AlreadyResolved,

    /// A stage was re-entered from within its own call stack.
    #[error("stage invoked from within its own call stack")]
    Cycle,

    /// A bridged consumer suspended on something other than its pipeline
    /// handles, leaving the bridge unable to resume it.
    #[error("bridged consumer is suspended on a foreign future")]
    Stalled,
}

impl PipeError {
    /// Wraps an error as a domain failure.
    #[must_use]
    pub fn failure(err: impl Into<anyhow::Error>) -> Self {
        Self::Failure(Failure::new(err))
    }

    /// The carried failure, if this error is a domain failure.
    #[must_use]
    pub fn as_failure(&self) -> Option<&Failure> {
        match self {
            Self::Failure(failure) => Some(failure),
            _ => None,
        }
    }

    /// Consumes the error, returning the carried failure if present.
    #[must_use]
    pub fn into_failure(self) -> Option<Failure> {
        match self {
            Self::Failure(failure) => Some(failure),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, thiserror::Error)]
    #[error("boom")]
    struct TestError;

    #[test]
    fn test_failure_downcast() {
        let failure = Failure::new(TestError);
        assert!(failure.downcast_ref::<TestError>().is_some());
        assert_eq!(failure.to_string(), "boom");
    }

    #[test]
    fn test_failure_clone_shares_origin() {
        let failure = Failure::msg("shared");
        let copy = failure.clone();
        assert!(failure.same_origin(&copy));
        assert!(!failure.same_origin(&Failure::msg("shared")));
    }

    #[test]
    fn test_from_consumer_preserves_identity() {
        let original = Failure::new(TestError);
        let forwarded: anyhow::Error = original.clone().into();
        let recovered = Failure::from_consumer(forwarded);
        assert!(recovered.same_origin(&original));
    }

    #[test]
    fn test_from_consumer_wraps_fresh_errors() {
        let recovered = Failure::from_consumer(anyhow::anyhow!("fresh"));
        assert_eq!(recovered.to_string(), "fresh");
    }

    #[test]
    fn test_pipe_error_accessors() {
        let err = PipeError::failure(TestError);
        assert!(err.as_failure().is_some());
        assert!(PipeError::Terminated.as_failure().is_none());
        assert!(err.into_failure().is_some());
    }
}
