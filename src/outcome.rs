//! The result carrier handed back to awaiting callers.

use crate::error::Failure;

/// Outcome of one work item: the produced value or the captured failure.
///
/// Exactly one side is populated, so `is_success()` is true iff a value is
/// present.
#[derive(Debug)]
pub enum WorkerResult<T> {
    Success(T),
    Error(Failure),
}

impl<T> WorkerResult<T> {
    pub fn success(value: T) -> Self {
        Self::Success(value)
    }

    pub fn error(failure: Failure) -> Self {
        Self::Error(failure)
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// The produced value. `None` on failure.
    pub fn value(&self) -> Option<&T> {
        match self {
            Self::Success(v) => Some(v),
            Self::Error(_) => None,
        }
    }

    /// The captured failure. `None` on success.
    pub fn failure(&self) -> Option<&Failure> {
        match self {
            Self::Success(_) => None,
            Self::Error(f) => Some(f),
        }
    }

    pub fn into_value(self) -> Option<T> {
        match self {
            Self::Success(v) => Some(v),
            Self::Error(_) => None,
        }
    }

    pub fn into_result(self) -> Result<T, Failure> {
        self.into()
    }
}

impl<T> From<WorkerResult<T>> for Result<T, Failure> {
    fn from(outcome: WorkerResult<T>) -> Self {
        match outcome {
            WorkerResult::Success(v) => Ok(v),
            WorkerResult::Error(f) => Err(f),
        }
    }
}
