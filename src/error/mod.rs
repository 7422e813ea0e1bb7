//! Error types.

use std::error::Error;
use std::fmt::{Debug, Display, Formatter};
use std::time::Duration;

use backtrace::Backtrace;

/// Errors returned by the optimizer.
#[derive(Debug)]
pub enum OptimizerError {
    /// A query or one of its parts is malformed. For example a scalar subquery returns several columns.
    Argument(ArgumentError),
    /// An internal invariant of the optimizer has been violated.
    Internal(InternalError),
    /// No plan can be built for a query. For example every join algorithm applicable to a join has been disabled.
    Unsupported(String),
    /// The optimization has not been completed within the configured time limit.
    Timeout(Duration),
}

impl OptimizerError {
    /// Creates an [argument error](OptimizerError::Argument).
    pub fn argument<T>(message: T) -> OptimizerError
    where
        T: Into<String>,
    {
        OptimizerError::Argument(ArgumentError::new(message))
    }

    /// Creates an [internal error](OptimizerError::Internal) without a cause.
    pub fn internal<T>(message: T) -> OptimizerError
    where
        T: Into<String>,
    {
        OptimizerError::Internal(InternalError::new(message, None))
    }

    /// Creates an [unsupported error](OptimizerError::Unsupported).
    pub fn unsupported<T>(message: T) -> OptimizerError
    where
        T: Into<String>,
    {
        OptimizerError::Unsupported(message.into())
    }

    /// Returns `true` if this error is caused by the time limit.
    pub fn is_timeout(&self) -> bool {
        matches!(self, OptimizerError::Timeout(_))
    }
}

impl Display for OptimizerError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            OptimizerError::Argument(err) => write!(f, "Invalid query: {}", err),
            OptimizerError::Internal(err) => write!(f, "Internal error: {}", err),
            OptimizerError::Unsupported(msg) => write!(f, "No plan: {}", msg),
            OptimizerError::Timeout(limit) => write!(f, "Optimization time limit exceeded: {:?}", limit),
        }
    }
}

impl Error for OptimizerError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            OptimizerError::Internal(InternalError { cause: Some(cause), .. }) => Some(cause.as_ref()),
            _ => None,
        }
    }
}

impl From<ArgumentError> for OptimizerError {
    fn from(err: ArgumentError) -> Self {
        OptimizerError::Argument(err)
    }
}

impl From<InternalError> for OptimizerError {
    fn from(err: InternalError) -> Self {
        OptimizerError::Internal(err)
    }
}

/// See [OptimizerError::Argument].
pub struct ArgumentError {
    message: String,
    backtrace: Backtrace,
}

impl ArgumentError {
    /// Creates an argument error. Captures a backtrace.
    pub fn new<T>(message: T) -> Self
    where
        T: Into<String>,
    {
        ArgumentError {
            message: message.into(),
            backtrace: Backtrace::new(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl Display for ArgumentError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl Debug for ArgumentError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}\n{:?}", self.message, self.backtrace)
    }
}

/// See [OptimizerError::Internal].
pub struct InternalError {
    message: String,
    cause: Option<Box<OptimizerError>>,
    backtrace: Backtrace,
}

impl InternalError {
    /// Creates an internal error with an optional cause. Captures a backtrace.
    pub fn new<T>(message: T, cause: Option<OptimizerError>) -> Self
    where
        T: Into<String>,
    {
        InternalError {
            message: message.into(),
            cause: cause.map(Box::new),
            backtrace: Backtrace::new(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl Display for InternalError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(cause) = self.cause.as_ref() {
            write!(f, " caused by: {}", cause)?;
        }
        Ok(())
    }
}

impl Debug for InternalError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self)?;
        if let Some(cause) = self.cause.as_ref() {
            write!(f, "\ncause: {:?}", cause)?;
        }
        write!(f, "\n{:?}", self.backtrace)
    }
}
