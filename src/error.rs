use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// An error the test author wants a scripted call to fail with.
///
/// Cloning shares the same allocation, so the error a caller receives is the
/// exact value that was declared (see [`InjectedError::ptr_eq`]).
#[derive(Clone)]
pub struct InjectedError(Arc<dyn std::error::Error + Send + Sync + 'static>);

impl InjectedError {
    pub fn new<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self(Arc::new(err))
    }

    /// Plain message error, for tests that only care about the text.
    pub fn msg(message: impl Into<String>) -> Self {
        Self(Arc::new(MessageError(message.into())))
    }

    pub fn ptr_eq(&self, other: &InjectedError) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub fn downcast_ref<E: std::error::Error + 'static>(&self) -> Option<&E> {
        self.0.downcast_ref::<E>()
    }

    pub fn inner(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
        self.0.as_ref()
    }
}

impl fmt::Debug for InjectedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.0, f)
    }
}

impl fmt::Display for InjectedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl std::error::Error for InjectedError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.0.source()
    }
}

impl From<std::io::Error> for InjectedError {
    fn from(value: std::io::Error) -> Self {
        Self::new(value)
    }
}

#[derive(Debug)]
struct MessageError(String);

impl fmt::Display for MessageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for MessageError {}

/// A comparison between a declared argument and a call argument could not be
/// carried out because the two representations are incompatible.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot compare {expected} with {actual}: {reason}")]
pub struct ConversionError {
    pub expected: &'static str,
    pub actual: &'static str,
    pub reason: String,
}

fn drained_prefix(all_fulfilled: &bool) -> &'static str {
    if *all_fulfilled {
        "all expectations were already fulfilled, "
    } else {
        ""
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockErrorCode {
    UnexpectedCall,
    NotExpected,
    QueryMismatch,
    ArgumentMismatch,
    ArgumentConversion,
    MissingOutcome,
    Injected,
    UnfulfilledExpectation,
    StatementNotClosed,
    InvalidPattern,
    UnknownDsn,
    ResultUnavailable,
    Fixture,
}

impl MockErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            MockErrorCode::UnexpectedCall => "unexpected_call",
            MockErrorCode::NotExpected => "not_expected",
            MockErrorCode::QueryMismatch => "query_mismatch",
            MockErrorCode::ArgumentMismatch => "argument_mismatch",
            MockErrorCode::ArgumentConversion => "argument_conversion",
            MockErrorCode::MissingOutcome => "missing_outcome",
            MockErrorCode::Injected => "injected",
            MockErrorCode::UnfulfilledExpectation => "unfulfilled_expectation",
            MockErrorCode::StatementNotClosed => "statement_not_closed",
            MockErrorCode::InvalidPattern => "invalid_pattern",
            MockErrorCode::UnknownDsn => "unknown_dsn",
            MockErrorCode::ResultUnavailable => "result_unavailable",
            MockErrorCode::Fixture => "fixture",
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum MockError {
    #[error("call to {call} was not expected, next expectation is: {next}")]
    UnexpectedCall { call: String, next: String },
    #[error("{}call to {call} was not expected", drained_prefix(.all_fulfilled))]
    NotExpected { call: String, all_fulfilled: bool },
    #[error("{call}: query '{query}' does not match pattern '{pattern}'")]
    QueryMismatch {
        call: &'static str,
        query: String,
        pattern: String,
    },
    #[error("{call}: query '{query}', args {args} do not match expected {expected}")]
    ArgumentMismatch {
        call: &'static str,
        query: String,
        args: String,
        expected: String,
    },
    #[error(
        "{call}: query '{query}', args {args} failed to match with error \"{source}\", expectation: {expectation}"
    )]
    ArgumentConversion {
        call: &'static str,
        query: String,
        args: String,
        expectation: String,
        #[source]
        source: ConversionError,
    },
    #[error(
        "{call}: query '{query}' with args {args} must return a {missing}, but it was not set for expectation: {expectation}"
    )]
    MissingOutcome {
        call: &'static str,
        query: String,
        args: String,
        missing: &'static str,
        expectation: String,
    },
    #[error(transparent)]
    Injected(InjectedError),
    #[error("there is a remaining expectation which was not matched: {expectation}")]
    UnfulfilledExpectation { expectation: String },
    #[error("prepared statement was expected to be closed but never was: {expectation}")]
    StatementNotClosed { expectation: String },
    #[error("invalid query pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },
    #[error("no mock session registered for dsn '{dsn}'")]
    UnknownDsn { dsn: String },
    #[error("exec result has no {field}: {source}")]
    ResultUnavailable {
        field: &'static str,
        #[source]
        source: InjectedError,
    },
    #[error("fixture error: {0}")]
    Fixture(String),
}

impl MockError {
    pub fn code(&self) -> MockErrorCode {
        match self {
            MockError::UnexpectedCall { .. } => MockErrorCode::UnexpectedCall,
            MockError::NotExpected { .. } => MockErrorCode::NotExpected,
            MockError::QueryMismatch { .. } => MockErrorCode::QueryMismatch,
            MockError::ArgumentMismatch { .. } => MockErrorCode::ArgumentMismatch,
            MockError::ArgumentConversion { .. } => MockErrorCode::ArgumentConversion,
            MockError::MissingOutcome { .. } => MockErrorCode::MissingOutcome,
            MockError::Injected(_) => MockErrorCode::Injected,
            MockError::UnfulfilledExpectation { .. } => MockErrorCode::UnfulfilledExpectation,
            MockError::StatementNotClosed { .. } => MockErrorCode::StatementNotClosed,
            MockError::InvalidPattern { .. } => MockErrorCode::InvalidPattern,
            MockError::UnknownDsn { .. } => MockErrorCode::UnknownDsn,
            MockError::ResultUnavailable { .. } => MockErrorCode::ResultUnavailable,
            MockError::Fixture(_) => MockErrorCode::Fixture,
        }
    }

    pub fn code_str(&self) -> &'static str {
        self.code().as_str()
    }

    /// The declared error, if this is the scripted failure path.
    pub fn injected(&self) -> Option<&InjectedError> {
        match self {
            MockError::Injected(err) => Some(err),
            _ => None,
        }
    }
}

impl From<InjectedError> for MockError {
    fn from(value: InjectedError) -> Self {
        MockError::Injected(value)
    }
}
