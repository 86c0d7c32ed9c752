pub mod argument;
pub mod builder;
pub mod queue;

pub use argument::{Argument, ArgumentMatcher, compare_values, format_arguments};
pub use builder::{
    ExpectedBegin, ExpectedClose, ExpectedCommit, ExpectedExec, ExpectedPrepare, ExpectedQuery,
    ExpectedRollback,
};
pub use queue::ExpectationQueue;

use crate::error::{ConversionError, InjectedError, MockError};
use crate::outcome::{ExecResult, Rows};
use crate::types::{Value, format_values};
use argument::match_arguments;
use parking_lot::Mutex;
use regex::Regex;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExpectationKind {
    Close,
    Begin,
    Commit,
    Rollback,
    Prepare,
    Exec,
    Query,
}

impl ExpectationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ExpectationKind::Close => "Close",
            ExpectationKind::Begin => "Begin",
            ExpectationKind::Commit => "Commit",
            ExpectationKind::Rollback => "Rollback",
            ExpectationKind::Prepare => "Prepare",
            ExpectationKind::Exec => "Exec",
            ExpectationKind::Query => "Query",
        }
    }
}

impl fmt::Display for ExpectationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Compiled pattern over normalized query text.
#[derive(Debug, Clone)]
pub struct QueryPattern {
    regex: Regex,
}

impl QueryPattern {
    pub fn new(pattern: &str) -> Result<Self, MockError> {
        let regex = Regex::new(pattern).map_err(|e| MockError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self { regex })
    }

    pub fn as_str(&self) -> &str {
        self.regex.as_str()
    }

    pub fn is_match(&self, query: &str) -> bool {
        self.regex.is_match(query)
    }
}

/// One incoming operation, as seen by the matcher.
#[derive(Debug, Clone, Copy)]
pub struct Call<'a> {
    pub kind: ExpectationKind,
    pub query: &'a str,
    pub args: &'a [Value],
}

impl<'a> Call<'a> {
    pub fn bare(kind: ExpectationKind) -> Self {
        Self {
            kind,
            query: "",
            args: &[],
        }
    }

    pub fn with_query(kind: ExpectationKind, query: &'a str, args: &'a [Value]) -> Self {
        Self { kind, query, args }
    }

    /// Short operation name used as the prefix of predicate errors.
    pub fn label(&self) -> &'static str {
        match self.kind {
            ExpectationKind::Close => "close",
            ExpectationKind::Begin => "begin",
            ExpectationKind::Commit => "commit",
            ExpectationKind::Rollback => "rollback",
            ExpectationKind::Prepare => "prepare",
            ExpectationKind::Exec => "exec",
            ExpectationKind::Query => "query",
        }
    }

    pub fn describe(&self) -> String {
        match self.kind {
            ExpectationKind::Close => "database Close".to_string(),
            ExpectationKind::Begin => "database transaction Begin".to_string(),
            ExpectationKind::Commit => "commit transaction".to_string(),
            ExpectationKind::Rollback => "rollback transaction".to_string(),
            ExpectationKind::Prepare => format!("Prepare statement with query '{}'", self.query),
            ExpectationKind::Exec => format!(
                "exec query '{}' with args {}",
                self.query,
                format_values(self.args)
            ),
            ExpectationKind::Query => format!(
                "query '{}' with args {}",
                self.query,
                format_values(self.args)
            ),
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) enum Payload {
    Close,
    Begin,
    Commit,
    Rollback,
    Prepare {
        pattern: QueryPattern,
        close_error: Option<InjectedError>,
        must_be_closed: bool,
        closed: bool,
    },
    Exec {
        pattern: QueryPattern,
        args: Option<Vec<Argument>>,
        result: Option<ExecResult>,
    },
    Query {
        pattern: QueryPattern,
        args: Option<Vec<Argument>>,
        rows: Option<Rows>,
    },
}

impl Payload {
    fn kind(&self) -> ExpectationKind {
        match self {
            Payload::Close => ExpectationKind::Close,
            Payload::Begin => ExpectationKind::Begin,
            Payload::Commit => ExpectationKind::Commit,
            Payload::Rollback => ExpectationKind::Rollback,
            Payload::Prepare { .. } => ExpectationKind::Prepare,
            Payload::Exec { .. } => ExpectationKind::Exec,
            Payload::Query { .. } => ExpectationKind::Query,
        }
    }

    fn pattern(&self) -> Option<&QueryPattern> {
        match self {
            Payload::Prepare { pattern, .. }
            | Payload::Exec { pattern, .. }
            | Payload::Query { pattern, .. } => Some(pattern),
            _ => None,
        }
    }

    fn args(&self) -> Option<&[Argument]> {
        match self {
            Payload::Exec { args, .. } | Payload::Query { args, .. } => args.as_deref(),
            _ => None,
        }
    }
}

#[derive(Debug)]
pub(crate) struct ExpectationState {
    pub(crate) triggered: bool,
    pub(crate) error: Option<InjectedError>,
    pub(crate) payload: Payload,
}

/// What a claimed record hands back to the dispatcher.
#[derive(Debug, Clone, Default)]
pub struct Outcome {
    pub error: Option<InjectedError>,
    pub result: Option<ExecResult>,
    pub rows: Option<Rows>,
    pub close_error: Option<InjectedError>,
}

/// Why a candidate of the right kind refused a call.
#[derive(Debug, Clone)]
pub(crate) enum Rejection {
    Query { pattern: String },
    Arguments { expected: String },
    Conversion(ConversionError),
}

#[derive(Debug)]
pub(crate) enum Attempt {
    AlreadyFulfilled,
    WrongKind,
    Rejected(Rejection),
    Claimed(Outcome),
}

/// A single scripted operation.
///
/// `kind` never changes after declaration. Everything else sits behind the
/// record's own lock: a claim checks `triggered`, evaluates the predicate and
/// flips `triggered` inside one critical section, so two racing calls can
/// never both win the same record.
#[derive(Debug)]
pub struct Expectation {
    kind: ExpectationKind,
    state: Mutex<ExpectationState>,
}

impl Expectation {
    pub(crate) fn new(payload: Payload) -> Self {
        Self {
            kind: payload.kind(),
            state: Mutex::new(ExpectationState {
                triggered: false,
                error: None,
                payload,
            }),
        }
    }

    pub fn kind(&self) -> ExpectationKind {
        self.kind
    }

    pub fn fulfilled(&self) -> bool {
        self.state.lock().triggered
    }

    /// Set-up time mutation used by the declaration builders.
    pub(crate) fn configure(&self, f: impl FnOnce(&mut ExpectationState)) {
        let mut state = self.state.lock();
        f(&mut state);
    }

    /// Tries to claim this record for `call`. The record is only marked
    /// triggered when kind and predicate both match.
    pub(crate) fn try_claim(&self, call: &Call<'_>) -> Attempt {
        let mut state = self.state.lock();
        if state.triggered {
            return Attempt::AlreadyFulfilled;
        }
        if self.kind != call.kind {
            return Attempt::WrongKind;
        }
        if let Some(pattern) = state.payload.pattern()
            && !pattern.is_match(call.query)
        {
            return Attempt::Rejected(Rejection::Query {
                pattern: pattern.as_str().to_string(),
            });
        }
        let declared = state.payload.args();
        match match_arguments(declared, call.args) {
            Ok(true) => {}
            Ok(false) => {
                return Attempt::Rejected(Rejection::Arguments {
                    expected: declared.map_or_else(|| "<any>".to_string(), format_arguments),
                });
            }
            Err(e) => return Attempt::Rejected(Rejection::Conversion(e)),
        }

        state.triggered = true;
        let mut outcome = Outcome {
            error: state.error.clone(),
            ..Outcome::default()
        };
        match &state.payload {
            Payload::Prepare { close_error, .. } => outcome.close_error = close_error.clone(),
            Payload::Exec { result, .. } => outcome.result = result.clone(),
            Payload::Query { rows, .. } => outcome.rows = rows.clone(),
            Payload::Close | Payload::Begin | Payload::Commit | Payload::Rollback => {}
        }
        Attempt::Claimed(outcome)
    }

    /// Records that the statement produced by this Prepare record was closed.
    pub(crate) fn mark_statement_closed(&self) {
        let mut state = self.state.lock();
        if let Payload::Prepare { closed, .. } = &mut state.payload {
            *closed = true;
        }
    }

    /// A claimed Prepare record declared with `will_be_closed` whose
    /// statement is still open.
    pub(crate) fn awaiting_statement_close(&self) -> bool {
        let state = self.state.lock();
        matches!(
            state.payload,
            Payload::Prepare {
                must_be_closed: true,
                closed: false,
                ..
            }
        )
    }
}

impl fmt::Display for Expectation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        write!(f, "Expected{} => expecting ", self.kind)?;
        match &state.payload {
            Payload::Close => write!(f, "database Close")?,
            Payload::Begin => write!(f, "database transaction Begin")?,
            Payload::Commit => write!(f, "transaction Commit")?,
            Payload::Rollback => write!(f, "transaction Rollback")?,
            Payload::Prepare {
                pattern,
                close_error,
                must_be_closed,
                ..
            } => {
                write!(f, "Prepare statement matching '{}'", pattern.as_str())?;
                if *must_be_closed {
                    write!(f, ", to be closed")?;
                }
                if let Some(err) = close_error {
                    write!(f, ", closing with error '{err}'")?;
                }
            }
            Payload::Exec {
                pattern,
                args,
                result,
            } => {
                write!(f, "Exec matching '{}'", pattern.as_str())?;
                write_args(f, args.as_deref())?;
                match result.as_ref().map(|r| (r.last_insert_id(), r.rows_affected())) {
                    Some((Ok(id), Ok(rows))) => write!(
                        f,
                        ", returning result(last_insert_id={id}, rows_affected={rows})"
                    )?,
                    Some(_) => write!(f, ", returning an error result")?,
                    None => {}
                }
            }
            Payload::Query {
                pattern,
                args,
                rows,
            } => {
                write!(f, "Query matching '{}'", pattern.as_str())?;
                write_args(f, args.as_deref())?;
                if let Some(rows) = rows {
                    write!(
                        f,
                        ", returning {} row(s) of {:?}",
                        rows.rows().len(),
                        rows.columns()
                    )?;
                }
            }
        }
        if let Some(err) = &state.error {
            write!(f, ", failing with error '{err}'")?;
        }
        if state.triggered {
            write!(f, " (fulfilled)")?;
        }
        Ok(())
    }
}

fn write_args(f: &mut fmt::Formatter<'_>, args: Option<&[Argument]>) -> fmt::Result {
    match args {
        Some([]) => write!(f, " without arguments"),
        Some(args) => write!(f, " with args {}", format_arguments(args)),
        None => Ok(()),
    }
}
