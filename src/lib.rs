//! Scripted stand-in for a database connection.
//!
//! Test code declares, in order, the operations it expects the code under
//! test to perform (`expect_begin`, `expect_exec`, ...), each with a canned
//! outcome. The code under test then talks to a [`Connection`] exactly as it
//! would to a real one, and every call is answered by the expectation it
//! matches. [`MockSession::expectations_were_met`] finally checks that the
//! whole script was consumed.
//!
//! ```no_run
//! use sqlmock::{ExecResult, MockConfig, MockDriver, Value};
//!
//! let driver = MockDriver::new();
//! let (conn, mock) = driver.open_new(MockConfig::default());
//! mock.expect_begin();
//! mock.expect_exec("INSERT INTO users")
//!     .expect("pattern")
//!     .with_values([Value::Integer(1), Value::from("bob")])
//!     .will_return_result(ExecResult::new(1, 1));
//! mock.expect_commit();
//!
//! let tx = conn.begin().expect("begin");
//! conn.exec("INSERT INTO users (id, name) VALUES (?, ?)", &[1i64.into(), "bob".into()])
//!     .expect("exec");
//! tx.commit().expect("commit");
//! mock.expectations_were_met().expect("script drained");
//! ```

pub mod config;
pub mod dispatch;
pub mod driver;
pub mod error;
pub mod expectation;
mod lib_helpers;
pub mod outcome;
pub mod types;

pub use crate::config::MockConfig;
pub use crate::driver::{Connection, MockDriver, Statement, Transaction};
pub use crate::error::{ConversionError, InjectedError, MockError, MockErrorCode};
pub use crate::expectation::{
    Argument, ArgumentMatcher, ExpectationKind, ExpectedBegin, ExpectedClose, ExpectedCommit,
    ExpectedExec, ExpectedPrepare, ExpectedQuery, ExpectedRollback,
};
pub use crate::lib_helpers::normalize_query;
pub use crate::outcome::{ExecResult, Rows};
pub use crate::types::{Row, Value};

use crate::dispatch::{DispatchMode, dispatch};
use crate::expectation::{Call, ExpectationQueue, Payload, QueryPattern};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// One simulated connection: the expectation script plus its matching modes.
///
/// Declare expectations from a single thread, then dispatch from as many
/// threads as needed, then verify.
#[derive(Debug)]
pub struct MockSession {
    dsn: String,
    ordered: AtomicBool,
    require_expectations: AtomicBool,
    expected: ExpectationQueue,
}

impl MockSession {
    pub fn new(dsn: impl Into<String>, config: MockConfig) -> Self {
        Self {
            dsn: dsn.into(),
            ordered: AtomicBool::new(config.ordered),
            require_expectations: AtomicBool::new(config.require_expectations),
            expected: ExpectationQueue::default(),
        }
    }

    /// Identifier the session is registered under in its driver.
    pub fn dsn(&self) -> &str {
        &self.dsn
    }

    pub fn config(&self) -> MockConfig {
        MockConfig {
            ordered: self.ordered.load(Ordering::Acquire),
            require_expectations: self.require_expectations.load(Ordering::Acquire),
        }
    }

    pub fn match_expectations_in_order(&self, ordered: bool) {
        self.ordered.store(ordered, Ordering::Release);
    }

    pub fn require_expectations(&self, required: bool) {
        self.require_expectations.store(required, Ordering::Release);
    }

    pub fn expectations(&self) -> &ExpectationQueue {
        &self.expected
    }

    pub fn expect_close(&self) -> ExpectedClose {
        ExpectedClose::new(self.expected.push(Payload::Close))
    }

    pub fn expect_begin(&self) -> ExpectedBegin {
        ExpectedBegin::new(self.expected.push(Payload::Begin))
    }

    pub fn expect_commit(&self) -> ExpectedCommit {
        ExpectedCommit::new(self.expected.push(Payload::Commit))
    }

    pub fn expect_rollback(&self) -> ExpectedRollback {
        ExpectedRollback::new(self.expected.push(Payload::Rollback))
    }

    /// `pattern` is a regular expression over the normalized query text.
    pub fn expect_prepare(&self, pattern: &str) -> Result<ExpectedPrepare<'_>, MockError> {
        let pattern = QueryPattern::new(pattern)?;
        let record = self.expected.push(Payload::Prepare {
            pattern: pattern.clone(),
            close_error: None,
            must_be_closed: false,
            closed: false,
        });
        Ok(ExpectedPrepare::new(record, pattern, &self.expected))
    }

    pub fn expect_exec(&self, pattern: &str) -> Result<ExpectedExec, MockError> {
        let pattern = QueryPattern::new(pattern)?;
        let record = self.expected.push(Payload::Exec {
            pattern,
            args: None,
            result: None,
        });
        Ok(ExpectedExec::new(record))
    }

    pub fn expect_query(&self, pattern: &str) -> Result<ExpectedQuery, MockError> {
        let pattern = QueryPattern::new(pattern)?;
        let record = self.expected.push(Payload::Query {
            pattern,
            args: None,
            rows: None,
        });
        Ok(ExpectedQuery::new(record))
    }

    fn mode(&self) -> DispatchMode {
        let config = self.config();
        DispatchMode {
            ordered: config.ordered,
            require_expectations: config.require_expectations,
        }
    }

    pub fn close(&self) -> Result<(), MockError> {
        let claim = dispatch(&self.expected, &Call::bare(ExpectationKind::Close), self.mode())?;
        match claim.and_then(|c| c.outcome.error) {
            Some(err) => Err(MockError::Injected(err)),
            None => Ok(()),
        }
    }

    /// The transaction handle is the session itself, so it is returned even
    /// when a lenient session had nothing to match.
    pub fn begin(self: &Arc<Self>) -> Result<Transaction, MockError> {
        let claim = dispatch(&self.expected, &Call::bare(ExpectationKind::Begin), self.mode())?;
        if let Some(err) = claim.and_then(|c| c.outcome.error) {
            return Err(MockError::Injected(err));
        }
        Ok(Transaction::new(Arc::clone(self)))
    }

    pub fn commit(&self) -> Result<(), MockError> {
        let claim = dispatch(&self.expected, &Call::bare(ExpectationKind::Commit), self.mode())?;
        match claim.and_then(|c| c.outcome.error) {
            Some(err) => Err(MockError::Injected(err)),
            None => Ok(()),
        }
    }

    pub fn rollback(&self) -> Result<(), MockError> {
        let claim = dispatch(
            &self.expected,
            &Call::bare(ExpectationKind::Rollback),
            self.mode(),
        )?;
        match claim.and_then(|c| c.outcome.error) {
            Some(err) => Err(MockError::Injected(err)),
            None => Ok(()),
        }
    }

    /// Returns `Ok(None)` when a lenient session had nothing to match.
    pub fn prepare(self: &Arc<Self>, query: &str) -> Result<Option<Statement>, MockError> {
        let query = normalize_query(query);
        let call = Call::with_query(ExpectationKind::Prepare, &query, &[]);
        let Some(claim) = dispatch(&self.expected, &call, self.mode())? else {
            return Ok(None);
        };
        if let Some(err) = claim.outcome.error {
            return Err(MockError::Injected(err));
        }
        Ok(Some(Statement::new(
            Arc::clone(self),
            query,
            claim.outcome.close_error,
            claim.record,
        )))
    }

    /// Returns `Ok(None)` when a lenient session had nothing to match.
    pub fn exec(&self, query: &str, args: &[Value]) -> Result<Option<ExecResult>, MockError> {
        let query = normalize_query(query);
        let call = Call::with_query(ExpectationKind::Exec, &query, args);
        let Some(claim) = dispatch(&self.expected, &call, self.mode())? else {
            return Ok(None);
        };
        if let Some(err) = claim.outcome.error {
            return Err(MockError::Injected(err));
        }
        match claim.outcome.result {
            Some(result) => Ok(Some(result)),
            None => Err(MockError::MissingOutcome {
                call: call.label(),
                query,
                args: types::format_values(args),
                missing: "result",
                expectation: claim.record.to_string(),
            }),
        }
    }

    /// Returns `Ok(None)` when a lenient session had nothing to match.
    pub fn query(&self, query: &str, args: &[Value]) -> Result<Option<Rows>, MockError> {
        let query = normalize_query(query);
        let call = Call::with_query(ExpectationKind::Query, &query, args);
        let Some(claim) = dispatch(&self.expected, &call, self.mode())? else {
            return Ok(None);
        };
        if let Some(err) = claim.outcome.error {
            return Err(MockError::Injected(err));
        }
        match claim.outcome.rows {
            Some(rows) => {
                rows.validate()?;
                Ok(Some(rows))
            }
            None => Err(MockError::MissingOutcome {
                call: call.label(),
                query,
                args: types::format_values(args),
                missing: "rows",
                expectation: claim.record.to_string(),
            }),
        }
    }

    /// Reports the first declared expectation that was never claimed, or a
    /// claimed Prepare whose statement had to be closed and was not.
    pub fn expectations_were_met(&self) -> Result<(), MockError> {
        for record in self.expected.snapshot() {
            if !record.fulfilled() {
                return Err(MockError::UnfulfilledExpectation {
                    expectation: record.to_string(),
                });
            }
            if record.awaiting_statement_close() {
                return Err(MockError::StatementNotClosed {
                    expectation: record.to_string(),
                });
            }
        }
        Ok(())
    }
}
