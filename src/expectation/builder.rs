//! Declaration builders returned by the session's `expect_*` calls.
//!
//! The record is queued as soon as the `expect_*` call returns; the builder
//! only refines it, so dropping a builder without further calls leaves a
//! record that expects the operation and answers with success.

use super::{Argument, Expectation, ExpectationQueue, Payload, QueryPattern};
use crate::error::InjectedError;
use crate::outcome::{ExecResult, Rows};
use crate::types::Value;
use std::sync::Arc;

fn set_error(record: &Expectation, err: InjectedError) {
    record.configure(|state| state.error = Some(err));
}

fn set_args(record: &Expectation, declared: Vec<Argument>) {
    record.configure(|state| match &mut state.payload {
        Payload::Exec { args, .. } | Payload::Query { args, .. } => *args = Some(declared),
        _ => {}
    });
}

pub struct ExpectedClose {
    record: Arc<Expectation>,
}

impl ExpectedClose {
    pub(crate) fn new(record: Arc<Expectation>) -> Self {
        Self { record }
    }

    pub fn will_return_error(self, err: InjectedError) -> Self {
        set_error(&self.record, err);
        self
    }

    pub fn fulfilled(&self) -> bool {
        self.record.fulfilled()
    }
}

pub struct ExpectedBegin {
    record: Arc<Expectation>,
}

impl ExpectedBegin {
    pub(crate) fn new(record: Arc<Expectation>) -> Self {
        Self { record }
    }

    pub fn will_return_error(self, err: InjectedError) -> Self {
        set_error(&self.record, err);
        self
    }

    pub fn fulfilled(&self) -> bool {
        self.record.fulfilled()
    }
}

pub struct ExpectedCommit {
    record: Arc<Expectation>,
}

impl ExpectedCommit {
    pub(crate) fn new(record: Arc<Expectation>) -> Self {
        Self { record }
    }

    pub fn will_return_error(self, err: InjectedError) -> Self {
        set_error(&self.record, err);
        self
    }

    pub fn fulfilled(&self) -> bool {
        self.record.fulfilled()
    }
}

pub struct ExpectedRollback {
    record: Arc<Expectation>,
}

impl ExpectedRollback {
    pub(crate) fn new(record: Arc<Expectation>) -> Self {
        Self { record }
    }

    pub fn will_return_error(self, err: InjectedError) -> Self {
        set_error(&self.record, err);
        self
    }

    pub fn fulfilled(&self) -> bool {
        self.record.fulfilled()
    }
}

pub struct ExpectedPrepare<'a> {
    record: Arc<Expectation>,
    pattern: QueryPattern,
    queue: &'a ExpectationQueue,
}

impl<'a> ExpectedPrepare<'a> {
    pub(crate) fn new(
        record: Arc<Expectation>,
        pattern: QueryPattern,
        queue: &'a ExpectationQueue,
    ) -> Self {
        Self {
            record,
            pattern,
            queue,
        }
    }

    pub fn will_return_error(self, err: InjectedError) -> Self {
        set_error(&self.record, err);
        self
    }

    /// Error returned when the prepared statement is closed.
    pub fn will_return_close_error(self, err: InjectedError) -> Self {
        self.record.configure(|state| {
            if let Payload::Prepare { close_error, .. } = &mut state.payload {
                *close_error = Some(err);
            }
        });
        self
    }

    /// Verification fails unless the prepared statement gets closed.
    pub fn will_be_closed(self) -> Self {
        self.record.configure(|state| {
            if let Payload::Prepare { must_be_closed, .. } = &mut state.payload {
                *must_be_closed = true;
            }
        });
        self
    }

    /// Queues an Exec expectation with this statement's pattern.
    pub fn expect_exec(&self) -> ExpectedExec {
        let record = self.queue.push(Payload::Exec {
            pattern: self.pattern.clone(),
            args: None,
            result: None,
        });
        ExpectedExec::new(record)
    }

    /// Queues a Query expectation with this statement's pattern.
    pub fn expect_query(&self) -> ExpectedQuery {
        let record = self.queue.push(Payload::Query {
            pattern: self.pattern.clone(),
            args: None,
            rows: None,
        });
        ExpectedQuery::new(record)
    }

    pub fn fulfilled(&self) -> bool {
        self.record.fulfilled()
    }
}

pub struct ExpectedExec {
    record: Arc<Expectation>,
}

impl ExpectedExec {
    pub(crate) fn new(record: Arc<Expectation>) -> Self {
        Self { record }
    }

    pub fn with_args(self, args: impl IntoIterator<Item = Argument>) -> Self {
        set_args(&self.record, args.into_iter().collect());
        self
    }

    /// Shorthand for `with_args` when every argument is a concrete value.
    pub fn with_values<V: Into<Value>>(self, values: impl IntoIterator<Item = V>) -> Self {
        self.with_args(values.into_iter().map(|v| Argument::Value(v.into())))
    }

    /// The call must carry no arguments at all.
    pub fn without_args(self) -> Self {
        self.with_args(Vec::new())
    }

    pub fn will_return_result(self, result: ExecResult) -> Self {
        self.record.configure(|state| {
            if let Payload::Exec { result: slot, .. } = &mut state.payload {
                *slot = Some(result);
            }
        });
        self
    }

    pub fn will_return_error(self, err: InjectedError) -> Self {
        set_error(&self.record, err);
        self
    }

    pub fn fulfilled(&self) -> bool {
        self.record.fulfilled()
    }
}

pub struct ExpectedQuery {
    record: Arc<Expectation>,
}

impl ExpectedQuery {
    pub(crate) fn new(record: Arc<Expectation>) -> Self {
        Self { record }
    }

    pub fn with_args(self, args: impl IntoIterator<Item = Argument>) -> Self {
        set_args(&self.record, args.into_iter().collect());
        self
    }

    pub fn with_values<V: Into<Value>>(self, values: impl IntoIterator<Item = V>) -> Self {
        self.with_args(values.into_iter().map(|v| Argument::Value(v.into())))
    }

    pub fn without_args(self) -> Self {
        self.with_args(Vec::new())
    }

    pub fn will_return_rows(self, rows: Rows) -> Self {
        self.record.configure(|state| {
            if let Payload::Query { rows: slot, .. } = &mut state.payload {
                *slot = Some(rows);
            }
        });
        self
    }

    pub fn will_return_error(self, err: InjectedError) -> Self {
        set_error(&self.record, err);
        self
    }

    pub fn fulfilled(&self) -> bool {
        self.record.fulfilled()
    }
}
