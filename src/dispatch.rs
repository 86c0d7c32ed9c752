use crate::error::{ConversionError, MockError};
use crate::expectation::{Attempt, Call, Expectation, ExpectationQueue, Outcome, Rejection};
use crate::types::format_values;
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// How a session walks its queue for each call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchMode {
    pub ordered: bool,
    pub require_expectations: bool,
}

/// A record won by one call, together with its canned outcome.
#[derive(Debug)]
pub struct Claim {
    pub index: usize,
    pub record: Arc<Expectation>,
    pub outcome: Outcome,
}

/// Finds and claims the record that answers `call`.
///
/// `Ok(None)` is only returned in lenient mode, when nothing matched.
pub fn dispatch(
    queue: &ExpectationQueue,
    call: &Call<'_>,
    mode: DispatchMode,
) -> Result<Option<Claim>, MockError> {
    if mode.ordered {
        dispatch_ordered(queue, call, mode)
    } else {
        dispatch_unordered(queue, call, mode)
    }
}

/// Only the first pending record is a candidate. A kind or predicate
/// mismatch against it ends the scan.
fn dispatch_ordered(
    queue: &ExpectationQueue,
    call: &Call<'_>,
    mode: DispatchMode,
) -> Result<Option<Claim>, MockError> {
    let records = queue.snapshot();
    let mut fulfilled = 0;
    for (index, record) in records.iter().enumerate() {
        match record.try_claim(call) {
            Attempt::AlreadyFulfilled => fulfilled += 1,
            Attempt::WrongKind => {
                debug!(kind = %call.kind, next = %record.kind(), index, "call out of order");
                return Err(MockError::UnexpectedCall {
                    call: call.describe(),
                    next: record.to_string(),
                });
            }
            Attempt::Rejected(rejection) => {
                return Err(rejection_error(call, record, rejection));
            }
            Attempt::Claimed(outcome) => return Ok(Some(claimed(index, record, outcome, call))),
        }
    }
    unmatched(call, records.len(), fulfilled, None, mode)
}

/// Every pending record of the call's kind is a candidate; the first one, in
/// declaration order, whose predicate holds is claimed.
fn dispatch_unordered(
    queue: &ExpectationQueue,
    call: &Call<'_>,
    mode: DispatchMode,
) -> Result<Option<Claim>, MockError> {
    let records = queue.snapshot();
    let mut fulfilled = 0;
    let mut conversion: Option<(ConversionError, &Arc<Expectation>)> = None;
    for (index, record) in records.iter().enumerate() {
        match record.try_claim(call) {
            Attempt::AlreadyFulfilled => fulfilled += 1,
            Attempt::WrongKind => {}
            Attempt::Rejected(Rejection::Conversion(err)) => {
                if conversion.is_none() {
                    conversion = Some((err, record));
                }
            }
            Attempt::Rejected(_) => {}
            Attempt::Claimed(outcome) => return Ok(Some(claimed(index, record, outcome, call))),
        }
    }
    unmatched(call, records.len(), fulfilled, conversion, mode)
}

fn claimed(index: usize, record: &Arc<Expectation>, outcome: Outcome, call: &Call<'_>) -> Claim {
    trace!(kind = %call.kind, index, "expectation claimed");
    Claim {
        index,
        record: Arc::clone(record),
        outcome,
    }
}

fn unmatched(
    call: &Call<'_>,
    total: usize,
    fulfilled: usize,
    conversion: Option<(ConversionError, &Arc<Expectation>)>,
    mode: DispatchMode,
) -> Result<Option<Claim>, MockError> {
    if mode.require_expectations {
        if let Some((source, record)) = conversion {
            return Err(MockError::ArgumentConversion {
                call: call.label(),
                query: call.query.to_string(),
                args: format_values(call.args),
                expectation: record.to_string(),
                source,
            });
        }
        debug!(kind = %call.kind, total, fulfilled, "no expectation matched");
        return Err(MockError::NotExpected {
            call: call.describe(),
            all_fulfilled: fulfilled == total,
        });
    }
    if fulfilled < total {
        warn!(
            kind = %call.kind,
            pending = total - fulfilled,
            "unmatched call tolerated while expectations are still pending"
        );
    }
    Ok(None)
}

fn rejection_error(call: &Call<'_>, record: &Expectation, rejection: Rejection) -> MockError {
    debug!(kind = %call.kind, ?rejection, "head expectation rejected call");
    match rejection {
        Rejection::Query { pattern } => MockError::QueryMismatch {
            call: call.label(),
            query: call.query.to_string(),
            pattern,
        },
        Rejection::Arguments { expected } => MockError::ArgumentMismatch {
            call: call.label(),
            query: call.query.to_string(),
            args: format_values(call.args),
            expected,
        },
        Rejection::Conversion(source) => MockError::ArgumentConversion {
            call: call.label(),
            query: call.query.to_string(),
            args: format_values(call.args),
            expectation: record.to_string(),
            source,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::{DispatchMode, dispatch};
    use crate::error::MockErrorCode;
    use crate::expectation::{
        Argument, Call, ExpectationKind, ExpectationQueue, Payload, QueryPattern,
    };
    use crate::types::Value;

    const ORDERED: DispatchMode = DispatchMode {
        ordered: true,
        require_expectations: true,
    };
    const UNORDERED: DispatchMode = DispatchMode {
        ordered: false,
        require_expectations: true,
    };

    fn push_exec(queue: &ExpectationQueue, pattern: &str, args: Option<Vec<Argument>>) {
        queue.push(Payload::Exec {
            pattern: QueryPattern::new(pattern).expect("pattern"),
            args,
            result: None,
        });
    }

    #[test]
    fn ordered_head_of_other_kind_blocks_later_match() {
        let queue = ExpectationQueue::default();
        queue.push(Payload::Begin);
        queue.push(Payload::Commit);
        let err = dispatch(&queue, &Call::bare(ExpectationKind::Commit), ORDERED)
            .expect_err("commit before begin");
        assert_eq!(err.code(), MockErrorCode::UnexpectedCall);
        assert!(err.to_string().contains("next expectation is: ExpectedBegin"));
        assert_eq!(queue.fulfilled_count(), 0);
    }

    #[test]
    fn ordered_predicate_failure_does_not_fall_through() {
        let queue = ExpectationQueue::default();
        push_exec(&queue, "^UPDATE", None);
        push_exec(&queue, "^INSERT", None);
        let call = Call::with_query(ExpectationKind::Exec, "INSERT INTO t", &[]);
        let err = dispatch(&queue, &call, ORDERED).expect_err("head is UPDATE");
        assert_eq!(err.code(), MockErrorCode::QueryMismatch);
        assert_eq!(queue.fulfilled_count(), 0);
    }

    #[test]
    fn ordered_argument_mismatch_names_both_lists() {
        let queue = ExpectationQueue::default();
        push_exec(&queue, "INSERT", Some(vec![Argument::value(1i64)]));
        let args = [Value::Integer(2)];
        let call = Call::with_query(ExpectationKind::Exec, "INSERT", &args);
        let err = dispatch(&queue, &call, ORDERED).expect_err("args differ");
        assert_eq!(err.code(), MockErrorCode::ArgumentMismatch);
        assert_eq!(
            err.to_string(),
            "exec: query 'INSERT', args [2] do not match expected [1]"
        );
    }

    #[test]
    fn unordered_claims_first_matching_candidate() {
        let queue = ExpectationQueue::default();
        push_exec(&queue, "^UPDATE", None);
        push_exec(&queue, "^INSERT", None);
        let call = Call::with_query(ExpectationKind::Exec, "INSERT INTO t", &[]);
        let claim = dispatch(&queue, &call, UNORDERED)
            .expect("dispatch")
            .expect("claim");
        assert_eq!(claim.index, 1);
        let records = queue.snapshot();
        assert!(!records[0].fulfilled());
        assert!(records[1].fulfilled());
    }

    #[test]
    fn unordered_reports_conversion_failure_when_nothing_matches() {
        let queue = ExpectationQueue::default();
        push_exec(&queue, "INSERT", Some(vec![Argument::value("bob")]));
        let args = [Value::Blob(vec![0xff])];
        let call = Call::with_query(ExpectationKind::Exec, "INSERT", &args);
        let err = dispatch(&queue, &call, UNORDERED).expect_err("bad blob");
        assert_eq!(err.code(), MockErrorCode::ArgumentConversion);
        assert!(err.to_string().contains("ExpectedExec"));
    }

    #[test]
    fn drained_queue_is_distinguished() {
        let queue = ExpectationQueue::default();
        queue.push(Payload::Close);
        let call = Call::bare(ExpectationKind::Close);
        dispatch(&queue, &call, ORDERED)
            .expect("first close")
            .expect("claim");
        let err = dispatch(&queue, &call, ORDERED).expect_err("second close");
        assert_eq!(
            err.to_string(),
            "all expectations were already fulfilled, call to database Close was not expected"
        );
    }

    #[test]
    fn lenient_mode_tolerates_unmatched_calls() {
        let queue = ExpectationQueue::default();
        queue.push(Payload::Begin);
        let mode = DispatchMode {
            ordered: false,
            require_expectations: false,
        };
        let outcome = dispatch(&queue, &Call::bare(ExpectationKind::Rollback), mode)
            .expect("lenient");
        assert!(outcome.is_none());
        assert_eq!(queue.fulfilled_count(), 0);
    }
}
