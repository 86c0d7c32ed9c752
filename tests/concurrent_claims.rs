use sqlmock::{ExecResult, MockConfig, MockDriver, MockError, MockErrorCode, MockSession, Value};
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::task::JoinSet;

fn stress_scale() -> usize {
    std::env::var("SQLMOCK_STRESS_SCALE")
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(1)
}

fn scaled(base: usize) -> usize {
    base.saturating_mul(stress_scale())
}

fn unordered_session() -> Arc<MockSession> {
    MockDriver::new().new_session(MockConfig::concurrent())
}

/// Many threads race for one record: exactly one wins, the rest learn the
/// script is already drained.
#[test]
fn single_record_is_claimed_exactly_once_across_threads() {
    let mock = unordered_session();
    mock.expect_exec("UPDATE wallets")
        .expect("pattern")
        .with_values([Value::Integer(1)])
        .will_return_result(ExecResult::new(0, 1));

    let racers = scaled(32);
    let wins = AtomicUsize::new(0);
    let drained = AtomicUsize::new(0);
    std::thread::scope(|s| {
        for _ in 0..racers {
            s.spawn(|| {
                let args = [Value::Integer(1)];
                match mock.exec("UPDATE wallets SET n = n - 1 WHERE id = ?", &args) {
                    Ok(Some(_)) => {
                        wins.fetch_add(1, Ordering::SeqCst);
                    }
                    Err(MockError::NotExpected { all_fulfilled, .. }) => {
                        assert!(all_fulfilled, "losers should see a drained script");
                        drained.fetch_add(1, Ordering::SeqCst);
                    }
                    other => panic!("unexpected dispatch outcome: {other:?}"),
                }
            });
        }
    });

    assert_eq!(wins.load(Ordering::SeqCst), 1, "exactly one claim");
    assert_eq!(drained.load(Ordering::SeqCst), racers - 1);
    mock.expectations_were_met().expect("record claimed");
}

/// Each declared record is handed to exactly one caller even when callers
/// pick records by argument rather than position.
#[test]
fn distinct_records_are_each_claimed_once() {
    let mock = unordered_session();
    let records = scaled(64);
    for id in 0..records {
        mock.expect_exec("INSERT INTO events")
            .expect("pattern")
            .with_values([id as i64])
            .will_return_result(ExecResult::new(id as i64, 1));
    }

    let seen = parking_lot::Mutex::new(HashSet::new());
    std::thread::scope(|s| {
        for worker in 0..8usize {
            let mock = &mock;
            let seen = &seen;
            s.spawn(move || {
                for id in (worker..records).step_by(8) {
                    let result = mock
                        .exec(
                            "INSERT INTO events (id) VALUES (?)",
                            &[Value::Integer(id as i64)],
                        )
                        .expect("matching record exists")
                        .expect("result");
                    let claimed = result.last_insert_id().expect("id");
                    assert!(seen.lock().insert(claimed), "id {claimed} claimed twice");
                }
            });
        }
    });

    assert_eq!(seen.lock().len(), records);
    mock.expectations_were_met().expect("every record claimed");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn blocking_callers_race_for_commit() {
    let mock = unordered_session();
    mock.expect_begin();
    mock.expect_commit();

    let mut tasks = JoinSet::new();
    for _ in 0..10 {
        let mock = Arc::clone(&mock);
        tasks.spawn_blocking(move || mock.commit());
    }

    let mut success_count = 0;
    let mut rejected_count = 0;
    while let Some(result) = tasks.join_next().await {
        match result.expect("task panicked") {
            Ok(()) => success_count += 1,
            Err(e) if e.code() == MockErrorCode::NotExpected => {
                assert!(
                    !e.to_string().starts_with("all expectations"),
                    "begin is still pending, so the script is not drained: {e}"
                );
                rejected_count += 1;
            }
            Err(e) => panic!("unexpected error: {e:?}"),
        }
    }

    assert_eq!(success_count, 1);
    assert_eq!(rejected_count, 9);
    let err = mock
        .expectations_were_met()
        .expect_err("begin never called");
    assert!(err.to_string().contains("ExpectedBegin"));
}

/// Under ordered mode a racing caller of the wrong kind is turned away with
/// the name of the record it is blocking on.
#[test]
fn ordered_mode_rejects_out_of_turn_kinds() {
    let mock = MockDriver::new().new_session(MockConfig::default());
    mock.expect_begin();
    mock.expect_commit();

    let outcomes: Vec<Result<(), MockError>> = std::thread::scope(|s| {
        let handles: Vec<_> = (0..4).map(|_| s.spawn(|| mock.commit())).collect();
        handles
            .into_iter()
            .map(|h| h.join().expect("thread panicked"))
            .collect()
    });

    for outcome in outcomes {
        let err = outcome.expect_err("commit is never first");
        assert_eq!(err.code(), MockErrorCode::UnexpectedCall);
        assert!(err.to_string().contains("ExpectedBegin"));
    }
}
