use crate::config::MockConfig;
use crate::error::{InjectedError, MockError};
use crate::expectation::Expectation;
use crate::lib_helpers::next_session_dsn;
use crate::outcome::{ExecResult, Rows};
use crate::types::Value;
use crate::MockSession;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use tracing::{debug, warn};

#[derive(Debug)]
struct RegisteredSession {
    session: Arc<MockSession>,
    opened: usize,
}

#[derive(Debug, Default)]
struct DriverInner {
    sessions: Mutex<HashMap<String, RegisteredSession>>,
    next_id: AtomicU64,
}

/// Connection table mapping a dsn to its mock session.
///
/// One driver is usually created per test process and shared by cloning.
/// A session stays registered until the last connection opened on it is
/// closed.
#[derive(Debug, Clone, Default)]
pub struct MockDriver {
    inner: Arc<DriverInner>,
}

impl MockDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates and registers a session under a fresh `sqlmock_db_<n>` dsn.
    pub fn new_session(&self, config: MockConfig) -> Arc<MockSession> {
        let dsn = next_session_dsn(&self.inner.next_id);
        let session = Arc::new(MockSession::new(dsn.clone(), config));
        self.inner.sessions.lock().insert(
            dsn,
            RegisteredSession {
                session: Arc::clone(&session),
                opened: 0,
            },
        );
        session
    }

    /// Creates a session and opens one connection on it.
    pub fn open_new(&self, config: MockConfig) -> (Connection, Arc<MockSession>) {
        let session = self.new_session(config);
        let conn = self.attach(&session);
        (conn, session)
    }

    pub fn open(&self, dsn: &str) -> Result<Connection, MockError> {
        let mut sessions = self.inner.sessions.lock();
        let Some(entry) = sessions.get_mut(dsn) else {
            return Err(MockError::UnknownDsn {
                dsn: dsn.to_string(),
            });
        };
        entry.opened += 1;
        debug!(dsn, opened = entry.opened, "mock connection opened");
        Ok(Connection {
            session: Arc::clone(&entry.session),
            driver: self.clone(),
        })
    }

    pub fn session(&self, dsn: &str) -> Option<Arc<MockSession>> {
        self.inner
            .sessions
            .lock()
            .get(dsn)
            .map(|entry| Arc::clone(&entry.session))
    }

    pub fn open_count(&self, dsn: &str) -> usize {
        self.inner
            .sessions
            .lock()
            .get(dsn)
            .map_or(0, |entry| entry.opened)
    }

    pub fn is_registered(&self, dsn: &str) -> bool {
        self.inner.sessions.lock().contains_key(dsn)
    }

    fn attach(&self, session: &Arc<MockSession>) -> Connection {
        let mut sessions = self.inner.sessions.lock();
        let entry = sessions
            .entry(session.dsn().to_string())
            .or_insert_with(|| RegisteredSession {
                session: Arc::clone(session),
                opened: 0,
            });
        entry.opened += 1;
        Connection {
            session: Arc::clone(session),
            driver: self.clone(),
        }
    }

    /// Drops one open reference and dispatches `Close`, both under the
    /// registry lock so a concurrent `open` never sees a half-closed entry.
    fn close_connection(&self, session: &MockSession) -> Result<(), MockError> {
        let mut sessions = self.inner.sessions.lock();
        let dsn = session.dsn();
        let mut unregistered = false;
        if let Some(entry) = sessions.get_mut(dsn) {
            entry.opened = entry.opened.saturating_sub(1);
            if entry.opened == 0 {
                sessions.remove(dsn);
                unregistered = true;
            }
        }
        let result = session.close();
        if unregistered {
            let pending = session
                .expectations()
                .snapshot()
                .iter()
                .filter(|record| !record.fulfilled())
                .count();
            if pending > 0 {
                warn!(dsn, pending, "last connection closed with expectations still pending");
            }
        }
        result
    }
}

/// An open connection routed to a mock session.
#[derive(Debug)]
pub struct Connection {
    session: Arc<MockSession>,
    driver: MockDriver,
}

impl Connection {
    pub fn session(&self) -> &Arc<MockSession> {
        &self.session
    }

    pub fn begin(&self) -> Result<Transaction, MockError> {
        self.session.begin()
    }

    pub fn prepare(&self, query: &str) -> Result<Option<Statement>, MockError> {
        self.session.prepare(query)
    }

    pub fn exec(&self, query: &str, args: &[Value]) -> Result<Option<ExecResult>, MockError> {
        self.session.exec(query, args)
    }

    pub fn query(&self, query: &str, args: &[Value]) -> Result<Option<Rows>, MockError> {
        self.session.query(query, args)
    }

    pub fn close(self) -> Result<(), MockError> {
        self.driver.close_connection(&self.session)
    }
}

/// Transaction handle. It is the session itself, so commit and rollback go
/// through the same script as every other call.
#[derive(Debug)]
pub struct Transaction {
    session: Arc<MockSession>,
}

impl Transaction {
    pub(crate) fn new(session: Arc<MockSession>) -> Self {
        Self { session }
    }

    pub fn commit(self) -> Result<(), MockError> {
        self.session.commit()
    }

    pub fn rollback(self) -> Result<(), MockError> {
        self.session.rollback()
    }
}

/// Prepared statement bound to its session and normalized query text.
#[derive(Debug)]
pub struct Statement {
    session: Arc<MockSession>,
    query: String,
    close_error: Option<InjectedError>,
    record: Arc<Expectation>,
}

impl Statement {
    pub(crate) fn new(
        session: Arc<MockSession>,
        query: String,
        close_error: Option<InjectedError>,
        record: Arc<Expectation>,
    ) -> Self {
        Self {
            session,
            query,
            close_error,
            record,
        }
    }

    pub fn query_text(&self) -> &str {
        &self.query
    }

    pub fn exec(&self, args: &[Value]) -> Result<Option<ExecResult>, MockError> {
        self.session.exec(&self.query, args)
    }

    pub fn query(&self, args: &[Value]) -> Result<Option<Rows>, MockError> {
        self.session.query(&self.query, args)
    }

    pub fn close(self) -> Result<(), MockError> {
        self.record.mark_statement_closed();
        match self.close_error {
            Some(err) => Err(MockError::Injected(err)),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::MockDriver;
    use crate::config::MockConfig;
    use crate::error::MockErrorCode;

    #[test]
    fn sessions_get_distinct_dsns() {
        let driver = MockDriver::new();
        let a = driver.new_session(MockConfig::default());
        let b = driver.new_session(MockConfig::default());
        assert_ne!(a.dsn(), b.dsn());
        assert!(driver.is_registered(a.dsn()));
    }

    #[test]
    fn last_close_unregisters_session() {
        let driver = MockDriver::new();
        let session = driver.new_session(MockConfig::default().with_require_expectations(false));
        let dsn = session.dsn().to_string();
        let first = driver.open(&dsn).expect("open");
        let second = driver.open(&dsn).expect("open again");
        assert_eq!(driver.open_count(&dsn), 2);

        first.close().expect("close");
        assert!(driver.is_registered(&dsn));
        second.close().expect("close");
        assert!(!driver.is_registered(&dsn));

        let err = driver.open(&dsn).expect_err("unregistered");
        assert_eq!(err.code(), MockErrorCode::UnknownDsn);
    }

    #[test]
    fn last_close_with_pending_records_still_unregisters() {
        let driver = MockDriver::new();
        let (conn, mock) = driver.open_new(MockConfig::default());
        mock.expect_close();
        mock.expect_begin();
        mock.expect_commit();
        let dsn = mock.dsn().to_string();
        conn.close().expect("close claimed");
        assert!(!driver.is_registered(&dsn));
        assert_eq!(mock.expectations().fulfilled_count(), 1);
        assert!(mock.expectations_were_met().is_err());
    }

    #[test]
    fn close_dispatches_to_session_script() {
        let driver = MockDriver::new();
        let (conn, mock) = driver.open_new(MockConfig::default());
        mock.expect_close();
        conn.close().expect("close expected");
        mock.expectations_were_met().expect("met");
    }
}
