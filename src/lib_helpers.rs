use std::sync::atomic::{AtomicU64, Ordering};

/// Collapses every whitespace run to a single space and trims both ends, so
/// patterns can be written against single-line SQL.
pub fn normalize_query(query: &str) -> String {
    let mut out = String::with_capacity(query.len());
    for word in query.split_whitespace() {
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(word);
    }
    out
}

pub(crate) fn next_session_dsn(counter: &AtomicU64) -> String {
    let n = counter.fetch_add(1, Ordering::Relaxed);
    format!("sqlmock_db_{n}")
}
