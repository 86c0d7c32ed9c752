use super::{Expectation, Payload};
use parking_lot::RwLock;
use std::sync::Arc;

/// Declaration-ordered list of expectations owned by one session.
///
/// Records are appended during set-up and never removed or reordered, so a
/// record's position is its declaration index for the session's lifetime.
/// Appending while calls are being dispatched is not a supported pattern.
#[derive(Debug, Default)]
pub struct ExpectationQueue {
    records: RwLock<Vec<Arc<Expectation>>>,
}

impl ExpectationQueue {
    pub(crate) fn push(&self, payload: Payload) -> Arc<Expectation> {
        let record = Arc::new(Expectation::new(payload));
        self.records.write().push(Arc::clone(&record));
        record
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// Point-in-time copy of the record handles, in declaration order.
    pub fn snapshot(&self) -> Vec<Arc<Expectation>> {
        self.records.read().clone()
    }

    pub fn fulfilled_count(&self) -> usize {
        self.records.read().iter().filter(|r| r.fulfilled()).count()
    }

    /// The first record, in declaration order, that was never claimed.
    pub fn first_unfulfilled(&self) -> Option<Arc<Expectation>> {
        self.records
            .read()
            .iter()
            .find(|r| !r.fulfilled())
            .map(Arc::clone)
    }
}
