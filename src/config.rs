/// Session modes for a mock connection.
///
/// Both switches are read on every dispatch, so they should be settled
/// before the code under test starts issuing calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MockConfig {
    /// Calls must consume expectations in declaration order.
    pub ordered: bool,
    /// A call that matches no expectation is an error rather than a no-op.
    pub require_expectations: bool,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            ordered: true,
            require_expectations: true,
        }
    }
}

impl MockConfig {
    pub fn with_ordered(mut self, ordered: bool) -> Self {
        self.ordered = ordered;
        self
    }

    pub fn with_require_expectations(mut self, require_expectations: bool) -> Self {
        self.require_expectations = require_expectations;
        self
    }

    /// Unordered, strict. The usual choice when calls race across threads.
    pub fn concurrent() -> Self {
        Self::default().with_ordered(false)
    }
}
