//! Aggregate root trait and optimistic concurrency expectations.

/// Aggregate root marker + minimal interface.
///
/// An aggregate root is the serialization point for everything hanging off it:
/// writers lock (or version-check) the root, never its children.
pub trait AggregateRoot {
    /// Strongly-typed aggregate identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the aggregate identifier.
    fn id(&self) -> &Self::Id;

    /// Monotonically increasing version of the aggregate's state.
    ///
    /// Incremented once per committed mutation.
    fn version(&self) -> u64;
}

/// Optimistic concurrency expectation for an aggregate.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ExpectedVersion {
    /// The aggregate must not exist yet.
    Absent,
    /// Require the aggregate to be at an exact version.
    Exact(u64),
}

impl ExpectedVersion {
    /// Expectation derived from what a reader observed (`None` = not present).
    pub fn observed(version: Option<u64>) -> Self {
        match version {
            Some(v) => ExpectedVersion::Exact(v),
            None => ExpectedVersion::Absent,
        }
    }

    pub fn matches(self, actual: Option<u64>) -> bool {
        match (self, actual) {
            (ExpectedVersion::Absent, None) => true,
            (ExpectedVersion::Exact(v), Some(a)) => v == a,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn observed_expectation_matches_same_version_only() {
        let exp = ExpectedVersion::observed(Some(3));
        assert!(exp.matches(Some(3)));
        assert!(!exp.matches(Some(4)));
        assert!(!exp.matches(None));
    }

    #[test]
    fn absent_expectation_rejects_existing_aggregate() {
        let exp = ExpectedVersion::observed(None);
        assert!(exp.matches(None));
        assert!(!exp.matches(Some(1)));
    }
}
