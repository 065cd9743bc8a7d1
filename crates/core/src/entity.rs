//! Entity trait: records that keep their identity while their state changes.

/// A record tracked by identity (cost layers, ledger entries).
///
/// Two entities are "the same" when their ids match, even if one of them has
/// since been partially consumed.
pub trait Entity {
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    fn id(&self) -> &Self::Id;

    fn same_identity(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Slot {
        id: u32,
        remaining: u32,
    }

    impl Entity for Slot {
        type Id = u32;

        fn id(&self) -> &u32 {
            &self.id
        }
    }

    #[test]
    fn identity_ignores_state() {
        let before = Slot { id: 7, remaining: 10 };
        let after = Slot { id: 7, remaining: 0 };
        let other = Slot { id: 8, remaining: 10 };

        assert_ne!(before.remaining, after.remaining);
        assert!(before.same_identity(&after));
        assert!(!before.same_identity(&other));
    }
}
