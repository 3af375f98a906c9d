//! Distributed reference counting.
//!
//! Claims on the lifetime of a shared object are represented by
//! [`RefToken`]s. A token holder can derive new tokens from the one it holds
//! without talking to anyone, and every token ever issued has to be retired
//! exactly once, in any order. The object is dead exactly when all of them
//! are retired.
//!
//! This is achieved with generation counting. A token knows its generation
//! (its depth in the tree of copies) and how many children it has issued.
//! Retiring a token decrements the count of its own generation and adds its
//! children to the count of the next one. The counts only all reach zero
//! once every issued token has been retired, whatever the order.
//!
//! Trackers are keyed by origin, which allows merging trackers created
//! independently: the per-origin counts are summed, so tokens from either
//! side remain valid against the merged tracker.

use std::cell::Cell;

use fnv::FnvHashMap;

/// Credential representing one outstanding claim.
///
/// A token is consumed when retired. Sending a token to another worker
/// transfers the claim to the receiver.
#[derive(Debug, Serialize, Deserialize)]
pub struct RefToken {
    origin: u64,
    generation: u32,
    children: Cell<u32>,
}

impl RefToken {
    /// Derives a new child token, without retiring this one.
    pub fn copy(&self) -> RefToken {
        self.children.set(self.children.get() + 1);
        RefToken {
            origin: self.origin,
            generation: self.generation + 1,
            children: Cell::new(0),
        }
    }

    pub fn origin(&self) -> u64 {
        self.origin
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }
}

/// Cloning issues a new claim, same as [`RefToken::copy`].
impl Clone for RefToken {
    fn clone(&self) -> Self {
        self.copy()
    }
}

/// Tracks liveness based on the tokens retired so far.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RefCount {
    counts: FnvHashMap<u64, Vec<i64>>,
}

impl RefCount {
    /// Creates a new live tracker, together with its source token.
    pub fn new(origin: u64) -> (RefCount, RefToken) {
        let mut counts = FnvHashMap::default();
        counts.insert(origin, vec![1]);
        let source = RefToken {
            origin,
            generation: 0,
            children: Cell::new(0),
        };
        (RefCount { counts }, source)
    }

    /// Retires the given token.
    ///
    /// # Panics
    ///
    /// Panics if the token was not issued by this tracker, or by a tracker
    /// merged into it, or if the tracker is already dead. Retiring the same
    /// claim twice, for instance through two deserialized copies of one
    /// token, panics as soon as the duplicate shows up in the lowest
    /// outstanding generation.
    pub fn retire(&mut self, token: RefToken) {
        assert!(
            self.is_alive(),
            "retired a reference token on a dead tracker"
        );
        let counts = match self.counts.get_mut(&token.origin) {
            Some(counts) => counts,
            None => panic!(
                "retired a reference token that was never issued (origin {})",
                token.origin
            ),
        };
        let gen = token.generation as usize;
        if counts.len() < gen + 2 {
            counts.resize(gen + 2, 0);
        }
        counts[gen] -= 1;
        counts[gen + 1] += token.children.get() as i64;
        // Lower generations are settled before higher ones can be, so the
        // lowest outstanding count is never negative unless a claim was
        // retired more often than it was issued.
        if let Some(lowest) = counts.iter().find(|c| **c != 0) {
            assert!(
                *lowest > 0,
                "retired a reference token that was never issued (origin {}, generation {})",
                token.origin,
                token.generation
            );
        }
    }

    /// Folds all outstanding claims of `other` into this tracker.
    pub fn merge(&mut self, other: RefCount) {
        for (origin, theirs) in other.counts {
            let ours = self.counts.entry(origin).or_insert_with(Vec::new);
            if ours.len() < theirs.len() {
                ours.resize(theirs.len(), 0);
            }
            for (o, t) in ours.iter_mut().zip(theirs) {
                *o += t;
            }
        }
    }

    pub fn is_alive(&self) -> bool {
        self.counts.values().flatten().any(|c| *c != 0)
    }

    pub fn is_dead(&self) -> bool {
        !self.is_alive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retiring_source_kills() {
        let (mut rc, source) = RefCount::new(0);
        assert!(rc.is_alive());
        rc.retire(source);
        assert!(rc.is_dead());
    }

    #[test]
    fn copy_then_retire_child_first() {
        let (mut rc, source) = RefCount::new(0);
        let child = source.copy();
        rc.retire(child);
        assert!(rc.is_alive());
        rc.retire(source);
        assert!(rc.is_dead());
    }

    #[test]
    fn copy_then_retire_parent_first() {
        let (mut rc, source) = RefCount::new(0);
        let child = source.copy();
        rc.retire(source);
        assert!(rc.is_alive());
        rc.retire(child);
        assert!(rc.is_dead());
    }

    #[test]
    fn deep_and_wide_trees() {
        let (mut rc, source) = RefCount::new(3);
        let a = source.copy();
        let b = source.copy();
        let aa = a.copy();
        let aaa = aa.copy();
        let ab = a.copy();
        rc.retire(a);
        rc.retire(source);
        rc.retire(aaa);
        assert!(rc.is_alive());
        rc.retire(b);
        rc.retire(ab);
        assert!(rc.is_alive());
        rc.retire(aa);
        assert!(rc.is_dead());
    }

    #[test]
    fn transferred_token_keeps_its_children() {
        let (mut rc, source) = RefCount::new(0);
        let child = source.copy();
        let bytes = bincode::serialize(&source).unwrap();
        let moved: RefToken = bincode::deserialize(&bytes).unwrap();
        rc.retire(moved);
        assert!(rc.is_alive());
        rc.retire(child);
        assert!(rc.is_dead());
    }

    #[test]
    fn merge_keeps_both_sides_valid() {
        let (mut rc1, s1) = RefCount::new(1);
        let a = s1.copy();
        let (mut rc2, s2) = RefCount::new(2);
        let b = s2.copy();
        rc1.retire(s1);
        rc2.merge(rc1);
        rc2.retire(b);
        assert!(rc2.is_alive());
        rc2.retire(s2);
        assert!(rc2.is_alive());
        rc2.retire(a);
        assert!(rc2.is_dead());
    }

    #[test]
    fn merge_with_source_copy() {
        for retire_copy_first in &[true, false] {
            let (rc1, s1) = RefCount::new(1);
            let a = s1.copy();
            let (mut rc2, s2) = RefCount::new(2);
            rc2.merge(rc1);
            rc2.retire(s2);
            assert!(rc2.is_alive());
            if *retire_copy_first {
                rc2.retire(a);
                assert!(rc2.is_alive());
                rc2.retire(s1);
            } else {
                rc2.retire(s1);
                assert!(rc2.is_alive());
                rc2.retire(a);
            }
            assert!(rc2.is_dead());
        }
    }

    #[test]
    fn merge_is_associative() {
        let build = || {
            let (a, ta) = RefCount::new(1);
            let (b, tb) = RefCount::new(2);
            let (c, tc) = RefCount::new(3);
            (a, b, c, vec![ta, tb, tc])
        };

        let (a, mut b, mut c, tokens) = build();
        b.merge(a);
        c.merge(b);
        let mut left = c;

        let (a, mut b, c, _) = build();
        b.merge(c);
        let mut right = a;
        right.merge(b);

        assert_eq!(left, right);
        let n = tokens.len();
        for (i, t) in tokens.into_iter().enumerate() {
            left.retire(t);
            assert_eq!(left.is_dead(), i == n - 1);
        }
    }

    #[test]
    fn merging_the_same_origin_sums_claims() {
        let (mut rc1, s1) = RefCount::new(0);
        let copy = rc1.clone();
        let a = s1.copy();
        rc1.merge(copy);
        rc1.retire(a);
        rc1.retire(s1);
        assert!(rc1.is_alive());
    }

    #[test]
    #[should_panic(expected = "never issued")]
    fn retiring_unknown_token_panics() {
        let (mut rc, _source) = RefCount::new(0);
        let (_, stranger) = RefCount::new(9);
        rc.retire(stranger);
    }

    fn duplicate(token: &RefToken) -> RefToken {
        bincode::deserialize(&bincode::serialize(token).unwrap()).unwrap()
    }

    #[test]
    #[should_panic(expected = "never issued")]
    fn retiring_source_twice_panics() {
        let (mut rc, source) = RefCount::new(0);
        let _child = source.copy();
        let twin = duplicate(&source);
        rc.retire(source);
        rc.retire(twin);
    }

    #[test]
    #[should_panic(expected = "never issued")]
    fn retiring_child_twice_panics_once_ancestors_are_gone() {
        let (mut rc, source) = RefCount::new(0);
        let child = source.copy();
        let twin = duplicate(&child);
        rc.retire(child);
        rc.retire(twin);
        rc.retire(source);
    }

    #[test]
    fn retiring_out_of_order_never_trips_the_check() {
        let (mut rc, source) = RefCount::new(0);
        let a = source.copy();
        let aa = a.copy();
        let aaa = aa.copy();
        rc.retire(aaa);
        rc.retire(aa);
        rc.retire(a);
        assert!(rc.is_alive());
        rc.retire(source);
        assert!(rc.is_dead());
    }

    #[test]
    #[should_panic(expected = "dead tracker")]
    fn retiring_on_dead_tracker_panics() {
        let (mut rc, source) = RefCount::new(0);
        let child = source.copy();
        rc.retire(source);
        rc.retire(child);
        rc.retire(RefToken {
            origin: 0,
            generation: 0,
            children: Cell::new(0),
        });
    }
}
