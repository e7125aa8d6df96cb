//! Per-superstep message channels. A channel owns two buffers: an outbound
//! one the current round pushes into, and an inbound one holding what the
//! previous round delivered. The engine swaps them at the barrier, so a value
//! pushed in round *i* is readable in round *i+1* and never earlier.

use std::{hash::Hash, marker::PhantomData, ops::AddAssign};

use rustc_hash::FxHashSet;
use serde::{de::DeserializeOwned, Serialize};

pub mod broadcast;
pub mod push_combined;

pub use broadcast::BroadcastChannel;
pub use push_combined::PushCombinedChannel;

/// Capability set of a message payload crossing a worker boundary.
pub trait Message: Clone + Send + Sync + Serialize + DeserializeOwned + 'static {}

impl<T: Clone + Send + Sync + Serialize + DeserializeOwned + 'static> Message for T {}

/// Merges two messages addressed to the same target vertex.
///
/// Workers emit and merge partials asynchronously relative to each other
/// before the barrier, so the function must be associative and commutative
/// for the delivered value to be well-defined. The engine cannot check this;
/// it is a caller obligation.
pub trait Combiner<M>: Send + Sync + 'static {
    fn combine(acc: &mut M, incoming: M);
}

pub struct SumCombiner<T> {
    _marker: PhantomData<T>,
}

impl<T: AddAssign<T> + Send + Sync + 'static> Combiner<T> for SumCombiner<T> {
    fn combine(acc: &mut T, incoming: T) {
        *acc += incoming;
    }
}

pub struct MinCombiner<T> {
    _marker: PhantomData<T>,
}

impl<T: PartialOrd + Send + Sync + 'static> Combiner<T> for MinCombiner<T> {
    fn combine(acc: &mut T, incoming: T) {
        if incoming < *acc {
            *acc = incoming;
        }
    }
}

pub struct MaxCombiner<T> {
    _marker: PhantomData<T>,
}

impl<T: PartialOrd + Send + Sync + 'static> Combiner<T> for MaxCombiner<T> {
    fn combine(acc: &mut T, incoming: T) {
        if incoming > *acc {
            *acc = incoming;
        }
    }
}

/// List union: concatenates, keeps duplicates. Order is sender-dependent and
/// must not carry meaning.
pub struct UnionCombiner<T> {
    _marker: PhantomData<T>,
}

impl<T: Send + Sync + 'static> Combiner<Vec<T>> for UnionCombiner<T> {
    fn combine(acc: &mut Vec<T>, incoming: Vec<T>) {
        acc.extend(incoming);
    }
}

/// Set union: deduplicating variant of [`UnionCombiner`].
pub struct SetUnionCombiner<T> {
    _marker: PhantomData<T>,
}

impl<T: Hash + Eq + Send + Sync + 'static> Combiner<FxHashSet<T>> for SetUnionCombiner<T> {
    fn combine(acc: &mut FxHashSet<T>, incoming: FxHashSet<T>) {
        acc.extend(incoming);
    }
}

#[cfg(test)]
mod combiner_test {
    use quickcheck_macros::quickcheck;

    use super::*;

    #[quickcheck]
    fn sum_fold_ignores_order(xs: Vec<i32>) {
        let fold = |values: &[i32]| -> i64 {
            let mut it = values.iter().map(|&x| i64::from(x));
            match it.next() {
                Some(first) => {
                    let mut acc = first;
                    for x in it {
                        SumCombiner::combine(&mut acc, x);
                    }
                    acc
                }
                None => 0,
            }
        };

        let mut reversed = xs.clone();
        reversed.reverse();

        assert_eq!(fold(&xs), fold(&reversed));
    }

    #[test]
    fn min_max_keep_the_extremes() {
        let mut lo = 10;
        let mut hi = 10;
        for x in [12, 3, 7, 19, 5] {
            MinCombiner::combine(&mut lo, x);
            MaxCombiner::combine(&mut hi, x);
        }
        assert_eq!(lo, 3);
        assert_eq!(hi, 19);
    }

    #[test]
    fn union_keeps_every_element() {
        let mut acc = vec!["a"];
        UnionCombiner::combine(&mut acc, vec!["b", "a"]);
        assert_eq!(acc, vec!["a", "b", "a"]);

        let mut set: FxHashSet<&str> = ["a"].into_iter().collect();
        SetUnionCombiner::combine(&mut set, ["b", "a"].into_iter().collect());
        assert_eq!(set.len(), 2);
    }
}
