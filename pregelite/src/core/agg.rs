//! Reduction definitions shared by aggregators. An accumulator owns an
//! intermediate representation `A`, folds `IN` values into it, merges two
//! intermediates, and renders a final `OUT`. `combine` runs across worker
//! partials, so it must be associative and commutative for the merged value
//! to be independent of worker arrival order.

use std::{
    marker::PhantomData,
    ops::{AddAssign, Div},
};

use num_traits::{Bounded, Zero};

use super::StateType;

pub trait Accumulator<A, IN, OUT>: Send + Sync {
    fn zero() -> A;

    fn add(a1: &mut A, a: IN);

    fn combine(a1: &mut A, a2: &A);

    fn finish(a: &A) -> OUT;
}

pub struct MinDef<A: StateType + Bounded + PartialOrd> {
    _marker: PhantomData<A>,
}

impl<A> Accumulator<A, A, A> for MinDef<A>
where
    A: StateType + Bounded + PartialOrd,
{
    fn zero() -> A {
        A::max_value()
    }

    fn add(a1: &mut A, a: A) {
        if a < *a1 {
            *a1 = a;
        }
    }

    fn combine(a1: &mut A, a2: &A) {
        Self::add(a1, a2.clone());
    }

    fn finish(a: &A) -> A {
        a.clone()
    }
}

pub struct MaxDef<A: StateType + Bounded + PartialOrd> {
    _marker: PhantomData<A>,
}

impl<A> Accumulator<A, A, A> for MaxDef<A>
where
    A: StateType + Bounded + PartialOrd,
{
    fn zero() -> A {
        A::min_value()
    }

    fn add(a1: &mut A, a: A) {
        if a > *a1 {
            *a1 = a;
        }
    }

    fn combine(a1: &mut A, a2: &A) {
        Self::add(a1, a2.clone());
    }

    fn finish(a: &A) -> A {
        a.clone()
    }
}

pub struct SumDef<A: StateType + Zero + AddAssign<A>> {
    _marker: PhantomData<A>,
}

impl<A> Accumulator<A, A, A> for SumDef<A>
where
    A: StateType + Zero + AddAssign<A>,
{
    fn zero() -> A {
        A::zero()
    }

    fn add(a1: &mut A, a: A) {
        *a1 += a;
    }

    fn combine(a1: &mut A, a2: &A) {
        Self::add(a1, a2.clone());
    }

    fn finish(a: &A) -> A {
        a.clone()
    }
}

pub struct AvgDef<A: StateType + Zero + AddAssign<A> + TryFrom<usize> + Div<A, Output = A>> {
    _marker: PhantomData<A>,
}

impl<A> Accumulator<(A, usize), A, A> for AvgDef<A>
where
    A: StateType + Zero + AddAssign<A> + TryFrom<usize> + Div<A, Output = A>,
    <A as TryFrom<usize>>::Error: std::fmt::Debug,
{
    fn zero() -> (A, usize) {
        (A::zero(), 0)
    }

    fn add(a1: &mut (A, usize), a: A) {
        a1.0 += a;
        a1.1 += 1;
    }

    fn combine(a1: &mut (A, usize), a2: &(A, usize)) {
        a1.0 += a2.0.clone();
        a1.1 += a2.1;
    }

    fn finish(a: &(A, usize)) -> A {
        if a.1 == 0 {
            return A::zero();
        }
        let count: A = A::try_from(a.1).unwrap_or_else(|_| {
            unreachable!("count always fits the accumulated numeric type in practice")
        });
        a.0.clone() / count
    }
}

/// Concatenating union of everything every worker contributed. Order across
/// workers is unspecified; callers sort before presenting.
pub struct VecDef<A: StateType> {
    _marker: PhantomData<A>,
}

impl<A> Accumulator<Vec<A>, A, Vec<A>> for VecDef<A>
where
    A: StateType,
{
    fn zero() -> Vec<A> {
        Vec::new()
    }

    fn add(a1: &mut Vec<A>, a: A) {
        a1.push(a);
    }

    fn combine(a1: &mut Vec<A>, a2: &Vec<A>) {
        a1.extend_from_slice(a2);
    }

    fn finish(a: &Vec<A>) -> Vec<A> {
        a.clone()
    }
}

pub mod set {
    use std::hash::Hash;

    use rustc_hash::FxHashSet;

    use super::*;

    pub struct Set<A: StateType + Hash + Eq> {
        _marker: PhantomData<A>,
    }

    impl<A> Accumulator<FxHashSet<A>, A, FxHashSet<A>> for Set<A>
    where
        A: StateType + Hash + Eq,
    {
        fn zero() -> FxHashSet<A> {
            FxHashSet::default()
        }

        fn add(a1: &mut FxHashSet<A>, a: A) {
            a1.insert(a);
        }

        fn combine(a1: &mut FxHashSet<A>, a2: &FxHashSet<A>) {
            a1.extend(a2.iter().cloned())
        }

        fn finish(a: &FxHashSet<A>) -> FxHashSet<A> {
            a.clone()
        }
    }
}

pub mod topk {
    use std::{cmp::Reverse, collections::BTreeSet};

    use itertools::Itertools;

    use super::*;

    pub struct TopK<A: StateType + Ord, const N: usize> {
        _marker: PhantomData<A>,
    }

    pub type TopKHeap<A> = BTreeSet<Reverse<A>>;

    impl<A, const N: usize> Accumulator<TopKHeap<A>, A, Vec<A>> for TopK<A, N>
    where
        A: StateType + Ord,
    {
        fn zero() -> TopKHeap<A> {
            TopKHeap::new()
        }

        fn add(a1: &mut TopKHeap<A>, a: A) {
            a1.insert(Reverse(a));
            if a1.len() > N {
                a1.pop_last();
            }
        }

        fn combine(a1: &mut TopKHeap<A>, a2: &TopKHeap<A>) {
            a1.extend(a2.iter().cloned());
            while a1.len() > N {
                a1.pop_last();
            }
        }

        fn finish(a: &TopKHeap<A>) -> Vec<A> {
            a.iter().sorted().map(|Reverse(a)| a.clone()).collect()
        }
    }
}
