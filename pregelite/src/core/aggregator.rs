//! Global round-scoped reductions. Each worker folds into a local partial
//! during the round body; at the superstep exchange every partial is shipped
//! to every peer, the partial is reset to the reduction's identity, and each
//! worker folds the partials into one merged value that stays readable until
//! the next merge. All workers therefore read the same value at the start of
//! a round.

use std::marker::PhantomData;

use parking_lot::{Mutex, RwLock};
use serde::{de::DeserializeOwned, Serialize};

use crate::{
    core::{
        agg::{Accumulator, MaxDef, MinDef, SumDef},
        codec,
        partition::WorkerId,
        StateType,
    },
    engine::topology::{Exchange, Mesh, Packet},
    errors::EngineError,
};

pub struct Aggregator<A, IN, OUT, ACC> {
    tag: u32,
    partial: Mutex<A>,
    merged: RwLock<A>,
    _acc: PhantomData<ACC>,
    _io: PhantomData<fn(IN) -> OUT>,
}

pub type SumAggregator<T> = Aggregator<T, T, T, SumDef<T>>;
pub type MinAggregator<T> = Aggregator<T, T, T, MinDef<T>>;
pub type MaxAggregator<T> = Aggregator<T, T, T, MaxDef<T>>;

impl<A, IN, OUT, ACC> Aggregator<A, IN, OUT, ACC>
where
    A: StateType + Serialize + DeserializeOwned,
    ACC: Accumulator<A, IN, OUT>,
{
    pub(crate) fn new(tag: u32) -> Self {
        Self {
            tag,
            partial: Mutex::new(ACC::zero()),
            merged: RwLock::new(ACC::zero()),
            _acc: PhantomData,
            _io: PhantomData,
        }
    }

    /// Folds a value into this worker's partial for the current round.
    pub fn update(&self, value: IN) {
        ACC::add(&mut self.partial.lock(), value);
    }

    /// The merged global value from the most recent barrier. After a barrier
    /// with zero updates anywhere this is the reduction's identity.
    pub fn read(&self) -> OUT {
        ACC::finish(&self.merged.read())
    }
}

impl<A, IN, OUT, ACC> Exchange for Aggregator<A, IN, OUT, ACC>
where
    A: StateType + Serialize + DeserializeOwned,
    IN: 'static,
    OUT: 'static,
    ACC: Accumulator<A, IN, OUT> + 'static,
{
    fn tag(&self) -> u32 {
        self.tag
    }

    fn send(&self, mesh: &Mesh, from: WorkerId) -> Result<(), EngineError> {
        // shipping doubles as the per-round reset, so rounds never double-count
        let partial = std::mem::replace(&mut *self.partial.lock(), ACC::zero());
        let bytes = codec::encode(&partial)?;
        for dest in 0..mesh.workers() {
            mesh.deposit(dest, Packet::new(self.tag, from, bytes.clone()));
        }
        Ok(())
    }

    fn ingest(&self, inbox: Vec<Vec<u8>>) -> Result<(), EngineError> {
        let mut acc = ACC::zero();
        for bytes in inbox {
            let partial: A = codec::decode(&bytes)?;
            ACC::combine(&mut acc, &partial);
        }
        *self.merged.write() = acc;
        Ok(())
    }
}
