pub mod agg;
pub mod aggregator;
pub mod channel;
pub mod codec;
pub mod partition;
pub mod store;
pub mod vertex;

pub trait StateType: PartialEq + Clone + std::fmt::Debug + Send + Sync + 'static {}

impl<T: PartialEq + Clone + std::fmt::Debug + Send + Sync + 'static> StateType for T {}
