//! Binary codec for everything that crosses a worker boundary: vertex
//! records, message batches, aggregator partials. The format is internal to
//! one job run; encode order must exactly match decode order, nothing more.

use serde::{de::DeserializeOwned, Serialize};

use crate::errors::EngineError;

pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, EngineError> {
    Ok(bincode::serialize(value)?)
}

pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, EngineError> {
    Ok(bincode::deserialize(bytes)?)
}
