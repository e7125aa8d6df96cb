use std::{str::FromStr, time::Duration};

use rustc_hash::FxHashMap;
use tracing::warn;

use crate::errors::EngineError;

/// Everything a job is parameterised with: the worker count, an optional
/// job-wide deadline, and named string parameters the algorithm reads
/// (`input`, `iters`, hyperparameters, ...). Missing parameters fail fast,
/// before any worker starts.
#[derive(Debug, Clone)]
pub struct JobConfig {
    workers: usize,
    deadline: Option<Duration>,
    params: FxHashMap<String, String>,
}

impl JobConfig {
    pub fn new(workers: usize) -> Self {
        Self {
            workers,
            deadline: None,
            params: FxHashMap::default(),
        }
    }

    /// Builds a config from `key=value` tokens (typically
    /// `std::env::args().skip(1)`). The reserved key `workers` sets the
    /// worker count, defaulting to the available parallelism. Fails fast if
    /// any `required` parameter is absent.
    pub fn from_args<I>(args: I, required: &[&str]) -> Result<Self, EngineError>
    where
        I: IntoIterator<Item = String>,
    {
        let mut params: FxHashMap<String, String> = FxHashMap::default();
        for arg in args {
            match arg.split_once('=') {
                Some((key, value)) => {
                    params.insert(key.to_string(), value.to_string());
                }
                None => warn!(arg = %arg, "ignoring argument without '=' separator"),
            }
        }

        let workers = match params.remove("workers") {
            Some(value) => {
                value
                    .parse::<usize>()
                    .ok()
                    .filter(|&n| n > 0)
                    .ok_or(EngineError::InvalidParameter {
                        name: "workers".to_string(),
                        value,
                    })?
            }
            None => std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
        };

        let config = Self {
            workers,
            deadline: None,
            params,
        };
        config.require(required)?;
        Ok(config)
    }

    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    /// A job-wide deadline. On expiry every worker blocked at the barrier
    /// fails with [`EngineError::DeadlineExceeded`] instead of waiting on a
    /// peer that will never arrive.
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub(crate) fn deadline(&self) -> Option<Duration> {
        self.deadline
    }

    pub fn require(&self, names: &[&str]) -> Result<(), EngineError> {
        for name in names {
            if !self.params.contains_key(*name) {
                return Err(EngineError::MissingParameter(name.to_string()));
            }
        }
        Ok(())
    }

    pub fn param(&self, name: &str) -> Result<&str, EngineError> {
        self.params
            .get(name)
            .map(String::as_str)
            .ok_or_else(|| EngineError::MissingParameter(name.to_string()))
    }

    pub fn parsed_param<T: FromStr>(&self, name: &str) -> Result<T, EngineError> {
        let raw = self.param(name)?;
        raw.parse().map_err(|_| EngineError::InvalidParameter {
            name: name.to_string(),
            value: raw.to_string(),
        })
    }
}
