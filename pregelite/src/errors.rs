use std::path::PathBuf;

#[derive(thiserror::Error, Debug)]
pub enum EngineError {
    #[error("Missing required job parameter '{0}'")]
    MissingParameter(String),

    #[error("Invalid value '{value}' for job parameter '{name}'")]
    InvalidParameter { name: String, value: String },

    #[error("Worker topology must contain at least one worker")]
    EmptyTopology,

    #[error("Bincode operation failed")]
    BinCode {
        #[from]
        source: Box<bincode::ErrorKind>,
    },

    #[error("IO operation failed")]
    IO {
        #[from]
        source: std::io::Error,
    },

    #[error("Failed to open input file {path}")]
    InputNotFound {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Job deadline exceeded while waiting at the superstep barrier")]
    DeadlineExceeded,

    #[error("Job aborted after worker {0} failed")]
    WorkerFailed(usize),

    #[error("globalize is only valid before the first superstep (worker is at superstep {0})")]
    GlobalizeAfterRun(usize),
}
