use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("Deserialization Error - {0}")]
    Deserialization(String),

    #[error("Serialization Error - {0}")]
    Serialization(String),

    /// Raised by a user-defined stage while processing, punctuating or closing.
    #[error("Processor Error - {0}")]
    Processor(String),

    /// Misuse of the task by a collaborator, e.g. forwarding with no active stage.
    #[error("Illegal State - {0}")]
    IllegalState(String),

    #[error("Commit Error - {0}")]
    Commit(String),

    #[error("Producer Error - {0}")]
    Producer(String),

    #[error("State Store Error - {0}")]
    StateStore(String),

    #[error("IO Error - {0}")]
    Io(String),

    #[error("Config Error - {0}")]
    Config(String),

    #[error("Topology Error - {0}")]
    Topology(String),
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Deserialization(err.to_string())
    }
}
