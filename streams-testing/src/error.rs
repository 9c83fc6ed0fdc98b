//! Errors raised by the mocks when a failure is injected.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, TestingError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TestingError {
    #[error("Injected commit failure: {0}")]
    Commit(String),

    #[error("Injected producer failure: {0}")]
    Producer(String),

    #[error("Injected restore failure: {0}")]
    Restore(String),

    #[error("Injected state store failure: {0}")]
    StateStore(String),

    #[error("Injected processor failure: {0}")]
    Processor(String),
}

impl From<TestingError> for streams_core::Error {
    fn from(err: TestingError) -> Self {
        match err {
            TestingError::Commit(_) => streams_core::Error::Commit(err.to_string()),
            TestingError::Producer(_) => streams_core::Error::Producer(err.to_string()),
            TestingError::Restore(_) | TestingError::StateStore(_) => {
                streams_core::Error::StateStore(err.to_string())
            }
            TestingError::Processor(_) => streams_core::Error::Processor(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversion_into_core_error() {
        let err: streams_core::Error = TestingError::Commit("offsets".to_string()).into();
        assert_eq!(
            err,
            streams_core::Error::Commit("Injected commit failure: offsets".to_string())
        );

        let err: streams_core::Error = TestingError::Restore("changelog".to_string()).into();
        assert!(matches!(err, streams_core::Error::StateStore(_)));

        let err: streams_core::Error = TestingError::Processor("count".to_string()).into();
        assert!(matches!(err, streams_core::Error::Processor(_)));
    }
}
