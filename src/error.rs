use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by moordns.
///
/// Only [`Error::Startup`] escapes the synchronization engine; every other
/// condition is absorbed internally and shows up in logs and cache state.
#[derive(Debug, Error)]
pub enum Error {
    /// The initial container listing failed, so no engine could be built.
    #[error("container runtime unreachable at startup: {0}")]
    Startup(String),

    /// A container runtime API call (list, inspect, subscribe) failed.
    #[error("container runtime error: {0}")]
    Runtime(String),

    /// The event stream reported a transport error or ended.
    #[error("event stream disrupted: {0}")]
    Stream(String),

    /// A container name was not in the runtime's `/name` path form.
    #[error("malformed container name: {0:?}")]
    ContainerName(String),

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The DNS server failed.
    #[error("DNS server error: {0}")]
    Server(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn runtime(msg: impl Into<String>) -> Self {
        Self::Runtime(msg.into())
    }

    pub fn stream(msg: impl Into<String>) -> Self {
        Self::Stream(msg.into())
    }
}

impl From<bollard::errors::Error> for Error {
    fn from(err: bollard::errors::Error) -> Self {
        Self::Runtime(err.to_string())
    }
}
