//! Error taxonomy shared by the codec, the engines and the session coordinator.

use std::io;
use std::path::PathBuf;

/// Coarse classification of a failure, independent of its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Transport,
    Protocol,
    Filesystem,
    RemoteRejection,
}

#[derive(Debug, thiserror::Error)]
pub enum ScpError {
    /// The secure channel or the remote execution failed.
    #[error("{0}")]
    Transport(String),

    /// Reading from or writing to the channel's streams failed.
    #[error("channel i/o: {0}")]
    Channel(#[source] io::Error),

    /// The peer closed its stream while a message was expected.
    #[error("unexpected end of stream")]
    UnexpectedEof,

    /// Malformed or out-of-sequence message.
    #[error("{0}")]
    Protocol(String),

    /// Local stat/open/create/write failure.
    #[error("{}: {source}", path.display())]
    Filesystem {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A plain remote command failed; `output` is what it printed before exiting.
    #[error("{message}")]
    CommandFailed { message: String, output: String },

    /// The peer answered with an error response; the text is its own diagnosis.
    #[error("{message}")]
    RemoteRejection { message: String, fatal: bool },
}

impl ScpError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Transport(_) | Self::Channel(_) | Self::UnexpectedEof | Self::CommandFailed { .. } => {
                ErrorKind::Transport
            }
            Self::Protocol(_) => ErrorKind::Protocol,
            Self::Filesystem { .. } => ErrorKind::Filesystem,
            Self::RemoteRejection { .. } => ErrorKind::RemoteRejection,
        }
    }

    pub(crate) fn fs(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Filesystem {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }
}

impl From<io::Error> for ScpError {
    fn from(e: io::Error) -> Self {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            Self::UnexpectedEof
        } else {
            Self::Channel(e)
        }
    }
}

pub type Result<T, E = ScpError> = std::result::Result<T, E>;
