//! Remote-execution collaborator interface.
//!
//! A [`Connector`] establishes the secure channel once and yields a
//! [`RemoteShell`]; each transfer opens one [`RemoteExec`] handle from it.
//! The handle hands out its input/output streams *before* the command is run,
//! so the local protocol engine and the remote invocation can proceed
//! concurrently against the same pair of streams.

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite, DuplexStream};

use crate::error::{Result, ScpError};

pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// One invocation of a remote command with attached byte streams.
#[async_trait]
pub trait RemoteExec: Send {
    /// Writer attached to the remote process's input. Closing it signals
    /// end-of-input. May be taken once.
    fn input_stream(&mut self) -> Result<BoxedWriter>;

    /// Reader attached to the remote process's output. May be taken once.
    fn output_stream(&mut self) -> Result<BoxedReader>;

    /// Run `command` and block until it exits. Non-zero exit is an error.
    async fn run(&mut self, command: &str) -> Result<()>;

    /// Release the handle. Safe to call more than once, and after failures.
    async fn close(&mut self) -> Result<()>;
}

/// An established secure channel able to start remote commands.
#[async_trait]
pub trait RemoteShell: Send + Sync {
    async fn open(&self) -> Result<Box<dyn RemoteExec>>;

    async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn RemoteShell>>;
}

/// In-memory pipes fronting a remote process's stdio.
///
/// The local ends are what a transfer reads and writes; the remote ends are
/// what the execution pumps into and out of the actual process.
pub struct Pipes {
    local_input: Option<DuplexStream>,
    local_output: Option<DuplexStream>,
    remote: Option<(DuplexStream, DuplexStream)>,
}

impl Pipes {
    pub fn new(capacity: usize) -> Self {
        let (local_input, remote_input) = tokio::io::duplex(capacity);
        let (local_output, remote_output) = tokio::io::duplex(capacity);
        Self {
            local_input: Some(local_input),
            local_output: Some(local_output),
            remote: Some((remote_input, remote_output)),
        }
    }

    pub fn take_input(&mut self) -> Result<BoxedWriter> {
        let s = self
            .local_input
            .take()
            .ok_or_else(|| ScpError::Transport("input stream already taken".into()))?;
        Ok(Box::new(s))
    }

    pub fn take_output(&mut self) -> Result<BoxedReader> {
        let s = self
            .local_output
            .take()
            .ok_or_else(|| ScpError::Transport("output stream already taken".into()))?;
        Ok(Box::new(s))
    }

    /// Returns `(reads_local_input, writes_local_output)`.
    pub fn take_remote(&mut self) -> Result<(DuplexStream, DuplexStream)> {
        self.remote
            .take()
            .ok_or_else(|| ScpError::Transport("remote command already started".into()))
    }

    /// Drop every end still held; peers observe end-of-stream.
    pub fn release(&mut self) {
        self.local_input = None;
        self.local_output = None;
        self.remote = None;
    }
}
