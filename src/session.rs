//! Duplex session coordinator.
//!
//! One session owns one remote-execution handle. It runs two units of work
//! concurrently and joins them at a single point:
//!
//! * the remote invocation (`<binary> -rt <dir>` or `<binary> -rf <path>`),
//!   which completes when the remote process exits;
//! * the local stream pump, which runs the send or receive engine over the
//!   handle's streams and always closes the input stream when it finishes so
//!   the remote side observes end-of-input.
//!
//! A local failure wins over a remote one: the protocol-level diagnosis is
//! more specific than an exit status. When the local side succeeded the
//! remote outcome is returned. The handle is closed on every exit path.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};

use crate::error::{Result, ScpError};
use crate::logger::Logger;
use crate::protocol_core::Channel;
use crate::recv::receive;
use crate::remote::{BoxedReader, BoxedWriter, RemoteExec};
use crate::send::send;
use crate::url::{join_remote, remote_parent};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Upload,
    Download,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Upload => f.write_str("upload"),
            Direction::Download => f.write_str("download"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransferStats {
    pub files: u64,
    pub dirs: u64,
    pub bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    pub local: PathBuf,
    pub remote: String,
    pub direction: Direction,
}

impl TransferRequest {
    /// A remote path ending in `/` names the target directory; the local
    /// name is kept.
    pub fn upload(local: impl AsRef<Path>, remote: &str) -> Self {
        let local = local.as_ref().to_path_buf();
        let remote = match local.file_name().and_then(|n| n.to_str()) {
            Some(name) if remote.ends_with('/') => join_remote(remote, name),
            _ => remote.to_string(),
        };
        Self {
            local,
            remote,
            direction: Direction::Upload,
        }
    }

    pub fn download(remote: &str, local: impl AsRef<Path>) -> Self {
        Self {
            local: local.as_ref().to_path_buf(),
            remote: remote.to_string(),
            direction: Direction::Download,
        }
    }

    /// Command line started on the remote host for this request.
    pub fn remote_command(&self, remote_binary: &str) -> String {
        match self.direction {
            Direction::Upload => format!(
                "{} -rt {}",
                remote_binary,
                shell_quote(&remote_parent(&self.remote))
            ),
            Direction::Download => {
                format!("{} -rf {}", remote_binary, shell_quote(&self.remote))
            }
        }
    }
}

/// Quote for a POSIX shell, leaving ordinary paths untouched.
pub fn shell_quote(s: &str) -> String {
    let plain = !s.is_empty()
        && s.bytes()
            .all(|b| b.is_ascii_alphanumeric() || b"_./,:@%+=-".contains(&b));
    if plain {
        s.to_string()
    } else {
        format!("'{}'", s.replace('\'', r"'\''"))
    }
}

pub struct DuplexSession {
    exec: Box<dyn RemoteExec>,
    logger: Arc<dyn Logger>,
}

impl DuplexSession {
    pub fn new(exec: Box<dyn RemoteExec>, logger: Arc<dyn Logger>) -> Self {
        Self { exec, logger }
    }

    /// Perform the transfer and release the handle.
    pub async fn run(mut self, request: &TransferRequest, remote_binary: &str) -> Result<TransferStats> {
        let command = request.remote_command(remote_binary);
        let result = self.drive(request, &command).await;
        if let Err(e) = self.exec.close().await {
            self.logger.error("close", &request.local, &e.to_string());
        }
        result
    }

    async fn drive(&mut self, request: &TransferRequest, command: &str) -> Result<TransferStats> {
        let input = self.exec.input_stream()?;
        let output = self.exec.output_stream()?;
        let logger: &dyn Logger = self.logger.as_ref();

        let local = pump(request, input, output, logger);
        let remote = self.exec.run(command);
        let (local_res, remote_res) = tokio::join!(local, remote);
        merge_outcomes(local_res, remote_res)
    }

    /// Run `command` with no input and collect its standard output. On a
    /// failed run the output gathered so far travels in
    /// [`ScpError::CommandFailed`].
    pub async fn capture(mut self, command: &str) -> Result<String> {
        let result = self.capture_inner(command).await;
        let _ = self.exec.close().await;
        result
    }

    async fn capture_inner(&mut self, command: &str) -> Result<String> {
        let mut input = self.exec.input_stream()?;
        let mut output = self.exec.output_stream()?;
        let _ = input.shutdown().await;
        drop(input);

        let mut buf = Vec::new();
        let (read_res, run_res) = tokio::join!(output.read_to_end(&mut buf), self.exec.run(command));
        let output = String::from_utf8_lossy(&buf).into_owned();
        match run_res {
            Err(e) => Err(ScpError::CommandFailed {
                message: e.to_string(),
                output,
            }),
            Ok(()) => {
                read_res?;
                Ok(output)
            }
        }
    }
}

/// The local engine's failure takes priority; otherwise the remote outcome.
pub fn merge_outcomes<T>(local: Result<T>, remote: Result<()>) -> Result<T> {
    let value = local?;
    remote?;
    Ok(value)
}

async fn pump(
    request: &TransferRequest,
    input: BoxedWriter,
    output: BoxedReader,
    logger: &dyn Logger,
) -> Result<TransferStats> {
    let mut chan = Channel::new(BufReader::new(output), input);
    let result = match request.direction {
        Direction::Upload => send(&mut chan, &request.local, &request.remote, logger).await,
        Direction::Download => receive(&mut chan, &request.local, &request.remote, logger).await,
    };
    // Exactly once, on every path: lets the remote process see end-of-input
    let _ = chan.shutdown().await;
    result
}
