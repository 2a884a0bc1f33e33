//! Remote execution through the system OpenSSH client.
//!
//! Authentication, host-key checks and channel encryption are all left to
//! `ssh`; this module only builds its argument vector, optionally keeps a
//! multiplexing master alive, and pumps a child's stdio through in-memory
//! pipes so the streams exist before the command is started.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;

use crate::config::ClientConfig;
use crate::error::{Result, ScpError};
use crate::protocol::PIPE_CAPACITY;
use crate::remote::{BoxedReader, BoxedWriter, Connector, Pipes, RemoteExec, RemoteShell};

pub struct SshConnector {
    config: ClientConfig,
}

impl SshConnector {
    pub fn new(config: ClientConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Connector for SshConnector {
    async fn connect(&self) -> Result<Box<dyn RemoteShell>> {
        if self.config.host.trim().is_empty() {
            return Err(ScpError::Transport("no remote host configured".into()));
        }
        let mut shell = SshShell::new(&self.config);
        if self.config.control_master {
            shell.start_master().await?;
        }
        Ok(Box::new(shell))
    }
}

/// Options common to every ssh invocation for this host.
pub fn ssh_args(config: &ClientConfig) -> Vec<String> {
    let mut args = vec![
        "-x".to_string(),
        "-T".to_string(),
        "-p".to_string(),
        config.port.to_string(),
        "-o".to_string(),
        format!("ConnectTimeout={}", config.connect_timeout_secs),
        "-o".to_string(),
        "ForwardAgent=no".to_string(),
        "-o".to_string(),
        "ClearAllForwardings=yes".to_string(),
    ];
    if config.batch_mode {
        args.push("-o".to_string());
        args.push("BatchMode=yes".to_string());
    }
    if let Some(user) = &config.user {
        args.push("-l".to_string());
        args.push(user.clone());
    }
    if let Some(identity) = &config.identity_file {
        args.push("-i".to_string());
        args.push(identity.display().to_string());
    }
    for opt in &config.ssh_options {
        args.push("-o".to_string());
        args.push(opt.clone());
    }
    args
}

pub struct SshShell {
    program: String,
    args: Vec<String>,
    destination: String,
    control: Option<PathBuf>,
}

impl SshShell {
    fn new(config: &ClientConfig) -> Self {
        Self {
            program: config.ssh_program.clone(),
            args: ssh_args(config),
            destination: config.host.clone(),
            control: None,
        }
    }

    fn exec_args(&self) -> Vec<String> {
        let mut args = self.args.clone();
        if let Some(sock) = &self.control {
            args.push("-S".to_string());
            args.push(sock.display().to_string());
        }
        args
    }

    /// Authenticate once; later invocations ride on the master's socket.
    async fn start_master(&mut self) -> Result<()> {
        let sock = std::env::temp_dir().join(format!("rscp-{}.sock", uuid::Uuid::new_v4().simple()));
        let status = Command::new(&self.program)
            .args(&self.args)
            .arg("-M")
            .arg("-S")
            .arg(&sock)
            .args(["-o", "ControlPersist=yes", "-N", "-f"])
            .arg(&self.destination)
            .stdin(Stdio::null())
            .status()
            .await
            .map_err(|e| ScpError::Transport(format!("failed to spawn {}: {}", self.program, e)))?;
        if !status.success() {
            return Err(ScpError::Transport(format!(
                "ssh connection to {} failed: {}",
                self.destination, status
            )));
        }
        self.control = Some(sock);
        Ok(())
    }
}

#[async_trait]
impl RemoteShell for SshShell {
    async fn open(&self) -> Result<Box<dyn RemoteExec>> {
        Ok(Box::new(SshExec {
            program: self.program.clone(),
            args: self.exec_args(),
            destination: self.destination.clone(),
            pipes: Pipes::new(PIPE_CAPACITY),
        }))
    }

    async fn close(&mut self) -> Result<()> {
        let Some(sock) = self.control.take() else {
            return Ok(());
        };
        let status = Command::new(&self.program)
            .arg("-S")
            .arg(&sock)
            .args(["-O", "exit"])
            .arg(&self.destination)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;
        let _ = tokio::fs::remove_file(&sock).await;
        match status {
            Ok(s) if s.success() => Ok(()),
            Ok(s) => Err(ScpError::Transport(format!("closing ssh master: {}", s))),
            Err(e) => Err(ScpError::Transport(format!("closing ssh master: {}", e))),
        }
    }
}

pub struct SshExec {
    program: String,
    args: Vec<String>,
    destination: String,
    pipes: Pipes,
}

#[async_trait]
impl RemoteExec for SshExec {
    fn input_stream(&mut self) -> Result<BoxedWriter> {
        self.pipes.take_input()
    }

    fn output_stream(&mut self) -> Result<BoxedReader> {
        self.pipes.take_output()
    }

    async fn run(&mut self, command: &str) -> Result<()> {
        let (mut from_local, mut to_local) = self.pipes.take_remote()?;
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .arg(&self.destination)
            .arg(command)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ScpError::Transport(format!("failed to spawn {}: {}", self.program, e)))?;

        let missing = || ScpError::Transport("child stdio not captured".into());
        let mut stdin = child.stdin.take().ok_or_else(missing)?;
        let mut stdout = child.stdout.take().ok_or_else(missing)?;
        let mut stderr = child.stderr.take().ok_or_else(missing)?;

        let feed = async move {
            let res = tokio::io::copy(&mut from_local, &mut stdin).await;
            // Dropping stdin is the remote process's end-of-input
            drop(stdin);
            res
        };
        let drain = async move {
            let res = tokio::io::copy(&mut stdout, &mut to_local).await;
            if res.is_err() {
                // Local side went away; keep reading so the child can exit
                let _ = tokio::io::copy(&mut stdout, &mut tokio::io::sink()).await;
            }
            let _ = to_local.shutdown().await;
            res
        };
        let diagnostics = async move {
            let mut buf = Vec::new();
            let _ = stderr.read_to_end(&mut buf).await;
            buf
        };

        let (fed, _drained, err_text) = tokio::join!(feed, drain, diagnostics);
        let status = child
            .wait()
            .await
            .map_err(|e| ScpError::Transport(format!("waiting for {}: {}", self.program, e)))?;

        if !status.success() {
            let reason = match status.code() {
                Some(code) => format!("exit status {}", code),
                None => "terminated by signal".to_string(),
            };
            let detail = String::from_utf8_lossy(&err_text);
            let detail = detail.lines().map(str::trim).find(|l| !l.is_empty());
            return Err(ScpError::Transport(match detail {
                Some(d) => format!("{}: {}", reason, d),
                None => reason,
            }));
        }
        match fed {
            Err(e) if e.kind() != std::io::ErrorKind::BrokenPipe => Err(ScpError::Channel(e)),
            _ => Ok(()),
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.pipes.release();
        Ok(())
    }
}
