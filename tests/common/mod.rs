#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::future::Future;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncWriteExt, BufReader, DuplexStream};

use rscp::logger::NoopLogger;
use rscp::protocol_core::Channel;
use rscp::recv::receive;
use rscp::remote::{BoxedReader, BoxedWriter, Connector, Pipes, RemoteExec, RemoteShell};
use rscp::send::send;
use rscp::ScpError;

pub type PeerChannel = Channel<BufReader<DuplexStream>, DuplexStream>;

/// Remote host simulated in-process: `-rt`/`-rf` commands are served by this
/// crate's own receive/send engines; `echo`/`fail` stand in for shell commands.
#[derive(Clone, Default)]
pub struct LoopbackConnector {
    pub connects: Arc<AtomicUsize>,
    pub closes: Arc<AtomicUsize>,
    pub commands: Arc<Mutex<Vec<String>>>,
}

impl LoopbackConnector {
    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().clone()
    }
}

#[async_trait]
impl Connector for LoopbackConnector {
    async fn connect(&self) -> rscp::error::Result<Box<dyn RemoteShell>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(LoopbackShell {
            closes: Arc::clone(&self.closes),
            commands: Arc::clone(&self.commands),
        }))
    }
}

struct LoopbackShell {
    closes: Arc<AtomicUsize>,
    commands: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl RemoteShell for LoopbackShell {
    async fn open(&self) -> rscp::error::Result<Box<dyn RemoteExec>> {
        Ok(Box::new(LoopbackExec {
            pipes: Pipes::new(64 * 1024),
            commands: Arc::clone(&self.commands),
        }))
    }

    async fn close(&mut self) -> rscp::error::Result<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct LoopbackExec {
    pipes: Pipes,
    commands: Arc<Mutex<Vec<String>>>,
}

fn unquote(arg: &str) -> String {
    match arg.strip_prefix('\'').and_then(|s| s.strip_suffix('\'')) {
        Some(inner) => inner.replace(r"'\''", "'"),
        None => arg.to_string(),
    }
}

async fn serve(chan: &mut PeerChannel, command: &str) -> rscp::error::Result<()> {
    let mut parts = command.splitn(3, ' ');
    let _binary = parts.next();
    let flag = parts.next().unwrap_or_default();
    let target = unquote(parts.next().unwrap_or_default());
    match flag {
        "-rt" => receive(chan, Path::new(&target), &target, &NoopLogger).await.map(|_| ()),
        "-rf" => send(chan, Path::new(&target), &target, &NoopLogger).await.map(|_| ()),
        other => Err(ScpError::Transport(format!("unsupported flag {}", other))),
    }
}

/// `echo <text>` prints and succeeds; `fail <text>` prints and exits 1.
async fn shell_builtin(out: &mut DuplexStream, command: &str) -> Option<rscp::error::Result<()>> {
    let (text, ok) = if let Some(text) = command.strip_prefix("echo ") {
        (text, true)
    } else if let Some(text) = command.strip_prefix("fail ") {
        (text, false)
    } else {
        return None;
    };
    let written = out.write_all(format!("{}\n", text).as_bytes()).await;
    let _ = out.shutdown().await;
    Some(match (written, ok) {
        (Err(e), _) => Err(e.into()),
        (Ok(()), true) => Ok(()),
        (Ok(()), false) => Err(ScpError::Transport("exit status 1".into())),
    })
}

#[async_trait]
impl RemoteExec for LoopbackExec {
    fn input_stream(&mut self) -> rscp::error::Result<BoxedWriter> {
        self.pipes.take_input()
    }

    fn output_stream(&mut self) -> rscp::error::Result<BoxedReader> {
        self.pipes.take_output()
    }

    async fn run(&mut self, command: &str) -> rscp::error::Result<()> {
        self.commands.lock().push(command.to_string());
        let (from_local, mut to_local) = self.pipes.take_remote()?;
        if let Some(result) = shell_builtin(&mut to_local, command).await {
            return result;
        }
        let mut chan = Channel::new(BufReader::new(from_local), to_local);
        let result = serve(&mut chan, command).await;
        if let Err(e) = &result {
            let _ = chan.write_error(&format!("scp: {}", e), true).await;
        }
        let _ = chan.shutdown().await;
        result.map_err(|_| ScpError::Transport("exit status 1".into()))
    }

    async fn close(&mut self) -> rscp::error::Result<()> {
        self.pipes.release();
        Ok(())
    }
}

pub type Script = Box<dyn FnOnce(PeerChannel) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send>;

/// One remote execution whose peer behaviour is a test-supplied script.
/// The script owns the remote ends; dropping them is the remote's end-of-output.
pub struct ScriptedExec {
    pipes: Pipes,
    script: Option<Script>,
    exit: Option<String>,
    pub closes: Arc<AtomicUsize>,
}

impl ScriptedExec {
    pub fn new<F, Fut>(script: F) -> Self
    where
        F: FnOnce(PeerChannel) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self {
            pipes: Pipes::new(64 * 1024),
            script: Some(Box::new(
                move |chan| -> Pin<Box<dyn Future<Output = ()> + Send>> { Box::pin(script(chan)) },
            )),
            exit: None,
            closes: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Make `run` fail with this transport error once the script finishes.
    pub fn exit_with(mut self, message: &str) -> Self {
        self.exit = Some(message.to_string());
        self
    }
}

#[async_trait]
impl RemoteExec for ScriptedExec {
    fn input_stream(&mut self) -> rscp::error::Result<BoxedWriter> {
        self.pipes.take_input()
    }

    fn output_stream(&mut self) -> rscp::error::Result<BoxedReader> {
        self.pipes.take_output()
    }

    async fn run(&mut self, _command: &str) -> rscp::error::Result<()> {
        let (from_local, to_local) = self.pipes.take_remote()?;
        if let Some(script) = self.script.take() {
            script(Channel::new(BufReader::new(from_local), to_local)).await;
        }
        match &self.exit {
            Some(message) => Err(ScpError::Transport(message.clone())),
            None => Ok(()),
        }
    }

    async fn close(&mut self) -> rscp::error::Result<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        self.pipes.release();
        Ok(())
    }
}

pub fn write_file(path: &Path, content: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut f = std::fs::File::create(path)?;
    f.write_all(content)?;
    Ok(())
}

/// Deterministic, non-text payload of `size` bytes.
pub fn pattern(size: usize, seed: u8) -> Vec<u8> {
    let mut val = seed;
    (0..size)
        .map(|_| {
            val = val.wrapping_mul(31).wrapping_add(7);
            val
        })
        .collect()
}

#[cfg(unix)]
pub fn set_mode(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))?;
    Ok(())
}

#[cfg(unix)]
pub fn mode_of(path: &Path) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path).map(|m| m.permissions().mode() & 0o7777).unwrap_or(0)
}

/// Relative paths of every entry under `root`, with file contents.
pub fn snapshot(root: &Path) -> Vec<(PathBuf, Option<Vec<u8>>)> {
    let mut out: Vec<_> = walkdir::WalkDir::new(root)
        .min_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .map(|e| {
            let rel = e.path().strip_prefix(root).unwrap().to_path_buf();
            let content = if e.file_type().is_file() {
                Some(std::fs::read(e.path()).unwrap())
            } else {
                None
            };
            (rel, content)
        })
        .collect();
    out.sort();
    out
}

/// Close our write half once the script is done talking.
pub async fn hang_up(chan: PeerChannel) {
    let (_, mut writer) = chan.into_inner();
    let _ = writer.shutdown().await;
}
