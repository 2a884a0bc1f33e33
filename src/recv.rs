//! Receive engine: reads the message sequence, materializes files and
//! directories locally and acknowledges every unit. Nested directories are
//! handled by recursion; each frame owns the paths for its level.

use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use tokio::fs;
use tokio::io::{AsyncBufRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{Result, ScpError};
use crate::logger::Logger;
use crate::protocol::{copy_buf_len, MODE_MASK};
use crate::protocol_core::{validate_entry_name, Channel, Message};
use crate::session::TransferStats;
use crate::url::join_remote;

/// Outcome of reading one entry at a given directory level.
enum Step {
    Entry,
    EndOfDirectory,
}

/// Where an incoming entry lands.
#[derive(Clone)]
enum Dest {
    /// `dir/name`
    Inside(PathBuf),
    /// Exactly this path, whatever the entry is called on the wire.
    At(PathBuf),
}

impl Dest {
    fn resolve(&self, name: &str) -> PathBuf {
        match self {
            Dest::Inside(dir) => dir.join(name),
            Dest::At(path) => path.clone(),
        }
    }
}

/// Signal readiness, then receive one root entry (file or directory tree).
///
/// If `local` is an existing directory the entry is created inside it;
/// otherwise the entry is created at `local` itself.
pub async fn receive<R, W>(
    chan: &mut Channel<R, W>,
    local: &Path,
    remote: &str,
    logger: &dyn Logger,
) -> Result<TransferStats>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    chan.write_ack().await?;

    let dest = match fs::metadata(local).await {
        Ok(meta) if meta.is_dir() => Dest::Inside(local.to_path_buf()),
        _ => Dest::At(local.to_path_buf()),
    };
    let remote_dir = crate::url::remote_parent(remote.trim_end_matches('/'));
    let mut engine = RecvEngine {
        chan,
        logger,
        stats: TransferStats::default(),
    };
    match engine.recv_entry(dest, remote_dir).await? {
        Step::Entry => Ok(engine.stats),
        Step::EndOfDirectory => Err(ScpError::protocol(
            "directory exit without a matching directory entry",
        )),
    }
}

struct RecvEngine<'a, R, W> {
    chan: &'a mut Channel<R, W>,
    logger: &'a dyn Logger,
    stats: TransferStats,
}

impl<'a, R, W> RecvEngine<'a, R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    async fn recv_entry(&mut self, dest: Dest, remote_dir: String) -> Result<Step> {
        match self.chan.read_message().await? {
            Message::FileHeader { mode, size, name } => {
                self.check_name(&name).await?;
                let path = dest.resolve(&name);
                let remote = join_remote(&remote_dir, &name);
                self.recv_file(&path, mode, size, &remote).await?;
                Ok(Step::Entry)
            }
            Message::DirEnter { mode, name } => {
                self.check_name(&name).await?;
                let path = dest.resolve(&name);
                let remote = join_remote(&remote_dir, &name);
                self.recv_dir(path, mode, remote).await?;
                Ok(Step::Entry)
            }
            // Acknowledged by the frame that entered the directory
            Message::DirExit => Ok(Step::EndOfDirectory),
            Message::Err { message, fatal } => Err(ScpError::RemoteRejection { message, fatal }),
            Message::Ack => Err(ScpError::protocol("unexpected acknowledgement")),
        }
    }

    async fn recv_file(&mut self, path: &Path, mode: u32, size: u64, remote: &str) -> Result<()> {
        let mut file = match create_file(path, mode).await {
            Ok(f) => f,
            Err(e) => return Err(self.notify(e).await),
        };
        self.chan.write_ack().await?;

        let mut buf = vec![0u8; copy_buf_len(size)];
        let mut remaining = size;
        while remaining > 0 {
            let want = remaining.min(buf.len() as u64) as usize;
            let n = match self.chan.reader_mut().read(&mut buf[..want]).await {
                Ok(0) => return Err(self.notify(ScpError::UnexpectedEof).await),
                Ok(n) => n,
                Err(e) => return Err(self.notify(e.into()).await),
            };
            if let Err(e) = file.write_all(&buf[..n]).await {
                return Err(self.notify(ScpError::fs(path, e)).await);
            }
            remaining -= n as u64;
        }
        if let Err(e) = file.flush().await {
            return Err(self.notify(ScpError::fs(path, e)).await);
        }
        drop(file);
        if let Err(e) = apply_mode(path, mode).await {
            return Err(self.notify(e).await);
        }

        match self.chan.read_message().await {
            Ok(Message::Ack) => {}
            Ok(Message::Err { message, fatal }) => {
                return Err(ScpError::RemoteRejection { message, fatal });
            }
            Ok(other) => {
                let e = ScpError::protocol(format!(
                    "expected end of file data, got {}",
                    other.label()
                ));
                return Err(self.notify(e).await);
            }
            Err(e) => return Err(self.notify(e).await),
        }
        self.chan.write_ack().await?;

        self.stats.files += 1;
        self.stats.bytes += size;
        self.logger.file_done(path, remote, size);
        Ok(())
    }

    fn recv_dir(
        &mut self,
        path: PathBuf,
        mode: u32,
        remote: String,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            if let Err(e) = create_dir(&path, mode).await {
                return Err(self.notify(e).await);
            }
            self.chan.write_ack().await?;
            self.stats.dirs += 1;
            self.logger.dir_enter(&path, &remote);

            loop {
                match self.recv_entry(Dest::Inside(path.clone()), remote.clone()).await? {
                    Step::Entry => continue,
                    Step::EndOfDirectory => break,
                }
            }

            // Applied last so a read-only directory can still be populated
            if let Err(e) = apply_mode(&path, mode).await {
                return Err(self.notify(e).await);
            }
            self.chan.write_ack().await
        })
    }

    async fn check_name(&mut self, name: &str) -> Result<()> {
        match validate_entry_name(name) {
            Ok(()) => Ok(()),
            Err(e) => Err(self.notify(e).await),
        }
    }

    /// Tell the peer why this side is giving up, then hand the error back.
    /// A failed notification never replaces the local error.
    async fn notify(&mut self, err: ScpError) -> ScpError {
        let _ = self.chan.write_error(&err.to_string(), true).await;
        err
    }
}

async fn create_file(path: &Path, mode: u32) -> Result<fs::File> {
    let mut opts = fs::OpenOptions::new();
    opts.write(true).create(true).truncate(true);
    #[cfg(unix)]
    opts.mode(mode & MODE_MASK);
    #[cfg(not(unix))]
    let _ = mode;
    opts.open(path).await.map_err(|e| ScpError::fs(path, e))
}

async fn create_dir(path: &Path, mode: u32) -> Result<()> {
    if let Ok(meta) = fs::metadata(path).await {
        if meta.is_dir() {
            return Ok(());
        }
        return Err(ScpError::fs(
            path,
            io::Error::new(io::ErrorKind::AlreadyExists, "exists and is not a directory"),
        ));
    }
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    // Owner access is needed while children are written
    #[cfg(unix)]
    builder.mode((mode & MODE_MASK) | 0o700);
    #[cfg(not(unix))]
    let _ = mode;
    builder.create(path).await.map_err(|e| ScpError::fs(path, e))
}

#[cfg(unix)]
async fn apply_mode(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, std::fs::Permissions::from_mode(mode & MODE_MASK))
        .await
        .map_err(|e| ScpError::fs(path, e))
}

#[cfg(not(unix))]
async fn apply_mode(path: &Path, mode: u32) -> Result<()> {
    let mut perms = fs::metadata(path)
        .await
        .map_err(|e| ScpError::fs(path, e))?
        .permissions();
    perms.set_readonly(mode & 0o200 == 0);
    fs::set_permissions(path, perms)
        .await
        .map_err(|e| ScpError::fs(path, e))
}
