//! Send engine: walks a local file or directory tree and emits the message
//! sequence for it, waiting for the peer's acknowledgement after every unit.

use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use tokio::fs;
use tokio::io::{AsyncBufRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{Result, ScpError};
use crate::logger::Logger;
use crate::protocol::copy_buf_len;
use crate::protocol_core::{Channel, Message};
use crate::session::TransferStats;
use crate::url::{join_remote, remote_basename};

/// Send `local` to the peer. The file's wire name is the basename of
/// `remote`; a directory travels under its own local name.
///
/// Reads the peer's initial "ready" response before the first unit.
pub async fn send<R, W>(
    chan: &mut Channel<R, W>,
    local: &Path,
    remote: &str,
    logger: &dyn Logger,
) -> Result<TransferStats>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    let meta = fs::metadata(local).await.map_err(|e| ScpError::fs(local, e))?;
    let mut engine = SendEngine {
        chan,
        logger,
        stats: TransferStats::default(),
    };
    engine.chan.expect_ack().await?;
    if meta.is_dir() {
        engine.send_dir(local.to_path_buf(), remote.to_string()).await?;
    } else {
        engine.send_file(local, remote).await?;
    }
    Ok(engine.stats)
}

struct SendEngine<'a, R, W> {
    chan: &'a mut Channel<R, W>,
    logger: &'a dyn Logger,
    stats: TransferStats,
}

impl<'a, R, W> SendEngine<'a, R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    async fn send_file(&mut self, local: &Path, remote: &str) -> Result<()> {
        let meta = fs::metadata(local).await.map_err(|e| ScpError::fs(local, e))?;
        if !meta.is_file() {
            return Err(ScpError::fs(
                local,
                io::Error::new(io::ErrorKind::InvalidInput, "not a regular file"),
            ));
        }
        let mut file = fs::File::open(local).await.map_err(|e| ScpError::fs(local, e))?;
        let name = wire_name(remote, local)?;
        let size = meta.len();

        self.chan
            .write_message(&Message::FileHeader {
                mode: local_mode(&meta),
                size,
                name,
            })
            .await?;
        self.chan.expect_ack().await?;

        // The byte count is the only delimiter: exactly `size` bytes must follow
        let mut buf = vec![0u8; copy_buf_len(size)];
        let mut remaining = size;
        while remaining > 0 {
            let want = remaining.min(buf.len() as u64) as usize;
            let n = file
                .read(&mut buf[..want])
                .await
                .map_err(|e| ScpError::fs(local, e))?;
            if n == 0 {
                return Err(ScpError::fs(
                    local,
                    io::Error::new(io::ErrorKind::UnexpectedEof, "file shrank during transfer"),
                ));
            }
            self.chan.writer_mut().write_all(&buf[..n]).await?;
            remaining -= n as u64;
        }
        // Trailing status byte, then the receiver confirms it wrote everything
        self.chan.write_ack().await?;
        self.chan.expect_ack().await?;

        self.stats.files += 1;
        self.stats.bytes += size;
        self.logger.file_done(local, remote, size);
        Ok(())
    }

    fn send_dir(
        &mut self,
        local: PathBuf,
        remote: String,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            let meta = fs::metadata(&local).await.map_err(|e| ScpError::fs(&local, e))?;
            let name = dir_name(&local).await?;
            let mut entries = fs::read_dir(&local).await.map_err(|e| ScpError::fs(&local, e))?;

            self.chan
                .write_message(&Message::DirEnter {
                    mode: local_mode(&meta),
                    name,
                })
                .await?;
            self.chan.expect_ack().await?;
            self.stats.dirs += 1;
            self.logger.dir_enter(&local, &remote);

            // Listing order is used as-is
            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|e| ScpError::fs(&local, e))?
            {
                let child = entry.path();
                let child_name = utf8_name(&child)?;
                let child_remote = join_remote(&remote, &child_name);
                let child_meta = fs::metadata(&child).await.map_err(|e| ScpError::fs(&child, e))?;
                if child_meta.is_dir() {
                    self.send_dir(child, child_remote).await?;
                } else {
                    self.send_file(&child, &child_remote).await?;
                }
            }

            self.chan.write_message(&Message::DirExit).await?;
            self.chan.expect_ack().await?;
            Ok(())
        })
    }
}

fn wire_name(remote: &str, local: &Path) -> Result<String> {
    let name = remote_basename(remote);
    if name.is_empty() {
        return utf8_name(local);
    }
    Ok(name.to_string())
}

fn utf8_name(path: &Path) -> Result<String> {
    let name = path.file_name().ok_or_else(|| {
        ScpError::fs(path, io::Error::new(io::ErrorKind::InvalidInput, "path has no file name"))
    })?;
    name.to_str().map(str::to_string).ok_or_else(|| {
        ScpError::fs(path, io::Error::new(io::ErrorKind::InvalidData, "file name is not valid UTF-8"))
    })
}

// `.` and `..` have no file name of their own
async fn dir_name(path: &Path) -> Result<String> {
    if path.file_name().is_some() {
        return utf8_name(path);
    }
    let canonical = fs::canonicalize(path).await.map_err(|e| ScpError::fs(path, e))?;
    utf8_name(&canonical)
}

#[cfg(unix)]
pub(crate) fn local_mode(meta: &std::fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode() & crate::protocol::MODE_MASK
}

#[cfg(not(unix))]
pub(crate) fn local_mode(meta: &std::fs::Metadata) -> u32 {
    use crate::protocol::{FALLBACK_DIR_MODE, FALLBACK_FILE_MODE};
    let mode = if meta.is_dir() { FALLBACK_DIR_MODE } else { FALLBACK_FILE_MODE };
    if meta.permissions().readonly() {
        mode & !0o222
    } else {
        mode
    }
}
