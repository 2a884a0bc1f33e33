//! Message codec for the scp wire protocol.
//!
//! Five message shapes travel over the duplex stream: file headers (`C`),
//! directory entry (`D`), directory exit (`E`), acknowledgements (`0x00`) and
//! error responses (`0x01` warning, `0x02` fatal). Control lines are
//! newline-terminated text; a file header is followed by exactly `size`
//! raw payload bytes, which the engines copy themselves.

use crate::error::{Result, ScpError};
use crate::protocol::{response, tag, MAX_LINE_LEN, MODE_MASK};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    FileHeader { mode: u32, size: u64, name: String },
    DirEnter { mode: u32, name: String },
    DirExit,
    Ack,
    Err { message: String, fatal: bool },
}

impl Message {
    /// Short label used in diagnostics.
    pub fn label(&self) -> &'static str {
        match self {
            Self::FileHeader { .. } => "file header",
            Self::DirEnter { .. } => "directory entry",
            Self::DirExit => "directory exit",
            Self::Ack => "acknowledgement",
            Self::Err { .. } => "error response",
        }
    }
}

/// Serialize one message to its wire bytes.
pub fn encode(msg: &Message) -> Vec<u8> {
    match msg {
        Message::FileHeader { mode, size, name } => {
            format!("C{:04o} {} {}\n", mode & MODE_MASK, size, name).into_bytes()
        }
        Message::DirEnter { mode, name } => {
            format!("D{:04o} 0 {}\n", mode & MODE_MASK, name).into_bytes()
        }
        Message::DirExit => b"E\n".to_vec(),
        Message::Ack => vec![response::OK],
        Message::Err { message, fatal } => {
            let mut out = Vec::with_capacity(message.len() + 2);
            out.push(if *fatal { response::FATAL } else { response::WARNING });
            // A newline inside the text would end the line early on the wire
            out.extend(message.bytes().map(|b| if b == b'\n' { b' ' } else { b }));
            out.push(b'\n');
            out
        }
    }
}

/// Read one message. Blocks until a full message (excluding any file payload)
/// is available.
pub async fn decode<R>(reader: &mut R) -> Result<Message>
where
    R: AsyncBufRead + Unpin + ?Sized,
{
    let first = reader.read_u8().await?;
    match first {
        response::OK => Ok(Message::Ack),
        response::WARNING | response::FATAL => {
            let line = read_line(reader).await?;
            Ok(Message::Err {
                message: String::from_utf8_lossy(&line).into_owned(),
                fatal: first == response::FATAL,
            })
        }
        tag::FILE | tag::DIR_ENTER => {
            let line = read_line(reader).await?;
            parse_entry_line(first, &line)
        }
        tag::DIR_EXIT => {
            read_line(reader).await?;
            Ok(Message::DirExit)
        }
        _ => Err(ScpError::protocol("invalid protocol")),
    }
}

async fn read_line<R>(reader: &mut R) -> Result<Vec<u8>>
where
    R: AsyncBufRead + Unpin + ?Sized,
{
    let mut line = Vec::new();
    let mut limited = (&mut *reader).take(MAX_LINE_LEN as u64 + 1);
    limited.read_until(b'\n', &mut line).await?;
    if line.last() == Some(&b'\n') {
        line.pop();
        return Ok(line);
    }
    if line.len() > MAX_LINE_LEN {
        return Err(ScpError::protocol(format!(
            "control line exceeds {} bytes",
            MAX_LINE_LEN
        )));
    }
    Err(ScpError::UnexpectedEof)
}

/// Parse `<octal-mode> <size> <name>` following a `C` or `D` tag.
fn parse_entry_line(kind: u8, line: &[u8]) -> Result<Message> {
    let malformed = || {
        ScpError::protocol(format!(
            "malformed control line: {:?}",
            String::from_utf8_lossy(line)
        ))
    };
    let text = std::str::from_utf8(line).map_err(|_| malformed())?;
    let (mode, rest) = text.split_once(' ').ok_or_else(malformed)?;
    let (size, name) = rest.split_once(' ').ok_or_else(malformed)?;
    let mode = u32::from_str_radix(mode, 8).map_err(|_| malformed())?;
    let size: u64 = size.parse().map_err(|_| malformed())?;
    if name.is_empty() {
        return Err(malformed());
    }
    let name = name.to_string();
    if kind == tag::DIR_ENTER {
        Ok(Message::DirEnter { mode, name })
    } else {
        Ok(Message::FileHeader { mode, size, name })
    }
}

/// Reject names a peer could use to escape the directory being written.
pub fn validate_entry_name(name: &str) -> Result<()> {
    let bad = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains('/')
        || name.contains('\0');
    // On Windows, also reject separators and ':' (ADS defense)
    #[cfg(windows)]
    let bad = bad || name.contains('\\') || name.contains(':');
    if bad {
        return Err(ScpError::protocol(format!("invalid file name {:?}", name)));
    }
    Ok(())
}

/// The two halves of one duplex session: a buffered reader over the remote
/// output and a writer into the remote input.
pub struct Channel<R, W> {
    reader: R,
    writer: W,
}

impl<R, W> Channel<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self { reader, writer }
    }

    pub async fn read_message(&mut self) -> Result<Message> {
        decode(&mut self.reader).await
    }

    pub async fn write_message(&mut self, msg: &Message) -> Result<()> {
        self.writer.write_all(&encode(msg)).await?;
        self.writer.flush().await?;
        Ok(())
    }

    pub async fn write_ack(&mut self) -> Result<()> {
        self.write_message(&Message::Ack).await
    }

    pub async fn write_error(&mut self, message: &str, fatal: bool) -> Result<()> {
        self.write_message(&Message::Err {
            message: message.to_string(),
            fatal,
        })
        .await
    }

    /// Wait for the peer's answer to the previous unit.
    pub async fn expect_ack(&mut self) -> Result<()> {
        match self.read_message().await? {
            Message::Ack => Ok(()),
            Message::Err { message, fatal } => Err(ScpError::RemoteRejection { message, fatal }),
            other => Err(ScpError::protocol(format!(
                "expected acknowledgement, got {}",
                other.label()
            ))),
        }
    }

    pub fn reader_mut(&mut self) -> &mut R {
        &mut self.reader
    }

    pub fn writer_mut(&mut self) -> &mut W {
        &mut self.writer
    }

    /// Close the write half, signalling end-of-input to the peer.
    pub async fn shutdown(&mut self) -> Result<()> {
        self.writer.shutdown().await?;
        Ok(())
    }

    pub fn into_inner(self) -> (R, W) {
        (self.reader, self.writer)
    }
}
