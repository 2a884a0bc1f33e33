//! rscp Library
//!
//! SCP-protocol file transfer driven through a remote shell channel: the
//! message codec, the recursive send/receive engines and the duplex session
//! coordinator that runs the remote command and the local stream pump
//! concurrently.

pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod log;
pub mod logger;
pub mod protocol;
pub mod protocol_core;
pub mod recv;
pub mod remote;
pub mod send;
pub mod session;
pub mod ssh;
pub mod url;

pub use client::Client;
pub use config::ClientConfig;
pub use error::{ErrorKind, ScpError};
pub use session::{Direction, TransferRequest, TransferStats};
