//! Command-line surface of the `rscp` binary

use anyhow::{bail, Result};
use clap::{ArgAction, Parser};
use std::path::PathBuf;

use crate::config::ClientConfig;
use crate::session::TransferRequest;
use crate::url::{parse_remote, RemoteSpec};

/// Command-line arguments
#[derive(Clone, Debug, Parser)]
#[command(
    author,
    version,
    about = "rscp - copy files and directory trees to and from a remote host over ssh"
)]
pub struct Args {
    /// Source: local path or [user@]host:path / scp://[user@]host[:port]/path
    pub source: String,

    /// Destination: local path or remote operand (exactly one side is remote)
    pub destination: String,

    /// Remote ssh port
    #[arg(short = 'P', long)]
    pub port: Option<u16>,

    /// Remote user name
    #[arg(short = 'l', long)]
    pub user: Option<String>,

    /// Identity (private key) file
    #[arg(short = 'i', long)]
    pub identity: Option<PathBuf>,

    /// Extra ssh option, e.g. -o StrictHostKeyChecking=accept-new
    #[arg(short = 'o', long = "option", action = ArgAction::Append)]
    pub ssh_options: Vec<String>,

    /// ssh program to run
    #[arg(short = 'S', long = "ssh-program")]
    pub ssh_program: Option<String>,

    /// Path of scp on the remote host
    #[arg(long = "remote-binary")]
    pub remote_binary: Option<String>,

    /// Connection timeout in seconds
    #[arg(long = "connect-timeout")]
    pub connect_timeout: Option<u64>,

    /// Never prompt for passwords or passphrases
    #[arg(long)]
    pub batch: bool,

    /// Share one ssh connection (ControlMaster) for the session
    #[arg(long = "control-master")]
    pub control_master: bool,

    /// Config file (default: ~/.config/rscp/rscp.toml)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Print each file and directory as it is transferred
    #[arg(short, long)]
    pub verbose: bool,

    /// Append timestamped transfer events to this file
    #[arg(long = "log-file")]
    pub log_file: Option<PathBuf>,

    /// Append one JSON line per transfer to this file
    #[arg(long)]
    pub journal: Option<PathBuf>,
}

impl Args {
    /// Work out the transfer direction and remote endpoint from the operands.
    pub fn plan(&self) -> Result<(RemoteSpec, TransferRequest)> {
        match (parse_remote(&self.source), parse_remote(&self.destination)) {
            (Some(_), Some(_)) => bail!("remote-to-remote copies are not supported"),
            (None, None) => bail!("one of source or destination must be remote (host:path)"),
            (None, Some(dst)) => {
                let req = TransferRequest::upload(&self.source, &dst.path);
                Ok((dst, req))
            }
            (Some(src), None) => {
                let req = TransferRequest::download(&src.path, &self.destination);
                Ok((src, req))
            }
        }
    }

    /// Layer operand and flag values over the file configuration.
    pub fn apply(&self, config: &mut ClientConfig, remote: &RemoteSpec) {
        config.host = remote.host.clone();
        if let Some(user) = remote.user.clone().or_else(|| self.user.clone()) {
            config.user = Some(user);
        }
        if let Some(port) = remote.port.or(self.port) {
            config.port = port;
        }
        if let Some(identity) = &self.identity {
            config.identity_file = Some(identity.clone());
        }
        config.ssh_options.extend(self.ssh_options.iter().cloned());
        if let Some(program) = &self.ssh_program {
            config.ssh_program = program.clone();
        }
        if let Some(binary) = &self.remote_binary {
            config.remote_binary = binary.clone();
        }
        if let Some(secs) = self.connect_timeout {
            config.connect_timeout_secs = secs;
        }
        config.batch_mode |= self.batch;
        config.control_master |= self.control_master;
    }
}
