//! Public transfer client.
//!
//! The secure channel is established lazily by the first operation and kept
//! for later ones. Operations are sequential: each takes `&mut self`, and each
//! transfer uses its own remote-execution handle.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use crate::config::ClientConfig;
use crate::error::Result;
use crate::logger::{Logger, NoopLogger};
use crate::remote::{Connector, RemoteShell};
use crate::session::{DuplexSession, TransferRequest, TransferStats};
use crate::ssh::SshConnector;

pub struct Client {
    connector: Box<dyn Connector>,
    shell: Option<Box<dyn RemoteShell>>,
    remote_binary: String,
    logger: Arc<dyn Logger>,
}

impl Client {
    /// Client that reaches `config.host` through the system ssh client.
    pub fn new(config: ClientConfig) -> Self {
        let remote_binary = config.remote_binary.clone();
        Self::with_connector(SshConnector::new(config), remote_binary)
    }

    pub fn with_connector(connector: impl Connector + 'static, remote_binary: impl Into<String>) -> Self {
        Self {
            connector: Box::new(connector),
            shell: None,
            remote_binary: remote_binary.into(),
            logger: Arc::new(NoopLogger),
        }
    }

    pub fn with_logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = logger;
        self
    }

    pub fn remote_binary(&self) -> &str {
        &self.remote_binary
    }

    pub fn set_remote_binary(&mut self, binary: impl Into<String>) {
        self.remote_binary = binary.into();
    }

    pub fn is_connected(&self) -> bool {
        self.shell.is_some()
    }

    async fn shell(&mut self) -> Result<&dyn RemoteShell> {
        let shell = match self.shell.take() {
            Some(s) => s,
            None => self.connector.connect().await?,
        };
        Ok(&**self.shell.insert(shell))
    }

    /// Copy a local file or directory tree to `remote`.
    pub async fn upload(&mut self, local: impl AsRef<Path>, remote: &str) -> Result<()> {
        self.transfer(TransferRequest::upload(local, remote)).await.map(|_| ())
    }

    /// Copy a remote file or directory tree to `local`.
    pub async fn download(&mut self, remote: &str, local: impl AsRef<Path>) -> Result<()> {
        self.transfer(TransferRequest::download(remote, local)).await.map(|_| ())
    }

    pub async fn transfer(&mut self, request: TransferRequest) -> Result<TransferStats> {
        let started = Instant::now();
        self.logger.start(request.direction, &request.local, &request.remote);
        let result = self.run_transfer(&request).await;
        match &result {
            Ok(stats) => self.logger.done(stats.files, stats.bytes, started.elapsed().as_secs_f64()),
            Err(e) => self.logger.error(&request.direction.to_string(), &request.local, &e.to_string()),
        }
        result
    }

    async fn run_transfer(&mut self, request: &TransferRequest) -> Result<TransferStats> {
        let logger = Arc::clone(&self.logger);
        let binary = self.remote_binary.clone();
        let exec = self.shell().await?.open().await?;
        DuplexSession::new(exec, logger).run(request, &binary).await
    }

    /// Run an arbitrary remote command and return its standard output.
    pub async fn run_command(&mut self, command: &str) -> Result<String> {
        let logger = Arc::clone(&self.logger);
        let exec = self.shell().await?.open().await?;
        DuplexSession::new(exec, logger).capture(command).await
    }

    /// Release the established channel, if any.
    pub async fn close(&mut self) -> Result<()> {
        if let Some(mut shell) = self.shell.take() {
            shell.close().await?;
        }
        Ok(())
    }
}
