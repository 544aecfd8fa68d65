//! Provider subprocess protocol.
//!
//! Calendar backends live in separate executables named
//! `calsync-provider-<kind>` (e.g. `calsync-provider-google`,
//! `calsync-provider-apple`) found on `PATH`. Each call spawns the
//! provider, sends one JSON request on stdin and reads one JSON response
//! from stdout.
//!
//! Providers own their credentials and API specifics; calsync passes the
//! parameters from the config file along with every request.

mod client;
pub mod protocol;

pub use client::ProviderClient;

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use serde::{Serialize, de::DeserializeOwned};
use tokio::io::AsyncWriteExt;
use tokio::process::Command as TokioCommand;
use tokio::time::timeout;
use tracing::debug;

use crate::error::{SyncError, SyncResult};
use protocol::{Command, ProviderCommand, Request, Response};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone, Debug)]
pub struct Provider {
    name: String,
    timeout: Duration,
    program: Option<(PathBuf, Vec<String>)>,
}

impl Provider {
    pub fn from_name(name: &str) -> Self {
        Provider {
            name: name.to_string(),
            timeout: DEFAULT_TIMEOUT,
            program: None,
        }
    }

    /// Launch `program` with `args` instead of `calsync-provider-<name>` from `PATH`.
    pub fn with_program(mut self, program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        self.program = Some((program.into(), args));
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Fail early when the provider binary is missing.
    pub fn ensure_installed(&self) -> SyncResult<()> {
        self.binary_path().map(|_| ())
    }

    fn binary_path(&self) -> SyncResult<PathBuf> {
        let binary_name = match &self.program {
            Some((program, _)) => program.to_string_lossy().into_owned(),
            None => format!("calsync-provider-{}", self.name),
        };
        which::which(&binary_name).map_err(|_| SyncError::ProviderNotInstalled(binary_name))
    }

    fn command(&self) -> SyncResult<TokioCommand> {
        let mut command = TokioCommand::new(self.binary_path()?);
        if let Some((_, args)) = &self.program {
            command.args(args);
        }
        Ok(command)
    }

    /// Call a typed provider command and return the result.
    ///
    /// The response type is inferred from the command's associated type.
    pub async fn call<C: ProviderCommand>(&self, cmd: C) -> SyncResult<C::Response> {
        timeout(self.timeout, self.call_raw(C::command(), cmd))
            .await
            .map_err(|_| SyncError::ProviderTimeout(self.timeout))?
    }

    /// Low-level call that sends a command with params and deserializes the response.
    async fn call_raw<P: Serialize, R: DeserializeOwned>(
        &self,
        command: Command,
        params: P,
    ) -> SyncResult<R> {
        let params =
            serde_json::to_value(params).map_err(|e| SyncError::Serialization(e.to_string()))?;
        let request = Request { command, params };
        let request_json =
            serde_json::to_string(&request).map_err(|e| SyncError::Serialization(e.to_string()))?;

        debug!(provider = %self.name, ?command, "calling provider");

        let mut child = self
            .command()?
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            // A timed-out or cancelled call drops the child
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                SyncError::Provider(format!("Failed to spawn provider '{}': {e}", self.name))
            })?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| SyncError::Provider("Provider stdin unavailable".into()))?;
        stdin
            .write_all(format!("{request_json}\n").as_bytes())
            .await?;
        drop(stdin);

        let output = child.wait_with_output().await?;

        let response_str = String::from_utf8_lossy(&output.stdout);
        if response_str.trim().is_empty() {
            return Err(SyncError::Provider(if output.status.success() {
                "Provider returned no response".into()
            } else {
                format!(
                    "Provider exited with status: {}",
                    output.status.code().unwrap_or(-1)
                )
            }));
        }

        let response: Response<R> = serde_json::from_str(&response_str)
            .map_err(|e| SyncError::Provider(format!("Failed to parse response: {e}")))?;

        match response {
            Response::Success { data } => Ok(data),
            Response::Error { error } => Err(SyncError::Provider(error)),
        }
    }
}
