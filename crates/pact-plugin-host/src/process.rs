//! Supervision of one plugin child process.
//!
//! A [`ChildProcess`] owns exactly one OS process for the lifetime of a
//! plugin. Two detached tasks bridge the process's standard streams into the
//! host: every stdout line is logged verbatim (tagged with the plugin name
//! and pid), and lines that look like JSON objects are parsed and queued on
//! an unbounded FIFO channel; stderr lines are logged at error level. The
//! queue is consumed exactly once today, for the startup handshake message
//! `{"port": N, "serverKey": "…"}`, but supports further messages.

use std::process::Stdio;
use std::sync::Mutex;
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tracing::{debug, error, level_filters::LevelFilter};

use crate::error::PluginError;
use crate::manifest::PactPluginManifest;

/// Tracing target for child process operations.
const PROCESS_TARGET: &str = "pact_plugin_host::process";

/// Default window for the startup handshake message.
pub const DEFAULT_STARTUP_TIMEOUT: Duration = Duration::from_secs(10);

/// The startup message a plugin must write to stdout before anything else
/// observable.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunningPluginInfo {
    /// Port the plugin's gRPC server is listening on.
    pub port: u16,
    /// Bearer token authenticating host calls to the plugin.
    pub server_key: String,
}

/// A running plugin child process and its message channel.
#[derive(Debug)]
pub struct ChildProcess {
    plugin_name: String,
    pid: u32,
    child: Mutex<Child>,
    messages: tokio::sync::Mutex<mpsc::UnboundedReceiver<Value>>,
}

impl ChildProcess {
    /// Spawns the plugin executable described by the manifest.
    ///
    /// The command runs in the plugin's install directory with the
    /// manifest's extra arguments appended, and both `LOG_LEVEL` and
    /// `RUST_LOG` set to the host's effective log level so plugin logging
    /// follows the host's verbosity. Stream pumps are started before this
    /// function returns.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::SpawnFailed`] if the process cannot be
    /// started or its standard streams cannot be captured.
    pub fn spawn(manifest: &PactPluginManifest) -> Result<Self, PluginError> {
        let entry_point = manifest.resolve_entry_point(std::env::consts::OS);
        debug!(
            target: PROCESS_TARGET,
            plugin = manifest.name,
            entry_point = %entry_point.display(),
            "starting plugin process"
        );

        let log_level = effective_log_level();
        let mut child = Command::new(&entry_point)
            .args(&manifest.args)
            .current_dir(&manifest.plugin_dir)
            .env("LOG_LEVEL", &log_level)
            .env("RUST_LOG", &log_level)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| PluginError::SpawnFailed {
                name: manifest.name.clone(),
                message: format!("'{}' - {err}", entry_point.display()),
                source: Some(std::sync::Arc::new(err)),
            })?;

        let pid = child.id().ok_or_else(|| PluginError::SpawnFailed {
            name: manifest.name.clone(),
            message: String::from("could not get the child process id"),
            source: None,
        })?;
        let stdout = child.stdout.take().ok_or_else(|| PluginError::SpawnFailed {
            name: manifest.name.clone(),
            message: String::from("could not capture the child process standard output"),
            source: None,
        })?;
        let stderr = child.stderr.take().ok_or_else(|| PluginError::SpawnFailed {
            name: manifest.name.clone(),
            message: String::from("could not capture the child process standard error"),
            source: None,
        })?;

        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(pump_stdout(stdout, manifest.name.clone(), pid, tx));
        tokio::spawn(pump_stderr(stderr, manifest.name.clone(), pid));

        debug!(target: PROCESS_TARGET, plugin = manifest.name, pid, "plugin process started");
        Ok(Self {
            plugin_name: manifest.name.clone(),
            pid,
            child: Mutex::new(child),
            messages: tokio::sync::Mutex::new(rx),
        })
    }

    /// OS pid of the child process.
    #[must_use]
    pub const fn pid(&self) -> u32 {
        self.pid
    }

    /// Awaits the next structured message from the plugin's stdout, up to
    /// the given timeout. Returns `None` on timeout or when the stream has
    /// closed without further messages.
    pub async fn next_message(&self, timeout: Duration) -> Option<Value> {
        let mut receiver = self.messages.lock().await;
        tokio::time::timeout(timeout, receiver.recv()).await.ok().flatten()
    }

    /// Retrieves and parses the startup handshake message.
    ///
    /// On failure the process is destroyed before the error is returned, so
    /// a failed handshake never leaks a running child.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::StartupTimeout`] when no message arrives in
    /// the window and [`PluginError::InvalidStartup`] when the message is
    /// not a valid `{"port": N, "serverKey": "…"}` object.
    pub async fn startup_info(&self, timeout: Duration) -> Result<RunningPluginInfo, PluginError> {
        match self.next_message(timeout).await {
            Some(message) => serde_json::from_value::<RunningPluginInfo>(message.clone()).map_err(
                |err| {
                    self.destroy();
                    PluginError::InvalidStartup {
                        name: self.plugin_name.clone(),
                        message: format!("got {message} - {err}"),
                    }
                },
            ),
            None => {
                self.destroy();
                Err(PluginError::StartupTimeout {
                    name: self.plugin_name.clone(),
                    timeout_ms: timeout.as_millis().try_into().unwrap_or(u64::MAX),
                })
            }
        }
    }

    /// Unconditionally requests termination of the child process. Does not
    /// wait for it to exit; pair with [`ChildProcess::wait_for_exit`] when a
    /// bounded wait is needed.
    pub fn destroy(&self) {
        debug!(target: PROCESS_TARGET, plugin = self.plugin_name, pid = self.pid, "killing plugin process");
        if let Ok(mut child) = self.child.lock() {
            drop(child.start_kill());
        }
    }

    /// Polls for process exit for at most the grace period. Returns whether
    /// the process was observed to have exited.
    pub async fn wait_for_exit(&self, grace: Duration) -> bool {
        let poll_interval = Duration::from_millis(50);
        let start = tokio::time::Instant::now();
        loop {
            let status = self.child.lock().ok().and_then(|mut child| child.try_wait().ok());
            match status {
                Some(Some(status)) => {
                    debug!(
                        target: PROCESS_TARGET,
                        plugin = self.plugin_name, pid = self.pid, ?status, "plugin process exited"
                    );
                    return true;
                }
                _ if start.elapsed() > grace => return false,
                _ => tokio::time::sleep(poll_interval).await,
            }
        }
    }
}

/// The host's effective log level, in the lowercase form plugins expect.
fn effective_log_level() -> String {
    let level = LevelFilter::current();
    if level == LevelFilter::OFF { String::new() } else { level.to_string().to_lowercase() }
}

async fn pump_stdout(
    stdout: impl AsyncRead + Unpin,
    plugin_name: String,
    pid: u32,
    tx: mpsc::UnboundedSender<Value>,
) {
    let mut lines = BufReader::new(stdout).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        debug!(target: PROCESS_TARGET, "plugin {plugin_name} [{pid}] || {line}");
        let trimmed = line.trim();
        if trimmed.starts_with('{') {
            match serde_json::from_str::<Value>(trimmed) {
                Ok(message) => {
                    // The receiver only goes away when the plugin is being
                    // torn down; dropping the message then is fine.
                    drop(tx.send(message));
                }
                Err(err) => {
                    debug!(
                        target: PROCESS_TARGET,
                        plugin = plugin_name, pid, %err, "failed to parse JSON message, ignoring it"
                    );
                }
            }
        }
    }
    debug!(target: PROCESS_TARGET, plugin = plugin_name, pid, "stdout pump finished");
}

async fn pump_stderr(stderr: impl AsyncRead + Unpin, plugin_name: String, pid: u32) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        error!(target: PROCESS_TARGET, "plugin {plugin_name} [{pid}] || {line}");
    }
    debug!(target: PROCESS_TARGET, plugin = plugin_name, pid, "stderr pump finished");
}

#[cfg(test)]
mod tests;
