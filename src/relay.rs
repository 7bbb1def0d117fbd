//! Webhook relay subprocess (`smee-client` by default).
//!
//! The relay subscribes to a public channel URL and replays each delivery
//! as a local POST to `/webhook`. It is started with the server and stopped
//! on shutdown; it is not supervised, so if it dies it stays dead.

use std::io::ErrorKind;
use std::process::Stdio;
use std::sync::Mutex;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};

use crate::config::RelayConfig;

pub struct RelayManager {
    config: RelayConfig,
    child: Mutex<Option<Child>>,
}

impl RelayManager {
    pub fn new(config: RelayConfig) -> Self {
        Self {
            config,
            child: Mutex::new(None),
        }
    }

    /// The command line that will be launched, for logging.
    pub fn command_line(&self) -> Option<String> {
        let url = self.config.url.as_deref()?;
        let mut parts = self.config.program.clone();
        parts.extend([
            "--url".to_string(),
            url.to_string(),
            "--target".to_string(),
            self.config.target.clone(),
        ]);
        Some(parts.join(" "))
    }

    /// `sh -c` form: program parts as written, URL and target quoted.
    fn shell_line(&self, url: &str) -> String {
        format!(
            "{} --url {} --target {}",
            self.config.program.join(" "),
            shell_quote(url),
            shell_quote(&self.config.target)
        )
    }

    fn build_command(&self, url: &str) -> Option<Command> {
        let (program, args) = self.config.program.split_first()?;
        let cmd = if self.config.shell {
            let mut cmd = Command::new("sh");
            cmd.arg("-c").arg(self.shell_line(url));
            cmd
        } else {
            let mut cmd = Command::new(program);
            cmd.args(args)
                .args(["--url", url, "--target", &self.config.target]);
            cmd
        };
        Some(cmd)
    }

    /// Launch the relay. Failures are logged and reported as `false`;
    /// the server keeps running without a relay.
    pub fn start(&self) -> bool {
        let Some(url) = self.config.url.clone() else {
            tracing::warn!("No relay URL configured, relay not started");
            return false;
        };
        let Some(mut cmd) = self.build_command(&url) else {
            tracing::error!("relay.program is empty, relay not started");
            return false;
        };

        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        match cmd.spawn() {
            Ok(mut child) => {
                if let Some(stdout) = child.stdout.take() {
                    tokio::spawn(forward_lines(stdout, "stdout"));
                }
                if let Some(stderr) = child.stderr.take() {
                    tokio::spawn(forward_lines(stderr, "stderr"));
                }
                tracing::info!(
                    pid = child.id(),
                    command = %self.command_line().unwrap_or_default(),
                    "Relay started"
                );
                if let Ok(mut slot) = self.child.lock() {
                    *slot = Some(child);
                }
                true
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                let program = self.config.program.first().cloned().unwrap_or_default();
                tracing::error!(program = %program, "Failed to start relay: program not found");
                tracing::info!("Ensure Node.js and npx are installed and on PATH");
                false
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to start relay");
                false
            }
        }
    }

    pub fn is_running(&self) -> bool {
        let Ok(mut slot) = self.child.lock() else {
            return false;
        };
        match slot.as_mut() {
            Some(child) => matches!(child.try_wait(), Ok(None)),
            None => false,
        }
    }

    /// Ask the relay to terminate, then kill it after the grace period.
    pub async fn stop(&self) {
        let child = match self.child.lock() {
            Ok(mut slot) => slot.take(),
            Err(_) => None,
        };
        let Some(mut child) = child else {
            return;
        };
        if !matches!(child.try_wait(), Ok(None)) {
            tracing::info!("Relay already exited");
            return;
        }

        terminate(&mut child);
        let grace = Duration::from_secs(self.config.grace_secs);
        match tokio::time::timeout(grace, child.wait()).await {
            Ok(_) => tracing::info!("Relay stopped"),
            Err(_) => {
                if let Err(e) = child.kill().await {
                    tracing::error!(error = %e, "Failed to kill relay");
                } else {
                    tracing::warn!("Relay did not exit in time and was killed");
                }
            }
        }
    }
}

#[cfg(unix)]
fn terminate(child: &mut Child) {
    if let Some(pid) = child.id() {
        // SAFETY: plain signal send to a child we spawned and still own.
        unsafe {
            libc::kill(pid as libc::pid_t, libc::SIGTERM);
        }
    }
}

#[cfg(not(unix))]
fn terminate(child: &mut Child) {
    let _ = child.start_kill();
}

fn shell_quote(value: &str) -> String {
    let plain = !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./:=@%+,".contains(c));
    if plain {
        value.to_string()
    } else {
        format!("'{}'", value.replace('\'', r"'\''"))
    }
}

async fn forward_lines<R: AsyncRead + Unpin>(stream: R, name: &'static str) {
    let mut lines = BufReader::new(stream).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        tracing::debug!(stream = name, "relay: {}", line);
    }
}
