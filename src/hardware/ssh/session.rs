//! Persistent SSH session built on an OpenSSH ControlMaster socket.
//!
//! The master connection is opened lazily and reused by every command.
//! A failed command marks the session unavailable; the next `run` tears
//! down whatever is left and reconnects before sending anything.
//! Password logins go through `sshpass -e` so the secret travels in the
//! environment, never on the command line.

use std::path::PathBuf;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::types::SshConnection;
use crate::error::ChannelError;
use crate::system::executor::{CommandChannel, CommandSpec};

const CONTROL_PERSIST: &str = "10m";
const CONNECT_TIMEOUT_SECS: u32 = 10;

pub struct SshSession {
    host_name: String,
    conn: SshConnection,
    control_path: PathBuf,
    channel: Arc<dyn CommandChannel>,
    available: bool,
}

impl SshSession {
    pub fn new(host_name: &str, conn: &SshConnection, channel: Arc<dyn CommandChannel>) -> Self {
        let safe: String = host_name
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        let control_path = std::env::temp_dir().join(format!("ipmi-temp-monitor-{}.sock", safe));

        Self {
            host_name: host_name.to_string(),
            conn: conn.clone(),
            control_path,
            channel,
            available: false,
        }
    }

    pub fn host_name(&self) -> &str {
        &self.host_name
    }

    #[cfg(test)]
    pub fn is_available(&self) -> bool {
        self.available
    }

    fn destination(&self) -> String {
        if self.conn.user.is_empty() {
            self.conn.host.clone()
        } else {
            format!("{}@{}", self.conn.user, self.conn.host)
        }
    }

    fn ssh(&self) -> CommandSpec {
        CommandSpec::new("ssh")
            .args(["-o".to_string(), format!("ControlPath={}", self.control_path.display())])
            .args(["-o", "StrictHostKeyChecking=accept-new"])
            .args(["-o".to_string(), format!("ConnectTimeout={}", CONNECT_TIMEOUT_SECS)])
            .args(["-p".to_string(), self.conn.port.to_string()])
    }

    /// Opens the background master. Exits once authenticated (`-f -N`).
    pub(crate) fn connect_spec(&self) -> CommandSpec {
        let ssh = self
            .ssh()
            .args(["-o", "ControlMaster=yes"])
            .args(["-o".to_string(), format!("ControlPersist={}", CONTROL_PERSIST)])
            .args(["-f", "-N"]);

        if self.conn.password.is_empty() {
            ssh.args(["-o", "BatchMode=yes"]).arg(self.destination())
        } else {
            let ssh = ssh.arg(self.destination());
            CommandSpec::new("sshpass")
                .arg("-e")
                .arg(ssh.program)
                .args(ssh.args)
                .env("SSHPASS", self.conn.password.as_str())
                .redact(&self.conn.password)
        }
    }

    pub(crate) fn check_spec(&self) -> CommandSpec {
        self.ssh().args(["-O", "check"]).arg(self.destination())
    }

    pub(crate) fn run_spec(&self, command: &str) -> CommandSpec {
        self.ssh()
            .args(["-o", "ControlMaster=no", "-o", "BatchMode=yes"])
            .arg(self.destination())
            .arg(command)
    }

    pub(crate) fn exit_spec(&self) -> CommandSpec {
        self.ssh().args(["-O", "exit"]).arg(self.destination())
    }

    async fn connect(&mut self, cancel: &CancellationToken) -> Result<(), ChannelError> {
        // A live master left by an earlier process is reused as-is.
        if self.channel.execute(&self.check_spec(), cancel).await.is_ok() {
            debug!("{}: reusing existing SSH master at {:?}", self.host_name, self.control_path);
            self.available = true;
            return Ok(());
        }

        if let Err(e) = tokio::fs::remove_file(&self.control_path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("{}: could not remove stale control socket {:?}: {}", self.host_name, self.control_path, e);
            }
        }

        info!("{}: opening SSH session to {}", self.host_name, self.conn.host);
        self.channel.execute(&self.connect_spec(), cancel).await?;
        self.available = true;
        Ok(())
    }

    /// Run `command` on the remote host, reconnecting first if needed.
    pub async fn run(&mut self, command: &str, cancel: &CancellationToken) -> Result<String, ChannelError> {
        if !self.available {
            self.connect(cancel).await?;
        }

        match self.channel.execute(&self.run_spec(command), cancel).await {
            Ok(output) => Ok(output),
            Err(e) => {
                self.available = false;
                Err(e)
            }
        }
    }

    /// Stop the master connection. Best effort.
    pub async fn close(&mut self, cancel: &CancellationToken) {
        if !self.available {
            return;
        }
        self.available = false;
        match self.channel.execute(&self.exit_spec(), cancel).await {
            Ok(_) => debug!("{}: SSH session closed", self.host_name),
            Err(e) => debug!("{}: SSH session close failed: {}", self.host_name, e),
        }
    }
}
