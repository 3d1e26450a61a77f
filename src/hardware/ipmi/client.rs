//! ipmitool invocation for one BMC over `lanplus`.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::types::IpmiConnection;
use crate::error::ChannelError;
use crate::system::executor::{CommandChannel, CommandSpec};

#[cfg(windows)]
const DEFAULT_IPMITOOL: &str = r"C:\Program Files (x86)\Dell\SysMgt\bmc\ipmitool.exe";
#[cfg(not(windows))]
const DEFAULT_IPMITOOL: &str = "/usr/bin/ipmitool";

/// Builds and runs `ipmitool -I lanplus -H .. -U .. -P .. <command>` for a
/// single host. Shared by the IPMI reading source and the fan actuator.
pub struct IpmiTool {
    host_name: String,
    path: String,
    conn: IpmiConnection,
    channel: Arc<dyn CommandChannel>,
}

impl IpmiTool {
    pub fn new(host_name: &str, conn: &IpmiConnection, channel: Arc<dyn CommandChannel>) -> Self {
        let path = conn
            .ipmitool_path
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .unwrap_or(DEFAULT_IPMITOOL)
            .to_string();

        Self {
            host_name: host_name.to_string(),
            path,
            conn: conn.clone(),
            channel,
        }
    }

    pub fn host_name(&self) -> &str {
        &self.host_name
    }

    /// Full command line for `command` (e.g. `"raw 0x30 0x30 0x01 0x01"`).
    pub fn command(&self, command: &str) -> CommandSpec {
        CommandSpec::new(&self.path)
            .args(["-I", "lanplus"])
            .args(["-H", self.conn.host.as_str(), "-U", self.conn.user.as_str(), "-P", self.conn.password.as_str()])
            .args(command.split_whitespace())
            .redact(&self.conn.password)
    }

    pub async fn run(&self, command: &str, cancel: &CancellationToken) -> Result<String, ChannelError> {
        self.channel.execute(&self.command(command), cancel).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::test_utils::ScriptedChannel;

    fn conn(path: Option<&str>) -> IpmiConnection {
        IpmiConnection {
            host: "10.0.0.5".to_string(),
            user: "root".to_string(),
            password: "calvin".to_string(),
            ipmitool_path: path.map(str::to_string),
        }
    }

    #[test]
    fn builds_lanplus_command_with_split_words() {
        let tool = IpmiTool::new("r620", &conn(None), ScriptedChannel::new(vec![]));
        let spec = tool.command("sdr type temperature");

        assert_eq!(spec.program, DEFAULT_IPMITOOL);
        assert_eq!(
            spec.args,
            ["-I", "lanplus", "-H", "10.0.0.5", "-U", "root", "-P", "calvin", "sdr", "type", "temperature"]
        );
        assert!(!spec.display().contains("calvin"));
    }

    #[test]
    fn explicit_tool_path_overrides_default() {
        let tool = IpmiTool::new("r620", &conn(Some("/opt/ipmitool/bin/ipmitool")), ScriptedChannel::new(vec![]));
        assert_eq!(tool.command("mc info").program, "/opt/ipmitool/bin/ipmitool");

        let blank = IpmiTool::new("r620", &conn(Some("  ")), ScriptedChannel::new(vec![]));
        assert_eq!(blank.command("mc info").program, DEFAULT_IPMITOOL);
    }

    #[tokio::test]
    async fn run_goes_through_channel() {
        let channel = ScriptedChannel::new(vec![Ok("ok".to_string())]);
        let tool = IpmiTool::new("r620", &conn(None), channel.clone());

        let out = tool.run("raw 0x30 0x30 0x01 0x01", &CancellationToken::new()).await.unwrap();
        assert_eq!(out, "ok");
        assert_eq!(
            channel.lines(),
            [format!("{} -I lanplus -H 10.0.0.5 -U root -P {{password}} raw 0x30 0x30 0x01 0x01", DEFAULT_IPMITOOL)]
        );
    }
}
