//! Monitor configuration structs, defaults and startup validation.

use std::collections::HashSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::MonitorError;
use crate::system::executor::CommandTimeouts;
use crate::system::parser::compile_pattern;

const MASK: &str = "********";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    #[serde(default)]
    pub settings: Settings,
    #[serde(default)]
    pub commands: BmcCommands,
    #[serde(default)]
    pub hosts: Vec<HostConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_polling_interval")]
    pub polling_interval_secs: u64,
    #[serde(default = "default_window")]
    pub rolling_average_window: usize,
    #[serde(default = "default_manual_percentage")]
    pub manual_mode_fan_percentage: u8, // 0-100%
    #[serde(default = "default_back_to_manual")]
    pub back_to_manual_threshold_secs: u64,
    #[serde(default)]
    pub manual_reassert: ManualReassert,
    #[serde(default)]
    pub no_reading_policy: NoReadingPolicy,
    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,
    #[serde(default = "default_output_read_timeout")]
    pub output_read_timeout_secs: u64,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

pub fn default_polling_interval() -> u64 { 30 }
pub fn default_window() -> usize { 10 }
pub fn default_manual_percentage() -> u8 { 30 }
pub fn default_back_to_manual() -> u64 { 60 }
pub fn default_command_timeout() -> u64 { 30 }
pub fn default_output_read_timeout() -> u64 { 5 }
pub fn default_log_level() -> String { "INFO".to_string() }
pub fn default_max_temp() -> i32 { 50 }
pub fn default_ssh_port() -> u16 { 22 }

impl Default for Settings {
    fn default() -> Self {
        Self {
            polling_interval_secs: default_polling_interval(),
            rolling_average_window: default_window(),
            manual_mode_fan_percentage: default_manual_percentage(),
            back_to_manual_threshold_secs: default_back_to_manual(),
            manual_reassert: ManualReassert::default(),
            no_reading_policy: NoReadingPolicy::default(),
            command_timeout_secs: default_command_timeout(),
            output_read_timeout_secs: default_output_read_timeout(),
            log_level: default_log_level(),
        }
    }
}

impl Settings {
    pub fn polling_interval(&self) -> Duration {
        Duration::from_secs(self.polling_interval_secs)
    }

    pub fn back_to_manual_threshold(&self) -> Duration {
        Duration::from_secs(self.back_to_manual_threshold_secs)
    }

    pub fn timeouts(&self) -> CommandTimeouts {
        CommandTimeouts {
            completion: Duration::from_secs(self.command_timeout_secs),
            output_read: Duration::from_secs(self.output_read_timeout_secs),
        }
    }
}

/// Whether the manual fixed-speed command is resent while a host stays below
/// its threshold. There is no BMC read-back, so resending is what recovers a
/// controller that flipped itself back to automatic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ManualReassert {
    #[default]
    EveryTick,
    OnTransition,
}

/// What a source reports when the pattern yields no parsable number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoReadingPolicy {
    #[default]
    Error,
    /// Legacy behaviour: report 0 °C. Reads as "cool" to the controller.
    AssumeZero,
}

/// ipmitool argument templates. `set_fixed_speed` takes `{{SPEED_HEX}}`
/// (`0x1e` for 30%) or `{{SPEED}}` (`30`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BmcCommands {
    #[serde(default = "default_query_temperature")]
    pub query_temperature: String,
    #[serde(default = "default_enable_automatic")]
    pub enable_automatic: String,
    #[serde(default = "default_disable_automatic")]
    pub disable_automatic: String,
    #[serde(default = "default_set_fixed_speed")]
    pub set_fixed_speed: String,
    #[serde(default = "default_sensors_command")]
    pub sensors_command: String,
}

pub fn default_query_temperature() -> String { "sdr type temperature".to_string() }
pub fn default_enable_automatic() -> String { "raw 0x30 0x30 0x01 0x01".to_string() }
pub fn default_disable_automatic() -> String { "raw 0x30 0x30 0x01 0x00".to_string() }
pub fn default_set_fixed_speed() -> String { "raw 0x30 0x30 0x02 0xff {{SPEED_HEX}}".to_string() }
pub fn default_sensors_command() -> String { "sensors".to_string() }

impl Default for BmcCommands {
    fn default() -> Self {
        Self {
            query_temperature: default_query_temperature(),
            enable_automatic: default_enable_automatic(),
            disable_automatic: default_disable_automatic(),
            set_fixed_speed: default_set_fixed_speed(),
            sensors_command: default_sensors_command(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", try_from = "String")]
pub enum SourceKind {
    /// `ipmitool sdr` against the BMC.
    #[default]
    Ipmi,
    /// `sensors` over an SSH session to the host OS.
    SshLmSensors,
}

impl TryFrom<String> for SourceKind {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.to_ascii_lowercase().as_str() {
            "ipmi" => Ok(SourceKind::Ipmi),
            "ssh_lm_sensors" => Ok(SourceKind::SshLmSensors),
            other => Err(format!("unknown source '{}' (expected 'ipmi' or 'ssh_lm_sensors')", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostConfig {
    pub name: String,
    #[serde(default)]
    pub source: SourceKind,
    #[serde(default)]
    pub ipmi: IpmiConnection,
    #[serde(default)]
    pub ssh: SshConnection,
    pub temperature_pattern: String,
    #[serde(default = "default_max_temp")]
    pub max_temp_c: i32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IpmiConnection {
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub password: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ipmitool_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SshConnection {
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_ssh_port")]
    pub port: u16,
}

impl Default for SshConnection {
    fn default() -> Self {
        Self {
            host: String::new(),
            user: String::new(),
            password: String::new(),
            port: default_ssh_port(),
        }
    }
}

impl MonitorConfig {
    /// Reject configurations the monitor cannot run safely with.
    pub fn validate(&self) -> Result<(), MonitorError> {
        let fail = |msg: String| Err(MonitorError::Configuration(msg));
        let s = &self.settings;

        if self.hosts.is_empty() {
            return fail("no hosts configured".to_string());
        }
        if s.rolling_average_window == 0 {
            return fail("rolling_average_window must be at least 1".to_string());
        }
        if s.manual_mode_fan_percentage > 100 {
            return fail(format!(
                "manual_mode_fan_percentage {} is out of range (0-100)",
                s.manual_mode_fan_percentage
            ));
        }
        if s.polling_interval_secs == 0 {
            return fail("polling_interval_secs must be at least 1".to_string());
        }
        if s.command_timeout_secs == 0 || s.output_read_timeout_secs == 0 {
            return fail("command timeouts must be at least 1 second".to_string());
        }
        if !self.commands.set_fixed_speed.contains("{{SPEED_HEX}}")
            && !self.commands.set_fixed_speed.contains("{{SPEED}}")
        {
            return fail("commands.set_fixed_speed must contain {{SPEED_HEX}} or {{SPEED}}".to_string());
        }

        let mut seen = HashSet::new();
        for host in &self.hosts {
            if host.name.trim().is_empty() {
                return fail("host with empty name".to_string());
            }
            if !seen.insert(host.name.as_str()) {
                return fail(format!("duplicate host name '{}'", host.name));
            }
            if let Err(e) = compile_pattern(&host.temperature_pattern) {
                return fail(format!("host '{}': invalid temperature_pattern: {}", host.name, e));
            }
            // The actuator always talks to the BMC, whatever the reading source.
            if host.ipmi.host.trim().is_empty() {
                return fail(format!("host '{}': ipmi.host is required", host.name));
            }
            if host.source == SourceKind::SshLmSensors && host.ssh.host.trim().is_empty() {
                return fail(format!("host '{}': ssh.host is required for ssh_lm_sensors", host.name));
            }
        }

        Ok(())
    }

    /// Copy with every password masked, for display.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        for host in &mut copy.hosts {
            if !host.ipmi.password.is_empty() {
                host.ipmi.password = MASK.to_string();
            }
            if !host.ssh.password.is_empty() {
                host.ssh.password = MASK.to_string();
            }
        }
        copy
    }
}
