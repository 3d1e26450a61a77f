//! BMC fan-mode actuator: enable automatic, or disable it and pin a fixed speed.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::types::BmcCommands;
use crate::error::MonitorError;
use crate::hardware::ipmi::client::IpmiTool;
use crate::hardware::ipmi::commands::render_fixed_speed;
use crate::hardware::FanControl;

pub struct IpmiFanActuator {
    tool: Arc<IpmiTool>,
    commands: BmcCommands,
    dry_run: bool,
}

impl IpmiFanActuator {
    pub fn new(tool: Arc<IpmiTool>, commands: BmcCommands, dry_run: bool) -> Self {
        Self { tool, commands, dry_run }
    }

    async fn send(&self, command: &str, action: &'static str, cancel: &CancellationToken) -> Result<(), MonitorError> {
        if self.dry_run {
            info!("[DRY RUN] Would execute: {}", self.tool.command(command).display());
            return Ok(());
        }
        self.tool
            .run(command, cancel)
            .await
            .map(|_| ())
            .map_err(|e| e.into_actuation_error(self.tool.host_name(), action))
    }
}

#[async_trait]
impl FanControl for IpmiFanActuator {
    async fn enable_automatic(&self, cancel: &CancellationToken) -> Result<(), MonitorError> {
        info!("{}: switching to automatic fan control", self.tool.host_name());
        self.send(&self.commands.enable_automatic, "enable automatic", cancel).await
    }

    async fn set_manual(&self, percent: u8, cancel: &CancellationToken) -> Result<(), MonitorError> {
        info!("{}: switching to manual fan control at {}%", self.tool.host_name(), percent);
        self.send(&self.commands.disable_automatic, "disable automatic", cancel).await?;
        let fixed = render_fixed_speed(&self.commands.set_fixed_speed, percent);
        self.send(&fixed, "set fixed speed", cancel).await
    }
}
