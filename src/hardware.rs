//! TemperatureSource / FanControl traits and their BMC and SSH implementations.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::warn;

pub mod types;
pub mod ipmi;
pub mod ssh;

pub use ipmi::actuator::IpmiFanActuator;
pub use ipmi::client::IpmiTool;
pub use ipmi::temperature::IpmiTemperatureSource;
pub use ssh::lm_sensors::LmSensorsTemperatureSource;

use crate::config::types::{BmcCommands, HostConfig, NoReadingPolicy, Settings, SourceKind};
use crate::error::MonitorError;
use crate::system::executor::CommandChannel;
use crate::system::parser::{compile_pattern, Extraction};

/// Latest chassis temperature for one host.
#[async_trait]
pub trait TemperatureSource: Send {
    /// Read the hottest matching sensor, in whole degrees Celsius.
    async fn read_temperature(&mut self, cancel: &CancellationToken) -> Result<i32, MonitorError>;

    /// Release any session held open between reads.
    async fn close(&mut self) {}
}

/// The two BMC fan-mode commands. No read-back: success means the
/// command channel reported success.
#[async_trait]
pub trait FanControl: Send + Sync {
    async fn enable_automatic(&self, cancel: &CancellationToken) -> Result<(), MonitorError>;

    /// Disable automatic control, then pin all fans at `percent`.
    async fn set_manual(&self, percent: u8, cancel: &CancellationToken) -> Result<(), MonitorError>;
}

/// Turn a pattern scan into a reading according to `policy`.
pub(crate) fn reading_from(extraction: Extraction, policy: NoReadingPolicy, host: &str) -> Result<i32, MonitorError> {
    match (extraction.max, policy) {
        (Some(temp), _) => Ok(temp),
        (None, NoReadingPolicy::AssumeZero) => {
            warn!("No temperature parsed for {} ({} match(es)); reporting 0 C per no_reading_policy", host, extraction.matches);
            Ok(0)
        }
        (None, NoReadingPolicy::Error) => Err(MonitorError::ParseFailure {
            host: host.to_string(),
            matches: extraction.matches,
        }),
    }
}

/// Build the reading source and fan actuator for one configured host.
pub fn build_host_hardware(
    host: &HostConfig,
    settings: &Settings,
    commands: &BmcCommands,
    channel: Arc<dyn CommandChannel>,
    dry_run: bool,
) -> Result<(Box<dyn TemperatureSource>, Box<dyn FanControl>), MonitorError> {
    let pattern = compile_pattern(&host.temperature_pattern).map_err(|e| {
        MonitorError::Configuration(format!("host '{}': invalid temperature_pattern: {}", host.name, e))
    })?;

    let tool = Arc::new(IpmiTool::new(&host.name, &host.ipmi, Arc::clone(&channel)));
    let actuator = IpmiFanActuator::new(Arc::clone(&tool), commands.clone(), dry_run);

    let source: Box<dyn TemperatureSource> = match host.source {
        SourceKind::Ipmi => Box::new(IpmiTemperatureSource::new(
            tool,
            commands.query_temperature.clone(),
            pattern,
            settings.no_reading_policy,
        )),
        SourceKind::SshLmSensors => Box::new(LmSensorsTemperatureSource::new(
            ssh::session::SshSession::new(&host.name, &host.ssh, channel),
            commands.sensors_command.clone(),
            pattern,
            settings.no_reading_policy,
        )),
    };

    Ok((source, Box::new(actuator)))
}
