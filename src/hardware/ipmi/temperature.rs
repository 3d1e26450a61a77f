//! IPMI reading source: `ipmitool sdr type temperature` scanned with the host pattern.

use std::sync::Arc;

use async_trait::async_trait;
use fancy_regex::Regex;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::config::types::NoReadingPolicy;
use crate::error::MonitorError;
use crate::hardware::ipmi::client::IpmiTool;
use crate::hardware::{reading_from, TemperatureSource};
use crate::system::parser::extract_max_temperature;

pub struct IpmiTemperatureSource {
    tool: Arc<IpmiTool>,
    query: String,
    pattern: Regex,
    policy: NoReadingPolicy,
}

impl IpmiTemperatureSource {
    pub fn new(tool: Arc<IpmiTool>, query: String, pattern: Regex, policy: NoReadingPolicy) -> Self {
        Self { tool, query, pattern, policy }
    }
}

#[async_trait]
impl TemperatureSource for IpmiTemperatureSource {
    async fn read_temperature(&mut self, cancel: &CancellationToken) -> Result<i32, MonitorError> {
        let host = self.tool.host_name();
        let output = self
            .tool
            .run(&self.query, cancel)
            .await
            .map_err(|e| e.into_source_error(host))?;

        trace!("{} sdr output:\n{}", host, output);
        reading_from(extract_max_temperature(&output, &self.pattern), self.policy, host)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::IpmiConnection;
    use crate::system::parser::compile_pattern;
    use crate::test_utils::test_utils::{exit_failure, ScriptedChannel};

    const SDR: &str = "\
Inlet Temp       | 04h | ok  |  7.1 | 23 degrees C
Exhaust Temp     | 01h | ok  |  7.1 | 38 degrees C
Temp             | 0Eh | ok  |  3.1 | 49 degrees C
Temp             | 0Fh | ok  |  3.2 | 44 degrees C
";

    fn source(channel: Arc<ScriptedChannel>, policy: NoReadingPolicy) -> IpmiTemperatureSource {
        let conn = IpmiConnection {
            host: "10.0.0.5".to_string(),
            user: "root".to_string(),
            password: "calvin".to_string(),
            ipmitool_path: None,
        };
        IpmiTemperatureSource::new(
            Arc::new(IpmiTool::new("r620", &conn, channel)),
            "sdr type temperature".to_string(),
            compile_pattern(r"^Temp\s+\|.*\|\s+(\d+) degrees C$").unwrap(),
            policy,
        )
    }

    #[tokio::test]
    async fn reads_hottest_cpu_sensor() {
        let channel = ScriptedChannel::new(vec![Ok(SDR.to_string())]);
        let mut src = source(channel.clone(), NoReadingPolicy::Error);

        assert_eq!(src.read_temperature(&CancellationToken::new()).await.unwrap(), 49);
        assert!(channel.lines()[0].ends_with("sdr type temperature"));
    }

    #[tokio::test]
    async fn bmc_failure_is_source_unavailable() {
        let channel = ScriptedChannel::new(vec![Err(exit_failure("Unable to establish IPMI v2 / RMCP+ session"))]);
        let mut src = source(channel, NoReadingPolicy::Error);

        let err = src.read_temperature(&CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, MonitorError::SourceUnavailable { ref host, .. } if host == "r620"));
    }

    #[tokio::test]
    async fn unmatched_output_follows_policy() {
        let channel = ScriptedChannel::new(vec![Ok("garbage".to_string()), Ok("garbage".to_string())]);
        let mut strict = source(channel.clone(), NoReadingPolicy::Error);
        assert!(matches!(
            strict.read_temperature(&CancellationToken::new()).await,
            Err(MonitorError::ParseFailure { .. })
        ));

        let mut legacy = source(channel, NoReadingPolicy::AssumeZero);
        assert_eq!(legacy.read_temperature(&CancellationToken::new()).await.unwrap(), 0);
    }
}
