//! lm-sensors reading source: runs `sensors` over the host's SSH session.

use async_trait::async_trait;
use fancy_regex::Regex;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::config::types::NoReadingPolicy;
use crate::error::MonitorError;
use crate::hardware::ssh::session::SshSession;
use crate::hardware::{reading_from, TemperatureSource};
use crate::system::parser::extract_max_temperature;

pub struct LmSensorsTemperatureSource {
    session: SshSession,
    command: String,
    pattern: Regex,
    policy: NoReadingPolicy,
}

impl LmSensorsTemperatureSource {
    pub fn new(session: SshSession, command: String, pattern: Regex, policy: NoReadingPolicy) -> Self {
        Self { session, command, pattern, policy }
    }
}

#[async_trait]
impl TemperatureSource for LmSensorsTemperatureSource {
    async fn read_temperature(&mut self, cancel: &CancellationToken) -> Result<i32, MonitorError> {
        let output = match self.session.run(&self.command, cancel).await {
            Ok(output) => output,
            Err(e) => return Err(e.into_source_error(self.session.host_name())),
        };

        trace!("{} sensors output:\n{}", self.session.host_name(), output);
        reading_from(
            extract_max_temperature(&output, &self.pattern),
            self.policy,
            self.session.host_name(),
        )
    }

    async fn close(&mut self) {
        // Fresh token: shutdown has already cancelled the shared one.
        self.session.close(&CancellationToken::new()).await;
    }
}
