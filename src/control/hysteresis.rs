//! Automatic/Manual fan-mode state machine for one host.
//!
//! Above threshold (latest reading OR rolling average over `max_temp_c`)
//! the host goes to Automatic immediately. Below it, the host may return
//! to Manual only once it has stayed below for `back_to_manual`; every
//! above-threshold tick restarts that clock.

use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::types::ManualReassert;
use crate::error::MonitorError;
use crate::hardware::types::FanMode;
use crate::hardware::FanControl;

#[derive(Debug, Clone, Copy)]
pub struct ControllerSettings {
    pub max_temp_c: i32,
    pub manual_percentage: u8,
    pub back_to_manual: Duration,
    pub reassert: ManualReassert,
}

/// What one evaluation did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// No command sent.
    Held,
    SwitchedToAutomatic,
    /// Below threshold, but the cooldown has not elapsed yet.
    CooldownPending { remaining: Duration },
    SwitchedToManual,
    /// Manual command resent while already Manual.
    ReassertedManual,
}

#[derive(Debug)]
pub struct HysteresisController {
    host: String,
    settings: ControllerSettings,
    mode: FanMode,
    below: bool,
    fell_below_at: Option<Instant>,
}

impl HysteresisController {
    /// Starts in Automatic, the safe default.
    pub fn new(host: &str, settings: ControllerSettings) -> Self {
        Self {
            host: host.to_string(),
            settings,
            mode: FanMode::Automatic,
            below: false,
            fell_below_at: None,
        }
    }

    pub fn mode(&self) -> FanMode {
        self.mode
    }

    #[cfg(test)]
    pub fn is_below(&self) -> bool {
        self.below
    }

    #[cfg(test)]
    pub fn fell_below_at(&self) -> Option<Instant> {
        self.fell_below_at
    }

    pub fn settings(&self) -> &ControllerSettings {
        &self.settings
    }

    pub fn is_above(&self, temp: i32, average: f64) -> bool {
        temp > self.settings.max_temp_c || average > f64::from(self.settings.max_temp_c)
    }

    /// Feed one tick. Actuator failures propagate; the recorded mode only
    /// changes after the actuator reports success.
    pub async fn evaluate(
        &mut self,
        temp: i32,
        average: f64,
        now: Instant,
        fan: &dyn FanControl,
        cancel: &CancellationToken,
    ) -> Result<Decision, MonitorError> {
        if self.is_above(temp, average) {
            self.below = false;
            if self.mode == FanMode::Automatic {
                return Ok(Decision::Held);
            }
            info!(
                "{}: {} C / avg {:.1} C over {} C, attempting switch to automatic mode",
                self.host, temp, average, self.settings.max_temp_c
            );
            fan.enable_automatic(cancel).await?;
            self.mode = FanMode::Automatic;
            return Ok(Decision::SwitchedToAutomatic);
        }

        if !self.below {
            self.fell_below_at = Some(now);
        }
        self.below = true;

        if self.mode == FanMode::Manual && self.settings.reassert == ManualReassert::OnTransition {
            return Ok(Decision::Held);
        }

        self.switch_to_manual(now, fan, cancel).await
    }

    async fn switch_to_manual(
        &mut self,
        now: Instant,
        fan: &dyn FanControl,
        cancel: &CancellationToken,
    ) -> Result<Decision, MonitorError> {
        let since = self.fell_below_at.unwrap_or(now);
        let elapsed = now.saturating_duration_since(since);
        let threshold = self.settings.back_to_manual;

        if elapsed < threshold {
            let remaining = threshold - elapsed;
            warn!(
                "{}: manual threshold not crossed yet. Staying in {} mode for at least another {} seconds.",
                self.host,
                self.mode,
                remaining.as_secs()
            );
            return Ok(Decision::CooldownPending { remaining });
        }

        let was = self.mode;
        if was == FanMode::Automatic {
            info!("{}: attempting switch to manual mode", self.host);
        }
        fan.set_manual(self.settings.manual_percentage, cancel).await?;
        self.mode = FanMode::Manual;

        Ok(match was {
            FanMode::Manual => Decision::ReassertedManual,
            FanMode::Automatic => Decision::SwitchedToManual,
        })
    }
}
