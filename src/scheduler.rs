//! Polling loop: one sequential pass over every host per interval.
//!
//! Each host owns its reading source, actuator, window and controller.
//! A failure anywhere in one host's processing is logged against that host
//! and the pass moves on; nothing short of cancellation stops the loop.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::config::types::MonitorConfig;
use crate::control::{ControllerSettings, Decision, HysteresisController, RollingWindow};
use crate::error::MonitorError;
use crate::hardware::types::FanMode;
use crate::hardware::{build_host_hardware, FanControl, TemperatureSource};
use crate::system::executor::CommandChannel;

/// Everything the loop keeps for one host.
pub struct HostRuntime {
    name: String,
    source: Box<dyn TemperatureSource>,
    fan: Box<dyn FanControl>,
    window: RollingWindow,
    controller: HysteresisController,
}

impl HostRuntime {
    pub fn new(
        name: &str,
        source: Box<dyn TemperatureSource>,
        fan: Box<dyn FanControl>,
        window_size: usize,
        settings: ControllerSettings,
    ) -> Self {
        Self {
            name: name.to_string(),
            source,
            fan,
            window: RollingWindow::new(window_size),
            controller: HysteresisController::new(name, settings),
        }
    }

    #[cfg(test)]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[cfg(test)]
    pub fn mode(&self) -> FanMode {
        self.controller.mode()
    }

    #[cfg(test)]
    pub fn window(&self) -> &RollingWindow {
        &self.window
    }
}

/// Outcome of one host's tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HostReport {
    pub temp: i32,
    pub average: f64,
    pub mode: FanMode,
    pub max_temp_c: i32,
    pub decision: Decision,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PassSummary {
    pub serviced: usize,
    pub failed: usize,
}

pub struct Scheduler {
    hosts: Vec<HostRuntime>,
    interval: Duration,
}

impl Scheduler {
    pub fn new(interval: Duration) -> Self {
        Self { hosts: Vec::new(), interval }
    }

    /// Wire up every configured host against `channel`.
    pub fn from_config(
        config: &MonitorConfig,
        channel: Arc<dyn CommandChannel>,
        dry_run: bool,
    ) -> Result<Self, MonitorError> {
        let settings = &config.settings;
        let mut scheduler = Scheduler::new(settings.polling_interval());

        for host in &config.hosts {
            let (source, fan) = build_host_hardware(host, settings, &config.commands, Arc::clone(&channel), dry_run)?;
            scheduler.add_host(HostRuntime::new(
                &host.name,
                source,
                fan,
                settings.rolling_average_window,
                ControllerSettings {
                    max_temp_c: host.max_temp_c,
                    manual_percentage: settings.manual_mode_fan_percentage,
                    back_to_manual: settings.back_to_manual_threshold(),
                    reassert: settings.manual_reassert,
                },
            ));
        }

        Ok(scheduler)
    }

    pub fn add_host(&mut self, host: HostRuntime) {
        self.hosts.push(host);
    }

    #[cfg(test)]
    pub fn hosts(&self) -> &[HostRuntime] {
        &self.hosts
    }

    /// Put every host in automatic before the first pass. Failures are
    /// logged only; the first above-threshold tick retries anyway.
    pub async fn start(&mut self, cancel: &CancellationToken) {
        info!("Monitor starting. Setting fan control to automatic to start.");
        for host in &mut self.hosts {
            match host.fan.enable_automatic(cancel).await {
                Ok(()) => {}
                Err(MonitorError::Cancelled) => {
                    debug!("{}: startup abandoned for shutdown", host.name);
                    break;
                }
                Err(e) => error!("{}: could not enable automatic fan control at startup: {}", host.name, e),
            }
        }
    }

    async fn process_host(
        host: &mut HostRuntime,
        now: Instant,
        cancel: &CancellationToken,
    ) -> Result<HostReport, MonitorError> {
        let temp = host.source.read_temperature(cancel).await?;
        host.window.push(temp);
        let average = host.window.average()?;

        let decision = host
            .controller
            .evaluate(temp, average, now, host.fan.as_ref(), cancel)
            .await?;

        Ok(HostReport {
            temp,
            average,
            mode: host.controller.mode(),
            max_temp_c: host.controller.settings().max_temp_c,
            decision,
        })
    }

    /// One sequential pass with `now` as the decision clock.
    pub async fn run_pass_at(&mut self, now: Instant, cancel: &CancellationToken) -> PassSummary {
        let mut summary = PassSummary::default();

        for host in &mut self.hosts {
            if cancel.is_cancelled() {
                break;
            }
            debug!("Starting process {}", host.name);

            match Self::process_host(host, now, cancel).await {
                Ok(report) => {
                    summary.serviced += 1;
                    debug!("{}: {:?}", host.name, report.decision);
                    info!(
                        "Server {} fan control is {}, temp is {} C, rolling average temp is {:.1} C. Max temp: {} C",
                        host.name, report.mode, report.temp, report.average, report.max_temp_c
                    );
                }
                Err(MonitorError::Cancelled) => {
                    debug!("{}: in-flight call abandoned for shutdown", host.name);
                    break;
                }
                Err(e) => {
                    summary.failed += 1;
                    error!("{}: {}", host.name, e);
                }
            }
        }

        summary
    }

    pub async fn run_pass(&mut self, cancel: &CancellationToken) -> PassSummary {
        self.run_pass_at(Instant::now(), cancel).await
    }

    /// Read every host once without touching fan modes.
    pub async fn probe(&mut self, cancel: &CancellationToken) -> Vec<(String, Result<i32, MonitorError>)> {
        let mut readings = Vec::with_capacity(self.hosts.len());
        for host in &mut self.hosts {
            let reading = host.source.read_temperature(cancel).await;
            readings.push((host.name.clone(), reading));
        }
        readings
    }

    /// Poll until `cancel` fires, then close every source.
    pub async fn run(&mut self, cancel: &CancellationToken) {
        info!(
            "Monitoring {} host(s) every {}s",
            self.hosts.len(),
            self.interval.as_secs()
        );

        while !cancel.is_cancelled() {
            let summary = self.run_pass(cancel).await;
            debug!("Pass complete: {} serviced, {} failed", summary.serviced, summary.failed);

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
        }

        self.shutdown().await;
        info!("Exiting.");
    }

    pub async fn shutdown(&mut self) {
        for host in &mut self.hosts {
            host.source.close().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::ManualReassert;
    use crate::test_utils::test_utils::{FanCall, RecordingFan, ScriptedChannel, ScriptedSource};

    const COOLDOWN: Duration = Duration::from_secs(60);

    fn settings(max_temp_c: i32) -> ControllerSettings {
        ControllerSettings {
            max_temp_c,
            manual_percentage: 30,
            back_to_manual: COOLDOWN,
            reassert: ManualReassert::EveryTick,
        }
    }

    fn host(name: &str, source: ScriptedSource, fan: &RecordingFan) -> HostRuntime {
        HostRuntime::new(name, Box::new(source), Box::new(fan.clone()), 3, settings(50))
    }

    #[tokio::test]
    async fn failing_host_does_not_starve_the_others() {
        let (fan_a, fan_b, fan_c) = (RecordingFan::new(), RecordingFan::new(), RecordingFan::new());
        let broken = ScriptedSource::unreachable();
        let broken_reads = Arc::clone(&broken.reads);
        let healthy = ScriptedSource::steady(40);
        let healthy_reads = Arc::clone(&healthy.reads);

        let mut scheduler = Scheduler::new(Duration::from_secs(30));
        scheduler.add_host(host("a", healthy, &fan_a));
        scheduler.add_host(host("b", broken, &fan_b));
        scheduler.add_host(host("c", ScriptedSource::steady(42), &fan_c));

        let cancel = CancellationToken::new();
        let t0 = Instant::now();
        for pass in 0..3u32 {
            let summary = scheduler.run_pass_at(t0 + COOLDOWN * pass, &cancel).await;
            assert_eq!(summary, PassSummary { serviced: 2, failed: 1 });
        }

        assert_eq!(*broken_reads.lock().unwrap(), 3);
        assert_eq!(*healthy_reads.lock().unwrap(), 3);
        assert!(fan_b.calls().is_empty());
        assert_eq!(scheduler.hosts()[1].name(), "b");
        assert_eq!(scheduler.hosts()[1].mode(), FanMode::Automatic);
        assert!(scheduler.hosts()[1].window().is_empty());

        // Healthy hosts switched at the second pass and re-asserted at the third.
        for fan in [&fan_a, &fan_c] {
            assert_eq!(fan.calls(), [FanCall::SetManual(30), FanCall::SetManual(30)]);
        }
        assert_eq!(scheduler.hosts()[0].mode(), FanMode::Manual);
        assert_eq!(scheduler.hosts()[2].mode(), FanMode::Manual);
    }

    #[tokio::test]
    async fn actuation_failure_is_isolated_to_its_host() {
        let (fan_a, fan_b) = (RecordingFan::new(), RecordingFan::new());
        fan_a.set_failing(true);

        let mut scheduler = Scheduler::new(Duration::from_secs(30));
        scheduler.add_host(host("a", ScriptedSource::steady(40), &fan_a));
        scheduler.add_host(host("b", ScriptedSource::steady(40), &fan_b));

        let cancel = CancellationToken::new();
        let t0 = Instant::now();
        scheduler.run_pass_at(t0, &cancel).await;
        let summary = scheduler.run_pass_at(t0 + COOLDOWN, &cancel).await;

        assert_eq!(summary, PassSummary { serviced: 1, failed: 1 });
        assert_eq!(scheduler.hosts()[0].mode(), FanMode::Automatic);
        assert_eq!(scheduler.hosts()[1].mode(), FanMode::Manual);
    }

    #[tokio::test]
    async fn window_feeds_controller_average() {
        let fan = RecordingFan::new();
        let source = ScriptedSource::new(vec![Ok(45), Ok(46), Ok(44)], Some(44));

        let mut scheduler = Scheduler::new(Duration::from_secs(30));
        scheduler.add_host(host("r620", source, &fan));

        let cancel = CancellationToken::new();
        let t0 = Instant::now();
        for i in 0..3u64 {
            scheduler.run_pass_at(t0 + Duration::from_secs(i * 30), &cancel).await;
        }
        let readings: Vec<i32> = scheduler.hosts()[0].window().readings().collect();
        assert_eq!(readings, [45, 46, 44]);
        assert_eq!(fan.calls(), [FanCall::SetManual(30)]);
    }

    #[tokio::test]
    async fn start_enables_automatic_everywhere_despite_failures() {
        let (fan_a, fan_b) = (RecordingFan::new(), RecordingFan::new());
        fan_a.set_failing(true);

        let mut scheduler = Scheduler::new(Duration::from_secs(30));
        scheduler.add_host(host("a", ScriptedSource::steady(40), &fan_a));
        scheduler.add_host(host("b", ScriptedSource::steady(40), &fan_b));

        scheduler.start(&CancellationToken::new()).await;
        assert_eq!(fan_a.calls(), [FanCall::EnableAutomatic]);
        assert_eq!(fan_b.calls(), [FanCall::EnableAutomatic]);
        assert_eq!(scheduler.hosts()[0].mode(), FanMode::Automatic);
    }

    #[tokio::test]
    async fn start_stops_at_shutdown_without_touching_remaining_hosts() {
        let (fan_a, fan_b) = (RecordingFan::new(), RecordingFan::new());
        let mut scheduler = Scheduler::new(Duration::from_secs(30));
        scheduler.add_host(host("a", ScriptedSource::steady(40), &fan_a));
        scheduler.add_host(host("b", ScriptedSource::steady(40), &fan_b));

        let cancel = CancellationToken::new();
        cancel.cancel();
        scheduler.start(&cancel).await;

        assert_eq!(fan_a.calls(), [FanCall::EnableAutomatic]);
        assert!(fan_b.calls().is_empty());
    }

    #[tokio::test]
    async fn probe_reads_without_actuating() {
        let fan = RecordingFan::new();
        let mut scheduler = Scheduler::new(Duration::from_secs(30));
        scheduler.add_host(host("a", ScriptedSource::steady(38), &fan));
        scheduler.add_host(host("b", ScriptedSource::unreachable(), &fan));

        let readings = scheduler.probe(&CancellationToken::new()).await;
        assert_eq!(readings[0].0, "a");
        assert_eq!(readings[0].1.as_ref().ok(), Some(&38));
        assert!(readings[1].1.is_err());
        assert!(fan.calls().is_empty());
        assert!(scheduler.hosts()[0].window().is_empty());
    }

    #[tokio::test]
    async fn run_stops_on_cancel_and_closes_sources() {
        let fan = RecordingFan::new();
        let source = ScriptedSource::steady(40);
        let reads = Arc::clone(&source.reads);
        let closed = Arc::clone(&source.closed);

        let mut scheduler = Scheduler::new(Duration::from_secs(3600));
        scheduler.add_host(host("a", source, &fan));

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        tokio::time::timeout(Duration::from_secs(5), scheduler.run(&cancel))
            .await
            .expect("run should return promptly after cancellation");

        assert_eq!(*reads.lock().unwrap(), 1);
        assert!(*closed.lock().unwrap());
    }

    #[tokio::test]
    async fn cancelled_token_skips_the_pass() {
        let fan = RecordingFan::new();
        let source = ScriptedSource::steady(40);
        let reads = Arc::clone(&source.reads);

        let mut scheduler = Scheduler::new(Duration::from_secs(30));
        scheduler.add_host(host("a", source, &fan));

        let cancel = CancellationToken::new();
        cancel.cancel();
        scheduler.run(&cancel).await;
        assert_eq!(*reads.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn from_config_builds_one_runtime_per_host() {
        let config: MonitorConfig = serde_json::from_value(serde_json::json!({
            "settings": { "rolling_average_window": 4 },
            "hosts": [
                { "name": "r620", "ipmi": { "host": "10.0.0.5" }, "temperature_pattern": "(\\d+) degrees C" },
                { "name": "nas", "source": "ssh_lm_sensors", "ipmi": { "host": "10.0.0.6" },
                  "ssh": { "host": "10.0.1.6" }, "temperature_pattern": "(\\d+\\.\\d+)", "max_temp_c": 60 }
            ]
        }))
        .unwrap();

        let channel = ScriptedChannel::new(vec![Ok("Temp | 0Eh | ok | 3.1 | 41 degrees C".to_string())]);
        let mut scheduler = Scheduler::from_config(&config, channel.clone(), true).unwrap();
        assert_eq!(scheduler.hosts().len(), 2);
        assert_eq!(scheduler.hosts()[0].window().capacity(), 4);

        let readings = scheduler.probe(&CancellationToken::new()).await;
        assert_eq!(readings[0].1.as_ref().ok(), Some(&41));
        assert!(channel.lines()[0].contains("sdr type temperature"));
    }
}
