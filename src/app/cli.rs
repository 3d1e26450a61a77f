//! Command-line argument definitions (clap) and help text.

use clap::Parser;

pub const HELP_TEXT: &str = "
IPMI Temperature Monitor - per-host BMC fan mode governor
Usage: ipmi-temp-monitor [OPTIONS]

Runs in the foreground until Ctrl+C or SIGTERM when no other action is given.

Options:
  -h, --help                    Print help
  -V, --version                 Print version
Monitor:
  -c, --config <PATH>           Config file (default: config.json next to the executable)
      --log-level <LOG_LEVEL>   Log level (TRACE, DEBUG, INFO, WARN, ERROR, CRITICAL)
      --dry-run                 Log fan commands instead of sending them
Service:
  -I, --install-service         Install systemd service for auto-start on boot
  -U, --uninstall-service       Uninstall systemd service
Config & Debug:
      --show-config             Print the effective configuration (passwords masked)
      --test                    Read each host's temperature once and exit
";

#[derive(Parser, Debug)]
#[command(name = "ipmi-temp-monitor")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Per-host BMC fan mode governor", long_about = None)]
pub struct Args {
    // === Monitor ===
    /// Config file path
    #[arg(short = 'c', long, value_name = "PATH", help_heading = "Monitor")]
    pub config: Option<String>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR, CRITICAL)
    #[arg(long = "log-level", help_heading = "Monitor")]
    pub log_level: Option<String>,

    /// Log fan commands instead of sending them
    #[arg(long = "dry-run", help_heading = "Monitor")]
    pub dry_run: bool,

    // === Service ===
    /// Install systemd service for auto-start on boot
    #[arg(short = 'I', long = "install-service", help_heading = "Service")]
    pub install_service: bool,

    /// Uninstall systemd service
    #[arg(short = 'U', long = "uninstall-service", help_heading = "Service")]
    pub uninstall_service: bool,

    // === Config & Debug ===
    /// Print the effective configuration (passwords masked)
    #[arg(long = "show-config", help_heading = "Config & Debug")]
    pub show_config: bool,

    /// Read each host's temperature once and exit
    #[arg(long, help_heading = "Config & Debug")]
    pub test: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_foreground_run() {
        let args = Args::try_parse_from(["ipmi-temp-monitor"]).unwrap();
        assert!(args.config.is_none());
        assert!(!args.dry_run && !args.test && !args.show_config);
        assert!(!args.install_service && !args.uninstall_service);
    }

    #[test]
    fn parses_short_and_long_flags() {
        let args = Args::try_parse_from([
            "ipmi-temp-monitor", "-c", "/etc/monitor.json", "--log-level", "debug", "--dry-run", "--test",
        ])
        .unwrap();
        assert_eq!(args.config.as_deref(), Some("/etc/monitor.json"));
        assert_eq!(args.log_level.as_deref(), Some("debug"));
        assert!(args.dry_run);
        assert!(args.test);

        let args = Args::try_parse_from(["ipmi-temp-monitor", "-I"]).unwrap();
        assert!(args.install_service);
    }
}
