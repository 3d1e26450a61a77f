//! Service management constants and submodule re-exports.

pub mod systemd;

pub const SERVICE_NAME: &str = "ipmi-temp-monitor";
pub const SYSTEMD_SERVICE_PATH: &str = "/etc/systemd/system/ipmi-temp-monitor.service";

pub const SYSTEMD_SERVICE_TEMPLATE: &str = r#"[Unit]
Description=IPMI Temperature Monitor (BMC fan mode governor)
After=network-online.target
Wants=network-online.target

[Service]
Type=simple
ExecStart={{EXEC_PATH}} --config {{CONFIG_PATH}}
ExecReload=/bin/kill -HUP $MAINPID
Restart=on-failure
RestartSec=10
User=root
WorkingDirectory={{WORK_DIR}}
StandardOutput=journal
StandardError=journal

[Install]
WantedBy=multi-user.target
"#;
