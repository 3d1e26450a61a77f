//! Fixed-speed template rendering for the manual fan command.

/// `30` -> `"0x1e"`
pub fn speed_hex(percent: u8) -> String {
    format!("0x{:02x}", percent)
}

/// Substitute `{{SPEED_HEX}}` / `{{SPEED}}` in a `set_fixed_speed` template.
pub fn render_fixed_speed(template: &str, percent: u8) -> String {
    template
        .replace("{{SPEED_HEX}}", &speed_hex(percent))
        .replace("{{SPEED}}", &percent.to_string())
}
