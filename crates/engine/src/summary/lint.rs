//! Lint rules over the captured `Config file` dump.

use crate::context::BlockId;
use super::model::ConfigLintFinding;

/// Run every rule over the config lines, in line order.
pub fn lint_config(anchor: BlockId, lines: &[String]) -> Vec<ConfigLintFinding> {
    let mut findings = Vec::new();
    let mut serials: Vec<String> = Vec::new();
    let mut section = String::new();
    let mut mcu_name = String::new();

    let mut push = |text: String| findings.push(ConfigLintFinding { anchor, text });

    for raw in lines {
        let line = raw.trim();

        if let Some(name) = line.strip_prefix('[').and_then(|rest| rest.strip_suffix(']')) {
            section = name.to_string();
            if section == "mcu" {
                mcu_name = "mcu".to_string();
            } else if let Some(name) = section.strip_prefix("mcu ") {
                mcu_name = name.trim().to_string();
            }
            continue;
        }

        if line.starts_with("serial =") || line.starts_with("serial:") {
            let Some(serial) = line.split_whitespace().last() else {
                continue;
            };
            if serials.iter().any(|s| s == serial) {
                push(format!("mcu {mcu_name} serial {serial} already used"));
            }
            if serial.contains('<') {
                push(format!("mcu {mcu_name} serial not filled and contains template value: {serial}"));
            }
            if serial.contains("ttyUSB") || serial.contains("ttyACM") {
                push(format!(
                    "mcu {mcu_name} serial {serial} may not work correctly, use serial/by-id instead"
                ));
            }
            serials.push(serial.to_string());
        } else if line.starts_with("rotation_distance =") && section.starts_with("stepper") {
            if let Some(distance) = line.split_whitespace().last() {
                if distance.parse::<i64>().is_err() {
                    push(format!("[{section}] contains decimal rotation_distance = {distance}"));
                }
            }
        }
    }

    findings
}
