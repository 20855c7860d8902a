//! Reading export

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::path::Path;

use crate::analysis::{MeterReading, MeterScreenType};

/// Render `"{label}: {value}"` lines in screen order
pub fn format_readings(snapshot: &BTreeMap<MeterScreenType, MeterReading>) -> String {
    snapshot
        .iter()
        .map(|(screen, reading)| format!("{}: {}", screen.label(), reading.value()))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Write the snapshot as a JSON object keyed by screen
pub fn save_snapshot(snapshot: &BTreeMap<MeterScreenType, MeterReading>, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let values: BTreeMap<MeterScreenType, &str> = snapshot.iter().map(|(k, v)| (*k, v.value())).collect();
    let content = serde_json::to_string_pretty(&values)?;
    std::fs::write(path, content).with_context(|| format!("Failed to write readings to {:?}", path))?;
    Ok(())
}
