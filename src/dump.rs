use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use crate::error::Error;
use crate::models::{Fight, FightContext, FightEvents};

/// A persisted fight: descriptor, optional roster and taunt windows, and the five event arrays
#[derive(Debug, Clone, Deserialize)]
pub struct FightDump {
    pub fight: Fight,
    #[serde(flatten)]
    pub context: FightContext,
    #[serde(default)]
    pub events: FightEvents,
}

/// File listing info
#[derive(Debug, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct DumpFileInfo {
    pub filename: String,
    pub size_bytes: u64,
    pub size_display: String,
    pub date_str: String,
}

/// Parse a fight dump file
pub fn load_dump(path: &Path) -> Result<FightDump, Error> {
    let file = File::open(path)?;
    let reader = BufReader::with_capacity(1024 * 1024, file); // 1MB buffer
    Ok(serde_json::from_reader(reader)?)
}

/// All `*.json` dumps under `dir` (recursive), newest first
pub fn list_dumps(dir: &Path) -> Vec<DumpFileInfo> {
    let mut dumps: Vec<(Option<DateTime<Utc>>, DumpFileInfo)> = Vec::new();
    let mut dirs_to_scan = vec![dir.to_path_buf()];

    while let Some(scan_dir) = dirs_to_scan.pop() {
        let entries = match std::fs::read_dir(&scan_dir) {
            Ok(e) => e,
            Err(_) => continue,
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                dirs_to_scan.push(path);
                continue;
            }
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(filename) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };

            let metadata = entry.metadata().ok();
            let size_bytes = metadata.as_ref().map(|m| m.len()).unwrap_or(0);
            let modified: Option<DateTime<Utc>> = metadata
                .and_then(|m| m.modified().ok())
                .map(DateTime::<Utc>::from);

            dumps.push((
                modified,
                DumpFileInfo {
                    filename: filename.to_string(),
                    size_bytes,
                    size_display: format_size(size_bytes),
                    date_str: modified
                        .map(|d| d.format("%Y-%m-%d").to_string())
                        .unwrap_or_else(|| "Unknown".to_string()),
                },
            ));
        }
    }

    dumps.sort_by(|(a_time, a), (b_time, b)| {
        b_time.cmp(a_time).then_with(|| a.filename.cmp(&b.filename))
    });
    dumps.into_iter().map(|(_, info)| info).collect()
}

/// Reject names that could escape the dump directory
pub fn validate_filename(filename: &str) -> Result<(), Error> {
    if filename.is_empty() || filename.contains("..") || filename.contains('/') || filename.contains('\\') {
        return Err(Error::InvalidFilename(filename.to_string()));
    }
    Ok(())
}

/// Recursively search the dump tree for a `*.json` file with this exact name
pub fn find_file_recursive(dir: &Path, target: &str) -> Option<PathBuf> {
    if !target.ends_with(".json") {
        return None;
    }
    let mut dirs = vec![dir.to_path_buf()];
    while let Some(d) = dirs.pop() {
        let Ok(entries) = std::fs::read_dir(&d) else {
            continue;
        };
        for path in entries.flatten().map(|entry| entry.path()) {
            if path.is_dir() {
                dirs.push(path);
            } else if path.file_name().and_then(|n| n.to_str()) == Some(target) {
                return Some(path);
            }
        }
    }
    None
}

const SIZE_UNITS: [(u64, &str); 3] = [(1 << 30, "GB"), (1 << 20, "MB"), (1 << 10, "KB")];

pub fn format_size(bytes: u64) -> String {
    SIZE_UNITS
        .iter()
        .find(|(unit, _)| bytes >= *unit)
        .map(|(unit, label)| format!("{:.1} {}", bytes as f64 / *unit as f64, label))
        .unwrap_or_else(|| format!("{} B", bytes))
}
