use std::collections::HashMap;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};

use crate::runlog::{self, SentEntry};
use crate::transport::{DeliveryId, ResultLookup};
use crate::Error;

/// Result columns carrying a timezone, written as naive wall-clock time
const TIME_COLUMNS: &[&str] = &["delivery_time", "created_time", "updated_time", "open_time"];

/// Files written by `build_report`
#[derive(Debug)]
pub struct ReportFiles {
    pub results: PathBuf,
    pub report: PathBuf,
}

/// Fetch the delivery result of every email a run log recorded as sent,
/// then write the raw results (JSONL) and a merged CSV report to `out_dir`.
///
/// `progress` receives `(fetched, total)` after each lookup.
pub async fn build_report<L, P>(
    log_path: &Path,
    out_dir: &Path,
    lookup: &L,
    mut progress: P,
) -> Result<ReportFiles, Error>
where
    L: ResultLookup,
    P: FnMut(usize, usize),
{
    let entries: Vec<SentEntry> = runlog::read_sent(log_path)?
        .into_iter()
        .filter(|entry| {
            if entry.delivery_id == 0 {
                log::warn!(
                    "Skipping dry-run entry for {}",
                    entry.fields.get("email_address").unwrap_or(&Value::Null)
                );
            }
            entry.delivery_id != 0
        })
        .collect();

    log::info!("Fetching results for {} deliveries", entries.len());

    let mut results = Vec::with_capacity(entries.len());
    for (idx, entry) in entries.iter().enumerate() {
        let result = lookup.mail_result(DeliveryId(entry.delivery_id)).await?;
        log::debug!("[{}/{}] {}", idx + 1, entries.len(), entry.delivery_id);
        results.push(result);
        progress(idx + 1, entries.len());
    }

    std::fs::create_dir_all(out_dir)?;

    let file_name = log_path
        .file_name()
        .ok_or_else(|| Error::Io(format!("Not a file: {}", log_path.display())))?;
    let results_path = out_dir.join(file_name);
    let report_path = results_path.with_extension("csv");

    let mut file = File::create(&results_path)?;
    for result in &results {
        serde_json::to_writer(&mut file, result)?;
        file.write_all(b"\n")?;
    }

    let (header, rows) = merge(&entries, &results);
    let mut writer = csv::Writer::from_path(&report_path)?;
    writer.write_record(&header)?;
    for row in rows {
        writer.write_record(&row)?;
    }
    writer.flush()?;

    log::info!("Wrote {} and {}", results_path.display(), report_path.display());

    Ok(ReportFiles {
        results: results_path,
        report: report_path,
    })
}

/// Left join the sent entries with their results on delivery id
pub fn merge(entries: &[SentEntry], results: &[Value]) -> (Vec<String>, Vec<Vec<String>>) {
    let mut by_id: HashMap<u64, &Map<String, Value>> = HashMap::new();
    for result in results {
        if let (Some(id), Some(map)) = (
            result.get("delivery_id").and_then(Value::as_u64),
            result.as_object(),
        ) {
            by_id.insert(id, map);
        }
    }

    let mut log_columns: Vec<String> = vec!["asctime".to_string(), "delivery_id".to_string()];
    for entry in entries {
        for key in entry.fields.keys() {
            if !log_columns.contains(key) {
                log_columns.push(key.clone());
            }
        }
    }

    // (source key, column name)
    let mut result_columns: Vec<(String, String)> = Vec::new();
    for map in results.iter().filter_map(Value::as_object) {
        for key in map.keys() {
            if key == "delivery_id" || result_columns.iter().any(|(k, _)| k == key) {
                continue;
            }
            let column = if log_columns.contains(key) {
                format!("result_{}", key)
            } else {
                key.clone()
            };
            result_columns.push((key.clone(), column));
        }
    }

    let mut header = log_columns.clone();
    header.extend(result_columns.iter().map(|(_, column)| column.clone()));

    let rows = entries
        .iter()
        .map(|entry| {
            let mut row = vec![entry.asctime.clone(), entry.delivery_id.to_string()];
            row.extend(
                log_columns[2..]
                    .iter()
                    .map(|key| entry.fields.get(key).map(cell).unwrap_or_default()),
            );

            let result = by_id.get(&entry.delivery_id);
            row.extend(result_columns.iter().map(|(key, _)| {
                let value = result.and_then(|map| map.get(key));
                match value {
                    Some(Value::String(s)) if TIME_COLUMNS.contains(&key.as_str()) => naive_time(s),
                    Some(value) => cell(value),
                    None => String::new(),
                }
            }));

            row
        })
        .collect();

    (header, rows)
}

fn cell(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Drop the offset but keep the wall-clock time it was recorded in
fn naive_time(s: &str) -> String {
    match chrono::DateTime::parse_from_rfc3339(s) {
        Ok(dt) => dt.naive_local().format("%Y-%m-%d %H:%M:%S").to_string(),
        Err(_) => s.to_string(),
    }
}
