use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};

use crate::Error;

/// Message of the event written for every delivery that went out
pub const EMAIL_SENT: &str = "Email Sent";

/// Keys written by the log itself, as opposed to event fields
const RESERVED: &[&str] = &["asctime", "levelname", "message", "delivery_id", "txt", "html"];

/// JSON-lines log of a single run. One object per line, with the
/// timestamp, level and message followed by the event's own fields.
pub struct RunLog<W: Write> {
    writer: W,
    path: Option<PathBuf>,
}

impl RunLog<BufWriter<File>> {
    /// Create `<dir>/<local timestamp>-log.jsonl`, creating `dir` if needed
    pub fn create(dir: &Path) -> Result<Self, Error> {
        std::fs::create_dir_all(dir)?;

        let now = chrono::Local::now();
        let path = dir.join(format!("{}-log.jsonl", now.format("%Y-%m-%dT%H:%M:%S%.6f")));
        let file = File::create(&path)?;

        Ok(Self {
            writer: BufWriter::new(file),
            path: Some(path),
        })
    }
}

impl<W: Write> RunLog<W> {
    pub fn new(writer: W) -> Self {
        Self { writer, path: None }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn info(&mut self, message: &str, fields: Value) -> Result<(), Error> {
        self.write("INFO", message, fields)
    }

    pub fn debug(&mut self, message: &str, fields: Value) -> Result<(), Error> {
        self.write("DEBUG", message, fields)
    }

    pub fn error(&mut self, message: &str, fields: Value) -> Result<(), Error> {
        self.write("ERROR", message, fields)
    }

    fn write(&mut self, level: &str, message: &str, fields: Value) -> Result<(), Error> {
        let mut line = Map::new();
        line.insert(
            "asctime".to_string(),
            Value::from(
                chrono::Local::now()
                    .format("%Y-%m-%d %H:%M:%S,%3f")
                    .to_string(),
            ),
        );
        line.insert("levelname".to_string(), Value::from(level));
        line.insert("message".to_string(), Value::from(message));

        match fields {
            Value::Object(map) => line.extend(map),
            Value::Null => (),
            other => {
                line.insert("detail".to_string(), other);
            }
        }

        serde_json::to_writer(&mut self.writer, &line)?;
        self.writer.write_all(b"\n")?;
        // Flush per event so the log survives a crash mid-batch
        self.writer.flush()?;

        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

/// A delivery recorded as sent in a run log
#[derive(Clone, Debug)]
pub struct SentEntry {
    pub asctime: String,
    pub delivery_id: u64,
    /// Delivery record fields, without the rendered bodies
    pub fields: Map<String, Value>,
}

/// Read every "Email Sent" event from a run log, in file order
pub fn read_sent(path: &Path) -> Result<Vec<SentEntry>, Error> {
    let file = File::open(path)
        .map_err(|e| Error::Io(format!("{}: {}", path.display(), e)))?;

    parse_sent(BufReader::new(file))
}

pub fn parse_sent<R: BufRead>(reader: R) -> Result<Vec<SentEntry>, Error> {
    let mut entries = Vec::new();

    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        let event: Map<String, Value> = serde_json::from_str(&line)?;
        if event.get("message").and_then(Value::as_str) != Some(EMAIL_SENT) {
            continue;
        }

        let delivery_id = match event.get("delivery_id").and_then(Value::as_u64) {
            Some(id) => id,
            None => {
                log::warn!("Skipping sent event without a delivery id: {}", line);
                continue;
            }
        };

        let asctime = event
            .get("asctime")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let fields = event
            .into_iter()
            .filter(|(key, _)| !RESERVED.contains(&key.as_str()))
            .collect();

        entries.push(SentEntry {
            asctime,
            delivery_id,
            fields,
        });
    }

    Ok(entries)
}
