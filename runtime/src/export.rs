// Copyright 2026 Harvest Contributors
// SPDX-License-Identifier: Apache-2.0

//! Record export: a pretty JSON array or append-friendly JSON Lines.
//!
//! Records are written in visit order, each with one-line experience,
//! education and skills summaries next to the structured fields. A JSON Lines
//! export is streamed while the session runs and flushed after every record,
//! so an interrupted session leaves every finished line intact.

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use clap::ValueEnum;
use harvest_core::Record;
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;

const EXPERIENCE_ENTRIES: usize = 3;
const EDUCATION_ENTRIES: usize = 2;
const SKILL_ENTRIES: usize = 5;

/// On-disk format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    /// One pretty-printed JSON array.
    #[default]
    Json,
    /// One JSON object per line.
    Jsonl,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Jsonl => "jsonl",
        }
    }
}

/// One exported record.
#[derive(Serialize)]
struct ExportRow<'a> {
    #[serde(flatten)]
    record: &'a Record,
    experience_summary: String,
    education_summary: String,
    skills_summary: String,
}

impl<'a> From<&'a Record> for ExportRow<'a> {
    fn from(record: &'a Record) -> Self {
        Self {
            record,
            experience_summary: record.experience_summary(EXPERIENCE_ENTRIES),
            education_summary: record.education_summary(EDUCATION_ENTRIES),
            skills_summary: record.skills_summary(SKILL_ENTRIES),
        }
    }
}

/// `harvest_<keywords>_<YYYYmmdd_HHMMSS>.<ext>`, keywords reduced to
/// lowercase alphanumerics joined by underscores.
pub fn default_file_name(keywords: &str, format: ExportFormat, at: DateTime<Local>) -> String {
    let slug = keywords
        .split(|c: char| !c.is_alphanumeric())
        .filter(|part| !part.is_empty())
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join("_");
    let slug = if slug.is_empty() { "search".to_string() } else { slug };
    format!(
        "harvest_{slug}_{}.{}",
        at.format("%Y%m%d_%H%M%S"),
        format.extension()
    )
}

/// The explicit path, or a timestamped default under `dir`.
pub fn resolve_output(
    explicit: Option<PathBuf>,
    dir: &Path,
    keywords: &str,
    format: ExportFormat,
) -> PathBuf {
    explicit.unwrap_or_else(|| dir.join(default_file_name(keywords, format, Local::now())))
}

/// Write every record to `path`, replacing any existing file.
pub fn write_records(path: &Path, format: ExportFormat, records: &[Record]) -> Result<usize> {
    create_parent(path)?;
    match format {
        ExportFormat::Json => {
            let file = File::create(path)
                .with_context(|| format!("failed to create export file: {}", path.display()))?;
            let mut writer = BufWriter::new(file);
            let rows: Vec<ExportRow<'_>> = records.iter().map(ExportRow::from).collect();
            serde_json::to_writer_pretty(&mut writer, &rows)
                .context("failed to serialize records")?;
            writeln!(writer)?;
            writer.flush()?;
        }
        ExportFormat::Jsonl => {
            let mut writer = JsonlWriter::create(path)?;
            for record in records {
                writer.append(record)?;
            }
        }
    }
    Ok(records.len())
}

/// Append records to `path` as they arrive, creating it with the first one.
///
/// Returns how many records were written once every sender is gone.
pub async fn stream_jsonl(
    path: PathBuf,
    mut records: mpsc::UnboundedReceiver<Record>,
) -> Result<usize> {
    let mut writer: Option<JsonlWriter> = None;
    while let Some(record) = records.recv().await {
        if writer.is_none() {
            writer = Some(JsonlWriter::create(&path)?);
        }
        if let Some(writer) = writer.as_mut() {
            writer.append(&record)?;
        }
    }
    Ok(writer.map_or(0, |w| w.written()))
}

/// Line-at-a-time JSON Lines writer.
pub struct JsonlWriter {
    file: File,
    path: PathBuf,
    written: usize,
}

impl JsonlWriter {
    /// Create or truncate `path`.
    pub fn create(path: &Path) -> Result<Self> {
        create_parent(path)?;
        let file = File::create(path)
            .with_context(|| format!("failed to create export file: {}", path.display()))?;
        Ok(Self {
            file,
            path: path.to_path_buf(),
            written: 0,
        })
    }

    pub fn append(&mut self, record: &Record) -> Result<()> {
        let line = serde_json::to_string(&ExportRow::from(record))
            .context("failed to serialize record")?;
        writeln!(self.file, "{line}")
            .with_context(|| format!("failed to write to {}", self.path.display()))?;
        self.file.flush()?;
        self.written += 1;
        Ok(())
    }

    /// Lines written through this writer.
    pub fn written(&self) -> usize {
        self.written
    }
}

fn create_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory: {}", parent.display()))?;
    }
    Ok(())
}
